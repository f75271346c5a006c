//! Registration tier requirements and user resolution.
//!
//! The amount of a purchase decides how much we must know about the buyer:
//!
//! - `amount >= threshold`: **full** (name, date of birth, address, terms)
//! - `0 < amount < threshold`: **standard** (name, terms)
//! - `amount == 0`: **minimal** (email)
//!
//! Users are only ever moved up. Resolution is split into [`plan`] (reads and
//! validates) and [`apply`] (writes) so a caller can validate before an
//! external call and write afterwards.

use reclaim_db::queries::users;
use reclaim_types::user::{Profile, RegistrationLevel, User};
use reclaim_types::Cents;
use rusqlite::Connection;

use crate::{Result, SettlementError};

/// Who the purchase is for. A user id takes precedence over an email.
#[derive(Clone, Copy, Debug)]
pub struct Identity<'a> {
    pub user_id: Option<&'a str>,
    pub email: Option<&'a str>,
}

/// Outcome of resolving a user, before anything is written.
#[derive(Clone, Debug, PartialEq)]
pub enum UserPlan {
    /// Existing user already at or above the required tier.
    Existing(User),
    /// Existing user to be raised to the required tier with a merged profile.
    Upgrade { user: User, profile: Profile },
    /// No user with this email yet.
    Create { email: String, profile: Profile },
}

/// Tier demanded by a purchase of `amount` against `threshold`.
pub fn required_level(amount: Cents, threshold: Cents, requires_validation: bool) -> RegistrationLevel {
    let by_amount = if amount >= threshold {
        RegistrationLevel::Full
    } else if amount > 0 {
        RegistrationLevel::Standard
    } else {
        RegistrationLevel::Minimal
    };
    if requires_validation {
        by_amount.max(RegistrationLevel::Standard)
    } else {
        by_amount
    }
}

/// Profile fields still missing for `level`.
pub fn missing_fields(level: RegistrationLevel, profile: &Profile) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if level >= RegistrationLevel::Standard {
        if is_blank(profile.first_name.as_deref()) {
            missing.push("first_name");
        }
        if is_blank(profile.last_name.as_deref()) {
            missing.push("last_name");
        }
        if !profile.terms_accepted {
            missing.push("terms_accepted");
        }
    }
    if level >= RegistrationLevel::Full {
        if is_blank(profile.date_of_birth.as_deref()) {
            missing.push("date_of_birth");
        }
        if !profile.address.as_ref().is_some_and(|a| a.is_complete()) {
            missing.push("address");
        }
    }
    missing
}

/// Reject a profile that does not satisfy `level`.
pub fn check(level: RegistrationLevel, profile: &Profile) -> Result<()> {
    let missing = missing_fields(level, profile);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SettlementError::Validation(format!(
            "{level} registration requires: {}",
            missing.join(", ")
        )))
    }
}

/// Decide how to obtain a user at `required` tier. Read-only.
///
/// # Errors
///
/// - [`SettlementError::NotFound`] if a user id is given and unknown
/// - [`SettlementError::Validation`] if neither id nor email is given, or the
///   merged profile lacks fields for `required`
pub fn plan(
    conn: &Connection,
    identity: Identity<'_>,
    required: RegistrationLevel,
    profile: &Profile,
) -> Result<UserPlan> {
    let existing = match identity.user_id {
        Some(id) => Some(users::get_by_id(conn, id)?),
        None => {
            let email = identity
                .email
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .ok_or_else(|| SettlementError::Validation("user id or email is required".into()))?;
            if !email.contains('@') {
                return Err(SettlementError::Validation(format!("'{email}' is not an email address")));
            }
            match users::find_by_email(conn, email)? {
                Some(user) => Some(user),
                None => {
                    check(required, profile)?;
                    return Ok(UserPlan::Create {
                        email: email.to_string(),
                        profile: profile.clone(),
                    });
                }
            }
        }
    };

    match existing {
        Some(user) if user.registration_level >= required => Ok(UserPlan::Existing(user)),
        Some(user) => {
            let merged = user.profile.merged_with(profile);
            check(required, &merged)?;
            Ok(UserPlan::Upgrade {
                user,
                profile: merged,
            })
        }
        None => Err(SettlementError::Validation("user id or email is required".into())),
    }
}

/// Carry out a plan produced by [`plan`].
pub fn apply(conn: &Connection, plan: UserPlan, required: RegistrationLevel) -> Result<User> {
    match plan {
        UserPlan::Existing(user) => Ok(user),
        UserPlan::Upgrade { user, profile } => {
            tracing::info!(
                user_id = %user.id,
                from = %user.registration_level,
                to = %required,
                "escalating registration tier"
            );
            Ok(users::upgrade(conn, &user.id, required, &profile)?)
        }
        UserPlan::Create { email, profile } => Ok(users::insert(conn, &email, required, &profile)?),
    }
}

/// Resolve, escalate or create the user in one step.
pub fn resolve_user(
    conn: &Connection,
    identity: Identity<'_>,
    required: RegistrationLevel,
    profile: &Profile,
) -> Result<User> {
    let plan = plan(conn, identity, required, profile)?;
    apply(conn, plan, required)
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}
