//! Users and registration tiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{UnknownVariant, UserId};

/// How much personal data has been collected for a user.
///
/// Ordered: `Minimal < Standard < Full`. A user's level never decreases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationLevel {
    /// Email only.
    Minimal,
    /// Name and terms acceptance.
    Standard,
    /// Name, date of birth, full address and terms acceptance.
    Full,
}

impl RegistrationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationLevel::Minimal => "minimal",
            RegistrationLevel::Standard => "standard",
            RegistrationLevel::Full => "full",
        }
    }
}

impl fmt::Display for RegistrationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationLevel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minimal" => Ok(RegistrationLevel::Minimal),
            "standard" => Ok(RegistrationLevel::Standard),
            "full" => Ok(RegistrationLevel::Full),
            other => Err(UnknownVariant {
                kind: "registration level",
                value: other.to_string(),
            }),
        }
    }
}

/// Postal address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

impl Address {
    /// True when every line is filled in.
    pub fn is_complete(&self) -> bool {
        [&self.street, &self.city, &self.postal_code, &self.country]
            .iter()
            .all(|s| !s.trim().is_empty())
    }
}

/// Personal data that may accompany a purchase request.
///
/// Every field is optional; which ones are required depends on the
/// registration tier the purchase demands.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    /// ISO-8601 date, `YYYY-MM-DD`.
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default)]
    pub address: Option<Address>,
    #[serde(default)]
    pub terms_accepted: bool,
}

impl Profile {
    /// Overlay `newer` on top of `self`. Supplied values win; terms acceptance
    /// is sticky once given.
    pub fn merged_with(&self, newer: &Profile) -> Profile {
        Profile {
            first_name: newer.first_name.clone().or_else(|| self.first_name.clone()),
            last_name: newer.last_name.clone().or_else(|| self.last_name.clone()),
            date_of_birth: newer
                .date_of_birth
                .clone()
                .or_else(|| self.date_of_birth.clone()),
            address: newer.address.clone().or_else(|| self.address.clone()),
            terms_accepted: self.terms_accepted || newer.terms_accepted,
        }
    }
}

/// A registered user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub registration_level: RegistrationLevel,
    pub profile: Profile,
    /// Set once cumulative spend crosses the corsair threshold. Never cleared.
    pub corsair_connect_flag: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(RegistrationLevel::Minimal < RegistrationLevel::Standard);
        assert!(RegistrationLevel::Standard < RegistrationLevel::Full);
        assert_eq!(
            RegistrationLevel::Minimal.max(RegistrationLevel::Full),
            RegistrationLevel::Full
        );
    }

    #[test]
    fn test_level_round_trip_labels() {
        assert_eq!("full".parse::<RegistrationLevel>(), Ok(RegistrationLevel::Full));
        assert!("gold".parse::<RegistrationLevel>().is_err());
    }

    #[test]
    fn test_profile_merge_keeps_existing_fields() {
        let stored = Profile {
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            terms_accepted: true,
            ..Profile::default()
        };
        let incoming = Profile {
            date_of_birth: Some("1990-01-01".into()),
            ..Profile::default()
        };
        let merged = stored.merged_with(&incoming);
        assert_eq!(merged.first_name.as_deref(), Some("Ada"));
        assert_eq!(merged.date_of_birth.as_deref(), Some("1990-01-01"));
        assert!(merged.terms_accepted);
    }

    #[test]
    fn test_address_completeness() {
        let mut address = Address {
            street: "1 Quay".into(),
            city: "Lyon".into(),
            postal_code: "69001".into(),
            country: "FR".into(),
        };
        assert!(address.is_complete());
        address.city = "  ".into();
        assert!(!address.is_complete());
    }
}
