//! User directory.

use rusqlite::{Connection, OptionalExtension, Row};
use reclaim_types::user::{Address, Profile, RegistrationLevel, User};

use crate::{DbError, Result};

const USER_COLUMNS: &str = "id, email, registration_level, first_name, last_name, date_of_birth,
     street, city, postal_code, country, terms_accepted, corsair_connect_flag,
     created_at, updated_at";

/// SQL expression ranking a stored level, for monotonic updates.
const LEVEL_RANK: &str =
    "CASE registration_level WHEN 'minimal' THEN 0 WHEN 'standard' THEN 1 ELSE 2 END";

/// Fetch a user by id.
pub fn get_by_id(conn: &Connection, id: &str) -> Result<User> {
    let raw = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            [id],
            RawUser::from_row,
        )
        .optional()?
        .ok_or_else(|| DbError::NotFound(format!("user '{id}'")))?;
    raw.into_user()
}

/// Find a user by email (case-insensitive).
pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let raw = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
            [normalize_email(email)],
            RawUser::from_row,
        )
        .optional()?;
    raw.map(RawUser::into_user).transpose()
}

/// Create a user at the given level.
///
/// The caller is responsible for checking that `profile` satisfies `level`.
pub fn insert(
    conn: &Connection,
    email: &str,
    level: RegistrationLevel,
    profile: &Profile,
) -> Result<User> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(DbError::Validation("email must not be empty".into()));
    }
    let now = crate::now();
    let user = User {
        id: crate::new_id(),
        email,
        registration_level: level,
        profile: profile.clone(),
        corsair_connect_flag: false,
        created_at: now,
        updated_at: now,
    };
    let address = user.profile.address.clone().unwrap_or_default();
    conn.execute(
        &format!(
            "INSERT INTO users ({USER_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12, ?12)"
        ),
        rusqlite::params![
            user.id,
            user.email,
            level.as_str(),
            user.profile.first_name,
            user.profile.last_name,
            user.profile.date_of_birth,
            non_empty(&address.street),
            non_empty(&address.city),
            non_empty(&address.postal_code),
            non_empty(&address.country),
            user.profile.terms_accepted,
            now as i64,
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            DbError::Conflict(format!("user '{}' already exists", user.email))
        }
        other => DbError::Sqlite(other),
    })?;
    tracing::debug!(user_id = %user.id, level = %level, "user created");
    Ok(user)
}

/// Raise a user's level and store the profile that justifies it.
///
/// Never lowers the level: an attempted downgrade is a validation error and
/// leaves the row untouched.
pub fn upgrade(
    conn: &Connection,
    id: &str,
    level: RegistrationLevel,
    profile: &Profile,
) -> Result<User> {
    let address = profile.address.clone().unwrap_or_default();
    let updated = conn.execute(
        &format!(
            "UPDATE users SET
                 registration_level = ?2,
                 first_name = ?3, last_name = ?4, date_of_birth = ?5,
                 street = ?6, city = ?7, postal_code = ?8, country = ?9,
                 terms_accepted = ?10, updated_at = ?11
             WHERE id = ?1 AND {LEVEL_RANK} <= ?12"
        ),
        rusqlite::params![
            id,
            level.as_str(),
            profile.first_name,
            profile.last_name,
            profile.date_of_birth,
            non_empty(&address.street),
            non_empty(&address.city),
            non_empty(&address.postal_code),
            non_empty(&address.country),
            profile.terms_accepted,
            crate::now() as i64,
            rank(level),
        ],
    )?;
    if updated == 0 {
        // Distinguish a missing user from a refused downgrade.
        let current = get_by_id(conn, id)?;
        return Err(DbError::Validation(format!(
            "cannot move user '{id}' from {} to {level}",
            current.registration_level
        )));
    }
    tracing::info!(user_id = id, level = %level, "user registration level raised");
    get_by_id(conn, id)
}

/// Set the corsair-connect flag. The flag only ever rises: passing `false`
/// leaves an already-set flag in place.
///
/// Returns whether this call changed the stored value.
pub fn set_threshold_flag(conn: &Connection, id: &str, flag: bool) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE users SET corsair_connect_flag = 1, updated_at = ?2
         WHERE id = ?1 AND ?3 AND corsair_connect_flag = 0",
        rusqlite::params![id, crate::now() as i64, flag],
    )?;
    if updated == 0 {
        // Surface a NotFound for unknown ids; otherwise it was a no-op.
        get_by_id(conn, id)?;
    }
    Ok(updated > 0)
}

fn rank(level: RegistrationLevel) -> i64 {
    match level {
        RegistrationLevel::Minimal => 0,
        RegistrationLevel::Standard => 1,
        RegistrationLevel::Full => 2,
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_empty(s: &str) -> Option<&str> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

struct RawUser {
    id: String,
    email: String,
    registration_level: String,
    first_name: Option<String>,
    last_name: Option<String>,
    date_of_birth: Option<String>,
    street: Option<String>,
    city: Option<String>,
    postal_code: Option<String>,
    country: Option<String>,
    terms_accepted: bool,
    corsair_connect_flag: bool,
    created_at: i64,
    updated_at: i64,
}

impl RawUser {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            registration_level: row.get(2)?,
            first_name: row.get(3)?,
            last_name: row.get(4)?,
            date_of_birth: row.get(5)?,
            street: row.get(6)?,
            city: row.get(7)?,
            postal_code: row.get(8)?,
            country: row.get(9)?,
            terms_accepted: row.get(10)?,
            corsair_connect_flag: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn into_user(self) -> Result<User> {
        let registration_level = self
            .registration_level
            .parse()
            .map_err(|e: reclaim_types::UnknownVariant| DbError::Serialization(e.to_string()))?;
        let has_address = self.street.is_some()
            || self.city.is_some()
            || self.postal_code.is_some()
            || self.country.is_some();
        let address = has_address.then(|| Address {
            street: self.street.unwrap_or_default(),
            city: self.city.unwrap_or_default(),
            postal_code: self.postal_code.unwrap_or_default(),
            country: self.country.unwrap_or_default(),
        });
        Ok(User {
            id: self.id,
            email: self.email,
            registration_level,
            profile: Profile {
                first_name: self.first_name,
                last_name: self.last_name,
                date_of_birth: self.date_of_birth,
                address,
                terms_accepted: self.terms_accepted,
            },
            corsair_connect_flag: self.corsair_connect_flag,
            created_at: self.created_at as u64,
            updated_at: self.updated_at as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        crate::open_memory().expect("open test db")
    }

    fn full_profile() -> Profile {
        Profile {
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            date_of_birth: Some("1990-12-10".into()),
            address: Some(Address {
                street: "1 Quay".into(),
                city: "Lyon".into(),
                postal_code: "69001".into(),
                country: "FR".into(),
            }),
            terms_accepted: true,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let conn = test_db();
        let user = insert(&conn, "A@X.com ", RegistrationLevel::Minimal, &Profile::default())
            .expect("insert");
        assert_eq!(user.email, "a@x.com");

        let found = find_by_email(&conn, "a@x.COM").expect("find").expect("some");
        assert_eq!(found.id, user.id);
        assert_eq!(found.profile.address, None);
        assert!(find_by_email(&conn, "b@x.com").expect("find").is_none());
    }

    #[test]
    fn test_duplicate_email_conflicts() {
        let conn = test_db();
        insert(&conn, "a@x.com", RegistrationLevel::Minimal, &Profile::default()).expect("first");
        let result = insert(&conn, "a@x.com", RegistrationLevel::Minimal, &Profile::default());
        assert!(matches!(result, Err(DbError::Conflict(_))));
    }

    #[test]
    fn test_upgrade_stores_profile() {
        let conn = test_db();
        let user = insert(&conn, "a@x.com", RegistrationLevel::Minimal, &Profile::default())
            .expect("insert");
        let upgraded =
            upgrade(&conn, &user.id, RegistrationLevel::Full, &full_profile()).expect("upgrade");
        assert_eq!(upgraded.registration_level, RegistrationLevel::Full);
        assert_eq!(upgraded.profile, full_profile());
    }

    #[test]
    fn test_upgrade_refuses_downgrade() {
        let conn = test_db();
        let user =
            insert(&conn, "a@x.com", RegistrationLevel::Full, &full_profile()).expect("insert");
        let result = upgrade(&conn, &user.id, RegistrationLevel::Minimal, &Profile::default());
        assert!(matches!(result, Err(DbError::Validation(_))));
        let still = get_by_id(&conn, &user.id).expect("get");
        assert_eq!(still.registration_level, RegistrationLevel::Full);
        assert_eq!(still.profile, full_profile());
    }

    #[test]
    fn test_upgrade_missing_user() {
        let conn = test_db();
        let result = upgrade(&conn, "ghost", RegistrationLevel::Full, &full_profile());
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_threshold_flag_is_monotonic() {
        let conn = test_db();
        let user = insert(&conn, "a@x.com", RegistrationLevel::Minimal, &Profile::default())
            .expect("insert");
        assert!(set_threshold_flag(&conn, &user.id, true).expect("raise"));
        assert!(!set_threshold_flag(&conn, &user.id, true).expect("again"));
        assert!(!set_threshold_flag(&conn, &user.id, false).expect("lower"));
        assert!(get_by_id(&conn, &user.id).expect("get").corsair_connect_flag);
        assert!(set_threshold_flag(&conn, "ghost", true).is_err());
    }
}
