use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::{FromRow, PgConnection, PgExecutor};
use uuid::Uuid;

use super::column::{Column, ColumnType, Schema};
use super::{require, writable_fields, Document, Model, ValidationErrors};
use crate::auth::password::hash_password;
use crate::config;
use crate::database::manager::DatabaseError;
use crate::error::ApiError;
use crate::services::ratings;

pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    User,
    Guide,
    LeadGuide,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::User, Role::Guide, Role::LeadGuide, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Guide => "guide",
            Role::LeadGuide => "lead-guide",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == value)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(String);

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Role::parse(&value).ok_or(UnknownRole(value))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user row as the auth layer needs it. Secrets are never serialised.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub photo: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    #[serde(skip)]
    pub password: String,
    #[serde(skip)]
    pub password_changed_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub password_reset_token: Option<String>,
    #[serde(skip)]
    pub password_reset_expires: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

pub static USER_SCHEMA: Schema = Schema {
    table: "users",
    columns: &[
        Column::new("id", "id", ColumnType::Uuid).readonly(),
        Column::new("name", "name", ColumnType::Text),
        Column::new("email", "email", ColumnType::Text),
        Column::new("photo", "photo", ColumnType::Text),
        Column::new("role", "role", ColumnType::Text),
        Column::new("password", "password", ColumnType::Text).hidden(),
        Column::new("passwordChangedAt", "password_changed_at", ColumnType::Timestamp).hidden().readonly(),
        Column::new("passwordResetToken", "password_reset_token", ColumnType::Text).hidden().readonly(),
        Column::new("passwordResetExpires", "password_reset_expires", ColumnType::Timestamp).hidden().readonly(),
        Column::new("active", "active", ColumnType::Boolean).hidden().readonly(),
        Column::new("createdAt", "created_at", ColumnType::Timestamp).readonly(),
    ],
};

const USER_COLUMNS: &str = "id, name, email, photo, role, password, password_changed_at, \
     password_reset_token, password_reset_expires, active, created_at";

#[async_trait]
impl Model for User {
    fn schema() -> &'static Schema {
        &USER_SCHEMA
    }

    fn base_filter() -> Option<Value> {
        Some(json!({ "active": true }))
    }

    fn validate(body: &Document, existing: Option<&Value>) -> Result<Document, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut doc = writable_fields(&USER_SCHEMA, body, &mut errors);

        require(&doc, existing, "name", "Please tell us your name!", &mut errors);
        require(&doc, existing, "email", "Please provide your email", &mut errors);

        if let Some(email) = doc.get("email").and_then(Value::as_str) {
            if !email.is_empty() && !is_valid_email(email) {
                errors.add("email", "Please provide a valid email");
            }
            let lowered = email.to_lowercase();
            doc.insert("email".to_string(), Value::String(lowered));
        }

        if let Some(role) = doc.get("role").and_then(Value::as_str) {
            if Role::parse(role).is_none() {
                errors.add("role", "Role is either: user, guide, lead-guide, admin");
            }
        }

        if existing.is_some() {
            // Passwords only change through the dedicated password flows
            doc.remove("password");
        } else {
            let password = body.get("password").and_then(Value::as_str);
            let confirm = body.get("passwordConfirm").and_then(Value::as_str);
            if let Err((field, message)) = check_new_password(password, confirm) {
                errors.add(field, message);
            }
            // Stored as typed, never trimmed
            if let Some(password) = password {
                doc.insert("password".to_string(), Value::String(password.to_string()));
            }
        }

        errors.finish(doc)
    }

    async fn prepare(
        _conn: &mut PgConnection,
        doc: &mut Document,
        _existing: Option<&Value>,
    ) -> Result<(), ApiError> {
        if let Some(password) = doc.get("password").and_then(Value::as_str) {
            let hashed = hash_password(password, config::config().security.bcrypt_cost).await?;
            doc.insert("password".to_string(), Value::String(hashed));
        }
        Ok(())
    }

    /// Deleting a user cascades to their reviews
    async fn after_write(
        conn: &mut PgConnection,
        before: Option<&Value>,
        after: Option<&Value>,
    ) -> Result<(), DatabaseError> {
        if before.is_some() && after.is_none() {
            ratings::recompute_all(&mut *conn).await?;
        }
        Ok(())
    }
}

/// Length and confirmation rules for a new password
pub fn check_new_password(
    password: Option<&str>,
    confirm: Option<&str>,
) -> Result<(), (&'static str, &'static str)> {
    let password = match password {
        Some(p) if !p.is_empty() => p,
        _ => return Err(("password", "Please provide a password")),
    };
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(("password", "A password must have more or equal then 8 characters"));
    }
    match confirm {
        Some(c) if !c.is_empty() => {
            if c == password {
                Ok(())
            } else {
                Err(("passwordConfirm", "Passwords are not the same!"))
            }
        }
        _ => Err(("passwordConfirm", "Please confirm your password")),
    }
}

/// `local@domain.tld` with no whitespace
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

impl User {
    pub fn has_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }

    /// Whether the password changed after a token issued at `iat` (unix seconds)
    pub fn changed_password_after(&self, iat: i64) -> bool {
        self.password_changed_at
            .is_some_and(|changed| changed.timestamp() > iat)
    }

    pub async fn find_active<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1 AND active",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_email<'e, E: PgExecutor<'e>>(executor: E, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1 AND active",
            USER_COLUMNS
        ))
        .bind(email.trim().to_lowercase())
        .fetch_optional(executor)
        .await
    }

    /// User holding an unexpired reset token with the given hash
    pub async fn find_by_reset_token<'e, E: PgExecutor<'e>>(
        executor: E,
        token_hash: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE password_reset_token = $1 AND password_reset_expires > now() AND active",
            USER_COLUMNS
        ))
        .bind(token_hash)
        .fetch_optional(executor)
        .await
    }

    /// Store (or clear, with `None`) a password-reset token hash
    pub async fn set_reset_token<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
        token: Option<(&str, DateTime<Utc>)>,
    ) -> Result<(), sqlx::Error> {
        let (hash, expires) = token.map_or((None, None), |(hash, expires)| (Some(hash), Some(expires)));
        sqlx::query("UPDATE users SET password_reset_token = $2, password_reset_expires = $3 WHERE id = $1")
            .bind(id)
            .bind(hash)
            .bind(expires)
            .execute(executor)
            .await?;
        Ok(())
    }

    /// Replace the password hash and clear any reset token.
    ///
    /// `password_changed_at` is backdated one second so a token issued right
    /// after the change is still accepted.
    pub async fn set_password<'e, E: PgExecutor<'e>>(
        executor: E,
        id: Uuid,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        let changed_at = Utc::now() - Duration::seconds(1);
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET password = $2, password_changed_at = $3, \
             password_reset_token = NULL, password_reset_expires = NULL \
             WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(password_hash)
        .bind(changed_at)
        .fetch_one(executor)
        .await
    }

    /// Soft delete
    pub async fn deactivate<'e, E: PgExecutor<'e>>(executor: E, id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET active = false WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;
        Ok(())
    }
}
