use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::auth::{session::extract_token, validate_jwt};
use crate::database::models::{Role, User};
use crate::error::ApiError;
use crate::state::AppState;

/// The logged-in user, resolved from the session token.
///
/// Rejects with 401 when the token is missing or invalid, the user no longer
/// exists or is inactive, or the password changed after the token was issued.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> Uuid {
        self.0.id
    }

    pub fn role(&self) -> Role {
        self.0.role
    }

    /// 403 unless the user holds one of `roles`
    pub fn restrict_to(&self, roles: &[Role]) -> Result<(), ApiError> {
        if self.0.has_role(roles) {
            Ok(())
        } else {
            tracing::warn!(user = %self.0.id, role = %self.0.role, "forbidden");
            Err(ApiError::forbidden("You do not have permission to perform this action"))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(current) = parts.extensions.get::<CurrentUser>() {
            return Ok(current.clone());
        }

        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("You are not logged in! Please log in to get access."))?;

        let claims = validate_jwt(&token).map_err(|e| {
            tracing::warn!("rejected session token: {}", e);
            ApiError::from(e)
        })?;

        let user = User::find_active(&state.pool, claims.id)
            .await?
            .ok_or_else(|| ApiError::unauthorized("The user belonging to this token does no longer exist."))?;

        if user.changed_password_after(claims.iat) {
            return Err(ApiError::unauthorized("User recently changed password! Please log in again."));
        }

        let current = CurrentUser(user);
        parts.extensions.insert(current.clone());
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(role: Role) -> CurrentUser {
        CurrentUser(User {
            id: Uuid::new_v4(),
            name: "Leo Gillespie".into(),
            email: "leo@example.com".into(),
            photo: "default.jpg".into(),
            role,
            password: String::new(),
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            active: true,
            created_at: Utc::now(),
        })
    }

    #[test]
    fn restrict_to_allows_listed_roles_only() {
        let guide = user(Role::Guide);
        assert!(guide.restrict_to(&[Role::Admin, Role::LeadGuide, Role::Guide]).is_ok());

        let err = guide.restrict_to(&[Role::Admin, Role::LeadGuide]).unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(err.message(), "You do not have permission to perform this action");
    }
}
