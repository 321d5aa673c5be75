use lazy_static::lazy_static;
use regex::Regex;
use sqlx::PgPool;
use tracing::info;

use crate::auth::password::{hash_password, PASSWORD_LENGTH};
use crate::auth::repo::{NewUser, Role, User};
use crate::error::{is_unique_violation, ApiError, ValidationErrors};
use crate::jobs::Job;
use crate::state::AppState;
use crate::token::{urlsafe_token, MAX_TOKEN_ATTEMPTS};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Registration input as the service sees it. The HTTP layer fills role and
/// leaves the token unset; seed/import paths may carry a pre-issued token.
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub verification_token: Option<String>,
}

pub(crate) fn validate_registration(
    name: &str,
    email: &str,
    password: &str,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    if name.trim().is_empty() {
        errors.add("name", "can't be blank");
    }
    if email.is_empty() {
        errors.add("email", "can't be blank");
    } else if !is_valid_email(email) {
        errors.add("email", "is not a valid email address");
    }
    if !PASSWORD_LENGTH.contains(&password.chars().count()) {
        errors.add(
            "password",
            format!(
                "must be between {} and {} characters",
                PASSWORD_LENGTH.start(),
                PASSWORD_LENGTH.end()
            ),
        );
    }
    errors.into_result()
}

/// Returns a pre-issued token untouched; otherwise mints one that no other
/// user holds, giving up after a bounded number of collisions.
pub async fn issue_verification_token(
    db: &PgPool,
    preset: Option<String>,
) -> Result<String, ApiError> {
    if let Some(token) = preset {
        return Ok(token);
    }
    for _ in 0..MAX_TOKEN_ATTEMPTS {
        let candidate = urlsafe_token();
        if User::find_by_verification_token(db, &candidate)
            .await?
            .is_none()
        {
            return Ok(candidate);
        }
    }
    Err(ApiError::Conflict(
        "could not allocate a verification token".into(),
    ))
}

pub async fn register_user(state: &AppState, reg: Registration) -> Result<User, ApiError> {
    let email = reg.email.trim().to_lowercase();
    validate_registration(&reg.name, &email, &reg.password)?;

    if User::find_by_email(&state.db, &email).await?.is_some() {
        let mut errors = ValidationErrors::new();
        errors.add("email", "has already been taken");
        return Err(errors.into());
    }

    let password_hash = hash_password(&reg.password)?;
    let verification_token =
        issue_verification_token(&state.db, reg.verification_token).await?;

    let new_user = NewUser {
        name: reg.name,
        email,
        password_hash,
        role: reg.role,
        verification_token: Some(verification_token),
    };
    let user = User::create(&state.db, &new_user).await.map_err(|e| {
        // Lost the race on the email or token unique index.
        if is_unique_violation(&e) {
            ApiError::Conflict("email or token already taken".into())
        } else {
            ApiError::Internal(e.into())
        }
    })?;

    if user.role == Role::Customer {
        state.jobs.enqueue(Job::SendVerificationEmail { user_id: user.id });
    }
    info!(user_id = %user.id, email = %user.email, role = ?user.role, "user registered");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;

    #[test]
    fn accepts_plain_addresses() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last@sub.example.co"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn registration_requires_name_email_and_password_policy() {
        let errors = validate_registration("", "bad", "short").unwrap_err();
        assert!(!errors.field_messages("name").is_empty());
        assert!(!errors.field_messages("email").is_empty());
        assert!(!errors.field_messages("password").is_empty());
    }

    #[test]
    fn password_bounds_are_inclusive() {
        assert!(validate_registration("Ann", "ann@example.com", "sixsix").is_ok());
        assert!(validate_registration("Ann", "ann@example.com", &"x".repeat(20)).is_ok());
        assert!(validate_registration("Ann", "ann@example.com", &"x".repeat(21)).is_err());
        assert!(validate_registration("Ann", "ann@example.com", "five5").is_err());
    }

    #[tokio::test]
    async fn preseeded_verification_token_is_kept_unchanged() {
        // The preset branch never touches the database, so the lazy fake
        // pool is safe here.
        let state = AppState::fake();
        let token = issue_verification_token(&state.db, Some("seeded-token".into()))
            .await
            .unwrap();
        assert_eq!(token, "seeded-token");
    }
}
