pub mod assessments;
pub mod health;
pub mod login;
pub mod logout;
pub mod patients;
pub mod predict;
pub mod profile;
pub mod register;

pub use assessments::{all_assessments, predictions_log};
pub use health::health;
pub use login::login;
pub use logout::logout;
pub use patients::{patient_assessments, patients};
pub use predict::{predict, predict_form};
pub use profile::{profile, update_profile};
pub use register::register;

use crate::api::error::FieldError;

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Username policy: at least three characters, letters/digits/`_`/`-` only.
pub fn validate_username(username: &str) -> Option<FieldError> {
    if username.chars().count() < MIN_USERNAME_LENGTH {
        return Some(FieldError::new(
            "username",
            format!("must be at least {MIN_USERNAME_LENGTH} characters"),
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Some(FieldError::new(
            "username",
            "may only contain letters, digits, '_' and '-'",
        ));
    }

    None
}

pub fn validate_password(password: &str) -> Option<FieldError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Some(FieldError::new(
            "password",
            format!("must be at least {MIN_PASSWORD_LENGTH} characters"),
        ));
    }

    None
}

/// Structural email check; deliverability is not our problem.
pub fn validate_email(email: &str) -> Option<FieldError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Some(FieldError::new("email", "must contain '@'"));
    };

    if local.is_empty() || domain.is_empty() || !domain.contains('.') || email.contains(' ') {
        return Some(FieldError::new("email", "is not a valid address"));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert!(validate_username("bob").is_none());
        assert!(validate_username("dr_house-2").is_none());

        assert!(validate_username("ab").is_some());
        assert!(validate_username("bad name").is_some());
        assert!(validate_username("naïve").is_some());
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password("hunter2!").is_none());
        assert!(validate_password("short").is_some());
    }

    #[test]
    fn test_email_rules() {
        assert!(validate_email("ana@example.com").is_none());

        assert!(validate_email("not-an-email").is_some());
        assert!(validate_email("@example.com").is_some());
        assert!(validate_email("ana@localhost").is_some());
        assert!(validate_email("ana maria@example.com").is_some());
    }
}
