use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::error::{AppError, FieldErrors};

use super::{
    dto::SignupRequest,
    manager::{normalize_email, UserManager},
    model::{User, UserDraft, EMAIL_MAX_LENGTH, FIRST_NAME_MAX_LENGTH, LAST_NAME_MAX_LENGTH},
    policy::{PasswordPolicy, UserAttributes},
};

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";
const NULL_CHARACTERS: &str = "Null characters are not allowed.";

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Signup input that passed every field rule and the password policy.
pub struct ValidSignup {
    first_name: String,
    last_name: String,
    email: String,
    password: String,
}

impl std::fmt::Debug for ValidSignup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidSignup")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Trims the value, then checks presence, length and NUL characters.
fn required<'a>(
    errors: &mut FieldErrors,
    field: &str,
    value: &'a Option<String>,
    max_len: Option<usize>,
) -> Option<&'a str> {
    let Some(value) = value.as_deref().map(str::trim) else {
        errors.add(field, REQUIRED);
        return None;
    };
    if value.is_empty() {
        errors.add(field, BLANK);
        return None;
    }
    let mut ok = true;
    if let Some(max) = max_len {
        if value.chars().count() > max {
            errors.add(
                field,
                format!("Ensure this field has no more than {max} characters."),
            );
            ok = false;
        }
    }
    if value.contains('\0') {
        errors.add(field, NULL_CHARACTERS);
        ok = false;
    }
    ok.then_some(value)
}

impl ValidSignup {
    /// Collects every violation before failing, so the caller sees them all.
    pub fn validate(req: SignupRequest, policy: &PasswordPolicy) -> Result<Self, AppError> {
        let mut errors = FieldErrors::new();

        let first_name = required(&mut errors, "first_name", &req.first_name, Some(FIRST_NAME_MAX_LENGTH));
        let last_name = required(&mut errors, "last_name", &req.last_name, Some(LAST_NAME_MAX_LENGTH));
        let email = required(&mut errors, "email", &req.email, Some(EMAIL_MAX_LENGTH))
            .filter(|email| {
                let ok = is_valid_email(email);
                if !ok {
                    errors.add("email", "Enter a valid email address.");
                }
                ok
            });
        let password = required(&mut errors, "password", &req.password, None);

        if let Some(password) = password {
            let attrs = UserAttributes {
                email: email.unwrap_or_default(),
                first_name: first_name.unwrap_or_default(),
                last_name: last_name.unwrap_or_default(),
            };
            if let Err(violations) = policy.validate(password, &attrs) {
                errors.extend("password", violations);
            }
        }

        match (first_name, last_name, email, password) {
            (Some(first_name), Some(last_name), Some(email), Some(password)) if errors.is_empty() => {
                Ok(Self {
                    first_name: first_name.to_string(),
                    last_name: last_name.to_string(),
                    email: normalize_email(email),
                    password: password.to_string(),
                })
            }
            _ => {
                warn!(fields = ?errors, "signup rejected");
                Err(AppError::Validation(errors))
            }
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Builds the record, hashes the password and persists it.
    #[instrument(skip_all)]
    pub async fn create(self, manager: &UserManager) -> Result<User, AppError> {
        let mut draft = UserDraft::new(self.email).with_names(self.first_name, self.last_name);
        draft.set_password(&self.password)?;
        let user = manager.register(draft).await?;
        info!(user_id = %user.id, email = %user.email, "user signed up");
        Ok(user)
    }
}
