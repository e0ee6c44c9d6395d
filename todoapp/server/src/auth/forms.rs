use serde::Deserialize;

pub const USERNAME_MAX_LENGTH: usize = 150;
pub const PASSWORD_MIN_LENGTH: usize = 8;

pub const FIELD_REQUIRED: &str = "This field is required.";
pub const INVALID_USERNAME: &str = concat!(
    "Enter a valid username. This value may contain only letters, ",
    "numbers, and @/./+/-/_ characters."
);
pub const DUPLICATE_USERNAME: &str = "A user with that username already exists.";
pub const PASSWORD_MISMATCH: &str = "The two password fields didn’t match.";
pub const PASSWORD_ENTIRELY_NUMERIC: &str = "This password is entirely numeric.";

/// Form payload posted by the login page.
#[derive(serde::Deserialize, Debug, Default)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Form payload posted by the logout button.
#[derive(Deserialize, Debug, Default)]
pub struct LogoutRequest {
    #[serde(default)]
    pub csrfmiddlewaretoken: String,
}

/// Form payload posted by the signup page.
#[derive(Deserialize, Debug, Default)]
pub struct SignupRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

/// Field errors shown next to the signup form inputs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SignupErrors {
    pub username: Vec<String>,
    pub password1: Vec<String>,
    pub password2: Vec<String>,
}

impl SignupErrors {
    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password1.is_empty() && self.password2.is_empty()
    }

    /// Errors for a username that is already registered.
    pub fn duplicate_username() -> Self {
        Self {
            username: vec![DUPLICATE_USERNAME.to_string()],
            ..Default::default()
        }
    }
}

fn is_username_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_')
}

fn username_errors(username: &str) -> Vec<String> {
    if username.is_empty() {
        return vec![FIELD_REQUIRED.to_string()];
    }
    let mut errors = Vec::new();
    let length = username.chars().count();
    if length > USERNAME_MAX_LENGTH {
        errors.push(format!(
            "Ensure this value has at most {} characters (it has {}).",
            USERNAME_MAX_LENGTH, length
        ));
    }
    if !username.chars().all(is_username_char) {
        errors.push(INVALID_USERNAME.to_string());
    }
    errors
}

fn password_strength_errors(password: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        errors.push(format!(
            "This password is too short. It must contain at least {} characters.",
            PASSWORD_MIN_LENGTH
        ));
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        errors.push(PASSWORD_ENTIRELY_NUMERIC.to_string());
    }
    errors
}

impl SignupRequest {
    /// Validates the form without touching the database.
    ///
    /// Username uniqueness is checked by the user service on insert.
    pub fn validate(&self) -> Result<(), SignupErrors> {
        let mut errors = SignupErrors {
            username: username_errors(&self.username),
            ..Default::default()
        };

        if self.password1.is_empty() {
            errors.password1.push(FIELD_REQUIRED.to_string());
        }
        if self.password2.is_empty() {
            errors.password2.push(FIELD_REQUIRED.to_string());
        } else if !self.password1.is_empty() {
            if self.password1 != self.password2 {
                errors.password2.push(PASSWORD_MISMATCH.to_string());
            } else {
                errors
                    .password2
                    .extend(password_strength_errors(&self.password2));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
