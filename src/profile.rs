use std::{fmt, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static ALPHABETIC: OnceLock<Regex> = OnceLock::new();
static PHONE: OnceLock<Regex> = OnceLock::new();
static EMAIL: OnceLock<Regex> = OnceLock::new();

fn alphabetic_pattern() -> &'static Regex {
    ALPHABETIC.get_or_init(|| Regex::new(r"^[A-Za-z]+$").expect("name pattern is valid"))
}

fn phone_pattern() -> &'static Regex {
    PHONE.get_or_init(|| Regex::new(r"^\d{10,12}$").expect("phone pattern is valid"))
}

fn email_pattern() -> &'static Regex {
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

/// Validated profile as sent to the registration collaborator. Names and
/// email are lower-cased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRecord {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

impl RegistrationRecord {
    /// Identifier that prefixes every table this user creates.
    pub fn user_identifier(&self) -> &str {
        &self.first_name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    FirstName,
    LastName,
    Email,
    Phone,
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProfileField::FirstName => "first name",
            ProfileField::LastName => "last name",
            ProfileField::Email => "email",
            ProfileField::Phone => "phone number",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: ProfileField,
    pub message: &'static str,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid profile: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct ProfileErrors(pub Vec<FieldError>);

impl ProfileErrors {
    pub fn fields(&self) -> impl Iterator<Item = ProfileField> + '_ {
        self.0.iter().map(|error| error.field)
    }
}

impl ProfileForm {
    pub fn validate(&self) -> Result<RegistrationRecord, ProfileErrors> {
        let mut errors = Vec::new();
        let mut check = |field, value: &str, pattern: &Regex, shape: &'static str| {
            let message = if value.is_empty() {
                "is required"
            } else if !pattern.is_match(value) {
                shape
            } else {
                return;
            };
            errors.push(FieldError { field, message });
        };
        check(
            ProfileField::FirstName,
            self.first_name.trim(),
            alphabetic_pattern(),
            "must contain only letters",
        );
        check(
            ProfileField::LastName,
            self.last_name.trim(),
            alphabetic_pattern(),
            "must contain only letters",
        );
        check(
            ProfileField::Email,
            self.email.trim(),
            email_pattern(),
            "must be a valid email address",
        );
        check(
            ProfileField::Phone,
            self.phone.trim(),
            phone_pattern(),
            "must be 10 to 12 digits",
        );
        if !errors.is_empty() {
            return Err(ProfileErrors(errors));
        }
        Ok(RegistrationRecord {
            first_name: self.first_name.trim().to_lowercase(),
            last_name: self.last_name.trim().to_lowercase(),
            email: self.email.trim().to_lowercase(),
            phone: self.phone.trim().to_string(),
        })
    }
}
