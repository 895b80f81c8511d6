//! Sign-up and sign-in input validation, and user-facing auth error messages.

use crate::auth::{AuthError, Profile, SignUpRequest};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    Email,
    Password,
    Confirm,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("Please enter a valid email address.")]
    InvalidEmail,
    #[error("Password must be at least 6 characters long.")]
    PasswordTooShort,
    #[error("Passwords must match")]
    PasswordMismatch,
}

impl FormError {
    #[must_use]
    pub fn field(&self) -> Field {
        match self {
            Self::InvalidEmail => Field::Email,
            Self::PasswordTooShort => Field::Password,
            Self::PasswordMismatch => Field::Confirm,
        }
    }
}

#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

#[derive(Debug)]
pub struct SignUpForm {
    pub email: String,
    pub password: SecretString,
    pub confirm: SecretString,
    pub profile: Profile,
}

impl SignUpForm {
    /// Check every field and collect all failures, one per field.
    ///
    /// # Errors
    /// Returns the failing fields when the form cannot be submitted.
    pub fn validate(self) -> Result<SignUpRequest, Vec<FormError>> {
        let mut errors = Vec::new();
        let email = self.email.trim().to_string();

        if !valid_email(&email) {
            errors.push(FormError::InvalidEmail);
        }

        if self.password.expose_secret().chars().count() < MIN_PASSWORD_LENGTH {
            errors.push(FormError::PasswordTooShort);
        } else if self.password.expose_secret() != self.confirm.expose_secret() {
            errors.push(FormError::PasswordMismatch);
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(SignUpRequest {
            email,
            password: self.password,
            profile: self.profile,
        })
    }
}

/// Message shown when the service rejects a sign-up.
#[must_use]
pub fn sign_up_error_message(err: &AuthError) -> String {
    match err {
        AuthError::AlreadyRegistered => {
            "An account with this email already exists. Please sign in instead.".to_string()
        }
        AuthError::InvalidEmail(_) => FormError::InvalidEmail.to_string(),
        AuthError::WeakPassword(_) => FormError::PasswordTooShort.to_string(),
        err if err.is_service_failure() => "Something went wrong. Please try again.".to_string(),
        err => err.to_string(),
    }
}

/// Message shown when the service rejects a sign-in.
#[must_use]
pub fn sign_in_error_message(err: &AuthError) -> String {
    match err {
        AuthError::InvalidCredentials => "Invalid email or password".to_string(),
        AuthError::EmailNotConfirmed => "Please confirm your email before signing in".to_string(),
        err if err.is_service_failure() => "Failed to sign in. Please try again.".to_string(),
        err => err.to_string(),
    }
}
