//! Pure form validation. Mirrors the schema the identity service enforces
//! server-side; the server remains authoritative and anything it rejects is
//! surfaced separately as a `ServerValidationError`.

use crate::common::FieldErrors;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

const MIN_PASSWORD_LEN: usize = 6;
const MIN_NAME_LEN: usize = 2;

/// Raw login form input, as entered by the user.
#[derive(Clone, Default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginForm")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Raw registration form input.
#[derive(Clone, Default)]
pub struct RegistrationForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub country: String,
    pub agree_to_terms: bool,
}

impl fmt::Debug for RegistrationForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationForm")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("country", &self.country)
            .field("agree_to_terms", &self.agree_to_terms)
            .finish()
    }
}

/// A validated email/password pair. Held in memory only for the duration of
/// a submission; the password never appears in Debug output or logs.
#[derive(Clone)]
pub struct CredentialRecord {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A validated registration record. `agreed_to_terms` is always true here.
#[derive(Clone)]
pub struct RegistrationProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub country: String,
    pub agreed_to_terms: bool,
}

impl fmt::Debug for RegistrationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationProfile")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("country", &self.country)
            .field("agreed_to_terms", &self.agreed_to_terms)
            .finish()
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex is valid")
    })
}

fn check_email(email: &str, errors: &mut FieldErrors) {
    if !email_regex().is_match(email.trim()) {
        errors.insert("email", "Invalid email".to_string());
    }
}

fn check_password(password: &str, errors: &mut FieldErrors) {
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.insert(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        );
    }
}

/// Validates a login form. No I/O, no side effects; errors come back keyed
/// by field name so the UI can attach them to inputs.
pub fn validate_login(form: &LoginForm) -> Result<CredentialRecord, FieldErrors> {
    let mut errors = FieldErrors::new();
    check_email(&form.email, &mut errors);
    check_password(&form.password, &mut errors);

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(CredentialRecord {
        email: form.email.trim().to_string(),
        password: form.password.clone(),
    })
}

/// Validates a registration form.
pub fn validate_registration(
    form: &RegistrationForm,
) -> Result<RegistrationProfile, FieldErrors> {
    let mut errors = FieldErrors::new();

    if form.first_name.trim().chars().count() < MIN_NAME_LEN {
        errors.insert(
            "firstName",
            format!("First name must be at least {MIN_NAME_LEN} characters"),
        );
    }
    if form.last_name.trim().chars().count() < MIN_NAME_LEN {
        errors.insert(
            "lastName",
            format!("Last name must be at least {MIN_NAME_LEN} characters"),
        );
    }
    check_email(&form.email, &mut errors);
    check_password(&form.password, &mut errors);
    if form.country.trim().is_empty() {
        errors.insert("country", "Country is required".to_string());
    }
    if !form.agree_to_terms {
        errors.insert("agreeToTerms", "You must agree to the terms".to_string());
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(RegistrationProfile {
        first_name: form.first_name.trim().to_string(),
        last_name: form.last_name.trim().to_string(),
        email: form.email.trim().to_string(),
        password: form.password.clone(),
        country: form.country.trim().to_string(),
        agreed_to_terms: true,
    })
}
