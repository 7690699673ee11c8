//! Wire types for the remote identity service.

use serde::{Deserialize, Serialize};

// Request bodies carry the password, so they deliberately have no Debug.

/// `POST /login` body.
#[derive(Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// `POST /register` body. The service speaks the form's camelCase names.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub country: &'a str,
    pub agree_to_terms: bool,
}

/// Successful login response.
#[derive(Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
}

/// Registration acknowledgement (`{"msg": ...}`).
#[derive(Deserialize, Debug, Clone)]
pub struct Ack {
    #[serde(rename = "msg")]
    pub message: String,
}

/// Error body the service sends with non-2xx statuses.
#[derive(Deserialize, Debug)]
pub struct ErrorResponse {
    pub detail: String,
}

/// Token and identity data from a successful submission. `account_email` is
/// only known for password logins; face logins identify the account on the
/// server side and return the token alone.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub session_token: String,
    pub account_email: Option<String>,
}
