use crate::capture::CapturedFrame;
use crate::common::{AuthFlowError, Result, ServiceConfig};
use crate::service::protocol::{
    Ack, AuthResult, ErrorResponse, LoginRequest, RegisterRequest, TokenResponse,
};
use crate::validate::{CredentialRecord, RegistrationProfile};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use std::future::Future;
use std::time::Duration;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// The submission boundary. One outbound request per call; no retries, no
/// deduplication — retry policy belongs to the caller.
pub trait SubmissionApi {
    fn submit_password(
        &self,
        record: &CredentialRecord,
    ) -> impl Future<Output = Result<AuthResult>> + Send;

    fn submit_face_password(
        &self,
        frame: &CapturedFrame,
    ) -> impl Future<Output = Result<AuthResult>> + Send;

    fn submit_registration(
        &self,
        profile: &RegistrationProfile,
    ) -> impl Future<Output = Result<Ack>> + Send;

    fn submit_face_registration(
        &self,
        profile: &RegistrationProfile,
        frame: &CapturedFrame,
    ) -> impl Future<Output = Result<Ack>> + Send;
}

/// HTTP client for the identity service.
pub struct HttpSubmissionClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSubmissionClient {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn face_part(frame: &CapturedFrame) -> Result<Part> {
        let part = Part::bytes(frame.bytes.clone())
            .file_name("face.jpg")
            .mime_str(&frame.mime_type)?;
        Ok(part)
    }

    /// Maps non-2xx responses onto the error taxonomy, surfacing the
    /// service's `detail` message where the user can act on it.
    async fn classify_failure(response: Response) -> AuthFlowError {
        let status = response.status();
        let detail = match response.json::<ErrorResponse>().await {
            Ok(body) => body.detail,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        };

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                AuthFlowError::InvalidCredentials(detail)
            }
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                AuthFlowError::ServerValidationError(detail)
            }
            other => AuthFlowError::ServerError(other.as_u16()),
        }
    }

    async fn token_from(response: Response) -> Result<TokenResponse> {
        if !response.status().is_success() {
            return Err(Self::classify_failure(response).await);
        }
        Ok(response.json::<TokenResponse>().await?)
    }

    async fn ack_from(response: Response) -> Result<Ack> {
        if !response.status().is_success() {
            return Err(Self::classify_failure(response).await);
        }
        Ok(response.json::<Ack>().await?)
    }
}

impl SubmissionApi for HttpSubmissionClient {
    async fn submit_password(&self, record: &CredentialRecord) -> Result<AuthResult> {
        tracing::debug!("submitting password login for {}", record.email);

        let response = self
            .http
            .post(self.endpoint("/login"))
            .json(&LoginRequest {
                email: &record.email,
                password: &record.password,
            })
            .send()
            .await?;

        let token = Self::token_from(response).await?;
        Ok(AuthResult {
            session_token: token.access_token,
            account_email: Some(record.email.clone()),
        })
    }

    async fn submit_face_password(&self, frame: &CapturedFrame) -> Result<AuthResult> {
        tracing::debug!("submitting face login ({} byte frame)", frame.bytes.len());

        let form = Form::new().part("face_image", Self::face_part(frame)?);
        let response = self
            .http
            .post(self.endpoint("/login-face"))
            .multipart(form)
            .send()
            .await?;

        let token = Self::token_from(response).await?;
        Ok(AuthResult {
            session_token: token.access_token,
            account_email: None,
        })
    }

    async fn submit_registration(&self, profile: &RegistrationProfile) -> Result<Ack> {
        tracing::debug!("submitting registration for {}", profile.email);

        let response = self
            .http
            .post(self.endpoint("/register"))
            .json(&RegisterRequest {
                first_name: &profile.first_name,
                last_name: &profile.last_name,
                email: &profile.email,
                password: &profile.password,
                country: &profile.country,
                agree_to_terms: profile.agreed_to_terms,
            })
            .send()
            .await?;

        Self::ack_from(response).await
    }

    async fn submit_face_registration(
        &self,
        profile: &RegistrationProfile,
        frame: &CapturedFrame,
    ) -> Result<Ack> {
        tracing::debug!("submitting face registration for {}", profile.email);

        // The service reads multipart text fields under their snake_case
        // names and parses the terms flag from its string form.
        let form = Form::new()
            .text("first_name", profile.first_name.clone())
            .text("last_name", profile.last_name.clone())
            .text("email", profile.email.clone())
            .text("password", profile.password.clone())
            .text("country", profile.country.clone())
            .text("agree_to_terms", profile.agreed_to_terms.to_string())
            .part("face_image", Self::face_part(frame)?);

        let response = self
            .http
            .post(self.endpoint("/register-face"))
            .multipart(form)
            .send()
            .await?;

        Self::ack_from(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &mockito::ServerGuard) -> HttpSubmissionClient {
        HttpSubmissionClient::new(&ServiceConfig {
            base_url: server.url(),
            timeout_seconds: 5,
        })
        .unwrap()
    }

    fn credentials() -> CredentialRecord {
        CredentialRecord {
            email: "a@b.com".to_string(),
            password: "secret1".to_string(),
        }
    }

    fn profile() -> RegistrationProfile {
        RegistrationProfile {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            password: "secret1".to_string(),
            country: "UK".to_string(),
            agreed_to_terms: true,
        }
    }

    fn frame() -> CapturedFrame {
        CapturedFrame {
            bytes: b"fake-jpeg-bytes".to_vec(),
            mime_type: "image/jpeg".to_string(),
            width: 640,
            height: 480,
        }
    }

    #[tokio::test]
    async fn password_login_returns_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/login")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "email": "a@b.com",
                "password": "secret1",
            })))
            .with_status(200)
            .with_body(r#"{"access_token":"t1"}"#)
            .create_async()
            .await;

        let result = client(&server).submit_password(&credentials()).await.unwrap();
        assert_eq!(result.session_token, "t1");
        assert_eq!(result.account_email.as_deref(), Some("a@b.com"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_is_invalid_credentials() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/login")
            .with_status(401)
            .with_body(r#"{"detail":"Invalid credentials"}"#)
            .create_async()
            .await;

        let err = client(&server)
            .submit_password(&credentials())
            .await
            .unwrap_err();
        match err {
            AuthFlowError::InvalidCredentials(detail) => {
                assert_eq!(detail, "Invalid credentials");
            }
            other => panic!("expected InvalidCredentials, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn five_hundred_is_server_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/login")
            .with_status(500)
            .create_async()
            .await;

        let err = client(&server)
            .submit_password(&credentials())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthFlowError::ServerError(500)));
    }

    #[tokio::test]
    async fn transport_failure_is_network_error() {
        // Nothing is listening here.
        let dead = HttpSubmissionClient::new(&ServiceConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_seconds: 1,
        })
        .unwrap();

        let err = dead.submit_password(&credentials()).await.unwrap_err();
        assert!(matches!(err, AuthFlowError::Network(_)));
    }

    #[tokio::test]
    async fn face_login_sends_multipart_frame() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/login-face")
            .match_header(
                "content-type",
                mockito::Matcher::Regex("^multipart/form-data".to_string()),
            )
            .match_body(mockito::Matcher::Regex("face_image".to_string()))
            .with_status(200)
            .with_body(r#"{"access_token":"t2"}"#)
            .create_async()
            .await;

        let result = client(&server)
            .submit_face_password(&frame())
            .await
            .unwrap();
        assert_eq!(result.session_token, "t2");
        assert!(result.account_email.is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn registration_acks() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/register")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "firstName": "Ada",
                "agreeToTerms": true,
            })))
            .with_status(200)
            .with_body(r#"{"msg":"Registration successful"}"#)
            .create_async()
            .await;

        let ack = client(&server).submit_registration(&profile()).await.unwrap();
        assert_eq!(ack.message, "Registration successful");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn remote_validation_rejection_is_distinct() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/register-face")
            .with_status(422)
            .with_body(r#"{"detail":"No face detected"}"#)
            .create_async()
            .await;

        let err = client(&server)
            .submit_face_registration(&profile(), &frame())
            .await
            .unwrap_err();
        match err {
            AuthFlowError::ServerValidationError(detail) => {
                assert_eq!(detail, "No face detected");
            }
            other => panic!("expected ServerValidationError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn face_registration_carries_all_fields() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/register-face")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::Regex("first_name".to_string()),
                mockito::Matcher::Regex("agree_to_terms".to_string()),
                mockito::Matcher::Regex("face_image".to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"msg":"Face registration successful"}"#)
            .create_async()
            .await;

        let ack = client(&server)
            .submit_face_registration(&profile(), &frame())
            .await
            .unwrap();
        assert_eq!(ack.message, "Face registration successful");
        mock.assert_async().await;
    }
}
