//! The authentication flow state machine. Composes validation, the capture
//! session, the frame capturer and the submission client, and drives the
//! success/error/session-token lifecycle. One logical flow per controller
//! instance; suspension points are device acquisition, frame encoding and
//! network submission.

use crate::camera::{CaptureSession, FrameSink, MediaDevice, SessionStatus};
use crate::capture::capture_frame;
use crate::common::{AuthFlowError, Result};
use crate::service::protocol::AuthResult;
use crate::service::SubmissionApi;
use crate::storage::{self, StateStore, UserProfile};
use crate::validate::{
    validate_login, validate_registration, LoginForm, RegistrationForm, RegistrationProfile,
};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

const WELCOME_ROUTE: &str = "/welcome";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Validating,
    PasswordSubmitting,
    CaptureRequested,
    CaptureActive,
    FrameCaptured,
    FaceSubmitting,
    Success,
    Failed,
    Terminal,
}

impl FlowState {
    fn is_submitting(self) -> bool {
        matches!(self, FlowState::PasswordSubmitting | FlowState::FaceSubmitting)
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowState::Idle => "idle",
            FlowState::Validating => "validating",
            FlowState::PasswordSubmitting => "password-submitting",
            FlowState::CaptureRequested => "capture-requested",
            FlowState::CaptureActive => "capture-active",
            FlowState::FrameCaptured => "frame-captured",
            FlowState::FaceSubmitting => "face-submitting",
            FlowState::Success => "success",
            FlowState::Failed => "failed",
            FlowState::Terminal => "terminal",
        };
        f.write_str(name)
    }
}

/// Notification collaborator: toasts and state observation for the UI layer.
pub trait FlowNotifier: Send {
    fn state_changed(&mut self, _state: FlowState) {}
    fn success(&mut self, title: &str, message: &str);
    fn failure(&mut self, title: &str, message: &str);
}

/// Navigation collaborator, signalled on the Success transition.
pub trait Navigator: Send {
    fn proceed(&mut self, route: &str);
}

type SessionSlot = Arc<Mutex<Option<CaptureSession>>>;

/// Cancel signal for the flow. Cloneable so the UI can keep one across a
/// component teardown; cancelling synchronously releases the camera and
/// marks any in-flight submission's result as stale.
#[derive(Clone)]
pub struct CancelToken {
    epoch: Arc<AtomicU64>,
    session: SessionSlot,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        let mut slot = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = slot.as_mut() {
            session.close();
        }
        *slot = None;
        tracing::debug!("flow cancelled, camera released");
    }
}

pub struct AuthFlowController<C: SubmissionApi> {
    client: C,
    device_factory: Box<dyn Fn() -> Box<dyn MediaDevice> + Send>,
    store: Box<dyn StateStore>,
    notifier: Box<dyn FlowNotifier>,
    navigator: Box<dyn Navigator>,
    jpeg_quality: u8,
    state: FlowState,
    session: SessionSlot,
    epoch: Arc<AtomicU64>,
    retained_login: LoginForm,
    retained_registration: RegistrationForm,
    last_failure: Option<String>,
}

impl<C: SubmissionApi> AuthFlowController<C> {
    pub fn new(
        client: C,
        device_factory: Box<dyn Fn() -> Box<dyn MediaDevice> + Send>,
        store: Box<dyn StateStore>,
        notifier: Box<dyn FlowNotifier>,
        navigator: Box<dyn Navigator>,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            client,
            device_factory,
            store,
            notifier,
            navigator,
            jpeg_quality,
            state: FlowState::Idle,
            session: Arc::new(Mutex::new(None)),
            epoch: Arc::new(AtomicU64::new(0)),
            retained_login: LoginForm::default(),
            retained_registration: RegistrationForm::default(),
            last_failure: None,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Message from the last failure, if the previous attempt failed.
    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    /// Form fields retained for retry after a failure. The password is
    /// never retained.
    pub fn retained_login(&self) -> &LoginForm {
        &self.retained_login
    }

    pub fn retained_registration(&self) -> &RegistrationForm {
        &self.retained_registration
    }

    pub fn session_status(&self) -> SessionStatus {
        self.lock_session()
            .as_ref()
            .map(CaptureSession::status)
            .unwrap_or(SessionStatus::Idle)
    }

    pub fn cancel_token(&self) -> CancelToken {
        CancelToken {
            epoch: Arc::clone(&self.epoch),
            session: Arc::clone(&self.session),
        }
    }

    /// Cancels the current flow: releases the camera and returns to Idle.
    /// Any in-flight submission completes but its result is discarded.
    pub fn cancel(&mut self) {
        self.cancel_token().cancel();
        if self.state != FlowState::Terminal {
            self.set_state(FlowState::Idle);
        }
    }

    /// The user abandons the flow. Releases all resources; no further
    /// operations are accepted.
    pub fn abandon(&mut self) {
        self.cancel_token().cancel();
        self.set_state(FlowState::Terminal);
    }

    /// Password login: validate, submit, persist the token on success.
    pub async fn login_with_password(&mut self, form: LoginForm) -> Result<()> {
        if self.reject_reentry("login")? {
            return Ok(());
        }

        self.retained_login = form.clone();
        self.set_state(FlowState::Validating);

        let record = match validate_login(&form) {
            Ok(record) => record,
            Err(errors) => return Err(self.fail(AuthFlowError::Field(errors))),
        };

        let epoch = self.epoch.load(Ordering::SeqCst);
        self.set_state(FlowState::PasswordSubmitting);
        let result = self.client.submit_password(&record).await;

        if self.is_stale(epoch) {
            return Ok(());
        }

        match result {
            Ok(auth) => {
                self.persist_login(&auth)?;
                self.succeed("Login successful", "Welcome back to Aegis Security.");
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Opens the capture session (`CaptureRequested → CaptureActive`).
    /// Acquisition failure routes straight to Failed with the classified
    /// cause; capture and submission are never attempted.
    pub async fn begin_face_capture(&mut self) -> Result<()> {
        self.begin_face_capture_with_sink(None).await
    }

    /// Same as [`begin_face_capture`](Self::begin_face_capture), binding a
    /// live video sink for preview.
    pub async fn begin_face_capture_with_sink(
        &mut self,
        sink: Option<Box<dyn FrameSink>>,
    ) -> Result<()> {
        if self.reject_reentry("face capture")? {
            return Ok(());
        }

        if matches!(
            self.session_status(),
            SessionStatus::Requesting | SessionStatus::Active
        ) {
            return Err(AuthFlowError::Other(anyhow::anyhow!(
                "a capture session is already active"
            )));
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        self.set_state(FlowState::CaptureRequested);

        let mut session = CaptureSession::new((self.device_factory)());
        if let Some(sink) = sink {
            session.attach_sink(sink);
        }

        // Device acquisition blocks on the host (permission prompt, sensor
        // warmup), so it runs off the event loop.
        let (mut session, outcome) = tokio::task::spawn_blocking(move || {
            let outcome = session.open();
            (session, outcome)
        })
        .await
        .map_err(|e| AuthFlowError::Other(anyhow::anyhow!("camera task failed: {e}")))?;

        if self.is_stale(epoch) {
            session.close();
            return Ok(());
        }

        match outcome {
            Ok(()) => {
                *self.lock_session() = Some(session);
                self.set_state(FlowState::CaptureActive);
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Feeds the current camera frame to the attached sink.
    pub fn preview_tick(&mut self) -> Result<()> {
        match self.lock_session().as_mut() {
            Some(session) => session.preview_tick(),
            None => Err(AuthFlowError::InvalidCaptureState(SessionStatus::Idle)),
        }
    }

    /// Captures a still frame from the active session and submits it for
    /// face login. The camera is released once the submission attempt
    /// completes, whatever the outcome.
    pub async fn submit_face_login(&mut self) -> Result<()> {
        if self.reject_reentry("face login")? {
            return Ok(());
        }

        let epoch = self.epoch.load(Ordering::SeqCst);
        let frame = match self.capture_from_session(epoch).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()), // cancelled
            Err(err) => return Err(err),
        };

        self.set_state(FlowState::FaceSubmitting);
        let result = self.client.submit_face_password(&frame).await;
        // The frame buffer is discarded as soon as the attempt is over.
        drop(frame);
        self.release_session();

        if self.is_stale(epoch) {
            return Ok(());
        }

        match result {
            Ok(auth) => {
                self.persist_login(&auth)?;
                self.succeed("Face login successful", "Welcome to Aegis Security.");
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Registration without a face image.
    pub async fn register(&mut self, form: RegistrationForm) -> Result<()> {
        if self.reject_reentry("registration")? {
            return Ok(());
        }

        self.retained_registration = form.clone();
        self.set_state(FlowState::Validating);

        let profile = match validate_registration(&form) {
            Ok(profile) => profile,
            Err(errors) => return Err(self.fail(AuthFlowError::Field(errors))),
        };

        let epoch = self.epoch.load(Ordering::SeqCst);
        self.set_state(FlowState::PasswordSubmitting);
        let result = self.client.submit_registration(&profile).await;

        if self.is_stale(epoch) {
            return Ok(());
        }

        match result {
            Ok(ack) => {
                self.persist_registration(&profile)?;
                self.succeed("Registration successful", &ack.message);
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Registration with a face image captured from the active session.
    /// Field errors leave the session open for re-prompting; once a
    /// capture/submit attempt runs, the camera is always released.
    pub async fn register_with_face(&mut self, form: RegistrationForm) -> Result<()> {
        if self.reject_reentry("face registration")? {
            return Ok(());
        }

        self.retained_registration = form.clone();
        self.set_state(FlowState::Validating);

        let profile = match validate_registration(&form) {
            Ok(profile) => profile,
            Err(errors) => return Err(self.fail(AuthFlowError::Field(errors))),
        };

        let epoch = self.epoch.load(Ordering::SeqCst);
        let frame = match self.capture_from_session(epoch).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(err) => return Err(err),
        };

        self.set_state(FlowState::FaceSubmitting);
        let result = self.client.submit_face_registration(&profile, &frame).await;
        drop(frame);
        self.release_session();

        if self.is_stale(epoch) {
            return Ok(());
        }

        match result {
            Ok(ack) => {
                self.persist_registration(&profile)?;
                self.succeed("Registration successful", &ack.message);
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    async fn capture_from_session(
        &mut self,
        epoch: u64,
    ) -> Result<Option<crate::capture::CapturedFrame>> {
        let taken = self.lock_session().take();
        let mut session = match taken {
            Some(session) => session,
            None => {
                return Err(self.fail(AuthFlowError::InvalidCaptureState(SessionStatus::Idle)))
            }
        };

        let captured = capture_frame(&mut session, self.jpeg_quality).await;

        if self.is_stale(epoch) {
            session.close();
            return Ok(None);
        }

        match captured {
            Ok(frame) => {
                // Put the session back so a cancel during submission can
                // still release the camera synchronously.
                *self.lock_session() = Some(session);
                self.set_state(FlowState::FrameCaptured);
                Ok(Some(frame))
            }
            Err(err) => {
                session.close();
                Err(self.fail(err))
            }
        }
    }

    fn persist_login(&mut self, auth: &AuthResult) -> Result<()> {
        self.store.set(storage::KEY_TOKEN, &auth.session_token)?;
        if let Some(email) = &auth.account_email {
            self.store.set(storage::KEY_USER_EMAIL, email)?;
        }
        Ok(())
    }

    fn persist_registration(&mut self, profile: &RegistrationProfile) -> Result<()> {
        let display = UserProfile::from_registration(profile);
        let encoded = serde_json::to_string(&display)
            .map_err(|e| AuthFlowError::Storage(format!("failed to encode profile: {e}")))?;
        self.store.set(storage::KEY_USER_PROFILE, &encoded)?;
        self.store.set(storage::KEY_USER_EMAIL, &profile.email)?;
        Ok(())
    }

    /// Returns Ok(true) when the call should be ignored because a
    /// submission is already in flight.
    fn reject_reentry(&self, operation: &str) -> Result<bool> {
        if self.state == FlowState::Terminal {
            return Err(AuthFlowError::Other(anyhow::anyhow!(
                "authentication flow has been abandoned"
            )));
        }
        if self.state.is_submitting() {
            tracing::debug!("{} ignored: submission already in flight", operation);
            return Ok(true);
        }
        Ok(false)
    }

    fn is_stale(&mut self, epoch: u64) -> bool {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!("flow cancelled, discarding result");
            self.retained_login.password.clear();
            self.retained_registration.password.clear();
            self.state = FlowState::Idle;
            true
        } else {
            false
        }
    }

    fn succeed(&mut self, title: &str, message: &str) {
        self.retained_login.password.clear();
        self.retained_registration.password.clear();
        self.last_failure = None;
        self.set_state(FlowState::Success);
        self.notifier.success(title, message);
        self.navigator.proceed(WELCOME_ROUTE);
    }

    fn fail(&mut self, err: AuthFlowError) -> AuthFlowError {
        let message = err.user_message();
        tracing::warn!("authentication flow failed: {}", err);

        self.set_state(FlowState::Failed);
        self.notifier.failure("Authentication failed", &message);
        self.last_failure = Some(message);

        // Back to Idle for retry, form fields retained minus the password.
        self.retained_login.password.clear();
        self.retained_registration.password.clear();
        self.set_state(FlowState::Idle);
        err
    }

    fn release_session(&mut self) {
        if let Some(session) = self.lock_session().as_mut() {
            session.close();
        }
    }

    fn set_state(&mut self, state: FlowState) {
        if self.state != state {
            tracing::debug!("flow state {} -> {}", self.state, state);
            self.state = state;
            self.notifier.state_changed(state);
        }
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<CaptureSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn force_state(&mut self, state: FlowState) {
        self.state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::mock::ScriptedDevice;
    use crate::capture::CapturedFrame;
    use crate::service::protocol::Ack;
    use crate::storage::MemoryStore;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Default)]
    struct StubApi {
        calls: Arc<AtomicUsize>,
        token: Option<&'static str>,
        error: Option<Arc<dyn Fn() -> AuthFlowError + Send + Sync>>,
        cancel_on_submit: Arc<Mutex<Option<CancelToken>>>,
    }

    impl StubApi {
        fn returning(token: &'static str) -> Self {
            Self {
                token: Some(token),
                ..Self::default()
            }
        }

        fn failing(make: impl Fn() -> AuthFlowError + Send + Sync + 'static) -> Self {
            Self {
                error: Some(Arc::new(make)),
                ..Self::default()
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn respond(&self) -> Result<&'static str> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = self
                .cancel_on_submit
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
            {
                token.cancel();
            }
            match &self.error {
                Some(make) => Err(make()),
                None => Ok(self.token.unwrap_or("stub-token")),
            }
        }
    }

    impl SubmissionApi for StubApi {
        async fn submit_password(&self, record: &crate::validate::CredentialRecord) -> Result<AuthResult> {
            let token = self.respond()?;
            Ok(AuthResult {
                session_token: token.to_string(),
                account_email: Some(record.email.clone()),
            })
        }

        async fn submit_face_password(&self, _frame: &CapturedFrame) -> Result<AuthResult> {
            let token = self.respond()?;
            Ok(AuthResult {
                session_token: token.to_string(),
                account_email: None,
            })
        }

        async fn submit_registration(
            &self,
            _profile: &crate::validate::RegistrationProfile,
        ) -> Result<Ack> {
            self.respond()?;
            Ok(Ack {
                message: "Registration successful".to_string(),
            })
        }

        async fn submit_face_registration(
            &self,
            _profile: &crate::validate::RegistrationProfile,
            _frame: &CapturedFrame,
        ) -> Result<Ack> {
            self.respond()?;
            Ok(Ack {
                message: "Face registration successful".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct Recorded {
        states: Vec<FlowState>,
        successes: Vec<String>,
        failures: Vec<String>,
        routes: Vec<String>,
    }

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Recorded>>);

    impl Recorder {
        fn snapshot(&self) -> Recorded {
            let inner = self.0.lock().unwrap();
            Recorded {
                states: inner.states.clone(),
                successes: inner.successes.clone(),
                failures: inner.failures.clone(),
                routes: inner.routes.clone(),
            }
        }
    }

    impl FlowNotifier for Recorder {
        fn state_changed(&mut self, state: FlowState) {
            self.0.lock().unwrap().states.push(state);
        }

        fn success(&mut self, _title: &str, message: &str) {
            self.0.lock().unwrap().successes.push(message.to_string());
        }

        fn failure(&mut self, _title: &str, message: &str) {
            self.0.lock().unwrap().failures.push(message.to_string());
        }
    }

    impl Navigator for Recorder {
        fn proceed(&mut self, route: &str) {
            self.0.lock().unwrap().routes.push(route.to_string());
        }
    }

    struct Harness {
        controller: AuthFlowController<StubApi>,
        api: StubApi,
        recorder: Recorder,
        store: Arc<Mutex<MemoryStore>>,
    }

    struct SharedStore(Arc<Mutex<MemoryStore>>);

    impl StateStore for SharedStore {
        fn set(&mut self, key: &str, value: &str) -> Result<()> {
            self.0.lock().unwrap().set(key, value)
        }

        fn get(&self, key: &str) -> Result<Option<String>> {
            self.0.lock().unwrap().get(key)
        }
    }

    fn harness_with(api: StubApi, device: impl Fn() -> ScriptedDevice + Send + 'static) -> Harness {
        let recorder = Recorder::default();
        let store = Arc::new(Mutex::new(MemoryStore::new()));
        let controller = AuthFlowController::new(
            api.clone(),
            Box::new(move || Box::new(device())),
            Box::new(SharedStore(Arc::clone(&store))),
            Box::new(recorder.clone()),
            Box::new(recorder.clone()),
            85,
        );
        Harness {
            controller,
            api,
            recorder,
            store,
        }
    }

    fn harness(api: StubApi) -> Harness {
        harness_with(api, || ScriptedDevice::granting(16, 16))
    }

    fn login_form(email: &str, password: &str) -> LoginForm {
        LoginForm {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    fn registration_form() -> RegistrationForm {
        RegistrationForm {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            password: "secret1".to_string(),
            country: "UK".to_string(),
            agree_to_terms: true,
        }
    }

    fn stored(harness: &Harness, key: &str) -> Option<String> {
        harness.store.lock().unwrap().get(key).unwrap()
    }

    // Scenario S1: valid credentials, token persisted, Success exactly once.
    #[tokio::test]
    async fn password_login_success_persists_token() {
        let mut h = harness(StubApi::returning("t1"));

        h.controller
            .login_with_password(login_form("a@b.com", "secret1"))
            .await
            .unwrap();

        assert_eq!(h.controller.state(), FlowState::Success);
        assert_eq!(stored(&h, storage::KEY_TOKEN).as_deref(), Some("t1"));
        assert_eq!(
            stored(&h, storage::KEY_USER_EMAIL).as_deref(),
            Some("a@b.com")
        );
        assert_eq!(h.api.call_count(), 1);

        let recorded = h.recorder.snapshot();
        assert_eq!(
            recorded.states,
            vec![
                FlowState::Validating,
                FlowState::PasswordSubmitting,
                FlowState::Success
            ]
        );
        assert_eq!(recorded.successes.len(), 1);
        assert_eq!(recorded.routes, vec!["/welcome".to_string()]);
    }

    // Scenario S2: malformed email never reaches the network.
    #[tokio::test]
    async fn invalid_email_skips_network() {
        let mut h = harness(StubApi::returning("t1"));

        let err = h
            .controller
            .login_with_password(login_form("not-an-email", "secret1"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthFlowError::Field(_)));
        assert_eq!(h.api.call_count(), 0);
        assert_eq!(h.controller.state(), FlowState::Idle);

        let recorded = h.recorder.snapshot();
        assert_eq!(recorded.failures.len(), 1);
        assert!(recorded.states.contains(&FlowState::Failed));
    }

    #[tokio::test]
    async fn failure_retains_fields_minus_password() {
        let mut h = harness(StubApi::failing(|| {
            AuthFlowError::InvalidCredentials("Invalid credentials".to_string())
        }));

        let err = h
            .controller
            .login_with_password(login_form("a@b.com", "secret1"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthFlowError::InvalidCredentials(_)));
        assert_eq!(h.controller.state(), FlowState::Idle);
        assert_eq!(h.controller.retained_login().email, "a@b.com");
        assert!(h.controller.retained_login().password.is_empty());
        assert_eq!(
            h.controller.last_failure(),
            Some("Invalid credentials")
        );
        assert_eq!(stored(&h, storage::KEY_TOKEN), None);
    }

    // Scenario S3: permission denied routes to Failed with no capture.
    #[tokio::test]
    async fn denied_camera_fails_without_capture() {
        let mut h = harness_with(StubApi::returning("t1"), ScriptedDevice::denying);

        let err = h.controller.begin_face_capture().await.unwrap_err();
        assert!(matches!(err, AuthFlowError::PermissionDenied));
        assert_eq!(h.controller.state(), FlowState::Idle);
        assert_eq!(h.api.call_count(), 0);

        let recorded = h.recorder.snapshot();
        assert!(recorded.states.contains(&FlowState::CaptureRequested));
        assert!(recorded.states.contains(&FlowState::Failed));
        assert!(!recorded.states.contains(&FlowState::CaptureActive));
        assert_eq!(recorded.failures, vec!["Camera access was denied.".to_string()]);
    }

    #[tokio::test]
    async fn missing_camera_is_device_unavailable() {
        let mut h = harness_with(StubApi::returning("t1"), ScriptedDevice::unavailable);

        let err = h.controller.begin_face_capture().await.unwrap_err();
        assert!(matches!(err, AuthFlowError::DeviceUnavailable(_)));
        assert_eq!(h.api.call_count(), 0);
    }

    // Scenario S4: capture, submit, token persisted, camera released.
    #[tokio::test]
    async fn face_login_success_releases_camera() {
        let mut h = harness(StubApi::returning("t2"));

        h.controller.begin_face_capture().await.unwrap();
        assert_eq!(h.controller.state(), FlowState::CaptureActive);
        assert_eq!(h.controller.session_status(), SessionStatus::Active);

        h.controller.submit_face_login().await.unwrap();

        assert_eq!(h.controller.state(), FlowState::Success);
        assert_eq!(stored(&h, storage::KEY_TOKEN).as_deref(), Some("t2"));
        // Face login does not learn the account email.
        assert_eq!(stored(&h, storage::KEY_USER_EMAIL), None);
        assert_eq!(h.controller.session_status(), SessionStatus::Released);
    }

    // Scenario S5: server-side validation rejection releases the camera and
    // keeps the form for retry.
    #[tokio::test]
    async fn face_registration_rejection_releases_camera() {
        let mut h = harness(StubApi::failing(|| {
            AuthFlowError::ServerValidationError("No face detected".to_string())
        }));

        h.controller.begin_face_capture().await.unwrap();
        let err = h
            .controller
            .register_with_face(registration_form())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthFlowError::ServerValidationError(_)));
        assert_eq!(h.controller.state(), FlowState::Idle);
        assert_eq!(h.controller.session_status(), SessionStatus::Released);
        assert_eq!(h.controller.retained_registration().email, "ada@example.com");
        assert!(h.controller.retained_registration().password.is_empty());
        assert_eq!(stored(&h, storage::KEY_USER_PROFILE), None);
    }

    #[tokio::test]
    async fn registration_success_persists_profile() {
        let mut h = harness(StubApi::returning("unused"));

        h.controller.register(registration_form()).await.unwrap();

        assert_eq!(h.controller.state(), FlowState::Success);
        assert_eq!(stored(&h, storage::KEY_TOKEN), None);
        assert_eq!(
            stored(&h, storage::KEY_USER_EMAIL).as_deref(),
            Some("ada@example.com")
        );
        let profile: UserProfile =
            serde_json::from_str(&stored(&h, storage::KEY_USER_PROFILE).unwrap()).unwrap();
        assert_eq!(profile.name, "Ada Lovelace");
    }

    #[tokio::test]
    async fn face_registration_success() {
        let mut h = harness(StubApi::returning("unused"));

        h.controller.begin_face_capture().await.unwrap();
        h.controller
            .register_with_face(registration_form())
            .await
            .unwrap();

        assert_eq!(h.controller.state(), FlowState::Success);
        assert_eq!(h.controller.session_status(), SessionStatus::Released);
        assert!(stored(&h, storage::KEY_USER_PROFILE).is_some());
    }

    #[tokio::test]
    async fn duplicate_submit_is_ignored_while_in_flight() {
        let mut h = harness(StubApi::returning("t1"));

        h.controller.force_state(FlowState::PasswordSubmitting);
        h.controller
            .login_with_password(login_form("a@b.com", "secret1"))
            .await
            .unwrap();
        assert_eq!(h.api.call_count(), 0);

        h.controller.force_state(FlowState::FaceSubmitting);
        h.controller.submit_face_login().await.unwrap();
        assert_eq!(h.api.call_count(), 0);
    }

    #[tokio::test]
    async fn face_capture_without_session_fails() {
        let mut h = harness(StubApi::returning("t1"));

        let err = h.controller.submit_face_login().await.unwrap_err();
        assert!(matches!(err, AuthFlowError::InvalidCaptureState(_)));
        assert_eq!(h.api.call_count(), 0);
    }

    #[tokio::test]
    async fn second_session_while_active_is_rejected() {
        let mut h = harness(StubApi::returning("t1"));

        h.controller.begin_face_capture().await.unwrap();
        let err = h.controller.begin_face_capture().await.unwrap_err();
        assert!(matches!(err, AuthFlowError::Other(_)));
        assert_eq!(h.controller.session_status(), SessionStatus::Active);
    }

    #[tokio::test]
    async fn cancel_releases_camera_and_returns_to_idle() {
        let mut h = harness(StubApi::returning("t1"));

        h.controller.begin_face_capture().await.unwrap();
        assert_eq!(h.controller.session_status(), SessionStatus::Active);

        h.controller.cancel();
        assert_eq!(h.controller.state(), FlowState::Idle);
        assert_eq!(h.controller.session_status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn result_arriving_after_cancel_is_discarded() {
        let api = StubApi::returning("t1");
        let mut h = harness(api.clone());

        h.controller.begin_face_capture().await.unwrap();

        // The stub cancels mid-submission, as a component teardown would.
        *api.cancel_on_submit.lock().unwrap() = Some(h.controller.cancel_token());

        h.controller.submit_face_login().await.unwrap();

        assert_eq!(h.controller.state(), FlowState::Idle);
        assert_eq!(stored(&h, storage::KEY_TOKEN), None);
        let recorded = h.recorder.snapshot();
        assert!(recorded.successes.is_empty());
        assert!(recorded.routes.is_empty());
        // The camera was released by the cancel itself.
        assert_eq!(h.controller.session_status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn abandoned_flow_rejects_operations() {
        let mut h = harness(StubApi::returning("t1"));

        h.controller.abandon();
        assert_eq!(h.controller.state(), FlowState::Terminal);

        let err = h
            .controller
            .login_with_password(login_form("a@b.com", "secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthFlowError::Other(_)));
        assert_eq!(h.api.call_count(), 0);
    }
}
