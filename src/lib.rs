// Core modules
pub mod camera;
pub mod capture;
pub mod common;
pub mod flow;
pub mod service;
pub mod storage;
pub mod validate;

// Re-export commonly used types
pub use camera::{CaptureSession, FrameSink, MediaDevice, SessionStatus, V4lDevice};
pub use capture::{capture_frame, CapturedFrame};
pub use common::{AuthFlowError, Config, FieldErrors, Result};
pub use flow::{AuthFlowController, CancelToken, FlowNotifier, FlowState, Navigator};
pub use service::{Ack, AuthResult, HttpSubmissionClient, SubmissionApi};
pub use storage::{FileStore, MemoryStore, StateStore, UserProfile};
pub use validate::{
    validate_login, validate_registration, CredentialRecord, LoginForm, RegistrationForm,
    RegistrationProfile,
};
