pub mod client;
pub mod protocol;

pub use client::{HttpSubmissionClient, SubmissionApi};
pub use protocol::{Ack, AuthResult};
