pub mod controller;

pub use controller::{AuthFlowController, CancelToken, FlowNotifier, FlowState, Navigator};
