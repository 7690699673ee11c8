pub mod kv;

pub use kv::{FileStore, MemoryStore, StateStore, UserProfile};
pub use kv::{KEY_TOKEN, KEY_USER_EMAIL, KEY_USER_PROFILE};
