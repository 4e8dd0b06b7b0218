pub mod auth;

pub use auth::{create_session_token, AuthUser};
