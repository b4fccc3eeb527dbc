mod auth;
mod health_check;

pub use auth::{get_current_user, list_sessions, login, logout, refresh, register};
pub use health_check::health_check;
