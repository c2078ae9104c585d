pub mod api;
pub mod config;
pub mod email;
pub mod models;

pub use config::{Config, ConfigError};
pub use email::{Email, EmailError};
pub use models::UserRecord;
