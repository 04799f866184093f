pub mod config;
pub mod host;

pub use config::AppConfig;
