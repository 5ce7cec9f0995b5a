pub mod env;
mod loader;

pub use env::{ApiConfig, AppConfig, DirectoryConfig, FetchConfig, TaskConfig};
pub use loader::load_config;
