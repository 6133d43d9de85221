//! Infrastructure layer: everything that touches the outside world.
//!
//! - Component catalogue loading (YAML/JSON files)
//! - Hierarchical engine configuration (figment)
//! - Logging setup (tracing)

pub mod config;
pub mod logging;
pub mod repository;

pub use config::ConfigLoader;
pub use repository::RepositoryError;
