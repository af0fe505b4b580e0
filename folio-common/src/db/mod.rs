//! Database models and queries

pub mod assets;
pub mod chunks;
pub mod init;
pub mod manuscripts;
pub mod models;

pub use init::*;
pub use models::*;

/// Generate a new row identifier
pub fn new_guid() -> String {
    uuid::Uuid::new_v4().to_string()
}
