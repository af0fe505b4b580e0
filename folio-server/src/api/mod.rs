//! HTTP API handlers for folio-server

pub mod chunks;
pub mod export;
pub mod health;
pub mod images;
pub mod manuscripts;
pub mod narration;

pub use health::health_routes;
