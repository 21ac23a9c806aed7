//! HTTP route handlers.

pub mod cart;
pub mod debug;
pub mod health;
pub mod metrics;
