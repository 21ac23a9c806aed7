//! Read models and projections for the cart query side.
//!
//! This crate provides:
//! - [`Projection`] trait for processing events into read models
//! - [`ReadModel`] trait for listing a whole read model
//! - [`ProjectionProcessor`] for feeding events from the store to projections
//! - [`CartProjection`], the per-user cart index used for lookups and the
//!   single-active-cart claim

pub mod error;
pub mod processor;
pub mod projection;
pub mod read_model;
pub mod views;

pub use error::{ProjectionError, Result};
pub use processor::ProjectionProcessor;
pub use projection::{Projection, ProjectionPosition};
pub use read_model::ReadModel;
pub use views::{ActiveCartClaim, CartProjection, CartView};
