//! Cart commands and queries on top of the event-sourced cart.
//!
//! [`CartService`] resolves a user's cart, runs the command through the
//! retrying [`domain::CommandHandler`], and keeps the
//! [`projections::CartProjection`] current. Product data comes from a
//! [`ProductCatalog`].

pub mod catalog;
pub mod commands;
pub mod error;
pub mod service;

pub use catalog::{CatalogError, InMemoryProductCatalog, Product, ProductCatalog};
pub use commands::{AddProduct, Checkout, CreateCart, GetCart, RemoveProduct};
pub use error::{ErrorCategory, ServiceError};
pub use service::{CartService, ServiceConfig};
