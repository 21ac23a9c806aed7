//! Domain layer for the cart engine.
//!
//! This crate provides:
//! - Aggregate trait for event-sourced entities
//! - DomainEvent trait for domain events
//! - CommandHandler with optimistic-concurrency retries
//! - Cart aggregate implementation with its state machine

pub mod aggregate;
pub mod cart;
pub mod command;
pub mod error;

pub use aggregate::{Aggregate, DomainEvent, SnapshotCapable};
pub use cart::{
    Cart, CartCheckedOutData, CartCreatedData, CartError, CartEvent, CartState, LineItem, Money,
    ProductAddedData, ProductId, ProductRemovedData,
};
pub use command::{CommandHandler, CommandResult, RetryPolicy};
pub use error::DomainError;
