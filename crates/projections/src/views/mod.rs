//! Read model views for the query side.

pub mod cart;

pub use cart::{ActiveCartClaim, CartProjection, CartView};
