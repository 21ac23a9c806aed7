//! Identifiers shared by every crate of the cart workspace.

mod types;

pub use types::{StreamId, UserId};
