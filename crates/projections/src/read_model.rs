//! Query access to a whole read model.

use async_trait::async_trait;

/// A read model that can be listed in full.
///
/// Per-key lookups stay on the concrete type; this covers the operator
/// views that dump everything a projection holds.
#[async_trait]
pub trait ReadModel: Send + Sync {
    type Entry: Send;

    /// Every entry, in the model's natural order.
    async fn entries(&self) -> Vec<Self::Entry>;

    /// Number of entries held.
    async fn entry_count(&self) -> usize {
        self.entries().await.len()
    }
}
