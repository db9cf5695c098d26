//! Append-only in-memory store of uploaded arrays.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::codec::NpyArray;

/// Listing entry for one stored array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ArrayMetadata {
    /// Position in the store, assigned at upload.
    pub index: usize,
    /// Array dimensions.
    pub shape: Vec<usize>,
    /// NumPy dtype name.
    pub dtype: String,
}

/// Indexed array storage. Indices are dense and never reused.
#[derive(Debug, Default)]
pub struct ArrayStore {
    arrays: RwLock<Vec<Arc<NpyArray>>>,
}

impl ArrayStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an array and returns its index.
    pub async fn add(&self, array: NpyArray) -> usize {
        let mut arrays = self.arrays.write().await;
        arrays.push(Arc::new(array));
        arrays.len() - 1
    }

    /// Returns the array at `index`, if any.
    pub async fn get(&self, index: usize) -> Option<Arc<NpyArray>> {
        self.arrays.read().await.get(index).map(Arc::clone)
    }

    /// Returns shape and dtype for every stored array, in index order.
    pub async fn list(&self) -> Vec<ArrayMetadata> {
        self.arrays
            .read()
            .await
            .iter()
            .enumerate()
            .map(|(index, array)| ArrayMetadata {
                index,
                shape: array.shape().to_vec(),
                dtype: array.dtype().name().to_string(),
            })
            .collect()
    }

    /// Number of stored arrays.
    pub async fn count(&self) -> usize {
        self.arrays.read().await.len()
    }

    /// Removes every stored array.
    pub async fn clear(&self) {
        self.arrays.write().await.clear();
    }
}
