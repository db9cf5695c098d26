//! Array upload, listing, and retrieval DTOs.

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::ArrayMetadata;

/// Multipart form accepted by `POST /upload`.
#[derive(Debug, ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// `.npy` file contents.
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// Response body for a successful `POST /upload`.
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    /// Always `"success"`.
    pub status: String,
    /// Dimensions of the stored array.
    pub shape: Vec<usize>,
    /// NumPy dtype name of the stored array.
    pub dtype: String,
    /// Index to retrieve the array with.
    pub index: usize,
}

/// Response body for `GET /arrays`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ArrayListResponse {
    /// Number of stored arrays.
    pub count: usize,
    /// Metadata for every stored array, in index order.
    pub arrays: Vec<ArrayMetadata>,
}

/// Response body for `GET /array/{index}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ArrayContentResponse {
    /// Array dimensions.
    pub shape: Vec<usize>,
    /// NumPy dtype name.
    pub dtype: String,
    /// Elements as nested lists following `shape`.
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
}
