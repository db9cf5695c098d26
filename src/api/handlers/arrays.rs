//! Array handlers: upload, list, get, download.

use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{ArrayContentResponse, ArrayListResponse, UploadForm, UploadResponse};
use crate::app_state::AppState;
use crate::codec;
use crate::error::{ErrorResponse, ServerError};

/// Multipart field carrying the file.
const FILE_FIELD: &str = "file";

/// `POST /upload` — Store an uploaded `.npy` file.
///
/// # Errors
///
/// Returns [`ServerError::InvalidRequest`] if the multipart body has no
/// `file` field, or [`ServerError::InvalidArray`] if it cannot be decoded.
#[utoipa::path(
    post,
    path = "/upload",
    tag = "Arrays",
    summary = "Upload an array",
    description = "Accepts a NumPy `.npy` file in the `file` multipart field and stores it in memory.",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Array stored", body = UploadResponse),
        (status = 400, description = "Missing field or unreadable array", body = ErrorResponse),
    )
)]
pub async fn upload_array(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ServerError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::InvalidRequest(e.body_text()))?
    {
        if field.name() == Some(FILE_FIELD) {
            let filename = field.file_name().map(str::to_owned);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ServerError::InvalidRequest(e.body_text()))?;
            upload = Some((filename, bytes));
            break;
        }
    }

    let Some((filename, bytes)) = upload else {
        return Err(ServerError::InvalidRequest(format!(
            "missing multipart field {FILE_FIELD:?}"
        )));
    };

    let array = codec::decode(&bytes)?;
    let shape = array.shape().to_vec();
    let dtype = array.dtype().name().to_string();
    let index = state.store.add(array).await;

    tracing::info!(index, ?shape, %dtype, filename = filename.as_deref(), "array stored");

    Ok(Json(UploadResponse {
        status: "success".to_string(),
        shape,
        dtype,
        index,
    }))
}

/// `GET /arrays` — List stored arrays.
#[utoipa::path(
    get,
    path = "/arrays",
    tag = "Arrays",
    summary = "List arrays",
    description = "Returns index, shape and dtype for every stored array.",
    responses(
        (status = 200, description = "Stored array metadata", body = ArrayListResponse),
    )
)]
pub async fn list_arrays(State(state): State<AppState>) -> impl IntoResponse {
    let arrays = state.store.list().await;
    Json(ArrayListResponse {
        count: arrays.len(),
        arrays,
    })
}

/// `GET /array/{index}` — Get an array as nested JSON lists.
///
/// # Errors
///
/// Returns [`ServerError::ArrayNotFound`] if no array has that index.
#[utoipa::path(
    get,
    path = "/array/{index}",
    tag = "Arrays",
    summary = "Get array contents",
    description = "Returns shape, dtype and the elements as nested lists.",
    params(
        ("index" = usize, Path, description = "Array index"),
    ),
    responses(
        (status = 200, description = "Array contents", body = ArrayContentResponse),
        (status = 404, description = "Array not found", body = ErrorResponse),
    )
)]
pub async fn get_array(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<impl IntoResponse, ServerError> {
    let array = state
        .store
        .get(index)
        .await
        .ok_or(ServerError::ArrayNotFound(index))?;

    Ok(Json(ArrayContentResponse {
        shape: array.shape().to_vec(),
        dtype: array.dtype().name().to_string(),
        data: array.to_nested_json(),
    }))
}

/// `GET /array/{index}/npy` — Download an array as a `.npy` file.
///
/// # Errors
///
/// Returns [`ServerError::ArrayNotFound`] if no array has that index.
#[utoipa::path(
    get,
    path = "/array/{index}/npy",
    tag = "Arrays",
    summary = "Download array file",
    description = "Returns the stored array re-encoded as a little-endian `.npy` file.",
    params(
        ("index" = usize, Path, description = "Array index"),
    ),
    responses(
        (status = 200, description = "Array file", content_type = "application/octet-stream", body = Vec<u8>),
        (status = 404, description = "Array not found", body = ErrorResponse),
    )
)]
pub async fn download_array(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<impl IntoResponse, ServerError> {
    let array = state
        .store
        .get(index)
        .await
        .ok_or(ServerError::ArrayNotFound(index))?;

    let disposition = format!("attachment; filename=\"array_{index}.npy\"");
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        codec::encode(&array),
    ))
}

/// Array routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload_array))
        .route("/arrays", get(list_arrays))
        .route("/array/{index}", get(get_array))
        .route("/array/{index}/npy", get(download_array))
}
