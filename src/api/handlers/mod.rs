//! REST endpoint handlers organized by resource.

pub mod arrays;
pub mod control;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(arrays::routes())
        .merge(control::routes())
        .merge(system::routes())
}
