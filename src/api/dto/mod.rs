//! Data Transfer Objects for REST request/response serialization.

pub mod array_dto;
pub mod control_dto;

pub use array_dto::*;
pub use control_dto::*;
