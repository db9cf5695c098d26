//! Array file codecs.
//!
//! Only the NumPy `.npy` format is supported. Arrays are decoded into
//! [`NpyArray`] values that carry their shape and element type.

pub mod npy;

pub use npy::{ArrayData, CodecError, DType, NpyArray, decode, encode};
