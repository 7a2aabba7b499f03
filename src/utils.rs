//! Utility functions for numeric conversions and `OpenCV` interoperability.

#[cfg(feature = "opencv")]
pub mod image_conversion;
pub mod safe_cast;
