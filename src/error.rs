use thiserror::Error;

/// Failures while reading or decoding the embedded workflow metadata.
///
/// Callers treat every variant the same way: keep their defaults.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Invalid workflow JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid PNG: {0}")]
    Png(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while loading an input image into tensors.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Invalid image file: {0}")]
    InvalidInput(String),

    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame {index} is {width}x{height}, expected {expected_width}x{expected_height}")]
    FrameMismatch {
        index: usize,
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    #[error("Image contains no frames")]
    Empty,
}
