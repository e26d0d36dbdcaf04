//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Error types for background removal operations
///
/// The first three variants are caller input errors detected before any
/// pixel work starts. They are never retried.
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// Width or height is zero, or the buffer does not hold `width * height` RGBA pixels
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),

    /// Manual color pick outside the image bounds
    #[error("Color pick ({x}, {y}) is outside the {width}x{height} image")]
    OutOfRangePick {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    /// Zero-length pixel buffer
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Batch operation on an id that is not in the batch
    #[error("Unknown image: {0}")]
    UnknownImage(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Processing errors outside the segmentation core
    #[error("Processing error: {0}")]
    Processing(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create a new invalid dimensions error
    pub fn invalid_dimensions<S: Into<String>>(msg: S) -> Self {
        Self::InvalidDimensions(msg.into())
    }

    /// Create a new empty input error
    pub fn empty_input<S: Into<String>>(msg: S) -> Self {
        Self::EmptyInput(msg.into())
    }

    /// Create a new out-of-range pick error
    #[must_use]
    pub fn out_of_range_pick(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self::OutOfRangePick {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a new unknown image error
    pub fn unknown_image<S: Into<String>>(id: S) -> Self {
        Self::UnknownImage(id.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error was caused by caller input rather than the environment
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidDimensions(_) | Self::OutOfRangePick { .. } | Self::EmptyInput(_)
        )
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create processing error with stage context
    #[must_use]
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }
}
