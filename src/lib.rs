#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Sticker Background Removal
//!
//! Removes the flat background of sticker images with a color-similarity
//! flood fill seeded from the image border.
//!
//! The engine is two pure steps:
//!
//! - [`ColorSampler`] picks the reference color: the top-left pixel by
//!   default, or the pixel at a caller-supplied pick point.
//! - [`FloodSegmenter`] marks every pixel whose squared RGB distance to the
//!   reference is strictly below `tolerance²` and that is 4-connected to the
//!   border through such pixels, then zeroes the alpha of those pixels.
//!
//! Regions of background color enclosed by the figure (eyes, holes) are not
//! reachable from the border and stay opaque. RGB channels are never altered.
//!
//! ## Features
//!
//! - **Deterministic masks**: integer arithmetic, strict tie handling
//! - **Overflow-safe**: explicit-stack flood fill, no recursion
//! - **Batch model**: per-image status and cached color picks, parallel processing
//! - **Format Support**: PNG, JPEG, WebP, TIFF in and out, raw RGBA8 out
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sticker_bgremove::{remove_background_from_reader, RemovalConfig};
//! use tokio::fs::File;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = RemovalConfig::builder().tolerance(60).build()?;
//!
//! let file = File::open("sticker.png").await?;
//! let mut result = remove_background_from_reader(file, &config).await?;
//! result.save_png("sticker_noBG.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Working on pixels directly
//!
//! ```rust
//! use sticker_bgremove::{ColorSampler, FloodSegmenter, PixelGrid, Tolerance};
//!
//! # fn example() -> sticker_bgremove::Result<()> {
//! let grid = PixelGrid::filled(4, 4, [0, 255, 0, 255])?;
//! let reference = ColorSampler::sample(&grid, None)?;
//! let output = FloodSegmenter::segment(&grid, reference, Tolerance::new(10));
//! assert_eq!(output.transparent_count(), 16);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): Command-line interface, progress bar and log subscriber
//! - `webp-support` (default): WebP image format support
//! - `tracing-json`: JSON log lines for the CLI
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! sticker-bgremove = { version = "0.1", default-features = false }
//! ```

pub mod batch;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod processor;
pub mod sampler;
pub mod segmenter;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

// Internal imports for lib functions
use tokio::io::AsyncRead;

// Public API exports
pub use batch::{output_file_name, Batch, BatchItem, BatchReport, ImageId, ItemStatus};
pub use config::{OutputFormat, RemovalConfig, RemovalConfigBuilder};
pub use error::{BgRemovalError, Result};
pub use processor::BackgroundRemovalProcessor;
pub use sampler::ColorSampler;
pub use segmenter::FloodSegmenter;
pub use services::{
    ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, OutputFormatHandler,
    ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
};
pub use types::{
    MaskStatistics, PickPoint, PixelGrid, ProcessingMetadata, ProcessingTimings, ReferenceColor,
    RemovalResult, SampleSource, SegmentationMask, Tolerance,
};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, spans, TracingConfig, TracingFormat};

/// Remove the background of an image provided as encoded bytes
///
/// Suitable for web servers and other memory-based callers.
///
/// ```rust,no_run
/// use sticker_bgremove::{remove_background_from_bytes, OutputFormat, RemovalConfig};
///
/// # async fn example(upload_bytes: Vec<u8>) -> anyhow::Result<()> {
/// let config = RemovalConfig::default();
/// let result = remove_background_from_bytes(&upload_bytes, &config).await?;
/// let png = result.to_bytes(OutputFormat::Png, 100)?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// - `EmptyInput` for an empty buffer
/// - `Processing` if the bytes are not a decodable image
/// - `OutOfRangePick` if the configured pick lies outside the image
pub async fn remove_background_from_bytes(
    image_bytes: &[u8],
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut processor = BackgroundRemovalProcessor::new(config.clone())?;
    processor.process_bytes(image_bytes)
}

/// Remove the background of a decoded `DynamicImage`
///
/// Any pixel format is accepted; it is converted to RGBA8 first.
pub async fn remove_background_from_image(
    image: image::DynamicImage,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut processor = BackgroundRemovalProcessor::new(config.clone())?;
    processor.process_image(&image)
}

/// Remove the background of an image read from an async stream
///
/// The stream is read to the end before decoding.
pub async fn remove_background_from_reader<R: AsyncRead + Unpin>(
    reader: R,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut processor = BackgroundRemovalProcessor::new(config.clone())?;
    processor.process_reader(reader).await
}
