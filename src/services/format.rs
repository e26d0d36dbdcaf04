//! Output format handling service

use crate::config::OutputFormat;
use image::{DynamicImage, RgbaImage};

/// Service for handling output format conversions
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Convert an RGBA result into the pixel layout the target encoder expects
    ///
    /// JPEG has no alpha, so transparent pixels show their original RGB.
    #[must_use]
    pub fn convert_format(rgba_image: RgbaImage, format: OutputFormat) -> DynamicImage {
        match format {
            OutputFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba_image).to_rgb8()),
            OutputFormat::Png | OutputFormat::WebP | OutputFormat::Tiff | OutputFormat::Rgba8 => {
                DynamicImage::ImageRgba8(rgba_image)
            },
        }
    }

    /// File extension (without the dot) for a given output format
    ///
    /// # Examples
    /// ```rust
    /// use sticker_bgremove::{services::OutputFormatHandler, OutputFormat};
    ///
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Png), "png");
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Jpeg), "jpg");
    /// ```
    #[must_use]
    pub fn get_extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::WebP => "webp",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Rgba8 => "raw",
        }
    }

    /// Whether a format keeps the alpha channel
    #[must_use]
    pub fn supports_transparency(format: OutputFormat) -> bool {
        !matches!(format, OutputFormat::Jpeg)
    }

    /// Warn when the chosen format would discard the removed background
    pub fn validate_for_background_removal(format: OutputFormat) {
        if !Self::supports_transparency(format) {
            log::warn!(
                "Output format {:?} does not support transparency. Removed background will show its original color.",
                format
            );
        }
    }

    /// (default, min, max) quality for lossy formats, `None` for lossless ones
    #[must_use]
    pub fn get_quality_range(format: OutputFormat) -> Option<(u8, u8, u8)> {
        match format {
            OutputFormat::Jpeg => Some((90, 0, 100)),
            OutputFormat::Png | OutputFormat::WebP | OutputFormat::Tiff | OutputFormat::Rgba8 => None,
        }
    }
}
