//! Image I/O operations service
//!
//! Keeps container decoding and encoding out of the segmentation core, which
//! only ever sees a [`PixelGrid`].

use crate::{
    config::OutputFormat,
    error::{BgRemovalError, Result},
    services::format::OutputFormatHandler,
    types::PixelGrid,
};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Falls back to content sniffing when the extension is wrong or missing.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use sticker_bgremove::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("sticker.png")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(BgRemovalError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );

                let data = std::fs::read(path_ref).map_err(|io_err| {
                    BgRemovalError::file_io_error("read image data", path_ref, &io_err)
                })?;

                if data.is_empty() {
                    return Err(BgRemovalError::empty_input(format!(
                        "{} is empty",
                        path_ref.display()
                    )));
                }

                image::load_from_memory(&data).map_err(|content_err| {
                    let extension = path_ref
                        .extension()
                        .and_then(|s| s.to_str())
                        .unwrap_or("unknown");

                    BgRemovalError::processing_stage_error(
                        "image loading",
                        &format!(
                            "Failed to load image with both extension-based ({}) and content-based detection. Extension error: {}. Content error: {}",
                            extension, e, content_err
                        ),
                        Some(&format!("path: {}, size: {} bytes", path_ref.display(), data.len())),
                    )
                })
            },
        }
    }

    /// Load an image file straight into a [`PixelGrid`]
    pub fn load_grid<P: AsRef<Path>>(path: P) -> Result<PixelGrid> {
        PixelGrid::from_dynamic(&Self::load_image(path)?)
    }

    /// Decode an image from encoded bytes (PNG, JPEG, WebP, TIFF, ...)
    ///
    /// # Errors
    /// - `EmptyInput` for a zero-length buffer
    /// - `Processing` when the bytes are not a decodable image
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(BgRemovalError::empty_input("image byte buffer is empty"));
        }
        image::load_from_memory(bytes).map_err(|e| {
            BgRemovalError::processing(format!("Failed to decode image from bytes: {}", e))
        })
    }

    /// Load an image from an async reader
    ///
    /// # Examples
    /// ```rust,no_run
    /// use sticker_bgremove::services::ImageIOService;
    /// use tokio::fs::File;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let file = File::open("sticker.png").await?;
    /// let image = ImageIOService::load_from_reader(file).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn load_from_reader<R: tokio::io::AsyncRead + Unpin>(
        mut reader: R,
    ) -> Result<DynamicImage> {
        use tokio::io::AsyncReadExt;

        let mut buffer = Vec::new();
        AsyncReadExt::read_to_end(&mut reader, &mut buffer)
            .await
            .map_err(|e| {
                BgRemovalError::processing(format!("Failed to read from stream: {}", e))
            })?;

        Self::load_from_bytes(&buffer)
    }

    /// Guess the container format from magic bytes
    #[must_use]
    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    /// Encode a grid into the requested output format
    ///
    /// `quality` is only used for JPEG. JPEG output drops alpha.
    pub fn encode(grid: &PixelGrid, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
        if format == OutputFormat::Rgba8 {
            return Ok(grid.as_raw().to_vec());
        }

        let image = OutputFormatHandler::convert_format(grid.clone().into_rgba_image()?, format);
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);

        let result = match format {
            OutputFormat::Jpeg => {
                let encoder =
                    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality);
                image.write_with_encoder(encoder)
            },
            OutputFormat::Png => image.write_to(&mut cursor, ImageFormat::Png),
            OutputFormat::WebP => image.write_to(&mut cursor, ImageFormat::WebP),
            OutputFormat::Tiff => image.write_to(&mut cursor, ImageFormat::Tiff),
            OutputFormat::Rgba8 => Ok(()),
        };

        result.map_err(|e| {
            BgRemovalError::processing_stage_error(
                "image encode",
                &format!("Failed to encode as {}: {}", format, e),
                Some(&format!("{}x{}", grid.width(), grid.height())),
            )
        })?;

        Ok(buffer)
    }

    /// Encode a grid and write it to `path`, creating parent directories
    pub fn save_grid(
        grid: &PixelGrid,
        path: &Path,
        format: OutputFormat,
        quality: u8,
    ) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                BgRemovalError::file_io_error("create output directory", parent, &e)
            })?;
        }

        let bytes = Self::encode(grid, format, quality)?;
        std::fs::write(path, bytes)
            .map_err(|e| BgRemovalError::file_io_error("write output image", path, &e))?;

        log::debug!("Saved {} output to {}", format, path.display());
        Ok(())
    }

    /// Encode a grid and write it to an async writer
    ///
    /// Returns the number of bytes written.
    pub async fn save_to_writer<W: tokio::io::AsyncWrite + Unpin>(
        grid: &PixelGrid,
        mut writer: W,
        format: OutputFormat,
        quality: u8,
    ) -> Result<u64> {
        use tokio::io::AsyncWriteExt;

        let bytes = Self::encode(grid, format, quality)?;

        AsyncWriteExt::write_all(&mut writer, &bytes)
            .await
            .map_err(|e| BgRemovalError::processing(format!("Failed to write to stream: {}", e)))?;
        AsyncWriteExt::flush(&mut writer)
            .await
            .map_err(|e| BgRemovalError::processing(format!("Failed to flush stream: {}", e)))?;

        Ok(bytes.len() as u64)
    }

    /// Check if a file path has a supported image extension
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                matches!(
                    ext.to_lowercase().as_str(),
                    "jpg" | "jpeg" | "png" | "webp" | "tiff" | "tif"
                )
            })
    }
}
