//! Configuration types for background removal operations

use crate::{
    error::{BgRemovalError, Result},
    types::{PickPoint, ReferenceColor, Tolerance},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Output image format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// JPEG (no transparency, alpha is dropped)
    Jpeg,
    /// WebP with alpha channel transparency
    WebP,
    /// TIFF with alpha channel transparency and lossless compression
    Tiff,
    /// Raw RGBA8 pixel data (4 bytes per pixel)
    Rgba8,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "png"),
            Self::Jpeg => write!(f, "jpeg"),
            Self::WebP => write!(f, "webp"),
            Self::Tiff => write!(f, "tiff"),
            Self::Rgba8 => write!(f, "rgba8"),
        }
    }
}

/// Configuration for background removal operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Euclidean RGB distance threshold (5-150)
    pub tolerance: u32,

    /// Manual color pick applied to every image (None = top-left pixel)
    pub manual_pick: Option<PickPoint>,

    /// Known background color; a manual pick still takes precedence
    pub reference_color: Option<ReferenceColor>,

    /// Output format
    pub output_format: OutputFormat,

    /// JPEG quality (0-100, only used for JPEG output)
    pub jpeg_quality: u8,

    /// Enable debug mode (additional logging)
    pub debug: bool,

    /// Write the removal mask next to each result
    pub save_mask: bool,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            tolerance: Tolerance::DEFAULT,
            manual_pick: None,
            reference_color: None,
            output_format: OutputFormat::default(),
            jpeg_quality: 90,
            debug: false,
            save_mask: false,
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sticker_bgremove::{OutputFormat, RemovalConfig};
    ///
    /// let config = RemovalConfig::builder()
    ///     .tolerance(60)
    ///     .output_format(OutputFormat::WebP)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.tolerance, 60);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Tolerance as the engine type
    #[must_use]
    pub fn tolerance(&self) -> Tolerance {
        Tolerance::new(self.tolerance)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Tolerance outside 5-150
    /// - JPEG quality above 100
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sticker_bgremove::RemovalConfig;
    ///
    /// let mut config = RemovalConfig::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.tolerance = 300;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        self.tolerance().validate_range()?;

        if self.jpeg_quality > 100 {
            return Err(BgRemovalError::config_value_error(
                "JPEG quality",
                self.jpeg_quality,
                "0-100",
                Some(90),
            ));
        }

        Ok(())
    }

    /// Load and validate a configuration from a JSON file
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BgRemovalError::file_io_error("read config", path, &e))?;
        let config = Self::from_json_str(&contents)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a configuration from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BgRemovalError::invalid_config(format!("malformed JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BgRemovalError::internal(format!("serialize config: {}", e)))
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    /// Start from an existing configuration
    #[must_use]
    pub fn from_config(config: RemovalConfig) -> Self {
        Self { config }
    }

    /// Set color tolerance
    #[must_use]
    pub fn tolerance(mut self, tolerance: u32) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    /// Set a manual color pick
    #[must_use]
    pub fn manual_pick(mut self, pick: Option<PickPoint>) -> Self {
        self.config.manual_pick = pick;
        self
    }

    /// Set a known background color
    #[must_use]
    pub fn reference_color(mut self, color: Option<ReferenceColor>) -> Self {
        self.config.reference_color = color;
        self
    }

    /// Set output format
    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// Set JPEG quality
    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.min(100);
        self
    }

    /// Enable debug mode
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Write masks alongside results
    #[must_use]
    pub fn save_mask(mut self, save_mask: bool) -> Self {
        self.config.save_mask = save_mask;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Tolerance outside 5-150
    pub fn build(self) -> Result<RemovalConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
