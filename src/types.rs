//! Core types for background removal operations

use crate::error::{BgRemovalError, Result};
use chrono::{DateTime, Utc};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Bytes per RGBA8 pixel
pub const CHANNELS: usize = 4;

/// Decoded RGBA8 raster, row-major with the origin at the top-left corner
///
/// A `PixelGrid` is always non-empty and its buffer always holds exactly
/// `width * height` pixels; every constructor checks this, so code that
/// receives a grid never has to re-validate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelGrid {
    /// Wrap an interleaved RGBA8 buffer
    ///
    /// # Errors
    /// - `EmptyInput` if `data` is empty
    /// - `InvalidDimensions` if a dimension is zero or `data.len() != width * height * 4`
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if data.is_empty() {
            return Err(BgRemovalError::empty_input(format!(
                "pixel buffer for {}x{} image is empty",
                width, height
            )));
        }

        if width == 0 || height == 0 {
            return Err(BgRemovalError::invalid_dimensions(format!(
                "{}x{} (width and height must be at least 1)",
                width, height
            )));
        }

        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(CHANNELS))
            .ok_or_else(|| {
                BgRemovalError::invalid_dimensions(format!("{}x{} overflows usize", width, height))
            })?;

        if data.len() != expected {
            return Err(BgRemovalError::invalid_dimensions(format!(
                "{}x{} RGBA needs {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Create a grid where every pixel has the same RGBA value
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        let count = (width as usize).saturating_mul(height as usize);
        let data = rgba.repeat(count);
        Self::new(width, height, data)
    }

    /// Convert any decoded image into a grid, expanding it to RGBA8
    pub fn from_dynamic(image: &DynamicImage) -> Result<Self> {
        Self::try_from(image.to_rgba8())
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Number of pixels (`width * height`)
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.data.len() / CHANNELS
    }

    /// Raw interleaved RGBA bytes
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Linear pixel index of (x, y), or `None` outside the grid
    #[must_use]
    pub fn index_of(&self, x: u32, y: u32) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(y as usize * self.width as usize + x as usize)
        } else {
            None
        }
    }

    /// RGBA value at (x, y), or `None` outside the grid
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.index_of(x, y).and_then(|i| self.pixel_at(i))
    }

    /// RGBA value at a linear pixel index
    #[must_use]
    pub fn pixel_at(&self, index: usize) -> Option<[u8; 4]> {
        let start = index.checked_mul(CHANNELS)?;
        let px = self.data.get(start..start.checked_add(CHANNELS)?)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Overwrite the alpha channel of one pixel. Returns `false` if the index is out of range.
    pub fn set_alpha_at(&mut self, index: usize, alpha: u8) -> bool {
        let slot = index.checked_mul(CHANNELS).and_then(|i| i.checked_add(3));
        match slot.and_then(|i| self.data.get_mut(i)) {
            Some(a) => {
                *a = alpha;
                true
            },
            None => false,
        }
    }

    /// Iterate over all pixels in row-major order
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 4]> + '_ {
        self.data
            .chunks_exact(CHANNELS)
            .map(|px| [px[0], px[1], px[2], px[3]])
    }

    /// Alpha channel of every pixel in row-major order
    #[must_use]
    pub fn alpha_channel(&self) -> Vec<u8> {
        self.data.chunks_exact(CHANNELS).map(|px| px[3]).collect()
    }

    /// Number of fully transparent pixels
    #[must_use]
    pub fn transparent_count(&self) -> usize {
        self.data.chunks_exact(CHANNELS).filter(|px| px[3] == 0).count()
    }

    /// Whether (x, y) lies on row 0, row H-1, column 0 or column W-1
    #[must_use]
    pub fn is_border(&self, x: u32, y: u32) -> bool {
        x < self.width
            && y < self.height
            && (x == 0 || y == 0 || x == self.width - 1 || y == self.height - 1)
    }

    /// Convert back into an `image` buffer for encoding
    pub fn into_rgba_image(self) -> Result<RgbaImage> {
        let (width, height) = (self.width, self.height);
        ImageBuffer::from_raw(width, height, self.data).ok_or_else(|| {
            BgRemovalError::internal(format!(
                "pixel buffer does not fit a {}x{} RGBA image",
                width, height
            ))
        })
    }

    /// Convert into a `DynamicImage` (RGBA8)
    pub fn into_dynamic(self) -> Result<DynamicImage> {
        self.into_rgba_image().map(DynamicImage::ImageRgba8)
    }
}

impl TryFrom<RgbaImage> for PixelGrid {
    type Error = BgRemovalError;

    fn try_from(image: RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }
}

/// Background reference color, sampled once per image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl ReferenceColor {
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Take the RGB part of an RGBA pixel, ignoring alpha
    #[must_use]
    pub const fn from_rgba(px: [u8; 4]) -> Self {
        Self::new(px[0], px[1], px[2])
    }

    #[must_use]
    pub const fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// Squared Euclidean distance in RGB space
    #[must_use]
    pub fn distance_squared(self, r: u8, g: u8, b: u8) -> u32 {
        let dr = i32::from(r) - i32::from(self.r);
        let dg = i32::from(g) - i32::from(self.g);
        let db = i32::from(b) - i32::from(self.b);
        // at most 3 * 255^2, always non-negative
        (dr * dr + dg * dg + db * db).unsigned_abs()
    }
}

impl fmt::Display for ReferenceColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl FromStr for ReferenceColor {
    type Err = BgRemovalError;

    /// Parse `#RRGGBB` or `RRGGBB`
    fn from_str(s: &str) -> Result<Self> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(BgRemovalError::invalid_config(format!(
                "color '{}' is not in #RRGGBB form",
                s
            )));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16)
                .map_err(|e| BgRemovalError::invalid_config(format!("color '{}': {}", s, e)))
        };
        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

/// Euclidean RGB distance threshold
///
/// Matching is strict: a pixel matches when its squared distance is
/// *less than* `tolerance²`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tolerance(u32);

impl Tolerance {
    /// Lowest value offered by the configuration surface
    pub const MIN: u32 = 5;
    /// Highest value offered by the configuration surface
    pub const MAX: u32 = 150;
    /// Default slider position
    pub const DEFAULT: u32 = 45;

    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// `tolerance²`, widened so any `u32` tolerance is representable
    #[must_use]
    pub const fn squared(self) -> u64 {
        self.0 as u64 * self.0 as u64
    }

    /// Whether a squared distance falls strictly inside the threshold
    #[must_use]
    pub const fn matches(self, distance_squared: u32) -> bool {
        (distance_squared as u64) < self.squared()
    }

    /// Check the value against the configurable range `[MIN, MAX]`
    pub fn validate_range(self) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&self.0) {
            Ok(self)
        } else {
            Err(BgRemovalError::config_value_error(
                "tolerance",
                self.0,
                "5-150",
                Some(Self::DEFAULT),
            ))
        }
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl From<u32> for Tolerance {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pixel coordinates of a manual color pick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PickPoint {
    pub x: u32,
    pub y: u32,
}

impl PickPoint {
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Map a click on a scaled rendering of the image back to image pixels
    ///
    /// `click_x`/`click_y` are relative to the rendered box of size
    /// `display_width` x `display_height`. The result is floored, so a click
    /// on the far edge lands outside the image and is rejected later by the
    /// sampler rather than silently clamped.
    pub fn from_display(
        click_x: f64,
        click_y: f64,
        display_width: f64,
        display_height: f64,
        image_width: u32,
        image_height: u32,
    ) -> Result<Self> {
        if !(display_width > 0.0 && display_height > 0.0) {
            return Err(BgRemovalError::invalid_dimensions(format!(
                "display box {}x{} must be positive",
                display_width, display_height
            )));
        }
        if !(click_x.is_finite() && click_y.is_finite()) || click_x < 0.0 || click_y < 0.0 {
            return Err(BgRemovalError::invalid_config(format!(
                "click ({}, {}) is not inside the display box",
                click_x, click_y
            )));
        }

        let x = (click_x / display_width * f64::from(image_width)).floor();
        let y = (click_y / display_height * f64::from(image_height)).floor();
        Ok(Self::new(x.min(f64::from(u32::MAX)) as u32, y.min(f64::from(u32::MAX)) as u32))
    }
}

impl fmt::Display for PickPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

impl FromStr for PickPoint {
    type Err = BgRemovalError;

    /// Parse `X,Y`
    fn from_str(s: &str) -> Result<Self> {
        let (x, y) = s.split_once(',').ok_or_else(|| {
            BgRemovalError::invalid_config(format!("pick '{}' must be in X,Y form", s))
        })?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| BgRemovalError::invalid_config(format!("pick '{}': {}", s, e)))
        };
        Ok(Self::new(parse(x)?, parse(y)?))
    }
}

/// Where the reference color of an image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleSource {
    /// Implicit guess: the top-left pixel
    TopLeft,
    /// Manual pick on the displayed image
    Picked(PickPoint),
    /// Color supplied directly by the caller (e.g. a cached pick or a known chroma key)
    Fixed,
}

/// Binary removal mask: `true` marks a pixel that becomes transparent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    /// One flag per pixel, row-major
    pub data: Vec<bool>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    #[must_use]
    pub fn new(data: Vec<bool>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    /// Mask with nothing selected
    #[must_use]
    pub fn empty(dimensions: (u32, u32)) -> Self {
        let len = dimensions.0 as usize * dimensions.1 as usize;
        Self::new(vec![false; len], dimensions)
    }

    /// Whether (x, y) is removed. Out-of-range coordinates are never masked.
    #[must_use]
    pub fn is_masked(&self, x: u32, y: u32) -> bool {
        let (width, height) = self.dimensions;
        if x >= width || y >= height {
            return false;
        }
        self.data
            .get(y as usize * width as usize + x as usize)
            .copied()
            .unwrap_or(false)
    }

    #[must_use]
    pub fn masked_count(&self) -> usize {
        self.data.iter().filter(|&&m| m).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|&m| m)
    }

    /// Bounding box of the masked region as (x, y, width, height)
    #[must_use]
    pub fn bounds(&self) -> Option<(u32, u32, u32, u32)> {
        let width = self.dimensions.0 as usize;
        if width == 0 {
            return None;
        }
        let mut min = (usize::MAX, usize::MAX);
        let mut max = (0, 0);
        let mut any = false;
        for (i, _) in self.data.iter().enumerate().filter(|(_, &m)| m) {
            let (x, y) = (i % width, i / width);
            min = (min.0.min(x), min.1.min(y));
            max = (max.0.max(x), max.1.max(y));
            any = true;
        }
        any.then(|| {
            (
                min.0 as u32,
                min.1 as u32,
                (max.0 - min.0 + 1) as u32,
                (max.1 - min.1 + 1) as u32,
            )
        })
    }

    /// Whether every pixel masked here is also masked in `other`
    #[must_use]
    pub fn is_subset_of(&self, other: &SegmentationMask) -> bool {
        self.dimensions == other.dimensions
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(&mine, &theirs)| !mine || theirs)
    }

    /// Zero the alpha of every masked pixel in `grid`; RGB and unmasked alpha are untouched
    pub fn apply_to(&self, grid: &mut PixelGrid) -> Result<()> {
        if grid.dimensions() != self.dimensions {
            return Err(BgRemovalError::invalid_dimensions(format!(
                "mask is {}x{} but image is {}x{}",
                self.dimensions.0,
                self.dimensions.1,
                grid.width(),
                grid.height()
            )));
        }
        self.clear_masked_alpha(grid);
        Ok(())
    }

    /// Zero alpha under the mask; callers guarantee matching dimensions
    pub(crate) fn clear_masked_alpha(&self, grid: &mut PixelGrid) {
        for (index, _) in self.data.iter().enumerate().filter(|(_, &m)| m) {
            grid.set_alpha_at(index, 0);
        }
    }

    /// Render as a grayscale image: 255 = removed, 0 = kept
    pub fn to_image(&self) -> Result<GrayImage> {
        let (width, height) = self.dimensions;
        let luma: Vec<u8> = self.data.iter().map(|&m| if m { 255 } else { 0 }).collect();
        ImageBuffer::<Luma<u8>, Vec<u8>>::from_raw(width, height, luma).ok_or_else(|| {
            BgRemovalError::internal(format!(
                "mask data does not fit {}x{} image",
                width, height
            ))
        })
    }

    /// Save the mask as a grayscale PNG
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.to_image()?
            .save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }

    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let masked_pixels = self.masked_count();
        let masked_ratio = if total_pixels > 0 {
            masked_pixels as f32 / total_pixels as f32
        } else {
            0.0
        };
        MaskStatistics {
            total_pixels,
            masked_pixels,
            kept_pixels: total_pixels - masked_pixels,
            masked_ratio,
        }
    }
}

/// Summary of a segmentation mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub masked_pixels: usize,
    pub kept_pixels: usize,
    pub masked_ratio: f32,
}

/// Per-stage timings in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Decoding the input container into pixels
    pub image_decode_ms: u64,

    /// Determining the reference color
    pub sampling_ms: u64,

    /// Candidate pass, flood fill and mask application
    pub segmentation_ms: u64,

    /// Encoding the result (set once the result is written)
    pub image_encode_ms: Option<u64>,

    /// End-to-end time
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Share of the total spent in each stage
    #[must_use]
    pub fn breakdown_percentages(&self) -> TimingBreakdown {
        if self.total_ms == 0 {
            return TimingBreakdown::default();
        }
        let total = self.total_ms as f64;
        let encode = self.image_encode_ms.unwrap_or(0);
        let pct = |ms: u64| ms as f64 / total * 100.0;
        TimingBreakdown {
            decode_pct: pct(self.image_decode_ms),
            sampling_pct: pct(self.sampling_ms),
            segmentation_pct: pct(self.segmentation_ms),
            encode_pct: pct(encode),
            other_pct: pct(self.other_overhead_ms()),
        }
    }

    /// Time not attributed to a named stage
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        let accounted = self.image_decode_ms
            + self.sampling_ms
            + self.segmentation_ms
            + self.image_encode_ms.unwrap_or(0);
        self.total_ms.saturating_sub(accounted)
    }
}

/// Percentages computed by [`ProcessingTimings::breakdown_percentages`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingBreakdown {
    pub decode_pct: f64,
    pub sampling_pct: f64,
    pub segmentation_pct: f64,
    pub encode_pct: f64,
    pub other_pct: f64,
}

/// Processing metadata attached to every result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub timings: ProcessingTimings,

    /// Color used as the background signal
    pub reference_color: ReferenceColor,

    /// Where `reference_color` came from
    pub sample_source: SampleSource,

    pub tolerance: Tolerance,

    /// Detected input container, when decoded from bytes or a file
    pub input_format: Option<String>,

    pub processed_at: DateTime<Utc>,
}

impl ProcessingMetadata {
    #[must_use]
    pub fn new(reference_color: ReferenceColor, sample_source: SampleSource, tolerance: Tolerance) -> Self {
        Self {
            timings: ProcessingTimings::new(),
            reference_color,
            sample_source,
            tolerance,
            input_format: None,
            processed_at: Utc::now(),
        }
    }
}

/// Result of a background removal operation
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// Output pixels: original RGB, alpha zeroed where masked
    pub grid: PixelGrid,

    /// The mask that was applied
    pub mask: SegmentationMask,

    pub metadata: ProcessingMetadata,

    /// Original input path (for logging purposes)
    pub input_path: Option<String>,
}

impl RemovalResult {
    #[must_use]
    pub fn new(grid: PixelGrid, mask: SegmentationMask, metadata: ProcessingMetadata) -> Self {
        Self {
            grid,
            mask,
            metadata,
            input_path: None,
        }
    }

    #[must_use]
    pub fn with_input_path(mut self, input_path: String) -> Self {
        self.input_path = Some(input_path);
        self
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.grid.dimensions()
    }

    #[must_use]
    pub fn transparent_pixel_count(&self) -> usize {
        self.grid.transparent_count()
    }

    #[must_use]
    pub fn timings(&self) -> &ProcessingTimings {
        &self.metadata.timings
    }

    /// Clone the output pixels into a `DynamicImage`
    pub fn to_image(&self) -> Result<DynamicImage> {
        self.grid.clone().into_dynamic()
    }

    /// Encode the output into the given format
    pub fn to_bytes(&self, format: crate::config::OutputFormat, quality: u8) -> Result<Vec<u8>> {
        crate::services::ImageIOService::encode(&self.grid, format, quality)
    }

    /// Save the output as PNG (keeps transparency)
    pub fn save_png<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.save(path, crate::config::OutputFormat::Png, 100)
    }

    /// Save the output in the given format and record the encode time
    pub fn save<P: AsRef<Path>>(
        &mut self,
        path: P,
        format: crate::config::OutputFormat,
        quality: u8,
    ) -> Result<()> {
        let encode_start = instant::Instant::now();
        crate::services::ImageIOService::save_grid(&self.grid, path.as_ref(), format, quality)?;
        let encode_ms = encode_start.elapsed().as_millis() as u64;
        self.metadata.timings.image_encode_ms = Some(encode_ms);
        self.metadata.timings.total_ms += encode_ms;
        Ok(())
    }

    /// One-line summary for logs
    #[must_use]
    pub fn timing_summary(&self) -> String {
        let t = &self.metadata.timings;
        let mut summary = format!(
            "Total: {}ms | Decode: {}ms | Sample: {}ms | Segment: {}ms",
            t.total_ms, t.image_decode_ms, t.sampling_ms, t.segmentation_ms
        );
        if let Some(encode_ms) = t.image_encode_ms {
            summary.push_str(&format!(" | Encode: {}ms", encode_ms));
        }
        summary
    }
}
