//! Single-image background removal processor
//!
//! Wires decoding, color sampling and flood segmentation together and
//! records per-stage timings. Used by the library conveniences, the batch
//! model and the CLI so all of them behave identically.

use crate::{
    config::RemovalConfig,
    error::Result,
    sampler::ColorSampler,
    segmenter::FloodSegmenter,
    services::{ImageIOService, ProcessingStage, ProgressReporter, ProgressTracker},
    types::{
        PickPoint, PixelGrid, ProcessingMetadata, ProcessingTimings, ReferenceColor,
        RemovalResult, Tolerance,
    },
};
use image::DynamicImage;
use instant::Instant;
use log::{debug, info};
use std::path::Path;
use tracing::{debug as trace_debug, instrument, span, Level};

/// Runs the remove-background pipeline for one image at a time
pub struct BackgroundRemovalProcessor {
    config: RemovalConfig,
    progress_tracker: Option<ProgressTracker>,
}

impl BackgroundRemovalProcessor {
    /// Create a processor for a validated configuration
    ///
    /// # Errors
    /// - `InvalidConfig` if `config` does not validate
    pub fn new(config: RemovalConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            "Processor configured: tolerance {}, output {}",
            config.tolerance, config.output_format
        );
        Ok(Self {
            config,
            progress_tracker: None,
        })
    }

    /// Attach a progress reporter
    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.progress_tracker = Some(ProgressTracker::new(reporter));
        self
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    /// Remove the background of an already decoded grid
    ///
    /// Uses the configured manual pick, then the configured reference color,
    /// then the top-left pixel.
    ///
    /// # Errors
    /// - `OutOfRangePick` if the configured pick lies outside this image
    pub fn process_grid(&mut self, grid: PixelGrid) -> Result<RemovalResult> {
        let pick = self.config.manual_pick;
        let fixed = self.config.reference_color;
        self.process_grid_with(grid, pick, fixed)
    }

    /// Remove the background using an explicit pick or reference color
    ///
    /// The configured tolerance still applies.
    pub fn process_grid_with(
        &mut self,
        grid: PixelGrid,
        pick: Option<PickPoint>,
        fixed: Option<ReferenceColor>,
    ) -> Result<RemovalResult> {
        if let Some(tracker) = self.progress_tracker.as_mut() {
            tracker.restart();
        }
        self.segment_loaded(grid, pick, fixed)
    }

    /// Remove the background of a decoded image
    pub fn process_image(&mut self, image: &DynamicImage) -> Result<RemovalResult> {
        self.process_grid(PixelGrid::from_dynamic(image)?)
    }

    /// Decode encoded image bytes and remove the background
    ///
    /// # Errors
    /// - `EmptyInput` for an empty buffer
    /// - `Processing` if the bytes cannot be decoded
    pub fn process_bytes(&mut self, image_bytes: &[u8]) -> Result<RemovalResult> {
        let decode_start = Instant::now();
        let input_format = ImageIOService::detect_format(image_bytes);
        let grid = self.load_stage(|| {
            let image = ImageIOService::load_from_bytes(image_bytes)?;
            PixelGrid::from_dynamic(&image)
        })?;
        let decode_ms = decode_start.elapsed().as_millis() as u64;

        let mut result = self.segment_configured(grid)?;
        result.metadata.input_format = input_format.map(|f| format!("{:?}", f).to_lowercase());
        Self::add_decode_time(&mut result.metadata.timings, decode_ms);
        Ok(result)
    }

    /// Load an image file and remove the background
    pub fn process_file<P: AsRef<Path>>(&mut self, input_path: P) -> Result<RemovalResult> {
        let input_path_ref = input_path.as_ref();

        let decode_start = Instant::now();
        let grid = self.load_stage(|| ImageIOService::load_grid(input_path_ref))?;
        let decode_ms = decode_start.elapsed().as_millis() as u64;

        let mut result = self
            .segment_configured(grid)?
            .with_input_path(input_path_ref.display().to_string());
        result.metadata.input_format = input_path_ref
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        Self::add_decode_time(&mut result.metadata.timings, decode_ms);

        info!(
            "Processed {} ({})",
            input_path_ref.display(),
            result.timing_summary()
        );
        Ok(result)
    }

    /// Read an async stream to the end, then process it as encoded bytes
    pub async fn process_reader<R: tokio::io::AsyncRead + Unpin>(
        &mut self,
        mut reader: R,
    ) -> Result<RemovalResult> {
        use tokio::io::AsyncReadExt;

        let mut buffer = Vec::new();
        AsyncReadExt::read_to_end(&mut reader, &mut buffer).await?;
        self.process_bytes(&buffer)
    }

    /// Pipeline shared by every entry point, including batch items
    ///
    /// Takes the tolerance as given; range limits belong to the configuration.
    #[instrument(
        level = "debug",
        skip(grid, tracker),
        fields(width = grid.width(), height = grid.height(), tolerance = tolerance.value())
    )]
    pub(crate) fn run(
        grid: PixelGrid,
        pick: Option<PickPoint>,
        fixed: Option<ReferenceColor>,
        tolerance: Tolerance,
        mut tracker: Option<&mut ProgressTracker>,
    ) -> Result<RemovalResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::new();

        if let Some(t) = tracker.as_deref_mut() {
            t.report_stage(ProcessingStage::ColorSampling);
        }
        let sampling_start = Instant::now();
        let (reference, source) = ColorSampler::resolve(&grid, pick, fixed)?;
        timings.sampling_ms = sampling_start.elapsed().as_millis() as u64;

        if let Some(t) = tracker.as_deref_mut() {
            t.report_stage(ProcessingStage::Segmentation);
        }
        let segmentation_start = Instant::now();
        let mask = {
            let _span = span!(Level::DEBUG, "flood_fill", reference = %reference).entered();
            FloodSegmenter::compute_mask(&grid, reference, tolerance)
        };

        if let Some(t) = tracker.as_deref_mut() {
            t.report_stage(ProcessingStage::MaskApplication);
        }
        let mut output = grid;
        mask.apply_to(&mut output)?;
        timings.segmentation_ms = segmentation_start.elapsed().as_millis() as u64;
        timings.total_ms = total_start.elapsed().as_millis() as u64;

        trace_debug!(
            removed = mask.masked_count(),
            total = output.pixel_count(),
            "background removed"
        );

        let mut metadata = ProcessingMetadata::new(reference, source, tolerance);
        metadata.timings = timings.clone();

        if let Some(t) = tracker.as_deref_mut() {
            t.report_stage(ProcessingStage::Completed);
            t.report_completion(timings);
        }

        Ok(RemovalResult::new(output, mask, metadata))
    }

    /// Run the loading stage of a new image, reporting a failure against it
    fn load_stage<T>(&mut self, load: impl FnOnce() -> Result<T>) -> Result<T> {
        if let Some(tracker) = self.progress_tracker.as_mut() {
            tracker.restart();
            tracker.report_stage(ProcessingStage::ImageLoading);
        }
        let loaded = load();
        if let (Err(e), Some(tracker)) = (&loaded, &self.progress_tracker) {
            tracker.report_error(&e.to_string());
        }
        loaded
    }

    fn segment_configured(&mut self, grid: PixelGrid) -> Result<RemovalResult> {
        let pick = self.config.manual_pick;
        let fixed = self.config.reference_color;
        self.segment_loaded(grid, pick, fixed)
    }

    /// Sampling onwards, for a grid whose timing has already started
    fn segment_loaded(
        &mut self,
        grid: PixelGrid,
        pick: Option<PickPoint>,
        fixed: Option<ReferenceColor>,
    ) -> Result<RemovalResult> {
        let tolerance = self.config.tolerance();
        let result = Self::run(grid, pick, fixed, tolerance, self.progress_tracker.as_mut());

        if let (Err(e), Some(tracker)) = (&result, &self.progress_tracker) {
            tracker.report_error(&e.to_string());
        }
        result
    }

    fn add_decode_time(timings: &mut ProcessingTimings, decode_ms: u64) {
        timings.image_decode_ms = decode_ms;
        timings.total_ms += decode_ms;
    }
}
