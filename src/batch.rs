//! Caller-held batch state for multi-image background removal
//!
//! A [`Batch`] keeps each uploaded image with its own status and optional
//! locked color. Items are independent: one failure never affects another,
//! and only items in [`ItemStatus::Ready`] are processed.

use crate::{
    error::{BgRemovalError, Result},
    processor::BackgroundRemovalProcessor,
    sampler::ColorSampler,
    services::ImageIOService,
    types::{PickPoint, PixelGrid, ReferenceColor, RemovalResult, Tolerance},
    OutputFormat,
};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Suffix appended to the file stem of every exported result
pub const OUTPUT_SUFFIX: &str = "_noBG";

/// Opaque identifier of a batch item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(Uuid);

impl ImageId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ImageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one batch item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    /// Waiting to be processed
    Ready,
    /// Currently being processed
    Processing,
    /// Finished; the item holds a result
    Done,
    /// Processing failed with the given reason
    Failed(String),
}

/// One image in a batch
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub id: ImageId,
    /// Display name, usually the uploaded file name
    pub name: String,
    pub source: PixelGrid,
    /// Color locked by a manual pick; overrides the top-left default
    pub custom_color: Option<ReferenceColor>,
    pub status: ItemStatus,
    pub result: Option<RemovalResult>,
}

impl BatchItem {
    fn new(name: String, source: PixelGrid) -> Self {
        Self {
            id: ImageId::new(),
            name,
            source,
            custom_color: None,
            status: ItemStatus::Ready,
            result: None,
        }
    }

    /// The image a user currently sees: the result once done, otherwise the source
    #[must_use]
    pub fn displayed(&self) -> &PixelGrid {
        match (&self.status, &self.result) {
            (ItemStatus::Done, Some(result)) => &result.grid,
            _ => &self.source,
        }
    }

    /// File name for the exported result, e.g. `cat_noBG.png`
    #[must_use]
    pub fn output_name(&self) -> String {
        output_file_name(&self.name, OutputFormat::Png)
    }

    fn record(&mut self, outcome: Result<RemovalResult>) -> std::result::Result<(), String> {
        match outcome {
            Ok(result) => {
                self.status = ItemStatus::Done;
                self.result = Some(result);
                Ok(())
            },
            Err(e) => {
                let reason = e.to_string();
                warn!(id = %self.id, name = %self.name, "batch item failed: {}", reason);
                self.status = ItemStatus::Failed(reason.clone());
                self.result = None;
                Err(reason)
            },
        }
    }
}

/// Items marked `Processing` by a parallel pass that has not recorded them yet
///
/// Dropping the guard puts every pending item back to `Ready`.
struct InFlight<'a> {
    items: &'a mut [BatchItem],
    pending: Vec<usize>,
}

impl<'a> InFlight<'a> {
    fn new(items: &'a mut [BatchItem]) -> Self {
        Self {
            items,
            pending: Vec::new(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        warn!(pending = self.pending.len(), "parallel batch pass cancelled");
        for &index in &self.pending {
            if let Some(item) = self.items.get_mut(index) {
                if item.status == ItemStatus::Processing {
                    item.status = ItemStatus::Ready;
                }
            }
        }
    }
}

/// `<stem>_noBG.<ext>` for an input file name
#[must_use]
pub fn output_file_name(name: &str, format: OutputFormat) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("image");
    format!(
        "{}{}.{}",
        stem,
        OUTPUT_SUFFIX,
        crate::services::OutputFormatHandler::get_extension(format)
    )
}

/// Outcome of one processing pass over a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Items that finished successfully, in batch order
    pub processed: Vec<ImageId>,
    /// Items that failed, with the reason
    pub failed: Vec<(ImageId, String)>,
}

impl BatchReport {
    #[must_use]
    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// `true` when nothing failed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn push(&mut self, id: ImageId, outcome: std::result::Result<(), String>) {
        match outcome {
            Ok(()) => self.processed.push(id),
            Err(reason) => self.failed.push((id, reason)),
        }
    }
}

/// Ordered collection of independent images
#[derive(Debug, Clone, Default)]
pub struct Batch {
    items: Vec<BatchItem>,
}

impl Batch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a decoded image; it starts as `Ready`
    pub fn add<S: Into<String>>(&mut self, name: S, grid: PixelGrid) -> ImageId {
        let item = BatchItem::new(name.into(), grid);
        let id = item.id;
        debug!(%id, name = %item.name, "image added to batch");
        self.items.push(item);
        id
    }

    /// Decode and add an encoded image
    ///
    /// # Errors
    /// Decoding errors are returned immediately and the batch is left unchanged.
    pub fn add_encoded<S: Into<String>>(&mut self, name: S, bytes: &[u8]) -> Result<ImageId> {
        let image = ImageIOService::load_from_bytes(bytes)?;
        let grid = PixelGrid::from_dynamic(&image)?;
        Ok(self.add(name, grid))
    }

    /// Remove one item, returning it
    pub fn remove(&mut self, id: ImageId) -> Option<BatchItem> {
        let index = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(index))
    }

    /// Drop every item
    pub fn clear(&mut self) {
        info!("clearing {} batch items", self.items.len());
        self.items.clear();
    }

    #[must_use]
    pub fn get(&self, id: ImageId) -> Option<&BatchItem> {
        self.items.iter().find(|item| item.id == id)
    }

    fn get_mut(&mut self, id: ImageId) -> Result<&mut BatchItem> {
        self.items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| BgRemovalError::unknown_image(id.to_string()))
    }

    #[must_use]
    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sample the displayed image at `point` and lock that color on the item
    ///
    /// Locking a color does not change the item's status. A finished item
    /// must be [`requeue`](Self::requeue)d to be processed again.
    ///
    /// # Errors
    /// - `UnknownImage` if `id` is not in the batch
    /// - `OutOfRangePick` if `point` is outside the displayed image
    pub fn pick_color(&mut self, id: ImageId, point: PickPoint) -> Result<ReferenceColor> {
        let item = self.get_mut(id)?;
        let color = ColorSampler::sample_at(item.displayed(), point)?;
        item.custom_color = Some(color);
        debug!(%id, color = %color, "color locked");
        Ok(color)
    }

    /// Forget a locked color so the top-left pixel is used again
    pub fn clear_custom_color(&mut self, id: ImageId) -> Result<()> {
        self.get_mut(id)?.custom_color = None;
        Ok(())
    }

    /// Move a finished or failed item back to `Ready`
    pub fn requeue(&mut self, id: ImageId) -> Result<()> {
        let item = self.get_mut(id)?;
        if item.status != ItemStatus::Processing {
            item.status = ItemStatus::Ready;
            item.result = None;
        }
        Ok(())
    }

    #[must_use]
    pub fn ready_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Ready)
            .count()
    }

    /// Items with a result, in batch order
    pub fn done_items(&self) -> impl Iterator<Item = &BatchItem> {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Done)
    }

    /// Process every `Ready` item one after another
    pub fn process_ready(&mut self, tolerance: Tolerance) -> BatchReport {
        let mut report = BatchReport::default();
        info!(ready = self.ready_count(), %tolerance, "processing batch");

        for item in self.items.iter_mut().filter(|i| i.status == ItemStatus::Ready) {
            item.status = ItemStatus::Processing;
            let outcome = BackgroundRemovalProcessor::run(
                item.source.clone(),
                None,
                item.custom_color,
                tolerance,
                None,
            );
            let recorded = item.record(outcome);
            report.push(item.id, recorded);
        }

        info!(
            processed = report.processed_count(),
            failed = report.failed_count(),
            "batch finished"
        );
        report
    }

    /// Process every `Ready` item concurrently on the blocking thread pool
    ///
    /// Outcomes are recorded per item in batch order once all tasks finish.
    /// If the returned future is dropped early, items still in flight go
    /// back to `Ready`.
    pub async fn process_ready_parallel(&mut self, tolerance: Tolerance) -> BatchReport {
        info!(ready = self.ready_count(), %tolerance, "processing batch in parallel");

        let mut in_flight = InFlight::new(&mut self.items);
        let mut tasks = Vec::new();
        for (index, item) in in_flight.items.iter_mut().enumerate() {
            if item.status != ItemStatus::Ready {
                continue;
            }
            item.status = ItemStatus::Processing;
            let grid = item.source.clone();
            let color = item.custom_color;
            in_flight.pending.push(index);
            tasks.push(tokio::task::spawn_blocking(move || {
                BackgroundRemovalProcessor::run(grid, None, color, tolerance, None)
            }));
        }

        let outcomes = join_all(tasks).await;

        let mut report = BatchReport::default();
        let indices = std::mem::take(&mut in_flight.pending);
        for (index, joined) in indices.into_iter().zip(outcomes) {
            let outcome = joined.unwrap_or_else(|e| {
                Err(BgRemovalError::internal(format!("worker task failed: {}", e)))
            });
            if let Some(item) = in_flight.items.get_mut(index) {
                let recorded = item.record(outcome);
                report.push(item.id, recorded);
            }
        }

        info!(
            processed = report.processed_count(),
            failed = report.failed_count(),
            "batch finished"
        );
        report
    }

    /// Write every finished item to `dir` as `<stem>_noBG.png`
    ///
    /// Returns the written paths in batch order.
    pub fn export_done<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let mut written = Vec::new();
        for item in self.done_items() {
            if let Some(result) = &item.result {
                let path = dir.join(item.output_name());
                ImageIOService::save_grid(&result.grid, &path, OutputFormat::Png, 100)?;
                written.push(path);
            }
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREEN: [u8; 4] = [0, 255, 0, 255];
    const RED: [u8; 4] = [255, 0, 0, 255];

    fn framed(size: u32, frame: [u8; 4], center: [u8; 4]) -> PixelGrid {
        let mut data = Vec::new();
        for y in 0..size {
            for x in 0..size {
                let border = x == 0 || y == 0 || x == size - 1 || y == size - 1;
                data.extend_from_slice(if border { &frame } else { &center });
            }
        }
        PixelGrid::new(size, size, data).unwrap()
    }

    #[test]
    fn test_output_file_name() {
        assert_eq!(output_file_name("cat.png", OutputFormat::Png), "cat_noBG.png");
        assert_eq!(output_file_name("dir/dog.final.jpg", OutputFormat::Png), "dog.final_noBG.png");
        assert_eq!(output_file_name("cat.png", OutputFormat::WebP), "cat_noBG.webp");
        assert_eq!(output_file_name("", OutputFormat::Png), "image_noBG.png");
    }

    #[test]
    fn test_add_remove_and_clear() {
        let mut batch = Batch::new();
        let a = batch.add("a.png", framed(3, GREEN, RED));
        let b = batch.add("b.png", framed(3, GREEN, RED));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.ready_count(), 2);

        assert_eq!(batch.remove(a).map(|i| i.name), Some("a.png".to_string()));
        assert!(batch.remove(a).is_none());
        assert_eq!(batch.items()[0].id, b);

        batch.clear();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_add_encoded_rejects_garbage_without_side_effects() {
        let mut batch = Batch::new();
        assert!(batch.add_encoded("notes.txt", b"hello").is_err());
        assert!(matches!(
            batch.add_encoded("empty.png", &[]),
            Err(BgRemovalError::EmptyInput(_))
        ));
        assert!(batch.is_empty());

        let bytes = ImageIOService::encode(&framed(3, GREEN, RED), OutputFormat::Png, 100).unwrap();
        let id = batch.add_encoded("ok.png", &bytes).unwrap();
        assert_eq!(batch.get(id).unwrap().source.dimensions(), (3, 3));
    }

    #[test]
    fn test_process_ready_marks_items_done() {
        let mut batch = Batch::new();
        let id = batch.add("a.png", framed(4, GREEN, RED));

        let report = batch.process_ready(Tolerance::default());
        assert_eq!(report.processed, vec![id]);
        assert!(report.is_success());

        let item = batch.get(id).unwrap();
        assert_eq!(item.status, ItemStatus::Done);
        assert_eq!(item.result.as_ref().unwrap().transparent_pixel_count(), 12);
        assert_eq!(batch.ready_count(), 0);

        // Done items are skipped
        let report = batch.process_ready(Tolerance::default());
        assert_eq!(report, BatchReport::default());
    }

    #[test]
    fn test_locked_color_is_used() {
        let mut batch = Batch::new();
        // Red frame, but the user wants the green centre removed, which is enclosed
        let id = batch.add("a.png", framed(4, RED, GREEN));
        let color = batch.pick_color(id, PickPoint::new(1, 1)).unwrap();
        assert_eq!(color, ReferenceColor::new(0, 255, 0));
        assert_eq!(batch.get(id).unwrap().custom_color, Some(color));

        batch.process_ready(Tolerance::default());
        let result = batch.get(id).unwrap().result.as_ref().unwrap();
        assert_eq!(result.metadata.reference_color, color);
        assert_eq!(result.transparent_pixel_count(), 0);
    }

    #[test]
    fn test_pick_errors() {
        let mut batch = Batch::new();
        let id = batch.add("a.png", framed(3, GREEN, RED));
        assert!(matches!(
            batch.pick_color(id, PickPoint::new(3, 0)),
            Err(BgRemovalError::OutOfRangePick { .. })
        ));
        assert!(batch.get(id).unwrap().custom_color.is_none());
        assert!(matches!(
            batch.pick_color(ImageId::new(), PickPoint::new(0, 0)),
            Err(BgRemovalError::UnknownImage(_))
        ));
    }

    #[test]
    fn test_requeue_and_repick_on_done_item() {
        let mut batch = Batch::new();
        let id = batch.add("a.png", framed(4, GREEN, RED));
        batch.process_ready(Tolerance::default());

        // Picking on a done item samples the result, whose RGB is unchanged
        let color = batch.pick_color(id, PickPoint::new(0, 0)).unwrap();
        assert_eq!(color, ReferenceColor::new(0, 255, 0));
        assert_eq!(batch.get(id).unwrap().status, ItemStatus::Done);

        batch.requeue(id).unwrap();
        assert_eq!(batch.get(id).unwrap().status, ItemStatus::Ready);
        assert!(batch.get(id).unwrap().result.is_none());

        batch.clear_custom_color(id).unwrap();
        assert!(batch.get(id).unwrap().custom_color.is_none());
    }

    #[test]
    fn test_done_items_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let mut batch = Batch::new();
        batch.add("first.png", framed(4, GREEN, RED));
        batch.process_ready(Tolerance::default());
        batch.add("second.png", framed(4, GREEN, RED));

        assert_eq!(batch.done_items().count(), 1);
        let written = batch.export_done(dir.path()).unwrap();
        assert_eq!(written, vec![dir.path().join("first_noBG.png")]);
        assert!(written[0].exists());
    }

    #[tokio::test]
    async fn test_parallel_matches_sequential() {
        let grids = [
            framed(5, GREEN, RED),
            framed(6, RED, GREEN),
            framed(7, [10, 10, 10, 255], [200, 200, 200, 255]),
        ];

        let mut sequential = Batch::new();
        let mut parallel = Batch::new();
        for (i, grid) in grids.iter().enumerate() {
            sequential.add(format!("{i}.png"), grid.clone());
            parallel.add(format!("{i}.png"), grid.clone());
        }

        sequential.process_ready(Tolerance::default());
        let report = parallel.process_ready_parallel(Tolerance::default()).await;
        assert_eq!(report.processed_count(), 3);

        for (a, b) in sequential.items().iter().zip(parallel.items()) {
            let (ra, rb) = (a.result.as_ref().unwrap(), b.result.as_ref().unwrap());
            assert_eq!(ra.grid, rb.grid);
            assert_eq!(ra.mask, rb.mask);
        }
        // Processed ids are reported in batch order
        let ids: Vec<_> = parallel.items().iter().map(|i| i.id).collect();
        assert_eq!(report.processed, ids);
    }
}
