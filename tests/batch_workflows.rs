//! Batch workflow tests
//!
//! Items are independent: each keeps its own status and locked color, and a
//! failure never affects the others.

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use sticker_bgremove::{
    Batch, BgRemovalError, ImageId, ItemStatus, OutputFormat, PickPoint, PixelGrid,
    ReferenceColor, Tolerance,
};
use std::io::Cursor;
use tempfile::TempDir;

const WHITE: [u8; 4] = [255, 255, 255, 255];
const PINK: [u8; 4] = [255, 105, 180, 255];
const TEAL: [u8; 4] = [0, 128, 128, 255];

/// `size`x`size` image of `background` with a 2x2 `figure` block in the center
fn sticker(size: u32, background: [u8; 4], figure: [u8; 4]) -> PixelGrid {
    let lo = size / 2 - 1;
    let mut data = Vec::new();
    for y in 0..size {
        for x in 0..size {
            let inside = (lo..lo + 2).contains(&x) && (lo..lo + 2).contains(&y);
            data.extend_from_slice(if inside { &figure } else { &background });
        }
    }
    PixelGrid::new(size, size, data).unwrap()
}

fn png_bytes(grid: &PixelGrid) -> Vec<u8> {
    let image = RgbaImage::from_raw(grid.width(), grid.height(), grid.as_raw().to_vec()).unwrap();
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn status(batch: &Batch, id: ImageId) -> ItemStatus {
    batch.get(id).unwrap().status.clone()
}

#[test]
fn test_ready_processing_done_lifecycle() {
    let mut batch = Batch::new();
    let a = batch.add("a.png", sticker(6, WHITE, PINK));
    let b = batch.add("b.png", sticker(8, TEAL, WHITE));
    assert_eq!(batch.ready_count(), 2);

    let report = batch.process_ready(Tolerance::default());
    assert!(report.is_success());
    assert_eq!(report.processed, vec![a, b]);

    for id in [a, b] {
        assert_eq!(status(&batch, id), ItemStatus::Done);
    }
    let a_result = batch.get(a).unwrap().result.as_ref().unwrap();
    assert_eq!(a_result.transparent_pixel_count(), 32);
    let b_result = batch.get(b).unwrap().result.as_ref().unwrap();
    assert_eq!(b_result.transparent_pixel_count(), 60);

    // A second pass has nothing left to do
    let again = batch.process_ready(Tolerance::default());
    assert_eq!(again.processed_count(), 0);
    assert_eq!(batch.done_items().count(), 2);
}

#[test]
fn test_locked_color_is_reused() {
    let mut batch = Batch::new();
    // The top-left pixel is the figure color here, so auto-sampling is wrong
    let mut grid = sticker(6, WHITE, PINK);
    let mut raw = grid.clone().into_raw();
    raw[..4].copy_from_slice(&PINK);
    grid = PixelGrid::new(6, 6, raw).unwrap();
    let id = batch.add("corner.png", grid);

    let color = batch.pick_color(id, PickPoint::new(5, 5)).unwrap();
    assert_eq!(color, ReferenceColor::new(255, 255, 255));
    assert_eq!(batch.get(id).unwrap().custom_color, Some(color));
    assert_eq!(status(&batch, id), ItemStatus::Ready);

    batch.process_ready(Tolerance::new(20));
    let result = batch.get(id).unwrap().result.as_ref().unwrap();
    // Everything white is gone; the pink corner and the pink block remain
    assert_eq!(result.transparent_pixel_count(), 36 - 4 - 1);
    assert_eq!(result.metadata.reference_color, color);
}

#[test]
fn test_pick_on_done_item_reads_displayed_image() {
    let mut batch = Batch::new();
    let id = batch.add("done.png", sticker(6, WHITE, PINK));
    batch.process_ready(Tolerance::default());

    // RGB of the result is unchanged, only alpha differs
    let color = batch.pick_color(id, PickPoint::new(2, 2)).unwrap();
    assert_eq!(color, ReferenceColor::new(255, 105, 180));
    assert_eq!(status(&batch, id), ItemStatus::Done);

    batch.requeue(id).unwrap();
    assert_eq!(status(&batch, id), ItemStatus::Ready);
    assert!(batch.get(id).unwrap().result.is_none());

    batch.process_ready(Tolerance::default());
    let result = batch.get(id).unwrap().result.as_ref().unwrap();
    // Pink block does not touch the border
    assert_eq!(result.transparent_pixel_count(), 0);
}

#[test]
fn test_out_of_range_pick_leaves_item_untouched() {
    let mut batch = Batch::new();
    let id = batch.add("a.png", sticker(4, WHITE, PINK));

    let err = batch.pick_color(id, PickPoint::new(4, 0)).unwrap_err();
    assert!(matches!(err, BgRemovalError::OutOfRangePick { .. }));
    assert_eq!(batch.get(id).unwrap().custom_color, None);
    assert_eq!(status(&batch, id), ItemStatus::Ready);
}

#[test]
fn test_unknown_ids_are_errors() {
    let mut batch = Batch::new();
    let stranger = ImageId::new();
    assert!(matches!(
        batch.pick_color(stranger, PickPoint::new(0, 0)),
        Err(BgRemovalError::UnknownImage(_))
    ));
    assert!(batch.requeue(stranger).is_err());
    assert!(batch.clear_custom_color(stranger).is_err());
    assert!(batch.remove(stranger).is_none());
}

#[test]
fn test_bad_upload_does_not_touch_batch() {
    let mut batch = Batch::new();
    let good = batch
        .add_encoded("good.png", &png_bytes(&sticker(6, WHITE, PINK)))
        .unwrap();
    assert!(batch.add_encoded("notes.txt", b"hello").is_err());
    assert!(batch.add_encoded("empty.png", &[]).is_err());

    assert_eq!(batch.len(), 1);
    let report = batch.process_ready(Tolerance::default());
    assert_eq!(report.processed, vec![good]);
}

#[test]
fn test_remove_and_clear() {
    let mut batch = Batch::new();
    let a = batch.add("a.png", sticker(4, WHITE, PINK));
    let b = batch.add("b.png", sticker(4, WHITE, PINK));

    let removed = batch.remove(a).unwrap();
    assert_eq!(removed.name, "a.png");
    assert_eq!(batch.len(), 1);
    assert!(batch.get(b).is_some());

    batch.clear();
    assert!(batch.is_empty());
    assert_eq!(batch.process_ready(Tolerance::default()).processed_count(), 0);
}

#[tokio::test]
async fn test_parallel_matches_sequential() {
    let grids = [
        sticker(6, WHITE, PINK),
        sticker(10, TEAL, WHITE),
        sticker(4, PINK, TEAL),
        sticker(16, WHITE, TEAL),
    ];

    let mut sequential = Batch::new();
    let mut parallel = Batch::new();
    for (i, grid) in grids.iter().enumerate() {
        sequential.add(format!("{i}.png"), grid.clone());
        parallel.add(format!("{i}.png"), grid.clone());
    }

    let seq_report = sequential.process_ready(Tolerance::new(30));
    let par_report = parallel.process_ready_parallel(Tolerance::new(30)).await;
    assert_eq!(seq_report.processed_count(), 4);
    assert_eq!(par_report.processed_count(), 4);

    for (s, p) in sequential.items().iter().zip(parallel.items()) {
        assert_eq!(s.status, p.status);
        let s_grid = &s.result.as_ref().unwrap().grid;
        let p_grid = &p.result.as_ref().unwrap().grid;
        assert_eq!(s_grid, p_grid);
    }
}

#[test]
fn test_export_done_writes_no_bg_files() {
    let temp = TempDir::new().unwrap();
    let mut batch = Batch::new();
    batch.add("cat.jpg", sticker(6, WHITE, PINK));
    let pending = batch.add("dog.png", sticker(6, WHITE, PINK));
    batch.process_ready(Tolerance::default());
    batch.requeue(pending).unwrap();

    let written = batch.export_done(temp.path()).unwrap();
    assert_eq!(written, vec![temp.path().join("cat_noBG.png")]);

    let saved = image::open(&written[0]).unwrap().to_rgba8();
    assert_eq!(saved.get_pixel(0, 0), &Rgba([255, 255, 255, 0]));
    assert_eq!(saved.get_pixel(2, 2), &Rgba([255, 105, 180, 255]));

    assert_eq!(
        sticker_bgremove::output_file_name("cat.jpg", OutputFormat::WebP),
        "cat_noBG.webp"
    );
}

#[tokio::test]
async fn test_cancelled_parallel_pass_returns_items_to_ready() {
    let mut batch = Batch::new();
    let id = batch.add("large.png", sticker(2000, WHITE, PINK));

    {
        let mut pass = Box::pin(batch.process_ready_parallel(Tolerance::default()));
        // One poll spawns the work; dropping the future abandons it
        let first = futures::poll!(pass.as_mut());
        assert!(first.is_pending());
    }

    assert_eq!(status(&batch, id), ItemStatus::Ready);
    assert_eq!(batch.ready_count(), 1);
    assert!(batch.get(id).unwrap().result.is_none());

    let report = batch.process_ready_parallel(Tolerance::default()).await;
    assert_eq!(report.processed, vec![id]);
    assert_eq!(status(&batch, id), ItemStatus::Done);
    assert_eq!(
        batch.get(id).unwrap().result.as_ref().unwrap().transparent_pixel_count(),
        2000 * 2000 - 4
    );
}

#[tokio::test]
async fn test_timed_out_parallel_pass_can_be_reprocessed() {
    let mut batch = Batch::new();
    let id = batch.add("large.png", sticker(2000, WHITE, PINK));

    let timed_out = tokio::time::timeout(
        std::time::Duration::ZERO,
        batch.process_ready_parallel(Tolerance::default()),
    )
    .await;

    if timed_out.is_err() {
        assert_eq!(status(&batch, id), ItemStatus::Ready);
    }
    assert_ne!(status(&batch, id), ItemStatus::Processing);

    batch.process_ready(Tolerance::default());
    assert_eq!(status(&batch, id), ItemStatus::Done);
}
