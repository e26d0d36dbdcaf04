//! Border-seeded flood-fill segmentation
//!
//! Removes the background region that is connected to the image border
//! through pixels whose color is within tolerance of a reference color.
//! Only alpha is changed; RGB is preserved bit-for-bit.
//!
//! Pixels that match the reference color but are enclosed by non-matching
//! pixels (eyes, highlights, holes) stay opaque.

use crate::{
    error::Result,
    types::{PixelGrid, ReferenceColor, SegmentationMask, Tolerance},
};
use tracing::{debug, instrument, trace};

/// Color-similarity flood fill over a pixel grid
pub struct FloodSegmenter;

impl FloodSegmenter {
    /// Segment `grid` and return a copy with the background made transparent
    ///
    /// Never fails: a `PixelGrid` is validated when it is constructed, and an
    /// image with no matching border pixel comes back unchanged.
    #[must_use]
    pub fn segment(grid: &PixelGrid, reference: ReferenceColor, tolerance: Tolerance) -> PixelGrid {
        let mut output = grid.clone();
        Self::segment_in_place(&mut output, reference, tolerance);
        output
    }

    /// Segment `grid` in place, returning the mask that was applied
    pub fn segment_in_place(
        grid: &mut PixelGrid,
        reference: ReferenceColor,
        tolerance: Tolerance,
    ) -> SegmentationMask {
        let mask = Self::compute_mask(grid, reference, tolerance);
        mask.clear_masked_alpha(grid);
        mask
    }

    /// Compute the removal mask without touching the grid
    #[instrument(level = "debug", skip(grid), fields(width = grid.width(), height = grid.height()))]
    pub fn compute_mask(
        grid: &PixelGrid,
        reference: ReferenceColor,
        tolerance: Tolerance,
    ) -> SegmentationMask {
        let candidates = Self::candidate_mask(grid, reference, tolerance);
        let visited = Self::flood_from_border(&candidates, grid.width(), grid.height());

        debug!(
            candidates = candidates.iter().filter(|&&c| c).count(),
            removed = visited.iter().filter(|&&v| v).count(),
            "flood fill finished"
        );

        SegmentationMask::new(visited, grid.dimensions())
    }

    /// `true` for every pixel whose squared RGB distance to `reference` is below `tolerance²`
    ///
    /// Alpha is ignored, so an already segmented image yields the same candidates.
    #[must_use]
    pub fn candidate_mask(
        grid: &PixelGrid,
        reference: ReferenceColor,
        tolerance: Tolerance,
    ) -> Vec<bool> {
        grid.pixels()
            .map(|[r, g, b, _]| tolerance.matches(reference.distance_squared(r, g, b)))
            .collect()
    }

    /// Flood closure of `candidates` reachable from any border pixel (4-connected)
    ///
    /// Uses an explicit stack sized for the worst case, so large images
    /// cannot exhaust the call stack. A pixel is marked visited before it is
    /// pushed and is therefore pushed at most once.
    ///
    /// `candidates` must hold `width * height` entries.
    #[must_use]
    pub fn flood_from_border(candidates: &[bool], width: u32, height: u32) -> Vec<bool> {
        let (w, h) = (width as usize, height as usize);
        let len = w * h;
        let mut visited = vec![false; len];
        if len == 0 || candidates.len() != len {
            return visited;
        }

        let mut stack: Vec<usize> = Vec::with_capacity(len);
        let push = |idx: usize, visited: &mut Vec<bool>, stack: &mut Vec<usize>| {
            if candidates[idx] && !visited[idx] {
                visited[idx] = true;
                stack.push(idx);
            }
        };

        for x in 0..w {
            push(x, &mut visited, &mut stack);
            push((h - 1) * w + x, &mut visited, &mut stack);
        }
        for y in 0..h {
            push(y * w, &mut visited, &mut stack);
            push(y * w + w - 1, &mut visited, &mut stack);
        }
        trace!(seeds = stack.len(), "border seeds collected");

        while let Some(idx) = stack.pop() {
            let (x, y) = (idx % w, idx / w);
            if x > 0 {
                push(idx - 1, &mut visited, &mut stack);
            }
            if x + 1 < w {
                push(idx + 1, &mut visited, &mut stack);
            }
            if y > 0 {
                push(idx - w, &mut visited, &mut stack);
            }
            if y + 1 < h {
                push(idx + w, &mut visited, &mut stack);
            }
        }

        visited
    }

    /// Segment a raw RGBA buffer, validating it first
    ///
    /// # Errors
    /// - `EmptyInput` for a zero-length buffer
    /// - `InvalidDimensions` for a zero dimension or a buffer of the wrong length
    pub fn segment_raw(
        width: u32,
        height: u32,
        rgba: Vec<u8>,
        reference: ReferenceColor,
        tolerance: Tolerance,
    ) -> Result<Vec<u8>> {
        let mut grid = PixelGrid::new(width, height, rgba)?;
        Self::segment_in_place(&mut grid, reference, tolerance);
        Ok(grid.into_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BgRemovalError;

    const GREEN: [u8; 4] = [0, 255, 0, 255];
    const RED: [u8; 4] = [255, 0, 0, 255];

    fn grid_from_rows(rows: &[&[[u8; 4]]]) -> PixelGrid {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        let data = rows.iter().flat_map(|r| r.iter().flatten().copied()).collect();
        PixelGrid::new(width, height, data).unwrap()
    }

    #[test]
    fn test_candidate_mask_uses_squared_distance() {
        let grid = grid_from_rows(&[&[[0, 0, 0, 255], [6, 8, 0, 255], [5, 5, 5, 255]]]);
        // distances²: 0, 100, 75
        let mask = FloodSegmenter::candidate_mask(&grid, ReferenceColor::new(0, 0, 0), Tolerance::new(10));
        assert_eq!(mask, vec![true, false, true]);
    }

    #[test]
    fn test_candidate_mask_ignores_alpha() {
        let grid = grid_from_rows(&[&[[0, 255, 0, 0], [0, 255, 0, 255]]]);
        let mask = FloodSegmenter::candidate_mask(&grid, ReferenceColor::new(0, 255, 0), Tolerance::new(1));
        assert_eq!(mask, vec![true, true]);
    }

    #[test]
    fn test_flood_reaches_only_border_connected_candidates() {
        // 5x5, candidates everywhere except a ring around the centre
        #[rustfmt::skip]
        let candidates = vec![
            true, true,  true,  true,  true,
            true, false, false, false, true,
            true, false, true,  false, true,
            true, false, false, false, true,
            true, true,  true,  true,  true,
        ];
        let visited = FloodSegmenter::flood_from_border(&candidates, 5, 5);
        assert!(!visited[12], "enclosed centre must not be reached");
        assert_eq!(visited.iter().filter(|&&v| v).count(), 16);
    }

    #[test]
    fn test_flood_is_four_connected() {
        // Interior candidate touches the border candidate only diagonally
        #[rustfmt::skip]
        let candidates = vec![
            true,  false, false,
            false, true,  false,
            false, false, false,
        ];
        let visited = FloodSegmenter::flood_from_border(&candidates, 3, 3);
        assert_eq!(visited, vec![true, false, false, false, false, false, false, false, false]);
    }

    #[test]
    fn test_flood_follows_winding_path() {
        #[rustfmt::skip]
        let candidates = vec![
            false, false, false, false, false,
            true,  true,  true,  true,  false,
            false, false, false, true,  false,
            false, true,  true,  true,  false,
            false, false, false, false, false,
        ];
        let visited = FloodSegmenter::flood_from_border(&candidates, 5, 5);
        assert_eq!(visited, candidates);
    }

    #[test]
    fn test_flood_rejects_mismatched_candidates() {
        let visited = FloodSegmenter::flood_from_border(&[true, true], 3, 3);
        assert_eq!(visited, vec![false; 9]);
    }

    #[test]
    fn test_single_pixel_image() {
        let grid = PixelGrid::filled(1, 1, GREEN).unwrap();
        let out = FloodSegmenter::segment(&grid, ReferenceColor::new(0, 255, 0), Tolerance::new(10));
        assert_eq!(out.alpha_channel(), vec![0]);
    }

    #[test]
    fn test_single_row_and_column() {
        let row = grid_from_rows(&[&[GREEN, RED, GREEN, GREEN]]);
        let out = FloodSegmenter::segment(&row, ReferenceColor::new(0, 255, 0), Tolerance::new(10));
        assert_eq!(out.alpha_channel(), vec![0, 255, 0, 0]);

        let column = grid_from_rows(&[&[RED], &[GREEN], &[RED]]);
        let out = FloodSegmenter::segment(&column, ReferenceColor::new(0, 255, 0), Tolerance::new(10));
        assert_eq!(out.alpha_channel(), vec![255, 0, 255]);
    }

    #[test]
    fn test_no_border_match_leaves_image_unchanged() {
        let grid = grid_from_rows(&[
            &[RED, RED, RED],
            &[RED, GREEN, RED],
            &[RED, RED, RED],
        ]);
        let out = FloodSegmenter::segment(&grid, ReferenceColor::new(0, 255, 0), Tolerance::new(10));
        assert_eq!(out, grid);
    }

    #[test]
    fn test_rgb_is_preserved_and_alpha_kept_elsewhere() {
        let grid = grid_from_rows(&[
            &[GREEN, GREEN, GREEN],
            &[GREEN, [10, 20, 30, 128], GREEN],
            &[GREEN, GREEN, GREEN],
        ]);
        let out = FloodSegmenter::segment(&grid, ReferenceColor::new(0, 255, 0), Tolerance::new(10));
        assert_eq!(out.pixel(1, 1), Some([10, 20, 30, 128]));
        for (before, after) in grid.pixels().zip(out.pixels()) {
            assert_eq!(before[..3], after[..3]);
        }
        assert_eq!(out.transparent_count(), 8);
    }

    #[test]
    fn test_zero_tolerance_matches_nothing() {
        let grid = PixelGrid::filled(3, 3, GREEN).unwrap();
        let out = FloodSegmenter::segment(&grid, ReferenceColor::new(0, 255, 0), Tolerance::new(0));
        assert_eq!(out.transparent_count(), 0);
    }

    #[test]
    fn test_segment_in_place_returns_applied_mask() {
        let mut grid = grid_from_rows(&[&[GREEN, RED], &[GREEN, GREEN]]);
        let mask = FloodSegmenter::segment_in_place(&mut grid, ReferenceColor::new(0, 255, 0), Tolerance::new(10));
        assert_eq!(mask.data, vec![true, false, true, true]);
        assert_eq!(grid.alpha_channel(), vec![0, 255, 0, 0]);
    }

    #[test]
    fn test_segment_in_place_matches_mask_apply_to() {
        let source = grid_from_rows(&[&[GREEN, RED, GREEN], &[RED, GREEN, RED], &[GREEN, RED, GREEN]]);
        let reference = ReferenceColor::new(0, 255, 0);
        let tolerance = Tolerance::new(10);

        let mut in_place = source.clone();
        let mask = FloodSegmenter::segment_in_place(&mut in_place, reference, tolerance);

        let mut applied = source.clone();
        FloodSegmenter::compute_mask(&source, reference, tolerance)
            .apply_to(&mut applied)
            .unwrap();

        assert_eq!(in_place, applied);
        assert_eq!(in_place, FloodSegmenter::segment(&source, reference, tolerance));
        // Enclosed green center stays opaque
        assert!(!mask.is_masked(1, 1));
        assert_eq!(in_place.transparent_count(), 4);
    }

    #[test]
    fn test_segment_raw_validates_input() {
        let reference = ReferenceColor::new(0, 255, 0);
        let tolerance = Tolerance::new(10);

        assert!(matches!(
            FloodSegmenter::segment_raw(2, 2, vec![], reference, tolerance),
            Err(BgRemovalError::EmptyInput(_))
        ));
        assert!(matches!(
            FloodSegmenter::segment_raw(0, 2, vec![0; 8], reference, tolerance),
            Err(BgRemovalError::InvalidDimensions(_))
        ));
        assert!(matches!(
            FloodSegmenter::segment_raw(2, 2, vec![0; 12], reference, tolerance),
            Err(BgRemovalError::InvalidDimensions(_))
        ));

        let out = FloodSegmenter::segment_raw(1, 1, GREEN.to_vec(), reference, tolerance).unwrap();
        assert_eq!(out, vec![0, 255, 0, 0]);
    }

    #[test]
    fn test_large_image_does_not_overflow_stack() {
        // A single serpentine corridor maximises traversal depth
        let (w, h) = (512u32, 512u32);
        let mut data = Vec::with_capacity((w * h * 4) as usize);
        for y in 0..h {
            for x in 0..w {
                let open = y % 2 == 0 || (y % 4 == 1 && x == w - 1) || (y % 4 == 3 && x == 0);
                data.extend_from_slice(if open { &GREEN } else { &RED });
            }
        }
        let grid = PixelGrid::new(w, h, data).unwrap();
        let mask = FloodSegmenter::compute_mask(&grid, ReferenceColor::new(0, 255, 0), Tolerance::new(10));
        let candidates = FloodSegmenter::candidate_mask(&grid, ReferenceColor::new(0, 255, 0), Tolerance::new(10));
        assert_eq!(mask.data, candidates);
    }
}
