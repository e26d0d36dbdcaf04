//! Reference color sampling
//!
//! The background signal for an image is either its top-left pixel or a
//! pixel the user picked on the displayed image. Picks outside the image are
//! rejected with [`BgRemovalError::OutOfRangePick`], never clamped.
//!
//! Defaulting to the top-left pixel assumes that corner shows background.
//! Images whose corner is covered by the subject need a manual pick.

use crate::{
    error::{BgRemovalError, Result},
    types::{PickPoint, PixelGrid, ReferenceColor, SampleSource},
};
use tracing::debug;

/// Determines the reference color for one image
pub struct ColorSampler;

impl ColorSampler {
    /// Sample the reference color, honoring an optional manual pick
    ///
    /// `image` is the currently displayed image, i.e. the processed result if
    /// one exists, otherwise the original. Alpha is ignored.
    ///
    /// # Errors
    /// - `OutOfRangePick` if `pick` lies outside `[0, W) x [0, H)`
    pub fn sample(image: &PixelGrid, pick: Option<PickPoint>) -> Result<ReferenceColor> {
        Self::sample_with_source(image, pick).map(|(color, _)| color)
    }

    /// Like [`ColorSampler::sample`], also reporting where the color came from
    pub fn sample_with_source(
        image: &PixelGrid,
        pick: Option<PickPoint>,
    ) -> Result<(ReferenceColor, SampleSource)> {
        match pick {
            Some(point) => {
                let color = Self::sample_at(image, point)?;
                debug!(x = point.x, y = point.y, color = %color, "sampled picked pixel");
                Ok((color, SampleSource::Picked(point)))
            },
            None => {
                let color = Self::sample_default(image);
                debug!(color = %color, "sampled top-left pixel");
                Ok((color, SampleSource::TopLeft))
            },
        }
    }

    /// RGB of the top-left pixel
    #[must_use]
    pub fn sample_default(image: &PixelGrid) -> ReferenceColor {
        // PixelGrid is never empty, so index 0 always exists
        image
            .pixel_at(0)
            .map_or(ReferenceColor::new(0, 0, 0), ReferenceColor::from_rgba)
    }

    /// RGB at an explicit pixel
    ///
    /// # Errors
    /// - `OutOfRangePick` if the point is outside the image
    pub fn sample_at(image: &PixelGrid, point: PickPoint) -> Result<ReferenceColor> {
        image
            .pixel(point.x, point.y)
            .map(ReferenceColor::from_rgba)
            .ok_or_else(|| {
                BgRemovalError::out_of_range_pick(point.x, point.y, image.width(), image.height())
            })
    }

    /// Resolve the reference color from the sources a caller may hold
    ///
    /// Precedence: a fresh `pick`, then a previously cached `fixed` color,
    /// then the top-left pixel. A pick replaces the cached color rather than
    /// blending with it.
    pub fn resolve(
        image: &PixelGrid,
        pick: Option<PickPoint>,
        fixed: Option<ReferenceColor>,
    ) -> Result<(ReferenceColor, SampleSource)> {
        match (pick, fixed) {
            (Some(_), _) | (None, None) => Self::sample_with_source(image, pick),
            (None, Some(color)) => Ok((color, SampleSource::Fixed)),
        }
    }
}
