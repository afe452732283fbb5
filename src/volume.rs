use crate::spatial::SpatialFrame;

use ndarray::Array3;

/// A dense 3-D grid in acquisition order `(depth, height, width)`, i.e.
/// slice index slowest and column fastest, together with its spatial frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Volume<T> {
    pub data: Array3<T>,
    pub frame: SpatialFrame,
}

/// Samples as decoded from the slices, before calibration.
pub type SampleVolume = Volume<f32>;

/// Calibrated, clamped intensities ready to be serialized.
pub type CalibratedVolume = Volume<i16>;

impl<T> Volume<T> {
    pub fn new(data: Array3<T>, frame: SpatialFrame) -> Self {
        Self { data, frame }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    pub fn frame(&self) -> &SpatialFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
