//! Rescale slope/intercept recovery and Hounsfield-unit normalization.

use crate::metadata::{MetadataDictionary, TagLookup};
use crate::volume::{CalibratedVolume, SampleVolume};

use tracing::{debug, info, warn};

/// Lower bound of the output intensity window (air).
pub const HU_MIN: i16 = -1024;
/// Upper bound of the output intensity window.
pub const HU_MAX: i16 = 3071;

pub const RESCALE_SLOPE_KEYS: &[&str] = &["RescaleSlope", "0028|1053"];
pub const RESCALE_INTERCEPT_KEYS: &[&str] = &["RescaleIntercept", "0028|1052"];

/// Affine transform from stored sample values to intensity units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    pub slope: f64,
    pub intercept: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Calibration {
    pub const IDENTITY: Calibration = Calibration {
        slope: 1.0,
        intercept: 0.0,
    };

    pub fn new(slope: f64, intercept: f64) -> Self {
        Self { slope, intercept }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Calibrate, clamp to `[HU_MIN, HU_MAX]`, then narrow.
    #[inline]
    pub fn apply(&self, value: f32) -> i16 {
        let scaled = f64::from(value).mul_add(self.slope, self.intercept);
        // NaN survives clamp and becomes 0 on the cast.
        scaled.clamp(f64::from(HU_MIN), f64::from(HU_MAX)) as i16
    }
}

/// Calibration chosen from a metadata dictionary, with the lookups that
/// produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedCalibration {
    pub calibration: Calibration,
    pub slope: TagLookup<f64>,
    pub intercept: TagLookup<f64>,
}

impl ResolvedCalibration {
    /// True when a tag was present but unusable and identity was used.
    pub fn fell_back(&self) -> bool {
        self.slope.is_malformed() || self.intercept.is_malformed()
    }
}

impl Calibration {
    /// Resolve slope and intercept from metadata.
    ///
    /// A missing tag keeps its identity value. If either tag is malformed,
    /// the whole calibration falls back to identity.
    pub fn from_metadata(metadata: &MetadataDictionary) -> ResolvedCalibration {
        let slope = metadata.lookup_f64(RESCALE_SLOPE_KEYS);
        let intercept = metadata.lookup_f64(RESCALE_INTERCEPT_KEYS);

        let calibration = if slope.is_malformed() || intercept.is_malformed() {
            Calibration::IDENTITY
        } else {
            Calibration {
                slope: slope.value().unwrap_or(Self::IDENTITY.slope),
                intercept: intercept.value().unwrap_or(Self::IDENTITY.intercept),
            }
        };

        ResolvedCalibration {
            calibration,
            slope,
            intercept,
        }
    }
}

/// Calibrate a volume using the rescale tags found in `metadata`.
///
/// Never fails: unusable metadata is reported as a warning and identity
/// calibration is applied instead.
pub fn normalize(volume: &SampleVolume, metadata: &MetadataDictionary) -> CalibratedVolume {
    let resolved = Calibration::from_metadata(metadata);

    for lookup in [&resolved.slope, &resolved.intercept] {
        if let TagLookup::Malformed { key, value } = lookup {
            warn!("Could not parse {key} = {value:?}, using identity calibration");
        }
    }
    if matches!(resolved.slope, TagLookup::Missing)
        && matches!(resolved.intercept, TagLookup::Missing)
    {
        debug!("No rescale tags in metadata");
    }

    let Calibration { slope, intercept } = resolved.calibration;
    info!("Applying calibration: slope={slope}, intercept={intercept}");

    normalize_with(volume, resolved.calibration)
}

/// Apply a known calibration to every sample. The input is left untouched
/// and its spatial frame is copied forward.
pub fn normalize_with(volume: &SampleVolume, calibration: Calibration) -> CalibratedVolume {
    CalibratedVolume::new(
        volume.data.mapv(|value| calibration.apply(value)),
        volume.frame.clone(),
    )
}
