//! # DICOM-to-NRRD library
//!
//! This crate converts a folder of DICOM slices into a calibrated intensity
//! volume and writes it as a NRRD detached-header pair (`.nhdr` + `.raw`)
//! that volume viewers such as 3D Slicer can open.
//!
//! It builds on the dicom-rs ecosystem for reading the slices. The pipeline
//! is strictly sequential:
//!  - Series loading: the first series (by SeriesInstanceUID) in the folder
//!    is decoded into a slice-major `(z, y, x)` array, together with its
//!    spatial frame and a metadata dictionary
//!  - Calibration: RescaleSlope / RescaleIntercept are applied, values are
//!    clamped to `[-1024, 3071]` and narrowed to `i16`
//!  - Serialization: the raw payload is written x-fastest, the header
//!    declares `sizes: nx ny nz` plus the physical-space block, and the
//!    payload length is checked against the declared sizes
//!
//! Slices are assumed to be single-channel; for multiframe files only the
//! first frame is used.
//!
//! # Examples
//!
//! ## Converting a folder
//!
//! ```no_run
//! # use dicom_nrrd::{Converter, DicomSeriesLoader, SortBy};
//! let report = Converter::new(DicomSeriesLoader::new(SortBy::ImagePositionPatient))
//!     .convert("dicom", "output/patient1")
//!     .expect("should have converted the series");
//! println!("wrote {}", report.paths.header.display());
//! ```
//!
//! ## Reading the result back
//!
//! ```no_run
//! let (header, data) = dicom_nrrd::nrrd::read_volume("output/patient1.nhdr")
//!     .expect("should have read the volume");
//! assert_eq!(header.sizes, vec![data.dim().2, data.dim().1, data.dim().0]);
//! ```

pub mod calibration;
pub mod converter;
pub mod enums;
pub mod metadata;
pub mod nrrd;
pub mod spatial;
pub mod volume;
pub mod volume_loader;

pub use calibration::{Calibration, HU_MAX, HU_MIN, normalize};
pub use converter::{ConversionReport, ConvertError, Converter, OutputPaths};
pub use enums::{GeometryPolicy, HeaderStyle, SortBy};
pub use metadata::{MetadataDictionary, TagLookup};
pub use nrrd::{NrrdDescriptor, NrrdError, serialize};
pub use spatial::{Space, SpatialFrame};
pub use volume::{CalibratedVolume, SampleVolume, Volume};
pub use volume_loader::{DicomSeriesLoader, LoadedSeries, SeriesLoader, VolumeLoaderError};
