//! Load → calibrate → serialize.

use crate::{
    calibration::normalize,
    enums::{GeometryPolicy, HeaderStyle},
    nrrd::{self, NrrdDescriptor, NrrdError, WriteOptions},
    volume_loader::{SeriesLoader, VolumeLoaderError},
};

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{info, warn};

pub const HEADER_EXTENSION: &str = "nhdr";
pub const RAW_EXTENSION: &str = "raw";

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Invalid DICOM folder: {0}")]
    NotADirectory(PathBuf),

    #[error(transparent)]
    Load(#[from] VolumeLoaderError),

    #[error(
        "Decoded grid {decoded:?} does not match reported dimensions {reported:?} (slices, rows, columns)"
    )]
    GeometryMismatch {
        reported: (usize, usize, usize),
        decoded: (usize, usize, usize),
    },

    #[error("Cannot create output folder {path}: {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Write(#[from] NrrdError),
}

/// Header and raw paths derived from one output base.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPaths {
    pub header: PathBuf,
    pub raw: PathBuf,
}

impl OutputPaths {
    /// Append `.nhdr` / `.raw` to the full base name; an existing
    /// extension on the base is kept.
    pub fn from_base(base: impl AsRef<Path>) -> Self {
        let with_extension = |extension: &str| {
            let mut path = OsString::from(base.as_ref().as_os_str());
            path.push(".");
            path.push(extension);
            PathBuf::from(path)
        };

        Self {
            header: with_extension(HEADER_EXTENSION),
            raw: with_extension(RAW_EXTENSION),
        }
    }
}

/// Summary of a finished conversion.
#[derive(Clone, Debug)]
pub struct ConversionReport {
    pub series_uid: String,
    pub paths: OutputPaths,
    pub descriptor: NrrdDescriptor,
}

pub struct Converter<L> {
    loader: L,
    geometry: GeometryPolicy,
    write_options: WriteOptions,
}

impl<L: SeriesLoader> Converter<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            geometry: GeometryPolicy::default(),
            write_options: WriteOptions::default(),
        }
    }

    pub fn with_geometry_policy(mut self, geometry: GeometryPolicy) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_header_style(mut self, style: HeaderStyle) -> Self {
        self.write_options.style = style;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.write_options.comment = comment.into();
        self
    }

    /// Convert the first series in `source_dir` to `<output_base>.nhdr` and
    /// `<output_base>.raw`.
    ///
    /// Nothing is written, and no output folder is created, unless loading
    /// and geometry validation succeed.
    pub fn convert(
        &self,
        source_dir: impl AsRef<Path>,
        output_base: impl AsRef<Path>,
    ) -> Result<ConversionReport, ConvertError> {
        let source_dir = source_dir.as_ref();
        if !source_dir.is_dir() {
            return Err(ConvertError::NotADirectory(source_dir.to_path_buf()));
        }

        info!("Loading series from {}", source_dir.display());
        let series = self.loader.load(source_dir)?;
        self.check_geometry(series.reported_dim, series.volume.dim())?;

        info!("Applying calibration");
        let calibrated = normalize(&series.volume, &series.metadata);

        let paths = OutputPaths::from_base(&output_base);
        Self::create_output_dir(output_base.as_ref())?;
        info!("Writing NRRD");
        let descriptor =
            nrrd::serialize_with(&calibrated, &paths.header, &paths.raw, &self.write_options)?;

        Ok(ConversionReport {
            series_uid: series.series_uid,
            paths,
            descriptor,
        })
    }

    /// Create the parent folder of the output base, if it has one.
    fn create_output_dir(output_base: &Path) -> Result<(), ConvertError> {
        let Some(out_dir) = output_base
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty() && !dir.exists())
        else {
            return Ok(());
        };
        fs::create_dir_all(out_dir).map_err(|source| ConvertError::OutputDir {
            path: out_dir.to_path_buf(),
            source,
        })
    }

    fn check_geometry(
        &self,
        reported: (usize, usize, usize),
        decoded: (usize, usize, usize),
    ) -> Result<(), ConvertError> {
        if reported == decoded {
            return Ok(());
        }
        match self.geometry {
            GeometryPolicy::Strict => Err(ConvertError::GeometryMismatch { reported, decoded }),
            GeometryPolicy::Permissive => {
                warn!(
                    "Decoded grid {decoded:?} does not match reported dimensions {reported:?}, continuing"
                );
                Ok(())
            }
        }
    }
}
