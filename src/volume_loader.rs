use crate::{
    enums::SortBy,
    metadata::MetadataDictionary,
    spatial::{SpatialFrame, cross, dot},
    volume::SampleVolume,
};

use dicom::{
    core::{
        Tag, VR,
        dictionary::{DataDictionary, DataDictionaryEntry},
        header::Header,
    },
    object::{FileDicomObject, InMemDicomObject, OpenFileOptions, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder},
};
use dicom_dictionary_std::{StandardDataDictionary, tags};
use ndarray::{Array2, Array3, s};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, warn};

const AXIAL_ORIENTATION: [f64; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
const MIN_SLICE_GAP: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No DICOM series found in {0}")]
    NoSeries(PathBuf),

    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

/// One acquisition as handed over by a [`SeriesLoader`].
#[derive(Clone, Debug)]
pub struct LoadedSeries {
    pub series_uid: String,
    pub volume: SampleVolume,
    pub metadata: MetadataDictionary,
    /// `(slices, rows, columns)` as stated by the source, which may differ
    /// from the shape that was actually decoded.
    pub reported_dim: (usize, usize, usize),
}

/// Discovers an acquisition in a directory and decodes it into a volume.
pub trait SeriesLoader {
    fn load(&self, directory: &Path) -> Result<LoadedSeries, VolumeLoaderError>;
}

/// [`SeriesLoader`] backed by dicom-rs. Picks the first series in
/// SeriesInstanceUID order.
#[derive(Clone, Copy, Debug, Default)]
pub struct DicomSeriesLoader {
    pub sort_by: SortBy,
}

impl SeriesLoader for DicomSeriesLoader {
    fn load(&self, directory: &Path) -> Result<LoadedSeries, VolumeLoaderError> {
        Self::load_from_directory(directory, self.sort_by)
    }
}

impl DicomSeriesLoader {
    pub fn new(sort_by: SortBy) -> Self {
        Self { sort_by }
    }

    /// Load a series from DICOM objects that all belong to it
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no valid images found or dimensions are inconsistent
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<LoadedSeries, VolumeLoaderError> {
        let first = dicom_objects
            .first()
            .ok_or(VolumeLoaderError::NoValidImages)?;
        let orientation = Self::get_orientation(first);
        let normal = cross(orientation.0, orientation.1);

        let mut slices: Vec<_> = dicom_objects
            .iter()
            .filter_map(|dicom_object| {
                let image = Self::decode_image(dicom_object)?;
                let order = Self::get_sort_order(dicom_object, sort_by, normal);
                Some((order, dicom_object, image))
            })
            .collect();

        if slices.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::sort_slices(&mut slices, sort_by);

        let images: Vec<_> = slices.iter().map(|(_, _, image)| image).collect();
        Self::validate_dimensions(&images)?;
        let volume_array = Self::build_volume_array(&images);

        let objects: Vec<_> = slices.iter().map(|(_, object, _)| *object).collect();
        let frame = Self::get_spatial_frame(&objects, orientation);
        let metadata = Self::collect_metadata(objects[0]);

        let reported_dim = (
            dicom_objects.len(),
            Self::get_u32(first, tags::ROWS).unwrap_or(0) as usize,
            Self::get_u32(first, tags::COLUMNS).unwrap_or(0) as usize,
        );
        let series_uid = Self::get_series_uid(first).unwrap_or_default();

        Ok(LoadedSeries {
            series_uid,
            volume: SampleVolume::new(volume_array, frame),
            metadata,
            reported_dim,
        })
    }

    /// Load a series from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
    ) -> Result<LoadedSeries, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Load the first series found in a directory
    ///
    /// Every regular file is probed; files that are not DICOM are skipped.
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<LoadedSeries, VolumeLoaderError> {
        let path = path.as_ref();
        let series = Self::discover_series(path)?;

        if series.is_empty() {
            return Err(VolumeLoaderError::NoSeries(path.to_path_buf()));
        }

        info!("Found {} DICOM series:", series.len());
        for (i, uid) in series.keys().enumerate() {
            info!("  [{i}] {uid}");
        }

        let Some((uid, files)) = series.into_iter().next() else {
            return Err(VolumeLoaderError::NoSeries(path.to_path_buf()));
        };
        info!("Using series [0]: {uid} ({} files)", files.len());

        Self::load_from_file_paths(&files, sort_by)
    }

    /// Group the DICOM image files of a directory by SeriesInstanceUID,
    /// reading headers only. Files without a series UID or image attributes
    /// (DICOMDIR, structured reports, presentation states) are skipped.
    fn discover_series(path: &Path) -> Result<BTreeMap<String, Vec<PathBuf>>, VolumeLoaderError> {
        let mut paths: Vec<_> = fs::read_dir(path)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        let mut series: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for path in paths {
            match OpenFileOptions::new()
                .read_until(tags::PIXEL_DATA)
                .open_file(&path)
            {
                Ok(header) => {
                    // PixelData itself is not read here; Rows stands in for it.
                    let uid = Self::get_series_uid(&header).filter(|uid| !uid.is_empty());
                    let is_image = header.element(tags::ROWS).is_ok();
                    match uid {
                        Some(uid) if is_image => series.entry(uid).or_default().push(path),
                        _ => debug!("Skipping {}: no image series", path.display()),
                    }
                }
                Err(e) => debug!("Skipping {}: {e}", path.display()),
            }
        }

        Ok(series)
    }

    fn get_series_uid(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<String> {
        let uid = dicom_object
            .element(tags::SERIES_INSTANCE_UID)
            .ok()?
            .to_str()
            .ok()?;
        Some(uid.trim_end_matches('\0').trim().to_string())
    }

    fn get_u32(dicom_object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<u32> {
        dicom_object.element(tag).ok()?.to_int::<u32>().ok()
    }

    fn get_vector(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: Tag,
    ) -> Option<[f64; 3]> {
        let values = dicom_object.element(tag).ok()?.to_multi_float64().ok()?;
        values.get(..3)?.try_into().ok()
    }

    fn get_orientation(dicom_object: &FileDicomObject<InMemDicomObject>) -> ([f64; 3], [f64; 3]) {
        let cosines = dicom_object
            .element(tags::IMAGE_ORIENTATION_PATIENT)
            .ok()
            .and_then(|element| element.to_multi_float64().ok())
            .filter(|values| values.len() >= 6)
            .map(|values| [values[0], values[1], values[2], values[3], values[4], values[5]])
            .unwrap_or(AXIAL_ORIENTATION);

        (
            [cosines[0], cosines[1], cosines[2]],
            [cosines[3], cosines[4], cosines[5]],
        )
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: SortBy,
        normal: [f64; 3],
    ) -> Option<f64> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                Self::get_vector(dicom_object, tags::IMAGE_POSITION_PATIENT)
                    .map(|position| dot(position, normal))
            }
            SortBy::TablePosition => dicom_object
                .element(tags::TABLE_POSITION)
                .ok()?
                .to_float64()
                .ok(),
            SortBy::InstanceNumber => dicom_object
                .element(tags::INSTANCE_NUMBER)
                .ok()?
                .to_int::<i32>()
                .ok()
                .map(f64::from),
            SortBy::None => Some(0.0),
        }
    }

    /// Decode the first frame of the first sample as raw stored values.
    /// Calibration is left to the normalizer.
    fn decode_image(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Array2<f32>> {
        let pixel_data = match dicom_object.decode_pixel_data() {
            Ok(pixel_data) => pixel_data,
            Err(e) => {
                warn!("Skipping slice, cannot decode pixel data: {e}");
                return None;
            }
        };
        let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
        match pixel_data.to_ndarray_with_options::<f32>(&options) {
            Ok(arr) => Some(arr.slice_move(s![0, .., .., 0])),
            Err(e) => {
                warn!("Skipping slice, cannot convert pixel data: {e}");
                None
            }
        }
    }

    fn sort_slices<T, U>(slices: &mut [(Option<f64>, T, U)], sort_by: SortBy) {
        if matches!(sort_by, SortBy::None) {
            return;
        }
        if slices.iter().any(|(order, _, _)| order.is_none()) {
            warn!("Some slices lack the {sort_by:?} sort key");
        }
        // Stable, so ties keep file order.
        slices.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    }

    fn validate_dimensions(images: &[&Array2<f32>]) -> Result<(), VolumeLoaderError> {
        let first_dim = images[0].dim();
        if images.iter().any(|img| img.dim() != first_dim) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(images: &[&Array2<f32>]) -> Array3<f32> {
        let (height, width) = images[0].dim();
        let depth = images.len();
        let mut volume = Array3::<f32>::zeros((depth, height, width));

        for (i, image) in images.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(*image);
        }

        volume
    }

    /// Origin from the first slice, directions from its orientation,
    /// spacing from PixelSpacing and the gap between slice positions.
    fn get_spatial_frame(
        slices: &[&FileDicomObject<InMemDicomObject>],
        (row_cosine, column_cosine): ([f64; 3], [f64; 3]),
    ) -> SpatialFrame {
        let normal = cross(row_cosine, column_cosine);
        let positions: Vec<_> = slices
            .iter()
            .map(|slice| Self::get_vector(slice, tags::IMAGE_POSITION_PATIENT))
            .collect();
        let origin = origin_of(&positions).unwrap_or([0.0; 3]);

        // PixelSpacing is (row spacing, column spacing), i.e. (y, x).
        let (x_spacing, y_spacing) = slices
            .iter()
            .find_map(|slice| {
                let pixel_spacing = slice
                    .element(tags::PIXEL_SPACING)
                    .ok()?
                    .to_multi_float64()
                    .ok()?;
                Some((*pixel_spacing.get(1)?, *pixel_spacing.first()?))
            })
            .unwrap_or((1.0, 1.0));

        let along_normal = |from: Option<[f64; 3]>, to: Option<[f64; 3]>| {
            let (from, to) = (from?, to?);
            Some(dot([to[0] - from[0], to[1] - from[1], to[2] - from[2]], normal))
        };

        let z_spacing = positions
            .get(1)
            .and_then(|&second| along_normal(origin_of(&positions), second))
            .map(f64::abs)
            .filter(|gap| *gap > MIN_SLICE_GAP)
            .or_else(|| Self::find_float(slices, tags::SPACING_BETWEEN_SLICES))
            .or_else(|| Self::find_float(slices, tags::SLICE_THICKNESS))
            .unwrap_or(1.0);

        let slice_sign = positions
            .last()
            .and_then(|&last| along_normal(origin_of(&positions), last))
            .filter(|extent| *extent < 0.0)
            .map_or(1.0, |_| -1.0);

        SpatialFrame::from_orientation(
            row_cosine,
            column_cosine,
            slice_sign,
            origin,
            [x_spacing, y_spacing, z_spacing],
        )
    }

    fn find_float(
        slices: &[&FileDicomObject<InMemDicomObject>],
        tag: Tag,
    ) -> Option<f64> {
        slices
            .iter()
            .find_map(|slice| slice.element(tag).ok()?.to_float64().ok())
            .filter(|value| *value > 0.0)
    }

    /// Top-level attributes of a slice, keyed `"(gggg,eeee) Alias"`.
    fn collect_metadata(dicom_object: &FileDicomObject<InMemDicomObject>) -> MetadataDictionary {
        let mut metadata = MetadataDictionary::new();
        for element in dicom_object.iter() {
            let tag = element.tag();
            if tag == tags::PIXEL_DATA || element.vr() == VR::SQ {
                continue;
            }
            let key = match StandardDataDictionary.by_tag(tag) {
                Some(entry) => format!("{tag} {}", entry.alias()),
                None => tag.to_string(),
            };
            match element.to_str() {
                Ok(value) => metadata.insert(key, value.trim_end_matches('\0').trim()),
                Err(e) => warn!("Could not read metadata {key}: {e}"),
            }
        }
        metadata
    }
}

fn origin_of(positions: &[Option<[f64; 3]>]) -> Option<[f64; 3]> {
    positions.first().copied().flatten()
}
