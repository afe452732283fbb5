//! End-to-end conversion tests with an in-memory series loader.

use dicom_nrrd::{
    CalibratedVolume, ConvertError, Converter, GeometryPolicy, HeaderStyle, LoadedSeries,
    MetadataDictionary, SampleVolume, SeriesLoader, SpatialFrame, VolumeLoaderError, normalize,
    nrrd::{self, read_volume},
};
use ndarray::Array3;
use std::{fs, path::Path};
use tempfile::TempDir;

/// Loader returning a fixed series, or `NoSeries` when empty.
struct FixedLoader {
    series: Option<LoadedSeries>,
}

impl SeriesLoader for FixedLoader {
    fn load(&self, directory: &Path) -> Result<LoadedSeries, VolumeLoaderError> {
        self.series
            .clone()
            .ok_or_else(|| VolumeLoaderError::NoSeries(directory.to_path_buf()))
    }
}

fn series(data: Array3<f32>, metadata: MetadataDictionary) -> LoadedSeries {
    let reported_dim = data.dim();
    LoadedSeries {
        series_uid: "1.2.3".to_string(),
        volume: SampleVolume::new(data, SpatialFrame::identity()),
        metadata,
        reported_dim,
    }
}

fn loader(series: LoadedSeries) -> FixedLoader {
    FixedLoader {
        series: Some(series),
    }
}

#[test]
fn test_saturated_volume_scenario() {
    let source = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let metadata = MetadataDictionary::from_iter([
        ("(0028,1053) RescaleSlope", "2.0"),
        ("(0028,1052) RescaleIntercept", "-500"),
    ]);
    let converter = Converter::new(loader(series(Array3::from_elem((4, 4, 4), 2000.0), metadata)));

    let report = converter
        .convert(source.path(), out.path().join("ct"))
        .unwrap();

    let raw = fs::read(&report.paths.raw).unwrap();
    assert_eq!(raw.len(), 128);
    assert!(raw.chunks_exact(2).all(|pair| pair == 3071i16.to_le_bytes()));
    assert_eq!(report.descriptor.sizes, [4, 4, 4]);
}

#[test]
fn test_identity_scenario_512x512x10() {
    let source = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let data = Array3::from_shape_fn((10, 512, 512), |(z, y, x)| ((z + y + x) % 4000) as f32 - 1500.0);
    let expected = data.mapv(|v| v.clamp(-1024.0, 3071.0) as i16);
    let converter = Converter::new(loader(series(data, MetadataDictionary::new())));

    let report = converter
        .convert(source.path(), out.path().join("big"))
        .unwrap();

    assert_eq!(
        fs::metadata(&report.paths.raw).unwrap().len(),
        512 * 512 * 10 * 2
    );
    let header = fs::read_to_string(&report.paths.header).unwrap();
    assert!(header.contains("sizes: 512 512 10\n"));

    let (_, read_back) = read_volume(&report.paths.header).unwrap();
    assert_eq!(read_back, expected);
}

#[test]
fn test_axis_order_round_trip() {
    let out = TempDir::new().unwrap();
    let data = Array3::from_shape_fn((3, 4, 5), |(z, y, x)| (z * 100 + y * 10 + x) as i16);
    let volume = CalibratedVolume::new(data.clone(), SpatialFrame::identity());
    let header_path = out.path().join("ramp.nhdr");
    let raw_path = out.path().join("ramp.raw");

    let descriptor = nrrd::serialize(&volume, &header_path, &raw_path).unwrap();
    assert_eq!(descriptor.sizes, [5, 4, 3]);

    // x varies fastest in the payload.
    let raw = fs::read(&raw_path).unwrap();
    let first: Vec<i16> = raw
        .chunks_exact(2)
        .take(6)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    assert_eq!(first, vec![0, 1, 2, 3, 4, 10]);

    let (header, read_back) = read_volume(&header_path).unwrap();
    assert_eq!(header.sizes, vec![5, 4, 3]);
    assert_eq!(header.data_file, "ramp.raw");
    assert_eq!(read_back, data);
    assert_eq!(
        header.sizes.iter().product::<usize>() * 2,
        raw.len()
    );
}

#[test]
fn test_oriented_header_describes_frame() {
    let source = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut loaded = series(Array3::zeros((2, 2, 2)), MetadataDictionary::new());
    loaded.volume.frame = SpatialFrame::from_orientation(
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        1.0,
        [-120.0, -110.5, 42.0],
        [0.8, 0.9, 2.5],
    );

    let report = Converter::new(loader(loaded))
        .convert(source.path(), out.path().join("frame"))
        .unwrap();

    let (header, _) = read_volume(&report.paths.header).unwrap();
    assert_eq!(
        header.space_directions,
        Some([[0.8, 0.0, 0.0], [0.0, 0.9, 0.0], [0.0, 0.0, 2.5]])
    );
    assert_eq!(header.space_origin, Some([-120.0, -110.5, 42.0]));
    assert_eq!(header.space, Some(dicom_nrrd::Space::LeftPosteriorSuperior));
}

#[test]
fn test_index_only_style() {
    let source = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let report = Converter::new(loader(series(Array3::zeros((1, 2, 3)), MetadataDictionary::new())))
        .with_header_style(HeaderStyle::IndexOnly)
        .with_comment("simple, no orientation")
        .convert(source.path(), out.path().join("simple"))
        .unwrap();

    let text = fs::read_to_string(&report.paths.header).unwrap();
    assert!(!text.contains("space"));
    assert!(text.contains("# simple, no orientation\n"));
    assert!(text.contains("sizes: 3 2 1\n"));
    assert!(text.contains("data file: simple.raw\n"));
}

#[test]
fn test_missing_calibration_is_not_fatal() {
    let source = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let metadata = MetadataDictionary::from_iter([("RescaleSlope", "garbage")]);
    let data = Array3::from_elem((1, 1, 2), 100.0);
    let converter = Converter::new(loader(series(data.clone(), metadata.clone())));

    let report = converter
        .convert(source.path(), out.path().join("x"))
        .unwrap();

    let (_, read_back) = read_volume(&report.paths.header).unwrap();
    let expected = normalize(&SampleVolume::new(data, SpatialFrame::identity()), &metadata);
    assert_eq!(read_back, expected.data);
    assert!(read_back.iter().all(|&v| v == 100));
}

#[test]
fn test_no_series_writes_nothing() {
    let source = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let converter = Converter::new(FixedLoader { series: None });

    let result = converter.convert(source.path(), out.path().join("none"));

    assert!(matches!(
        result,
        Err(ConvertError::Load(VolumeLoaderError::NoSeries(_)))
    ));
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn test_output_folder_created_only_after_load() {
    let source = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let base = out.path().join("nested").join("dir").join("ct");

    let result = Converter::new(FixedLoader { series: None }).convert(source.path(), &base);
    assert!(result.is_err());
    assert!(!out.path().join("nested").exists());

    let converter = Converter::new(loader(series(Array3::zeros((2, 2, 2)), MetadataDictionary::new())));
    let report = converter.convert(source.path(), &base).unwrap();
    assert!(report.paths.header.exists());
    assert!(report.paths.raw.exists());
    assert_eq!(report.paths.header, out.path().join("nested/dir/ct.nhdr"));
}

#[test]
fn test_source_must_be_directory() {
    let out = TempDir::new().unwrap();
    let file = out.path().join("not-a-dir");
    fs::write(&file, b"x").unwrap();
    let converter = Converter::new(loader(series(Array3::zeros((1, 1, 1)), MetadataDictionary::new())));

    let result = converter.convert(&file, out.path().join("y"));

    assert!(matches!(result, Err(ConvertError::NotADirectory(_))));
    assert!(!out.path().join("y.nhdr").exists());
    assert!(!out.path().join("y.raw").exists());
}

#[test]
fn test_geometry_mismatch_policy() {
    let source = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let mut loaded = series(Array3::zeros((2, 3, 3)), MetadataDictionary::new());
    loaded.reported_dim = (3, 3, 3);

    let strict = Converter::new(loader(loaded.clone()));
    let result = strict.convert(source.path(), out.path().join("strict"));
    assert!(matches!(
        result,
        Err(ConvertError::GeometryMismatch {
            reported: (3, 3, 3),
            decoded: (2, 3, 3),
        })
    ));
    assert!(!out.path().join("strict.raw").exists());

    let permissive =
        Converter::new(loader(loaded)).with_geometry_policy(GeometryPolicy::Permissive);
    let report = permissive
        .convert(source.path(), out.path().join("permissive"))
        .unwrap();
    assert_eq!(report.descriptor.sizes, [3, 3, 2]);
}

#[test]
fn test_truncated_payload_is_rejected_on_read() {
    let out = TempDir::new().unwrap();
    let volume = CalibratedVolume::new(Array3::zeros((2, 2, 2)), SpatialFrame::identity());
    let header_path = out.path().join("t.nhdr");
    let raw_path = out.path().join("t.raw");
    nrrd::serialize(&volume, &header_path, &raw_path).unwrap();

    fs::write(&raw_path, [0u8; 10]).unwrap();

    assert!(matches!(
        read_volume(&header_path),
        Err(dicom_nrrd::NrrdError::PayloadSize {
            expected: 16,
            actual: 10,
            ..
        })
    ));
}
