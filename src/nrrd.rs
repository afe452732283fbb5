//! NRRD detached-header (`.nhdr`) + raw payload (`.raw`) serialization.
//!
//! Axis convention: header `sizes` lists `nx ny nz` (fastest axis first)
//! and the payload is laid out with x varying fastest, then y, then z.
//! The in-memory volume is `(z, y, x)`, so the writer views it with
//! reversed axes and reads that view in column-major order. The reader
//! undoes the same mapping.

use crate::enums::HeaderStyle;
use crate::spatial::Space;
use crate::volume::CalibratedVolume;

use ndarray::{Array3, Order, ShapeBuilder};
use std::{
    fmt::Write as _,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info};

pub const NRRD_MAGIC: &str = "NRRD0004";
pub const DEFAULT_COMMENT: &str = "calibrated intensity volume (HU), signed 16-bit";

const BYTES_PER_SAMPLE: u64 = std::mem::size_of::<i16>() as u64;
const SHORT_TYPE_NAMES: &[&str] = &[
    "short",
    "short int",
    "signed short",
    "signed short int",
    "int16",
    "int16_t",
];

#[derive(Debug, Error)]
pub enum NrrdError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Raw payload {path} holds {actual} bytes, sizes declare {expected}")]
    PayloadSize {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Not a NRRD header")]
    BadMagic,

    #[error("Invalid header field {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("Missing header field: {0}")]
    MissingField(&'static str),

    #[error("Unsupported {field}: {value}")]
    Unsupported { field: &'static str, value: String },

    #[error("Raw path {0} has no file name")]
    NoFileName(PathBuf),

    #[error("Cannot reshape payload: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Physical-space part of a header.
#[derive(Clone, Debug, PartialEq)]
pub struct SpaceBlock {
    pub space: Space,
    /// Scaled direction of the x, y and z axes, in that order.
    pub directions: [[f64; 3]; 3],
    pub origin: [f64; 3],
}

/// Everything the header needs to describe the payload.
#[derive(Clone, Debug, PartialEq)]
pub struct NrrdDescriptor {
    /// `nx, ny, nz`, in the order the bytes are laid out.
    pub sizes: [usize; 3],
    pub space: Option<SpaceBlock>,
}

impl NrrdDescriptor {
    pub fn from_volume(volume: &CalibratedVolume, style: HeaderStyle) -> Self {
        let (depth, height, width) = volume.dim();
        let space = match style {
            HeaderStyle::Oriented => Some(SpaceBlock {
                space: volume.frame.space,
                directions: volume.frame.scaled_directions(),
                origin: volume.frame.origin,
            }),
            HeaderStyle::IndexOnly => None,
        };

        Self {
            sizes: [width, height, depth],
            space,
        }
    }

    pub fn voxel_count(&self) -> u64 {
        self.sizes.iter().map(|&size| size as u64).product()
    }

    pub fn payload_len(&self) -> u64 {
        self.voxel_count() * BYTES_PER_SAMPLE
    }

    /// Render the header text. Every line, including the last, ends with
    /// a newline.
    pub fn render_header(&self, comment: &str, data_file: &str) -> String {
        let [nx, ny, nz] = self.sizes;
        let mut header = String::new();

        // Writing into a String cannot fail.
        let _ = writeln!(header, "{NRRD_MAGIC}");
        for line in comment.lines() {
            let _ = writeln!(header, "# {line}");
        }
        let _ = writeln!(header, "type: short");
        let _ = writeln!(header, "dimension: 3");
        let _ = writeln!(header, "sizes: {nx} {ny} {nz}");
        let _ = writeln!(header, "encoding: raw");
        let _ = writeln!(header, "endian: little");
        if let Some(block) = &self.space {
            let directions: Vec<String> = block.directions.iter().map(format_vector).collect();
            let _ = writeln!(header, "space: {}", block.space.nrrd_name());
            let _ = writeln!(header, "space directions: {}", directions.join(" "));
            let _ = writeln!(header, "kinds: domain domain domain");
            let _ = writeln!(header, "space origin: {}", format_vector(&block.origin));
        }
        let _ = writeln!(header, "data file: {data_file}");

        header
    }
}

/// Options for [`serialize_with`].
#[derive(Clone, Debug)]
pub struct WriteOptions {
    pub style: HeaderStyle,
    pub comment: String,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            style: HeaderStyle::default(),
            comment: DEFAULT_COMMENT.to_string(),
        }
    }
}

/// Write `volume` as an oriented header/raw pair.
pub fn serialize(
    volume: &CalibratedVolume,
    header_path: impl AsRef<Path>,
    raw_path: impl AsRef<Path>,
) -> Result<NrrdDescriptor, NrrdError> {
    serialize_with(volume, header_path, raw_path, &WriteOptions::default())
}

/// Write the raw payload, check its length against the declared sizes,
/// then write the header that references it.
pub fn serialize_with(
    volume: &CalibratedVolume,
    header_path: impl AsRef<Path>,
    raw_path: impl AsRef<Path>,
    options: &WriteOptions,
) -> Result<NrrdDescriptor, NrrdError> {
    let header_path = header_path.as_ref();
    let raw_path = raw_path.as_ref();
    let data_file = raw_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| NrrdError::NoFileName(raw_path.to_path_buf()))?;

    let descriptor = NrrdDescriptor::from_volume(volume, options.style);

    write_payload(volume, raw_path)?;
    let actual = fs::metadata(raw_path)?.len();
    let expected = descriptor.payload_len();
    if actual != expected {
        return Err(NrrdError::PayloadSize {
            path: raw_path.to_path_buf(),
            expected,
            actual,
        });
    }
    debug!("Wrote {actual} bytes to {}", raw_path.display());

    let header = descriptor.render_header(&options.comment, data_file);
    let mut writer = BufWriter::new(File::create(header_path)?);
    writer.write_all(header.as_bytes())?;
    writer.flush()?;

    let [nx, ny, nz] = descriptor.sizes;
    info!(
        "Wrote NRRD {} (sizes {nx} {ny} {nz})",
        header_path.display()
    );
    Ok(descriptor)
}

fn write_payload(volume: &CalibratedVolume, raw_path: &Path) -> Result<(), NrrdError> {
    // (z, y, x) -> (x, y, z); column-major over that view is x-fastest.
    let xyz = volume.data.view().reversed_axes();
    let flat = xyz.to_shape((xyz.len(), Order::ColumnMajor))?;
    let little_endian: Vec<i16> = flat.iter().map(|value| value.to_le()).collect();

    let mut writer = BufWriter::new(File::create(raw_path)?);
    writer.write_all(bytemuck::cast_slice(&little_endian))?;
    writer.flush()?;
    Ok(())
}

fn format_vector(vector: &[f64; 3]) -> String {
    // `+ 0.0` turns -0 into 0.
    let [x, y, z] = vector.map(|component| component + 0.0);
    format!("({x},{y},{z})")
}

/// Fields of a parsed NRRD header.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NrrdHeader {
    pub magic: String,
    pub comments: Vec<String>,
    pub type_name: String,
    pub dimension: usize,
    pub sizes: Vec<usize>,
    pub encoding: String,
    pub endian: Option<String>,
    pub space: Option<Space>,
    pub space_directions: Option<[[f64; 3]; 3]>,
    pub space_origin: Option<[f64; 3]>,
    pub data_file: String,
}

impl NrrdHeader {
    pub fn parse(text: &str) -> Result<Self, NrrdError> {
        let mut lines = text.lines();
        let magic = lines.next().map(str::trim).unwrap_or_default();
        if !magic.starts_with("NRRD") {
            return Err(NrrdError::BadMagic);
        }

        let mut header = NrrdHeader {
            magic: magic.to_string(),
            ..Default::default()
        };
        let mut dimension = None;
        let mut data_file = None;

        for line in lines {
            if let Some(comment) = line.strip_prefix('#') {
                header.comments.push(comment.trim().to_string());
                continue;
            }
            // Key/value pairs (`key:=value`) are not fields.
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            if value.starts_with('=') {
                continue;
            }
            let value = value.trim();

            match key.trim() {
                "type" => header.type_name = value.to_string(),
                "dimension" => {
                    dimension = Some(value.parse::<usize>().map_err(|_| NrrdError::InvalidField {
                        field: "dimension",
                        value: value.to_string(),
                    })?)
                }
                "sizes" => {
                    header.sizes = value
                        .split_whitespace()
                        .map(str::parse::<usize>)
                        .collect::<Result<_, _>>()
                        .map_err(|_| NrrdError::InvalidField {
                            field: "sizes",
                            value: value.to_string(),
                        })?
                }
                "encoding" => header.encoding = value.to_string(),
                "endian" => header.endian = Some(value.to_string()),
                "space" => {
                    header.space =
                        Some(Space::from_nrrd_name(value).ok_or_else(|| {
                            NrrdError::Unsupported {
                                field: "space",
                                value: value.to_string(),
                            }
                        })?)
                }
                "space directions" => {
                    let vectors = parse_vectors(value, "space directions")?;
                    header.space_directions = Some(vectors.try_into().map_err(|_| {
                        NrrdError::InvalidField {
                            field: "space directions",
                            value: value.to_string(),
                        }
                    })?);
                }
                "space origin" => {
                    let vectors = parse_vectors(value, "space origin")?;
                    match vectors.as_slice() {
                        [origin] => header.space_origin = Some(*origin),
                        _ => {
                            return Err(NrrdError::InvalidField {
                                field: "space origin",
                                value: value.to_string(),
                            });
                        }
                    }
                }
                "data file" | "datafile" => data_file = Some(value.to_string()),
                _ => {}
            }
        }

        header.dimension = dimension.ok_or(NrrdError::MissingField("dimension"))?;
        header.data_file = data_file.ok_or(NrrdError::MissingField("data file"))?;
        if header.type_name.is_empty() {
            return Err(NrrdError::MissingField("type"));
        }
        if header.encoding.is_empty() {
            return Err(NrrdError::MissingField("encoding"));
        }
        if header.sizes.len() != header.dimension {
            return Err(NrrdError::InvalidField {
                field: "sizes",
                value: format!("{:?} for dimension {}", header.sizes, header.dimension),
            });
        }

        Ok(header)
    }

    /// Expected payload length in bytes for a 16-bit volume.
    pub fn payload_len(&self) -> u64 {
        self.sizes.iter().map(|&size| size as u64).product::<u64>() * BYTES_PER_SAMPLE
    }
}

/// Parse `(a,b,c) (d,e,f) ...`. `none` entries are rejected.
fn parse_vectors(value: &str, field: &'static str) -> Result<Vec<[f64; 3]>, NrrdError> {
    let invalid = || NrrdError::InvalidField {
        field,
        value: value.to_string(),
    };

    let mut vectors = Vec::new();
    let mut rest = value.trim();
    while !rest.is_empty() {
        let open = rest.strip_prefix('(').ok_or_else(invalid)?;
        let (inner, tail) = open.split_once(')').ok_or_else(invalid)?;
        let components: Vec<f64> = inner
            .split(',')
            .map(|component| component.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| invalid())?;
        vectors.push(components.try_into().map_err(|_| invalid())?);
        rest = tail.trim_start();
    }
    Ok(vectors)
}

/// Read a 3-D signed 16-bit raw volume back into `(z, y, x)` order.
///
/// The data file is resolved relative to the header's directory.
pub fn read_volume(header_path: impl AsRef<Path>) -> Result<(NrrdHeader, Array3<i16>), NrrdError> {
    let header_path = header_path.as_ref();
    let header = NrrdHeader::parse(&fs::read_to_string(header_path)?)?;

    if !SHORT_TYPE_NAMES.contains(&header.type_name.as_str()) {
        return Err(NrrdError::Unsupported {
            field: "type",
            value: header.type_name.clone(),
        });
    }
    if header.encoding != "raw" {
        return Err(NrrdError::Unsupported {
            field: "encoding",
            value: header.encoding.clone(),
        });
    }
    match header.endian.as_deref() {
        Some("little") => {}
        other => {
            return Err(NrrdError::Unsupported {
                field: "endian",
                value: other.unwrap_or("<missing>").to_string(),
            });
        }
    }
    let [nx, ny, nz] = <[usize; 3]>::try_from(header.sizes.as_slice()).map_err(|_| {
        NrrdError::Unsupported {
            field: "dimension",
            value: header.dimension.to_string(),
        }
    })?;

    let raw_path = header_path
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(&header.data_file);
    let bytes = fs::read(&raw_path)?;
    let expected = header.payload_len();
    if bytes.len() as u64 != expected {
        return Err(NrrdError::PayloadSize {
            path: raw_path,
            expected,
            actual: bytes.len() as u64,
        });
    }

    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let xyz = Array3::from_shape_vec((nx, ny, nz).f(), samples)?;
    let zyx = xyz.reversed_axes().as_standard_layout().into_owned();

    Ok((header, zyx))
}
