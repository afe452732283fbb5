//! Mapping from grid indices to physical (patient) coordinates.

/// World coordinate convention of a spatial frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Space {
    /// DICOM patient coordinates: +x left, +y posterior, +z superior.
    #[default]
    LeftPosteriorSuperior,
    RightAnteriorSuperior,
}

impl Space {
    /// Name used by the NRRD `space` field.
    pub fn nrrd_name(&self) -> &'static str {
        match self {
            Space::LeftPosteriorSuperior => "left-posterior-superior",
            Space::RightAnteriorSuperior => "right-anterior-superior",
        }
    }

    pub fn from_nrrd_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "left-posterior-superior" | "lps" => Some(Space::LeftPosteriorSuperior),
            "right-anterior-superior" | "ras" => Some(Space::RightAnteriorSuperior),
            _ => None,
        }
    }
}

/// Origin, direction cosines and spacing of a volume.
///
/// `direction` is stored row-major; its *columns* are the unit vectors of
/// the x (column), y (row) and z (slice) index axes. `spacing` is in the
/// same x, y, z order.
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialFrame {
    pub origin: [f64; 3],
    pub direction: [[f64; 3]; 3],
    pub spacing: [f64; 3],
    pub space: Space,
}

impl Default for SpatialFrame {
    fn default() -> Self {
        Self::identity()
    }
}

impl SpatialFrame {
    pub fn identity() -> Self {
        Self {
            origin: [0.0; 3],
            direction: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            spacing: [1.0; 3],
            space: Space::LeftPosteriorSuperior,
        }
    }

    /// Build a frame from DICOM ImageOrientationPatient cosines.
    ///
    /// The slice axis is `row × column`, flipped when `slice_sign` is
    /// negative (slices stacked against the normal).
    pub fn from_orientation(
        row_cosine: [f64; 3],
        column_cosine: [f64; 3],
        slice_sign: f64,
        origin: [f64; 3],
        spacing: [f64; 3],
    ) -> Self {
        let normal = cross(row_cosine, column_cosine);
        let normal = if slice_sign < 0.0 {
            normal.map(|v| -v)
        } else {
            normal
        };

        let mut direction = [[0.0; 3]; 3];
        for (axis, vector) in [row_cosine, column_cosine, normal].iter().enumerate() {
            for (row, value) in vector.iter().enumerate() {
                direction[row][axis] = *value;
            }
        }

        Self {
            origin,
            direction,
            spacing,
            space: Space::LeftPosteriorSuperior,
        }
    }

    /// Unit direction of index axis `axis` (0 = x, 1 = y, 2 = z).
    pub fn axis_direction(&self, axis: usize) -> [f64; 3] {
        [
            self.direction[0][axis],
            self.direction[1][axis],
            self.direction[2][axis],
        ]
    }

    /// Direction of each index axis scaled by its spacing, in x, y, z order.
    pub fn scaled_directions(&self) -> [[f64; 3]; 3] {
        std::array::from_fn(|axis| {
            self.axis_direction(axis)
                .map(|component| component * self.spacing[axis])
        })
    }
}

pub fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}
