/// Order in which the slices of a series are stacked along z.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortBy {
    /// ImagePositionPatient projected on the slice normal, ascending.
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    /// Keep the order the files were read in.
    None,
}

/// What to do when the decoded grid disagrees with the dimensions the
/// series loader reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GeometryPolicy {
    /// Abort the conversion.
    #[default]
    Strict,
    /// Log a warning and continue with the decoded shape.
    Permissive,
}

/// Which NRRD header variant to emit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HeaderStyle {
    /// Sizes plus the physical-space block (space, directions, origin).
    #[default]
    Oriented,
    /// Index-space sizes only, no physical-space fields.
    IndexOnly,
}
