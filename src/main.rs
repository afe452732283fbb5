use std::{env, ffi::OsString, path::Path, process::ExitCode};

use dicom_nrrd::{Converter, DicomSeriesLoader, SortBy};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage:
  dicom-nrrd <dicom_folder> <output_base>
Example:
  dicom-nrrd ./data/CT_01 ./output/patient1";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<OsString> = env::args_os().skip(1).collect();
    let [source_dir, output_base] = args.as_slice() else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };

    match run(Path::new(source_dir), Path::new(output_base)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(source_dir: &Path, output_base: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let report = Converter::new(DicomSeriesLoader::new(SortBy::ImagePositionPatient))
        .convert(source_dir, output_base)?;

    let [nx, ny, nz] = report.descriptor.sizes;
    info!("Series {}", report.series_uid);
    info!("  nhdr: {}", report.paths.header.display());
    info!("  raw : {}", report.paths.raw.display());
    info!("  sizes (X Y Z): {nx} {ny} {nz}");
    Ok(())
}
