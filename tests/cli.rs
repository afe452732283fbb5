//! Exit codes and side effects of the `dicom-nrrd` binary.

use std::{
    ffi::OsStr,
    fs,
    process::{Command, Output},
};
use tempfile::TempDir;

fn dicom_nrrd(args: &[&OsStr]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dicom-nrrd"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .unwrap()
}

#[test]
fn test_wrong_argument_count_prints_usage() {
    for args in [vec![], vec!["only-one"], vec!["a", "b", "c"]] {
        let args: Vec<&OsStr> = args.iter().map(OsStr::new).collect();
        let output = dicom_nrrd(&args);

        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("Usage:"), "stderr: {stderr}");
        assert!(stderr.contains("dicom-nrrd <dicom_folder> <output_base>"));
    }
}

#[test]
fn test_source_file_fails_without_output() {
    let work = TempDir::new().unwrap();
    let source = work.path().join("slice.dcm");
    fs::write(&source, b"not a folder").unwrap();
    let base = work.path().join("out").join("sub").join("ct");

    let output = dicom_nrrd(&[source.as_os_str(), base.as_os_str()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(!work.path().join("out/sub/ct.nhdr").exists());
    assert!(!work.path().join("out/sub/ct.raw").exists());
    assert!(!work.path().join("out").exists());
}

#[test]
fn test_empty_source_fails_without_output_folder() {
    let source = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let base = out.path().join("sub").join("ct");

    let output = dicom_nrrd(&[source.path().as_os_str(), base.as_os_str()]);

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[cfg(unix)]
#[test]
fn test_non_utf8_path_is_an_error_not_a_panic() {
    use std::os::unix::ffi::OsStrExt;

    let out = TempDir::new().unwrap();
    let source = OsStr::from_bytes(b"missing-\xff-folder");
    let base = out.path().join("ct");

    let output = dicom_nrrd(&[source, base.as_os_str()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(!out.path().join("ct.nhdr").exists());
}
