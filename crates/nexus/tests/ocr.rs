//! OCR runner tests with shell scripts standing in for ocrmypdf.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use nexus::ocr::{OcrEngine, OcrError, OcrMyPdf, OcrSettings};

/// Write an executable script that appends to `calls` on every run.
fn fake_program(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("fake-ocrmypdf");
    let calls = dir.join("calls");
    fs::write(
        &path,
        format!(
            "#!/bin/sh\necho run >> \"{}\"\nfor last; do :; done\n{}\n",
            calls.display(),
            body
        ),
    )
    .unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn calls(dir: &Path) -> usize {
    fs::read_to_string(dir.join("calls"))
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

fn settings(program: &Path, processed: &Path) -> OcrSettings {
    OcrSettings {
        program: program.to_string_lossy().to_string(),
        processed_dir: processed.to_path_buf(),
        jobs: 1,
        timeout: Duration::from_secs(10),
        max_attempts: 3,
        backoff_initial: Duration::from_millis(10),
        backoff_max: Duration::from_millis(20),
    }
}

fn source(tmp: &TempDir) -> (PathBuf, PathBuf) {
    let root = tmp.path().join("corpus");
    fs::create_dir_all(root.join("scans")).unwrap();
    let src = root.join("scans").join("page.pdf");
    fs::write(&src, b"%PDF-1.4 scanned").unwrap();
    (root, src)
}

#[tokio::test]
async fn test_success_writes_mirrored_output() {
    let tmp = TempDir::new().unwrap();
    let (root, src) = source(&tmp);
    let program = fake_program(tmp.path(), "echo ocr > \"$last\"");
    let processed = tmp.path().join("processed");

    let ocr = OcrMyPdf::new(settings(&program, &processed));
    let dest = ocr.run(&src, "library", &root).await.unwrap();

    assert_eq!(dest, processed.join("library").join("scans").join("page.pdf"));
    assert_eq!(fs::read_to_string(&dest).unwrap().trim(), "ocr");
    assert_eq!(calls(tmp.path()), 1);
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let tmp = TempDir::new().unwrap();
    let (root, src) = source(&tmp);
    let counter = tmp.path().join("calls");
    let program = fake_program(
        tmp.path(),
        &format!(
            "if [ $(wc -l < \"{}\") -lt 2 ]; then echo busy >&2; exit 5; fi\necho ocr > \"$last\"",
            counter.display()
        ),
    );

    let ocr = OcrMyPdf::new(settings(&program, &tmp.path().join("processed")));
    let dest = ocr.run(&src, "library", &root).await.unwrap();

    assert!(dest.exists());
    assert_eq!(calls(tmp.path()), 2);
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let tmp = TempDir::new().unwrap();
    let (root, src) = source(&tmp);
    let program = fake_program(tmp.path(), "echo still busy >&2\nexit 5");

    let ocr = OcrMyPdf::new(settings(&program, &tmp.path().join("processed")));
    let err = ocr.run(&src, "library", &root).await.unwrap_err();

    match err {
        OcrError::Failed { code, stderr } => {
            assert_eq!(code, Some(5));
            assert_eq!(stderr, "still busy");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(calls(tmp.path()), 3);
}

#[tokio::test]
async fn test_bad_input_is_not_retried() {
    let tmp = TempDir::new().unwrap();
    let (root, src) = source(&tmp);
    let program = fake_program(tmp.path(), "echo not a pdf >&2\nexit 2");

    let ocr = OcrMyPdf::new(settings(&program, &tmp.path().join("processed")));
    let err = ocr.run(&src, "library", &root).await.unwrap_err();

    assert!(matches!(err, OcrError::Failed { code: Some(2), .. }));
    assert_eq!(calls(tmp.path()), 1);
}

#[tokio::test]
async fn test_timeout_is_not_retried() {
    let tmp = TempDir::new().unwrap();
    let (root, src) = source(&tmp);
    let program = fake_program(tmp.path(), "sleep 5");

    let mut s = settings(&program, &tmp.path().join("processed"));
    s.timeout = Duration::from_millis(200);
    let err = OcrMyPdf::new(s).run(&src, "library", &root).await.unwrap_err();

    assert!(matches!(err, OcrError::Timeout(_)));
    assert_eq!(calls(tmp.path()), 1);
}

#[tokio::test]
async fn test_missing_program_fails_fast() {
    let tmp = TempDir::new().unwrap();
    let (root, src) = source(&tmp);
    let missing = tmp.path().join("no-such-ocr");

    let err = OcrMyPdf::new(settings(&missing, &tmp.path().join("processed")))
        .run(&src, "library", &root)
        .await
        .unwrap_err();

    assert!(matches!(err, OcrError::Spawn { .. }));
    assert!(!err.is_transient());
}
