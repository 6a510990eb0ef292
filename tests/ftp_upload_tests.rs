//! FTP upload flow against a recording in-memory server

use std::fs;

use release_lane::upload::ftp::{branch_subdir, FtpUpload, MockFtpSession, BRANCH_FOLDER};
use release_lane::upload::{Credentials, FtpConfig, FtpState, UploadRequest};
use release_lane::{Archiver, UploadError};
use tempfile::TempDir;

const ARCHIVE_NAME: &str = "accelerator-1.2.3-git42-abcd123-linux.zip";

fn ftp_config() -> FtpConfig {
    FtpConfig {
        host: "ftp.example.org:2121".to_string(),
        credentials: Credentials::new("builder", "s3cret"),
        directory: "/public/builds".to_string(),
    }
}

fn build_archive(dir: &TempDir) -> std::path::PathBuf {
    let staging = dir.path().join("package");
    fs::create_dir_all(staging.join("addons")).unwrap();
    fs::write(staging.join("addons/accelerator.ext.so"), b"binary").unwrap();

    let dest = dir.path().join(ARCHIVE_NAME);
    Archiver::new(&staging).create(&dest).unwrap();
    dest
}

fn request<'a>(archive: &'a std::path::Path, branch: &'a str) -> UploadRequest<'a> {
    UploadRequest {
        project: "accelerator",
        branch,
        default_branch: "master",
        archive_path: archive,
        file_name: ARCHIVE_NAME,
    }
}

#[test]
fn test_branch_upload_lands_in_project_branch_folder() {
    let dir = TempDir::new().unwrap();
    let archive = build_archive(&dir);
    let server = MockFtpSession::with_dirs(&["/public", "/public/builds"]);

    let upload = FtpUpload::connect(&ftp_config().host, |host| {
        assert_eq!(host, "ftp.example.org:2121");
        Ok(server.clone())
    })
    .unwrap();
    assert_eq!(upload.state(), FtpState::Disconnected);

    let receipt = upload.run(&ftp_config(), &request(&archive, "feature-x")).unwrap();

    let expected_dir = format!(
        "{}/{}",
        BRANCH_FOLDER,
        branch_subdir("accelerator", "feature-x", "master").unwrap()
    );
    assert_eq!(receipt.remote_dir, expected_dir);
    assert_eq!(receipt.bytes, fs::metadata(&archive).unwrap().len());

    let stored = server.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(
        stored[0].0,
        format!("/public/builds/branch/accelerator-feature-x/{}", ARCHIVE_NAME)
    );
    assert_eq!(stored[0].1, fs::read(&archive).unwrap());

    assert_eq!(
        server.commands(),
        vec![
            "USER builder".to_string(),
            "CWD /public/builds".to_string(),
            "MKD branch".to_string(),
            "CWD branch".to_string(),
            "MKD accelerator-feature-x".to_string(),
            "CWD accelerator-feature-x".to_string(),
            format!("STOR {}", ARCHIVE_NAME),
            "QUIT".to_string(),
        ]
    );
}

#[test]
fn test_second_branch_upload_reuses_directories() {
    let dir = TempDir::new().unwrap();
    let archive = build_archive(&dir);
    let server = MockFtpSession::with_dirs(&["/public", "/public/builds"]);

    for _ in 0..2 {
        FtpUpload::from_session(server.clone())
            .run(&ftp_config(), &request(&archive, "feature-x"))
            .unwrap();
    }

    assert_eq!(server.stored().len(), 2);
    assert!(server.dir_exists("/public/builds/branch/accelerator-feature-x"));
}

#[test]
fn test_default_branch_never_creates_directories() {
    let dir = TempDir::new().unwrap();
    let archive = build_archive(&dir);
    let server = MockFtpSession::with_dirs(&["/public", "/public/builds"]);

    let receipt = FtpUpload::from_session(server.clone())
        .run(&ftp_config(), &request(&archive, "master"))
        .unwrap();

    assert!(receipt.remote_dir.is_empty());
    assert!(!server.commands().iter().any(|c| c.starts_with("MKD")));
    assert_eq!(
        server.stored()[0].0,
        format!("/public/builds/{}", ARCHIVE_NAME)
    );
}

#[test]
fn test_login_failure_reports_state_and_quits() {
    let dir = TempDir::new().unwrap();
    let archive = build_archive(&dir);
    let server = MockFtpSession::with_dirs(&["/public/builds"]).fail_on("USER");

    let err = FtpUpload::from_session(server.clone())
        .run(&ftp_config(), &request(&archive, "master"))
        .unwrap_err();

    let message = err.to_string();
    assert!(matches!(
        err,
        UploadError::Ftp {
            state: FtpState::Disconnected,
            ..
        }
    ));
    assert!(message.contains("FTP failure while disconnected"));
    assert_eq!(server.commands(), vec!["USER builder", "QUIT"]);
}

#[test]
fn test_missing_archive_is_not_an_ftp_failure() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join(ARCHIVE_NAME);
    let server = MockFtpSession::with_dirs(&["/public/builds"]);

    let err = FtpUpload::from_session(server.clone())
        .run(&ftp_config(), &request(&missing, "master"))
        .unwrap_err();

    assert!(matches!(err, UploadError::Archive { .. }));
    assert!(server.stored().is_empty());
    assert_eq!(server.commands().last().map(String::as_str), Some("QUIT"));
}
