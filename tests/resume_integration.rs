//! Integration tests for resumable download continuation: Range requests,
//! 206 appends, and stale-partial (416) repair.

use std::path::Path;

use tempfile::TempDir;
use webfetch_core::{Operation, Orchestrator, PageBody, Session};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Matches requests that carry no Range header (the rangeless re-request
/// after stale-resume repair).
struct NoRangeHeader;

impl wiremock::Match for NoRangeHeader {
    fn matches(&self, request: &Request) -> bool {
        !request.headers.contains_key("range")
    }
}

fn write_partial(dir: &Path, name: &str, content: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn resume_operation(out_file: std::path::PathBuf) -> Operation {
    Operation {
        out_file: Some(out_file),
        resume: true,
        ..Operation::default()
    }
}

#[tokio::test]
async fn test_resume_requests_range_from_local_size_and_appends() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let out_file = write_partial(temp_dir.path(), "partial.bin", &[b'A'; 100]);

    Mock::given(method("GET"))
        .and(path("/file"))
        .and(header("Range", "bytes=100-"))
        .respond_with(
            ResponseTemplate::new(206)
                .insert_header("Content-Range", "bytes 100-103/104")
                .set_body_bytes(b"BBBB".to_vec()),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut orchestrator = Orchestrator::new(Session::new(), resume_operation(out_file.clone()));
    let outcome = orchestrator
        .run(&format!("{}/file", mock_server.uri()))
        .await
        .unwrap();

    assert_eq!(outcome.pages[0].status.as_u16(), 206);
    match &outcome.pages[0].body {
        PageBody::Saved { bytes, .. } => assert_eq!(*bytes, 4),
        other => panic!("expected saved body, got: {other:?}"),
    }

    let content = std::fs::read(&out_file).unwrap();
    assert_eq!(content.len(), 104, "206 must append to the partial file");
    assert_eq!(&content[..100], &[b'A'; 100][..]);
    assert_eq!(&content[100..], b"BBBB");
}

#[tokio::test]
async fn test_resume_without_local_file_requests_full_range() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let out_file = temp_dir.path().join("fresh.bin");

    Mock::given(method("GET"))
        .and(path("/file"))
        .and(header("Range", "bytes=0-"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"whole thing".to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut orchestrator = Orchestrator::new(Session::new(), resume_operation(out_file.clone()));
    let outcome = orchestrator
        .run(&format!("{}/file", mock_server.uri()))
        .await
        .unwrap();

    assert_eq!(outcome.pages[0].status.as_u16(), 200);
    assert_eq!(std::fs::read(&out_file).unwrap(), b"whole thing");
}

#[tokio::test]
async fn test_stale_partial_triggers_exactly_one_rangeless_rerequest() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    // Local partial is larger than the remote resource.
    let out_file = write_partial(temp_dir.path(), "stale.bin", &[b'X'; 100]);

    Mock::given(method("GET"))
        .and(path("/file"))
        .and(header("Range", "bytes=100-"))
        .respond_with(
            ResponseTemplate::new(416).insert_header("Content-Range", "bytes */50"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/file"))
        .and(NoRangeHeader)
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fresh copy".to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut orchestrator = Orchestrator::new(Session::new(), resume_operation(out_file.clone()));
    let outcome = orchestrator
        .run(&format!("{}/file", mock_server.uri()))
        .await
        .unwrap();

    assert_eq!(outcome.pages[0].status.as_u16(), 200);
    // Resume was disabled by the repair, so the file is rewritten, not
    // appended.
    assert_eq!(std::fs::read(&out_file).unwrap(), b"fresh copy");
    mock_server.verify().await;
}

#[tokio::test]
async fn test_already_complete_download_skips_writing() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let out_file = write_partial(temp_dir.path(), "done.bin", &[b'D'; 100]);

    // Declared total equals the local size: nothing left to download.
    Mock::given(method("GET"))
        .and(path("/file"))
        .and(header("Range", "bytes=100-"))
        .respond_with(
            ResponseTemplate::new(416).insert_header("Content-Range", "bytes */100"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut orchestrator = Orchestrator::new(Session::new(), resume_operation(out_file.clone()));
    let outcome = orchestrator
        .run(&format!("{}/file", mock_server.uri()))
        .await
        .unwrap();

    assert!(matches!(outcome.pages[0].body, PageBody::Skipped));
    assert!(outcome.errors.is_empty());
    // The file is untouched.
    assert_eq!(std::fs::read(&out_file).unwrap(), vec![b'D'; 100]);
}

#[tokio::test]
async fn test_plain_out_file_download_without_resume() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let out_file = temp_dir.path().join("plain.bin");

    Mock::given(method("GET"))
        .and(path("/file"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"no ranges involved".to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let op = Operation {
        out_file: Some(out_file.clone()),
        ..Operation::default()
    };
    let mut orchestrator = Orchestrator::new(Session::new(), op);
    let outcome = orchestrator
        .run(&format!("{}/file", mock_server.uri()))
        .await
        .unwrap();

    match &outcome.pages[0].body {
        PageBody::Saved { bytes, path } => {
            assert_eq!(*bytes, 18);
            assert_eq!(path, &out_file);
        }
        other => panic!("expected saved body, got: {other:?}"),
    }
    assert_eq!(std::fs::read(&out_file).unwrap(), b"no ranges involved");
}
