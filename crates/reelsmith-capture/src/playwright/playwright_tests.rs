use super::*;
use std::time::Duration;

fn config(source: &str) -> CaptureSessionConfig {
    let mut config = CaptureSessionConfig::new(source, 100, 100, 10.0);
    config.settle_delay = Duration::from_millis(50);
    config
}

/// Write a shell script that stands in for the Node driver.
#[cfg(unix)]
fn fake_driver(dir: &std::path::Path, body: &str) -> PathBuf {
    let path = dir.join("driver.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    path
}

#[tokio::test]
async fn test_missing_node_binary_is_a_capture_error() {
    let mut backend = PlaywrightBackend::new()
        .with_node_bin("reelsmith-definitely-not-node")
        .with_script("capture.js");
    let err = backend
        .start_session(&config("http://127.0.0.1:9/overlay"))
        .await
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.starts_with("capture error"), "{msg}");
    assert!(msg.contains("http://127.0.0.1:9/overlay"));
    // Nothing to release, stop is still fine.
    backend.stop_session().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_navigation_error_from_driver_is_surfaced() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_driver(
        dir.path(),
        r#"read line
echo '{"type":"error","error":"net::ERR_CONNECTION_REFUSED"}'
cat > /dev/null"#,
    );
    let mut backend = PlaywrightBackend::new().with_node_bin("sh").with_script(script);

    let err = backend
        .start_session(&config("http://127.0.0.1:9/overlay"))
        .await
        .unwrap_err();
    match err {
        ReelError::Capture { url, message } => {
            assert_eq!(url, "http://127.0.0.1:9/overlay");
            assert!(message.contains("ERR_CONNECTION_REFUSED"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(backend.process.is_none(), "driver must be released on failure");
}

#[cfg(unix)]
#[tokio::test]
async fn test_hung_driver_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let script = fake_driver(dir.path(), "read line\nexec sleep 30");
    let mut backend = PlaywrightBackend::new().with_node_bin("sh").with_script(script);
    let mut cfg = config("http://10.255.255.1/overlay");
    cfg.navigation_timeout = Duration::from_millis(200);

    let started = std::time::Instant::now();
    let err = backend.start_session(&cfg).await.unwrap_err();
    assert!(matches!(err, ReelError::CaptureTimeout { timeout_ms: 200, .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(backend.process.is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn test_protocol_round_trip_with_fake_driver() {
    // 1x1 transparent PNG.
    let png = {
        let mut bytes = Vec::new();
        let img = image::RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 0]));
        img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        general_purpose::STANDARD.encode(bytes)
    };
    let dir = tempfile::tempdir().unwrap();
    let script = fake_driver(
        dir.path(),
        &format!(
            r#"read line
echo '{{"type":"loaded"}}'
read line
echo '{{"type":"ready","timeline":false}}'
read line
echo '{{"type":"seeked"}}'
read line
echo '{{"type":"frame","data":"{png}"}}'
read line
exit 0"#
        ),
    );
    let mut backend = PlaywrightBackend::new().with_node_bin("sh").with_script(script);

    let info = backend.start_session(&config("http://overlay.test/")).await.unwrap();
    assert!(!info.timeline_found);

    let frame = backend.capture_frame(0.0).await.unwrap();
    assert_eq!((frame.width, frame.height), (1, 1));
    assert!(frame.is_fully_transparent());

    backend.stop_session().await.unwrap();
    assert!(backend.process.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[ignore = "needs node and playwright installed"]
async fn test_playwright_backend_capture() {
    let mut backend = PlaywrightBackend::new();
    let cfg = config("data:text/html,<html><body style='background:transparent'><h1>Test</h1></body></html>");

    backend.start_session(&cfg).await.expect("Failed to start");
    let frame = backend.capture_frame(0.0).await.expect("Failed to capture frame");
    assert_eq!(frame.width, 100);
    assert_eq!(frame.height, 100);

    backend.stop_session().await.expect("Failed to stop");
}
