use std::process::{Command, Output};

fn reelsmith(args: &[&str], cwd: &std::path::Path) -> Output {
    let bin = std::env::var("CARGO_BIN_EXE_reelsmith").unwrap_or_else(|_| {
        std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../target/debug/reelsmith")
            .to_string_lossy()
            .to_string()
    });
    Command::new(bin)
        .args(args)
        .current_dir(cwd)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run reelsmith")
}

#[test]
fn init_writes_a_loadable_config() {
    let dir = tempfile::tempdir().unwrap();
    let out = reelsmith(&["init"], dir.path());
    assert!(out.status.success(), "init failed: {out:?}");

    let raw = std::fs::read_to_string(dir.path().join("reelsmith.toml")).unwrap();
    assert!(raw.contains("[render]"));
    assert!(raw.contains("max_concurrent_renders = 2"));

    // A second init refuses to overwrite.
    let again = reelsmith(&["init"], dir.path());
    assert!(!again.status.success());
}

#[test]
fn compose_without_frames_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("frames")).unwrap();
    std::fs::write(dir.path().join("base.mp4"), b"video").unwrap();
    std::fs::write(dir.path().join("voice.mp3"), b"audio").unwrap();

    let out = reelsmith(
        &[
            "compose",
            "--base-video",
            "base.mp4",
            "--frames",
            "frames",
            "--audio",
            "voice.mp3",
            "--output",
            "out.mp4",
        ],
        dir.path(),
    );
    assert!(!out.status.success());
    assert!(!dir.path().join("out.mp4").exists());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("frames"), "unexpected stderr: {stderr}");
}

#[test]
fn invalid_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("reelsmith.toml"), "[render]\nfps = 0.0\n").unwrap();
    let out = reelsmith(&["compose", "--base-video", "a", "--frames", "b", "--audio", "c", "-o", "d"], dir.path());
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("fps"), "unexpected stderr: {stderr}");
}
