//! CLI integration tests for page-post
//!
//! Every case here fails validation before any network call, so no Graph API
//! server is needed.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &str) -> String {
    path.replace('\\', "\\\\")
}

struct TestEnv {
    dir: TempDir,
    config_path: PathBuf,
}

impl TestEnv {
    fn new(with_token: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        let store_path = dir.path().join("pagecast.db");

        let token_line = if with_token {
            "user_token = \"EAAB-test-token\""
        } else {
            ""
        };
        let config = format!(
            r#"
[store]
path = "{}"

[facebook]
graph_url = "http://127.0.0.1:9"
video_url = "http://127.0.0.1:9"
page_id = "1122334455"
{}

[instagram]
account_id = "17841400000000000"
"#,
            escape_path_for_toml(&store_path.to_string_lossy()),
            token_line
        );
        fs::write(&config_path, config).unwrap();

        Self { dir, config_path }
    }

    fn file(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("page-post").unwrap();
        cmd.env("PAGECAST_CONFIG", &self.config_path)
            .env_remove("PAGECAST_FB_USER_TOKEN")
            .env_remove("PAGECAST_LOG_LEVEL")
            .env_remove("PAGECAST_LOG_FORMAT");
        cmd
    }
}

#[test]
fn test_help_lists_exit_codes() {
    Command::cargo_bin("page-post")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("EXIT CODES"))
        .stdout(predicate::str::contains("--instagram"))
        .stdout(predicate::str::contains("--unpublished"));
}

#[test]
fn test_media_is_required() {
    Command::cargo_bin("page-post")
        .unwrap()
        .args(["--caption", "hello"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_past_schedule_is_invalid_input() {
    let env = TestEnv::new(true);
    let photo = env.file("photo.jpg", b"jpeg bytes");

    env.cmd()
        .arg("--media")
        .arg(&photo)
        .args(["--caption", "Opening soon", "--at", "2020-01-01T09:00:00Z"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Schedule time must be in the future"));
}

#[test]
fn test_instagram_unpublished_without_schedule_is_refused() {
    let env = TestEnv::new(true);
    let photo = env.file("photo.jpg", b"jpeg bytes");

    env.cmd()
        .arg("--media")
        .arg(&photo)
        .args(["--caption", "Secret menu", "--unpublished", "--instagram"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains(
            "Instagram does not support unpublished posts",
        ));
}

#[test]
fn test_missing_token_is_invalid_input() {
    let env = TestEnv::new(false);
    let photo = env.file("photo.jpg", b"jpeg bytes");

    env.cmd()
        .arg("--media")
        .arg(&photo)
        .args(["--caption", "hello"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("No Facebook user access token"));
}

#[test]
fn test_missing_caption_is_invalid_input() {
    let env = TestEnv::new(true);
    let photo = env.file("photo.jpg", b"jpeg bytes");

    env.cmd()
        .arg("--media")
        .arg(&photo)
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Write or generate a caption first"));
}

#[test]
fn test_blank_stdin_caption_is_invalid_input() {
    let env = TestEnv::new(true);
    let photo = env.file("photo.jpg", b"jpeg bytes");

    env.cmd()
        .arg("--media")
        .arg(&photo)
        .args(["--caption", "-"])
        .write_stdin("   \n")
        .assert()
        .failure()
        .code(3);
}

#[test]
fn test_unknown_entry_is_invalid_input() {
    let env = TestEnv::new(true);
    let photo = env.file("photo.jpg", b"jpeg bytes");

    env.cmd()
        .arg("--media")
        .arg(&photo)
        .args(["--entry", "post_0_missing"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("No history entry"));
}

#[test]
fn test_carousel_rejects_video() {
    let env = TestEnv::new(true);
    let photo = env.file("a.jpg", b"jpeg bytes");
    let clip = env.file("b.mp4", b"mp4 bytes");

    env.cmd()
        .arg("--media")
        .arg(&photo)
        .arg("--media")
        .arg(&clip)
        .args(["--caption", "Mixed"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Carousel posts accept images only"));
}

#[test]
fn test_unsupported_file_type() {
    let env = TestEnv::new(true);
    let notes = env.file("notes.txt", b"plain text");

    env.cmd()
        .arg("--media")
        .arg(&notes)
        .args(["--caption", "hello"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Unsupported file type"));
}

#[test]
fn test_invalid_format() {
    let env = TestEnv::new(true);
    let photo = env.file("photo.jpg", b"jpeg bytes");

    env.cmd()
        .arg("--media")
        .arg(&photo)
        .args(["--caption", "hello", "--format", "xml"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Invalid format"));
}

#[test]
fn test_unparseable_schedule() {
    let env = TestEnv::new(true);
    let photo = env.file("photo.jpg", b"jpeg bytes");

    env.cmd()
        .arg("--media")
        .arg(&photo)
        .args(["--caption", "hello", "--at", "when pigs fly"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Could not parse schedule string"));
}
