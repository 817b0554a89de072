//! Integration tests for page-history

use assert_cmd::Command;
use libpagecast::service::history::HistoryService;
use libpagecast::{LogEntry, PostKind, Privacy, Store};
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn escape_path_for_toml(path: &str) -> String {
    path.replace('\\', "\\\\")
}

struct TestEnv {
    _dir: TempDir,
    config_path: PathBuf,
    store_path: PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        let store_path = dir.path().join("data").join("pagecast.db");

        let config = format!(
            r#"
[store]
path = "{}"

[facebook]
graph_url = "http://127.0.0.1:9"
page_id = "1122334455"
"#,
            escape_path_for_toml(&store_path.to_string_lossy())
        );
        fs::write(&config_path, config).unwrap();

        Self {
            _dir: dir,
            config_path,
            store_path,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("page-history").unwrap();
        cmd.env("PAGECAST_CONFIG", &self.config_path)
            .env_remove("PAGECAST_FB_USER_TOKEN")
            .env_remove("PAGECAST_LOG_LEVEL")
            .env_remove("PAGECAST_LOG_FORMAT");
        cmd
    }

    async fn history(&self) -> HistoryService {
        let store = Store::open(&self.store_path.to_string_lossy()).await.unwrap();
        HistoryService::load(store).await.unwrap()
    }
}

fn entry(caption: &str) -> LogEntry {
    LogEntry::new(caption.to_string(), None, PostKind::Image, "1122334455".to_string())
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("page-history")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("publish-now"))
        .stdout(predicate::str::contains("EXIT CODES"));
}

#[test]
fn test_list_empty_history() {
    let env = TestEnv::new();
    env.cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    env.cmd()
        .args(["list", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_list_invalid_format() {
    let env = TestEnv::new();
    env.cmd()
        .args(["list", "--format", "xml"])
        .assert()
        .failure()
        .code(3);
}

#[tokio::test]
async fn test_list_shows_newest_first_and_pending_filter() {
    let env = TestEnv::new();
    let history = env.history().await;
    let old = history.record(entry("Old loaf")).await.unwrap();
    history
        .mark_posted(&old.id, "1122334455_1", None, Privacy::Published, None)
        .await
        .unwrap();
    let new = history.record(entry("New croissant")).await.unwrap();

    let output = env.cmd().arg("list").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with(&new.id));
    assert!(lines[1].contains("Posted (published)"));

    env.cmd()
        .args(["list", "--pending"])
        .assert()
        .success()
        .stdout(predicate::str::contains("New croissant"))
        .stdout(predicate::str::contains("Old loaf").not());

    let output = env
        .cmd()
        .args(["list", "--limit", "1", "--format", "json"])
        .output()
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let items = parsed.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], new.id.as_str());
    assert_eq!(items[0]["status"], "Generated");
}

#[tokio::test]
async fn test_publish_now_rejects_published_post() {
    let env = TestEnv::new();
    let history = env.history().await;
    let posted = history.record(entry("Already live")).await.unwrap();
    history
        .mark_posted(&posted.id, "1122334455_2", None, Privacy::Published, None)
        .await
        .unwrap();

    env.cmd()
        .env("PAGECAST_FB_USER_TOKEN", "EAAB-test")
        .args(["publish-now", &posted.id])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("is not an unpublished post"));
}

#[test]
fn test_publish_now_unknown_entry() {
    let env = TestEnv::new();
    env.cmd()
        .args(["publish-now", "post_0_missing"])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("No history entry"));
}

#[test]
fn test_templates_lifecycle() {
    let env = TestEnv::new();

    env.cmd()
        .args(["templates", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Humorous"));

    env.cmd()
        .args(["templates", "add", "Rainy day", "Mention the weather"])
        .assert()
        .success();
    env.cmd()
        .args(["templates", "list", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rainy day"));

    env.cmd()
        .args(["templates", "remove", "rainy day"])
        .assert()
        .success();
    env.cmd()
        .args(["templates", "remove", "rainy day"])
        .assert()
        .failure()
        .code(3);

    env.cmd()
        .args(["templates", "add", " ", "x"])
        .assert()
        .failure()
        .code(3);

    env.cmd().args(["templates", "reset"]).assert().success();
}

#[test]
fn test_connect_without_token() {
    let env = TestEnv::new();
    env.cmd()
        .arg("connect")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("No Facebook user access token"));
}

#[test]
fn test_connect_without_page_id() {
    let env = TestEnv::new();
    // A token is present, so only the page id is missing; port 9 never answers
    fs::write(
        &env.config_path,
        format!(
            "[store]\npath = \"{}\"\n\n[facebook]\ngraph_url = \"http://127.0.0.1:9\"\nuser_token = \"EAAB-test\"\n",
            escape_path_for_toml(&env.store_path.to_string_lossy())
        ),
    )
    .unwrap();

    env.cmd()
        .arg("connect")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("No Facebook page id"))
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_theme_toggle_persists() {
    let env = TestEnv::new();
    env.cmd()
        .arg("theme")
        .assert()
        .success()
        .stdout(predicate::str::diff("light\n"));
    env.cmd()
        .args(["theme", "toggle"])
        .assert()
        .success()
        .stdout(predicate::str::diff("dark\n"));
    env.cmd()
        .arg("theme")
        .assert()
        .success()
        .stdout(predicate::str::diff("dark\n"));
    env.cmd()
        .args(["theme", "blue"])
        .assert()
        .failure()
        .code(3);
}
