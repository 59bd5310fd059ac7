//! End-to-end CLI tests for the v0-session binary.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

const SESSION_INPUT: &str = "next-auth.session-token=secretvalue\ntheme=dark\n";

/// Binary isolated to `home`: session files, config and browser roots all live there.
fn v0_session(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("v0-session").unwrap();
    cmd.env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("XDG_DATA_HOME", home.join(".local/share"))
        .arg("--data-dir")
        .arg(home.join("session"));
    cmd
}

fn import_session(home: &Path) {
    v0_session(home)
        .arg("import")
        .write_stdin(SESSION_INPUT)
        .assert()
        .success();
}

#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("v0-session").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("whoami"));
}

#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("v0-session").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("v0-session"));
}

#[test]
fn test_binary_without_subcommand_fails_with_usage() {
    let mut cmd = Command::cargo_bin("v0-session").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_status_in_fresh_environment_reports_logged_out() {
    let home = TempDir::new().unwrap();
    v0_session(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("logged_in = no"))
        .stdout(predicate::str::contains("session_age = none"))
        .stdout(predicate::str::contains("auth.json"));
}

#[test]
fn test_import_from_stdin_then_status_reports_logged_in() {
    let home = TempDir::new().unwrap();
    v0_session(home.path())
        .arg("import")
        .write_stdin(SESSION_INPUT)
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged in (2 cookies saved)"));

    v0_session(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("logged_in = yes"))
        .stdout(predicate::str::contains("cookies = 2"));

    assert!(home.path().join("session/auth.json").is_file());
    assert!(home.path().join("session/cookies.json").is_file());
}

#[test]
fn test_import_from_file_argument() {
    let home = TempDir::new().unwrap();
    let export = home.path().join("export.json");
    std::fs::write(
        &export,
        r#"[{"name":"__session","value":"from-file","domain":"v0.dev","path":"/"}]"#,
    )
    .unwrap();

    v0_session(home.path())
        .arg("import")
        .arg(&export)
        .assert()
        .success();

    v0_session(home.path())
        .args(["cookies", "--header"])
        .assert()
        .success()
        .stdout(predicate::str::diff("Cookie: __session=from-file\n"));
}

#[test]
fn test_cookies_lists_names_without_values() {
    let home = TempDir::new().unwrap();
    import_session(home.path());

    v0_session(home.path())
        .arg("cookies")
        .assert()
        .success()
        .stdout(predicate::str::contains("next-auth.session-token\tv0.dev\t/ (session)"))
        .stdout(predicate::str::contains("theme\tv0.dev\t/"))
        .stdout(predicate::str::contains("secretvalue").not());
}

#[test]
fn test_cookies_header_joins_pairs() {
    let home = TempDir::new().unwrap();
    import_session(home.path());

    v0_session(home.path())
        .args(["cookies", "--header"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Cookie: next-auth.session-token=secretvalue; theme=dark",
        ));
}

#[test]
fn test_cookies_without_session_fails() {
    let home = TempDir::new().unwrap();
    v0_session(home.path())
        .arg("cookies")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No valid session stored"));
}

#[test]
fn test_invalid_import_fails_and_is_written_to_diagnostics_log() {
    let home = TempDir::new().unwrap();
    v0_session(home.path())
        .arg("import")
        .write_stdin("???")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cookie import failed"));

    assert!(!home.path().join("session/auth.json").exists());
    let log = std::fs::read_to_string(home.path().join("session/diagnostics.log")).unwrap();
    assert!(log.contains("Cookie import failed"), "log was: {log}");
}

#[test]
fn test_logout_removes_session_files() {
    let home = TempDir::new().unwrap();
    import_session(home.path());

    v0_session(home.path())
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged out"));
    assert!(!home.path().join("session/auth.json").exists());
    assert!(!home.path().join("session/cookies.json").exists());

    v0_session(home.path())
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("No stored session found"));

    v0_session(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("logged_in = no"));
}

#[test]
fn test_out_of_range_config_is_rejected() {
    let home = TempDir::new().unwrap();
    let session_dir = home.path().join("session");
    std::fs::create_dir_all(&session_dir).unwrap();
    std::fs::write(session_dir.join("config.toml"), "login_timeout_secs = 1\n").unwrap();

    v0_session(home.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_config_flag_sets_base_url() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("custom.toml");
    std::fs::write(&config, "base_url = \"http://127.0.0.1:9\"\n").unwrap();

    v0_session(home.path())
        .arg("--config")
        .arg(&config)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("target = http://127.0.0.1:9/"));
}

#[test]
fn test_invalid_base_url_fails() {
    let home = TempDir::new().unwrap();
    v0_session(home.path())
        .args(["--base-url", "not a url", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid base URL"));
}

#[cfg(target_os = "linux")]
#[test]
fn test_browsers_reports_none_in_empty_home() {
    let home = TempDir::new().unwrap();
    v0_session(home.path())
        .arg("browsers")
        .assert()
        .success()
        .stdout(predicate::str::contains("No browser profiles found"));
}

#[cfg(target_os = "linux")]
#[test]
fn test_browsers_lists_firefox_profile_dir() {
    let home = TempDir::new().unwrap();
    std::fs::create_dir_all(home.path().join(".mozilla/firefox")).unwrap();
    v0_session(home.path())
        .arg("browsers")
        .assert()
        .success()
        .stdout(predicate::str::contains("firefox = "));
}

#[test]
fn test_whoami_without_session_fails() {
    let home = TempDir::new().unwrap();
    v0_session(home.path())
        .arg("whoami")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No valid session stored"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_whoami_reports_signed_in_against_mock_service() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/api/user"))
        .and(header("cookie", "next-auth.session-token=secretvalue"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "user": { "id": 1 } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    let uri = server.uri();
    v0_session(home.path())
        .args(["--base-url", &uri, "import"])
        .write_stdin("next-auth.session-token=secretvalue")
        .assert()
        .success();

    v0_session(home.path())
        .args(["--base-url", &uri, "whoami"])
        .assert()
        .success()
        .stdout(predicate::str::contains("signed_in = yes"));
}
