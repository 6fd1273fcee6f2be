use std::path::Path;
use std::process::{Command, Output};

fn write_config(dir: &Path, document: &Path, extra: &str) -> std::path::PathBuf {
    let config = format!(
        r#"
[document]
path = "{}"
checkpoint_path = "{}"

[vector_store]
path = "{}"

[logging]
level = "DEBUG"
{extra}
"#,
        document.display(),
        dir.join("checkpoint.json").display(),
        dir.join("vector_db").display(),
    );
    let path = dir.join("docqa.toml");
    std::fs::write(&path, config).unwrap();
    path
}

fn docqa(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_docqa"))
        .env_clear()
        .env("DOCQA_LOG_FILE", "")
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn missing_document_exits_non_zero_without_creating_index() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &dir.path().join("absent.pdf"), "");

    let out = docqa(&config, &["index"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("document not found"), "stderr: {stderr}");
    assert!(!dir.path().join("vector_db").join("index.db").exists());
    assert!(!dir.path().join("checkpoint.json").exists());
}

#[test]
fn invalid_chunking_is_rejected_at_startup() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        &dir.path().join("doc.txt"),
        "[chunking]\nchunk_size = 100\nchunk_overlap = 100\n",
    );

    let out = docqa(&config, &["status"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("chunk_overlap"));
}

#[test]
fn status_reports_unbuilt_index_without_building() {
    let dir = tempfile::tempdir().unwrap();
    let document = dir.path().join("doc.txt");
    std::fs::write(&document, "Some text.").unwrap();
    let config = write_config(dir.path(), &document, "");

    let out = docqa(&config, &["status"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("Present:    yes"), "stdout: {stdout}");
    assert!(stdout.contains("Index:      not built"));
    assert!(stdout.contains("Up to date: no"));
    assert!(!dir.path().join("vector_db").exists());
}

#[test]
fn unknown_command_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &dir.path().join("doc.txt"), "");
    let out = docqa(&config, &["summarize"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn ignored_env_override_is_logged_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let document = dir.path().join("doc.txt");
    std::fs::write(&document, "Some text.").unwrap();
    let config = write_config(dir.path(), &document, "");
    let log = dir.path().join("logs").join("docqa.log");

    let out = Command::new(env!("CARGO_BIN_EXE_docqa"))
        .env_clear()
        .env("DOCQA_LOG_FILE", &log)
        .env("DOCQA_CHUNK_SIZE", "abc")
        .arg("--config")
        .arg(&config)
        .arg("status")
        .output()
        .unwrap();
    assert!(out.status.success());

    let logged = std::fs::read_to_string(&log).unwrap();
    let warning = logged
        .lines()
        .position(|l| l.contains("ignoring invalid DOCQA_CHUNK_SIZE value: abc"))
        .expect("warning in log file");
    let started = logged
        .lines()
        .position(|l| l.contains("docqa starting"))
        .expect("startup line in log file");
    assert!(warning < started);
    assert!(String::from_utf8_lossy(&out.stderr).contains("DOCQA_CHUNK_SIZE"));
}

#[test]
fn invalid_config_is_logged_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        &dir.path().join("doc.txt"),
        "[retrieval]\nk = 0\n",
    );
    let log = dir.path().join("docqa.log");

    let out = Command::new(env!("CARGO_BIN_EXE_docqa"))
        .env_clear()
        .env("DOCQA_LOG_FILE", &log)
        .arg("--config")
        .arg(&config)
        .arg("status")
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(std::fs::read_to_string(&log).unwrap().contains("retrieval.k must be positive"));
}
