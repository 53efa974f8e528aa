use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env(dense: bool) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\nIt contains information about cargo and crates.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.txt"),
        "Beta plain text file.\n\nContains notes about deployment and infrastructure.\n\nKubernetes and Docker are mentioned here.",
    )
    .unwrap();
    fs::write(
        files_dir.join("inventory.csv"),
        "item,count\nbolts,40\nwashers,12\n",
    )
    .unwrap();
    fs::write(files_dir.join("tool.exe"), "MZ").unwrap();

    let dense_section = if dense {
        "[embedding]\nprovider = \"hash\"\ndims = 64\n\n[vector_db]\nprovider = \"memory\"\n"
    } else {
        ""
    };
    let config_content = format!(
        r#"[storage]
backend = "local"
root = "{}/data"

[retrieval]
default_top_k = 5

{}"#,
        root.display(),
        dense_section
    );

    let config_path = config_dir.join("docsearch.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_docsearch"))
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run docsearch binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn file(config_path: &Path, name: &str) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("files")
        .join(name)
        .to_str()
        .unwrap()
        .to_string()
}

fn upload_parse_ingest(config: &Path, name: &str) {
    let (_, stderr, ok) = run(config, &["upload", &file(config, name)]);
    assert!(ok, "upload {} failed: {}", name, stderr);
    let (_, stderr, ok) = run(config, &["parse", name]);
    assert!(ok, "parse {} failed: {}", name, stderr);
    let (_, stderr, ok) = run(config, &["ingest", name]);
    assert!(ok, "ingest {} failed: {}", name, stderr);
}

#[test]
fn test_full_pipeline_keyword_only() {
    let (tmp, config) = setup_test_env(false);
    upload_parse_ingest(&config, "alpha.md");
    upload_parse_ingest(&config, "beta.txt");

    let (stdout, stderr, ok) = run(&config, &["search", "kubernetes docker"]);
    assert!(ok, "search failed: {}", stderr);
    assert!(stdout.starts_with("1. "), "stdout: {}", stdout);
    assert!(stdout.contains("beta.txt"));
    assert!(!stdout.contains("alpha.md"));

    let data = tmp.path().join("data");
    assert!(data.join("uploaded_files").join("alpha.md").exists());
    assert!(data.join("parsed_files").join("alpha.md.md").exists());
    assert!(data.join("bm25_indexes").join("beta.txt.json").exists());
}

#[test]
fn test_full_pipeline_with_dense() {
    let (_tmp, config) = setup_test_env(true);
    upload_parse_ingest(&config, "alpha.md");

    let (stdout, _, ok) = run(&config, &["ingest", "alpha.md"]);
    assert!(ok);
    assert!(stdout.contains("vectors: 1"), "stdout: {}", stdout);
}

#[test]
fn test_ingest_idempotent_single_record() {
    let (tmp, config) = setup_test_env(false);
    upload_parse_ingest(&config, "alpha.md");
    let (_, _, ok) = run(&config, &["ingest", "alpha.md"]);
    assert!(ok);

    let records = fs::read_dir(tmp.path().join("data").join("bm25_indexes"))
        .unwrap()
        .count();
    assert_eq!(records, 1);
}

#[test]
fn test_csv_parsed_to_table() {
    let (tmp, config) = setup_test_env(false);
    upload_parse_ingest(&config, "inventory.csv");

    let parsed = fs::read_to_string(
        tmp.path()
            .join("data")
            .join("parsed_files")
            .join("inventory.csv.md"),
    )
    .unwrap();
    assert!(parsed.contains("| bolts | 40 |"));

    let (stdout, _, ok) = run(&config, &["search", "washers"]);
    assert!(ok);
    assert!(stdout.contains("inventory.csv"));
}

#[test]
fn test_search_no_results() {
    let (_tmp, config) = setup_test_env(false);
    upload_parse_ingest(&config, "alpha.md");

    let (stdout, _, ok) = run(&config, &["search", "zzzyyyxxx"]);
    assert!(ok);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_empty_query() {
    let (_tmp, config) = setup_test_env(false);
    let (_, stderr, ok) = run(&config, &["search", "   "]);
    assert!(!ok);
    assert!(stderr.contains("query must not be empty"), "stderr: {}", stderr);
}

#[test]
fn test_search_document_filter() {
    let (_tmp, config) = setup_test_env(false);
    upload_parse_ingest(&config, "alpha.md");
    upload_parse_ingest(&config, "beta.txt");

    let (stdout, _, ok) = run(
        &config,
        &["search", "document file", "--document", "alpha.md"],
    );
    assert!(ok);
    assert!(stdout.contains("alpha.md"));
    assert!(!stdout.contains("beta.txt"));
}

#[test]
fn test_upload_rejects_extension() {
    let (_tmp, config) = setup_test_env(false);
    let (_, stderr, ok) = run(&config, &["upload", &file(&config, "tool.exe")]);
    assert!(!ok);
    assert!(stderr.contains("unsupported file type"), "stderr: {}", stderr);
}

#[test]
fn test_ingest_before_parse_fails() {
    let (_tmp, config) = setup_test_env(false);
    let (_, _, ok) = run(&config, &["upload", &file(&config, "alpha.md")]);
    assert!(ok);
    let (_, stderr, ok) = run(&config, &["ingest", "alpha.md"]);
    assert!(!ok);
    assert!(stderr.contains("has not been parsed"), "stderr: {}", stderr);
}

#[test]
fn test_list_and_delete() {
    let (tmp, config) = setup_test_env(false);
    upload_parse_ingest(&config, "alpha.md");

    let (stdout, _, ok) = run(&config, &["list"]);
    assert!(ok);
    assert!(stdout.contains("alpha.md"));
    assert!(stdout.contains("indexed"));

    let (stdout, _, ok) = run(&config, &["delete", "alpha.md"]);
    assert!(ok);
    assert!(stdout.contains("deleted alpha.md"));
    assert!(!tmp
        .path()
        .join("data")
        .join("bm25_indexes")
        .join("alpha.md.json")
        .exists());

    let (stdout, _, ok) = run(&config, &["delete", "alpha.md"]);
    assert!(ok);
    assert!(stdout.contains("nothing to delete"));

    let (stdout, _, ok) = run(&config, &["list"]);
    assert!(ok);
    assert!(stdout.contains("No documents."));
}

#[test]
fn test_summarize_without_generation_fails() {
    let (_tmp, config) = setup_test_env(false);
    upload_parse_ingest(&config, "alpha.md");
    let (_, stderr, ok) = run(&config, &["summarize", "alpha.md"]);
    assert!(!ok);
    assert!(stderr.contains("not configured"), "stderr: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let (_, stderr, ok) = run(Path::new("/nonexistent/docsearch.toml"), &["list"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"));
}
