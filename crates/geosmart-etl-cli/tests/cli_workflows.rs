//! Integration tests for the CLI binary.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn cli() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("geosmart-etl"))
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn write_mock(tmp: &TempDir, rows: usize) -> PathBuf {
    let csv = tmp.path().join("forest.csv");
    cli()
        .args([
            "mock",
            "--output",
            &path_arg(&csv),
            "--rows",
            &rows.to_string(),
            "--seed",
            "7",
        ])
        .assert()
        .success()
        .stdout(contains(format!("Wrote {rows} mock rows")));
    csv
}

/// Clear every `Soil_Type*` flag in the first data row.
fn break_first_row(csv: &Path) -> TestResult {
    let text = std::fs::read_to_string(csv)?;
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    let header: Vec<&str> = lines[0].split(',').collect();
    let soil: Vec<usize> = header
        .iter()
        .enumerate()
        .filter(|(_, name)| name.starts_with("Soil_Type"))
        .map(|(i, _)| i)
        .collect();
    let mut cells: Vec<String> = lines[1].split(',').map(str::to_string).collect();
    for i in soil {
        cells[i] = "0".to_string();
    }
    lines[1] = cells.join(",");
    std::fs::write(csv, lines.join("\n") + "\n")?;
    Ok(())
}

#[test]
fn cli_mock_process_profile_inspect_prompt() -> TestResult {
    let tmp = TempDir::new()?;
    let csv = write_mock(&tmp, 200);
    let store = tmp.path().join("store");

    cli()
        .args([
            "process",
            "--input",
            &path_arg(&csv),
            "--store",
            &path_arg(&store),
            "--version",
            "v1",
        ])
        .assert()
        .success()
        .stdout(contains("Stored version v1 (200 rows)"))
        .stdout(contains("datasets/v1/dataset.parquet"));

    assert!(store.join("datasets/v1/dataset.parquet").exists());
    assert!(store.join("datasets/v1/profile.json").exists());

    cli()
        .args([
            "process",
            "--input",
            &path_arg(&csv),
            "--store",
            &path_arg(&store),
            "--version",
            "v1",
        ])
        .assert()
        .failure()
        .stderr(contains("Dataset version v1 is already committed"));

    cli()
        .args(["profile", "--store", &path_arg(&store), "--version", "v1"])
        .assert()
        .success()
        .stdout(contains("\"row_count\": 200"))
        .stdout(contains("Soil_Type_code"));

    cli()
        .args([
            "profile",
            "--store",
            &path_arg(&store),
            "--version",
            "v1",
            "--digest",
            "3",
        ])
        .assert()
        .success()
        .stdout(contains("\"dataset_rows\": 200"));

    cli()
        .args(["inspect", "--store", &path_arg(&store), "--version", "v1"])
        .assert()
        .success()
        .stdout(contains("Wilderness_Area_code"))
        .stdout(contains("\"format_version\": 1"));

    cli()
        .args([
            "prompt",
            "--store",
            &path_arg(&store),
            "--version",
            "v1",
            "--question",
            "Which soil types dominate?",
        ])
        .assert()
        .success()
        .stdout(contains("You are a Senior GIS Expert"))
        .stdout(contains("Question: Which soil types dominate?"));

    Ok(())
}

#[test]
fn cli_strict_rejects_one_hot_violation_and_lenient_counts_it() -> TestResult {
    let tmp = TempDir::new()?;
    let csv = write_mock(&tmp, 50);
    break_first_row(&csv)?;
    let store = tmp.path().join("store");

    cli()
        .args([
            "process",
            "--input",
            &path_arg(&csv),
            "--store",
            &path_arg(&store),
            "--version",
            "strict",
        ])
        .assert()
        .failure()
        .stderr(contains("row 0 has 0 active members"));
    assert!(!store.join("datasets/strict").exists());

    cli()
        .args([
            "process",
            "--input",
            &path_arg(&csv),
            "--store",
            &path_arg(&store),
            "--version",
            "lenient",
            "--lenient",
        ])
        .assert()
        .success()
        .stdout(contains("one-hot violations: 1"));

    Ok(())
}

#[test]
fn cli_json_report_lists_steps() -> TestResult {
    let tmp = TempDir::new()?;
    let csv = write_mock(&tmp, 20);
    let store = tmp.path().join("store");

    cli()
        .args([
            "process",
            "--input",
            &path_arg(&csv),
            "--store",
            &path_arg(&store),
            "--version",
            "v1",
            "--standardize",
            "--json",
        ])
        .assert()
        .success()
        .stdout(contains("\"name\": \"put_profile\""))
        .stdout(contains("\"name\": \"standardize\""));
    Ok(())
}

#[test]
fn cli_rejects_bad_version_and_missing_version() -> TestResult {
    let tmp = TempDir::new()?;
    let csv = write_mock(&tmp, 10);
    let store = tmp.path().join("store");

    cli()
        .args([
            "process",
            "--input",
            &path_arg(&csv),
            "--store",
            &path_arg(&store),
            "--version",
            "../escape",
        ])
        .assert()
        .failure()
        .stderr(contains("Invalid dataset version"));

    cli()
        .args(["profile", "--store", &path_arg(&store), "--version", "absent"])
        .assert()
        .failure()
        .stderr(contains("is not committed"));

    cli()
        .args(["inspect", "--store", &path_arg(&store), "--version", "absent"])
        .assert()
        .failure()
        .stderr(contains("No dataset artifact for version absent"));
    Ok(())
}
