use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::process::Command;
use twox_hash::XxHash64;

fn temp_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "trivia-cli-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

fn snapshot_args() -> String {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../assets/snapshots");
    format!(
        "{},{}",
        root.join("aave.json").display(),
        root.join("arbitrum.json").display()
    )
}

fn file_hashes(dir: &Path) -> Vec<(String, u64)> {
    let mut hashes: Vec<(String, u64)> = std::fs::read_dir(dir)
        .expect("read store dir")
        .map(|entry| {
            let path = entry.expect("dir entry").path();
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(&std::fs::read(&path).expect("read stored episode"));
            (
                path.file_name().unwrap().to_string_lossy().into_owned(),
                hasher.finish(),
            )
        })
        .collect();
    hashes.sort();
    hashes
}

#[test]
fn cli_list_scenarios_writes_output() {
    let exe = env!("CARGO_BIN_EXE_trivia-tester");
    let output_path = temp_path("list");
    let status = Command::new(exe)
        .args(["--list-scenarios", "--output"])
        .arg(&output_path)
        .status()
        .expect("run cli");
    assert!(status.success());
    let content = std::fs::read_to_string(output_path).expect("read output");
    assert!(content.contains("Available scenarios"));
    assert!(content.contains("determinism"));
}

#[test]
fn cli_writes_json_report_for_fixture_snapshots() {
    let exe = env!("CARGO_BIN_EXE_trivia-tester");
    let output_path = temp_path("report");
    let output = Command::new(exe)
        .args([
            "--snapshots",
            &snapshot_args(),
            "--dates",
            "2024-07-23..2024-07-24",
            "--scenarios",
            "smoke,determinism",
            "--report",
            "json",
            "--output",
        ])
        .arg(&output_path)
        .output()
        .expect("run cli");
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let content = std::fs::read_to_string(output_path).expect("read output");
    let report: serde_json::Value = serde_json::from_str(&content).expect("json report");
    let results = report["results"].as_array().expect("results array");
    assert_eq!(results.len(), 2);
    for result in results {
        assert_eq!(result["passed"], true);
        assert_eq!(result["cases_run"], 4);
    }
}

#[test]
fn cli_fails_on_unknown_scenario() {
    let exe = env!("CARGO_BIN_EXE_trivia-tester");
    let output = Command::new(exe)
        .args([
            "--snapshots",
            &snapshot_args(),
            "--scenarios",
            "no-such-check",
            "--report",
            "json",
            "--output",
        ])
        .arg(temp_path("unknown"))
        .output()
        .expect("run cli");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown scenario"));
}

#[test]
fn cli_stored_episodes_are_byte_identical_across_runs() {
    let exe = env!("CARGO_BIN_EXE_trivia-tester");
    let mut runs = Vec::new();
    for label in ["store-a", "store-b"] {
        let store_dir = temp_path(label);
        let status = Command::new(exe)
            .args([
                "--snapshots",
                &snapshot_args(),
                "--dates",
                "2024-07-24",
                "--report",
                "json",
                "--output",
            ])
            .arg(temp_path(&format!("{label}-report")))
            .arg("--store-dir")
            .arg(&store_dir)
            .status()
            .expect("run cli");
        assert!(status.success());
        runs.push(file_hashes(&store_dir));
    }
    assert_eq!(runs[0].len(), 2);
    assert_eq!(runs[0], runs[1]);
    assert!(runs[0].iter().any(|(name, _)| name == "2024-07-24-chain-arbitrum.json"));
}
