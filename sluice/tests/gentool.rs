use std::{io::Write, process::Command};

const WORKLOAD: &str = r"
seed: 3
steps:
  - name: orders
    units:
      - name: insert
        params:
          - name: id
            rule:
              kind:
                int64:
                  inclusive:
                    min: 1
                    max: 1000
          - name: status
            rule:
              kind:
                string:
                  constant: new
";

fn workload() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("failed to create workload file");
    file.write_all(WORKLOAD.as_bytes())
        .expect("failed to write workload file");
    file
}

#[test]
fn prints_json_transactions() {
    let file = workload();
    let output = Command::new(env!("CARGO_BIN_EXE_gentool"))
        .arg("--config-path")
        .arg(file.path())
        .args(["--step", "orders", "--count", "5", "--format", "json"])
        .output()
        .expect("failed to run gentool");

    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).expect("stdout is not utf-8");
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 5, "{stdout}");
    for line in lines {
        let transaction: serde_json::Value =
            serde_json::from_str(line).expect("line is not JSON");
        assert_eq!(transaction["unit"], "insert");
        assert_eq!(transaction["values"]["status"], "new");
        assert!(transaction["values"]["id"].is_i64(), "{line}");
    }
}

#[test]
fn unknown_step_exits_with_failure() {
    let file = workload();
    let output = Command::new(env!("CARGO_BIN_EXE_gentool"))
        .arg("--config-path")
        .arg(file.path())
        .args(["--step", "missing"])
        .output()
        .expect("failed to run gentool");

    assert_ne!(output.status.code(), Some(0));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("UnknownStep(\"missing\")"), "{stderr}");
}
