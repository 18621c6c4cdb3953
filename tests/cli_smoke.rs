use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn write_config(dir: &Path) -> std::path::PathBuf {
    let config = dir.join("config.json");
    let body = serde_json::json!({
        "backup_dir": dir.join("backups"),
        "temp_dump_root": dir.join("tmp"),
        "archiver_path": dir.join("winrar"),
        "backup_password": "s3cret",
        "database_url": "jdbc:mysql://localhost:3306/schooldb"
    });
    std::fs::write(&config, body.to_string()).unwrap();
    config
}

fn dumpvault(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("dumpvault").unwrap();
    cmd.current_dir(dir).env_remove("RUST_LOG");
    cmd
}

#[test]
fn rejects_unknown_operation() {
    let dir = tempfile::tempdir().unwrap();
    dumpvault(dir.path())
        .arg("sync")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Invalid choice"));
}

#[test]
fn missing_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    dumpvault(dir.path())
        .env("DUMPVAULT_CONFIG", dir.path().join("absent.json"))
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Failed to load application configuration",
        ));
}

#[test]
fn list_on_empty_backup_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    dumpvault(dir.path())
        .env("DUMPVAULT_CONFIG", &config)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No backups found"));
}

#[test]
fn list_shows_existing_archives() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let backups = dir.path().join("backups");
    std::fs::create_dir_all(&backups).unwrap();
    std::fs::write(
        backups.join("schooldb_backup_2024-05-01_09-00-00.rar"),
        b"archive",
    )
    .unwrap();

    dumpvault(dir.path())
        .env("DUMPVAULT_CONFIG", &config)
        .arg("3")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "schooldb_backup_2024-05-01_09-00-00.rar",
        ));
}

#[test]
fn restore_requires_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    dumpvault(dir.path())
        .env("DUMPVAULT_CONFIG", &config)
        .args(["restore", "schooldb_backup_2024-05-01_09-00-00.rar"])
        .write_stdin("s3cret\nno\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Restore cancelled"));
}
