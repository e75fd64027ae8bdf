mod common;

use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*; // Used for writing assertions
use std::process::Command; // Run programs

fn write_sample(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("line.kmall");
    std::fs::write(&path, common::small_file()).unwrap();
    path
}

#[test]
fn count_datagrams() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = write_sample(&dir);
    let mut cmd = Command::cargo_bin("kmall")?;

    cmd.arg("count").arg(&path);
    cmd.assert().success().stdout(
        predicate::str::contains("1\t#MRZ")
            .and(predicate::str::contains("1\t#SKM"))
            .and(predicate::str::contains("1\t#IIP")),
    );

    Ok(())
}

#[test]
fn count_no_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("kmall")?;

    cmd.arg("count").arg("assets/missing.kmall");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("No such file or directory"));

    Ok(())
}

#[test]
fn index_to_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = write_sample(&dir);
    let out = dir.path().join("line.tsv");
    let mut cmd = Command::cargo_bin("kmall")?;

    cmd.arg("index").arg(&path).arg("-o").arg(&out);
    cmd.assert().success();
    let tsv = std::fs::read_to_string(out)?;
    assert_eq!(tsv.lines().count(), 3);
    let first: Vec<_> = tsv.lines().next().unwrap().split('\t').collect();
    assert_eq!((first[1], first[3]), ("0", "#IIP"));

    Ok(())
}

#[test]
fn verify_carries_on_past_missing_files() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = write_sample(&dir);
    let mut cmd = Command::cargo_bin("kmall")?;

    cmd.arg("verify").arg(dir.path().join("missing.kmall")).arg(&path);
    cmd.assert().failure().stdout(
        predicate::str::contains("Failed:")
            .and(predicate::str::contains("Trailing length mismatches: 0"))
            .and(predicate::str::contains("#MRZ\t1"))
            .and(predicate::str::contains("TRAI_TX1 (Transmit transducer)"))
            .and(predicate::str::contains("N = 1 (Serial number)")),
    );

    Ok(())
}

#[test]
fn sectors_per_ping() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = write_sample(&dir);
    let mut cmd = Command::cargo_bin("kmall")?;

    cmd.arg("sectors").arg(&path);
    let output = cmd.assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output)?;
    let rows: Vec<Vec<&str>> = text.lines().map(|l| l.split('\t').collect()).collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][1..6], ["1", "0", "300000", "3", "3"]);
    assert_eq!(rows[1][1..6], ["1", "1", "300000", "2", "2"]);

    Ok(())
}

#[test]
fn compress_and_decompress() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = write_sample(&dir);

    Command::cargo_bin("kmall")?
        .arg("compress")
        .arg(&path)
        .assert()
        .success();
    let packed = dir.path().join("line.0z");
    assert!(packed.exists());

    Command::cargo_bin("kmall")?
        .args(["compress", "--level", "1"])
        .arg(&path)
        .assert()
        .success();
    assert!(dir.path().join("line.1z").exists());

    // line.kmall is taken, so the expanded file gets a number
    Command::cargo_bin("kmall")?
        .arg("decompress")
        .arg(&packed)
        .assert()
        .success();
    let restored = std::fs::read(dir.path().join("line_1.kmall"))?;
    assert_eq!(restored, std::fs::read(&path)?);

    Ok(())
}

#[test]
fn compress_rejects_unknown_level() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("kmall")?;
    cmd.args(["compress", "--level", "2", "line.kmall"]);
    cmd.assert().failure();
    Ok(())
}

#[test]
fn attitude_to_avro() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = write_sample(&dir);
    let out = dir.path().join("attitude.avro");

    Command::cargo_bin("kmall")?
        .arg("attitude")
        .arg(&path)
        .arg(&out)
        .assert()
        .success();
    let reader = apache_avro::Reader::new(std::fs::File::open(out)?)?;
    assert_eq!(reader.count(), 3);

    Ok(())
}
