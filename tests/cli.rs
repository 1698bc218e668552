use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_cli_add_list_extract_cycle() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Setup: relative inputs inside a scratch working directory
    let work = tempdir()?;
    let source_dir = work.path().join("dir");
    let nested_dir = source_dir.join("nested");
    fs::create_dir_all(&nested_dir)?;

    let mut file1 = fs::File::create(source_dir.join("file1.txt"))?;
    writeln!(file1, "Hello, this is the first file.")?;
    let mut file2 = fs::File::create(source_dir.join("file2.log"))?;
    writeln!(file2, "Some log data here.")?;
    fs::write(nested_dir.join("nested_file.dat"), [0u8, 1, 2, 3, 4, 5])?;

    // 2. Create archive
    let mut cmd = Command::cargo_bin("zlite")?;
    cmd.current_dir(work.path())
        .args(["a", "test_archive.7z", "dir", "-l", "3"]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Created"));
    assert!(work.path().join("test_archive.7z").exists());

    // 3. List contents of the archive
    let mut cmd = Command::cargo_bin("zlite")?;
    cmd.current_dir(work.path()).args(["l", "test_archive.7z"]);
    cmd.assert().success().stdout(
        predicate::str::contains("dir/file1.txt")
            .and(predicate::str::contains("dir/file2.log"))
            .and(predicate::str::contains("dir/nested/nested_file.dat"))
            .and(predicate::str::contains("Dir")),
    );

    // 4. Test, then extract to a new directory
    let mut cmd = Command::cargo_bin("zlite")?;
    cmd.current_dir(work.path()).args(["t", "test_archive.7z"]);
    cmd.assert().success().stdout(predicate::str::contains("0 failed"));

    let mut cmd = Command::cargo_bin("zlite")?;
    cmd.current_dir(work.path())
        .args(["x", "test_archive.7z", "-o", "restored"]);
    cmd.assert().success();

    // 5. Verify extracted files
    for file in ["file1.txt", "file2.log", "nested/nested_file.dat"] {
        assert_eq!(
            fs::read(work.path().join("restored/dir").join(file))?,
            fs::read(source_dir.join(file))?,
            "{file}"
        );
    }

    // 6. Flat extraction drops the directories
    let mut cmd = Command::cargo_bin("zlite")?;
    cmd.current_dir(work.path())
        .args(["e", "test_archive.7z", "-o", "flat"]);
    cmd.assert().success();
    assert!(work.path().join("flat/nested_file.dat").is_file());
    assert!(!work.path().join("flat/dir").exists());

    Ok(())
}

#[test]
fn test_cli_list_json() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempdir()?;
    fs::create_dir(work.path().join("d"))?;
    fs::write(work.path().join("d/a.txt"), b"json me")?;

    Command::cargo_bin("zlite")?
        .current_dir(work.path())
        .args(["a", "out.7z", "d"])
        .assert()
        .success();

    let output = Command::cargo_bin("zlite")?
        .current_dir(work.path())
        .args(["l", "out.7z", "--json"])
        .output()?;
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(json["format"], "custom");
    assert_eq!(json["declared"], 2);
    assert_eq!(json["entries"][1]["path"], "d/a.txt");
    assert_eq!(json["entries"][1]["kind"], "File");
    assert_eq!(json["entries"][1]["status"], "ok");
    Ok(())
}

#[test]
fn test_cli_errors_exit_non_zero() -> Result<(), Box<dyn std::error::Error>> {
    let work = tempdir()?;
    fs::write(work.path().join("junk.7z"), b"not an archive at all")?;

    Command::cargo_bin("zlite")?
        .current_dir(work.path())
        .args(["l", "junk.7z"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("malformed archive"));

    Command::cargo_bin("zlite")?
        .current_dir(work.path())
        .args(["a", "out.7z", "missing-input"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot access"));
    assert!(!work.path().join("out.7z").exists());

    Command::cargo_bin("zlite")?
        .args(["a", "out.7z", "x", "--level", "12"])
        .assert()
        .failure();
    Ok(())
}
