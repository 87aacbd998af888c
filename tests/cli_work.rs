use std::fs;
use std::path::Path;

use predicates::prelude::*;
use serde_json::Value;

fn chapterforge(data_dir: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("chapterforge");
    cmd.current_dir(data_dir)
        .env_remove("RUST_LOG")
        .env_remove("CHAPTERFORGE_LOG_FORMAT")
        .arg("--data-dir")
        .arg(data_dir);
    cmd
}

#[test]
fn work_create_writes_metadata_and_empty_manifest() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let data_dir = temp.path();

    chapterforge(data_dir)
        .args(["work", "create", "Minha Obra Épica!", "--lang", "en", "--author", "Autor X"])
        .assert()
        .success()
        .stdout(predicate::str::contains("work_id: minha_obra_epica"));

    let metadata: Value = serde_json::from_slice(&fs::read(
        data_dir.join("input/minha_obra_epica/metadata.json"),
    )?)?;
    assert_eq!(metadata["title"], "Minha Obra Épica!");
    assert_eq!(metadata["original_language"], "en");
    assert_eq!(metadata["author"], "Autor X");
    assert_eq!(metadata["tags"], serde_json::json!([]));

    let manifest: Value = serde_json::from_slice(&fs::read(
        data_dir.join("store/minha_obra_epica/manifest.json"),
    )?)?;
    assert_eq!(manifest, serde_json::json!({ "chapters": {} }));
    assert!(data_dir.join("input/minha_obra_epica/chapters").is_dir());
    assert!(data_dir.join("output/minha_obra_epica").is_dir());

    chapterforge(data_dir)
        .args(["work", "create", "minha obra epica"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("work already exists: minha_obra_epica"));
    Ok(())
}

#[test]
fn work_list_update_chapters_and_delete() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let data_dir = temp.path();

    chapterforge(data_dir)
        .args(["work", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no works found"));

    chapterforge(data_dir)
        .args(["work", "create", "Obra Um"])
        .assert()
        .success();
    chapterforge(data_dir)
        .args(["work", "update", "obra_um", "--author", "Alguém", "--tags", "a, b"])
        .assert()
        .success();

    chapterforge(data_dir)
        .args(["work", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("obra_um\tObra Um"))
        .stdout(predicate::str::contains("author:   Alguém"))
        .stdout(predicate::str::contains("tags:     a, b"));

    let chapters = data_dir.join("input/obra_um/chapters");
    fs::write(chapters.join("002.txt"), "texto")?;
    fs::write(chapters.join("001.txt"), "texto")?;
    chapterforge(data_dir)
        .args(["work", "chapters", "obra_um"])
        .assert()
        .success()
        .stdout(predicate::str::contains("001.txt\tpending\n002.txt\tpending\ntotal: 2"));

    chapterforge(data_dir)
        .args(["work", "delete", "obra_um"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
    assert!(chapters.is_dir());

    chapterforge(data_dir)
        .args(["work", "delete", "obra_um", "--yes"])
        .assert()
        .success();
    assert!(!data_dir.join("input/obra_um").exists());
    assert!(!data_dir.join("store/obra_um").exists());
    Ok(())
}

#[test]
fn work_ids_outside_the_layout_are_rejected() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let data_dir = temp.path();
    chapterforge(data_dir)
        .args(["work", "create", "Obra Um"])
        .assert()
        .success();

    for bad in ["..", "../input", "Obra Um"] {
        chapterforge(data_dir)
            .args(["work", "delete", bad, "--yes"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid work id"));
    }
    assert!(data_dir.join("input/obra_um/metadata.json").is_file());
    assert!(data_dir.join("store/obra_um/manifest.json").is_file());
    Ok(())
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    chapterforge(temp.path())
        .env("RUST_LOG", "debug")
        .args(["work", "list"])
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
    Ok(())
}

#[test]
fn json_log_format_emits_json_lines() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    chapterforge(temp.path())
        .env("RUST_LOG", "debug")
        .env("CHAPTERFORGE_LOG_FORMAT", "json")
        .args(["work", "list"])
        .assert()
        .success()
        .stderr(predicate::str::contains("\"level\":\"DEBUG\""))
        .stderr(predicate::str::contains("parsed cli"));
    Ok(())
}
