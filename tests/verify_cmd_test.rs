use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const LEDGER_HEADER: &str = "note_id,owner_id,note_kind,title,description,last_touched_at,is_complete,expected_image_count,expected_video_count";

fn write_archive(root: &Path) {
    let note_dir = root.join("media").join("alice_u1").join("trip_n1");
    fs::create_dir_all(&note_dir).unwrap();
    fs::write(note_dir.join("image_0.jpg"), b"payload").unwrap();
    fs::write(note_dir.join("image_1.jpg"), b"payload").unwrap();
    fs::write(
        note_dir.join("info.json"),
        serde_json::json!({
            "note_id": "n1",
            "note_url": "https://www.xiaohongshu.com/explore/n1",
            "owner_id": "u1",
            "owner_display_name": "alice",
            "title": "trip",
            "description": "",
            "note_kind": "image_set",
            "images": ["https://cdn.example/img0", "https://cdn.example/img1"],
            "video_source": null,
            "video_image_map": {},
            "live_video_sources": [],
            "tags": [],
            "posted_at": null
        })
        .to_string(),
    )
    .unwrap();

    let ledger_dir = root.join("ledgers");
    fs::create_dir_all(&ledger_dir).unwrap();
    fs::write(
        ledger_dir.join("u1_ledger.csv"),
        format!("{LEDGER_HEADER}\nn1,u1,image_set,trip,,2026-01-01 00:00:00,true,2,0\n"),
    )
    .unwrap();
}

fn verify_cmd(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("notekeep").unwrap();
    cmd.env("NOTEKEEP_HOME", home)
        .env("NOTEKEEP_CONFIG_PATH", home.join("missing.toml"))
        .arg("verify");
    cmd
}

#[test]
fn verify_passes_on_a_consistent_archive() {
    let home = TempDir::new().unwrap();
    write_archive(home.path());

    verify_cmd(home.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("1 verified complete"))
        .stdout(predicate::str::contains("verify: ok"));
}

#[test]
fn verify_flags_a_complete_record_with_missing_files() {
    let home = TempDir::new().unwrap();
    write_archive(home.path());
    fs::remove_file(
        home.path()
            .join("media")
            .join("alice_u1")
            .join("trip_n1")
            .join("image_1.jpg"),
    )
    .unwrap();

    verify_cmd(home.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("image_1.jpg"));
}

#[test]
fn verify_treats_zero_byte_files_as_missing() {
    let home = TempDir::new().unwrap();
    write_archive(home.path());
    let target = home
        .path()
        .join("media")
        .join("alice_u1")
        .join("trip_n1")
        .join("image_0.jpg");
    fs::write(&target, b"").unwrap();

    verify_cmd(home.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("image_0.jpg"));
}
