use assert_cmd::cargo::cargo_bin_cmd;
use lopdf::{dictionary, Document, Object};
use predicates::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Write a PDF with one page per `(width, height)` entry into `dir`.
fn write_pdf(dir: &Path, name: &str, pages: &[(i64, i64)]) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();
    for &(width, height) in pages {
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        });
        kids.push(Object::from(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let path = dir.join(name);
    doc.save(&path).expect("fixture PDF should be written");
    path
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("stdout should contain valid json")
}

#[test]
fn warm_reports_cached_scales() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "two.pdf", &[(200, 100), (100, 100)]);

    let output = cargo_bin_cmd!("pdf-desktop-cli")
        .arg("warm")
        .arg(&pdf)
        .arg("--scale")
        .arg("0.5")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["idle"], Value::Bool(true));
    assert_eq!(value["freeing"], "retain");
    assert_eq!(value["documents"][0]["page_count"], 2);

    let pages = value["documents"][0]["pages"].as_array().unwrap();
    assert_eq!(pages.len(), 2);
    for page in pages {
        assert_eq!(page["cached_scales"], serde_json::json!([0.5, 0.1]));
    }
    assert_eq!(value["stats"]["rasterized"], 4);
    assert_eq!(value["stats"]["failures"], 0);
}

#[test]
fn warm_with_single_slot_keeps_last_insertion() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "one.pdf", &[(200, 100)]);

    let output = cargo_bin_cmd!("pdf-desktop-cli")
        .arg("warm")
        .arg(&pdf)
        .args(["--scale", "1", "--max-keep", "1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["max_textures_keep"], 1);
    assert_eq!(value["documents"][0]["pages"][0]["cached_scales"], serde_json::json!([0.1]));
    assert_eq!(value["stats"]["evictions"], 1);
}

#[test]
fn warm_several_scales_and_page_limit() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "three.pdf", &[(100, 100), (100, 100), (100, 100)]);

    let output = cargo_bin_cmd!("pdf-desktop-cli")
        .arg("warm")
        .arg(&pdf)
        .args(["--scale", "1", "--scale", "2", "--pages", "1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    let pages = value["documents"][0]["pages"].as_array().unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0]["cached_scales"], serde_json::json!([2.0, 1.0, 0.1]));
    assert_eq!(value["scales"], serde_json::json!([1.0, 2.0]));
}

#[test]
fn warm_reads_config_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "doc.pdf", &[(100, 100)]);
    let config = temp.path().join("desktop.toml");
    std::fs::write(&config, "[cache]\nmax_textures_keep = 3\nfreeing = \"aggressive\"\n").unwrap();

    let output = cargo_bin_cmd!("pdf-desktop-cli")
        .arg("warm")
        .arg(&pdf)
        .arg("--config")
        .arg(&config)
        .env_remove("PDF_DESKTOP_MAX_TEXTURES")
        .env_remove("PDF_DESKTOP_FREEING")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["max_textures_keep"], 3);
    assert_eq!(value["freeing"], "ref_counted");
}

#[test]
fn warm_rejects_bad_scale() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "doc.pdf", &[(100, 100)]);

    cargo_bin_cmd!("pdf-desktop-cli")
        .arg("warm")
        .arg(&pdf)
        .args(["--scale", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--scale must be a positive number"));
}

#[test]
fn warm_rejects_zero_capacity() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "doc.pdf", &[(100, 100)]);

    cargo_bin_cmd!("pdf-desktop-cli")
        .arg("warm")
        .arg(&pdf)
        .args(["--max-keep", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid texture configuration"));
}

#[test]
fn warm_fails_for_missing_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    cargo_bin_cmd!("pdf-desktop-cli")
        .arg("warm")
        .arg(temp.path().join("missing.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn info_lists_page_sizes() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_pdf(temp.path(), "sizes.pdf", &[(612, 792), (300, 200)]);

    let output = cargo_bin_cmd!("pdf-desktop-cli")
        .arg("info")
        .arg(&pdf)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["page_count"], 2);
    assert_eq!(value["page_sizes_pt"][1], serde_json::json!({ "width": 300.0, "height": 200.0 }));
}

#[test]
fn info_fails_for_invalid_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let path = temp.path().join("invalid.pdf");
    std::fs::write(&path, b"not a pdf").unwrap();

    cargo_bin_cmd!("pdf-desktop-cli")
        .arg("info")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));
}

#[test]
fn info_fails_for_encrypted_marker_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let path = temp.path().join("encrypted.pdf");
    std::fs::write(&path, b"%PDF-1.5\n1 0 obj << /Encrypt 2 0 R >> endobj\n%%EOF\n").unwrap();

    cargo_bin_cmd!("pdf-desktop-cli")
        .arg("info")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("encrypted PDFs are not supported"));
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("pdf-desktop-cli")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
