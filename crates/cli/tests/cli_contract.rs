use assert_cmd::cargo::cargo_bin_cmd;
use base64::{engine::general_purpose::STANDARD, Engine};
use pdf_engine::fixtures::{sample_png, sample_pdf};
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).expect("fixture should be written");
    path
}

fn media_box_size(doc: &lopdf::Document, page_id: lopdf::ObjectId) -> (f32, f32) {
    let page = doc.get_dictionary(page_id).expect("page dictionary");
    let values: Vec<f32> = page
        .get(b"MediaBox")
        .and_then(lopdf::Object::as_array)
        .expect("media box")
        .iter()
        .map(|value| value.as_float().expect("numeric media box"))
        .collect();
    (values[2] - values[0], values[3] - values[1])
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("pagemark")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn info_lists_every_page_size() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_fixture(temp.path(), "two.pdf", &sample_pdf(&[(612.0, 792.0), (595.0, 842.0)]));

    let output = cargo_bin_cmd!("pagemark")
        .arg("info")
        .arg(&pdf)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    assert_eq!(value["page_count"], 2);
    assert_eq!(value["pages"][0]["width"].as_f64(), Some(612.0));
    assert_eq!(value["pages"][1]["height"].as_f64(), Some(842.0));
}

#[test]
fn info_fails_for_missing_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    cargo_bin_cmd!("pagemark")
        .arg("info")
        .arg(temp.path().join("missing.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn info_fails_for_invalid_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_fixture(temp.path(), "invalid.pdf", b"this is not a pdf");

    cargo_bin_cmd!("pagemark")
        .arg("info")
        .arg(&pdf)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));
}

#[test]
fn info_fails_for_encrypted_marker_pdf() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf =
        write_fixture(temp.path(), "encrypted.pdf", b"%PDF-1.7\ntrailer << /Encrypt 5 0 R >>\n");

    cargo_bin_cmd!("pagemark")
        .arg("info")
        .arg(&pdf)
        .assert()
        .failure()
        .stderr(predicate::str::contains("encrypted PDFs are not supported"));
}

#[test]
fn edit_replays_script_and_exports() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_fixture(temp.path(), "in.pdf", &sample_pdf(&[(612.0, 792.0), (612.0, 792.0)]));
    let output_path = temp.path().join("out").join("edited.pdf");
    let image_url = format!("data:image/png;base64,{}", STANDARD.encode(sample_png(4, 4)));
    let script = json!([
        { "action": "gesture", "page": 1, "tool": "rectangle",
          "points": [{ "x": 10, "y": 10 }, { "x": 80, "y": 60 }],
          "style": { "color": "#0000ff", "dash": "dashed" } },
        { "action": "click", "page": 1, "tool": "check", "x": 120, "y": 40 },
        { "action": "click", "page": 2, "tool": "text", "x": 50, "y": 50 },
        { "action": "set_text", "text": "Hello" },
        { "action": "place_image", "page": 2,
          "rect": { "x": 100, "y": 100, "width": 40, "height": 40 },
          "data_url": image_url },
        { "action": "insert_page", "after": 2 },
        { "action": "gesture", "page": 1, "tool": "crop",
          "points": [{ "x": 0, "y": 0 }, { "x": 300, "y": 400 }] },
        { "action": "apply_crop", "page": 1 }
    ]);
    let script_path = write_fixture(temp.path(), "script.json", script.to_string().as_bytes());

    let stdout = cargo_bin_cmd!("pagemark")
        .arg("edit")
        .arg(&pdf)
        .arg("--script")
        .arg(&script_path)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let mut summary: Value =
        serde_json::from_slice(&stdout).expect("stdout should contain valid json");
    summary["output"] = Value::String("<OUTPUT>".to_owned());
    insta::assert_json_snapshot!(summary, @r###"
{
  "actions": 8,
  "annotations": 4,
  "output": "<OUTPUT>",
  "page_count": 3
}
"###);

    let doc = lopdf::Document::load(&output_path).expect("exported PDF should parse");
    let pages = doc.get_pages();
    assert_eq!(pages.len(), 3);
    assert_eq!(media_box_size(&doc, pages[&1]), (300.0, 400.0));
    assert_eq!(media_box_size(&doc, pages[&3]), (595.0, 842.0));
    let content = doc.get_page_content(pages[&2]).expect("page 2 content");
    let text = String::from_utf8_lossy(&content).into_owned();
    assert!(text.contains("(Hello) Tj"), "{text}");
}

#[test]
fn edit_reports_the_failing_action() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_fixture(temp.path(), "one.pdf", &sample_pdf(&[(612.0, 792.0)]));
    let output_path = temp.path().join("never.pdf");
    let script = json!([
        { "action": "click", "page": 1, "tool": "dot", "x": 20, "y": 20 },
        { "action": "delete_page", "page": 1 }
    ]);
    let script_path = write_fixture(temp.path(), "script.json", script.to_string().as_bytes());

    cargo_bin_cmd!("pagemark")
        .arg("edit")
        .arg(&pdf)
        .arg("--script")
        .arg(&script_path)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("action 2 failed"))
        .stderr(predicate::str::contains("cannot delete the last remaining page"));

    assert!(!output_path.exists());
}

#[test]
fn edit_rejects_malformed_script() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_fixture(temp.path(), "one.pdf", &sample_pdf(&[(612.0, 792.0)]));
    let script_path = write_fixture(temp.path(), "script.json", br#"{"action": "undo"}"#);

    cargo_bin_cmd!("pagemark")
        .arg("edit")
        .arg(&pdf)
        .arg("--script")
        .arg(&script_path)
        .arg("--output")
        .arg(temp.path().join("out.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid action script"));
}

#[test]
fn edit_honours_config_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let pdf = write_fixture(temp.path(), "one.pdf", &sample_pdf(&[(612.0, 792.0)]));
    let config = write_fixture(temp.path(), "pagemark.conf", b"blank_page_size = 612x792\n");
    let output_path = temp.path().join("out.pdf");
    let script = json!([{ "action": "insert_page", "after": 0 }]);
    let script_path = write_fixture(temp.path(), "script.json", script.to_string().as_bytes());

    cargo_bin_cmd!("pagemark")
        .arg("edit")
        .arg(&pdf)
        .arg("--script")
        .arg(&script_path)
        .arg("--output")
        .arg(&output_path)
        .arg("--config")
        .arg(&config)
        .assert()
        .success();

    let doc = lopdf::Document::load(&output_path).expect("exported PDF should parse");
    let pages = doc.get_pages();
    assert_eq!(media_box_size(&doc, pages[&1]), (612.0, 792.0));
}
