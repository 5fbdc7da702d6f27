// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end tests for the `mediawerk` binary, run against temp directories.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use image::{Rgba, RgbaImage};

fn mediawerk(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_mediawerk"))
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("binary runs")
}

fn arg(path: &Path) -> &str {
    path.to_str().expect("temp paths are UTF-8")
}

/// White 48x32 canvas with a dark block, written as PNG.
fn write_png(dir: &Path, name: &str) -> PathBuf {
    let mut img = RgbaImage::from_pixel(48, 32, Rgba([255, 255, 255, 255]));
    for y in 8..24 {
        for x in 12..36 {
            img.put_pixel(x, y, Rgba([(x * 5) as u8, 40, (y * 7) as u8, 255]));
        }
    }
    let path = dir.join(name);
    img.save(&path).expect("png written");
    path
}

fn json_report(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is a JSON report")
}

#[test]
fn convert_writes_target_format() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_png(dir.path(), "logo.png");
    let out = dir.path().join("out");

    let output = mediawerk(&["convert", arg(&input), "--to", "jpg", "--out-dir", arg(&out)]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let converted = image::open(out.join("logo.jpg")).unwrap();
    assert_eq!((converted.width(), converted.height()), (48, 32));
}

#[test]
fn json_report_lists_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_png(dir.path(), "shot.png");
    let out = dir.path().join("out");

    let output = mediawerk(&["scrub", arg(&input), "--out-dir", arg(&out), "--json"]);
    assert!(output.status.success());

    let report = json_report(&output);
    assert_eq!(report["summary"]["done"], 1);
    assert_eq!(report["items"][0]["status"], "done");
    assert_eq!(report["items"][0]["result"]["kind"], "scrub");
    assert!(out.join("shot_clean.png").exists());
}

#[test]
fn one_bad_file_fails_the_run_but_not_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_png(dir.path(), "good.png");
    let bad = dir.path().join("bad.png");
    std::fs::write(&bad, b"this is not a png").unwrap();
    let out = dir.path().join("out");

    let output = mediawerk(&[
        "remove-background",
        arg(&bad),
        arg(&good),
        "--out-dir",
        arg(&out),
        "--json",
    ]);
    assert!(!output.status.success());

    let report = json_report(&output);
    assert_eq!(report["summary"]["failed"], 1);
    assert_eq!(report["summary"]["done"], 1);
    assert!(report["items"][0]["error"].is_string());
    assert!(out.join("good_nobg.png").exists());
}

#[test]
fn unknown_extension_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("notes.txt");
    std::fs::write(&input, b"hello").unwrap();

    let output = mediawerk(&["scrub", arg(&input), "--out-dir", arg(dir.path()), "--json"]);
    assert!(!output.status.success());
    assert_eq!(json_report(&output)["summary"]["failed"], 1);
}

#[test]
fn unsupported_conversion_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_png(dir.path(), "a.png");
    let output = mediawerk(&["convert", arg(&input), "--to", "docx", "--out-dir", arg(dir.path())]);
    assert!(!output.status.success());
}

#[test]
fn merge_concatenates_in_argument_order() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let first = write_png(dir.path(), "first.png");
    let second = write_png(dir.path(), "second.png");

    let output = mediawerk(&["convert", arg(&first), arg(&second), "--to", "pdf", "--out-dir", arg(&out)]);
    assert!(output.status.success());

    let output = mediawerk(&[
        "merge",
        arg(&out.join("second.pdf")),
        arg(&out.join("first.pdf")),
        "--out-dir",
        arg(&out),
        "--json",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(json_report(&output)["items"][0]["result"]["kind"], "merge");

    let merged = std::fs::read(out.join("merged.pdf")).unwrap();
    assert!(merged.starts_with(b"%PDF"));
}

#[test]
fn compress_reports_sizes() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_png(dir.path(), "big.png");
    let out = dir.path().join("out");

    let output = mediawerk(&[
        "compress",
        arg(&input),
        "--mode",
        "lossless",
        "--percent",
        "50",
        "--out-dir",
        arg(&out),
        "--json",
    ]);
    assert!(output.status.success());
    let report = json_report(&output);
    let result = &report["items"][0]["result"];
    assert_eq!(result["kind"], "compress");
    assert!(result["original_size"].as_u64().unwrap() > 0);
}

#[test]
fn bad_config_is_a_fatal_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_png(dir.path(), "a.png");
    let config = dir.path().join("config.json");
    std::fs::write(&config, r#"{ "render_scale": -1.0 }"#).unwrap();

    let output = mediawerk(&["scrub", arg(&input), "--config", arg(&config)]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
}

#[test]
fn same_output_name_is_not_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let png = write_png(dir.path(), "a.png");
    let jpg = dir.path().join("a.jpg");
    image::open(&png).unwrap().to_rgb8().save(&jpg).unwrap();
    let out = dir.path().join("out");

    let output = mediawerk(&["convert", arg(&png), arg(&jpg), "--to", "pdf", "--out-dir", arg(&out), "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report = json_report(&output);
    assert_eq!(report["items"][0]["written"][0], arg(&out.join("a.pdf")));
    assert_eq!(report["items"][1]["written"][0], arg(&out.join("a_2.pdf")));
    assert!(out.join("a.pdf").exists() && out.join("a_2.pdf").exists());
}

#[test]
fn failed_write_marks_the_item_failed() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_png(dir.path(), "logo.png");
    let out = dir.path().join("out");
    // A directory where the output file should go makes the write fail.
    std::fs::create_dir_all(out.join("logo.jpg")).unwrap();

    let output = mediawerk(&["convert", arg(&input), "--to", "jpg", "--out-dir", arg(&out), "--json"]);
    assert!(!output.status.success());

    let report = json_report(&output);
    assert_eq!(report["summary"]["total"], 1);
    assert_eq!(report["summary"]["done"], 0);
    assert_eq!(report["summary"]["failed"], 1);
    assert_eq!(report["items"][0]["status"], "failed");
    assert!(report["items"][0]["error"].is_string());
}
