use std::{fs, path::Path};

use cjk_subset::{testing::TestFontBuilder, FontFile};
use clap::Parser as _;

use crate::{cli::Cli, run};

fn write_fonts(dir: &Path) {
    let font = TestFontBuilder::new()
        .char_glyphs(&['A', 'b', '醫', '牙', '診', '龘'])
        .unmapped_glyphs(200)
        .glyph_names();
    fs::write(dir.join("GenYoGothicTW-Regular.woff2"), font.build_woff2()).unwrap();
    fs::write(dir.join("GenYoGothicTW-Bold.ttf"), font.build()).unwrap();
    fs::write(dir.join("GenYoGothicTW-Light.woff2"), b"wOF2 is not enough").unwrap();
}

fn run_cli(args: &[&str]) -> (anyhow::Result<crate::batch::Summary>, String) {
    let cli = Cli::try_parse_from(args).unwrap();
    let mut out = vec![];
    let result = run(cli, &mut out);
    (result, String::from_utf8(out).unwrap())
}

#[test]
fn subsetting_directory() {
    let dir = tempfile::tempdir().unwrap();
    write_fonts(dir.path());
    let fonts_dir = dir.path().to_str().unwrap();

    let (summary, out) = run_cli(&["cjk-subset", "subset", "--fonts-dir", fonts_dir]);
    let summary = summary.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 1);
    assert!(out.contains("✓ Subset created: GenYoGothicTW-Regular.woff2"), "{out}");
    assert!(out.contains("✗ Subsetting failed: GenYoGothicTW-Light.woff2"), "{out}");
    assert!(out.contains("Reduction: "), "{out}");
    assert!(out.contains("GenYoGothicTW-Regular-subset.woff2"), "{out}");

    let output = fs::read(dir.path().join("GenYoGothicTW-Regular-subset.woff2")).unwrap();
    let original = fs::read(dir.path().join("GenYoGothicTW-Regular.woff2")).unwrap();
    assert!(output.len() < original.len());
    let file = FontFile::new(&output).unwrap();
    let font = file.font().unwrap();
    // Common hanzi are retained; others are dropped
    assert_ne!(font.map_char('醫').unwrap(), 0);
    assert_eq!(font.map_char('龘').unwrap(), 0);
    assert_eq!(font.map_char('A').unwrap(), 0);

    // Outputs of the previous run are skipped
    let (summary, out) = run_cli(&["cjk-subset", "subset", "--fonts-dir", fonts_dir]);
    assert_eq!(summary.unwrap().processed, 1, "{out}");
    assert!(!out.contains("Regular-subset-subset"), "{out}");
}

#[test]
fn subsetting_with_extra_chars_and_config() {
    let dir = tempfile::tempdir().unwrap();
    write_fonts(dir.path());
    let config_path = dir.path().join("subset.toml");
    fs::write(
        &config_path,
        "fonts-dir = \".\"\nextension = \"ttf\"\nformat = \"ttf\"\ntext = \"A\"\n",
    )
    .unwrap();

    let (summary, out) = run_cli(&[
        "cjk-subset",
        "subset",
        "--config",
        config_path.to_str().unwrap(),
        "--unicodes",
        "U+9F98",
    ]);
    let summary = summary.unwrap();
    assert!(summary.is_success(), "{out}");
    assert_eq!(summary.processed, 1);

    let output = fs::read(dir.path().join("GenYoGothicTW-Bold-subset.ttf")).unwrap();
    let file = FontFile::new(&output).unwrap();
    let font = file.font().unwrap();
    for ch in ['A', '龘', '醫'] {
        assert_ne!(font.map_char(ch).unwrap(), 0, "{ch:?}");
    }
    assert_eq!(font.map_char('b').unwrap(), 0);
}

#[test]
fn missing_fonts_dir_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let fonts_dir = dir.path().join("missing");
    let (result, _) = run_cli(&[
        "cjk-subset",
        "subset",
        "--fonts-dir",
        fonts_dir.to_str().unwrap(),
    ]);
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("failed scanning directory"), "{err:#}");
}

#[test]
fn invalid_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("subset.toml");
    fs::write(&config_path, "suffix = 42").unwrap();

    let (result, _) = run_cli(&[
        "cjk-subset",
        "--config",
        config_path.to_str().unwrap(),
        "convert",
    ]);
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("invalid config"), "{err:#}");
}
