use std::{env, fmt, io::Write, process::Command, sync::OnceLock};

use allsorts::{
    binary::read::ReadScope, font::MatchingPresentation, font_data::FontData,
    tables::FontTableProvider,
};
use test_casing::{test_casing, Product};

use crate::{
    font::{Glyph, GlyphName, NameTable},
    testing::{Substitution, TestFontBuilder},
    CharSet, FontFile, FontFormat, NameIds, OutputFormat, ParseErrorKind, SubsetOptions,
    TableTag,
};

const CJK_CHARS: [char; 8] = ['一', '人', '大', '中', '国', '的', '。', '，'];
const LATIN_CHARS: [char; 6] = ['A', 'B', 'a', 'b', '1', '!'];

#[derive(Clone, Copy)]
pub(crate) struct TestFont {
    pub(crate) name: &'static str,
    builder: fn() -> TestFontBuilder,
    is_woff2: bool,
}

impl fmt::Debug for TestFont {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.name, formatter)
    }
}

impl TestFont {
    pub(crate) fn build(self) -> Vec<u8> {
        let builder = (self.builder)();
        if self.is_woff2 {
            builder.build_woff2()
        } else {
            builder.build()
        }
    }
}

fn plain_builder() -> TestFontBuilder {
    TestFontBuilder::new()
        .char_glyphs(&LATIN_CHARS)
        .char_glyphs(&CJK_CHARS)
        .unmapped_glyphs(2)
}

const PLAIN_FONT: TestFont = TestFont {
    name: "plain",
    builder: plain_builder,
    is_woff2: false,
};

const COMPOSITE_FONT: TestFont = TestFont {
    name: "composite",
    builder: || {
        plain_builder()
            // `國` is composed of both unmapped glyphs
            .composite_glyph('國', &[15, 16])
            .glyph_instructions(&[0xb0, 0x00])
    },
    is_woff2: false,
};

const VERTICAL_FONT: TestFont = TestFont {
    name: "vertical",
    builder: || {
        plain_builder()
            .vertical_metrics()
            .glyph_names()
            .legacy_cmap()
            .cmap_glyph_id_array()
    },
    is_woff2: false,
};

const LAYOUT_FONT: TestFont = TestFont {
    name: "layout",
    builder: || {
        plain_builder()
            .symbol_cmap()
            .substitution(Substitution::Single { from: 7, to: 15 })
            .substitution(Substitution::Ligature {
                components: vec![3, 4],
                glyph: 16,
            })
            .table(TableTag::GASP, vec![0, 1, 0, 1, 0xff, 0xff, 0, 0x0f])
    },
    is_woff2: false,
};

const WOFF2_FONT: TestFont = TestFont {
    name: "woff2",
    builder: || plain_builder().glyph_names().vertical_metrics(),
    is_woff2: true,
};

pub(crate) const FONTS: [TestFont; 5] = [
    PLAIN_FONT,
    COMPOSITE_FONT,
    VERTICAL_FONT,
    LAYOUT_FONT,
    WOFF2_FONT,
];

#[derive(Debug, Clone, Copy)]
pub(crate) struct TestCharSubset(&'static str);

impl TestCharSubset {
    pub(crate) fn into_set(self) -> CharSet {
        CharSet::from_text(self.0)
    }
}

pub(crate) const SUBSET_CHARS: [TestCharSubset; 2] = [
    TestCharSubset("一人中。Ab!"),
    TestCharSubset("大的，國a"),
];

#[derive(Debug)]
struct OpenTypeSanitizer {
    path: Option<String>,
}

impl Default for OpenTypeSanitizer {
    fn default() -> Self {
        let Ok(path) = env::var("OTS_SANITIZER") else {
            return Self { path: None };
        };
        let output = Command::new(&path)
            .arg("--version")
            .output()
            .unwrap_or_else(|err| {
                panic!("failed getting version for ots-sanitize at {path}: {err}");
            });
        assert!(
            output.status.success(),
            "failed getting version for ots-sanitize at {path}: non-zero exit code"
        );
        let version = String::from_utf8_lossy(&output.stdout);
        println!("ots-sanitize version: {version}");
        Self { path: Some(path) }
    }
}

impl OpenTypeSanitizer {
    fn get() -> &'static Self {
        static SANITIZER: OnceLock<OpenTypeSanitizer> = OnceLock::new();
        SANITIZER.get_or_init(Self::default)
    }

    fn validate(&self, content: &[u8]) {
        let Some(path) = &self.path else {
            println!("OTS_SANITIZER env var is missing; skipping checks");
            return;
        };

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.as_file_mut().write_all(content).unwrap();
        file.as_file_mut().flush().unwrap();
        let file_path = file.into_temp_path();

        let output = Command::new(path)
            .arg(&file_path)
            .output()
            .expect("failed running ots-sanitize");
        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            panic!("ots-sanitize failed:\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}");
        }
    }
}

fn assert_valid_font(raw: &[u8], expected_chars: &[char], absent_chars: &[char]) {
    let file = FontFile::new(raw).unwrap();
    let font = file.font().unwrap();
    for &ch in expected_chars {
        assert_ne!(font.map_char(ch).unwrap(), 0, "{ch:?}");
    }
    for &ch in absent_chars {
        assert_eq!(font.map_char(ch).unwrap(), 0, "{ch:?}");
    }

    let font_data = ReadScope::new(raw).read::<FontData<'_>>().unwrap();
    let provider = font_data.table_provider(0).unwrap();
    let mut reference_font = allsorts::Font::new(provider).unwrap();
    for &ch in expected_chars {
        let (glyph_idx, _) =
            reference_font.lookup_glyph_index(ch, MatchingPresentation::NotRequired, None);
        assert_eq!(glyph_idx, font.map_char(ch).unwrap(), "{ch:?}");
    }

    OpenTypeSanitizer::get().validate(raw);
}

#[test_casing(5, FONTS)]
fn reading_font(font: TestFont) {
    let bytes = font.build();
    let file = FontFile::new(&bytes).unwrap();
    let expected_format = if font.is_woff2 {
        FontFormat::Woff2
    } else {
        FontFormat::OpenType
    };
    assert_eq!(file.format(), expected_format);

    let font = file.font().unwrap();
    let font_data = ReadScope::new(&bytes).read::<FontData<'_>>().unwrap();
    let provider = font_data.table_provider(0).unwrap();
    let mut reference_font = allsorts::Font::new(provider).unwrap();
    for ch in CJK_CHARS.into_iter().chain(LATIN_CHARS).chain(['國', 'z']) {
        let glyph_idx = font.map_char(ch).unwrap();
        let (expected_idx, _) =
            reference_font.lookup_glyph_index(ch, MatchingPresentation::NotRequired, None);
        assert_eq!(glyph_idx, expected_idx, "{ch:?}");
    }
}

#[test_casing(10, Product((FONTS, SUBSET_CHARS)))]
fn subsetting_font(font: TestFont, chars: TestCharSubset) {
    let bytes = font.build();
    let file = FontFile::new(&bytes).unwrap();
    let chars = chars.into_set();
    let subset = file
        .font()
        .unwrap()
        .subset(&chars, &SubsetOptions::default())
        .unwrap();
    let mapped: Vec<_> = subset.mapped_chars().collect();
    let missing = subset.missing_chars().to_vec();
    assert_eq!(mapped.len() + missing.len(), chars.len());

    let unrelated: Vec<_> = CJK_CHARS
        .into_iter()
        .chain(LATIN_CHARS)
        .filter(|ch| !chars.contains(*ch))
        .collect();
    for format in [OutputFormat::TrueType, OutputFormat::Woff2] {
        let output = subset.encode(format);
        assert_valid_font(&output, &mapped, &unrelated);
    }
}

#[test_casing(10, Product((FONTS, SUBSET_CHARS)))]
fn subsetting_font_with_web_options(font: TestFont, chars: TestCharSubset) {
    let bytes = font.build();
    let file = FontFile::new(&bytes).unwrap();
    let subset = file
        .font()
        .unwrap()
        .subset(&chars.into_set(), &SubsetOptions::web_cjk())
        .unwrap();
    let mapped: Vec<_> = subset.mapped_chars().collect();

    let ttf = subset.to_truetype();
    assert_valid_font(&ttf, &mapped, &[]);
    let woff2 = subset.to_woff2();
    assert_valid_font(&woff2, &mapped, &[]);
}

#[test]
fn output_is_smaller_than_input() {
    let bytes = plain_builder()
        .char_glyphs(&('\u{4e10}'..='\u{4eff}').collect::<Vec<_>>())
        .build();
    let file = FontFile::new(&bytes).unwrap();
    let subset = file
        .font()
        .unwrap()
        .subset(&CharSet::from_text("一人"), &SubsetOptions::default())
        .unwrap();

    let ttf = subset.to_truetype();
    let woff2 = subset.to_woff2();
    assert!(ttf.len() < bytes.len(), "{} vs {}", ttf.len(), bytes.len());
    assert!(woff2.len() < ttf.len(), "{} vs {}", woff2.len(), ttf.len());
}

#[test]
fn supplementary_chars_are_retained() {
    let bytes = plain_builder().char_glyphs(&['𠀀', '𪚥']).build();
    let file = FontFile::new(&bytes).unwrap();
    let subset = file
        .font()
        .unwrap()
        .subset(&CharSet::from_text("𪚥人"), &SubsetOptions::default())
        .unwrap();
    assert_eq!(subset.mapped_chars().collect::<String>(), "人𪚥");

    let ttf = subset.to_truetype();
    assert_valid_font(&ttf, &['人', '𪚥'], &['𠀀', '一']);
}

#[test]
fn glyph_ids_are_retained_with_layout_features() {
    let bytes = LAYOUT_FONT.build();
    let file = FontFile::new(&bytes).unwrap();
    let original = file.font().unwrap();
    let subset = file
        .font()
        .unwrap()
        .subset(&CharSet::from_text("一Ab"), &SubsetOptions::web_cjk())
        .unwrap();

    let ttf = subset.to_truetype();
    let output_file = FontFile::new(&ttf).unwrap();
    let output = output_file.font().unwrap();
    for ch in ['一', 'A', 'b'] {
        assert_eq!(output.map_char(ch).unwrap(), original.map_char(ch).unwrap());
    }
    // `一` (#7) is substituted by #15; the `a` + `b` ligature is not enabled since `a` is absent
    assert_eq!(output.glyph_count(), original.glyph_count());
    assert!(matches!(output.glyph(15).unwrap().outline, Glyph::Simple(_)));
    assert!(matches!(output.glyph(16).unwrap().outline, Glyph::Empty));
    assert_eq!(output_file.table(TableTag::GSUB), file.table(TableTag::GSUB));
    assert_eq!(output_file.table(TableTag::GASP), file.table(TableTag::GASP));
}

#[test]
fn auxiliary_tables_are_copied_for_web_fonts() {
    let kern = vec![0, 0, 0, 0];
    let stat = vec![0, 1, 0, 2, 0, 8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2];
    let bytes = plain_builder()
        .table(TableTag::KERN, kern.clone())
        .table(TableTag::STAT, stat.clone())
        .table(TableTag::DSIG, vec![0, 0, 0, 1, 0, 1, 0, 1, 0, 0, 0, 1, 0, 0, 0, 4, 0, 0, 0, 28])
        .build();
    let file = FontFile::new(&bytes).unwrap();
    let subset = file
        .font()
        .unwrap()
        .subset(&CharSet::from_text("人"), &SubsetOptions::web_cjk())
        .unwrap();

    let output_file = FontFile::new(&subset.to_truetype()).unwrap();
    assert_eq!(output_file.table(TableTag::KERN), Some(kern.as_slice()));
    assert_eq!(output_file.table(TableTag::STAT), Some(stat.as_slice()));
    assert!(output_file.table(TableTag::DSIG).is_none());

    let options = SubsetOptions::default().with_kept_table(TableTag::DSIG);
    let subset = file
        .font()
        .unwrap()
        .subset(&CharSet::from_text("人"), &options)
        .unwrap();
    let output_file = FontFile::new(&subset.to_truetype()).unwrap();
    assert!(output_file.table(TableTag::KERN).is_none());
    assert_eq!(
        output_file.table(TableTag::DSIG),
        Some([0, 0, 0, 1, 0, 0, 0, 0].as_slice())
    );
}

#[test]
fn layout_tables_are_dropped_by_default() {
    let bytes = LAYOUT_FONT.build();
    let file = FontFile::new(&bytes).unwrap();
    let subset = file
        .font()
        .unwrap()
        .subset(&CharSet::from_text("中"), &SubsetOptions::default())
        .unwrap();

    let output_file = FontFile::new(&subset.to_truetype()).unwrap();
    assert!(output_file.table(TableTag::GSUB).is_none());
    assert_eq!(output_file.table(TableTag::GASP), file.table(TableTag::GASP));
    assert_eq!(output_file.font().unwrap().glyph_count(), 2);
}

#[test]
fn symbol_cmap_is_filtered() {
    let bytes = LAYOUT_FONT.build();
    let file = FontFile::new(&bytes).unwrap();
    let subset = file
        .font()
        .unwrap()
        .subset(&CharSet::from_text("Ab"), &SubsetOptions::web_cjk())
        .unwrap();

    let output_file = FontFile::new(&subset.to_truetype()).unwrap();
    let output = output_file.font().unwrap();
    let symbol = output.cmap.symbol.as_ref().unwrap();
    let codes: Vec<_> = symbol.entries.iter().map(|&(code, _)| code).collect();
    assert_eq!(codes, [0xf041, 0xf062]);
    for &(code, glyph_idx) in &symbol.entries {
        let ch = char::from_u32(code - 0xf000).unwrap();
        assert_eq!(output.map_char(ch).unwrap(), glyph_idx);
    }
}

#[test]
fn legacy_cmap_and_glyph_names_are_retained() {
    let bytes = VERTICAL_FONT.build();
    let file = FontFile::new(&bytes).unwrap();
    let subset = file
        .font()
        .unwrap()
        .subset(&CharSet::from_text("a人"), &SubsetOptions::web_cjk())
        .unwrap();

    let output_file = FontFile::new(&subset.to_truetype()).unwrap();
    let output = output_file.font().unwrap();
    let a_glyph = output.map_char('a').unwrap();
    let legacy = &output.cmap.legacy;
    assert_eq!(legacy.len(), 1);
    assert_eq!(legacy[0].entries, [(u32::from(b'a'), a_glyph)]);

    let post = &output.post;
    assert_eq!(
        post.glyph_name(a_glyph),
        Some(GlyphName::Standard(68))
    );
    let ren_glyph = output.map_char('人').unwrap();
    assert_eq!(
        post.glyph_name(ren_glyph),
        Some(GlyphName::Custom(b"uni4EBA"))
    );
    assert!(output.vertical.is_some());
}

#[test]
fn glyph_names_are_dropped_by_default() {
    let bytes = VERTICAL_FONT.build();
    let file = FontFile::new(&bytes).unwrap();
    let subset = file
        .font()
        .unwrap()
        .subset(&CharSet::from_text("a人"), &SubsetOptions::default())
        .unwrap();

    let output_file = FontFile::new(&subset.to_truetype()).unwrap();
    let output = output_file.font().unwrap();
    assert!(output.post.names.is_none());
    assert!(output.cmap.legacy.is_empty());
    let post = output_file.table(TableTag::POST).unwrap();
    assert_eq!(post[..4], [0, 3, 0, 0]);
}

#[test]
fn name_records_are_filtered() {
    let bytes = PLAIN_FONT.build();
    let file = FontFile::new(&bytes).unwrap();
    let options = SubsetOptions {
        name_ids: NameIds::Only([1, 2].into()),
        ..SubsetOptions::default()
    };
    let subset = file
        .font()
        .unwrap()
        .subset(&CharSet::from_text("一"), &options)
        .unwrap();

    let output_file = FontFile::new(&subset.to_truetype()).unwrap();
    let name = NameTable::parse(output_file.table(TableTag::NAME).unwrap()).unwrap();
    let ids: Vec<_> = name.records.iter().map(|record| record.name_id).collect();
    assert_eq!(ids, [1, 2]);

    let subset = file
        .font()
        .unwrap()
        .subset(&CharSet::from_text("一"), &SubsetOptions::web_cjk())
        .unwrap();
    let output_file = FontFile::new(&subset.to_truetype()).unwrap();
    assert_eq!(output_file.table(TableTag::NAME), file.table(TableTag::NAME));
}

#[test]
fn hinting_tables_are_dropped_without_hinting() {
    let bytes = plain_builder()
        .table(TableTag::FPGM, vec![0xb0, 0x00])
        .table(TableTag::PREP, vec![0xb0, 0x01])
        .table(TableTag::CVT, vec![0, 100])
        .build();
    let file = FontFile::new(&bytes).unwrap();
    let chars = CharSet::from_text("一");

    let subset = file
        .font()
        .unwrap()
        .subset(&chars, &SubsetOptions::default())
        .unwrap();
    let output_file = FontFile::new(&subset.to_truetype()).unwrap();
    for tag in [TableTag::FPGM, TableTag::PREP, TableTag::CVT] {
        assert_eq!(output_file.table(tag), file.table(tag), "{tag}");
    }

    let options = SubsetOptions {
        hinting: false,
        ..SubsetOptions::default()
    };
    let subset = file.font().unwrap().subset(&chars, &options).unwrap();
    let output_file = FontFile::new(&subset.to_truetype()).unwrap();
    for tag in [TableTag::FPGM, TableTag::PREP, TableTag::CVT] {
        assert!(output_file.table(tag).is_none(), "{tag}");
    }
}

#[test]
fn woff2_input_is_accepted() {
    let bytes = WOFF2_FONT.build();
    let file = FontFile::new(&bytes).unwrap();
    assert_eq!(file.format(), FontFormat::Woff2);

    let subset = file
        .font()
        .unwrap()
        .subset(&CharSet::from_text("一A"), &SubsetOptions::default())
        .unwrap();
    let woff2 = subset.to_woff2();
    assert_eq!(woff2[..4], *b"wOF2");
    assert_valid_font(&woff2, &['一', 'A'], &['人']);
}

#[test]
fn cff_fonts_are_rejected() {
    let bytes = plain_builder().cff_outlines().build();
    let file = FontFile::new(&bytes).unwrap();
    let err = file.font().unwrap_err();
    assert!(
        matches!(err.kind(), ParseErrorKind::UnsupportedOutlines),
        "{err:?}"
    );
}

#[test]
fn font_collections_are_rejected() {
    let mut bytes = b"ttcf".to_vec();
    bytes.extend_from_slice(&[0; 12]);
    let err = FontFile::new(&bytes).unwrap_err();
    assert!(
        matches!(err.kind(), ParseErrorKind::UnsupportedContainer),
        "{err:?}"
    );
}

#[test]
fn readme_is_in_sync_with_crate_version() {
    version_sync::assert_markdown_deps_updated!("README.md");
}
