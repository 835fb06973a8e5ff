//! TOML configuration and its merging with command-line args.

use std::{fs, path::{Path, PathBuf}};

use anyhow::Context as _;
use cjk_subset::{
    CharSet, LayoutFeatures, NameIds, OutputFormat, SubsetOptions, TableTag, UnicodeRange,
    COMMON_CJK_RANGES,
};
use serde::Deserialize;

use crate::cli::SubsetArgs;

/// Batch settings loaded from a config file. All fields are optional; unset ones fall back
/// to the built-in defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub(crate) struct Config {
    pub(crate) fonts_dir: Option<PathBuf>,
    pub(crate) pattern: Option<String>,
    pub(crate) extension: Option<String>,
    pub(crate) suffix: Option<String>,
    pub(crate) format: Option<String>,
    pub(crate) text: Option<String>,
    pub(crate) text_files: Vec<PathBuf>,
    pub(crate) unicodes: Vec<String>,
    pub(crate) common_ranges: bool,
    pub(crate) options: OptionsConfig,
}

/// Overrides for [`SubsetOptions::web_cjk()`].
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub(crate) struct OptionsConfig {
    pub(crate) layout_features: Option<bool>,
    pub(crate) name_ids: Option<Vec<u16>>,
    pub(crate) glyph_names: Option<bool>,
    pub(crate) legacy_cmap: Option<bool>,
    pub(crate) symbol_cmap: Option<bool>,
    pub(crate) notdef_outline: Option<bool>,
    pub(crate) hinting: Option<bool>,
    pub(crate) keep_tables: Vec<String>,
}

impl Config {
    pub(crate) fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading config at {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid config at {}", path.display()))
    }

    fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Paths in the config are resolved relative to the config file.
    pub(crate) fn resolve_paths(mut self, base_dir: &Path) -> Self {
        if let Some(dir) = &mut self.fonts_dir {
            *dir = base_dir.join(&*dir);
        }
        for path in &mut self.text_files {
            *path = base_dir.join(&*path);
        }
        self
    }
}

/// Fully resolved settings of a `subset` run.
#[derive(Debug)]
pub(crate) struct SubsetPlan {
    pub(crate) fonts_dir: PathBuf,
    pub(crate) pattern: String,
    pub(crate) extension: String,
    pub(crate) suffix: String,
    /// If not set, the format is inferred from the input extension.
    pub(crate) format: Option<OutputFormat>,
    pub(crate) chars: CharSet,
    pub(crate) options: SubsetOptions,
}

impl SubsetPlan {
    pub(crate) const DEFAULT_FONTS_DIR: &'static str = "public/fonts";
    pub(crate) const DEFAULT_PATTERN: &'static str = "GenYoGothicTW-";
    pub(crate) const DEFAULT_EXTENSION: &'static str = "woff2";
    pub(crate) const DEFAULT_SUFFIX: &'static str = "-subset";

    /// Merges args with the config; explicitly specified args take precedence.
    pub(crate) fn new(args: SubsetArgs, config: Config) -> anyhow::Result<Self> {
        let format = match (args.format, &config.format) {
            (Some(format), _) => Some(format),
            (None, Some(format)) => Some(format.parse().context("invalid `format` in config")?),
            (None, None) => None,
        };
        let suffix = args
            .suffix
            .or(config.suffix)
            .unwrap_or_else(|| Self::DEFAULT_SUFFIX.to_owned());
        anyhow::ensure!(!suffix.is_empty(), "output suffix must not be empty");

        let chars = Self::collect_chars(&args, &config)?;
        let options = Self::options(&args, &config.options)?;
        Ok(Self {
            fonts_dir: args
                .fonts_dir
                .or(config.fonts_dir)
                .unwrap_or_else(|| Self::DEFAULT_FONTS_DIR.into()),
            pattern: args
                .pattern
                .or(config.pattern)
                .unwrap_or_else(|| Self::DEFAULT_PATTERN.to_owned()),
            extension: args
                .extension
                .or(config.extension)
                .unwrap_or_else(|| Self::DEFAULT_EXTENSION.to_owned()),
            suffix,
            format,
            chars,
            options,
        })
    }

    fn collect_chars(args: &SubsetArgs, config: &Config) -> anyhow::Result<CharSet> {
        let mut chars = CharSet::common_hanzi();
        let texts = config.text.iter().chain(&args.text);
        for text in texts {
            chars.push_text(text);
        }
        for path in config.text_files.iter().chain(&args.text_files) {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed reading text file {}", path.display()))?;
            chars.push_text(&text);
        }

        for raw in &config.unicodes {
            let ranges = UnicodeRange::parse_list(raw)
                .with_context(|| format!("invalid `unicodes` entry in config: {raw:?}"))?;
            for range in ranges {
                chars.push_range(range);
            }
        }
        for &range in &args.unicodes {
            chars.push_range(range);
        }
        if args.common_ranges || config.common_ranges {
            for range in COMMON_CJK_RANGES {
                chars.push_range(range);
            }
        }
        Ok(chars)
    }

    fn options(args: &SubsetArgs, config: &OptionsConfig) -> anyhow::Result<SubsetOptions> {
        let mut options = SubsetOptions::web_cjk();
        if let Some(layout) = config.layout_features {
            options.layout_features = if layout {
                LayoutFeatures::All
            } else {
                LayoutFeatures::Drop
            };
        }
        if let Some(ids) = &config.name_ids {
            options.name_ids = NameIds::Only(ids.iter().copied().collect());
        }
        if let Some(glyph_names) = config.glyph_names {
            options.glyph_names = glyph_names;
        }
        if let Some(legacy_cmap) = config.legacy_cmap {
            options.legacy_cmap = legacy_cmap;
        }
        if let Some(symbol_cmap) = config.symbol_cmap {
            options.symbol_cmap = symbol_cmap;
        }
        if let Some(notdef_outline) = config.notdef_outline {
            options.notdef_outline = notdef_outline;
        }
        if let Some(hinting) = config.hinting {
            options.hinting = hinting;
        }
        for raw in &config.keep_tables {
            let tag: TableTag = raw
                .parse()
                .with_context(|| format!("invalid table tag in config: {raw:?}"))?;
            options.keep_tables.insert(tag);
        }

        if args.no_layout_features {
            options.layout_features = LayoutFeatures::Drop;
        }
        if args.no_hinting {
            options.hinting = false;
        }
        if args.no_glyph_names {
            options.glyph_names = false;
        }
        options.keep_tables.extend(args.keep_tables.iter().copied());
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser as _;

    use super::*;
    use crate::cli::{Cli, Command};

    fn subset_args(args: &[&str]) -> SubsetArgs {
        let cli = Cli::try_parse_from(["cjk-subset", "subset"].iter().chain(args)).unwrap();
        match cli.command {
            Command::Subset(args) => args,
            Command::Convert(_) => unreachable!(),
        }
    }

    #[test]
    fn default_plan() {
        let plan = SubsetPlan::new(subset_args(&[]), Config::default()).unwrap();
        assert_eq!(plan.fonts_dir, Path::new("public/fonts"));
        assert_eq!(plan.pattern, "GenYoGothicTW-");
        assert_eq!(plan.extension, "woff2");
        assert_eq!(plan.suffix, "-subset");
        assert_eq!(plan.format, None);
        assert_eq!(plan.chars, CharSet::common_hanzi());
        assert_eq!(plan.options, SubsetOptions::web_cjk());
    }

    #[test]
    fn parsing_config() {
        let raw = r#"
            fonts-dir = "assets/fonts"
            pattern = "NotoSans"
            format = "ttf"
            text = "龘"
            unicodes = ["U+1F600-1F60F"]

            [options]
            layout-features = false
            name-ids = [1, 2]
            keep-tables = ["kern"]
        "#;
        let config = Config::parse(raw).unwrap();
        assert_eq!(config.fonts_dir.as_deref(), Some(Path::new("assets/fonts")));

        let plan = SubsetPlan::new(subset_args(&["--pattern", "Gen"]), config).unwrap();
        assert_eq!(plan.pattern, "Gen");
        assert_eq!(plan.fonts_dir, Path::new("assets/fonts"));
        assert_eq!(plan.format, Some(OutputFormat::TrueType));
        assert!(plan.chars.contains('龘'));
        assert!(plan.chars.contains('\u{1f605}'));
        assert_eq!(plan.options.layout_features, LayoutFeatures::Drop);
        assert_eq!(plan.options.name_ids, NameIds::Only([1, 2].into()));
        assert!(plan.options.keep_tables.contains(&"kern".parse().unwrap()));
    }

    #[test]
    fn unknown_config_fields_are_rejected() {
        let err = Config::parse("font-dir = \"fonts\"").unwrap_err();
        assert!(err.to_string().contains("unknown field"), "{err}");
    }

    #[test]
    fn args_override_config() {
        let config = Config {
            common_ranges: false,
            options: OptionsConfig {
                hinting: Some(true),
                ..OptionsConfig::default()
            },
            ..Config::default()
        };
        let args = subset_args(&[
            "--no-hinting",
            "--common-ranges",
            "--unicodes",
            "U+41-43,U+61",
            "--text",
            "好",
            "--keep-table",
            "VDMX",
        ]);
        let plan = SubsetPlan::new(args, config).unwrap();

        assert!(!plan.options.hinting);
        assert!(plan.options.keep_tables.contains(&"VDMX".parse().unwrap()));
        for ch in ['A', 'B', 'C', 'a', '好', '\u{3001}', '\u{ff01}'] {
            assert!(plan.chars.contains(ch), "{ch:?}");
        }
        assert!(!plan.chars.contains('D'));
    }

    #[test]
    fn text_files_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chars.txt");
        fs::write(&path, "鬱\n齉").unwrap();

        let args = subset_args(&["--text-file", path.to_str().unwrap()]);
        let plan = SubsetPlan::new(args, Config::default()).unwrap();
        assert!(plan.chars.contains('鬱'));
        assert!(plan.chars.contains('齉'));
        assert!(!plan.chars.contains('\n'));

        let args = subset_args(&["--text-file", "missing.txt"]);
        let err = SubsetPlan::new(args, Config::default()).unwrap_err();
        assert!(err.to_string().contains("missing.txt"), "{err}");
    }
}
