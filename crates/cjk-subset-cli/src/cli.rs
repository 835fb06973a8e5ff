//! Command-line args.

use std::path::PathBuf;

use cjk_subset::{OutputFormat, TableTag, UnicodeRange};

/// Shrinks bundled CJK web fonts to a curated list of frequently used chars.
#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub(crate) struct Cli {
    /// Increases logging verbosity (`-v` for debug, `-vv` for trace). Ignored if `RUST_LOG`
    /// is set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub(crate) verbose: u8,
    /// Path to a TOML config supplying defaults for `subset`.
    #[arg(long, global = true, env = "CJK_SUBSET_CONFIG")]
    pub(crate) config: Option<PathBuf>,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, clap::Subcommand)]
pub(crate) enum Command {
    /// Subsets matching fonts in a directory, writing results next to the originals.
    Subset(SubsetArgs),
    /// Converts all TrueType fonts in a directory to WOFF2.
    Convert(ConvertArgs),
}

#[derive(Debug, clap::Args)]
pub(crate) struct SubsetArgs {
    /// Directory with fonts [default: public/fonts]
    #[arg(long, env = "CJK_SUBSET_FONTS_DIR")]
    pub(crate) fonts_dir: Option<PathBuf>,
    /// Substring that font file names must contain [default: GenYoGothicTW-]
    #[arg(long)]
    pub(crate) pattern: Option<String>,
    /// Extension of processed font files [default: woff2]
    #[arg(long)]
    pub(crate) extension: Option<String>,
    /// Suffix appended to the file stem of subset fonts [default: -subset]
    #[arg(long)]
    pub(crate) suffix: Option<String>,
    /// Output format. By default, WOFF2 and WOFF inputs produce WOFF2, and other inputs
    /// produce TrueType.
    #[arg(long)]
    pub(crate) format: Option<OutputFormat>,
    /// Additional chars to retain.
    #[arg(long)]
    pub(crate) text: Vec<String>,
    /// Files with additional chars to retain.
    #[arg(long = "text-file")]
    pub(crate) text_files: Vec<PathBuf>,
    /// Additional Unicode ranges to retain, e.g. `U+4E00-9FFF,U+3000-303F`.
    #[arg(long, value_delimiter = ',')]
    pub(crate) unicodes: Vec<UnicodeRange>,
    /// Retains entire CJK ideograph, punctuation, fullwidth and box drawing blocks.
    #[arg(long)]
    pub(crate) common_ranges: bool,
    /// Drops layout tables (`GDEF`, `GSUB`, `GPOS`) and renumbers glyphs.
    #[arg(long)]
    pub(crate) no_layout_features: bool,
    /// Drops TrueType hinting.
    #[arg(long)]
    pub(crate) no_hinting: bool,
    /// Drops glyph names from the `post` table.
    #[arg(long)]
    pub(crate) no_glyph_names: bool,
    /// Additional tables to copy as-is.
    #[arg(long = "keep-table")]
    pub(crate) keep_tables: Vec<TableTag>,
}

#[derive(Debug, clap::Args)]
pub(crate) struct ConvertArgs {
    /// Directory with TrueType fonts.
    #[arg(long, env = "CJK_SUBSET_FONTS_DIR", default_value = "public/fonts")]
    pub(crate) fonts_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parsing_subset_args() {
        let cli = Cli::try_parse_from([
            "cjk-subset",
            "-vv",
            "subset",
            "--format",
            "ttf",
            "--unicodes",
            "U+4E00-4E0F,U+3000",
            "--keep-table",
            "cvt",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Subset(args) = cli.command else {
            panic!("unexpected command: {:?}", cli.command);
        };
        assert_eq!(args.format, Some(OutputFormat::TrueType));
        assert_eq!(args.unicodes.len(), 2);
        assert_eq!(args.unicodes[0], UnicodeRange::new(0x4e00, 0x4e0f));
        assert_eq!(args.keep_tables, [TableTag::CVT]);
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        let err = Cli::try_parse_from(["cjk-subset", "subset", "--unicodes", "U+XYZ"]).unwrap_err();
        assert!(err.to_string().contains("hexadecimal"), "{err}");
    }
}
