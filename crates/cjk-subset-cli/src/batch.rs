//! Batch subsetting of fonts in a directory.

use std::{
    ffi::OsStr,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use cjk_subset::{FontFile, OutputFormat};

use crate::{
    config::SubsetPlan,
    report::{Megabytes, Reduction},
};

/// Outcome of processing a directory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Summary {
    pub(crate) processed: usize,
    pub(crate) failed: usize,
}

impl Summary {
    pub(crate) fn is_success(self) -> bool {
        self.failed == 0
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Lists regular files in `dir` with the specified extension (case-insensitive), ordered by name.
pub(crate) fn list_files(dir: &Path, extension: &str) -> anyhow::Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("failed scanning directory {}", dir.display()))?;
    let mut paths = vec![];
    for entry in entries {
        let entry = entry.with_context(|| format!("failed scanning directory {}", dir.display()))?;
        let path = entry.path();
        if path.is_file() && has_extension(&path, extension) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

impl SubsetPlan {
    /// Finds fonts to subset. Fonts that look like outputs of a previous run are skipped.
    pub(crate) fn discover(&self) -> anyhow::Result<Vec<PathBuf>> {
        let mut paths = list_files(&self.fonts_dir, &self.extension)?;
        paths.retain(|path| {
            let Some(name) = path.file_name().and_then(OsStr::to_str) else {
                return false;
            };
            if !name.contains(&self.pattern) {
                return false;
            }
            let is_output = path
                .file_stem()
                .and_then(OsStr::to_str)
                .is_some_and(|stem| stem.ends_with(&self.suffix));
            if is_output {
                tracing::debug!(?path, "skipped previously subset font");
            }
            !is_output
        });
        Ok(paths)
    }

    fn output_format(&self, input: &Path) -> OutputFormat {
        self.format.unwrap_or_else(|| {
            input
                .extension()
                .and_then(OsStr::to_str)
                .and_then(OutputFormat::from_extension)
                .unwrap_or(OutputFormat::TrueType)
        })
    }

    /// Returns `<stem><suffix>.<ext>` in the directory of the input.
    pub(crate) fn output_path(&self, input: &Path, format: OutputFormat) -> PathBuf {
        let stem = input.file_stem().unwrap_or_default().to_string_lossy();
        let file_name = format!("{stem}{}.{}", self.suffix, format.extension());
        input.with_file_name(file_name)
    }

    fn subset_file(&self, path: &Path) -> anyhow::Result<FileReport> {
        let bytes = fs::read(path).context("failed reading font")?;
        let file = FontFile::new(&bytes).context("failed decoding font")?;
        let font = file.font().context("failed parsing font")?;
        let subset = font
            .subset(&self.chars, &self.options)
            .context("failed subsetting font")?;
        if !subset.missing_chars().is_empty() {
            tracing::debug!(
                ?path,
                missing = subset.missing_chars().len(),
                "some requested chars are not mapped by the font"
            );
        }

        let format = self.output_format(path);
        let output = subset.encode(format);
        let output_path = self.output_path(path, format);
        fs::write(&output_path, &output)
            .with_context(|| format!("failed writing {}", output_path.display()))?;

        Ok(FileReport {
            output_path,
            original_size: bytes.len() as u64,
            subset_size: output.len() as u64,
            glyph_count: subset.glyph_count(),
            missing_chars: subset.missing_chars().len(),
        })
    }

    /// Subsets all discovered fonts, reporting progress to `out`. Failures of individual
    /// fonts are reported and do not stop processing.
    pub(crate) fn run(&self, out: &mut dyn Write) -> anyhow::Result<Summary> {
        writeln!(out, "Searching for fonts in {}...", self.fonts_dir.display())?;
        let paths = self.discover()?;
        if paths.is_empty() {
            writeln!(
                out,
                "No *.{} fonts containing `{}` found",
                self.extension, self.pattern
            )?;
        }

        let mut summary = Summary::default();
        for path in &paths {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            writeln!(out, "Processing font: {name}")?;
            match self.subset_file(path) {
                Ok(report) => {
                    summary.processed += 1;
                    report.write(&name, out)?;
                }
                Err(err) => {
                    summary.failed += 1;
                    tracing::warn!(?path, "failed subsetting font: {err:#}");
                    writeln!(out, "✗ Subsetting failed: {name}")?;
                    writeln!(out, "   Error: {err:#}")?;
                }
            }
        }

        writeln!(out)?;
        writeln!(
            out,
            "Done: {} font(s) subset, {} failed",
            summary.processed, summary.failed
        )?;
        if summary.processed > 0 {
            writeln!(
                out,
                "Update the font stylesheet to point to the new `{}` files, e.g. `{}`",
                self.suffix,
                self.example_rename(&paths)
            )?;
        }
        Ok(summary)
    }

    fn example_rename(&self, paths: &[PathBuf]) -> String {
        let Some(path) = paths.first() else {
            return String::new();
        };
        let output = self.output_path(path, self.output_format(path));
        format!(
            "{} -> {}",
            path.file_name().unwrap_or_default().to_string_lossy(),
            output.file_name().unwrap_or_default().to_string_lossy()
        )
    }
}

#[derive(Debug)]
struct FileReport {
    output_path: PathBuf,
    original_size: u64,
    subset_size: u64,
    glyph_count: usize,
    missing_chars: usize,
}

impl FileReport {
    fn write(&self, name: &str, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "✓ Subset created: {name}")?;
        writeln!(out, "   Output: {}", self.output_path.display())?;
        writeln!(out, "   Original size: {}", Megabytes(self.original_size))?;
        writeln!(out, "   Subset size: {}", Megabytes(self.subset_size))?;
        writeln!(
            out,
            "   Reduction: {}",
            Reduction::new(self.original_size, self.subset_size)
        )?;
        writeln!(out, "   Glyphs: {}", self.glyph_count)?;
        if self.missing_chars > 0 {
            writeln!(out, "   Chars missing from font: {}", self.missing_chars)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cjk_subset::{CharSet, SubsetOptions};

    use super::*;

    fn plan(dir: &Path) -> SubsetPlan {
        SubsetPlan {
            fonts_dir: dir.to_owned(),
            pattern: "GenYoGothicTW-".to_owned(),
            extension: "woff2".to_owned(),
            suffix: "-subset".to_owned(),
            format: None,
            chars: CharSet::from_text("一"),
            options: SubsetOptions::web_cjk(),
        }
    }

    #[test]
    fn discovering_fonts() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "GenYoGothicTW-Regular.woff2",
            "GenYoGothicTW-Bold.WOFF2",
            "GenYoGothicTW-Regular-subset.woff2",
            "GenYoGothicTW-Light.ttf",
            "Roboto-Regular.woff2",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("GenYoGothicTW-Dir.woff2")).unwrap();

        let paths = plan(dir.path()).discover().unwrap();
        let names: Vec<_> = paths
            .iter()
            .map(|path| path.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["GenYoGothicTW-Bold.WOFF2", "GenYoGothicTW-Regular.woff2"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = plan(&dir.path().join("missing")).discover().unwrap_err();
        assert!(err.to_string().contains("failed scanning"), "{err}");
    }

    #[test]
    fn output_paths() {
        let mut plan = plan(Path::new("fonts"));
        let input = Path::new("fonts/GenYoGothicTW-Regular.woff2");
        let format = plan.output_format(input);
        assert_eq!(format, OutputFormat::Woff2);
        assert_eq!(
            plan.output_path(input, format),
            Path::new("fonts/GenYoGothicTW-Regular-subset.woff2")
        );

        let input = Path::new("fonts/GenYoGothicTW-Regular.woff");
        assert_eq!(plan.output_format(input), OutputFormat::Woff2);
        let input = Path::new("fonts/GenYoGothicTW-Regular.otf");
        assert_eq!(plan.output_format(input), OutputFormat::TrueType);

        plan.format = Some(OutputFormat::TrueType);
        plan.suffix = ".min".to_owned();
        let input = Path::new("fonts/GenYoGothicTW-Regular.woff2");
        let format = plan.output_format(input);
        assert_eq!(
            plan.output_path(input, format),
            Path::new("fonts/GenYoGothicTW-Regular.min.ttf")
        );
    }
}
