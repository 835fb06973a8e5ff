//! Conversion of TrueType fonts to WOFF2.

use std::{fs, io::Write, path::Path};

use anyhow::Context as _;
use cjk_subset::{FontFile, OutputFormat};

use crate::{
    batch::{list_files, Summary},
    report::{HumanSize, Reduction},
};

fn convert_file(path: &Path) -> anyhow::Result<(u64, u64)> {
    let bytes = fs::read(path).context("failed reading font")?;
    let file = FontFile::new(&bytes).context("failed decoding font")?;
    let woff2 = file.encode(OutputFormat::Woff2);
    let output_path = path.with_extension(OutputFormat::Woff2.extension());
    fs::write(&output_path, &woff2)
        .with_context(|| format!("failed writing {}", output_path.display()))?;
    Ok((bytes.len() as u64, woff2.len() as u64))
}

/// Re-encodes every `.ttf` file in `dir` as `.woff2` next to the original.
pub(crate) fn convert_dir(dir: &Path, out: &mut dyn Write) -> anyhow::Result<Summary> {
    let paths = list_files(dir, "ttf")?;
    writeln!(out, "Found {} TrueType font(s), converting...", paths.len())?;

    let mut summary = Summary::default();
    for path in &paths {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        match convert_file(path) {
            Ok((original_size, woff2_size)) => {
                summary.processed += 1;
                writeln!(
                    out,
                    "✓ {name} converted: {} -> {} (reduced by {})",
                    HumanSize(original_size),
                    HumanSize(woff2_size),
                    Reduction::new(original_size, woff2_size)
                )?;
            }
            Err(err) => {
                summary.failed += 1;
                tracing::warn!(?path, "failed converting font: {err:#}");
                writeln!(out, "✗ Converting {name} failed: {err:#}")?;
            }
        }
    }

    writeln!(out)?;
    writeln!(out, "Conversion finished. Update the font stylesheet to use the WOFF2 files:")?;
    writeln!(
        out,
        "replace format('truetype') with format('woff2') and the .ttf extension with .woff2"
    )?;
    Ok(summary)
}
