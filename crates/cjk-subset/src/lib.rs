//! Subsetting of CJK web fonts to a curated character list.
//!
//! The crate reads TrueType-flavored OpenType fonts (optionally packed into WOFF or WOFF2),
//! drops all glyphs not needed to render a [`CharSet`], and writes the result
//! as OpenType or WOFF2.
//!
//! # Examples
//!
//! ```no_run
//! use cjk_subset::{CharSet, FontFile, SubsetOptions};
//!
//! let bytes = std::fs::read("NotoSansSC-Regular.ttf")?;
//! let file = FontFile::new(&bytes)?;
//! let mut chars = CharSet::common_hanzi();
//! chars.push_text("，。！？");
//! let subset = file.font()?.subset(&chars, &SubsetOptions::web_cjk())?;
//! println!("missing chars: {:?}", subset.missing_chars());
//! std::fs::write("NotoSansSC-Regular.subset.woff2", subset.to_woff2())?;
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```

#[cfg(doctest)]
doc_comment::doctest!("../README.md");

mod charset;
mod errors;
mod font;
mod layout;
mod options;
mod subset;
#[cfg(any(test, feature = "testing"))]
#[allow(clippy::missing_panics_doc)]
pub mod testing;
#[cfg(test)]
pub(crate) mod tests;
mod write;

pub use crate::{
    charset::{
        CharSet, RangeParseError, UnicodeRange, BOX_DRAWING, CJK_SYMBOLS_AND_PUNCTUATION,
        CJK_UNIFIED_IDEOGRAPHS, COMMON_CJK_RANGES, COMMON_HANZI, GENERAL_PUNCTUATION,
        HALFWIDTH_AND_FULLWIDTH_FORMS,
    },
    errors::{MapError, ParseError, ParseErrorKind},
    font::{Font, FontFile, FontFormat, TableTag, TagParseError},
    options::{LayoutFeatures, NameIds, SubsetOptions},
    subset::FontSubset,
    write::{OutputFormat, OutputFormatParseError, DEFAULT_WOFF2_QUALITY},
};
