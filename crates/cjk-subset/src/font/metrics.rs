//! Horizontal and vertical metrics (`hhea` / `hmtx` and `vhea` / `vmtx`).

use super::{Cursor, TableTag};
use crate::{errors::ParseErrorKind, ParseError};

/// Advance and side bearing of a single glyph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Metric {
    pub(crate) advance: u16,
    pub(crate) side_bearing: u16,
}

/// `hhea` or `vhea` table. Both have the same layout as far as subsetting is concerned:
/// 18 words with the number of long metrics in the last one.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MetricsHeader<'a> {
    pub(crate) raw: &'a [u8],
    pub(crate) number_of_long_metrics: u16,
}

impl<'a> MetricsHeader<'a> {
    pub(crate) const EXPECTED_LEN: usize = 36;

    pub(super) fn parse(tag: TableTag, bytes: &'a [u8]) -> Result<Self, ParseError> {
        let cursor = Cursor::new(bytes, Some(tag));
        if bytes.len() != Self::EXPECTED_LEN {
            return Err(cursor.err(ParseErrorKind::UnexpectedTableLen {
                expected: Self::EXPECTED_LEN,
                actual: bytes.len(),
            }));
        }
        let number_of_long_metrics = cursor.at(Self::EXPECTED_LEN - 2)?.read_u16()?;
        Ok(Self {
            raw: bytes,
            number_of_long_metrics,
        })
    }
}

/// `hmtx` or `vmtx` table: long metrics followed by side bearings of the remaining glyphs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MetricsTable<'a> {
    cursor: Cursor<'a>,
    number_of_long_metrics: u16,
}

impl<'a> MetricsTable<'a> {
    pub(super) fn new(
        tag: TableTag,
        bytes: &'a [u8],
        number_of_long_metrics: u16,
        glyph_count: u16,
    ) -> Result<Self, ParseError> {
        let cursor = Cursor::new(bytes, Some(tag));
        if number_of_long_metrics == 0 && glyph_count > 0 {
            return Err(cursor.err(ParseErrorKind::UnexpectedTableLen {
                expected: 4,
                actual: 0,
            }));
        }
        let long_count = number_of_long_metrics.min(glyph_count);
        let expected_len =
            4 * usize::from(long_count) + 2 * usize::from(glyph_count - long_count);
        if bytes.len() < expected_len {
            return Err(cursor.err(ParseErrorKind::UnexpectedTableLen {
                expected: expected_len,
                actual: bytes.len(),
            }));
        }
        Ok(Self {
            cursor,
            number_of_long_metrics: long_count,
        })
    }

    pub(crate) fn metric(&self, glyph_idx: u16) -> Result<Metric, ParseError> {
        let long_count = self.number_of_long_metrics;
        if glyph_idx < long_count {
            let mut cursor = self.cursor.at(usize::from(glyph_idx) * 4)?;
            Ok(Metric {
                advance: cursor.read_u16()?,
                side_bearing: cursor.read_u16()?,
            })
        } else {
            // The last long metric supplies the advance for all trailing glyphs.
            let advance = self
                .cursor
                .at(usize::from(long_count - 1) * 4)?
                .read_u16()?;
            let bearing_offset =
                usize::from(long_count) * 4 + usize::from(glyph_idx - long_count) * 2;
            let side_bearing = self.cursor.at(bearing_offset)?.read_u16()?;
            Ok(Metric {
                advance,
                side_bearing,
            })
        }
    }
}
