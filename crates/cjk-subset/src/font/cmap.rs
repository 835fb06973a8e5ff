//! `cmap` table processing.

use std::borrow::Cow;

use super::Cursor;
use crate::{
    errors::{MapError, ParseErrorKind},
    ParseError,
};

#[derive(Debug, Clone, Copy)]
pub(crate) struct SegmentWithDelta {
    pub(crate) start_code: u16,
    pub(crate) end_code: u16,
    pub(crate) id_delta: u16,
    pub(crate) id_range_offset: u16,
}

/// Segment mapping to delta values (format 4) subtable of the `cmap` table.
#[derive(Debug, Clone)]
pub(crate) struct SegmentDeltas<'a> {
    pub(crate) segments: Vec<SegmentWithDelta>,
    pub(crate) glyph_id_array: Cow<'a, [u8]>,
}

impl<'a> SegmentDeltas<'a> {
    fn parse(mut cursor: Cursor<'a>) -> Result<Self, ParseError> {
        cursor.read_u16_checked(|format| {
            if format != 4 {
                return Err(ParseErrorKind::UnexpectedTableFormat(format));
            }
            Ok(())
        })?;

        let remaining_len: usize = cursor.read_u16_checked(|subtable_len| {
            Ok(subtable_len
                .checked_sub(4)
                .ok_or(ParseErrorKind::UnexpectedEof)?
                .into())
        })?;
        // Some fonts have the length of a large subtable truncated to 16 bits; be lenient here.
        cursor = cursor.range(0..remaining_len.min(cursor.bytes.len()))?;

        cursor.skip(2)?; // language
        let segment_count = cursor.read_u16()? / 2;
        cursor.skip(6)?; // searchRange, entrySelector, rangeShift

        let vec_len = 2 * usize::from(segment_count);
        let mut end_codes = cursor.split_at(vec_len)?;
        cursor.skip(2)?; // reserved padding
        let mut start_codes = cursor.split_at(vec_len)?;
        let mut id_deltas = cursor.split_at(vec_len)?;
        let mut id_range_offsets = cursor.split_at(vec_len)?;

        let segments = (0..segment_count).map(|_| {
            Ok(SegmentWithDelta {
                start_code: start_codes.read_u16()?,
                end_code: end_codes.read_u16()?,
                id_delta: id_deltas.read_u16()?,
                id_range_offset: id_range_offsets.read_u16()?,
            })
        });

        Ok(Self {
            segments: segments.collect::<Result<_, ParseError>>()?,
            glyph_id_array: Cow::Borrowed(cursor.bytes),
        })
    }

    pub(crate) fn map_code(&self, code: u16) -> Result<u16, MapError> {
        let segment_idx = self
            .segments
            .binary_search_by_key(&code, |segment| segment.end_code)
            .unwrap_or_else(|pos| pos);
        let Some(segment) = self.segments.get(segment_idx) else {
            return Ok(0); // `code` exceeds `end_code` for the last segment
        };
        if segment.start_code > code {
            return Ok(0); // missing glyph
        }
        self.map_in_segment(segment_idx, segment, code)
    }

    fn map_in_segment(
        &self,
        segment_idx: usize,
        segment: &SegmentWithDelta,
        code: u16,
    ) -> Result<u16, MapError> {
        if segment.id_range_offset == 0 {
            return Ok(segment.id_delta.wrapping_add(code));
        }

        // Offset is counted from the start of `idRangeOffsets`
        let mut byte_offset = 2 * segment_idx;
        byte_offset += usize::from(segment.id_range_offset);
        byte_offset += 2 * usize::from(code - segment.start_code);

        if byte_offset < 2 * self.segments.len() {
            return Err(MapError::InvalidOffset);
        }
        // Shift the offset to count from the start of `glyphIdArray`
        byte_offset -= 2 * self.segments.len();
        let glyph_id_bytes = self
            .glyph_id_array
            .get(byte_offset..(byte_offset + 2))
            .ok_or(MapError::InvalidOffset)?;
        let glyph_id = u16::from_be_bytes([glyph_id_bytes[0], glyph_id_bytes[1]]);
        Ok(if glyph_id == 0 {
            0
        } else {
            segment.id_delta.wrapping_add(glyph_id)
        })
    }

    /// Lists all mapped codes, skipping the final `0xffff` segment.
    fn entries(&self) -> Result<Vec<(u32, u16)>, MapError> {
        let mut entries = vec![];
        for (idx, segment) in self.segments.iter().enumerate() {
            if segment.start_code > segment.end_code {
                continue;
            }
            for code in segment.start_code..=segment.end_code {
                if code == u16::MAX {
                    break;
                }
                let glyph_id = self.map_in_segment(idx, segment, code)?;
                if glyph_id != 0 {
                    entries.push((code.into(), glyph_id));
                }
            }
        }
        Ok(entries)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SequentialMapGroup {
    pub(crate) start_char_code: u32,
    pub(crate) end_char_code: u32,
    pub(crate) start_glyph_id: u32,
}

impl SequentialMapGroup {
    pub(crate) fn map_unchecked(&self, code: u32) -> u32 {
        (code - self.start_char_code).saturating_add(self.start_glyph_id)
    }
}

/// Segmented coverage (format 12) subtable of the `cmap` table.
#[derive(Debug, Default, Clone)]
pub(crate) struct SegmentedCoverage {
    pub(crate) groups: Vec<SequentialMapGroup>,
}

impl SegmentedCoverage {
    fn parse(mut cursor: Cursor<'_>) -> Result<Self, ParseError> {
        cursor.read_u16_checked(|format| {
            if format != 12 {
                return Err(ParseErrorKind::UnexpectedTableFormat(format));
            }
            Ok(())
        })?;

        cursor.skip(2)?; // reserved

        let remaining_len = cursor.read_u32_checked(|subtable_len| {
            Ok(subtable_len
                .checked_sub(8)
                .ok_or(ParseErrorKind::UnexpectedEof)? as usize)
        })?;
        cursor = cursor.range(0..remaining_len)?;

        cursor.skip(4)?; // language
        let num_groups = cursor.read_u32()?;
        let groups = (0..num_groups).map(|_| {
            Ok(SequentialMapGroup {
                start_char_code: cursor.read_u32()?,
                end_char_code: cursor.read_u32()?,
                start_glyph_id: cursor.read_u32()?,
            })
        });

        Ok(Self {
            groups: groups.collect::<Result<_, ParseError>>()?,
        })
    }

    fn map_char(&self, ch: char) -> u16 {
        let ch = u32::from(ch);
        let group_idx = self
            .groups
            .binary_search_by_key(&ch, |group| group.end_char_code)
            .unwrap_or_else(|pos| pos);
        let Some(group) = self.groups.get(group_idx) else {
            return 0; // `ch` exceeds `end_char_code` for the last segment
        };
        if group.start_char_code > ch {
            return 0; // missing glyph
        }
        // Glyph IDs beyond `u16` cannot address a glyph; treat them as missing.
        u16::try_from(group.map_unchecked(ch)).unwrap_or(0)
    }
}

/// Non-Unicode `cmap` subtable (symbol or Macintosh legacy encoding) decoded into
/// a list of `(code, glyph ID)` pairs ordered by code.
#[derive(Debug, Clone)]
pub(crate) struct EncodedSubtable {
    pub(crate) platform_id: u16,
    pub(crate) encoding_id: u16,
    pub(crate) language: u16,
    pub(crate) entries: Vec<(u32, u16)>,
}

impl EncodedSubtable {
    fn parse(
        platform_id: u16,
        encoding_id: u16,
        subtable: Cursor<'_>,
    ) -> Result<Option<Self>, ParseError> {
        let mut cursor = subtable;
        let format = cursor.read_u16()?;
        cursor.skip(2)?; // length
        let language = cursor.read_u16()?;

        let entries = match format {
            0 => {
                let glyph_ids = cursor.read_byte_array::<256>()?;
                (0_u32..)
                    .zip(glyph_ids)
                    .filter(|&(_, glyph_id)| glyph_id != 0)
                    .map(|(code, glyph_id)| (code, u16::from(glyph_id)))
                    .collect()
            }
            4 => SegmentDeltas::parse(subtable)?.entries()?,
            6 => {
                let first_code = cursor.read_u16()?;
                let entry_count = cursor.read_u16()?;
                let mut entries = Vec::with_capacity(entry_count.into());
                for code in 0..entry_count {
                    let glyph_id = cursor.read_u16()?;
                    if glyph_id != 0 {
                        entries.push((u32::from(first_code) + u32::from(code), glyph_id));
                    }
                }
                entries
            }
            _ => {
                tracing::debug!(
                    platform_id,
                    encoding_id,
                    format,
                    "skipped unsupported legacy cmap subtable"
                );
                return Ok(None);
            }
        };
        Ok(Some(Self {
            platform_id,
            encoding_id,
            language,
            entries,
        }))
    }
}

#[derive(Debug, Clone)]
pub(crate) enum UnicodeSubtable<'a> {
    Deltas(SegmentDeltas<'a>),
    Coverage(SegmentedCoverage),
}

#[derive(Debug, Clone)]
pub(crate) struct CmapTable<'a> {
    pub(crate) unicode: UnicodeSubtable<'a>,
    pub(crate) symbol: Option<EncodedSubtable>,
    pub(crate) legacy: Vec<EncodedSubtable>,
}

impl<'a> CmapTable<'a> {
    pub(crate) const UNICODE_PLATFORM: u16 = 0;
    pub(crate) const MACINTOSH_PLATFORM: u16 = 1;
    pub(crate) const WINDOWS_PLATFORM: u16 = 3;

    pub(crate) fn parse(mut cursor: Cursor<'a>) -> Result<Self, ParseError> {
        let table_cursor = cursor;
        cursor.read_u16_checked(|version| {
            if version != 0 {
                return Err(ParseErrorKind::UnexpectedTableVersion(version.into()));
            }
            Ok(())
        })?;

        let num_tables = cursor.read_u16()?;
        let (mut deltas, mut coverage, mut symbol) = (None, None, None);
        let mut legacy = vec![];
        for _ in 0..num_tables {
            let platform_id = cursor.read_u16()?;
            let encoding_id = cursor.read_u16()?;
            let subtable = table_cursor.at(cursor.read_u32()? as usize)?;
            let format = subtable.peek_u16()?;

            match (platform_id, encoding_id, format) {
                (Self::UNICODE_PLATFORM, 0 | 1 | 3, 4) | (Self::WINDOWS_PLATFORM, 1, 4) => {
                    if deltas.is_none() {
                        deltas = Some(SegmentDeltas::parse(subtable)?);
                    }
                }
                (Self::UNICODE_PLATFORM, 4, 12) | (Self::WINDOWS_PLATFORM, 10, 12) => {
                    if coverage.is_none() {
                        coverage = Some(SegmentedCoverage::parse(subtable)?);
                    }
                }
                (Self::WINDOWS_PLATFORM, 0, _) => {
                    if symbol.is_none() {
                        symbol = EncodedSubtable::parse(platform_id, encoding_id, subtable)?;
                    }
                }
                (Self::MACINTOSH_PLATFORM, ..) => {
                    legacy.extend(EncodedSubtable::parse(platform_id, encoding_id, subtable)?);
                }
                _ => { /* unsupported encoding; do nothing */ }
            }
        }

        // The full-repertoire subtable is a superset of the BMP one, so it takes precedence.
        let unicode = match (coverage, deltas) {
            (Some(coverage), _) => UnicodeSubtable::Coverage(coverage),
            (None, Some(deltas)) => UnicodeSubtable::Deltas(deltas),
            (None, None) => return Err(table_cursor.err(ParseErrorKind::NoSupportedCmap)),
        };
        Ok(Self {
            unicode,
            symbol,
            legacy,
        })
    }

    pub(crate) fn map_char(&self, ch: char) -> Result<u16, MapError> {
        match &self.unicode {
            UnicodeSubtable::Deltas(deltas) => match u16::try_from(u32::from(ch)) {
                Ok(code) => deltas.map_code(code),
                Err(_) => Ok(0), // the subtable only covers the BMP
            },
            UnicodeSubtable::Coverage(coverage) => Ok(coverage.map_char(ch)),
        }
    }
}
