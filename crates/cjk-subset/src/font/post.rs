//! `post` table and glyph names.

use super::{Cursor, TableTag};
use crate::{errors::ParseErrorKind, ParseError};

/// Name of a glyph as recorded in the `post` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GlyphName<'a> {
    /// Index into the standard Macintosh set of 258 glyph names.
    Standard(u16),
    /// Custom name (without the length prefix).
    Custom(&'a [u8]),
}

#[derive(Debug, Clone)]
pub(crate) struct PostTable<'a> {
    /// Fixed header (`version` .. `maxMemType1`).
    pub(crate) header: &'a [u8],
    pub(crate) names: Option<Vec<GlyphName<'a>>>,
}

impl<'a> PostTable<'a> {
    pub(crate) const HEADER_LEN: usize = 32;
    pub(crate) const STANDARD_NAME_COUNT: u16 = 258;

    pub(crate) fn parse(bytes: &'a [u8], glyph_count: u16) -> Result<Self, ParseError> {
        let mut cursor = Cursor::new(bytes, Some(TableTag::POST));
        let header = cursor.split_at(Self::HEADER_LEN)?.bytes;
        let version = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);

        let names = match version {
            0x_0001_0000 => {
                let standard_count = glyph_count.min(Self::STANDARD_NAME_COUNT);
                Some((0..standard_count).map(GlyphName::Standard).collect())
            }
            0x_0002_0000 => Some(Self::parse_names(cursor, glyph_count)?),
            // Version 2.5 is deprecated; 3.0 and CFF-specific 4.0 carry no names.
            0x_0002_5000 | 0x_0003_0000 | 0x_0004_0000 => None,
            _ => {
                let err = ParseErrorKind::UnexpectedTableVersion(version);
                return Err(Cursor::new(bytes, Some(TableTag::POST)).err(err));
            }
        };
        Ok(Self { header, names })
    }

    fn parse_names(
        mut cursor: Cursor<'a>,
        glyph_count: u16,
    ) -> Result<Vec<GlyphName<'a>>, ParseError> {
        let name_count = cursor.read_u16()?;
        let indices = (0..name_count)
            .map(|_| cursor.read_u16())
            .collect::<Result<Vec<_>, _>>()?;

        let mut custom_names = vec![];
        while !cursor.bytes.is_empty() {
            let len = cursor.read_byte_array::<1>()?[0];
            custom_names.push(cursor.split_at(len.into())?.bytes);
        }

        let names = indices.into_iter().take(glyph_count.into()).map(|idx| {
            if idx < Self::STANDARD_NAME_COUNT {
                Ok(GlyphName::Standard(idx))
            } else {
                let custom_idx = usize::from(idx - Self::STANDARD_NAME_COUNT);
                custom_names
                    .get(custom_idx)
                    .copied()
                    .map(GlyphName::Custom)
                    .ok_or_else(|| {
                        cursor.err(ParseErrorKind::OffsetOutOfBounds(custom_idx))
                    })
            }
        });
        names.collect()
    }

    /// Returns the name of the specified glyph, if the table records one.
    pub(crate) fn glyph_name(&self, glyph_idx: u16) -> Option<GlyphName<'a>> {
        self.names.as_ref()?.get(usize::from(glyph_idx)).copied()
    }
}
