//! OpenType parsing logic.

use core::{fmt, ops, str::FromStr};
use std::{borrow::Cow, collections::BTreeMap};

use allsorts::{binary::read::ReadScope, font_data::FontData, tables::FontTableProvider};

pub(crate) use self::{
    cmap::{
        CmapTable, EncodedSubtable, SegmentDeltas, SegmentWithDelta, SegmentedCoverage,
        SequentialMapGroup,
    },
    glyph::{Glyph, GlyphComponent, GlyphComponentArgs, GlyphRecord, TransformData},
    metrics::{Metric, MetricsHeader, MetricsTable},
    name::NameTable,
    post::{GlyphName, PostTable},
};
use crate::errors::{ParseError, ParseErrorKind};

mod cmap;
mod glyph;
mod metrics;
mod name;
mod post;

/// Read-only view of table data with offset tracking for error reporting.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor<'a> {
    pub(crate) bytes: &'a [u8],
    offset: usize,
    table: Option<TableTag>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(bytes: &'a [u8], table: Option<TableTag>) -> Self {
        Self {
            bytes,
            offset: 0,
            table,
        }
    }

    pub(crate) fn err(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            kind,
            offset: self.offset,
            table: self.table,
        }
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), ParseError> {
        if self.bytes.len() < len {
            return Err(self.err(ParseErrorKind::UnexpectedEof));
        }
        self.bytes = &self.bytes[len..];
        self.offset += len;
        Ok(())
    }

    pub(crate) fn read_byte_array<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
        let Some((head, tail)) = self.bytes.split_first_chunk::<N>() else {
            return Err(self.err(ParseErrorKind::UnexpectedEof));
        };
        self.bytes = tail;
        self.offset += N;
        Ok(*head)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, ParseError> {
        self.read_byte_array().map(u16::from_be_bytes)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, ParseError> {
        self.read_byte_array().map(u32::from_be_bytes)
    }

    pub(crate) fn peek_u16(self) -> Result<u16, ParseError> {
        let mut this = self;
        this.read_u16()
    }

    /// Reads a `u16` and validates it; errors point at the start of the value.
    pub(crate) fn read_u16_checked<T>(
        &mut self,
        check: impl FnOnce(u16) -> Result<T, ParseErrorKind>,
    ) -> Result<T, ParseError> {
        let start = *self;
        let value = self.read_u16()?;
        check(value).map_err(|kind| start.err(kind))
    }

    pub(crate) fn read_u32_checked<T>(
        &mut self,
        check: impl FnOnce(u32) -> Result<T, ParseErrorKind>,
    ) -> Result<T, ParseError> {
        let start = *self;
        let value = self.read_u32()?;
        check(value).map_err(|kind| start.err(kind))
    }

    /// Splits off the first `len` bytes into a separate cursor and advances this one past them.
    pub(crate) fn split_at(&mut self, len: usize) -> Result<Self, ParseError> {
        let head = self.range(0..len)?;
        self.skip(len)?;
        Ok(head)
    }

    /// Narrows this cursor to the specified range.
    pub(crate) fn range(self, range: ops::Range<usize>) -> Result<Self, ParseError> {
        let Some(bytes) = self.bytes.get(range.clone()) else {
            return Err(self.err(ParseErrorKind::RangeOutOfBounds {
                range,
                len: self.bytes.len(),
            }));
        };
        Ok(Self {
            bytes,
            offset: self.offset + range.start,
            table: self.table,
        })
    }

    /// Returns a cursor starting at `offset` relative to this cursor.
    pub(crate) fn at(self, offset: usize) -> Result<Self, ParseError> {
        if offset > self.bytes.len() {
            return Err(self.err(ParseErrorKind::OffsetOutOfBounds(offset)));
        }
        let mut this = self;
        this.skip(offset)?;
        Ok(this)
    }
}

/// OpenType table tag, such as `glyf` or `OS/2`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableTag(pub(crate) [u8; 4]);

impl fmt::Debug for TableTag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "TableTag({self})")
    }
}

impl fmt::Display for TableTag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            if byte.is_ascii_graphic() || byte == b' ' {
                write!(formatter, "{}", char::from(byte))?;
            } else {
                write!(formatter, "\\x{byte:02x}")?;
            }
        }
        Ok(())
    }
}

/// Error parsing a [`TableTag`] from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TagParseError {
    /// Tag is empty or longer than 4 chars.
    InvalidLength,
    /// Tag contains non-printable or non-ASCII chars.
    NonAscii,
}

impl fmt::Display for TagParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::InvalidLength => "table tag must contain 1 to 4 chars",
            Self::NonAscii => "table tag must consist of printable ASCII chars",
        })
    }
}

impl std::error::Error for TagParseError {}

impl FromStr for TableTag {
    type Err = TagParseError;

    /// Parses a tag; tags shorter than 4 chars are padded with spaces (`cvt` -> `cvt `).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 4 {
            return Err(TagParseError::InvalidLength);
        }
        if !s.bytes().all(|byte| byte.is_ascii_graphic() || byte == b' ') {
            return Err(TagParseError::NonAscii);
        }
        let mut tag = [b' '; 4];
        tag[..s.len()].copy_from_slice(s.as_bytes());
        Ok(Self(tag))
    }
}

impl TableTag {
    /// Character to glyph mapping.
    pub const CMAP: Self = Self(*b"cmap");
    /// Font header.
    pub const HEAD: Self = Self(*b"head");
    /// Horizontal header.
    pub const HHEA: Self = Self(*b"hhea");
    /// Horizontal metrics.
    pub const HMTX: Self = Self(*b"hmtx");
    /// Maximum profile.
    pub const MAXP: Self = Self(*b"maxp");
    /// Naming table.
    pub const NAME: Self = Self(*b"name");
    /// OS/2 and Windows-specific metrics.
    pub const OS2: Self = Self(*b"OS/2");
    /// PostScript information, including glyph names.
    pub const POST: Self = Self(*b"post");
    /// Index to location.
    pub const LOCA: Self = Self(*b"loca");
    /// Glyph data.
    pub const GLYF: Self = Self(*b"glyf");
    /// Control value table.
    pub const CVT: Self = Self(*b"cvt ");
    /// Font program.
    pub const FPGM: Self = Self(*b"fpgm");
    /// Control value program.
    pub const PREP: Self = Self(*b"prep");
    /// Grid-fitting / scan-conversion procedure.
    pub const GASP: Self = Self(*b"gasp");
    /// Vertical header.
    pub const VHEA: Self = Self(*b"vhea");
    /// Vertical metrics.
    pub const VMTX: Self = Self(*b"vmtx");
    /// Glyph definition data.
    pub const GDEF: Self = Self(*b"GDEF");
    /// Glyph substitution data.
    pub const GSUB: Self = Self(*b"GSUB");
    /// Glyph positioning data.
    pub const GPOS: Self = Self(*b"GPOS");
    /// Kerning (legacy).
    pub const KERN: Self = Self(*b"kern");
    /// Style attributes.
    pub const STAT: Self = Self(*b"STAT");
    /// Metadata.
    pub const META: Self = Self(*b"meta");
    /// Digital signature.
    pub const DSIG: Self = Self(*b"DSIG");
    /// Compact font format outlines.
    pub const CFF: Self = Self(*b"CFF ");
    /// Compact font format 2 outlines.
    pub const CFF2: Self = Self(*b"CFF2");

    /// Creates a tag from raw bytes.
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Returns raw bytes of this tag.
    pub const fn to_bytes(self) -> [u8; 4] {
        self.0
    }

    pub(crate) const fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

/// Container format of a [`FontFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FontFormat {
    /// Plain sfnt (TrueType or OpenType).
    OpenType,
    /// WOFF 1.0.
    Woff,
    /// WOFF 2.0.
    Woff2,
}

/// Font file decoded into a set of raw OpenType tables.
#[derive(Debug, Clone)]
pub struct FontFile {
    format: FontFormat,
    sfnt_version: u32,
    tables: BTreeMap<TableTag, Vec<u8>>,
}

impl FontFile {
    pub(crate) const TRUETYPE_VERSION: u32 = 0x_0001_0000;
    const APPLE_TRUETYPE_VERSION: u32 = u32::from_be_bytes(*b"true");
    const CFF_VERSION: u32 = u32::from_be_bytes(*b"OTTO");
    const COLLECTION_SIGNATURE: u32 = u32::from_be_bytes(*b"ttcf");
    const WOFF_SIGNATURE: u32 = u32::from_be_bytes(*b"wOFF");
    const WOFF2_SIGNATURE: u32 = u32::from_be_bytes(*b"wOF2");

    /// Tables collected from web font containers. The container table directories are not
    /// exposed by the decoder, so only tables from this list survive decoding.
    const KNOWN_TABLES: [TableTag; 30] = [
        TableTag::CMAP,
        TableTag::HEAD,
        TableTag::HHEA,
        TableTag::HMTX,
        TableTag::MAXP,
        TableTag::NAME,
        TableTag::OS2,
        TableTag::POST,
        TableTag::CVT,
        TableTag::FPGM,
        TableTag::GLYF,
        TableTag::LOCA,
        TableTag::PREP,
        TableTag::CFF,
        TableTag::CFF2,
        TableTag(*b"VORG"),
        TableTag::GASP,
        TableTag(*b"hdmx"),
        TableTag::KERN,
        TableTag(*b"LTSH"),
        TableTag(*b"VDMX"),
        TableTag::VHEA,
        TableTag::VMTX,
        TableTag(*b"BASE"),
        TableTag::GDEF,
        TableTag::GPOS,
        TableTag::GSUB,
        TableTag::STAT,
        TableTag::META,
        TableTag::DSIG,
    ];

    /// Decodes a font file in any supported container format (TrueType / OpenType, WOFF, WOFF2).
    ///
    /// # Errors
    ///
    /// Returns an error if the container is malformed or is a font collection.
    pub fn new(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut cursor = Cursor::new(bytes, None);
        let signature = cursor.read_u32()?;
        match signature {
            Self::TRUETYPE_VERSION | Self::APPLE_TRUETYPE_VERSION | Self::CFF_VERSION => {
                Self::from_sfnt(bytes)
            }
            Self::WOFF_SIGNATURE => Self::from_web_font(bytes, FontFormat::Woff),
            Self::WOFF2_SIGNATURE => Self::from_web_font(bytes, FontFormat::Woff2),
            Self::COLLECTION_SIGNATURE => Err(ParseErrorKind::UnsupportedContainer.into()),
            _ => Err(ParseErrorKind::UnexpectedFontVersion(signature).into()),
        }
    }

    /// Assembles a font file from raw tables.
    pub fn from_tables(sfnt_version: u32, tables: BTreeMap<TableTag, Vec<u8>>) -> Self {
        Self {
            format: FontFormat::OpenType,
            sfnt_version,
            tables,
        }
    }

    fn from_sfnt(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut cursor = Cursor::new(bytes, None);
        let sfnt_version = cursor.read_u32()?;
        let table_count = cursor.read_u16()?;
        cursor.skip(6)?; // searchRange, entrySelector, rangeShift

        let mut tables = BTreeMap::new();
        for _ in 0..table_count {
            let tag = TableTag(cursor.read_byte_array()?);
            let expected_checksum = cursor.read_u32()?;
            let offset = cursor.read_u32()? as usize;
            let len = cursor.read_u32()? as usize;

            let file = Cursor::new(bytes, Some(tag));
            let table_bytes = file.range(offset..offset.saturating_add(len))?.bytes;
            let actual_checksum = if tag == TableTag::HEAD {
                head_checksum(table_bytes)
            } else {
                checksum(table_bytes)
            };
            if actual_checksum != expected_checksum {
                tracing::warn!(
                    %tag,
                    expected = expected_checksum,
                    actual = actual_checksum,
                    "table checksum mismatch"
                );
            }
            tables.insert(tag, table_bytes.to_vec());
        }
        Ok(Self {
            format: FontFormat::OpenType,
            sfnt_version,
            tables,
        })
    }

    fn from_web_font(bytes: &[u8], format: FontFormat) -> Result<Self, ParseError> {
        let container_err = |err| ParseError::from(ParseErrorKind::Container(err));
        let font_data = ReadScope::new(bytes)
            .read::<FontData<'_>>()
            .map_err(container_err)?;
        let provider = font_data.table_provider(0).map_err(container_err)?;

        let mut tables = BTreeMap::new();
        for tag in Self::KNOWN_TABLES {
            let data = provider.table_data(tag.to_u32()).map_err(|err| ParseError {
                kind: ParseErrorKind::Container(err),
                offset: 0,
                table: Some(tag),
            })?;
            if let Some(data) = data {
                tables.insert(tag, Cow::into_owned(data));
            }
        }

        let sfnt_version = if tables.contains_key(&TableTag::GLYF) {
            Self::TRUETYPE_VERSION
        } else {
            Self::CFF_VERSION
        };
        tracing::debug!(?format, tables = tables.len(), "decoded web font container");
        Ok(Self {
            format,
            sfnt_version,
            tables,
        })
    }

    /// Returns the container format this file was decoded from.
    pub fn format(&self) -> FontFormat {
        self.format
    }

    /// Returns the sfnt version (`0x00010000` for TrueType outlines, `OTTO` for CFF).
    pub fn sfnt_version(&self) -> u32 {
        self.sfnt_version
    }

    /// Returns raw contents of a table, if it is present.
    pub fn table(&self, tag: TableTag) -> Option<&[u8]> {
        self.tables.get(&tag).map(Vec::as_slice)
    }

    /// Iterates over tags of all tables in this file in ascending order.
    pub fn table_tags(&self) -> impl Iterator<Item = TableTag> + '_ {
        self.tables.keys().copied()
    }

    pub(crate) fn tables(&self) -> &BTreeMap<TableTag, Vec<u8>> {
        &self.tables
    }

    fn required_table(&self, tag: TableTag) -> Result<&[u8], ParseError> {
        self.table(tag).ok_or_else(|| ParseError::missing_table(tag))
    }

    /// Parses tables necessary for subsetting.
    ///
    /// # Errors
    ///
    /// Returns an error if a required table is missing or malformed, or if the font
    /// has CFF outlines.
    pub fn font(&self) -> Result<Font<'_>, ParseError> {
        Font::new(self)
    }
}

/// Font parsed from a [`FontFile`] with the tables required for subsetting.
#[derive(Debug)]
pub struct Font<'a> {
    pub(crate) file: &'a FontFile,
    pub(crate) cmap: CmapTable<'a>,
    pub(crate) head: &'a [u8],
    pub(crate) hhea: MetricsHeader<'a>,
    pub(crate) hmtx: MetricsTable<'a>,
    pub(crate) vertical: Option<(MetricsHeader<'a>, MetricsTable<'a>)>,
    pub(crate) maxp: &'a [u8],
    pub(crate) name: &'a [u8],
    pub(crate) os2: &'a [u8],
    pub(crate) post: PostTable<'a>,
    pub(crate) loca: LocaTable<'a>,
    pub(crate) glyf: &'a [u8],
    pub(crate) glyph_count: u16,
}

impl<'a> Font<'a> {
    pub(crate) const HEAD_CHECKSUM_OFFSET: usize = 8;
    pub(crate) const SFNT_CHECKSUM: u32 = 0x_b1b0_afba;

    fn new(file: &'a FontFile) -> Result<Self, ParseError> {
        if !file.tables.contains_key(&TableTag::GLYF)
            && (file.tables.contains_key(&TableTag::CFF)
                || file.tables.contains_key(&TableTag::CFF2))
        {
            return Err(ParseErrorKind::UnsupportedOutlines.into());
        }

        let head = file.required_table(TableTag::HEAD)?;
        let loca_format = Self::parse_loca_format(head)?;
        let maxp = file.required_table(TableTag::MAXP)?;
        let glyph_count = Self::parse_glyph_count(maxp)?;
        let loca = LocaTable::new(loca_format, glyph_count, file.required_table(TableTag::LOCA)?)?;

        let hhea = MetricsHeader::parse(TableTag::HHEA, file.required_table(TableTag::HHEA)?)?;
        let hmtx = MetricsTable::new(
            TableTag::HMTX,
            file.required_table(TableTag::HMTX)?,
            hhea.number_of_long_metrics,
            glyph_count,
        )?;
        let vertical = match (file.table(TableTag::VHEA), file.table(TableTag::VMTX)) {
            (Some(vhea), Some(vmtx)) => {
                let vhea = MetricsHeader::parse(TableTag::VHEA, vhea)?;
                let vmtx = MetricsTable::new(
                    TableTag::VMTX,
                    vmtx,
                    vhea.number_of_long_metrics,
                    glyph_count,
                )?;
                Some((vhea, vmtx))
            }
            _ => None,
        };

        let cmap = Cursor::new(file.required_table(TableTag::CMAP)?, Some(TableTag::CMAP));
        Ok(Self {
            file,
            cmap: CmapTable::parse(cmap)?,
            head,
            hhea,
            hmtx,
            vertical,
            maxp,
            name: file.required_table(TableTag::NAME)?,
            os2: file.required_table(TableTag::OS2)?,
            post: PostTable::parse(file.required_table(TableTag::POST)?, glyph_count)?,
            loca,
            glyf: file.required_table(TableTag::GLYF)?,
            glyph_count,
        })
    }

    fn parse_loca_format(head_bytes: &[u8]) -> Result<LocaFormat, ParseError> {
        let mut cursor = Cursor::new(head_bytes, Some(TableTag::HEAD));
        cursor.read_u32_checked(|version| {
            if version == 0x_0001_0000 {
                Ok(())
            } else {
                Err(ParseErrorKind::UnexpectedTableVersion(version))
            }
        })?;
        cursor.skip(46)?;
        // ^ fontRevision, checksumAdjustment, magicNumber, flags, unitsPerEm, created, modified,
        // bounding box, macStyle, lowestRecPPEM, fontDirectionHint

        let format = cursor.read_u16_checked(|raw| match raw {
            0 => Ok(LocaFormat::Short),
            1 => Ok(LocaFormat::Long),
            _ => Err(ParseErrorKind::UnexpectedTableFormat(raw)),
        })?;
        cursor.skip(2)?; // glyphDataFormat
        Ok(format)
    }

    fn parse_glyph_count(maxp_bytes: &[u8]) -> Result<u16, ParseError> {
        let mut cursor = Cursor::new(maxp_bytes, Some(TableTag::MAXP));
        cursor.read_u32_checked(|version| {
            if version == 0x_0000_5000 || version == 0x_0001_0000 {
                Ok(())
            } else {
                Err(ParseErrorKind::UnexpectedTableVersion(version))
            }
        })?;
        cursor.read_u16()
    }

    /// Returns the number of glyphs in this font.
    pub fn glyph_count(&self) -> u16 {
        self.glyph_count
    }

    /// Maps a char to the glyph index using the Unicode `cmap` subtable. Returns 0
    /// (the missing glyph) for unmapped chars.
    ///
    /// # Errors
    ///
    /// Returns an error if the `cmap` subtable is malformed.
    pub fn map_char(&self, ch: char) -> Result<u16, ParseError> {
        Ok(self.cmap.map_char(ch)?)
    }

    pub(crate) fn raw_table(&self, tag: TableTag) -> Option<&'a [u8]> {
        self.file.table(tag)
    }

    pub(crate) fn glyph(&self, glyph_idx: u16) -> Result<GlyphRecord<'a>, ParseError> {
        let range = self.loca.glyph_range(glyph_idx)?;
        let glyf = Cursor::new(self.glyf, Some(TableTag::GLYF));
        let outline = Glyph::new(glyf.range(range)?)?;
        let horizontal = self.hmtx.metric(glyph_idx)?;
        let vertical = self
            .vertical
            .as_ref()
            .map(|(_, vmtx)| vmtx.metric(glyph_idx))
            .transpose()?;
        Ok(GlyphRecord {
            outline,
            horizontal,
            vertical,
        })
    }
}

/// Computes the OpenType checksum of the data, padding it with zeros to a 4-byte boundary.
pub(crate) fn checksum(data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(4);
    let mut sum = chunks
        .by_ref()
        .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .fold(0_u32, u32::wrapping_add);
    let remainder = chunks.remainder();
    if !remainder.is_empty() {
        let mut last = [0_u8; 4];
        last[..remainder.len()].copy_from_slice(remainder);
        sum = sum.wrapping_add(u32::from_be_bytes(last));
    }
    sum
}

/// `head` checksum is computed with `checksumAdjustment` set to zero.
fn head_checksum(data: &[u8]) -> u32 {
    let adjustment = Font::HEAD_CHECKSUM_OFFSET..Font::HEAD_CHECKSUM_OFFSET + 4;
    if data.len() < adjustment.end {
        return checksum(data);
    }
    let mut patched = data.to_vec();
    patched[adjustment].fill(0);
    checksum(&patched)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LocaFormat {
    Short,
    Long,
}

impl LocaFormat {
    const fn bytes_per_offset(self) -> usize {
        match self {
            Self::Short => 2,
            Self::Long => 4,
        }
    }
}

#[derive(Debug)]
pub(crate) struct LocaTable<'a> {
    format: LocaFormat,
    glyph_count: u16,
    cursor: Cursor<'a>,
}

impl<'a> LocaTable<'a> {
    fn new(format: LocaFormat, glyph_count: u16, bytes: &'a [u8]) -> Result<Self, ParseError> {
        let cursor = Cursor::new(bytes, Some(TableTag::LOCA));
        let expected_len = format.bytes_per_offset() * (usize::from(glyph_count) + 1);
        // Some fonts pad `loca` beyond the last offset; only a short table is an error.
        if bytes.len() < expected_len {
            return Err(cursor.err(ParseErrorKind::UnexpectedTableLen {
                expected: expected_len,
                actual: bytes.len(),
            }));
        }
        Ok(Self {
            format,
            glyph_count,
            cursor,
        })
    }

    fn glyph_range(&self, glyph_idx: u16) -> Result<ops::Range<usize>, ParseError> {
        if glyph_idx >= self.glyph_count {
            return Err(self.cursor.err(ParseErrorKind::MissingGlyph(glyph_idx)));
        }

        let mut cursor = self.cursor;
        cursor.skip(usize::from(glyph_idx) * self.format.bytes_per_offset())?;
        Ok(match self.format {
            LocaFormat::Short => {
                let start_offset = usize::from(cursor.read_u16()?) * 2;
                let end_offset = usize::from(cursor.read_u16()?) * 2;
                start_offset..end_offset
            }
            LocaFormat::Long => {
                let start_offset = cursor.read_u32()? as usize;
                let end_offset = cursor.read_u32()? as usize;
                start_offset..end_offset
            }
        })
    }
}
