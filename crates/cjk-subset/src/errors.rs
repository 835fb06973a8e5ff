use core::{fmt, ops};

use crate::TableTag;

/// Kind of a font [`ParseError`].
#[derive(Debug)]
#[non_exhaustive]
pub enum ParseErrorKind {
    /// Unexpected end of the font data.
    UnexpectedEof,
    /// Unexpected font version / container magic.
    UnexpectedFontVersion(u32),
    /// Font collections (`ttcf`) cannot be subset.
    UnsupportedContainer,
    /// Font uses CFF outlines, which are not subset.
    UnsupportedOutlines,
    /// Missing required font table (e.g., `head`).
    MissingTable,
    /// No supported subtable in the `cmap` table.
    NoSupportedCmap,
    /// Offset inferred from the table data is out of bounds.
    OffsetOutOfBounds(usize),
    /// Range inferred from the table data is out of bounds.
    RangeOutOfBounds {
        /// Inferred range.
        range: ops::Range<usize>,
        /// Length of the indexed data.
        len: usize,
    },
    /// Unexpected table version.
    UnexpectedTableVersion(u32),
    /// Unexpected table length.
    UnexpectedTableLen {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },
    /// Unexpected table format (e.g., for a `cmap` subtable).
    UnexpectedTableFormat(u16),
    /// Glyph index is not covered by the `loca` table.
    MissingGlyph(u16),
    /// Error mapping a char to a glyph.
    Map(MapError),
    /// Error decoding a WOFF / WOFF2 container.
    Container(allsorts::error::ParseError),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => formatter.write_str("unexpected end of the font data"),
            Self::UnexpectedFontVersion(val) => {
                write!(formatter, "unexpected font version ({val:#010x})")
            }
            Self::UnsupportedContainer => {
                formatter.write_str("font collections are not supported")
            }
            Self::UnsupportedOutlines => {
                formatter.write_str("CFF outlines are not supported; only `glyf` fonts can be subset")
            }
            Self::MissingTable => formatter.write_str("missing required font table"),
            Self::NoSupportedCmap => {
                formatter.write_str("no supported Unicode subtable in the `cmap` table")
            }
            Self::OffsetOutOfBounds(val) => {
                write!(
                    formatter,
                    "offset ({val}) inferred from the table data is out of bounds"
                )
            }
            Self::RangeOutOfBounds { range, len } => {
                write!(
                    formatter,
                    "range ({range:?}) inferred from the table data is out of bounds (..{len})"
                )
            }
            Self::UnexpectedTableVersion(val) => {
                write!(formatter, "unexpected table version ({val:#x})")
            }
            Self::UnexpectedTableLen { expected, actual } => {
                write!(
                    formatter,
                    "unexpected table length: expected {expected}, got {actual}"
                )
            }
            Self::UnexpectedTableFormat(val) => {
                write!(formatter, "unexpected table format ({val})")
            }
            Self::MissingGlyph(idx) => write!(formatter, "glyph #{idx} is missing"),
            Self::Map(err) => write!(formatter, "failed mapping char: {err}"),
            Self::Container(err) => write!(formatter, "failed decoding web font: {err}"),
        }
    }
}

impl std::error::Error for ParseErrorKind {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Map(err) => Some(err),
            Self::Container(err) => Some(err),
            _ => None,
        }
    }
}

/// Errors that can occur when parsing a [`FontFile`](crate::FontFile) or a [`Font`](crate::Font).
#[derive(Debug)]
pub struct ParseError {
    pub(crate) kind: ParseErrorKind,
    pub(crate) offset: usize,
    pub(crate) table: Option<TableTag>,
}

impl fmt::Display for ParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(table) = self.table {
            write!(formatter, "[{table}] ")?;
        }
        if self.offset > 0 {
            write!(formatter, "{}: ", self.offset)?;
        }
        fmt::Display::fmt(&self.kind, formatter)
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<ParseErrorKind> for ParseError {
    fn from(kind: ParseErrorKind) -> Self {
        Self {
            kind,
            offset: 0,
            table: None,
        }
    }
}

impl From<MapError> for ParseError {
    fn from(err: MapError) -> Self {
        Self {
            kind: ParseErrorKind::Map(err),
            offset: 0,
            table: Some(TableTag::CMAP),
        }
    }
}

impl ParseError {
    pub(crate) fn missing_table(tag: TableTag) -> Self {
        Self {
            kind: ParseErrorKind::MissingTable,
            offset: 0,
            table: Some(tag),
        }
    }

    /// Gets the error kind.
    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }

    /// Gets the table this error relates to.
    pub fn table(&self) -> Option<TableTag> {
        self.table
    }

    /// Gets the offset in the table data.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Errors that can occur when mapping a char to a glyph via the `cmap` table.
#[derive(Debug)]
#[non_exhaustive]
pub enum MapError {
    /// Glyph ID array offset points outside the subtable.
    InvalidOffset,
}

impl fmt::Display for MapError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOffset => formatter.write_str("glyph ID offset is out of bounds"),
        }
    }
}

impl std::error::Error for MapError {}
