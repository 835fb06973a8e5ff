//! Logic for serializing fonts in OpenType and WOFF2 formats.

use core::{fmt, iter, str::FromStr};

use self::{
    cmap::CmapWriter,
    tables::{write_empty_dsig, write_loca},
};
use crate::{
    font::{checksum, EncodedSubtable, GlyphName, MetricsTable, NameTable},
    options::{LayoutFeatures, NameIds},
    Font, FontFile, FontSubset, TableTag,
};

mod brotli;
mod cmap;
mod tables;

fn write_u16(writer: &mut Vec<u8>, value: u16) {
    writer.extend_from_slice(&value.to_be_bytes());
}

fn write_u32(writer: &mut Vec<u8>, value: u32) {
    writer.extend_from_slice(&value.to_be_bytes());
}

fn uint_base128_len(val: u32) -> usize {
    if val == 0 {
        1
    } else {
        val.ilog2() as usize / 7 + 1
    }
}

#[allow(clippy::cast_possible_truncation)] // intentional
fn write_uint_base128(buffer: &mut Vec<u8>, val: u32) {
    if val >= 1 << 28 {
        buffer.push(0x80 | (val >> 28) as u8);
    }
    if val >= 1 << 21 {
        buffer.push(0x80 | (val >> 21) as u8);
    }
    if val >= 1 << 14 {
        buffer.push(0x80 | (val >> 14) as u8);
    }
    if val >= 1 << 7 {
        buffer.push(0x80 | (val >> 7) as u8);
    }
    buffer.push((val & 127) as u8);
}

/// Output container format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum OutputFormat {
    /// Plain sfnt with TrueType outlines (`.ttf`).
    TrueType,
    /// WOFF 2.0 (`.woff2`).
    #[default]
    Woff2,
}

impl OutputFormat {
    /// Returns the conventional file extension (without the leading dot).
    pub fn extension(self) -> &'static str {
        match self {
            Self::TrueType => "ttf",
            Self::Woff2 => "woff2",
        }
    }

    /// Infers the output format from the extension of an input file. WOFF 1.0 inputs
    /// are mapped to WOFF2, since WOFF 1.0 cannot be written.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "ttf" | "otf" => Some(Self::TrueType),
            "woff" | "woff2" => Some(Self::Woff2),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.extension())
    }
}

/// Error parsing an [`OutputFormat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormatParseError(String);

impl fmt::Display for OutputFormatParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "unknown output format `{}`; expected `ttf` or `woff2`",
            self.0
        )
    }
}

impl std::error::Error for OutputFormatParseError {}

impl FromStr for OutputFormat {
    type Err = OutputFormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ttf" | "truetype" => Ok(Self::TrueType),
            "woff2" => Ok(Self::Woff2),
            _ => Err(OutputFormatParseError(s.to_owned())),
        }
    }
}

/// Brotli quality used for WOFF2 by default (the maximum one).
pub const DEFAULT_WOFF2_QUALITY: u8 = 11;

impl FontSubset<'_> {
    /// Serializes this subset to the OpenType format.
    pub fn to_truetype(&self) -> Vec<u8> {
        self.to_writer().into_opentype()
    }

    /// Serializes this subset to the WOFF2 format with the [default](DEFAULT_WOFF2_QUALITY)
    /// compression quality.
    pub fn to_woff2(&self) -> Vec<u8> {
        self.to_woff2_with_quality(DEFAULT_WOFF2_QUALITY)
    }

    /// Serializes this subset to the WOFF2 format with the specified brotli quality (0..=11).
    pub fn to_woff2_with_quality(&self, quality: u8) -> Vec<u8> {
        self.to_writer().into_woff2(quality)
    }

    /// Serializes this subset to the specified format.
    pub fn encode(&self, format: OutputFormat) -> Vec<u8> {
        match format {
            OutputFormat::TrueType => self.to_truetype(),
            OutputFormat::Woff2 => self.to_woff2(),
        }
    }

    fn remap_encoded(&self, subtable: &EncodedSubtable) -> EncodedSubtable {
        let entries = subtable.entries.iter().filter_map(|&(code, glyph_idx)| {
            Some((code, *self.old_to_new_glyph_idx.get(&glyph_idx)?))
        });
        EncodedSubtable {
            entries: entries.collect(),
            ..subtable.clone()
        }
    }

    fn write_cmap(&self, buffer: &mut Vec<u8>) {
        let mut writer = CmapWriter::default();
        writer.push_unicode(&self.char_map);
        let cmap = &self.font.cmap;
        if self.options.symbol_cmap {
            if let Some(symbol) = &cmap.symbol {
                writer.push_symbol(&self.remap_encoded(symbol));
            }
        }
        if self.options.legacy_cmap {
            for legacy in &cmap.legacy {
                writer.push_legacy(&self.remap_encoded(legacy));
            }
        }
        writer.write(buffer);
    }

    fn write_name(&self, buffer: &mut Vec<u8>) {
        let raw = self.font.name;
        if self.options.name_ids == NameIds::All {
            buffer.extend_from_slice(raw);
            return;
        }

        let encoded = match NameTable::parse(raw) {
            Ok(table) => table.encode(&self.options.name_ids),
            Err(err) => {
                tracing::warn!(%err, "cannot parse `name` table; copying it as-is");
                None
            }
        };
        buffer.extend_from_slice(encoded.as_deref().unwrap_or(raw));
    }

    fn write_post(&self, buffer: &mut Vec<u8>) {
        let post = &self.font.post;
        let names = if self.options.glyph_names && post.names.is_some() {
            let names = self.new_to_old_glyph_idx.iter().map(|old_idx| {
                old_idx
                    .and_then(|idx| post.glyph_name(idx))
                    .unwrap_or(GlyphName::Standard(0))
            });
            Some(names)
        } else {
            None
        };
        post.write(names, buffer);
    }

    fn to_writer(&self) -> FontWriter {
        let font = &self.font;
        let hinting = self.options.hinting;
        // The glyph count is bounded by the glyph count in the original font
        let glyph_count = u16::try_from(self.glyphs.len()).unwrap_or(u16::MAX);

        let mut writer = FontWriter::new(FontFile::TRUETYPE_VERSION);
        writer.write_table(TableTag::CMAP, |buffer| self.write_cmap(buffer));
        if hinting {
            writer.write_optional_table(font, TableTag::CVT);
            writer.write_optional_table(font, TableTag::FPGM);
        }

        let horizontal: Vec<_> = self.glyphs.iter().map(|glyph| glyph.horizontal).collect();
        let number_of_h_metrics = writer.write_table(TableTag::HMTX, |buffer| {
            MetricsTable::write_metrics(&horizontal, buffer)
        });
        writer.write_table(TableTag::HHEA, |buffer| {
            font.hhea.write(number_of_h_metrics, buffer);
        });

        if let Some((vhea, _)) = &font.vertical {
            let vertical: Vec<_> = self
                .glyphs
                .iter()
                .map(|glyph| glyph.vertical.unwrap_or_default())
                .collect();
            let number_of_v_metrics = writer.write_table(TableTag::VMTX, |buffer| {
                MetricsTable::write_metrics(&vertical, buffer)
            });
            writer.write_table(TableTag::VHEA, |buffer| {
                vhea.write(number_of_v_metrics, buffer);
            });
        }

        writer.write_table(TableTag::MAXP, |buffer| {
            font.write_maxp(glyph_count, hinting, buffer);
        });
        writer.write_table(TableTag::NAME, |buffer| self.write_name(buffer));
        writer.write_table(TableTag::OS2, |buffer| {
            font.write_os2(&self.char_map, buffer);
        });
        writer.write_table(TableTag::POST, |buffer| self.write_post(buffer));
        if hinting {
            writer.write_optional_table(font, TableTag::PREP);
        }

        if self.options.layout_features == LayoutFeatures::All {
            for tag in [TableTag::GDEF, TableTag::GSUB, TableTag::GPOS] {
                writer.write_optional_table(font, tag);
            }
        }

        let locations = writer.write_table(TableTag::GLYF, |buffer| {
            let mut locations = vec![0];
            let initial_offset = buffer.len();
            for glyph in &self.glyphs {
                glyph.outline.write(buffer);
                locations.push(buffer.len() - initial_offset);
            }
            locations
        });
        let loca_format =
            writer.write_table(TableTag::LOCA, |buffer| write_loca(&locations, buffer));
        writer.write_table(TableTag::HEAD, |buffer| {
            font.write_head(loca_format, buffer);
        });

        for &tag in &self.options.keep_tables {
            if writer.has_table(tag) {
                continue;
            }
            if tag == TableTag::DSIG {
                if font.raw_table(tag).is_some() {
                    writer.write_table(tag, write_empty_dsig);
                }
            } else {
                writer.write_optional_table(font, tag);
            }
        }

        let dropped_tables: Vec<_> = font
            .file
            .table_tags()
            .filter(|&tag| !writer.has_table(tag))
            .map(|tag| tag.to_string())
            .collect();
        if !dropped_tables.is_empty() {
            tracing::debug!(?dropped_tables, "dropped tables from subset");
        }
        writer
    }
}

impl FontFile {
    /// Serializes all tables of this file to the OpenType format without subsetting.
    pub fn to_truetype(&self) -> Vec<u8> {
        self.to_writer().into_opentype()
    }

    /// Serializes all tables of this file to the WOFF2 format without subsetting.
    pub fn to_woff2(&self) -> Vec<u8> {
        self.to_woff2_with_quality(DEFAULT_WOFF2_QUALITY)
    }

    /// Serializes all tables of this file to the WOFF2 format with the specified brotli quality.
    pub fn to_woff2_with_quality(&self, quality: u8) -> Vec<u8> {
        self.to_writer().into_woff2(quality)
    }

    /// Serializes this file to the specified format.
    pub fn encode(&self, format: OutputFormat) -> Vec<u8> {
        match format {
            OutputFormat::TrueType => self.to_truetype(),
            OutputFormat::Woff2 => self.to_woff2(),
        }
    }

    fn to_writer(&self) -> FontWriter {
        let mut writer = FontWriter::new(self.sfnt_version());
        let tables = self.tables();
        for (&tag, data) in tables {
            match tag {
                // `loca` is written immediately after `glyf`
                TableTag::LOCA if tables.contains_key(&TableTag::GLYF) => continue,
                TableTag::HEAD => {
                    writer.write_table(tag, |buffer| {
                        let start = buffer.len();
                        buffer.extend_from_slice(data);
                        let adjustment = Font::HEAD_CHECKSUM_OFFSET..Font::HEAD_CHECKSUM_OFFSET + 4;
                        if let Some(adjustment) = buffer[start..].get_mut(adjustment) {
                            adjustment.fill(0);
                        }
                    });
                }
                _ => writer.write_raw_table(tag, data),
            }

            if tag == TableTag::GLYF {
                if let Some(loca) = tables.get(&TableTag::LOCA) {
                    writer.write_raw_table(TableTag::LOCA, loca);
                }
            }
        }
        writer
    }
}

#[derive(Debug, Clone, Copy)]
struct TableRecord {
    tag: TableTag,
    checksum: u32,
    /// Offset is initially recorded relative to the table data start. It's always 4-byte aligned.
    offset: u32,
    length: u32,
}

impl TableRecord {
    const BYTE_LEN: usize = 16;

    /// Tags with a predefined index in the WOFF2 table directory.
    const WOFF2_KNOWN_TAGS: [&'static [u8; 4]; 63] = [
        b"cmap", b"head", b"hhea", b"hmtx", b"maxp", b"name", b"OS/2", b"post", b"cvt ", b"fpgm",
        b"glyf", b"loca", b"prep", b"CFF ", b"VORG", b"EBDT", b"EBLC", b"gasp", b"hdmx", b"kern",
        b"LTSH", b"PCLT", b"VDMX", b"vhea", b"vmtx", b"BASE", b"GDEF", b"GPOS", b"GSUB", b"EBSC",
        b"JSTF", b"MATH", b"CBDT", b"CBLC", b"COLR", b"CPAL", b"SVG ", b"sbix", b"acnt", b"avar",
        b"bdat", b"bloc", b"bsln", b"cvar", b"fdsc", b"feat", b"fmtx", b"fvar", b"gvar", b"hsty",
        b"just", b"lcar", b"mort", b"morx", b"opbd", b"prop", b"trak", b"Zapf", b"Silf", b"Glat",
        b"Gloc", b"Feat", b"Sill",
    ];
    const WOFF2_ARBITRARY_TAG: u8 = 63;

    fn write_opentype(&self, writer: &mut Vec<u8>) {
        writer.extend_from_slice(&self.tag.0);
        write_u32(writer, self.checksum);
        write_u32(writer, self.offset);
        write_u32(writer, self.length);
    }

    fn self_checksum(&self) -> u32 {
        self.tag
            .to_u32()
            .wrapping_add(self.checksum)
            .wrapping_add(self.offset)
            .wrapping_add(self.length)
    }

    #[allow(clippy::cast_possible_truncation)] // the array has 63 entries
    fn woff2_known_tag_idx(&self) -> Option<u8> {
        Self::WOFF2_KNOWN_TAGS
            .iter()
            .position(|&&tag| tag == self.tag.0)
            .map(|idx| idx as u8)
    }

    fn woff2_len(&self) -> usize {
        let tag_len = if self.woff2_known_tag_idx().is_some() { 0 } else { 4 };
        1 /* flags */ + tag_len + uint_base128_len(self.length)
    }

    fn write_woff2(&self, buffer: &mut Vec<u8>) {
        // `glyf` and `loca` are not transformed, which is signaled by transform version 3.
        const NULL_TRANSFORM: u8 = 0b_1100_0000;

        if let Some(idx) = self.woff2_known_tag_idx() {
            let flags = match self.tag {
                TableTag::GLYF | TableTag::LOCA => idx | NULL_TRANSFORM,
                _ => idx,
            };
            buffer.push(flags);
        } else {
            buffer.push(Self::WOFF2_ARBITRARY_TAG);
            buffer.extend_from_slice(&self.tag.0);
        }
        write_uint_base128(buffer, self.length);
    }
}

#[derive(Debug, Clone)]
struct FontWriter {
    sfnt_version: u32,
    tables: Vec<TableRecord>,
    /// Contains *aligned* table data
    table_data: Vec<u8>,
}

impl FontWriter {
    const SFNT_HEADER_LEN: usize = 12;
    const WOFF2_HEADER_LEN: usize = 48;

    fn new(sfnt_version: u32) -> Self {
        Self {
            sfnt_version,
            tables: vec![],
            table_data: vec![],
        }
    }

    fn has_table(&self, tag: TableTag) -> bool {
        self.tables.iter().any(|record| record.tag == tag)
    }

    #[allow(clippy::cast_possible_truncation)] // fonts are limited to 4 GiB
    fn write_table<T>(&mut self, tag: TableTag, with: impl FnOnce(&mut Vec<u8>) -> T) -> T {
        let offset = self.table_data.len();
        debug_assert_eq!(offset % 4, 0, "unaligned offset: {offset}");

        let output = with(&mut self.table_data);
        let length = self.table_data.len() - offset;
        // Pad the table heap to a 4-byte boundary.
        if length % 4 > 0 {
            let zero_padding = 4 - length % 4;
            self.table_data.extend(iter::repeat_n(0_u8, zero_padding));
        }

        let checksum = checksum(&self.table_data[offset..]);
        self.tables.push(TableRecord {
            tag,
            checksum,
            offset: offset as u32,
            length: length as u32,
        });
        output
    }

    fn write_raw_table(&mut self, tag: TableTag, content: &[u8]) {
        self.write_table(tag, |buffer| buffer.extend_from_slice(content));
    }

    fn write_optional_table(&mut self, font: &Font<'_>, tag: TableTag) {
        if let Some(content) = font.raw_table(tag) {
            self.write_raw_table(tag, content);
        }
    }

    #[allow(clippy::cast_possible_truncation)] // the number of tables is small
    fn write_sfnt_header(&self) -> Vec<u8> {
        let mut buffer = vec![];
        write_u32(&mut buffer, self.sfnt_version);

        let table_count = self.tables.len() as u16;
        write_u16(&mut buffer, table_count);
        let entry_selector = table_count.max(1).ilog2() as u16;
        let search_range = 1 << (4 + entry_selector);
        write_u16(&mut buffer, search_range);
        write_u16(&mut buffer, entry_selector);
        let range_shift = (16 * table_count).saturating_sub(search_range);
        write_u16(&mut buffer, range_shift);

        debug_assert_eq!(buffer.len(), Self::SFNT_HEADER_LEN);
        buffer
    }

    /// Returns the starting offset of table data.
    fn data_offset(&self) -> usize {
        Self::SFNT_HEADER_LEN + self.tables.len() * TableRecord::BYTE_LEN
    }

    fn into_opentype(mut self) -> Vec<u8> {
        let mut buffer = self.write_sfnt_header();
        self.adjust_data(checksum(&buffer));

        self.tables.sort_unstable_by_key(|record| record.tag);
        for record in &self.tables {
            record.write_opentype(&mut buffer);
        }
        buffer.extend(self.table_data);
        buffer
    }

    #[allow(clippy::cast_possible_truncation)] // fonts are limited to 4 GiB
    fn adjust_data(&mut self, sfnt_header_checksum: u32) {
        let data_offset = self.data_offset();

        let mut file_checksum = sfnt_header_checksum;
        for record in &mut self.tables {
            record.offset += data_offset as u32;
            file_checksum = file_checksum
                .wrapping_add(record.self_checksum())
                .wrapping_add(record.checksum);
        }
        self.patch_head_table(file_checksum, data_offset);
    }

    fn patch_head_table(&mut self, file_checksum: u32, data_offset: usize) {
        let checksum_adjustment = Font::SFNT_CHECKSUM.wrapping_sub(file_checksum);

        let Some(head) = self.tables.iter().find(|record| record.tag == TableTag::HEAD) else {
            return;
        };
        if (head.length as usize) < Font::HEAD_CHECKSUM_OFFSET + 4 {
            return;
        }
        // At this point, the table offset already includes the heap offset, so we need to subtract it.
        let offset = head.offset as usize + Font::HEAD_CHECKSUM_OFFSET - data_offset;
        self.table_data[offset..offset + 4].copy_from_slice(&checksum_adjustment.to_be_bytes());
    }

    #[allow(clippy::cast_possible_truncation)] // fonts are limited to 4 GiB
    fn into_woff2(mut self, quality: u8) -> Vec<u8> {
        const WOFF2_SIGNATURE: u32 = 0x_774f_4632;

        self.adjust_data(checksum(&self.write_sfnt_header()));

        let compressed_data = self.compress_data(quality);
        let tables_len = self
            .tables
            .iter()
            .map(TableRecord::woff2_len)
            .sum::<usize>();
        let mut file_len = Self::WOFF2_HEADER_LEN + tables_len + compressed_data.len();
        if file_len % 4 != 0 {
            file_len += 4 - file_len % 4;
        }

        let mut buffer = vec![];
        write_u32(&mut buffer, WOFF2_SIGNATURE);
        write_u32(&mut buffer, self.sfnt_version);
        write_u32(&mut buffer, file_len as u32);
        write_u16(&mut buffer, self.tables.len() as u16);
        write_u16(&mut buffer, 0); // reserved

        let decompressed_len = self.data_offset() + self.table_data.len();
        write_u32(&mut buffer, decompressed_len as u32);
        write_u32(&mut buffer, compressed_data.len() as u32);
        write_u32(&mut buffer, 0); // WOFF version
        write_u32(&mut buffer, 0); // metadata offset
        write_u32(&mut buffer, 0); // metadata length
        write_u32(&mut buffer, 0); // original metadata length
        write_u32(&mut buffer, 0); // private block offset
        write_u32(&mut buffer, 0); // private block length
        debug_assert_eq!(buffer.len(), Self::WOFF2_HEADER_LEN);

        for record in &self.tables {
            record.write_woff2(&mut buffer);
        }
        debug_assert_eq!(buffer.len(), Self::WOFF2_HEADER_LEN + tables_len);
        buffer.extend(compressed_data);

        // Pad `buffer` to be 4-byte aligned. This is required even though we don't have metadata or private blocks.
        if buffer.len() % 4 != 0 {
            let padding = 4 - buffer.len() % 4;
            buffer.extend(iter::repeat_n(0, padding));
        }
        debug_assert_eq!(file_len, buffer.len());
        buffer
    }
}
