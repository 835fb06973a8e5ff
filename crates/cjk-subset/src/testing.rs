//! Builder of small synthetic TrueType fonts for tests.

use std::collections::BTreeMap;

use crate::{FontFile, TableTag};

fn write_u16(buffer: &mut Vec<u8>, value: u16) {
    buffer.extend_from_slice(&value.to_be_bytes());
}

fn write_u32(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_be_bytes());
}

#[allow(clippy::cast_possible_truncation)] // `ilog2()` of `u16` is less than 16
fn search_params(count: u16, unit: u16) -> [u16; 3] {
    let entry_selector = count.max(1).ilog2() as u16;
    let search_range = unit << entry_selector;
    [search_range, entry_selector, unit * count - search_range]
}

/// `GSUB` substitution rule.
#[derive(Debug, Clone)]
pub enum Substitution {
    /// Single substitution (lookup type 1).
    Single {
        /// Input glyph.
        from: u16,
        /// Substitute glyph.
        to: u16,
    },
    /// Ligature substitution (lookup type 4).
    Ligature {
        /// Component glyphs. Must be non-empty.
        components: Vec<u16>,
        /// Ligature glyph.
        glyph: u16,
    },
}

impl Substitution {
    fn encode_lookup(&self) -> Vec<u8> {
        const SUBTABLE_OFFSET: u16 = 8;

        let mut buffer = vec![];
        let lookup_type = match self {
            Self::Single { .. } => 1,
            Self::Ligature { .. } => 4,
        };
        write_u16(&mut buffer, lookup_type);
        write_u16(&mut buffer, 0); // lookupFlag
        write_u16(&mut buffer, 1); // subTableCount
        write_u16(&mut buffer, SUBTABLE_OFFSET);

        match self {
            Self::Single { from, to } => {
                write_u16(&mut buffer, 2); // substFormat
                write_u16(&mut buffer, 8); // coverageOffset
                write_u16(&mut buffer, 1); // glyphCount
                write_u16(&mut buffer, *to);
                Self::encode_coverage(&mut buffer, *from);
            }
            Self::Ligature { components, glyph } => {
                let (&first, rest) = components
                    .split_first()
                    .expect("ligature must have components");
                let rest_len = u16::try_from(rest.len()).expect("too many components");
                write_u16(&mut buffer, 1); // substFormat
                write_u16(&mut buffer, 16 + 2 * rest_len); // coverageOffset
                write_u16(&mut buffer, 1); // ligatureSetCount
                write_u16(&mut buffer, 8); // ligatureSetOffset
                write_u16(&mut buffer, 1); // ligatureCount
                write_u16(&mut buffer, 4); // ligatureOffset
                write_u16(&mut buffer, *glyph);
                write_u16(&mut buffer, rest_len + 1);
                for &component in rest {
                    write_u16(&mut buffer, component);
                }
                Self::encode_coverage(&mut buffer, first);
            }
        }
        buffer
    }

    fn encode_coverage(buffer: &mut Vec<u8>, glyph: u16) {
        write_u16(buffer, 1); // coverageFormat
        write_u16(buffer, 1); // glyphCount
        write_u16(buffer, glyph);
    }
}

/// Encodes a `GSUB` table with a separate lookup for each substitution and empty
/// script and feature lists.
pub fn encode_gsub(substitutions: &[Substitution]) -> Vec<u8> {
    const LOOKUP_LIST_OFFSET: u16 = 14;

    let mut buffer = vec![];
    write_u32(&mut buffer, 0x_0001_0000);
    write_u16(&mut buffer, 10); // scriptListOffset
    write_u16(&mut buffer, 12); // featureListOffset
    write_u16(&mut buffer, LOOKUP_LIST_OFFSET);
    write_u16(&mut buffer, 0); // scriptCount
    write_u16(&mut buffer, 0); // featureCount

    let lookups: Vec<_> = substitutions.iter().map(Substitution::encode_lookup).collect();
    let lookup_count = u16::try_from(lookups.len()).expect("too many lookups");
    write_u16(&mut buffer, lookup_count);
    let mut offset = 2 + 2 * lookup_count;
    for lookup in &lookups {
        write_u16(&mut buffer, offset);
        offset += u16::try_from(lookup.len()).expect("lookup too large");
    }
    for lookup in lookups {
        buffer.extend(lookup);
    }
    buffer
}

#[derive(Debug, Clone)]
enum TestGlyph {
    Simple,
    Composite(Vec<u16>),
}

/// Builder of synthetic TrueType fonts.
///
/// Glyph #0 (`.notdef`) is always present; each subsequent glyph is a small triangle
/// or a composite of other glyphs.
#[derive(Debug, Clone)]
pub struct TestFontBuilder {
    glyphs: Vec<TestGlyph>,
    char_map: Vec<(char, u16)>,
    instructions: Vec<u8>,
    names: Vec<(u16, String)>,
    glyph_names: bool,
    legacy_cmap: bool,
    symbol_cmap: bool,
    glyph_id_array: bool,
    vertical_metrics: bool,
    cff_outlines: bool,
    substitutions: Vec<Substitution>,
    extra_tables: BTreeMap<TableTag, Vec<u8>>,
}

impl Default for TestFontBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFontBuilder {
    /// Advance of the `.notdef` glyph.
    pub const NOTDEF_ADVANCE: u16 = 500;
    /// Advance of all other glyphs.
    pub const GLYPH_ADVANCE: u16 = 1_000;

    /// Creates a builder for a font with a single `.notdef` glyph.
    pub fn new() -> Self {
        Self {
            glyphs: vec![TestGlyph::Simple],
            char_map: vec![],
            instructions: vec![],
            names: vec![
                (0, "Copyright (c) Test".to_owned()),
                (1, "Test Sans".to_owned()),
                (2, "Regular".to_owned()),
                (4, "Test Sans Regular".to_owned()),
                (6, "TestSans-Regular".to_owned()),
                (16, "Test Sans Family".to_owned()),
            ],
            glyph_names: false,
            legacy_cmap: false,
            symbol_cmap: false,
            glyph_id_array: false,
            vertical_metrics: false,
            cff_outlines: false,
            substitutions: vec![],
            extra_tables: BTreeMap::new(),
        }
    }

    fn next_glyph_idx(&self) -> u16 {
        u16::try_from(self.glyphs.len()).expect("too many glyphs")
    }

    /// Adds a simple glyph for each of the chars.
    #[must_use]
    pub fn char_glyphs(mut self, chars: &[char]) -> Self {
        for &ch in chars {
            let glyph_idx = self.next_glyph_idx();
            self.glyphs.push(TestGlyph::Simple);
            self.char_map.push((ch, glyph_idx));
        }
        self
    }

    /// Adds simple glyphs not mapped by `cmap`.
    #[must_use]
    pub fn unmapped_glyphs(mut self, count: usize) -> Self {
        self.glyphs
            .extend(std::iter::repeat_n(TestGlyph::Simple, count));
        self
    }

    /// Adds a composite glyph for the char.
    #[must_use]
    pub fn composite_glyph(mut self, ch: char, components: &[u16]) -> Self {
        let glyph_idx = self.next_glyph_idx();
        self.glyphs.push(TestGlyph::Composite(components.to_vec()));
        self.char_map.push((ch, glyph_idx));
        self
    }

    /// Sets TrueType instructions for all simple glyphs.
    #[must_use]
    pub fn glyph_instructions(mut self, instructions: &[u8]) -> Self {
        self.instructions = instructions.to_vec();
        self
    }

    /// Adds a `name` record (Windows platform, English).
    #[must_use]
    pub fn name(mut self, name_id: u16, value: &str) -> Self {
        self.names.retain(|(id, _)| *id != name_id);
        self.names.push((name_id, value.to_owned()));
        self
    }

    /// Writes glyph names to the `post` table (version 2).
    #[must_use]
    pub fn glyph_names(mut self) -> Self {
        self.glyph_names = true;
        self
    }

    /// Adds a Macintosh Roman (format 0) `cmap` subtable for Latin-1 chars.
    #[must_use]
    pub fn legacy_cmap(mut self) -> Self {
        self.legacy_cmap = true;
        self
    }

    /// Adds a Windows symbol `cmap` subtable mapping `U+F000 + code` for Latin-1 chars.
    #[must_use]
    pub fn symbol_cmap(mut self) -> Self {
        self.symbol_cmap = true;
        self
    }

    /// Encodes the BMP Unicode `cmap` subtable with a glyph ID array instead of deltas.
    #[must_use]
    pub fn cmap_glyph_id_array(mut self) -> Self {
        self.glyph_id_array = true;
        self
    }

    /// Adds `vhea` and `vmtx` tables.
    #[must_use]
    pub fn vertical_metrics(mut self) -> Self {
        self.vertical_metrics = true;
        self
    }

    /// Replaces `glyf` / `loca` with a dummy `CFF ` table.
    #[must_use]
    pub fn cff_outlines(mut self) -> Self {
        self.cff_outlines = true;
        self
    }

    /// Adds a `GSUB` substitution.
    #[must_use]
    pub fn substitution(mut self, substitution: Substitution) -> Self {
        self.substitutions.push(substitution);
        self
    }

    /// Adds an arbitrary table.
    #[must_use]
    pub fn table(mut self, tag: TableTag, data: Vec<u8>) -> Self {
        self.extra_tables.insert(tag, data);
        self
    }

    /// Builds font tables.
    pub fn build_file(&self) -> FontFile {
        let glyph_count = self.next_glyph_idx();
        let mut tables = self.extra_tables.clone();
        tables.insert(TableTag::HEAD, Self::head());
        tables.insert(TableTag::HHEA, Self::metrics_header(0x_0001_0000, glyph_count));
        tables.insert(TableTag::HMTX, self.metrics(50));
        tables.insert(TableTag::MAXP, self.maxp());
        tables.insert(TableTag::CMAP, self.cmap());
        tables.insert(TableTag::NAME, self.name_table());
        tables.insert(TableTag::OS2, self.os2());
        tables.insert(TableTag::POST, self.post());
        if self.vertical_metrics {
            tables.insert(TableTag::VHEA, Self::metrics_header(0x_0001_1000, glyph_count));
            tables.insert(TableTag::VMTX, self.metrics(100));
        }
        if !self.substitutions.is_empty() {
            tables.insert(TableTag::GSUB, encode_gsub(&self.substitutions));
        }

        let sfnt_version = if self.cff_outlines {
            tables.insert(TableTag::CFF, vec![1, 0, 4, 2]);
            u32::from_be_bytes(*b"OTTO")
        } else {
            let (glyf, loca) = self.glyf_and_loca();
            tables.insert(TableTag::GLYF, glyf);
            tables.insert(TableTag::LOCA, loca);
            FontFile::TRUETYPE_VERSION
        };
        FontFile::from_tables(sfnt_version, tables)
    }

    /// Builds a TrueType font file.
    pub fn build(&self) -> Vec<u8> {
        self.build_file().to_truetype()
    }

    /// Builds a WOFF2 font file.
    pub fn build_woff2(&self) -> Vec<u8> {
        self.build_file().to_woff2()
    }

    fn head() -> Vec<u8> {
        let mut buffer = vec![];
        write_u32(&mut buffer, 0x_0001_0000); // version
        write_u32(&mut buffer, 0x_0001_0000); // fontRevision
        write_u32(&mut buffer, 0); // checksumAdjustment
        write_u32(&mut buffer, 0x_5f0f_3cf5); // magicNumber
        write_u16(&mut buffer, 0x000b); // flags
        write_u16(&mut buffer, 1_000); // unitsPerEm
        buffer.extend_from_slice(&[0; 16]); // created, modified
        for bound in [0, 0, 250, 200] {
            write_u16(&mut buffer, bound);
        }
        write_u16(&mut buffer, 0); // macStyle
        write_u16(&mut buffer, 8); // lowestRecPPEM
        write_u16(&mut buffer, 2); // fontDirectionHint
        write_u16(&mut buffer, 1); // indexToLocFormat (long)
        write_u16(&mut buffer, 0); // glyphDataFormat
        buffer
    }

    fn metrics_header(version: u32, glyph_count: u16) -> Vec<u8> {
        let mut buffer = vec![];
        write_u32(&mut buffer, version);
        write_u16(&mut buffer, 800); // ascender
        buffer.extend_from_slice(&(-200_i16).to_be_bytes()); // descender
        write_u16(&mut buffer, 0); // lineGap
        write_u16(&mut buffer, Self::GLYPH_ADVANCE); // advanceMax
        buffer.extend_from_slice(&[0; 4]); // minimum side bearings
        write_u16(&mut buffer, 250); // maxExtent
        write_u16(&mut buffer, 1); // caretSlopeRise
        buffer.extend_from_slice(&[0; 14]); // caretSlopeRun, caretOffset, reserved, metricDataFormat
        write_u16(&mut buffer, glyph_count); // number of long metrics
        buffer
    }

    fn metrics(&self, side_bearing: u16) -> Vec<u8> {
        let mut buffer = vec![];
        write_u16(&mut buffer, Self::NOTDEF_ADVANCE);
        write_u16(&mut buffer, side_bearing);
        for _ in 1..self.glyphs.len() {
            write_u16(&mut buffer, Self::GLYPH_ADVANCE);
            write_u16(&mut buffer, side_bearing);
        }
        buffer
    }

    fn maxp(&self) -> Vec<u8> {
        let instructions_len = u16::try_from(self.instructions.len()).expect("too many instructions");
        let mut buffer = vec![];
        write_u32(&mut buffer, 0x_0001_0000);
        write_u16(&mut buffer, self.next_glyph_idx());
        for value in [3, 1, 6, 2, 2, 0, 0, 0, 0, 0, instructions_len, 2, 1] {
            write_u16(&mut buffer, value);
        }
        buffer
    }

    fn glyf_and_loca(&self) -> (Vec<u8>, Vec<u8>) {
        const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
        const ARGS_ARE_XY_VALUES: u16 = 0x0002;
        const MORE_COMPONENTS: u16 = 0x0020;

        let mut glyf = vec![];
        let mut loca = vec![];
        for glyph in &self.glyphs {
            write_u32(&mut loca, u32::try_from(glyf.len()).expect("glyf overflow"));
            match glyph {
                TestGlyph::Simple => {
                    write_u16(&mut glyf, 1); // numberOfContours
                    for bound in [0, 0, 250, 200] {
                        write_u16(&mut glyf, bound);
                    }
                    write_u16(&mut glyf, 2); // endPtsOfContours
                    let instructions_len =
                        u16::try_from(self.instructions.len()).expect("too many instructions");
                    write_u16(&mut glyf, instructions_len);
                    glyf.extend_from_slice(&self.instructions);
                    // On-curve points with positive short coordinate deltas
                    glyf.extend_from_slice(&[0x37; 3]);
                    glyf.extend_from_slice(&[0, 100, 150]);
                    glyf.extend_from_slice(&[0, 200, 0]);
                }
                TestGlyph::Composite(components) => {
                    write_u16(&mut glyf, u16::MAX); // numberOfContours = -1
                    for bound in [0, 0, 500, 200] {
                        write_u16(&mut glyf, bound);
                    }
                    for (i, &component) in components.iter().enumerate() {
                        let mut flags = ARG_1_AND_2_ARE_WORDS | ARGS_ARE_XY_VALUES;
                        if i + 1 < components.len() {
                            flags |= MORE_COMPONENTS;
                        }
                        write_u16(&mut glyf, flags);
                        write_u16(&mut glyf, component);
                        write_u16(&mut glyf, u16::try_from(i * 250).unwrap_or(0)); // dx
                        write_u16(&mut glyf, 0); // dy
                    }
                }
            }
        }
        write_u32(&mut loca, u32::try_from(glyf.len()).expect("glyf overflow"));
        (glyf, loca)
    }

    fn cmap(&self) -> Vec<u8> {
        let mut bmp: Vec<(u16, u16)> = self
            .char_map
            .iter()
            .filter_map(|&(ch, idx)| Some((u16::try_from(u32::from(ch)).ok()?, idx)))
            .collect();
        bmp.sort_unstable();
        let has_supplementary = bmp.len() < self.char_map.len();

        let mut subtables = vec![];
        if self.legacy_cmap {
            let mut glyph_ids = [0_u8; 256];
            for &(ch, idx) in &self.char_map {
                if let (Ok(code), Ok(idx)) = (u8::try_from(ch), u8::try_from(idx)) {
                    glyph_ids[usize::from(code)] = idx;
                }
            }
            let mut subtable = vec![];
            write_u16(&mut subtable, 0); // format
            write_u16(&mut subtable, 262); // length
            write_u16(&mut subtable, 0); // language
            subtable.extend_from_slice(&glyph_ids);
            subtables.push(((1, 0), subtable));
        }
        if self.symbol_cmap {
            let mut entries: Vec<_> = self
                .char_map
                .iter()
                .filter_map(|&(ch, idx)| Some((0xf000 | u16::from(u8::try_from(ch).ok()?), idx)))
                .collect();
            entries.sort_unstable();
            subtables.push(((3, 0), Self::encode_format4(&entries, false)));
        }
        subtables.push(((3, 1), Self::encode_format4(&bmp, self.glyph_id_array)));
        if has_supplementary {
            subtables.push(((3, 10), self.encode_format12()));
        }

        let mut buffer = vec![];
        write_u16(&mut buffer, 0); // version
        let subtable_count = u16::try_from(subtables.len()).expect("too many subtables");
        write_u16(&mut buffer, subtable_count);
        let mut offset = 4 + 8 * u32::from(subtable_count);
        for ((platform_id, encoding_id), subtable) in &subtables {
            write_u16(&mut buffer, *platform_id);
            write_u16(&mut buffer, *encoding_id);
            write_u32(&mut buffer, offset);
            offset += u32::try_from(subtable.len()).expect("subtable too large");
        }
        for (_, subtable) in subtables {
            buffer.extend(subtable);
        }
        buffer
    }

    fn encode_format4(entries: &[(u16, u16)], glyph_id_array: bool) -> Vec<u8> {
        let segment_count = u16::try_from(entries.len() + 1).expect("too many segments");
        let mut buffer = vec![];
        write_u16(&mut buffer, 4); // format
        write_u16(&mut buffer, 0); // length (patched below)
        write_u16(&mut buffer, 0); // language
        write_u16(&mut buffer, 2 * segment_count);
        for param in search_params(segment_count, 2) {
            write_u16(&mut buffer, param);
        }

        for &(code, _) in entries {
            write_u16(&mut buffer, code);
        }
        write_u16(&mut buffer, u16::MAX);
        write_u16(&mut buffer, 0); // reserved padding
        for &(code, _) in entries {
            write_u16(&mut buffer, code);
        }
        write_u16(&mut buffer, u16::MAX);
        for &(code, glyph_idx) in entries {
            write_u16(
                &mut buffer,
                if glyph_id_array { 0 } else { glyph_idx.wrapping_sub(code) },
            );
        }
        write_u16(&mut buffer, 1);
        for _ in entries {
            write_u16(&mut buffer, if glyph_id_array { 2 * segment_count } else { 0 });
        }
        write_u16(&mut buffer, 0);
        if glyph_id_array {
            for &(_, glyph_idx) in entries {
                write_u16(&mut buffer, glyph_idx);
            }
        }

        let len = u16::try_from(buffer.len()).expect("subtable too large");
        buffer[2..4].copy_from_slice(&len.to_be_bytes());
        buffer
    }

    fn encode_format12(&self) -> Vec<u8> {
        let mut char_map = self.char_map.clone();
        char_map.sort_unstable();
        let group_count = u32::try_from(char_map.len()).expect("too many groups");
        let mut buffer = vec![];
        write_u16(&mut buffer, 12); // format
        write_u16(&mut buffer, 0); // reserved
        write_u32(&mut buffer, 16 + 12 * group_count);
        write_u32(&mut buffer, 0); // language
        write_u32(&mut buffer, group_count);
        for &(ch, glyph_idx) in &char_map {
            write_u32(&mut buffer, ch.into());
            write_u32(&mut buffer, ch.into());
            write_u32(&mut buffer, glyph_idx.into());
        }
        buffer
    }

    fn name_table(&self) -> Vec<u8> {
        let mut names = self.names.clone();
        names.sort_by_key(|(id, _)| *id);
        let count = u16::try_from(names.len()).expect("too many names");

        let mut buffer = vec![];
        let mut storage = vec![];
        write_u16(&mut buffer, 0); // format
        write_u16(&mut buffer, count);
        write_u16(&mut buffer, 6 + 12 * count); // storageOffset
        for (name_id, value) in &names {
            let encoded: Vec<u8> = value.encode_utf16().flat_map(u16::to_be_bytes).collect();
            write_u16(&mut buffer, 3); // platformID
            write_u16(&mut buffer, 1); // encodingID
            write_u16(&mut buffer, 0x0409); // languageID
            write_u16(&mut buffer, *name_id);
            write_u16(&mut buffer, u16::try_from(encoded.len()).expect("name too long"));
            write_u16(&mut buffer, u16::try_from(storage.len()).expect("names too long"));
            storage.extend(encoded);
        }
        buffer.extend(storage);
        buffer
    }

    fn os2(&self) -> Vec<u8> {
        let mut buffer = vec![0_u8; 96];
        buffer[0..2].copy_from_slice(&4_u16.to_be_bytes()); // version
        buffer[4..6].copy_from_slice(&400_u16.to_be_bytes()); // usWeightClass
        buffer[6..8].copy_from_slice(&5_u16.to_be_bytes()); // usWidthClass
        buffer[62..64].copy_from_slice(&0x40_u16.to_be_bytes()); // fsSelection

        let codes = self
            .char_map
            .iter()
            .map(|&(ch, _)| u16::try_from(u32::from(ch)).unwrap_or(u16::MAX));
        let first = codes.clone().min().unwrap_or(0);
        let last = codes.max().unwrap_or(0);
        buffer[64..66].copy_from_slice(&first.to_be_bytes());
        buffer[66..68].copy_from_slice(&last.to_be_bytes());
        buffer
    }

    /// Standard Macintosh name index for ASCII letters.
    fn standard_name_idx(ch: char) -> Option<u16> {
        let code = u16::try_from(u32::from(ch)).ok()?;
        match ch {
            'A'..='Z' => Some(36 + code - u16::from(b'A')),
            'a'..='z' => Some(68 + code - u16::from(b'a')),
            _ => None,
        }
    }

    fn post(&self) -> Vec<u8> {
        let mut buffer = vec![];
        write_u32(
            &mut buffer,
            if self.glyph_names { 0x_0002_0000 } else { 0x_0003_0000 },
        );
        write_u32(&mut buffer, 0); // italicAngle
        buffer.extend_from_slice(&(-100_i16).to_be_bytes()); // underlinePosition
        write_u16(&mut buffer, 50); // underlineThickness
        buffer.extend_from_slice(&[0; 20]); // isFixedPitch, memory usage
        if !self.glyph_names {
            return buffer;
        }

        write_u16(&mut buffer, self.next_glyph_idx());
        let mut custom_names = vec![];
        for glyph_idx in 0..self.next_glyph_idx() {
            let ch = self
                .char_map
                .iter()
                .find_map(|&(ch, idx)| (idx == glyph_idx).then_some(ch));
            let name_idx = if glyph_idx == 0 {
                0
            } else if let Some(idx) = ch.and_then(Self::standard_name_idx) {
                idx
            } else {
                let name = match ch {
                    Some(ch) => format!("uni{:04X}", u32::from(ch)),
                    None => format!("glyph{glyph_idx}"),
                };
                custom_names.push(name);
                258 + u16::try_from(custom_names.len() - 1).expect("too many names")
            };
            write_u16(&mut buffer, name_idx);
        }
        for name in custom_names {
            buffer.push(u8::try_from(name.len()).expect("name too long"));
            buffer.extend_from_slice(name.as_bytes());
        }
        buffer
    }
}
