//! Serialization of individual tables (except for `cmap`).

use std::collections::HashMap;

use super::{write_u16, write_u32};
use crate::{
    font::{
        Glyph, GlyphComponent, GlyphComponentArgs, GlyphName, LocaFormat, Metric, MetricsHeader,
        MetricsTable, NameTable, PostTable, TransformData,
    },
    options::NameIds,
    Font,
};

impl MetricsTable<'_> {
    /// Writes metrics, trimming trailing long metrics with equal advances.
    /// Returns the number of long metrics.
    pub(super) fn write_metrics(metrics: &[Metric], writer: &mut Vec<u8>) -> u16 {
        let mut number_of_long_metrics = metrics.len();
        while let Some([prev, current]) = metrics[..number_of_long_metrics].last_chunk::<2>() {
            if prev.advance != current.advance {
                break;
            }
            number_of_long_metrics -= 1;
        }

        for (i, metric) in metrics.iter().enumerate() {
            if i < number_of_long_metrics {
                write_u16(writer, metric.advance);
            }
            write_u16(writer, metric.side_bearing);
        }

        // `number_of_long_metrics` <= number of glyphs, which doesn't exceed `u16::MAX`
        u16::try_from(number_of_long_metrics).unwrap_or(u16::MAX)
    }
}

impl MetricsHeader<'_> {
    pub(super) fn write(&self, number_of_long_metrics: u16, writer: &mut Vec<u8>) {
        writer.extend_from_slice(&self.raw[..Self::EXPECTED_LEN - 2]);
        write_u16(writer, number_of_long_metrics);
    }
}

pub(super) fn write_loca(locations: &[usize], writer: &mut Vec<u8>) -> LocaFormat {
    let all_even = locations.iter().all(|&loc| loc % 2 == 0);
    let in_bounds = locations
        .last()
        .is_none_or(|&loc| loc <= usize::from(u16::MAX) * 2);
    if all_even && in_bounds {
        for &loc in locations {
            #[allow(clippy::cast_possible_truncation)]
            // doesn't happen due to the preceding check
            write_u16(writer, (loc / 2) as u16);
        }
        LocaFormat::Short
    } else {
        for &loc in locations {
            #[allow(clippy::cast_possible_truncation)]
            // `glyf` in the subset is not larger than in the original font
            write_u32(writer, loc as u32);
        }
        LocaFormat::Long
    }
}

/// Writes a `DSIG` table with no signatures.
pub(super) fn write_empty_dsig(writer: &mut Vec<u8>) {
    write_u32(writer, 1); // version
    write_u16(writer, 0); // numSignatures
    write_u16(writer, 0); // flags
}

impl Font<'_> {
    const LOCA_FORMAT_OFFSET: usize = 50;
    const MAXP_GLYPH_COUNT_OFFSET: usize = 4;
    /// `maxZones` .. `maxSizeOfInstructions` fields in `maxp` version 1.0.
    const MAXP_HINTING_FIELDS: std::ops::Range<usize> = 14..28;
    const OS2_CHAR_INDEX_OFFSET: usize = 64;

    pub(super) fn write_head(&self, loca_format: LocaFormat, writer: &mut Vec<u8>) {
        let original = self.head;
        writer.extend_from_slice(&original[..Self::HEAD_CHECKSUM_OFFSET]);
        write_u32(writer, 0); // Zero the checksum per the OpenType spec. It will be adjusted later
        writer.extend_from_slice(&original[Self::HEAD_CHECKSUM_OFFSET + 4..Self::LOCA_FORMAT_OFFSET]);
        write_u16(
            writer,
            match loca_format {
                LocaFormat::Short => 0,
                LocaFormat::Long => 1,
            },
        );
        writer.extend_from_slice(&original[Self::LOCA_FORMAT_OFFSET + 2..]);
    }

    pub(super) fn write_maxp(&self, glyph_count: u16, keep_hinting: bool, writer: &mut Vec<u8>) {
        let start = writer.len();
        // Patch the number of glyphs, and leave other bytes intact.
        writer.extend_from_slice(&self.maxp[..Self::MAXP_GLYPH_COUNT_OFFSET]);
        write_u16(writer, glyph_count);
        writer.extend_from_slice(&self.maxp[Self::MAXP_GLYPH_COUNT_OFFSET + 2..]);

        if !keep_hinting && self.maxp.len() >= Self::MAXP_HINTING_FIELDS.end {
            let fields = &mut writer[start..][Self::MAXP_HINTING_FIELDS];
            fields.fill(0);
            fields[..2].copy_from_slice(&1_u16.to_be_bytes()); // maxZones
        }
    }

    /// Writes `OS/2` with the first and last char indices updated for the subset.
    pub(super) fn write_os2(&self, char_map: &[(char, u16)], writer: &mut Vec<u8>) {
        let start = writer.len();
        writer.extend_from_slice(self.os2);

        let char_indices = Self::OS2_CHAR_INDEX_OFFSET..Self::OS2_CHAR_INDEX_OFFSET + 4;
        let (Some(&(first, _)), Some(&(last, _))) = (char_map.first(), char_map.last()) else {
            return;
        };
        if self.os2.len() < char_indices.end {
            return;
        }
        let clamp = |ch: char| u16::try_from(u32::from(ch)).unwrap_or(u16::MAX);
        let patched = &mut writer[start..][char_indices];
        patched[..2].copy_from_slice(&clamp(first).to_be_bytes());
        patched[2..].copy_from_slice(&clamp(last).to_be_bytes());
    }
}

impl PostTable<'_> {
    const VERSION_2: u32 = 0x_0002_0000;
    const VERSION_3: u32 = 0x_0003_0000;

    /// Writes the table with the specified glyph names, or without names (version 3)
    /// if `names` is `None`.
    pub(super) fn write<'n>(
        &self,
        names: Option<impl ExactSizeIterator<Item = GlyphName<'n>>>,
        writer: &mut Vec<u8>,
    ) {
        let Some(names) = names else {
            write_u32(writer, Self::VERSION_3);
            writer.extend_from_slice(&self.header[4..]);
            return;
        };

        write_u32(writer, Self::VERSION_2);
        writer.extend_from_slice(&self.header[4..]);
        // The number of names equals the number of glyphs in the subset
        write_u16(writer, u16::try_from(names.len()).unwrap_or(u16::MAX));

        let mut custom_names = vec![];
        let mut custom_indices = HashMap::new();
        for name in names {
            let name_idx = match name {
                GlyphName::Standard(idx) => idx,
                GlyphName::Custom(name) => *custom_indices.entry(name).or_insert_with(|| {
                    custom_names.push(name);
                    // Custom names are limited by the number of glyphs
                    let custom_idx = u16::try_from(custom_names.len() - 1).unwrap_or(0);
                    Self::STANDARD_NAME_COUNT.saturating_add(custom_idx)
                }),
            };
            write_u16(writer, name_idx);
        }
        for name in custom_names {
            // Names were read as Pascal strings, so their length fits into `u8`
            writer.push(u8::try_from(name.len()).unwrap_or(u8::MAX));
            writer.extend_from_slice(name);
        }
    }
}

impl NameTable<'_> {
    const RECORD_LEN: usize = 12;

    /// Encodes records with the specified name IDs, deduplicating string storage.
    /// Returns `None` if the table cannot be encoded.
    pub(super) fn encode(&self, name_ids: &NameIds) -> Option<Vec<u8>> {
        let records: Vec<_> = self
            .records
            .iter()
            .filter(|record| name_ids.contains(record.name_id))
            .collect();
        let count = u16::try_from(records.len()).ok()?;
        let storage_offset = 6 + Self::RECORD_LEN * records.len();

        let mut buffer = Vec::with_capacity(storage_offset);
        write_u16(&mut buffer, 0); // format
        write_u16(&mut buffer, count);
        write_u16(&mut buffer, u16::try_from(storage_offset).ok()?);

        let mut storage = vec![];
        let mut string_offsets = HashMap::new();
        for record in records {
            let offset = match string_offsets.get(record.string) {
                Some(&offset) => offset,
                None => {
                    let offset = u16::try_from(storage.len()).ok()?;
                    storage.extend_from_slice(record.string);
                    string_offsets.insert(record.string, offset);
                    offset
                }
            };
            write_u16(&mut buffer, record.platform_id);
            write_u16(&mut buffer, record.encoding_id);
            write_u16(&mut buffer, record.language_id);
            write_u16(&mut buffer, record.name_id);
            write_u16(&mut buffer, u16::try_from(record.string.len()).ok()?);
            write_u16(&mut buffer, offset);
        }
        buffer.extend(storage);
        Some(buffer)
    }
}

impl Glyph<'_> {
    pub(super) fn write(&self, writer: &mut Vec<u8>) {
        match self {
            Self::Empty => { /* do nothing */ }
            Self::Simple(bytes) => {
                writer.extend_from_slice(bytes);
            }
            Self::Composite {
                header,
                components,
                instructions,
            } => {
                write_u16(writer, u16::MAX); // numberOfContours = -1
                writer.extend_from_slice(header);
                for component in components {
                    component.write(writer);
                }
                writer.extend_from_slice(instructions);
            }
        }
    }
}

impl GlyphComponent {
    fn write(&self, writer: &mut Vec<u8>) {
        write_u16(writer, self.flags);
        write_u16(writer, self.glyph_idx);
        match self.args {
            GlyphComponentArgs::U16(args) => write_u16(writer, args),
            GlyphComponentArgs::U32(args) => write_u32(writer, args),
        }
        match self.transform {
            TransformData::None => { /* do nothing */ }
            TransformData::Scale(val) => write_u16(writer, val),
            TransformData::TwoScales([x, y]) => {
                write_u16(writer, x);
                write_u16(writer, y);
            }
            TransformData::Affine([xx, xy, yx, yy]) => {
                write_u16(writer, xx);
                write_u16(writer, xy);
                write_u16(writer, yx);
                write_u16(writer, yy);
            }
        }
    }
}
