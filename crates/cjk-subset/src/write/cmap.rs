//! `cmap` table serialization.

use std::{borrow::Cow, mem};

use super::{write_u16, write_u32};
use crate::font::{
    CmapTable, EncodedSubtable, SegmentDeltas, SegmentWithDelta, SegmentedCoverage,
    SequentialMapGroup,
};

#[derive(Debug)]
enum PendingSegment {
    Delta {
        start_code: u16,
        end_code: u16,
        id_delta: u16,
    },
    GlyphIds {
        start_code: u16,
        glyph_ids: Vec<u16>,
    },
}

impl PendingSegment {
    fn delta(run: &[(u16, u16)]) -> Self {
        let (start_code, glyph_idx) = run[0];
        Self::Delta {
            start_code,
            end_code: run[run.len() - 1].0,
            id_delta: glyph_idx.wrapping_sub(start_code),
        }
    }
}

impl SegmentDeltas<'static> {
    /// Minimum length of a run with a constant delta inside a longer run of consecutive codes
    /// to be encoded as a separate segment rather than as a part of the glyph ID array.
    const MIN_DELTA_RUN: usize = 4;

    /// Creates a subtable from a map ordered by code. `0xffff` must not be mapped.
    /// Returns `None` if the subtable does not fit into the format limits.
    fn from_map(map: &[(u16, u16)]) -> Option<Self> {
        let mut pending = vec![];
        let mut rest = map;
        while !rest.is_empty() {
            let run_len = 1 + rest
                .windows(2)
                .take_while(|window| window[0].0.checked_add(1) == Some(window[1].0))
                .count();
            let (run, tail) = rest.split_at(run_len);
            Self::push_run(&mut pending, run);
            rest = tail;
        }

        let segment_count = pending.len() + 1;
        let mut segments = Vec::with_capacity(segment_count);
        let mut glyph_id_array = vec![];
        for (i, segment) in pending.into_iter().enumerate() {
            segments.push(match segment {
                PendingSegment::Delta {
                    start_code,
                    end_code,
                    id_delta,
                } => SegmentWithDelta {
                    start_code,
                    end_code,
                    id_delta,
                    id_range_offset: 0,
                },
                PendingSegment::GlyphIds {
                    start_code,
                    glyph_ids,
                } => {
                    // Offset is counted from the segment's `idRangeOffset` entry
                    let offset = 2 * (segment_count - i) + glyph_id_array.len();
                    let end_code = start_code + u16::try_from(glyph_ids.len() - 1).ok()?;
                    for glyph_idx in glyph_ids {
                        write_u16(&mut glyph_id_array, glyph_idx);
                    }
                    SegmentWithDelta {
                        start_code,
                        end_code,
                        id_delta: 0,
                        id_range_offset: u16::try_from(offset).ok()?,
                    }
                }
            });
        }
        // Add an empty segment with `start_code == end_code == 0xffff` per the OpenType spec.
        segments.push(SegmentWithDelta {
            start_code: u16::MAX,
            end_code: u16::MAX,
            id_delta: 1, // will map `start_code` to glyph #0 (the missing glyph) as recommended
            id_range_offset: 0,
        });

        let this = Self {
            segments,
            glyph_id_array: Cow::Owned(glyph_id_array),
        };
        (this.subtable_len() <= usize::from(u16::MAX)).then_some(this)
    }

    /// Pushes segments for a run of consecutive codes.
    fn push_run(pending: &mut Vec<PendingSegment>, run: &[(u16, u16)]) {
        let delta = |&(code, glyph_idx): &(u16, u16)| glyph_idx.wrapping_sub(code);
        let mut delta_runs = vec![];
        let mut start = 0;
        for i in 1..=run.len() {
            if i == run.len() || delta(&run[i]) != delta(&run[start]) {
                delta_runs.push(&run[start..i]);
                start = i;
            }
        }

        if let [delta_run] = delta_runs.as_slice() {
            pending.push(PendingSegment::delta(delta_run));
            return;
        }

        let mut array_entries: Vec<(u16, u16)> = vec![];
        for delta_run in delta_runs {
            if delta_run.len() >= Self::MIN_DELTA_RUN {
                Self::flush_array(pending, &mut array_entries);
                pending.push(PendingSegment::delta(delta_run));
            } else {
                array_entries.extend_from_slice(delta_run);
            }
        }
        Self::flush_array(pending, &mut array_entries);
    }

    fn flush_array(pending: &mut Vec<PendingSegment>, entries: &mut Vec<(u16, u16)>) {
        let entries = mem::take(entries);
        if let Some(&(start_code, _)) = entries.first() {
            pending.push(PendingSegment::GlyphIds {
                start_code,
                glyph_ids: entries.into_iter().map(|(_, glyph_idx)| glyph_idx).collect(),
            });
        }
    }

    fn subtable_len(&self) -> usize {
        16 + 8 * self.segments.len() + self.glyph_id_array.len()
    }

    #[allow(clippy::cast_possible_truncation)] // checked in `from_map()`
    fn write(&self, language: u16, writer: &mut Vec<u8>) {
        write_u16(writer, 4); // subtable format
        write_u16(writer, self.subtable_len() as u16);
        write_u16(writer, language);

        let segment_count = self.segments.len() as u16;
        write_u16(writer, 2 * segment_count);
        let entry_selector = segment_count.ilog2() as u16;
        let search_range = 1 << (entry_selector + 1);
        write_u16(writer, search_range);
        write_u16(writer, entry_selector);
        let range_shift = 2 * segment_count - search_range;
        write_u16(writer, range_shift);

        for segment in &self.segments {
            write_u16(writer, segment.end_code);
        }
        write_u16(writer, 0); // reserved padding
        for segment in &self.segments {
            write_u16(writer, segment.start_code);
        }
        for segment in &self.segments {
            write_u16(writer, segment.id_delta);
        }
        for segment in &self.segments {
            write_u16(writer, segment.id_range_offset);
        }
        writer.extend_from_slice(&self.glyph_id_array);
    }
}

impl SegmentedCoverage {
    fn from_map(map: &[(char, u16)]) -> Self {
        let mut groups = vec![];
        let [(first_char, first_idx), rest @ ..] = map else {
            return Self::default();
        };
        let mut current_group = SequentialMapGroup {
            start_char_code: (*first_char).into(),
            end_char_code: (*first_char).into(),
            start_glyph_id: (*first_idx).into(),
        };

        for &(ch, glyph_idx) in rest {
            let code = u32::from(ch);
            if code == current_group.end_char_code + 1
                && u32::from(glyph_idx) == current_group.map_unchecked(code)
            {
                current_group.end_char_code += 1;
            } else {
                let prev_group = mem::replace(
                    &mut current_group,
                    SequentialMapGroup {
                        start_char_code: code,
                        end_char_code: code,
                        start_glyph_id: glyph_idx.into(),
                    },
                );
                groups.push(prev_group);
            }
        }

        groups.push(current_group);
        Self { groups }
    }

    fn subtable_len(&self) -> usize {
        16 + 12 * self.groups.len()
    }

    #[allow(clippy::cast_possible_truncation)] // the number of groups is bounded by the number of glyphs
    fn write(&self, writer: &mut Vec<u8>) {
        write_u16(writer, 12); // subtable format
        write_u16(writer, 0); // reserved
        write_u32(writer, self.subtable_len() as u32);
        write_u32(writer, 0); // language
        write_u32(writer, self.groups.len() as u32);
        for group in &self.groups {
            write_u32(writer, group.start_char_code);
            write_u32(writer, group.end_char_code);
            write_u32(writer, group.start_glyph_id);
        }
    }
}

impl EncodedSubtable {
    /// Writes a Macintosh subtable as format 0 if possible, or as format 6 otherwise.
    #[allow(clippy::cast_possible_truncation)] // codes are checked to fit into `u16`
    fn write_legacy(&self, writer: &mut Vec<u8>) {
        let fits_byte_encoding = self
            .entries
            .iter()
            .all(|&(code, glyph_idx)| code < 256 && glyph_idx < 256);
        if fits_byte_encoding {
            write_u16(writer, 0); // format
            write_u16(writer, 262); // length
            write_u16(writer, self.language);
            let mut glyph_ids = [0_u8; 256];
            for &(code, glyph_idx) in &self.entries {
                glyph_ids[code as usize] = glyph_idx as u8;
            }
            writer.extend_from_slice(&glyph_ids);
            return;
        }

        let first_code = self.entries.first().map_or(0, |&(code, _)| code);
        let last_code = self.entries.last().map_or(0, |&(code, _)| code);
        let entry_count = last_code - first_code + 1;
        write_u16(writer, 6); // format
        write_u16(writer, (10 + 2 * entry_count) as u16);
        write_u16(writer, self.language);
        write_u16(writer, first_code as u16);
        write_u16(writer, entry_count as u16);
        let mut entries = self.entries.iter().peekable();
        for code in first_code..=last_code {
            let glyph_idx = entries
                .next_if(|&&(entry_code, _)| entry_code == code)
                .map_or(0, |&(_, glyph_idx)| glyph_idx);
            write_u16(writer, glyph_idx);
        }
    }

    /// Checks whether the subtable can be written. Entries must be ordered by code.
    fn can_be_written(&self) -> bool {
        let (Some(&(first, _)), Some(&(last, _))) = (self.entries.first(), self.entries.last())
        else {
            return true;
        };
        last <= u32::from(u16::MAX) && 10 + 2 * (last - first + 1) <= u32::from(u16::MAX)
    }
}

/// Subtables of the output `cmap` table.
#[derive(Debug, Default)]
pub(super) struct CmapWriter {
    /// Encoding records: platform ID, encoding ID and index of the subtable.
    records: Vec<(u16, u16, usize)>,
    subtables: Vec<Vec<u8>>,
}

impl CmapWriter {
    fn push_subtable(&mut self, encodings: &[(u16, u16)], subtable: Vec<u8>) {
        let idx = self.subtables.len();
        self.subtables.push(subtable);
        for &(platform_id, encoding_id) in encodings {
            self.records.push((platform_id, encoding_id, idx));
        }
    }

    /// Adds Unicode subtables for the map ordered by char.
    pub(super) fn push_unicode(&mut self, char_map: &[(char, u16)]) {
        let bmp_map: Vec<(u16, u16)> = char_map
            .iter()
            .filter_map(|&(ch, glyph_idx)| {
                let code = u16::try_from(u32::from(ch)).ok()?;
                (code != u16::MAX).then_some((code, glyph_idx))
            })
            .collect();
        let is_bmp_only = bmp_map.len() == char_map.len();

        let deltas = SegmentDeltas::from_map(&bmp_map);
        if let Some(deltas) = &deltas {
            let mut subtable = vec![];
            deltas.write(0, &mut subtable);
            self.push_subtable(
                &[
                    (CmapTable::UNICODE_PLATFORM, 3),
                    (CmapTable::WINDOWS_PLATFORM, 1),
                ],
                subtable,
            );
        } else {
            tracing::debug!(
                chars = bmp_map.len(),
                "BMP chars do not fit into a format 4 cmap subtable"
            );
        }

        if deltas.is_none() || !is_bmp_only {
            let mut subtable = vec![];
            SegmentedCoverage::from_map(char_map).write(&mut subtable);
            self.push_subtable(
                &[
                    (CmapTable::UNICODE_PLATFORM, 4),
                    (CmapTable::WINDOWS_PLATFORM, 10),
                ],
                subtable,
            );
        }
    }

    /// Adds a Windows symbol subtable with entries already mapped to new glyph indices.
    pub(super) fn push_symbol(&mut self, subtable: &EncodedSubtable) {
        let entries: Option<Vec<(u16, u16)>> = subtable
            .entries
            .iter()
            .map(|&(code, glyph_idx)| {
                let code = u16::try_from(code).ok()?;
                (code != u16::MAX).then_some((code, glyph_idx))
            })
            .collect();
        let Some(deltas) = entries.and_then(|entries| SegmentDeltas::from_map(&entries)) else {
            tracing::warn!("symbol cmap subtable cannot be encoded; dropping it");
            return;
        };
        let mut buffer = vec![];
        deltas.write(subtable.language, &mut buffer);
        self.push_subtable(&[(subtable.platform_id, subtable.encoding_id)], buffer);
    }

    /// Adds a Macintosh subtable with entries already mapped to new glyph indices.
    pub(super) fn push_legacy(&mut self, subtable: &EncodedSubtable) {
        if !subtable.can_be_written() {
            tracing::warn!(
                encoding_id = subtable.encoding_id,
                "legacy cmap subtable cannot be encoded; dropping it"
            );
            return;
        }
        let mut buffer = vec![];
        subtable.write_legacy(&mut buffer);
        self.push_subtable(&[(subtable.platform_id, subtable.encoding_id)], buffer);
    }

    #[allow(clippy::cast_possible_truncation)] // there are few subtables, each of which is limited in size
    pub(super) fn write(mut self, writer: &mut Vec<u8>) {
        self.records
            .sort_by_key(|&(platform_id, encoding_id, _)| (platform_id, encoding_id));

        let mut subtable_offsets = Vec::with_capacity(self.subtables.len());
        let mut offset = 4 + 8 * self.records.len();
        for subtable in &self.subtables {
            subtable_offsets.push(offset as u32);
            offset += subtable.len();
        }

        write_u16(writer, 0); // table version
        write_u16(writer, self.records.len() as u16);
        for &(platform_id, encoding_id, subtable_idx) in &self.records {
            write_u16(writer, platform_id);
            write_u16(writer, encoding_id);
            write_u32(writer, subtable_offsets[subtable_idx]);
        }
        for subtable in &self.subtables {
            writer.extend_from_slice(subtable);
        }
    }
}
