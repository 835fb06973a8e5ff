//! Glyph closure over `GSUB` substitutions.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    errors::ParseErrorKind,
    font::{Cursor, TableTag},
    ParseError,
};

#[derive(Debug)]
struct Ligature {
    /// Component glyphs including the first (covered) one.
    components: Vec<u16>,
    glyph: u16,
}

/// Substitutions from all `GSUB` lookups flattened into glyph-to-glyph edges and ligatures.
///
/// All lookups are taken into account regardless of the features referencing them,
/// so the closure may include more glyphs than strictly necessary.
#[derive(Debug, Default)]
pub(crate) struct GsubClosure {
    substitutes: BTreeMap<u16, BTreeSet<u16>>,
    ligatures: Vec<Ligature>,
}

impl GsubClosure {
    const SINGLE: u16 = 1;
    const MULTIPLE: u16 = 2;
    const ALTERNATE: u16 = 3;
    const LIGATURE: u16 = 4;
    const CONTEXT: u16 = 5;
    const CHAINED_CONTEXT: u16 = 6;
    const EXTENSION: u16 = 7;
    const REVERSE_CHAINED_CONTEXT: u16 = 8;

    pub(crate) fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let table = Cursor::new(bytes, Some(TableTag::GSUB));
        let mut cursor = table;
        cursor.read_u16_checked(|major_version| {
            if major_version == 1 {
                Ok(())
            } else {
                Err(ParseErrorKind::UnexpectedTableVersion(major_version.into()))
            }
        })?;
        cursor.skip(6)?; // minorVersion, scriptListOffset, featureListOffset

        let mut this = Self::default();
        let lookup_list_offset = cursor.read_u16()?;
        if lookup_list_offset == 0 {
            return Ok(this);
        }
        let lookup_list = table.at(lookup_list_offset.into())?;
        let mut lookups = lookup_list;
        let lookup_count = lookups.read_u16()?;
        for lookup_idx in 0..lookup_count {
            let lookup = lookup_list.at(lookups.read_u16()?.into())?;
            this.push_lookup(lookup_idx, lookup)?;
        }

        tracing::debug!(
            lookup_count,
            substitutes = this.substitutes.len(),
            ligatures = this.ligatures.len(),
            "parsed GSUB lookups"
        );
        Ok(this)
    }

    fn push_lookup(&mut self, lookup_idx: u16, lookup: Cursor<'_>) -> Result<(), ParseError> {
        let mut cursor = lookup;
        let lookup_type = cursor.read_u16()?;
        cursor.skip(2)?; // lookupFlag
        let subtable_count = cursor.read_u16()?;
        for _ in 0..subtable_count {
            let subtable = lookup.at(cursor.read_u16()?.into())?;
            if lookup_type == Self::EXTENSION {
                let mut extension = subtable;
                extension.skip(2)?; // substFormat
                let extension_type = extension.read_u16()?;
                let offset = extension.read_u32()? as usize;
                self.push_subtable(lookup_idx, extension_type, subtable.at(offset)?)?;
            } else {
                self.push_subtable(lookup_idx, lookup_type, subtable)?;
            }
        }
        Ok(())
    }

    fn push_subtable(
        &mut self,
        lookup_idx: u16,
        lookup_type: u16,
        subtable: Cursor<'_>,
    ) -> Result<(), ParseError> {
        if matches!(lookup_type, Self::CONTEXT | Self::CHAINED_CONTEXT) {
            // Nested lookups are in the lookup list and are processed on their own.
            tracing::trace!(lookup_idx, lookup_type, "skipped contextual GSUB lookup");
            return Ok(());
        }

        let mut cursor = subtable;
        let format = cursor.read_u16()?;
        let coverage = parse_coverage(subtable.at(cursor.read_u16()?.into())?)?;
        match (lookup_type, format) {
            (Self::SINGLE, 1) => {
                let delta = cursor.read_u16()?;
                for glyph in coverage {
                    self.push_substitute(glyph, glyph.wrapping_add(delta));
                }
            }
            (Self::SINGLE, 2) => {
                let glyph_count = cursor.read_u16()?;
                for glyph in coverage.into_iter().take(glyph_count.into()) {
                    self.push_substitute(glyph, cursor.read_u16()?);
                }
            }
            (Self::MULTIPLE | Self::ALTERNATE, 1) => {
                let set_count = cursor.read_u16()?;
                for glyph in coverage.into_iter().take(set_count.into()) {
                    let mut set = subtable.at(cursor.read_u16()?.into())?;
                    let glyph_count = set.read_u16()?;
                    for _ in 0..glyph_count {
                        self.push_substitute(glyph, set.read_u16()?);
                    }
                }
            }
            (Self::LIGATURE, 1) => {
                let set_count = cursor.read_u16()?;
                for first_glyph in coverage.into_iter().take(set_count.into()) {
                    let ligature_set = subtable.at(cursor.read_u16()?.into())?;
                    self.push_ligature_set(first_glyph, ligature_set)?;
                }
            }
            (Self::REVERSE_CHAINED_CONTEXT, 1) => {
                let backtrack_count = cursor.read_u16()?;
                cursor.skip(2 * usize::from(backtrack_count))?;
                let lookahead_count = cursor.read_u16()?;
                cursor.skip(2 * usize::from(lookahead_count))?;
                let glyph_count = cursor.read_u16()?;
                for glyph in coverage.into_iter().take(glyph_count.into()) {
                    self.push_substitute(glyph, cursor.read_u16()?);
                }
            }
            _ => {
                tracing::debug!(
                    lookup_idx,
                    lookup_type,
                    format,
                    "skipped unsupported GSUB subtable"
                );
            }
        }
        Ok(())
    }

    fn push_ligature_set(
        &mut self,
        first_glyph: u16,
        ligature_set: Cursor<'_>,
    ) -> Result<(), ParseError> {
        let mut cursor = ligature_set;
        let ligature_count = cursor.read_u16()?;
        for _ in 0..ligature_count {
            let mut ligature = ligature_set.at(cursor.read_u16()?.into())?;
            let glyph = ligature.read_u16()?;
            let component_count = ligature.read_u16()?;
            let mut components = Vec::with_capacity(component_count.into());
            components.push(first_glyph);
            for _ in 1..component_count {
                components.push(ligature.read_u16()?);
            }
            self.ligatures.push(Ligature { components, glyph });
        }
        Ok(())
    }

    fn push_substitute(&mut self, glyph: u16, substitute: u16) {
        if glyph != substitute {
            self.substitutes.entry(glyph).or_default().insert(substitute);
        }
    }

    /// Extends `glyphs` with all glyphs reachable via substitutions until a fixpoint is reached.
    /// Returns the number of added glyphs.
    pub(crate) fn close(&self, glyphs: &mut BTreeSet<u16>) -> usize {
        let initial_len = glyphs.len();
        loop {
            let mut added: Vec<u16> = glyphs
                .iter()
                .filter_map(|glyph| self.substitutes.get(glyph))
                .flatten()
                .copied()
                .filter(|substitute| !glyphs.contains(substitute))
                .collect();

            let ligatures = self.ligatures.iter().filter(|ligature| {
                !glyphs.contains(&ligature.glyph)
                    && ligature
                        .components
                        .iter()
                        .all(|component| glyphs.contains(component))
            });
            added.extend(ligatures.map(|ligature| ligature.glyph));

            if added.is_empty() {
                break;
            }
            glyphs.extend(added);
        }
        glyphs.len() - initial_len
    }

    /// Returns all glyphs covered by or produced by substitutions.
    #[cfg(test)]
    pub(crate) fn referenced_glyphs(&self) -> BTreeSet<u16> {
        let substitutes = self
            .substitutes
            .iter()
            .flat_map(|(&glyph, substitutes)| substitutes.iter().copied().chain([glyph]));
        let ligatures = self.ligatures.iter().flat_map(|ligature| {
            ligature.components.iter().copied().chain([ligature.glyph])
        });
        substitutes.chain(ligatures).collect()
    }
}

/// Parses a coverage table into glyph IDs ordered by coverage index.
fn parse_coverage(mut cursor: Cursor<'_>) -> Result<Vec<u16>, ParseError> {
    let format = cursor.read_u16_checked(|format| match format {
        1 | 2 => Ok(format),
        _ => Err(ParseErrorKind::UnexpectedTableFormat(format)),
    })?;
    let count = cursor.read_u16()?;
    if format == 1 {
        return (0..count).map(|_| cursor.read_u16()).collect();
    }

    let mut glyphs = vec![];
    for _ in 0..count {
        let start_glyph = cursor.read_u16()?;
        let end_glyph = cursor.read_u16()?;
        cursor.skip(2)?; // startCoverageIndex
        glyphs.extend(start_glyph..=end_glyph);
    }
    Ok(glyphs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{encode_gsub, Substitution};

    #[test]
    fn parsing_coverage_formats() {
        let format1 = [0, 1, 0, 3, 0, 5, 0, 7, 0, 9];
        let glyphs = parse_coverage(Cursor::new(&format1, None)).unwrap();
        assert_eq!(glyphs, [5, 7, 9]);

        let format2 = [0, 2, 0, 2, 0, 10, 0, 12, 0, 0, 0, 20, 0, 20, 0, 3];
        let glyphs = parse_coverage(Cursor::new(&format2, None)).unwrap();
        assert_eq!(glyphs, [10, 11, 12, 20]);

        let err = parse_coverage(Cursor::new(&[0, 3, 0, 0], None)).unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::UnexpectedTableFormat(3)));
    }

    #[test]
    fn single_substitutions_are_closed_transitively() {
        let gsub = encode_gsub(&[
            Substitution::Single { from: 1, to: 2 },
            Substitution::Single { from: 2, to: 3 },
            Substitution::Single { from: 5, to: 6 },
        ]);
        let closure = GsubClosure::parse(&gsub).unwrap();

        let mut glyphs = BTreeSet::from([0, 1]);
        let added = closure.close(&mut glyphs);
        assert_eq!(added, 2);
        assert_eq!(glyphs, BTreeSet::from([0, 1, 2, 3]));
    }

    #[test]
    fn ligature_requires_all_components() {
        let gsub = encode_gsub(&[Substitution::Ligature {
            components: vec![1, 2],
            glyph: 7,
        }]);
        let closure = GsubClosure::parse(&gsub).unwrap();

        let mut glyphs = BTreeSet::from([0, 1]);
        assert_eq!(closure.close(&mut glyphs), 0);

        glyphs.insert(2);
        assert_eq!(closure.close(&mut glyphs), 1);
        assert!(glyphs.contains(&7));
    }

    #[test]
    fn ligature_can_be_enabled_by_substitution() {
        let gsub = encode_gsub(&[
            Substitution::Single { from: 3, to: 2 },
            Substitution::Ligature {
                components: vec![1, 2],
                glyph: 8,
            },
        ]);
        let closure = GsubClosure::parse(&gsub).unwrap();

        let mut glyphs = BTreeSet::from([1, 3]);
        closure.close(&mut glyphs);
        assert_eq!(glyphs, BTreeSet::from([1, 2, 3, 8]));
    }

    #[test]
    fn empty_lookup_list() {
        let mut gsub = encode_gsub(&[]);
        gsub[8..10].copy_from_slice(&[0, 0]);
        let closure = GsubClosure::parse(&gsub).unwrap();
        let mut glyphs = BTreeSet::from([0, 4]);
        assert_eq!(closure.close(&mut glyphs), 0);
    }

    #[test]
    fn unsupported_version_is_an_error() {
        let mut gsub = encode_gsub(&[]);
        gsub[0..2].copy_from_slice(&[0, 2]);
        let err = GsubClosure::parse(&gsub).unwrap_err();
        assert!(matches!(err.kind(), ParseErrorKind::UnexpectedTableVersion(2)));
        assert_eq!(err.table(), Some(TableTag::GSUB));
    }
}
