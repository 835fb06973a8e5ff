//! Subsetting logic.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    font::{Font, Glyph, GlyphRecord},
    layout::GsubClosure,
    options::LayoutFeatures,
    CharSet, ParseError, SubsetOptions, TableTag,
};

/// Subset of a [`Font`] produced by removing some of its glyphs and related data.
#[derive(Debug)]
pub struct FontSubset<'a> {
    pub(crate) font: Font<'a>,
    pub(crate) options: SubsetOptions,
    /// Unicode chars mapped to new glyph indices, ordered by char.
    pub(crate) char_map: Vec<(char, u16)>,
    pub(crate) missing_chars: Vec<char>,
    pub(crate) old_to_new_glyph_idx: BTreeMap<u16, u16>,
    /// Original glyph index for each new glyph; `None` for placeholders.
    pub(crate) new_to_old_glyph_idx: Vec<Option<u16>>,
    pub(crate) glyphs: Vec<GlyphRecord<'a>>,
}

impl<'a> Font<'a> {
    /// Creates a subset of this font containing glyphs for the specified chars.
    ///
    /// Chars not mapped by the font are recorded as missing and do not fail subsetting.
    ///
    /// # Errors
    ///
    /// Returns an error if glyph data or one of the tables consulted during subsetting
    /// is malformed.
    pub fn subset(
        self,
        chars: &CharSet,
        options: &SubsetOptions,
    ) -> Result<FontSubset<'a>, ParseError> {
        FontSubset::new(self, chars, options)
    }
}

impl<'a> FontSubset<'a> {
    fn new(font: Font<'a>, chars: &CharSet, options: &SubsetOptions) -> Result<Self, ParseError> {
        // The 0th glyph must always be retained
        let mut retained = BTreeSet::from([0_u16]);
        let mut old_char_map = Vec::with_capacity(chars.len());
        let mut missing_chars = vec![];
        for &ch in chars {
            let glyph_idx = font.map_char(ch)?;
            if glyph_idx == 0 {
                missing_chars.push(ch);
            } else if glyph_idx >= font.glyph_count {
                tracing::debug!(?ch, glyph_idx, "char is mapped to a non-existing glyph");
                missing_chars.push(ch);
            } else {
                old_char_map.push((ch, glyph_idx));
                retained.insert(glyph_idx);
            }
        }
        tracing::debug!(
            mapped = old_char_map.len(),
            missing = missing_chars.len(),
            "mapped chars to glyphs"
        );

        if options.layout_features == LayoutFeatures::All {
            Self::close_over_gsub(&font, &mut retained)?;
        }
        Self::close_over_components(&font, &mut retained)?;

        let retain_glyph_ids = options.retains_glyph_ids();
        let old_to_new_glyph_idx: BTreeMap<_, _> = if retain_glyph_ids {
            retained.iter().map(|&idx| (idx, idx)).collect()
        } else {
            retained.iter().copied().zip(0_u16..).collect()
        };
        let new_glyph_count = if options.copies_glyph_tables() {
            // Verbatim layout / kept tables may reference any glyph of the original font.
            usize::from(font.glyph_count)
        } else if retain_glyph_ids {
            // `retained` always contains 0, and all its elements are less than `font.glyph_count`.
            retained.last().map_or(1, |&idx| usize::from(idx) + 1)
        } else {
            retained.len()
        };

        let mut new_to_old_glyph_idx = vec![None; new_glyph_count];
        for (&old_idx, &new_idx) in &old_to_new_glyph_idx {
            new_to_old_glyph_idx[usize::from(new_idx)] = Some(old_idx);
        }

        let has_vertical_metrics = font.vertical.is_some();
        let glyphs = new_to_old_glyph_idx.iter().map(|old_idx| {
            let Some(old_idx) = *old_idx else {
                return Ok(GlyphRecord::placeholder(has_vertical_metrics));
            };
            let mut glyph = font.glyph(old_idx)?;
            glyph
                .outline
                .remap_components(|idx| old_to_new_glyph_idx.get(&idx).copied().unwrap_or(0));
            if !options.hinting {
                glyph.outline.strip_instructions()?;
            }
            Ok(glyph)
        });
        let mut glyphs = glyphs.collect::<Result<Vec<_>, ParseError>>()?;
        if !options.notdef_outline {
            glyphs[0].outline = Glyph::Empty;
        }

        let char_map = old_char_map
            .into_iter()
            .map(|(ch, old_idx)| (ch, old_to_new_glyph_idx[&old_idx]))
            .collect();
        tracing::debug!(
            glyph_count = glyphs.len(),
            retained = retained.len(),
            "created font subset"
        );

        Ok(Self {
            font,
            options: options.clone(),
            char_map,
            missing_chars,
            old_to_new_glyph_idx,
            new_to_old_glyph_idx,
            glyphs,
        })
    }

    fn close_over_gsub(font: &Font<'_>, retained: &mut BTreeSet<u16>) -> Result<(), ParseError> {
        let Some(gsub) = font.raw_table(TableTag::GSUB) else {
            return Ok(());
        };
        let closure = GsubClosure::parse(gsub)?;
        let added = closure.close(retained);

        let glyph_count = font.glyph_count;
        let invalid_count = retained.iter().filter(|&&idx| idx >= glyph_count).count();
        if invalid_count > 0 {
            tracing::debug!(invalid_count, "GSUB references non-existing glyphs");
            retained.retain(|&idx| idx < glyph_count);
        }
        tracing::debug!(added, "closed glyph set over GSUB substitutions");
        Ok(())
    }

    fn close_over_components(
        font: &Font<'_>,
        retained: &mut BTreeSet<u16>,
    ) -> Result<(), ParseError> {
        let mut pending: Vec<u16> = retained.iter().copied().collect();
        while let Some(glyph_idx) = pending.pop() {
            let glyph = font.glyph(glyph_idx)?;
            for component_idx in glyph.outline.component_indices() {
                if retained.insert(component_idx) {
                    pending.push(component_idx);
                }
            }
        }
        Ok(())
    }

    /// Returns the number of glyphs in this subset, including placeholder glyphs
    /// if glyph IDs are retained.
    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    /// Returns the number of glyphs taken from the original font.
    pub fn retained_glyph_count(&self) -> usize {
        self.old_to_new_glyph_idx.len()
    }

    /// Iterates over chars mapped by this subset in ascending order.
    pub fn mapped_chars(&self) -> impl Iterator<Item = char> + '_ {
        self.char_map.iter().map(|&(ch, _)| ch)
    }

    /// Returns requested chars not mapped by the original font, in ascending order.
    pub fn missing_chars(&self) -> &[char] {
        &self.missing_chars
    }

    /// Returns the new glyph index for a glyph in the original font, if it is retained.
    pub fn new_glyph_idx(&self, old_idx: u16) -> Option<u16> {
        self.old_to_new_glyph_idx.get(&old_idx).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        testing::{Substitution, TestFontBuilder},
        FontFile,
    };

    fn chars(s: &str) -> CharSet {
        CharSet::from_text(s)
    }

    #[test]
    fn subsetting_maps_chars_to_new_glyphs() {
        let font = TestFontBuilder::new()
            .char_glyphs(&['A', 'B', 'C', '中', '文'])
            .build();
        let file = FontFile::new(&font).unwrap();
        let subset = file
            .font()
            .unwrap()
            .subset(&chars("C文"), &SubsetOptions::default())
            .unwrap();

        assert_eq!(subset.glyph_count(), 3);
        assert_eq!(subset.char_map, [('C', 1), ('文', 2)]);
        assert_eq!(subset.new_glyph_idx(3), Some(1));
        assert_eq!(subset.new_glyph_idx(5), Some(2));
        assert_eq!(subset.new_glyph_idx(1), None);
        assert!(subset.missing_chars().is_empty());
    }

    #[test]
    fn missing_chars_are_recorded() {
        let font = TestFontBuilder::new().char_glyphs(&['A', '中']).build();
        let file = FontFile::new(&font).unwrap();
        let subset = file
            .font()
            .unwrap()
            .subset(&chars("中國A"), &SubsetOptions::default())
            .unwrap();

        assert_eq!(subset.mapped_chars().collect::<String>(), "A中");
        assert_eq!(subset.missing_chars(), ['國']);
        assert_eq!(subset.glyph_count(), 3);
    }

    #[test]
    fn composite_glyphs_pull_in_components() {
        let font = TestFontBuilder::new()
            .char_glyphs(&['a', 'b', 'c'])
            // glyph #4 composed of glyphs #1 and #3
            .composite_glyph('x', &[1, 3])
            .build();
        let file = FontFile::new(&font).unwrap();
        let subset = file
            .font()
            .unwrap()
            .subset(&chars("x"), &SubsetOptions::default())
            .unwrap();

        assert_eq!(subset.glyph_count(), 4);
        assert_eq!(subset.new_to_old_glyph_idx, [Some(0), Some(1), Some(3), Some(4)]);
        let Glyph::Composite { components, .. } = &subset.glyphs[3].outline else {
            panic!("unexpected glyph: {:?}", subset.glyphs[3]);
        };
        let component_indices: Vec<_> = components.iter().map(|c| c.glyph_idx).collect();
        assert_eq!(component_indices, [1, 2]);
    }

    #[test]
    fn retaining_glyph_ids() {
        let font = TestFontBuilder::new()
            .char_glyphs(&['a', 'b', 'c', 'd'])
            .build();
        let file = FontFile::new(&font).unwrap();
        let options = SubsetOptions {
            retain_glyph_ids: true,
            ..SubsetOptions::default()
        };
        let subset = file.font().unwrap().subset(&chars("c"), &options).unwrap();

        assert_eq!(subset.glyph_count(), 4);
        assert_eq!(subset.retained_glyph_count(), 2);
        assert_eq!(subset.char_map, [('c', 3)]);
        assert!(matches!(subset.glyphs[1].outline, Glyph::Empty));
        assert!(matches!(subset.glyphs[3].outline, Glyph::Simple(_)));
        assert_eq!(subset.glyphs[1].horizontal.advance, 0);
    }

    #[test]
    fn layout_features_close_over_gsub() {
        let font = TestFontBuilder::new()
            .char_glyphs(&['a', 'b', 'c', 'd'])
            .substitution(Substitution::Single { from: 1, to: 4 })
            .build();
        let file = FontFile::new(&font).unwrap();

        let subset = file
            .font()
            .unwrap()
            .subset(&chars("a"), &SubsetOptions::default())
            .unwrap();
        assert_eq!(subset.glyph_count(), 2);

        let subset = file
            .font()
            .unwrap()
            .subset(&chars("a"), &SubsetOptions::web_cjk())
            .unwrap();
        assert_eq!(subset.glyph_count(), 5);
        assert_eq!(subset.new_glyph_idx(4), Some(4));
        assert_eq!(subset.new_glyph_idx(2), None);
    }

    #[test]
    fn copied_gsub_references_existing_glyphs() {
        let font = TestFontBuilder::new()
            .char_glyphs(&['a', 'b', 'c', 'd'])
            .substitution(Substitution::Single { from: 2, to: 4 })
            .build();
        let file = FontFile::new(&font).unwrap();
        let subset = file
            .font()
            .unwrap()
            .subset(&chars("a"), &SubsetOptions::web_cjk())
            .unwrap();
        assert_eq!(subset.retained_glyph_count(), 2);
        assert_eq!(subset.glyph_count(), 5);
        assert!(matches!(subset.glyphs[4].outline, Glyph::Empty));

        let output = subset.to_truetype();
        let output_file = FontFile::new(&output).unwrap();
        let output_font = output_file.font().unwrap();
        let gsub = output_file.table(TableTag::GSUB).unwrap();
        let referenced = GsubClosure::parse(gsub).unwrap().referenced_glyphs();
        assert_eq!(referenced, BTreeSet::from([2, 4]));
        for glyph_idx in referenced {
            assert!(glyph_idx < output_font.glyph_count(), "{glyph_idx}");
        }
    }

    #[test]
    fn notdef_outline_is_emptied_by_default() {
        let font = TestFontBuilder::new().char_glyphs(&['a']).build();
        let file = FontFile::new(&font).unwrap();

        let subset = file
            .font()
            .unwrap()
            .subset(&chars("a"), &SubsetOptions::default())
            .unwrap();
        assert!(matches!(subset.glyphs[0].outline, Glyph::Empty));
        assert_ne!(subset.glyphs[0].horizontal.advance, 0);

        let subset = file
            .font()
            .unwrap()
            .subset(&chars("a"), &SubsetOptions::web_cjk())
            .unwrap();
        assert!(matches!(subset.glyphs[0].outline, Glyph::Simple(_)));
    }

    #[test]
    fn stripping_instructions() {
        let font = TestFontBuilder::new()
            .char_glyphs(&['a'])
            .glyph_instructions(&[0xb0, 0x01])
            .build();
        let file = FontFile::new(&font).unwrap();
        let options = SubsetOptions {
            hinting: false,
            notdef_outline: true,
            ..SubsetOptions::default()
        };
        let subset = file.font().unwrap().subset(&chars("a"), &options).unwrap();
        let Glyph::Simple(stripped) = &subset.glyphs[1].outline else {
            panic!("unexpected glyph: {:?}", subset.glyphs[1]);
        };

        let original = file.font().unwrap().glyph(1).unwrap();
        let Glyph::Simple(original) = &original.outline else {
            panic!("unexpected glyph: {original:?}");
        };
        assert_eq!(stripped.len() + 2, original.len());
        // bbox and a single endPtsOfContours entry precede instructions
        assert_eq!(stripped[12..14], [0, 0]);
        assert_eq!(stripped[14..], original[16..]);
    }
}
