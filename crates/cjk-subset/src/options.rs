//! Subsetting options.

use std::collections::BTreeSet;

use crate::TableTag;

/// Treatment of OpenType layout tables (`GDEF`, `GSUB`, `GPOS`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum LayoutFeatures {
    /// Drop layout tables.
    #[default]
    Drop,
    /// Keep all layout features. The glyph set is closed over `GSUB` substitutions, and
    /// glyph IDs and the glyph count are retained so that layout tables stay valid
    /// without rewriting.
    All,
}

/// Which `name` table records to keep.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NameIds {
    /// Keep all records.
    All,
    /// Keep records with the specified name IDs.
    Only(BTreeSet<u16>),
}

impl Default for NameIds {
    /// Keeps copyright, family, subfamily, unique ID, full name, version and PostScript name.
    fn default() -> Self {
        Self::Only((0..=6).collect())
    }
}

impl NameIds {
    pub(crate) fn contains(&self, name_id: u16) -> bool {
        match self {
            Self::All => true,
            Self::Only(ids) => ids.contains(&name_id),
        }
    }
}

/// Options controlling which data survives subsetting.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct SubsetOptions {
    /// Treatment of layout tables.
    pub layout_features: LayoutFeatures,
    /// Which `name` records to keep.
    pub name_ids: NameIds,
    /// Keep glyph names in the `post` table.
    pub glyph_names: bool,
    /// Keep the Windows symbol (3, 0) `cmap` subtable.
    pub symbol_cmap: bool,
    /// Keep Macintosh `cmap` subtables.
    pub legacy_cmap: bool,
    /// Keep the outline of the `.notdef` glyph. If not set, the glyph is emptied.
    pub notdef_outline: bool,
    /// Keep TrueType hinting (`cvt `, `fpgm`, `prep` tables and glyph instructions).
    pub hinting: bool,
    /// Keep original glyph IDs; glyphs not in the subset are replaced with empty ones.
    pub retain_glyph_ids: bool,
    /// Tables copied to the subset as-is if present in the font. A kept `DSIG` table
    /// is written without signatures.
    pub keep_tables: BTreeSet<TableTag>,
}

impl Default for SubsetOptions {
    fn default() -> Self {
        Self {
            layout_features: LayoutFeatures::default(),
            name_ids: NameIds::default(),
            glyph_names: false,
            symbol_cmap: false,
            legacy_cmap: false,
            notdef_outline: false,
            hinting: true,
            retain_glyph_ids: false,
            keep_tables: BTreeSet::from([TableTag::GASP]),
        }
    }
}

impl SubsetOptions {
    /// Options used for bundled CJK web fonts: all layout features, all name records,
    /// glyph names, symbol and legacy `cmap` subtables, and `.notdef` outline. Besides `gasp`,
    /// `kern`, `STAT` and `meta` tables are copied as-is.
    pub fn web_cjk() -> Self {
        let mut keep_tables = Self::default().keep_tables;
        keep_tables.extend([TableTag::KERN, TableTag::STAT, TableTag::META]);
        Self {
            layout_features: LayoutFeatures::All,
            name_ids: NameIds::All,
            glyph_names: true,
            symbol_cmap: true,
            legacy_cmap: true,
            notdef_outline: true,
            keep_tables,
            ..Self::default()
        }
    }

    /// Adds a table to [`Self::keep_tables`].
    #[must_use]
    pub fn with_kept_table(mut self, tag: TableTag) -> Self {
        self.keep_tables.insert(tag);
        self
    }

    pub(crate) fn retains_glyph_ids(&self) -> bool {
        self.retain_glyph_ids || self.copies_glyph_tables()
    }

    /// Are tables referencing glyph IDs copied without remapping? In this case, the subset
    /// has the same glyph count as the original font.
    pub(crate) fn copies_glyph_tables(&self) -> bool {
        self.layout_features == LayoutFeatures::All
    }
}
