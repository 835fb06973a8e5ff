//! `Glyph` and related types.

use std::borrow::Cow;

use super::{Cursor, Metric};
use crate::ParseError;

#[derive(Debug, Clone)]
pub(crate) enum Glyph<'a> {
    Empty,
    Simple(Cow<'a, [u8]>),
    Composite {
        /// xMin, yMin, xMax, yMax
        header: [u8; 8],
        components: Vec<GlyphComponent>,
        /// Optional instructions after the last component descriptor
        instructions: &'a [u8],
    },
}

impl<'a> Glyph<'a> {
    pub(super) fn new(raw: Cursor<'a>) -> Result<Self, ParseError> {
        if raw.bytes.is_empty() {
            return Ok(Self::Empty);
        }

        let mut cursor = raw;
        let number_of_contours = cursor.read_u16()?;
        if number_of_contours > i16::MAX as u16 {
            // Composite glyph
            let header = cursor.read_byte_array::<8>()?;
            let mut has_more_components = true;
            let mut components = Vec::with_capacity(1);
            while has_more_components {
                let (component, new_has_more_components) = GlyphComponent::new(&mut cursor)?;
                components.push(component);
                has_more_components = new_has_more_components;
            }
            Ok(Self::Composite {
                header,
                components,
                instructions: cursor.bytes,
            })
        } else {
            // Simple glyph
            Ok(Self::Simple(Cow::Borrowed(raw.bytes)))
        }
    }

    /// Removes TrueType instructions from this glyph.
    pub(crate) fn strip_instructions(&mut self) -> Result<(), ParseError> {
        const WE_HAVE_INSTRUCTIONS: u16 = 0x0100;

        match self {
            Self::Empty => {}
            Self::Simple(bytes) => {
                let mut cursor = Cursor::new(bytes.as_ref(), None);
                let contour_count = cursor.read_u16()?;
                cursor.skip(8 + 2 * usize::from(contour_count))?; // bbox, endPtsOfContours
                let instructions_start = bytes.len() - cursor.bytes.len();
                let instructions_len = usize::from(cursor.read_u16()?);
                cursor.skip(instructions_len)?;
                if instructions_len > 0 {
                    let instructions_end = instructions_start + 2 + instructions_len;
                    let mut stripped = Vec::with_capacity(bytes.len() - instructions_len);
                    stripped.extend_from_slice(&bytes[..instructions_start]);
                    stripped.extend_from_slice(&[0, 0]);
                    stripped.extend_from_slice(&bytes[instructions_end..]);
                    *bytes = Cow::Owned(stripped);
                }
            }
            Self::Composite {
                components,
                instructions,
                ..
            } => {
                for component in components {
                    component.flags &= !WE_HAVE_INSTRUCTIONS;
                }
                *instructions = &[];
            }
        }
        Ok(())
    }

    /// Indices of glyphs this glyph is composed of.
    pub(crate) fn component_indices(&self) -> impl Iterator<Item = u16> + '_ {
        let components = match self {
            Self::Composite { components, .. } => components.as_slice(),
            Self::Empty | Self::Simple(_) => &[],
        };
        components.iter().map(|component| component.glyph_idx)
    }

    pub(crate) fn remap_components(&mut self, mut map: impl FnMut(u16) -> u16) {
        if let Self::Composite { components, .. } = self {
            for component in components {
                component.glyph_idx = map(component.glyph_idx);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct GlyphComponent {
    pub(crate) flags: u16,
    pub(crate) glyph_idx: u16,
    pub(crate) args: GlyphComponentArgs,
    pub(crate) transform: TransformData,
}

impl GlyphComponent {
    fn new(cursor: &mut Cursor<'_>) -> Result<(Self, bool), ParseError> {
        const ARG_1_AND_2_ARE_WORDS: u16 = 0x0001;
        const WE_HAVE_A_SCALE: u16 = 0x008;
        const MORE_COMPONENTS: u16 = 0x0020;
        const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 0x0040;
        const WE_HAVE_A_TWO_BY_TWO: u16 = 0x0080;

        let flags = cursor.read_u16()?;
        let glyph_idx = cursor.read_u16()?;
        let args = if flags & ARG_1_AND_2_ARE_WORDS != 0 {
            GlyphComponentArgs::U32(cursor.read_u32()?)
        } else {
            GlyphComponentArgs::U16(cursor.read_u16()?)
        };
        let transform = if flags & WE_HAVE_A_SCALE != 0 {
            TransformData::Scale(cursor.read_u16()?)
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            TransformData::TwoScales([cursor.read_u16()?, cursor.read_u16()?])
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            TransformData::Affine([
                cursor.read_u16()?,
                cursor.read_u16()?,
                cursor.read_u16()?,
                cursor.read_u16()?,
            ])
        } else {
            TransformData::None
        };
        let this = Self {
            flags,
            glyph_idx,
            args,
            transform,
        };

        let has_more_components = flags & MORE_COMPONENTS != 0;
        Ok((this, has_more_components))
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum GlyphComponentArgs {
    U16(u16),
    U32(u32),
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum TransformData {
    None,
    Scale(u16),
    TwoScales([u16; 2]),
    Affine([u16; 4]),
}

/// [`Glyph`] together with metrics read from the `hmtx` and (optionally) `vmtx` tables.
#[derive(Debug, Clone)]
pub(crate) struct GlyphRecord<'a> {
    pub(crate) outline: Glyph<'a>,
    pub(crate) horizontal: Metric,
    pub(crate) vertical: Option<Metric>,
}

impl GlyphRecord<'_> {
    /// Placeholder for a glyph slot that is not retained when glyph IDs are kept as-is.
    pub(crate) fn placeholder(has_vertical_metrics: bool) -> Self {
        Self {
            outline: Glyph::Empty,
            horizontal: Metric::default(),
            vertical: has_vertical_metrics.then(Metric::default),
        }
    }
}
