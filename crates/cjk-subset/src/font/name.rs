//! `name` table records.

use super::{Cursor, TableTag};
use crate::{errors::ParseErrorKind, ParseError};

#[derive(Debug, Clone, Copy)]
pub(crate) struct NameRecord<'a> {
    pub(crate) platform_id: u16,
    pub(crate) encoding_id: u16,
    pub(crate) language_id: u16,
    pub(crate) name_id: u16,
    pub(crate) string: &'a [u8],
}

/// Format 0 `name` table. Format 1 tables (with language tags) are not parsed.
#[derive(Debug)]
pub(crate) struct NameTable<'a> {
    pub(crate) records: Vec<NameRecord<'a>>,
}

impl<'a> NameTable<'a> {
    pub(crate) fn parse(bytes: &'a [u8]) -> Result<Self, ParseError> {
        let table = Cursor::new(bytes, Some(TableTag::NAME));
        let mut cursor = table;
        cursor.read_u16_checked(|format| {
            if format == 0 {
                Ok(())
            } else {
                Err(ParseErrorKind::UnexpectedTableFormat(format))
            }
        })?;
        let count = cursor.read_u16()?;
        let storage = table.at(cursor.read_u16()?.into())?;

        let records = (0..count).map(|_| {
            let platform_id = cursor.read_u16()?;
            let encoding_id = cursor.read_u16()?;
            let language_id = cursor.read_u16()?;
            let name_id = cursor.read_u16()?;
            let len = usize::from(cursor.read_u16()?);
            let offset = usize::from(cursor.read_u16()?);
            Ok(NameRecord {
                platform_id,
                encoding_id,
                language_id,
                name_id,
                string: storage.range(offset..offset + len)?.bytes,
            })
        });
        Ok(Self {
            records: records.collect::<Result<_, ParseError>>()?,
        })
    }
}
