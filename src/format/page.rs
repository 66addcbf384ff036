//! Defines the fixed-layout page header emitted in front of every page.
//! This module is the single source of truth for serializing page headers and
//! for parsing them back when inspecting a written column chunk.
//!
//! Layout (all integers little-endian):
//! `magic(2) | page_type(1) | uncompressed(4) | compressed(4) | num_values(4)`
//! followed, for data pages, by `encoding(1) | def_encoding(1) | rep_encoding(1)`
//! and, for dictionary pages, by `encoding(1) | is_sorted(1)`.

use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read, Write};

use crate::error::TambakError;

//==================================================================================
// Format Constants
//==================================================================================
/// The magic number identifying a page header.
pub const PAGE_HEADER_MAGIC: &[u8; 2] = b"PG";
const DATA_PAGE_HEADER_SIZE: usize = 18;
const DICTIONARY_PAGE_HEADER_SIZE: usize = 17;

//==================================================================================
// Public Enums & Structs
//==================================================================================

/// Page types; the discriminants match the Parquet ids.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    DataPage = 0,
    DictionaryPage = 2,
}

/// Value encodings; the discriminants match the Parquet ids.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Encoding {
    Plain = 0,
    Rle = 3,
    RleDictionary = 8,
}

impl Encoding {
    fn from_u8(v: u8) -> Result<Self, TambakError> {
        match v {
            0 => Ok(Self::Plain),
            3 => Ok(Self::Rle),
            8 => Ok(Self::RleDictionary),
            other => Err(TambakError::FormatError(format!("unknown encoding id {}", other))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPageHeader {
    /// Number of level slots in the page, nulls and empty lists included.
    pub num_values: i32,
    pub encoding: Encoding,
    pub definition_level_encoding: Encoding,
    pub repetition_level_encoding: Encoding,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryPageHeader {
    pub num_values: i32,
    pub encoding: Encoding,
    pub is_sorted: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Data(DataPageHeader),
    Dictionary(DictionaryPageHeader),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub uncompressed_page_size: i32,
    pub compressed_page_size: i32,
    pub kind: PageKind,
}

//==================================================================================
// Core Implementation
//==================================================================================

impl PageHeader {
    pub fn data(num_values: i32, encoding: Encoding) -> Self {
        Self {
            uncompressed_page_size: 0,
            compressed_page_size: 0,
            kind: PageKind::Data(DataPageHeader {
                num_values,
                encoding,
                definition_level_encoding: Encoding::Rle,
                repetition_level_encoding: Encoding::Rle,
            }),
        }
    }

    pub fn dictionary(num_values: i32) -> Self {
        Self {
            uncompressed_page_size: 0,
            compressed_page_size: 0,
            kind: PageKind::Dictionary(DictionaryPageHeader {
                num_values,
                encoding: Encoding::Plain,
                is_sorted: false,
            }),
        }
    }

    pub fn page_type(&self) -> PageType {
        match self.kind {
            PageKind::Data(_) => PageType::DataPage,
            PageKind::Dictionary(_) => PageType::DictionaryPage,
        }
    }

    /// The value encoding recorded in the column chunk's encoding list.
    pub fn encoding(&self) -> Encoding {
        match self.kind {
            PageKind::Data(h) => h.encoding,
            PageKind::Dictionary(h) => h.encoding,
        }
    }

    pub fn serialized_size(&self) -> usize {
        match self.kind {
            PageKind::Data(_) => DATA_PAGE_HEADER_SIZE,
            PageKind::Dictionary(_) => DICTIONARY_PAGE_HEADER_SIZE,
        }
    }

    /// Serializes the header into its canonical byte layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialized_size());
        buf.extend_from_slice(PAGE_HEADER_MAGIC);
        buf.push(self.page_type() as u8);
        buf.extend_from_slice(&self.uncompressed_page_size.to_le_bytes());
        buf.extend_from_slice(&self.compressed_page_size.to_le_bytes());
        match self.kind {
            PageKind::Data(h) => {
                buf.extend_from_slice(&h.num_values.to_le_bytes());
                buf.push(h.encoding as u8);
                buf.push(h.definition_level_encoding as u8);
                buf.push(h.repetition_level_encoding as u8);
            }
            PageKind::Dictionary(h) => {
                buf.extend_from_slice(&h.num_values.to_le_bytes());
                buf.push(h.encoding as u8);
                buf.push(h.is_sorted as u8);
            }
        }
        buf
    }

    /// Writes the serialized header to `writer`, returning the number of bytes written.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<usize, TambakError> {
        let bytes = self.to_bytes();
        writer.write_all(&bytes)?;
        Ok(bytes.len())
    }

    /// Parses a header from the start of `bytes`, returning it together with
    /// the number of bytes consumed.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize), TambakError> {
        let mut cursor = Cursor::new(bytes);
        let map_err = |e: std::io::Error| TambakError::FormatError(e.to_string());

        let mut magic_buf = [0u8; 2];
        cursor.read_exact(&mut magic_buf).map_err(map_err)?;
        if magic_buf != *PAGE_HEADER_MAGIC {
            return Err(TambakError::FormatError("Invalid page header magic number".into()));
        }

        let mut u8_buf = [0u8; 1];
        let mut i32_buf = [0u8; 4];
        cursor.read_exact(&mut u8_buf).map_err(map_err)?;
        let page_type = u8_buf[0];
        cursor.read_exact(&mut i32_buf).map_err(map_err)?;
        let uncompressed_page_size = i32::from_le_bytes(i32_buf);
        cursor.read_exact(&mut i32_buf).map_err(map_err)?;
        let compressed_page_size = i32::from_le_bytes(i32_buf);
        cursor.read_exact(&mut i32_buf).map_err(map_err)?;
        let num_values = i32::from_le_bytes(i32_buf);

        let kind = match page_type {
            0 => {
                let mut enc = [0u8; 3];
                cursor.read_exact(&mut enc).map_err(map_err)?;
                PageKind::Data(DataPageHeader {
                    num_values,
                    encoding: Encoding::from_u8(enc[0])?,
                    definition_level_encoding: Encoding::from_u8(enc[1])?,
                    repetition_level_encoding: Encoding::from_u8(enc[2])?,
                })
            }
            2 => {
                let mut enc = [0u8; 2];
                cursor.read_exact(&mut enc).map_err(map_err)?;
                PageKind::Dictionary(DictionaryPageHeader {
                    num_values,
                    encoding: Encoding::from_u8(enc[0])?,
                    is_sorted: enc[1] != 0,
                })
            }
            other => {
                return Err(TambakError::FormatError(format!("unknown page type {}", other)))
            }
        };

        let header = Self {
            uncompressed_page_size,
            compressed_page_size,
            kind,
        };
        Ok((header, cursor.position() as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_header_layout() {
        let mut header = PageHeader::data(5, Encoding::Plain);
        header.uncompressed_page_size = 40;
        header.compressed_page_size = 33;
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), header.serialized_size());
        assert_eq!(&bytes[0..3], b"PG\x00");
        assert_eq!(&bytes[3..7], &40i32.to_le_bytes());
        let (parsed, consumed) = PageHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_dictionary_header_parses_from_stream_prefix() {
        let header = PageHeader::dictionary(3);
        let mut stream = header.to_bytes();
        stream.extend_from_slice(&[9, 9, 9]);
        let (parsed, consumed) = PageHeader::from_bytes(&stream).unwrap();
        assert_eq!(parsed.page_type(), PageType::DictionaryPage);
        assert_eq!(parsed.encoding(), Encoding::Plain);
        assert_eq!(consumed, DICTIONARY_PAGE_HEADER_SIZE);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let err = PageHeader::from_bytes(b"XX\x00\x00").unwrap_err();
        assert!(matches!(err, TambakError::FormatError(_)));
    }
}
