//! The 16-byte PalmDOC-style preamble and the "MOBI" record-0 header that
//! follows it.

use crate::error::{MobiError, Result};
use crate::io::{Reader, Writer};

const UNSET: u32 = 0xFFFF_FFFF;
const UNSET16: u16 = 0xFFFF;
pub(crate) const HEADER_LEN: u32 = 264;
const EXTH_ON_FLAG: u32 = 0x40;

// Offsets below are relative to the 'M' of the "MOBI" magic.
const OFF_MOBI_TYPE: u64 = 8;
const OFF_TEXT_ENCODING: u64 = 12;
const OFF_UID: u64 = 16;
const OFF_VERSION: u64 = 20;
const OFF_FIRST_NON_BOOK_INDEX: u64 = 64;
const OFF_FULL_NAME_OFFSET: u64 = 68;
const OFF_FULL_NAME_LENGTH: u64 = 72;
const OFF_MIN_VERSION: u64 = 76;
const OFF_IMAGE_INDEX: u64 = 80;
const OFF_FDST_SLOT: u64 = 84;
const OFF_FDST_SECTION_COUNT: u64 = 88;
const OFF_EXTRA_FLAGS: u64 = 92;
const OFF_EXTH_FLAGS: u64 = 96;
const OFF_FCIS_INDEX: u64 = 128;
const OFF_FCIS_COUNT: u64 = 132;
const OFF_FLIS_INDEX: u64 = 136;
const OFF_FLIS_COUNT: u64 = 140;
const OFF_FRAG_INDEX: u64 = 144;
const OFF_SKEL_INDEX: u64 = 148;
const PAYLOAD_END: u64 = 152;

fn opt_index(v: u32) -> Option<u32> {
    if v == UNSET {
        None
    } else {
        Some(v)
    }
}

fn index_or_unset(v: Option<u32>) -> u32 {
    v.unwrap_or(UNSET)
}

/// The PalmDOC-style preamble shared by every text record group.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PalmDocPreamble {
    pub(crate) compression: u16,
    pub(crate) text_length: u32,
    pub(crate) text_record_count: u16,
    pub(crate) text_record_size: u16,
    pub(crate) encryption: u16,
}

impl PalmDocPreamble {
    pub(crate) fn parse(r: &mut Reader) -> Result<PalmDocPreamble> {
        let compression = r.read_u16_be()?;
        let _zero = r.read_u16_be()?;
        let text_length = r.read_u32_be()?;
        let text_record_count = r.read_u16_be()?;
        let text_record_size = r.read_u16_be()?;
        let encryption = r.read_u16_be()?;
        let _unknown = r.read_u16_be()?;

        if compression != 1 {
            return Err(MobiError::UnsupportedCompression(compression));
        }
        if encryption != 0 {
            return Err(MobiError::UnsupportedEncryption(encryption));
        }

        Ok(PalmDocPreamble {
            compression,
            text_length,
            text_record_count,
            text_record_size,
            encryption,
        })
    }

    pub(crate) fn write(&self, w: &mut Writer) {
        w.write_u16_be(self.compression);
        w.write_u16_be(0);
        w.write_u32_be(self.text_length);
        w.write_u16_be(self.text_record_count);
        w.write_u16_be(self.text_record_size);
        w.write_u16_be(self.encryption);
        w.write_u16_be(0);
    }
}

/// The MOBI header proper: type/encoding/version plus the pointers to
/// FDST, EXTH, and (for KF8) the SKEL/FRAG indices.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MobiHeader {
    pub(crate) mobi_type: u32,
    pub(crate) text_encoding: u32,
    pub(crate) uid: u32,
    pub(crate) version: u32,
    pub(crate) full_name: String,
    pub(crate) min_version: u32,
    pub(crate) image_index: Option<u32>,
    pub(crate) fdst_index: Option<u32>,
    pub(crate) fdst_section_count: u32,
    /// First half of the dual-use slot for version < 8 ("last text index").
    pub(crate) mobi6_last_text_index: u16,
    pub(crate) extra_flags: u16,
    pub(crate) frag_index: Option<u32>,
    pub(crate) skel_index: Option<u32>,
    pub(crate) fcis_index: Option<u32>,
    pub(crate) fcis_count: u32,
    pub(crate) flis_index: Option<u32>,
    pub(crate) flis_count: u32,
    /// Absolute offset of the EXTH block within record 0, if present.
    pub(crate) exth_offset: Option<u32>,
    /// Header length as actually read from the file.
    pub(crate) header_length: u32,
}

impl MobiHeader {
    /// Parses the header. `r` must be positioned at the "MOBI" magic
    /// (i.e. right after the 16-byte preamble).
    pub(crate) fn parse(r: &mut Reader) -> Result<MobiHeader> {
        let header_start = r.position();
        r.expect_magic("mobi.magic", b"MOBI")?;
        let header_length = r.read_u32_be()?;

        r.set_position(header_start + OFF_MOBI_TYPE);
        let mobi_type = r.read_u32_be()?;
        let text_encoding = r.read_u32_be()?;
        if text_encoding != 65001 {
            return Err(MobiError::UnsupportedTextEncoding(text_encoding));
        }
        let uid = r.read_u32_be()?;
        let version = r.read_u32_be()?;

        r.set_position(header_start + OFF_FIRST_NON_BOOK_INDEX);
        let _first_non_book_index = r.read_u32_be()?;
        let full_name_offset = r.read_u32_be()?;
        let full_name_length = r.read_u32_be()?;
        let min_version = r.read_u32_be()?;
        let image_index = opt_index(r.read_u32_be()?);

        let (fdst_index, mobi6_last_text_index) = if version < 8 {
            let last_text_index = r.read_u16_be()?;
            let fdst_u16 = r.read_u16_be()?;
            let fdst_index = if fdst_u16 == UNSET16 {
                None
            } else {
                Some(u32::from(fdst_u16))
            };
            (fdst_index, last_text_index)
        } else {
            (opt_index(r.read_u32_be()?), UNSET16)
        };
        let fdst_section_count = r.read_u32_be()?;
        let extra_flags = r.read_u16_be()?;

        r.set_position(header_start + OFF_EXTH_FLAGS);
        let exth_flags = r.read_u32_be()?;
        let exth_offset = if exth_flags & EXTH_ON_FLAG != 0 {
            Some(header_start as u32 + header_length)
        } else {
            None
        };

        r.set_position(header_start + OFF_FCIS_INDEX);
        let fcis_index = opt_index(r.read_u32_be()?);
        let fcis_count = r.read_u32_be()?;
        let flis_index = opt_index(r.read_u32_be()?);
        let flis_count = r.read_u32_be()?;

        let (frag_index, skel_index) = if version >= 8 {
            r.set_position(header_start + OFF_FRAG_INDEX);
            (opt_index(r.read_u32_be()?), opt_index(r.read_u32_be()?))
        } else {
            (None, None)
        };

        let full_name = {
            let start = full_name_offset as usize;
            let bytes = r.slice_at(start, full_name_length as usize)?;
            String::from_utf8_lossy(bytes).into_owned()
        };

        log::debug!(
            "mobi header: type={} version={} text_encoding={} name={:?}",
            mobi_type,
            version,
            text_encoding,
            full_name
        );

        Ok(MobiHeader {
            mobi_type,
            text_encoding,
            uid,
            version,
            full_name,
            min_version,
            image_index,
            fdst_index,
            fdst_section_count,
            mobi6_last_text_index,
            extra_flags,
            frag_index,
            skel_index,
            fcis_index,
            fcis_count,
            flis_index,
            flis_count,
            exth_offset,
            header_length,
        })
    }

    /// Writes the fixed 264-byte payload. `exth_len` is the number of bytes
    /// the caller will write for the EXTH block immediately after this
    /// header (used to compute `full_name_offset`).
    pub(crate) fn write(&self, w: &mut Writer, exth_len: usize) {
        let full_name_offset = 16 + HEADER_LEN + exth_len as u32;

        w.write_bytes(b"MOBI");
        w.write_u32_be(HEADER_LEN);
        w.write_u32_be(self.mobi_type);
        w.write_u32_be(self.text_encoding);
        w.write_u32_be(self.uid);
        w.write_u32_be(self.version);
        w.write_zeros((OFF_FIRST_NON_BOOK_INDEX - OFF_VERSION - 4) as usize);
        w.write_u32_be(UNSET); // first_non_book_index: unused by this implementation
        w.write_u32_be(full_name_offset);
        w.write_u32_be(self.full_name.len() as u32);
        w.write_u32_be(self.min_version);
        w.write_u32_be(index_or_unset(self.image_index));

        if self.version < 8 {
            w.write_u16_be(self.mobi6_last_text_index);
            w.write_u16_be(self.fdst_index.map(|v| v as u16).unwrap_or(UNSET16));
        } else {
            w.write_u32_be(index_or_unset(self.fdst_index));
        }
        w.write_u32_be(self.fdst_section_count);
        w.write_u16_be(self.extra_flags);
        w.write_zeros((OFF_EXTH_FLAGS - OFF_EXTRA_FLAGS - 2) as usize); // padding
        w.write_u32_be(EXTH_ON_FLAG); // this writer always emits an EXTH block
        w.write_zeros((OFF_FCIS_INDEX - OFF_EXTH_FLAGS - 4) as usize);
        w.write_u32_be(index_or_unset(self.fcis_index));
        w.write_u32_be(self.fcis_count);
        w.write_u32_be(index_or_unset(self.flis_index));
        w.write_u32_be(self.flis_count);
        if self.version >= 8 {
            w.write_u32_be(index_or_unset(self.frag_index));
            w.write_u32_be(index_or_unset(self.skel_index));
        } else {
            w.write_u32_be(UNSET);
            w.write_u32_be(UNSET);
        }

        let written_payload_bytes = PAYLOAD_END - 8; // everything after magic+header_length
        w.write_zeros((HEADER_LEN as u64 - 8 - written_payload_bytes) as usize);
    }
}

/// Strips per-record trailing metadata and returns the logical text slice.
/// `extra_flags` is the bitmask from the MOBI header.
pub(crate) fn strip_trailing_entries(record: &[u8], extra_flags: u16) -> &[u8] {
    let mut end = record.len();

    for bit in (1..16).rev() {
        if extra_flags & (1 << bit) == 0 {
            continue;
        }
        if end == 0 {
            break;
        }
        let (_, len) = crate::varint::decode_backward(&record[..end], end);
        end = end.saturating_sub(len);
    }

    if extra_flags & 1 != 0 && end > 0 {
        let last_byte = record[end - 1];
        let strip = (last_byte & 0x3) as usize + 1;
        end = end.saturating_sub(strip);
    }

    &record[..end]
}
