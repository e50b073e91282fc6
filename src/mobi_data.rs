//! One MOBI6 or KF8 data unit: header, EXTH, flow, and reconstructed parts.
//! Ties together `mobi_header`, `exth`, `fdst`, `index`, and `parts`.
//!
//! Every record index carried in here (`image_index`, `fdst_index`,
//! `skel_index`, ...) is relative to this unit's own record 0 (or KF8
//! boundary record) — never to the enclosing PalmDB's absolute record list.
//! Translating to absolute PalmDB offsets is the façade's job.

use crate::error::{MobiError, Result};
use crate::exth::Exth;
use crate::fdst::{self, Fdst};
use crate::index::Index;
use crate::io::{Reader, Writer};
use crate::mobi_header::{self, MobiHeader, PalmDocPreamble};
use crate::parts;

const SKEL_SCHEMA: [(u8, u8); 2] = [(1, 1), (6, 2)];
const FRAG_SCHEMA: [(u8, u8); 1] = [(6, 2)];

#[derive(Debug, Clone, PartialEq)]
pub struct MobiData {
    pub mobi_type: u32,
    pub text_encoding: u32,
    pub uid: u32,
    pub version: u32,
    pub full_name: String,
    pub min_version: u32,
    pub image_index: Option<u32>,
    pub exth: Exth,
    pub flow: Vec<Vec<u8>>,
    /// SKEL+FRAG part boundaries. Only representable for KF8 units
    /// (`version >= 8`) via the SKEL/FRAG index pair — MOBI6 has no such
    /// index, so on write a MOBI6 unit's text is always just `flow[0]`, and
    /// any `parts` content beyond that single slice is dropped (logged, not
    /// silently lost).
    pub parts: Vec<Vec<u8>>,
}

impl Default for MobiData {
    fn default() -> MobiData {
        MobiData {
            mobi_type: 2,
            text_encoding: 65001,
            uid: 0,
            version: 6,
            full_name: String::new(),
            min_version: 6,
            image_index: None,
            exth: Exth::default(),
            flow: Vec::new(),
            parts: Vec::new(),
        }
    }
}

impl MobiData {
    /// Parses one unit out of `records`, where `records[0]` is this unit's
    /// own header record (record 0 for MOBI6, the KF8 boundary record for
    /// KF8).
    pub(crate) fn read(records: &[&[u8]]) -> Result<MobiData> {
        let header_record = *records
            .first()
            .ok_or_else(|| MobiError::MalformedContainer("mobi data unit has no records".into()))?;

        let mut r = Reader::new(header_record);
        let preamble = PalmDocPreamble::parse(&mut r)?;
        let header = MobiHeader::parse(&mut r)?;

        let exth = match header.exth_offset {
            Some(offset) => Exth::parse(header_record, offset as usize)?.0,
            None => Exth::default(),
        };

        let mut concatenated = Vec::new();
        for i in 0..preamble.text_record_count as usize {
            let record = records.get(1 + i).ok_or_else(|| {
                MobiError::MalformedContainer(format!("missing text record {}", i))
            })?;
            concatenated.extend_from_slice(mobi_header::strip_trailing_entries(record, header.extra_flags));
        }

        let fdst = match header.fdst_index {
            Some(idx) => {
                let record = records.get(idx as usize).ok_or_else(|| {
                    MobiError::MalformedContainer("fdst_index points past end of records".into())
                })?;
                Some(Fdst::parse(record)?)
            }
            None => None,
        };
        let flow = fdst::compute_flow(&concatenated, header.fdst_index, header.fdst_section_count, fdst.as_ref())?;

        let parts = match (header.skel_index, header.frag_index) {
            (Some(skel_idx), Some(frag_idx)) => {
                let skel_records = records.get(skel_idx as usize..).ok_or_else(|| {
                    MobiError::MalformedContainer("skel_index points past end of records".into())
                })?;
                let frag_records = records.get(frag_idx as usize..).ok_or_else(|| {
                    MobiError::MalformedContainer("frag_index points past end of records".into())
                })?;
                let skel = Index::read(skel_records, "SKEL")?;
                let frag = Index::read(frag_records, "FRAG")?;
                match flow.first() {
                    Some(raw) => parts::reconstruct(raw, &skel.entries, &frag.entries)?,
                    None => Vec::new(),
                }
            }
            _ => flow.first().cloned().into_iter().collect(),
        };

        Ok(MobiData {
            mobi_type: header.mobi_type,
            text_encoding: header.text_encoding,
            uid: header.uid,
            version: header.version,
            full_name: header.full_name,
            min_version: header.min_version,
            image_index: header.image_index,
            exth,
            flow,
            parts,
        })
    }

    /// Encodes this unit into a self-relative record list (index 0 = this
    /// unit's own header record). `self.image_index` is trusted verbatim —
    /// the façade is responsible for setting it before calling `write`.
    pub(crate) fn write(&self) -> Result<Vec<Vec<u8>>> {
        let use_indices = self.version >= 8 && !self.parts.is_empty();
        let (flow0, skel_entries, frag_entries) = if use_indices {
            parts::split(&self.parts)
        } else {
            if self.version < 8 {
                let single_part: Vec<Vec<u8>> = self.flow.first().cloned().into_iter().collect();
                if self.parts != single_part {
                    log::warn!(
                        "MOBI6 unit has {} part(s) beyond its single text flow; only flow[0] is writable and the rest is dropped",
                        self.parts.len()
                    );
                }
            }
            (self.flow.first().cloned().unwrap_or_default(), Vec::new(), Vec::new())
        };

        let mut flow = vec![flow0];
        if self.flow.len() > 1 {
            flow.extend(self.flow[1..].iter().cloned());
        }
        let concatenated: Vec<u8> = flow.concat();
        let fdst = fdst::build_fdst(&flow);

        let text_record_count: u16 = if concatenated.is_empty() { 0 } else { 1 };
        let mut position = 1u32;

        let fdst_index = fdst.as_ref().map(|_| {
            let idx = position;
            position += 1;
            idx
        });

        let (skel_index, frag_index, skel_records, frag_records) = if use_indices {
            let skel_idx = position;
            let skel_records = Index {
                name: "SKEL",
                entries: skel_entries,
            }
            .write(&SKEL_SCHEMA, 0)?;
            position += skel_records.len() as u32;

            let frag_idx = position;
            let frag_records = Index {
                name: "FRAG",
                entries: frag_entries,
            }
            .write(&FRAG_SCHEMA, 0)?;
            position += frag_records.len() as u32;

            (Some(skel_idx), Some(frag_idx), skel_records, frag_records)
        } else {
            (None, None, Vec::new(), Vec::new())
        };

        let fcis_index = position;
        position += 1;
        let flis_index = position;
        position += 1;
        let _ = position;

        let exth_bytes = self.exth.write();
        let header = MobiHeader {
            mobi_type: self.mobi_type,
            text_encoding: self.text_encoding,
            uid: self.uid,
            version: self.version,
            full_name: self.full_name.clone(),
            min_version: self.min_version,
            image_index: self.image_index,
            fdst_index,
            fdst_section_count: fdst.as_ref().map(|f| f.ranges.len() as u32).unwrap_or(0),
            mobi6_last_text_index: text_record_count.saturating_sub(1),
            extra_flags: 0,
            frag_index,
            skel_index,
            fcis_index: Some(fcis_index),
            fcis_count: 1,
            flis_index: Some(flis_index),
            flis_count: 1,
            exth_offset: None,
            header_length: mobi_header::HEADER_LEN,
        };

        let mut w = Writer::new();
        let preamble = PalmDocPreamble {
            compression: 1,
            text_length: concatenated.len() as u32,
            text_record_count,
            text_record_size: concatenated.len().min(u16::MAX as usize) as u16,
            encryption: 0,
        };
        preamble.write(&mut w);
        header.write(&mut w, exth_bytes.len());
        w.write_bytes(&exth_bytes);
        w.write_bytes(self.full_name.as_bytes());
        w.write_u8(0);

        let mut out = vec![w.into_bytes()];
        if !concatenated.is_empty() {
            out.push(concatenated);
        }
        if let Some(f) = &fdst {
            out.push(f.write());
        }
        out.extend(skel_records);
        out.extend(frag_records);
        out.push(fcis_record(preamble.text_length));
        out.push(flis_record());

        Ok(out)
    }
}

/// Fixed 36-byte FCIS template carrying the unit's text length.
fn fcis_record(text_length: u32) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_bytes(b"FCIS");
    w.write_u32_be(20);
    w.write_u32_be(16);
    w.write_u32_be(1);
    w.write_u32_be(0);
    w.write_u32_be(text_length);
    w.write_u32_be(0);
    w.write_u32_be(32);
    w.write_u32_be(8);
    w.into_bytes()
}

/// Fixed 36-byte FLIS template. This implementation's readers never inspect
/// FLIS content.
fn flis_record() -> Vec<u8> {
    let mut w = Writer::new();
    w.write_bytes(b"FLIS");
    w.write_u32_be(8);
    w.write_u32_be(0x41);
    w.write_u32_be(0);
    w.write_u32_be(0);
    w.write_u32_be(0xFFFF_FFFF);
    w.write_u32_be(1);
    w.write_u32_be(0);
    w.write_u32_be(0xFFFF_FFFF);
    w.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_unit_round_trips() {
        let data = MobiData::default();
        let records = data.write().unwrap();
        let refs: Vec<&[u8]> = records.iter().map(|v| v.as_slice()).collect();
        let parsed = MobiData::read(&refs).unwrap();
        assert_eq!(parsed.full_name, "");
        assert!(parsed.flow.is_empty());
        assert!(parsed.parts.is_empty());
    }

    #[test]
    fn mobi6_unit_with_single_part_round_trips() {
        let mut data = MobiData::default();
        data.full_name = "Sample Book".to_string();
        data.flow = vec![b"<html><body>hello</body></html>".to_vec()];
        data.parts = data.flow.clone();

        let records = data.write().unwrap();
        let refs: Vec<&[u8]> = records.iter().map(|v| v.as_slice()).collect();
        let parsed = MobiData::read(&refs).unwrap();

        assert_eq!(parsed.full_name, "Sample Book");
        assert_eq!(parsed.flow, data.flow);
        assert_eq!(parsed.parts, data.flow);
    }

    #[test]
    fn kf8_unit_with_multiple_parts_round_trips_via_skel_frag() {
        let mut data = MobiData::default();
        data.version = 8;
        data.min_version = 8;
        data.full_name = "KF8 Sample".to_string();
        data.parts = vec![
            b"<p>part one</p>".to_vec(),
            b"<p>part two</p>".to_vec(),
            b"<p>part three</p>".to_vec(),
        ];

        let records = data.write().unwrap();
        let refs: Vec<&[u8]> = records.iter().map(|v| v.as_slice()).collect();
        let parsed = MobiData::read(&refs).unwrap();

        assert_eq!(parsed.parts, data.parts);
    }
}
