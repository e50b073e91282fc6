//! PalmDB container: the outer record-table framing every MOBI file is
//! wrapped in.

use crate::error::{MobiError, Result};
use crate::io::{Reader, Writer};

const HEADER_LEN: usize = 78;
const RECORD_ENTRY_LEN: usize = 8;
pub(crate) const TYPE_BOOK: &[u8] = b"BOOK";
pub(crate) const CREATOR_MOBI: &[u8] = b"MOBI";

/// One raw record in the PalmDB record table. Offsets are never stored —
/// they are recomputed from the record's position in `PalmDb::records` at
/// write time.
#[derive(Debug, Clone, Default)]
pub(crate) struct PalmDbRecord {
    pub(crate) attributes: u8,
    /// 24-bit unique id.
    pub(crate) uid: u32,
    pub(crate) content: Vec<u8>,
}

/// The PalmDB container: a fixed header plus an ordered list of records.
#[derive(Debug, Clone)]
pub(crate) struct PalmDb {
    pub(crate) name: String,
    pub(crate) attributes: u16,
    pub(crate) version: u16,
    pub(crate) ctime: u32,
    pub(crate) mtime: u32,
    pub(crate) btime: u32,
    pub(crate) mod_num: u32,
    pub(crate) appinfo_offset: u32,
    pub(crate) sortinfo_offset: u32,
    pub(crate) uid: u32,
    pub(crate) next_rec: u32,
    pub(crate) records: Vec<PalmDbRecord>,
}

impl Default for PalmDb {
    fn default() -> PalmDb {
        PalmDb {
            name: String::new(),
            attributes: 0,
            version: 0,
            ctime: 0,
            mtime: 0,
            btime: 0,
            mod_num: 0,
            appinfo_offset: 0,
            sortinfo_offset: 0,
            uid: 0,
            next_rec: 0,
            records: Vec::new(),
        }
    }
}

impl PalmDb {
    pub(crate) fn read(bytes: &[u8]) -> Result<PalmDb> {
        if bytes.len() < HEADER_LEN {
            return Err(MobiError::MalformedContainer(format!(
                "palmdb header needs {} bytes, got {}",
                HEADER_LEN,
                bytes.len()
            )));
        }
        let mut r = Reader::new(bytes);
        let name = r.read_fixed_string(32)?;
        let attributes = r.read_u16_be()?;
        let version = r.read_u16_be()?;
        let ctime = r.read_u32_be()?;
        let mtime = r.read_u32_be()?;
        let btime = r.read_u32_be()?;
        let mod_num = r.read_u32_be()?;
        let appinfo_offset = r.read_u32_be()?;
        let sortinfo_offset = r.read_u32_be()?;
        r.expect_magic("palmdb.type", TYPE_BOOK)?;
        r.expect_magic("palmdb.creator", CREATOR_MOBI)?;
        let uid = r.read_u32_be()?;
        let next_rec = r.read_u32_be()?;
        let record_count = r.read_u16_be()?;

        log::debug!(
            "palmdb header: name={:?} records={}",
            name,
            record_count
        );

        let mut offsets = Vec::with_capacity(record_count as usize);
        let mut records = Vec::with_capacity(record_count as usize);
        for _ in 0..record_count {
            let offset = r.read_u32_be()?;
            let attributes = r.read_u8()?;
            let uid_high = r.read_u8()?;
            let uid_low = r.read_u16_be()?;
            let uid = (u32::from(uid_high) << 16) | u32::from(uid_low);
            offsets.push(offset as usize);
            records.push(PalmDbRecord {
                attributes,
                uid,
                content: Vec::new(),
            });
        }

        for (i, record) in records.iter_mut().enumerate() {
            let start = offsets[i];
            let end = if i + 1 < offsets.len() {
                offsets[i + 1]
            } else {
                bytes.len()
            };
            if end < start {
                return Err(MobiError::MalformedContainer(format!(
                    "record {} has negative computed length ({}..{})",
                    i, start, end
                )));
            }
            if end > bytes.len() {
                return Err(MobiError::MalformedContainer(format!(
                    "record {} extends past EOF ({} > {})",
                    i,
                    end,
                    bytes.len()
                )));
            }
            record.content = bytes[start..end].to_vec();
        }

        Ok(PalmDb {
            name,
            attributes,
            version,
            ctime,
            mtime,
            btime,
            mod_num,
            appinfo_offset,
            sortinfo_offset,
            uid,
            next_rec,
            records,
        })
    }

    pub(crate) fn write(&self) -> Vec<u8> {
        let dir_end = HEADER_LEN + self.records.len() * RECORD_ENTRY_LEN;
        let mut offsets = Vec::with_capacity(self.records.len());
        let mut running = dir_end;
        for record in &self.records {
            offsets.push(running as u32);
            running += record.content.len();
        }

        let mut w = Writer::new();
        w.write_fixed_string(&self.name, 32);
        w.write_u16_be(self.attributes);
        w.write_u16_be(self.version);
        w.write_u32_be(self.ctime);
        w.write_u32_be(self.mtime);
        w.write_u32_be(self.btime);
        w.write_u32_be(self.mod_num);
        w.write_u32_be(self.appinfo_offset);
        w.write_u32_be(self.sortinfo_offset);
        w.write_bytes(TYPE_BOOK);
        w.write_bytes(CREATOR_MOBI);
        w.write_u32_be(self.uid);
        w.write_u32_be(self.next_rec);
        w.write_u16_be(self.records.len() as u16);

        for (record, &offset) in self.records.iter().zip(&offsets) {
            w.write_u32_be(offset);
            w.write_u8(record.attributes);
            w.write_u8(((record.uid >> 16) & 0xFF) as u8);
            w.write_u16_be((record.uid & 0xFFFF) as u16);
        }

        for record in &self.records {
            w.write_bytes(&record.content);
        }

        debug_assert_eq!(w.bytes_written(), dir_end + self.records.iter().map(|r| r.content.len()).sum::<usize>());
        w.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PalmDb {
        PalmDb {
            name: "test-book".to_string(),
            version: 0,
            uid: 42,
            records: vec![
                PalmDbRecord {
                    attributes: 0,
                    uid: 0,
                    content: vec![1, 2, 3, 4],
                },
                PalmDbRecord {
                    attributes: 0,
                    uid: 1,
                    content: vec![5, 6],
                },
            ],
            ..PalmDb::default()
        }
    }

    #[test]
    fn round_trips() {
        let db = sample();
        let bytes = db.write();
        let parsed = PalmDb::read(&bytes).unwrap();
        assert_eq!(parsed.name, "test-book");
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].content, vec![1, 2, 3, 4]);
        assert_eq!(parsed.records[1].content, vec![5, 6]);
        assert_eq!(parsed.records[1].uid, 1);
    }

    #[test]
    fn directory_offsets_match_body_offsets() {
        let db = sample();
        let bytes = db.write();
        assert!(bytes.len() >= HEADER_LEN + 8 * db.records.len());

        let mut r = Reader::new(&bytes);
        r.set_position(76);
        let record_count = r.read_u16_be().unwrap();
        assert_eq!(record_count, 2);
        let first_offset = r.read_u32_be().unwrap();
        assert_eq!(first_offset as usize, HEADER_LEN + 2 * 8);
    }

    #[test]
    fn rejects_short_header() {
        assert!(PalmDb::read(&[0; 10]).is_err());
    }

    #[test]
    fn rejects_wrong_type_creator() {
        let mut bytes = sample().write();
        bytes[60] = b'X'; // inside the "BOOK" field
        assert!(matches!(
            PalmDb::read(&bytes),
            Err(MobiError::UnsupportedMagic { .. })
        ));
    }
}
