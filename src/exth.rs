//! EXTH ("Extended Header") metadata block: a tagged key/value list embedded
//! in the MOBI record-0 header.

use crate::error::Result;
use crate::io::{Reader, Writer};

pub const TAG_AUTHOR: u32 = 100;
pub const TAG_PUBLISHER: u32 = 101;
pub const TAG_DESCRIPTION: u32 = 103;
pub const TAG_SUBJECT: u32 = 105;
pub const TAG_PUBLISH_DATE: u32 = 106;
pub const TAG_RIGHTS: u32 = 109;
pub const TAG_KF8_BOUNDARY: u32 = 121;
pub const CREATOR_SOFTWARE_TAGS: [u32; 5] = [204, 205, 206, 207, 535];

/// One tagged key/value record inside an EXTH block.
#[derive(Debug, Clone, PartialEq)]
pub struct ExthRecord {
    pub tag: u32,
    pub data: Vec<u8>,
}

impl ExthRecord {
    pub fn string(tag: u32, value: &str) -> ExthRecord {
        ExthRecord {
            tag,
            data: value.as_bytes().to_vec(),
        }
    }

    pub fn u32(tag: u32, value: u32) -> ExthRecord {
        ExthRecord {
            tag,
            data: value.to_be_bytes().to_vec(),
        }
    }

    pub fn as_str(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    pub fn as_u32(&self) -> Option<u32> {
        if self.data.len() == 4 {
            Some(u32::from_be_bytes([self.data[0], self.data[1], self.data[2], self.data[3]]))
        } else {
            None
        }
    }
}

/// An ordered, repeatable list of EXTH records — the model is intentionally
/// a flat `Vec` (not a map) because tags like `Subject` (105) repeat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exth {
    pub records: Vec<ExthRecord>,
}

impl Exth {
    /// Parses an EXTH block starting at absolute offset `start` within
    /// the enclosing record-0 buffer. Returns the parsed block and its
    /// total byte length (header + all record bodies), unpadded.
    pub(crate) fn parse(data: &[u8], start: usize) -> Result<(Exth, usize)> {
        let mut r = Reader::new(&data[start..]);
        r.expect_magic("exth.magic", b"EXTH")?;
        let length = r.read_u32_be()?;
        let record_count = r.read_u32_be()?;

        let mut records = Vec::with_capacity(record_count as usize);
        for _ in 0..record_count {
            let tag = r.read_u32_be()?;
            let total_len = r.read_u32_be()?;
            let data = r.read_vec(total_len as usize - 8)?;
            log::trace!("exth record tag={} len={}", tag, data.len());
            records.push(ExthRecord { tag, data });
        }

        Ok((Exth { records }, length as usize))
    }

    /// Serializes the block, including the "EXTH" magic and header, padded
    /// to a multiple of 4 bytes as the format requires.
    pub(crate) fn write(&self) -> Vec<u8> {
        let mut body = Writer::new();
        for record in &self.records {
            body.write_u32_be(record.tag);
            body.write_u32_be(record.data.len() as u32 + 8);
            body.write_bytes(&record.data);
        }
        let body = body.into_bytes();

        let unpadded_len = 12 + body.len();
        let padding = (4 - unpadded_len % 4) % 4;

        let mut w = Writer::new();
        w.write_bytes(b"EXTH");
        w.write_u32_be((unpadded_len + padding) as u32);
        w.write_u32_be(self.records.len() as u32);
        w.write_bytes(&body);
        w.write_zeros(padding);
        w.into_bytes()
    }

    pub(crate) fn get(&self, tag: u32) -> Option<&ExthRecord> {
        self.records.iter().find(|r| r.tag == tag)
    }

    pub(crate) fn get_all(&self, tag: u32) -> Vec<&ExthRecord> {
        self.records.iter().filter(|r| r.tag == tag).collect()
    }

    pub(crate) fn set_single(&mut self, tag: u32, value: ExthRecord) {
        self.records.retain(|r| r.tag != tag);
        self.records.push(value);
    }

    pub(crate) fn remove(&mut self, tag: u32) {
        self.records.retain(|r| r.tag != tag);
    }

    pub(crate) fn set_repeated(&mut self, tag: u32, values: impl IntoIterator<Item = String>) {
        self.remove(tag);
        for v in values {
            self.records.push(ExthRecord::string(tag, &v));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_repeated_tag() {
        let mut exth = Exth::default();
        exth.set_single(TAG_AUTHOR, ExthRecord::string(TAG_AUTHOR, "Sarah White"));
        exth.set_repeated(
            TAG_SUBJECT,
            ["AsciiDoc", "Asciidoctor"].iter().map(|s| s.to_string()),
        );
        exth.set_single(TAG_KF8_BOUNDARY, ExthRecord::u32(TAG_KF8_BOUNDARY, 42));

        let mut buf = vec![0u8; 4];
        buf.extend(exth.write());

        let (parsed, len) = Exth::parse(&buf, 4).unwrap();
        assert_eq!(len, buf.len() - 4);
        assert_eq!(parsed.get(TAG_AUTHOR).unwrap().as_str(), "Sarah White");
        assert_eq!(parsed.get_all(TAG_SUBJECT).len(), 2);
        assert_eq!(parsed.get(TAG_KF8_BOUNDARY).unwrap().as_u32(), Some(42));
    }

    #[test]
    fn write_is_padded_to_four_bytes() {
        let mut exth = Exth::default();
        exth.set_single(TAG_RIGHTS, ExthRecord::string(TAG_RIGHTS, "abc"));
        let bytes = exth.write();
        assert_eq!(bytes.len() % 4, 0);
    }
}
