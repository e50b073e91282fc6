//! FDST (Flow Demarcation Segment Table): slices the raw text stream into
//! named flows.

use crate::error::{MobiError, Result};
use crate::io::{Reader, Writer};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Fdst {
    pub(crate) data_offset: u32,
    pub(crate) ranges: Vec<(u32, u32)>,
}

impl Fdst {
    pub(crate) fn parse(bytes: &[u8]) -> Result<Fdst> {
        let mut r = Reader::new(bytes);
        r.expect_magic("fdst.magic", b"FDST")?;
        let data_offset = r.read_u32_be()?;
        let section_count = r.read_u32_be()?;
        let mut ranges = Vec::with_capacity(section_count as usize);
        for _ in 0..section_count {
            let start = r.read_u32_be()?;
            let end = r.read_u32_be()?;
            ranges.push((start, end));
        }
        Ok(Fdst { data_offset, ranges })
    }

    pub(crate) fn write(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_bytes(b"FDST");
        w.write_u32_be(self.data_offset);
        w.write_u32_be(self.ranges.len() as u32);
        for &(start, end) in &self.ranges {
            w.write_u32_be(start);
            w.write_u32_be(end);
        }
        w.into_bytes()
    }
}

/// Splits `text` into flows. `fdst_index`/`fdst_section_count` are
/// the header fields controlling whether FDST applies at all.
pub(crate) fn compute_flow(
    text: &[u8],
    fdst_index: Option<u32>,
    fdst_section_count: u32,
    fdst: Option<&Fdst>,
) -> Result<Vec<Vec<u8>>> {
    if fdst_index.is_none() || fdst_section_count <= 1 {
        return Ok(if text.is_empty() {
            Vec::new()
        } else {
            vec![text.to_vec()]
        });
    }

    let fdst = fdst.ok_or_else(|| {
        MobiError::MalformedContainer("fdst_index set but no FDST record present".into())
    })?;

    let mut flow = Vec::with_capacity(fdst.ranges.len());
    let mut expected_start = 0u32;
    for &(start, end) in &fdst.ranges {
        if start < expected_start || end < start {
            return Err(MobiError::MalformedContainer(format!(
                "non-monotonic FDST range ({}, {})",
                start, end
            )));
        }
        let slice = text.get(start as usize..end as usize).ok_or_else(|| {
            MobiError::MalformedContainer(format!(
                "FDST range ({}, {}) out of bounds (text len {})",
                start,
                end,
                text.len()
            ))
        })?;
        flow.push(slice.to_vec());
        expected_start = end;
    }
    if expected_start as usize != text.len() {
        return Err(MobiError::MalformedContainer(format!(
            "FDST ranges cover {} bytes, expected {}",
            expected_start,
            text.len()
        )));
    }
    Ok(flow)
}

/// Builds the FDST record for a multi-element flow, with contiguous ranges.
pub(crate) fn build_fdst(flow: &[Vec<u8>]) -> Option<Fdst> {
    if flow.len() <= 1 {
        return None;
    }
    let mut ranges = Vec::with_capacity(flow.len());
    let mut pos = 0u32;
    for part in flow {
        let start = pos;
        let end = start + part.len() as u32;
        ranges.push((start, end));
        pos = end;
    }
    Some(Fdst { data_offset: 0, ranges })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_flow_when_unset() {
        let text = b"hello world".to_vec();
        let flow = compute_flow(&text, None, 0, None).unwrap();
        assert_eq!(flow, vec![text]);
    }

    #[test]
    fn empty_text_yields_empty_flow() {
        let flow = compute_flow(&[], None, 0, None).unwrap();
        assert!(flow.is_empty());
    }

    #[test]
    fn splits_on_fdst_ranges() {
        let text = b"helloworld!".to_vec();
        let fdst = Fdst {
            data_offset: 0,
            ranges: vec![(0, 5), (5, 10), (10, 11)],
        };
        let flow = compute_flow(&text, Some(1), 3, Some(&fdst)).unwrap();
        assert_eq!(flow, vec![b"hello".to_vec(), b"world".to_vec(), b"!".to_vec()]);
    }

    #[test]
    fn build_and_reparse_round_trips() {
        let flow = vec![b"abc".to_vec(), b"defg".to_vec()];
        let fdst = build_fdst(&flow).unwrap();
        let bytes = fdst.write();
        let parsed = Fdst::parse(&bytes).unwrap();
        assert_eq!(parsed, fdst);

        let mut text = Vec::new();
        for part in &flow {
            text.extend_from_slice(part);
        }
        let recomputed = compute_flow(&text, Some(1), flow.len() as u32, Some(&parsed)).unwrap();
        assert_eq!(recomputed, flow);
    }
}
