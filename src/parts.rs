//! SKEL + FRAG part reconstruction: rebuilds the ordered list of HTML parts
//! out of the raw ML stream (`flow[0]`).

use crate::error::{MobiError, Result};
use crate::index::IndexEntry;
use indexmap::IndexMap;

const TAG_FRAGMENT_COUNT: u8 = 1;
const TAG_POSITION_LENGTH: u8 = 6;

/// Splices SKEL skeleton slices and FRAG fragments out of `raw` back into
/// the ordered list of logical parts.
pub(crate) fn reconstruct(raw: &[u8], skel: &[IndexEntry], frag: &[IndexEntry]) -> Result<Vec<Vec<u8>>> {
    let mut parts = Vec::with_capacity(skel.len());
    let mut frag_cursor = 0usize;
    let mut insert_offset: i64 = 0;

    for skel_entry in skel {
        let pos = skel_entry
            .tag(TAG_POSITION_LENGTH, 0)
            .ok_or_else(|| MobiError::CorruptIndex("SKEL entry missing position".into()))?
            as usize;
        let len = skel_entry
            .tag(TAG_POSITION_LENGTH, 1)
            .ok_or_else(|| MobiError::CorruptIndex("SKEL entry missing length".into()))?
            as usize;
        let count = skel_entry.tag(TAG_FRAGMENT_COUNT, 0).unwrap_or(0) as usize;

        let mut part = raw
            .get(pos..pos + len)
            .ok_or_else(|| MobiError::MalformedContainer(format!(
                "SKEL slice [{}, {}) out of bounds (raw len {})",
                pos, pos + len, raw.len()
            )))?
            .to_vec();
        let mut raw_cursor = pos + len;

        for i in 0..count {
            let f = frag.get(frag_cursor + i).ok_or_else(|| {
                MobiError::CorruptIndex(format!("FRAG index {} out of range", frag_cursor + i))
            })?;
            let label_val: i64 = f
                .label_str()
                .trim()
                .parse()
                .map_err(|_| MobiError::CorruptIndex(format!("FRAG label {:?} is not decimal", f.label_str())))?;
            let insert_pos = label_val - insert_offset;
            if insert_pos < 0 || insert_pos as usize > part.len() {
                return Err(MobiError::CorruptIndex(format!(
                    "FRAG insert position {} out of range for a {}-byte part",
                    insert_pos,
                    part.len()
                )));
            }
            let insert_pos = insert_pos as usize;
            let flen = f
                .tag(TAG_POSITION_LENGTH, 1)
                .ok_or_else(|| MobiError::CorruptIndex("FRAG entry missing length".into()))?
                as usize;
            let frag_bytes = raw.get(raw_cursor..raw_cursor + flen).ok_or_else(|| {
                MobiError::MalformedContainer(format!(
                    "FRAG slice [{}, {}) out of bounds (raw len {})",
                    raw_cursor, raw_cursor + flen, raw.len()
                ))
            })?;

            let mut spliced = Vec::with_capacity(part.len() + flen);
            spliced.extend_from_slice(&part[..insert_pos]);
            spliced.extend_from_slice(frag_bytes);
            spliced.extend_from_slice(&part[insert_pos..]);
            part = spliced;
            raw_cursor += flen;
        }

        frag_cursor += count;
        insert_offset += part.len() as i64;
        parts.push(part);
    }

    Ok(parts)
}

/// The inverse of `reconstruct` for freshly-authored content: every part
/// becomes its own skeleton slice with no fragments spliced in. This is a
/// faithful (if maximally simple) SKEL/FRAG encoding — `reconstruct` of its
/// output reproduces `parts` exactly.
pub(crate) fn split(parts: &[Vec<u8>]) -> (Vec<u8>, Vec<IndexEntry>, Vec<IndexEntry>) {
    let mut raw = Vec::new();
    let mut skel_entries = Vec::with_capacity(parts.len());

    for (i, part) in parts.iter().enumerate() {
        let pos = raw.len() as u32;
        let len = part.len() as u32;
        raw.extend_from_slice(part);

        let mut tags = IndexMap::new();
        tags.insert(TAG_FRAGMENT_COUNT, vec![0u32]);
        tags.insert(TAG_POSITION_LENGTH, vec![pos, len]);
        skel_entries.push(IndexEntry {
            label: format!("SKEL{:010}", i).into_bytes(),
            tags,
        });
    }

    (raw, skel_entries, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(label: &str, tags: &[(u8, &[u32])]) -> IndexEntry {
        let mut map = IndexMap::new();
        for &(tag, values) in tags {
            map.insert(tag, values.to_vec());
        }
        IndexEntry {
            label: label.as_bytes().to_vec(),
            tags: map,
        }
    }

    #[test]
    fn reconstructs_with_one_spliced_fragment() {
        let raw = b"ABMIDCD".to_vec();
        let skel = vec![
            entry("SKEL0000000000", &[(1, &[1]), (6, &[0, 2])]),
            entry("SKEL0000000001", &[(1, &[0]), (6, &[5, 2])]),
        ];
        let frag = vec![entry("0000000001", &[(6, &[2, 3])])];

        let parts = reconstruct(&raw, &skel, &frag).unwrap();
        assert_eq!(parts, vec![b"AMIDB".to_vec(), b"CD".to_vec()]);
    }

    #[test]
    fn split_then_reconstruct_round_trips() {
        let parts = vec![b"<p>one</p>".to_vec(), b"<p>two</p>".to_vec(), b"<p>three</p>".to_vec()];
        let (raw, skel, frag) = split(&parts);
        let rebuilt = reconstruct(&raw, &skel, &frag).unwrap();
        assert_eq!(rebuilt, parts);
    }

    #[test]
    fn rejects_out_of_range_fragment_index() {
        let raw = b"AB".to_vec();
        let skel = vec![entry("SKEL0000000000", &[(1, &[1]), (6, &[0, 2])])];
        assert!(reconstruct(&raw, &skel, &[]).is_err());
    }
}
