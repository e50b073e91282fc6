//! Resource block codec: image passthrough, audio/video wrapper
//! stripping/adding, and the boundary scan that ends the resource block.

use crate::error::{MobiError, Result};
use crate::io::Writer;

pub(crate) const BOUNDARY: &[u8] = b"BOUNDARY";
pub(crate) const EOF_MAGIC: &[u8] = b"\xE9\x8E\r\n";

/// An embedded resource, classified by its record's magic prefix. Payloads
/// are stored post-unwrapping (audio/video headers stripped, fonts
/// deflated/deobfuscated).
#[derive(Debug, Clone, PartialEq)]
pub enum MobiResource {
    Jpeg(Vec<u8>),
    Png(Vec<u8>),
    Gif(Vec<u8>),
    Bmp(Vec<u8>),
    Font(Vec<u8>),
    Audio(Vec<u8>),
    Video(Vec<u8>),
    Unknown(Vec<u8>),
}

impl MobiResource {
    pub fn payload(&self) -> &[u8] {
        match self {
            MobiResource::Jpeg(b)
            | MobiResource::Png(b)
            | MobiResource::Gif(b)
            | MobiResource::Bmp(b)
            | MobiResource::Font(b)
            | MobiResource::Audio(b)
            | MobiResource::Video(b)
            | MobiResource::Unknown(b) => b,
        }
    }
}

pub(crate) fn is_terminator(content: &[u8]) -> bool {
    content == BOUNDARY || content == EOF_MAGIC
}

fn strip_wrapper(content: &[u8]) -> Result<Vec<u8>> {
    let header_end_bytes = content
        .get(4..8)
        .ok_or_else(|| MobiError::MalformedContainer("audio/video record missing header-end field".into()))?;
    let header_end = u32::from_be_bytes([
        header_end_bytes[0],
        header_end_bytes[1],
        header_end_bytes[2],
        header_end_bytes[3],
    ]) as usize;
    content
        .get(header_end..)
        .map(|s| s.to_vec())
        .ok_or_else(|| MobiError::MalformedContainer("audio/video header-end past EOF".into()))
}

fn wrap(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut w = Writer::new();
    w.write_bytes(tag);
    w.write_u32_be(8); // fixed 8-byte header: tag + this length field
    w.write_bytes(payload);
    w.into_bytes()
}

/// Classifies one resource record.
pub(crate) fn classify(content: &[u8]) -> Result<MobiResource> {
    if content.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Ok(MobiResource::Jpeg(content.to_vec()));
    }
    if content.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Ok(MobiResource::Png(content.to_vec()));
    }
    if content.starts_with(b"GIF8") {
        return Ok(MobiResource::Gif(content.to_vec()));
    }
    if content.starts_with(b"BM") && content.len() >= 6 {
        let declared = u32::from_le_bytes([content[2], content[3], content[4], content[5]]);
        if declared as usize == content.len() {
            return Ok(MobiResource::Bmp(content.to_vec()));
        }
    }
    if content.starts_with(b"FONT") {
        return Ok(MobiResource::Font(crate::font::decode(content)?));
    }
    if content.starts_with(b"AUDI") {
        return Ok(MobiResource::Audio(strip_wrapper(content)?));
    }
    if content.starts_with(b"VIDE") {
        return Ok(MobiResource::Video(strip_wrapper(content)?));
    }
    Ok(MobiResource::Unknown(content.to_vec()))
}

fn encode(resource: &MobiResource) -> Result<Vec<u8>> {
    Ok(match resource {
        MobiResource::Jpeg(b)
        | MobiResource::Png(b)
        | MobiResource::Gif(b)
        | MobiResource::Bmp(b)
        | MobiResource::Unknown(b) => b.clone(),
        MobiResource::Font(b) => crate::font::encode(b)?,
        MobiResource::Audio(b) => wrap(b"AUDI", b),
        MobiResource::Video(b) => wrap(b"VIDE", b),
    })
}

/// Reads every resource record up to (not including) the first terminator.
pub(crate) fn read_all(records: &[&[u8]]) -> Result<Vec<MobiResource>> {
    let mut out = Vec::new();
    for content in records {
        if is_terminator(content) {
            break;
        }
        out.push(classify(content)?);
    }
    log::debug!("resource block: {} records", out.len());
    Ok(out)
}

/// Encodes every resource plus a trailing `BOUNDARY` record.
pub(crate) fn write_all(resources: &[MobiResource]) -> Result<Vec<Vec<u8>>> {
    let mut out: Vec<Vec<u8>> = resources.iter().map(encode).collect::<Result<_>>()?;
    out.push(BOUNDARY.to_vec());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_jpeg_png_gif_by_magic() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        assert!(matches!(classify(&jpeg).unwrap(), MobiResource::Jpeg(_)));

        let mut png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        png.extend([1, 2, 3]);
        assert!(matches!(classify(&png).unwrap(), MobiResource::Png(_)));

        let gif = b"GIF89a...".to_vec();
        assert!(matches!(classify(&gif).unwrap(), MobiResource::Gif(_)));
    }

    #[test]
    fn classifies_bmp_only_when_size_matches() {
        let mut bmp = b"BM".to_vec();
        bmp.extend(10u32.to_le_bytes());
        bmp.extend([0u8; 4]);
        assert_eq!(bmp.len(), 10);
        assert!(matches!(classify(&bmp).unwrap(), MobiResource::Bmp(_)));

        let mut bad_bmp = b"BM".to_vec();
        bad_bmp.extend(999u32.to_le_bytes());
        assert!(matches!(classify(&bad_bmp).unwrap(), MobiResource::Unknown(_)));
    }

    #[test]
    fn audio_video_wrapper_round_trips() {
        let resource = MobiResource::Audio(b"raw pcm bytes".to_vec());
        let encoded = encode(&resource).unwrap();
        assert_eq!(&encoded[..4], b"AUDI");
        let decoded = classify(&encoded).unwrap();
        assert_eq!(decoded, resource);
    }

    #[test]
    fn read_all_stops_at_boundary() {
        let jpeg = vec![0xFF, 0xD8, 0xFF];
        let records: Vec<&[u8]> = vec![&jpeg, BOUNDARY, &jpeg];
        let resources = read_all(&records).unwrap();
        assert_eq!(resources.len(), 1);
    }

    #[test]
    fn write_all_appends_single_boundary() {
        let out = write_all(&[MobiResource::Unknown(vec![1, 2, 3])]).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1], BOUNDARY);
    }
}
