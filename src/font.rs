//! FONT record codec: optional XOR deobfuscation plus zlib-wrapped deflate.

use crate::error::{MobiError, Result};
use crate::io::{Reader, Writer};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

const FLAG_DEFLATE: u32 = 0b01;
const FLAG_XOR: u32 = 0b10;
const XOR_EXTENT: usize = 1040;
const HEADER_LEN: u32 = 24;

/// Decodes a raw FONT record payload into its logical font bytes.
pub(crate) fn decode(content: &[u8]) -> Result<Vec<u8>> {
    let mut r = Reader::new(content);
    r.expect_magic("font.magic", b"FONT")?;
    let decoded_size = r.read_u32_be()?;
    let flags = r.read_u32_be()?;
    let data_offset = r.read_u32_be()?;
    let xor_key_len = r.read_u32_be()?;
    let xor_key_offset = r.read_u32_be()?;

    let mut data = content
        .get(data_offset as usize..)
        .ok_or_else(|| MobiError::CorruptFont("data_offset out of bounds".into()))?
        .to_vec();

    if flags & FLAG_XOR != 0 {
        let key = content
            .get(xor_key_offset as usize..xor_key_offset as usize + xor_key_len as usize)
            .ok_or_else(|| MobiError::CorruptFont("xor key out of bounds".into()))?;
        if key.is_empty() {
            return Err(MobiError::CorruptFont("xor key is empty".into()));
        }
        log::warn!("font record used obfuscated xor key");
        let extent = data.len().min(XOR_EXTENT);
        for i in 0..extent {
            data[i] ^= key[i % key.len()];
        }
    }

    let decoded = if flags & FLAG_DEFLATE != 0 {
        let mut decoder = ZlibDecoder::new(&data[..]);
        let mut out = Vec::with_capacity(decoded_size as usize);
        decoder.read_to_end(&mut out)?;
        out
    } else {
        data
    };

    if decoded.len() as u32 != decoded_size {
        return Err(MobiError::CorruptFont(format!(
            "decoded size {} does not match declared size {}",
            decoded.len(),
            decoded_size
        )));
    }
    Ok(decoded)
}

/// Encodes logical font bytes into a FONT record. Always emits
/// `flags = 0b01` (deflate only, best compression) with an empty key — the
/// writer never re-obfuscates fonts.
pub(crate) fn encode(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;

    let mut w = Writer::new();
    w.write_bytes(b"FONT");
    w.write_u32_be(data.len() as u32);
    w.write_u32_be(FLAG_DEFLATE);
    w.write_u32_be(HEADER_LEN);
    w.write_u32_be(0);
    w.write_u32_be(0);
    w.write_bytes(&compressed);
    Ok(w.into_bytes())
}
