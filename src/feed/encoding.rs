//! Encoding normalization for feed files.
//!
//! Chains publish XML in whatever encoding their export tool produces, most
//! commonly UTF-16LE with a BOM. The first two bytes decide: a UTF-16LE BOM
//! routes the file through an `encoding_rs` transcode to UTF-8 that
//! substitutes U+FFFD for malformed sequences instead of failing the whole
//! file; anything else passes through untouched and is treated as UTF-8
//! downstream.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{Context, Result};
use encoding_rs::{Encoding, UTF_16LE};
use encoding_rs_io::{DecodeReaderBytes, DecodeReaderBytesBuilder};

/// FF FE at offset zero.
pub fn has_utf16le_bom(prefix: &[u8]) -> bool {
    prefix.len() >= 2 && prefix[0] == 0xFF && prefix[1] == 0xFE
}

/// Wrap a byte source in the UTF-8 normalizer. `None` means passthrough
/// (BOM sniffing still applies).
pub fn decode_stream<R: Read>(
    raw: R,
    encoding: Option<&'static Encoding>,
) -> DecodeReaderBytes<R, Vec<u8>> {
    DecodeReaderBytesBuilder::new().encoding(encoding).build(raw)
}

/// Open a feed file as a buffered, UTF-8-normalized reader.
pub fn decoded_reader(path: &Path) -> Result<BufReader<DecodeReaderBytes<File, Vec<u8>>>> {
    let mut file =
        File::open(path).with_context(|| format!("cannot open feed file {}", path.display()))?;

    let mut bom = [0u8; 2];
    let n = file.read(&mut bom)?;
    file.seek(SeekFrom::Start(0))?;
    let encoding = if n == 2 && has_utf16le_bom(&bom) {
        Some(UTF_16LE)
    } else {
        None
    };

    Ok(BufReader::new(decode_stream(file, encoding)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn utf16le_with_bom(s: &str) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in s.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn detects_utf16le_bom() {
        assert!(has_utf16le_bom(&[0xFF, 0xFE, 0x3C, 0x00]));
        assert!(!has_utf16le_bom(b"<Root/>"));
        assert!(!has_utf16le_bom(&[0xFF]));
    }

    #[test]
    fn decodes_utf16le_bom_to_utf8() {
        let raw = utf16le_with_bom("<Root>חלב 3%</Root>");
        let mut out = String::new();
        decode_stream(Cursor::new(raw), Some(UTF_16LE))
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "<Root>חלב 3%</Root>");
    }

    #[test]
    fn bom_sniffing_handles_utf16_without_explicit_encoding() {
        let raw = utf16le_with_bom("<Root>מים</Root>");
        let mut out = String::new();
        decode_stream(Cursor::new(raw), None)
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "<Root>מים</Root>");
    }

    #[test]
    fn passes_plain_utf8_through() {
        let raw = "<Root>מים</Root>".as_bytes().to_vec();
        let mut out = String::new();
        decode_stream(Cursor::new(raw), None)
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "<Root>מים</Root>");
    }

    #[test]
    fn malformed_utf16_becomes_replacement_chars() {
        // an odd trailing byte cannot form a code unit and must not abort
        let mut raw = utf16le_with_bom("ok");
        raw.push(0x41);
        let mut out = String::new();
        decode_stream(Cursor::new(raw), Some(UTF_16LE))
            .read_to_string(&mut out)
            .unwrap();
        assert!(out.starts_with("ok"));
        assert!(out.contains('\u{FFFD}'));
    }
}
