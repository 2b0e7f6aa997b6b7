//! FPS text format: header parsing and hex fingerprint line decoding.
//!
//! Format grounded in `examples/original_source/chemfp/fps_search.py` and
//! the loader half of `examples/original_source/chemfp/arena.py`: an
//! `FPS1` magic line, zero or more `#key=value` header lines, then one
//! `<hex fingerprint>\t<id>` line per record.

pub mod stream;

use crate::error::{Error, Result};
use crate::metadata::Metadata;

const MAGIC: &str = "FPS1";

/// Parsed FPS header, plus the byte offset in the source where the first
/// data line begins (used by [`stream`] to resume scanning after the
/// header without re-parsing it).
#[derive(Debug, Clone)]
pub struct Header {
    pub metadata: Metadata,
    pub header_bytes: usize,
}

/// Parse the leading `FPS1` + `#key=value*` header block from `text`.
/// `#num_bits` is optional; when absent it is inferred from the first data
/// line's hex length, matching chemfp's own fallback.
pub fn parse_header(text: &str) -> Result<Header> {
    let mut lines = text.split_inclusive('\n');
    let first = lines.next().ok_or_else(|| Error::InvalidHeader {
        reason: "empty input".into(),
    })?;
    if first.trim_end() != MAGIC {
        return Err(Error::InvalidHeader {
            reason: format!("expected '{MAGIC}' magic line, got {:?}", first.trim_end()),
        });
    }

    let mut num_bits: Option<u32> = None;
    let mut fp_type = String::new();
    let mut software = String::new();
    let mut sources = Vec::new();
    let mut date = String::new();
    let mut aromaticity: Option<String> = None;
    let mut consumed = first.len();

    loop {
        let Some(line) = lines.clone().next() else { break };
        if !line.starts_with('#') {
            break;
        }
        let line = lines.next().unwrap();
        consumed += line.len();

        let body = line.trim_end_matches('\n').trim_start_matches('#');
        let Some((key, value)) = body.split_once('=') else {
            return Err(Error::InvalidHeader {
                reason: format!("malformed header line: {body:?}"),
            });
        };
        match key {
            "num_bits" => {
                num_bits = Some(value.parse().map_err(|_| Error::InvalidHeader {
                    reason: format!("invalid num_bits value: {value:?}"),
                })?);
            }
            "type" => fp_type = value.to_string(),
            "software" => software = value.to_string(),
            "source" => sources.push(value.to_string()),
            "date" => date = value.to_string(),
            "aromaticity" => aromaticity = Some(value.to_string()),
            _ => {
                // Unknown header keys are preserved by real chemfp files
                // (custom per-tool metadata); ignore rather than reject.
            }
        }
    }

    let num_bits = match num_bits {
        Some(n) => n,
        None => {
            let rest = &text[consumed..];
            let first_data_line = rest.lines().next().ok_or_else(|| Error::InvalidHeader {
                reason: "no #num_bits header and no data line to infer it from".into(),
            })?;
            let hex_len = first_data_line.split('\t').next().unwrap_or("").len();
            if hex_len == 0 || hex_len % 2 != 0 {
                return Err(Error::InvalidHeader {
                    reason: format!("cannot infer num_bits from hex field of length {hex_len}"),
                });
            }
            (hex_len as u32 / 2) * 8
        }
    };

    let mut metadata = Metadata::new(num_bits)?;
    metadata.fp_type = fp_type;
    metadata.software = software;
    metadata.sources = sources;
    metadata.date = date;
    metadata.aromaticity = aromaticity;

    Ok(Header {
        metadata,
        header_bytes: consumed,
    })
}

/// Decode one `<hex>\t<id>` data line. `num_bytes` must match the arena's
/// record size; a line with the wrong hex length is an
/// [`Error::InvalidFingerprint`], not silently truncated or padded.
pub fn parse_data_line(line: &str, num_bytes: usize) -> Result<(Vec<u8>, &str)> {
    let line = line.trim_end_matches('\n').trim_end_matches('\r');
    let (hex, id) = line.split_once('\t').ok_or_else(|| Error::InvalidFingerprint {
        reason: format!("missing tab separator in line {line:?}"),
    })?;
    if hex.len() != num_bytes * 2 {
        return Err(Error::InvalidFingerprint {
            reason: format!("expected {} hex characters, got {}", num_bytes * 2, hex.len()),
        });
    }
    let mut bytes = Vec::with_capacity(num_bytes);
    let mut chars = hex.chars();
    while let (Some(hi), Some(lo)) = (chars.next(), chars.next()) {
        let hi = hi.to_digit(16).ok_or_else(|| invalid_hex_digit(hi))?;
        let lo = lo.to_digit(16).ok_or_else(|| invalid_hex_digit(lo))?;
        bytes.push(((hi << 4) | lo) as u8);
    }
    Ok((bytes, id))
}

fn invalid_hex_digit(c: char) -> Error {
    Error::InvalidFingerprint {
        reason: format!("invalid hex digit {c:?}"),
    }
}
