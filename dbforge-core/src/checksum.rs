//! Stable content fingerprints for migration files.
//!
//! SHA-256 over BOM-stripped, CRLF-normalized bytes, hex-encoded with `sha2`/`hex`.

use sha2::{Digest, Sha256};

use crate::error::Error;

const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// How strictly an applied migration's recorded checksum should be compared against
/// the on-disk file's current checksum. Parsed and stored; see `SPEC_FULL.md` §9 —
/// enforcement is an explicit no-op until a future release wires it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumMode {
    None,
    Lenient,
    Strict,
}

impl std::str::FromStr for ChecksumMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(ChecksumMode::None),
            "lenient" => Ok(ChecksumMode::Lenient),
            "strict" => Ok(ChecksumMode::Strict),
            other => Err(Error::UnknownChecksumMode(other.to_string())),
        }
    }
}

/// Strip a leading UTF-8 BOM and normalize CRLF to LF.
fn normalize(bytes: &[u8]) -> Vec<u8> {
    let bytes = bytes.strip_prefix(BOM).unwrap_or(bytes);

    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied().peekable();
    while let Some(b) = iter.next() {
        if b == b'\r' && iter.peek() == Some(&b'\n') {
            continue;
        }
        out.push(b);
    }
    out
}

/// Compute the stable checksum of a migration file's contents: normalize, then SHA-256,
/// then lowercase hex.
pub fn compute(contents: &[u8]) -> String {
    let normalized = normalize(contents);
    let digest = Sha256::digest(&normalized);
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_across_bom_and_line_endings() {
        let base = "-- migrate:up\nCREATE TABLE foo (id INTEGER);\n";
        let with_bom = [BOM, base.as_bytes()].concat();
        let with_crlf = base.replace('\n', "\r\n");

        let a = compute(base.as_bytes());
        let b = compute(&with_bom);
        let c = compute(with_crlf.as_bytes());

        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn different_content_differs() {
        assert_ne!(compute(b"a"), compute(b"b"));
    }

    #[test]
    fn checksum_mode_parses_case_insensitively() {
        assert_eq!("STRICT".parse::<ChecksumMode>().unwrap(), ChecksumMode::Strict);
        assert_eq!("Lenient".parse::<ChecksumMode>().unwrap(), ChecksumMode::Lenient);
        assert_eq!("none".parse::<ChecksumMode>().unwrap(), ChecksumMode::None);
        assert!("bogus".parse::<ChecksumMode>().is_err());
    }
}
