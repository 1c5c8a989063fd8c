use std::io::{Read, Write};
use std::time::{Duration, Instant};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

pub const POINT_GZIP_LEVEL: u32 = 9;
pub const GRID_GZIP_LEVEL: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Compressed {
    pub bytes: Vec<u8>,
    pub input_len: usize,
    /// `output_len / input_len`; 1.0 for empty input.
    pub ratio: f64,
    pub elapsed: Duration,
}

impl Compressed {
    pub fn savings_percent(&self) -> f64 {
        if self.input_len == 0 {
            return 0.0;
        }
        (1.0 - self.ratio) * 100.0
    }
}

/// Gzip with a zero mtime, so equal input and level give equal output.
pub fn compress(data: &[u8], level: u32) -> Result<Compressed> {
    let start = Instant::now();
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(data.len() / 2 + 64),
        Compression::new(level.min(9)),
    );
    encoder.write_all(data).map_err(Error::Compression)?;
    let bytes = encoder.finish().map_err(Error::Compression)?;
    let ratio = if data.is_empty() {
        1.0
    } else {
        bytes.len() as f64 / data.len() as f64
    };
    let compressed = Compressed {
        bytes,
        input_len: data.len(),
        ratio,
        elapsed: start.elapsed(),
    };
    tracing::debug!(
        target: "saltf::compress",
        level,
        input = compressed.input_len,
        output = compressed.bytes.len(),
        ratio = compressed.ratio,
        "gzip"
    );
    Ok(compressed)
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|err| Error::Decode(format!("gzip: {err}")))?;
    Ok(out)
}

pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&[0x1f, 0x8b])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_reports_ratio() {
        let data: Vec<u8> = (0..4096u32).flat_map(|v| (v % 7).to_le_bytes()).collect();
        let compressed = compress(&data, POINT_GZIP_LEVEL).expect("compress");
        assert!(is_gzip(&compressed.bytes));
        assert!(compressed.ratio < 1.0);
        assert!(compressed.savings_percent() > 0.0);
        assert_eq!(decompress(&compressed.bytes).expect("decompress"), data);
    }

    #[test]
    fn output_is_deterministic() {
        let data = b"ScalarValue ScalarValue ScalarValue".repeat(32);
        let a = compress(&data, GRID_GZIP_LEVEL).expect("compress");
        let b = compress(&data, GRID_GZIP_LEVEL).expect("compress");
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn empty_input_is_a_valid_stream() {
        let compressed = compress(&[], POINT_GZIP_LEVEL).expect("compress");
        assert_eq!(compressed.ratio, 1.0);
        assert_eq!(compressed.savings_percent(), 0.0);
        assert!(decompress(&compressed.bytes).expect("decompress").is_empty());
    }

    #[test]
    fn rejects_non_gzip_input() {
        assert!(!is_gzip(b"ply\n"));
        assert!(matches!(decompress(b"ply\nformat"), Err(Error::Decode(_))));
    }
}
