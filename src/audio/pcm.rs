//! # PCM Conversion Helpers
//!
//! Converts between the wire's little-endian byte layout and 16-bit samples,
//! and measures signal level for voice activity detection.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Read little-endian 16-bit samples from raw bytes.
///
/// A trailing odd byte cannot form a sample and is ignored.
pub fn bytes_to_samples(data: &[u8]) -> Vec<i16> {
    let mut cursor = Cursor::new(data);
    let mut samples = Vec::with_capacity(data.len() / 2);

    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample);
    }

    samples
}

/// Write 16-bit samples back to little-endian bytes.
pub fn samples_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        // Writing into a Vec cannot fail.
        let _ = out.write_i16::<LittleEndian>(sample);
    }
    out
}

/// Root-mean-square level of the samples, normalized to 0.0 - 1.0.
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / 32768.0;
            v * v
        })
        .sum();

    (sum / samples.len() as f64).sqrt() as f32
}
