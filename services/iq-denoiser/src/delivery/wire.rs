//! complex64 wire format
//!
//! Samples go out back-to-back as pairs of little-endian IEEE-754 f32
//! (real, imaginary) with no framing.

use num_complex::Complex32;

/// Bytes per complex64 sample on the wire
pub const COMPLEX64_BYTES: usize = 8;

/// Pair denoised I and Q channels into complex samples (I real, Q imaginary).
pub fn combine(i: &[f32], q: &[f32]) -> Vec<Complex32> {
    debug_assert_eq!(i.len(), q.len());
    i.iter().zip(q).map(|(&re, &im)| Complex32::new(re, im)).collect()
}

/// Serialize `samples` into `out`, replacing its contents.
pub fn encode_complex64(samples: &[Complex32], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(samples.len() * COMPLEX64_BYTES);
    for s in samples {
        out.extend_from_slice(&s.re.to_le_bytes());
        out.extend_from_slice(&s.im.to_le_bytes());
    }
}
