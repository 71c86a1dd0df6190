//! Chunk acquisition and I/Q channel splitting
//!
//! RTL-SDR outputs 8-bit unsigned IQ samples (I, Q pairs). A chunk is only
//! handed on once it is complete; a short read is dropped.

use std::io::{self, Read};

/// Midpoint of the unsigned 8-bit sample range
pub const IQ_CENTER: f32 = 127.5;

/// Map one raw capture byte into [-1, 1]
#[inline(always)]
pub fn normalize(byte: u8) -> f32 {
    (byte as f32 - IQ_CENTER) / IQ_CENTER
}

/// I and Q channel vectors of one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPair {
    pub i: Vec<f32>,
    pub q: Vec<f32>,
}

/// Split interleaved `[I0, Q0, I1, Q1, ...]` bytes into normalized channels.
/// A trailing odd byte is ignored.
pub fn split_channels(chunk: &[u8]) -> ChannelPair {
    let pairs = chunk.len() / 2;
    let mut i = Vec::with_capacity(pairs);
    let mut q = Vec::with_capacity(pairs);
    for pair in chunk.chunks_exact(2) {
        i.push(normalize(pair[0]));
        q.push(normalize(pair[1]));
    }
    ChannelPair { i, q }
}

/// Outcome of one chunk read
#[derive(Debug, PartialEq)]
pub enum ChunkRead<'a> {
    /// A complete chunk
    Full(&'a [u8]),
    /// The stream ended after `received` bytes, before the chunk filled
    Short { received: usize },
}

impl ChunkRead<'_> {
    pub fn received(&self) -> usize {
        match self {
            ChunkRead::Full(bytes) => bytes.len(),
            ChunkRead::Short { received } => *received,
        }
    }
}

/// Reads fixed-size chunks of `chunk_size` complex samples
#[derive(Debug)]
pub struct SampleFramer {
    buffer: Vec<u8>,
}

impl SampleFramer {
    pub fn new(chunk_size: usize) -> Self {
        // I and Q interleaved
        Self {
            buffer: vec![0u8; chunk_size * 2],
        }
    }

    /// Fill one chunk from `reader`. Bytes of a short read are not carried
    /// into the next call.
    pub fn read_chunk<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<ChunkRead<'_>> {
        let mut filled = 0;
        while filled < self.buffer.len() {
            match reader.read(&mut self.buffer[filled..]) {
                Ok(0) => return Ok(ChunkRead::Short { received: filled }),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(ChunkRead::Full(&self.buffer))
    }
}
