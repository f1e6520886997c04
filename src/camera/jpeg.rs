use bytes::{Bytes, BytesMut};

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];
const MAX_PENDING_BYTES: usize = 4 * 1024 * 1024;

/// Cuts complete JPEG images out of an MJPEG byte stream, ignoring the
/// multipart boundaries and headers around them.
pub struct FrameScanner {
    pending: BytesMut,
    frames: u64,
}

impl FrameScanner {
    pub fn new() -> Self {
        Self {
            pending: BytesMut::new(),
            frames: 0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Feeds a chunk and returns the newest frame it completed, if any.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Bytes> {
        self.pending.extend_from_slice(chunk);
        if self.pending.len() > MAX_PENDING_BYTES {
            let overflow = self.pending.len() - MAX_PENDING_BYTES;
            let _ = self.pending.split_to(overflow);
        }

        let mut newest = None;
        loop {
            let Some(start) = find_marker(&self.pending, &JPEG_SOI) else {
                // Keep a trailing 0xFF, it may be the first half of a marker.
                let keep = usize::from(self.pending.last() == Some(&0xFF));
                let drop = self.pending.len() - keep;
                let _ = self.pending.split_to(drop);
                break;
            };
            let _ = self.pending.split_to(start);

            let Some(end) = find_marker(&self.pending[2..], &JPEG_EOI) else {
                break;
            };
            newest = Some(self.pending.split_to(end + 4).freeze());
            self.frames += 1;
        }

        newest
    }
}

impl Default for FrameScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn find_marker(buffer: &[u8], marker: &[u8; 2]) -> Option<usize> {
    buffer.windows(2).position(|window| window == marker)
}
