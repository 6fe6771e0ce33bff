//! Receive-side byte accumulator.

/// Returns the lowest index at or after `from` where `marker` starts.
///
/// An empty marker is not a meaningful search target and never matches.
/// A `from` past the end of `haystack` yields `None`.
pub fn find_marker(haystack: &[u8], marker: &[u8], from: usize) -> Option<usize> {
    if marker.is_empty() {
        return None;
    }
    haystack
        .get(from..)?
        .windows(marker.len())
        .position(|w| w == marker)
        .map(|p| p + from)
}

/// Bytes received from the device but not yet consumed by a wait.
///
/// Matching a marker consumes the marker and everything before it. Bytes
/// after the marker stay buffered since they may belong to the next
/// response.
#[derive(Debug, Default, Clone)]
pub struct Accumulator {
    /// Unconsumed bytes, oldest first.
    buf: Vec<u8>,
}

impl Accumulator {
    /// Creates an empty accumulator.
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Appends freshly read bytes to the tail.
    pub fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Discards everything buffered.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Buffered bytes, oldest first.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Searches the buffer for `marker`, see [`find_marker`].
    pub fn find(&self, marker: &[u8], from: usize) -> Option<usize> {
        find_marker(&self.buf, marker, from)
    }

    /// Removes everything through `pos + marker_len` and returns the bytes
    /// before `pos`.
    ///
    /// Out-of-range positions are clamped to the buffer length.
    pub fn consume_up_to(&mut self, pos: usize, marker_len: usize) -> Vec<u8> {
        let start = pos.min(self.buf.len());
        let end = start.saturating_add(marker_len).min(self.buf.len());
        let mut consumed: Vec<u8> = self.buf.drain(..end).collect();
        consumed.truncate(start);
        consumed
    }

    /// Finds `marker` from the start of the buffer and consumes through it.
    ///
    /// Returns the bytes preceding the marker, or `None` if it is not
    /// buffered yet (in which case nothing is consumed).
    pub fn take_through(&mut self, marker: &[u8]) -> Option<Vec<u8>> {
        let pos = self.find(marker, 0)?;
        Some(self.consume_up_to(pos, marker.len()))
    }
}
