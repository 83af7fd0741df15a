use crate::audio::Fragment;

/// Accumulates captured fragments between chunk boundaries.
///
/// Only the controller event loop touches the buffer, so pushes and swaps
/// never interleave. `take` is the swap point: everything collected so far
/// leaves as one chunk payload and the buffer starts over empty.
#[derive(Default)]
pub struct ChunkBuffer {
    fragments: Vec<Fragment>,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: Fragment) {
        self.fragments.push(fragment);
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Concatenated payload of all buffered fragments, leaving the buffer
    /// empty.
    pub fn take(&mut self) -> Vec<u8> {
        let fragments = std::mem::take(&mut self.fragments);
        let total: usize = fragments.iter().map(|f| f.bytes.len()).sum();
        let mut payload = Vec::with_capacity(total);
        for fragment in fragments {
            payload.extend_from_slice(&fragment.bytes);
        }
        payload
    }

    pub fn clear(&mut self) {
        self.fragments.clear();
    }
}
