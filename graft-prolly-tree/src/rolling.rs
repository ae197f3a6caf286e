//! The rolling hash that decides every chunk boundary.

/// The sliding window width, in bytes.
pub const ROLLING_WINDOW: usize = 64;

/// The boundary mask. A boundary fires when the low bits of the hash state
/// are all set, giving a mean chunk size of 4096 bytes.
///
/// This value must be identical across every process sharing a store;
/// differing masks would chunk the same content differently and break
/// history independence. It is deliberately not configurable at runtime.
pub const CHUNK_PATTERN: u64 = 4096 - 1;

const fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9e3779b97f4a7c15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

const fn byte_table() -> [u64; 256] {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = splitmix64(i as u64);
        i += 1;
    }
    table
}

/// Per-byte substitution values for the cyclic polynomial.
static BYTE_TABLE: [u64; 256] = byte_table();

/// A streaming 64-bit hash over a sliding window of [`ROLLING_WINDOW`] bytes.
///
/// The hash is a cyclic polynomial: each byte contributes a table value
/// rotated once per subsequent byte, and the contribution of the byte leaving
/// the window cancels exactly (the window width equals the state width, so a
/// full revolution is the identity rotation). After at least one window of
/// input, the state is a pure function of the last [`ROLLING_WINDOW`] bytes
/// of the current run.
///
/// [`RollingHasher::crossed_boundary`] latches once the boundary predicate
/// fires and stays set until [`RollingHasher::reset`], which the chunk
/// builder calls every time it emits a chunk.
#[derive(Clone, Debug)]
pub struct RollingHasher {
    window: [u8; ROLLING_WINDOW],
    cursor: usize,
    filled: usize,
    state: u64,
    crossed: bool,
}

impl Default for RollingHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl RollingHasher {
    /// Create a hasher at the start of a fresh run.
    pub fn new() -> Self {
        RollingHasher {
            window: [0u8; ROLLING_WINDOW],
            cursor: 0,
            filled: 0,
            state: 0,
            crossed: false,
        }
    }

    /// Feed one byte into the run.
    pub fn hash_byte(&mut self, byte: u8) {
        let incoming = BYTE_TABLE[byte as usize];
        if self.filled == ROLLING_WINDOW {
            let outgoing = self.window[self.cursor];
            self.state = self.state.rotate_left(1) ^ BYTE_TABLE[outgoing as usize] ^ incoming;
        } else {
            self.state = self.state.rotate_left(1) ^ incoming;
            self.filled += 1;
        }
        self.window[self.cursor] = byte;
        self.cursor = (self.cursor + 1) % ROLLING_WINDOW;
        if (self.state & CHUNK_PATTERN) == CHUNK_PATTERN {
            self.crossed = true;
        }
    }

    /// Feed a run of bytes.
    pub fn hash_bytes(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.hash_byte(*byte);
        }
    }

    /// Whether the boundary predicate has fired since the last reset.
    pub fn crossed_boundary(&self) -> bool {
        self.crossed
    }

    /// Forget all state, starting a fresh run. Called whenever a chunk
    /// boundary is emitted.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_is_deterministic() {
        let mut one = RollingHasher::new();
        let mut two = RollingHasher::new();
        one.hash_bytes(b"identical input bytes");
        two.hash_bytes(b"identical input bytes");
        assert_eq!(one.state, two.state);
    }

    #[test]
    fn it_depends_only_on_the_window() {
        // Two runs with different prefixes converge once a full window of
        // identical bytes has been fed.
        let suffix: Vec<u8> = (0..ROLLING_WINDOW).map(|i| (i * 7) as u8).collect();

        let mut one = RollingHasher::new();
        one.hash_bytes(b"first prefix");
        one.hash_bytes(&suffix);

        let mut two = RollingHasher::new();
        two.hash_bytes(b"a completely different and longer prefix");
        two.hash_bytes(&suffix);

        assert_eq!(one.state, two.state);
    }

    #[test]
    fn it_fires_boundaries_at_the_expected_rate() {
        let mut hasher = RollingHasher::new();
        let mut boundaries = 0u32;
        let total = 1_000_000u64;
        for i in 0..total {
            let byte = (splitmix64(i) >> 16) as u8;
            hasher.hash_byte(byte);
            if hasher.crossed_boundary() {
                boundaries += 1;
                hasher.reset();
            }
        }
        // Mean chunk size should be in the ballpark of 4096 bytes.
        let mean = total / u64::from(boundaries.max(1));
        assert!((1024..16384).contains(&mean), "mean chunk size {mean}");
    }

    #[test]
    fn it_latches_the_boundary_until_reset() {
        let mut hasher = RollingHasher::new();
        let mut fired = false;
        for byte in 0..=u8::MAX {
            for repeat in 0..64 {
                hasher.hash_byte(byte ^ repeat);
                if hasher.crossed_boundary() {
                    fired = true;
                    assert!(hasher.crossed_boundary());
                    hasher.reset();
                    assert!(!hasher.crossed_boundary());
                }
            }
        }
        assert!(fired, "no boundary fired over 16 KiB of input");
    }
}
