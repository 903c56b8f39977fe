//! 32-bit keys for fact tables.

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// Incremental hasher used to derive primary keys
pub trait KeyHasher {
    fn update(&mut self, bytes: &[u8]);
    fn finalize(&self) -> u32;
    fn reset(&mut self);

    /// Hash the concatenation of `parts`, leaving the hasher reset
    fn key(&mut self, parts: &[&str]) -> u32 {
        self.reset();
        for part in parts {
            self.update(part.as_bytes());
        }
        let key = self.finalize();
        self.reset();
        key
    }
}

/// FNV-1a, 32 bits
#[derive(Debug, Clone)]
pub struct Fnv1a32 {
    state: u32,
}

impl Default for Fnv1a32 {
    fn default() -> Self {
        Self { state: FNV_OFFSET }
    }
}

impl Fnv1a32 {
    pub fn new() -> Self {
        Self::default()
    }

    /// One-shot hash of a string
    pub fn hash_str(text: &str) -> u32 {
        let mut hasher = Self::new();
        hasher.update(text.as_bytes());
        hasher.finalize()
    }
}

impl KeyHasher for Fnv1a32 {
    fn update(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.state ^= u32::from(*byte);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }

    fn finalize(&self) -> u32 {
        self.state
    }

    fn reset(&mut self) {
        self.state = FNV_OFFSET;
    }
}
