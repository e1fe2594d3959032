//! Stable 64-bit FNV-1a hashing for feature hashing in the local embedding
//! model. Unlike `DefaultHasher`, the output never changes between Rust
//! releases, so stored vectors stay comparable with fresh ones.

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Incremental FNV-1a hasher.
#[derive(Debug, Clone)]
pub struct Fnv64 {
    state: u64,
}

impl Fnv64 {
    pub fn new() -> Self {
        Self { state: FNV_OFFSET }
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.state ^= b as u64;
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }

    /// Write a length-prefixed field so `("ab", "c")` and `("a", "bc")` differ.
    pub fn write_field(&mut self, field: &str) {
        self.write(&(field.len() as u64).to_le_bytes());
        self.write(field.as_bytes());
    }

    pub fn finish(&self) -> u64 {
        self.state
    }
}

impl Default for Fnv64 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fnv1a64(bytes: &[u8]) -> u64 {
        let mut h = Fnv64::new();
        h.write(bytes);
        h.finish()
    }

    #[test]
    fn test_known_vectors() {
        assert_eq!(fnv1a64(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a64(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a64(b"foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn test_field_boundaries() {
        let mut a = Fnv64::new();
        a.write_field("ab");
        a.write_field("c");
        let mut b = Fnv64::new();
        b.write_field("a");
        b.write_field("bc");
        assert_ne!(a.finish(), b.finish());
    }
}
