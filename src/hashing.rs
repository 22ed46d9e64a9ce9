use sha2::{Digest, Sha256};

/// Incremental SHA-256 with length-prefixed fields, so that adjacent fields
/// can never run together into the same byte stream.
pub(crate) struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    pub(crate) fn new(domain: &str) -> Self {
        let mut hasher = Self {
            inner: Sha256::new(),
        };
        hasher.bytes(domain.as_bytes());
        hasher
    }

    pub(crate) fn bytes(&mut self, data: &[u8]) {
        self.inner.update((data.len() as u64).to_le_bytes());
        self.inner.update(data);
    }

    pub(crate) fn str(&mut self, data: &str) {
        self.bytes(data.as_bytes());
    }

    pub(crate) fn u64(&mut self, value: u64) {
        self.inner.update(value.to_le_bytes());
    }

    pub(crate) fn f32s(&mut self, values: &[f32]) {
        self.u64(values.len() as u64);
        for v in values {
            self.inner.update(v.to_bits().to_le_bytes());
        }
    }

    pub(crate) fn finish(self) -> String {
        format!("{:x}", self.inner.finalize())
    }
}
