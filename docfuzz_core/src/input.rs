/// A candidate sample handed to the oracle by a fuzz driver.
///
/// The oracle only ever looks at the raw bytes; decoding happens per evaluation.
pub trait Input: Clone + Send + Sync + std::fmt::Debug + 'static {
    fn as_bytes(&self) -> &[u8];

    fn len(&self) -> usize {
        self.as_bytes().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Input for Vec<u8> {
    fn as_bytes(&self) -> &[u8] {
        self.as_slice()
    }
}

/// Hand-written corpus samples are usually text.
impl Input for String {
    fn as_bytes(&self) -> &[u8] {
        str::as_bytes(self)
    }
}
