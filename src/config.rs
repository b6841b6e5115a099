/// Resource limits applied to untrusted packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Largest package buffer accepted, in bytes.
    pub max_package_size: usize,
    /// Largest single entry that will be decompressed, in bytes.
    pub max_entry_size: u64,
    /// Number of leading bytes inspected when deciding if content is binary.
    pub binary_sample_len: usize,
}

pub const DEFAULT_MAX_PACKAGE_SIZE: usize = 256 * 1024 * 1024;
pub const DEFAULT_MAX_ENTRY_SIZE: u64 = 64 * 1024 * 1024;
pub const DEFAULT_BINARY_SAMPLE_LEN: usize = 8 * 1024;

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_package_size: DEFAULT_MAX_PACKAGE_SIZE,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            binary_sample_len: DEFAULT_BINARY_SAMPLE_LEN,
        }
    }
}

impl Limits {
    pub fn with_max_package_size(mut self, bytes: usize) -> Self {
        self.max_package_size = bytes;
        self
    }

    pub fn with_max_entry_size(mut self, bytes: u64) -> Self {
        self.max_entry_size = bytes;
        self
    }

    pub fn with_binary_sample_len(mut self, bytes: usize) -> Self {
        self.binary_sample_len = bytes.max(1);
        self
    }
}
