//! Critical-bytes split policy

use wvault_core::config::PipelineConfig;

/// Where a file is cut into its critical prefix and bulk content.
///
/// The pipelines treat the split as opaque: they only rely on
/// `join(split(data)) == data`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPolicy {
    critical_len: usize,
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self { critical_len: 16 }
    }
}

impl SplitPolicy {
    pub fn new(critical_len: usize) -> Self {
        Self { critical_len }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.critical_bytes_len)
    }

    pub fn critical_len(&self) -> usize {
        self.critical_len
    }

    /// Files shorter than the prefix are all critical bytes.
    pub fn split<'a>(&self, data: &'a [u8]) -> (&'a [u8], &'a [u8]) {
        data.split_at(self.critical_len.min(data.len()))
    }

    pub fn join(&self, critical: &[u8], content: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(critical.len() + content.len());
        out.extend_from_slice(critical);
        out.extend_from_slice(content);
        out
    }
}
