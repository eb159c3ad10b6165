//! wvault-pipeline: client-side encryption pipelines
//!
//! Upload: split → encrypt both segments under the level key → commit →
//! fan out to storage. Download: validate record → fetch → verify
//! commitment → decrypt → reassemble.

pub mod download;
pub mod split;
pub mod upload;

pub use download::DecryptionPipeline;
pub use split::SplitPolicy;
pub use upload::EncryptionPipeline;
