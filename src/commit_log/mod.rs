//! Commit log codec
//!
//! The commit log topic republishes a consumer group's committed offsets as
//! ordinary records:
//!
//! - key: `"{group}:{topic}:{partition}"` (exactly three `:`-separated segments)
//! - value: the next offset to read, as a UTF-8 decimal integer
//!
//! Topic names containing `:` cannot be represented by this scheme.

mod entry;

pub use entry::{decode_key, decode_offset, CommitLogEntry, KEY_SEPARATOR};
