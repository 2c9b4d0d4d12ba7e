//! Staging-area (index) file format
//!
//! The index records which files go into the next commit, with enough stat
//! metadata to detect changes without rehashing content.
//!
//! ## File Format (Version 2)
//!
//! ```text
//! Header (12 bytes):
//!   - Signature: "DIRC" (4 bytes)
//!   - Version: 2 (4 bytes)
//!   - Entry count (4 bytes)
//!
//! Entries (variable length):
//!   - Ten big-endian u32 stat fields, 20-byte hash, 2-byte flags,
//!     NUL-terminated path, zero padding to an 8-byte multiple
//!
//! Checksum (20 bytes):
//!   - SHA-1 of all preceding bytes, verified on load
//! ```

pub mod checksum;
pub mod entry_mode;
pub mod index_entry;
pub mod index_header;

/// Size of the trailing SHA-1 checksum in bytes
pub const CHECKSUM_SIZE: usize = 20;

/// Size of the index header in bytes
pub const HEADER_SIZE: usize = 12;

/// Magic signature identifying index files
pub const SIGNATURE: &str = "DIRC";

/// Index file format version
pub const VERSION: u32 = 2;
