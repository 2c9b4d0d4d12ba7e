//! Content-addressed object types.
//!
//! Every object is stored as `"<kind> <byte-length>\0" + payload` and
//! addressed by the SHA-1 of that whole buffer. The types here own the
//! serialization; the object database in `areas::database` owns the disk.

pub mod blob;
pub mod commit;
pub mod object;
pub mod object_id;
pub mod object_type;
pub mod tree;

/// Length of an object id in hex characters
pub const OBJECT_ID_LENGTH: usize = 40;

/// Length of an object id in raw bytes
pub const OBJECT_ID_RAW_LENGTH: usize = 20;
