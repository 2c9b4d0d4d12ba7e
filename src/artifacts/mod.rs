//! Data structures and algorithms of the storage engine:
//!
//! - `objects`: content-addressed object types (blob, tree, commit)
//! - `index`: binary staging-area entry codec
//! - `pack`: pack compaction and the copy/insert delta codec
//! - `merge`: merge-base selection and the three-way merger
//! - `reachability`: object-graph traversal for GC and deletion guards
//! - `diff`: LCS-based line diffing

pub mod core;
pub mod diff;
pub mod index;
pub mod merge;
pub mod objects;
pub mod pack;
pub mod reachability;
