//! grit: a from-scratch version-control storage engine.
//!
//! The crate is split the same way the on-disk repository is:
//!
//! - `areas`: stateful repository areas (object database, staging index,
//!   refs, workspace, config) plus the `Repository` facade tying them
//!   together
//! - `artifacts`: the data structures and algorithms the areas trade in
//!   (objects, index entry codec, pack/delta, merge, reachability, diff)
//! - `errors`: the typed failure kinds surfaced to callers
//!
//! Command dispatch, ignore handling and any front end are collaborators
//! living outside this crate; they drive the engine through
//! [`areas::repository::Repository`].

pub mod areas;
pub mod artifacts;
pub mod errors;
