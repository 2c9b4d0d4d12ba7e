//! Pack writer
//!
//! Batches a set of objects into one pack file plus its offset index.
//! Objects are processed in hash order; each one is stored as the smaller
//! of (a) whole-object zlib compression or (b) a delta against one earlier
//! blob of the same batch, compressed.
//!
//! ## Determinism
//!
//! The candidate-base set for the object at sorted position `i` is exactly
//! the blobs at positions `0..i`, a snapshot fixed before any encoding
//! runs and never mutated by concurrent work. Encoding decisions therefore
//! depend only on the input set, and re-running pack creation over the same
//! objects produces bit-identical output. Only the CPU-bound encode and
//! compress work is dispatched onto the worker pool, which lives for the
//! duration of one `pack_objects` call.

use crate::areas::database::Database;
use crate::artifacts::core::zlib_compress;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::pack::delta::{self, DeltaDocument, DELTA_MARKER};
use crate::artifacts::pack::pack_index::PackIndex;
use crate::artifacts::pack::{PACK_HEADER_SIZE, PACK_MAGIC, PACK_VERSION};
use anyhow::Context;
use byteorder::WriteBytesExt;
use bytes::Bytes;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Paths of a freshly written pack and its index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackArtifacts {
    pub pack: PathBuf,
    pub index: PathBuf,
}

/// One object queued for packing, with the number of blobs that precede it
/// in hash order (its delta-base candidate window).
struct PackItem {
    oid: ObjectId,
    object_type: ObjectType,
    payload: Bytes,
    full: Bytes,
    blob_rank: usize,
}

#[derive(Debug)]
pub struct PackWriter<'d> {
    database: &'d Database,
    pack_dir: PathBuf,
}

impl<'d> PackWriter<'d> {
    pub fn new(database: &'d Database, pack_dir: PathBuf) -> Self {
        PackWriter { database, pack_dir }
    }

    /// Pack the given objects, returning the pack and index paths.
    pub fn pack_objects(&self, oids: &BTreeSet<ObjectId>) -> anyhow::Result<PackArtifacts> {
        std::fs::create_dir_all(&self.pack_dir).with_context(|| {
            format!(
                "Unable to create pack directory {}",
                self.pack_dir.display()
            )
        })?;

        let timestamp = chrono::Local::now().timestamp();
        let pack_path = self.pack_dir.join(format!("pack-{timestamp}.pack"));
        let idx_path = self.pack_dir.join(format!("pack-{timestamp}.idx"));

        let items = self.collect_items(oids)?;
        let bases = blob_bases(&items);

        let compressed = encode_all(&items, &bases)?;

        let offsets = write_pack(&pack_path, &items, &compressed)?;
        write_index(&idx_path, &offsets)?;

        Ok(PackArtifacts {
            pack: pack_path,
            index: idx_path,
        })
    }

    /// Read and parse every object up front, in hash order. BTreeSet
    /// iteration fixes the deterministic processing order.
    fn collect_items(&self, oids: &BTreeSet<ObjectId>) -> anyhow::Result<Vec<PackItem>> {
        let mut items = Vec::with_capacity(oids.len());
        let mut blob_count = 0;

        for oid in oids {
            let full = self.database.load(oid)?;
            let (object_type, payload) = Database::parse_raw(&full)?;

            items.push(PackItem {
                oid: oid.clone(),
                object_type,
                payload,
                full,
                blob_rank: blob_count,
            });

            if object_type == ObjectType::Blob {
                blob_count += 1;
            }
        }

        Ok(items)
    }
}

fn blob_bases(items: &[PackItem]) -> Vec<(ObjectId, Bytes)> {
    items
        .iter()
        .filter(|item| item.object_type == ObjectType::Blob)
        .map(|item| (item.oid.clone(), item.payload.clone()))
        .collect()
}

/// Compress every item on a pool scoped to this call. Results come back in
/// item order, so the pack layout matches the sequential decision order.
fn encode_all(items: &[PackItem], bases: &[(ObjectId, Bytes)]) -> anyhow::Result<Vec<Bytes>> {
    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("Unable to build pack compression pool")?;

    pool.install(|| {
        items
            .par_iter()
            .map(|item| encode_item(item, &bases[..item.blob_rank]))
            .collect::<anyhow::Result<Vec<_>>>()
    })
}

/// Choose the smaller of whole-object compression and delta compression
/// against each candidate base. Delta encoding applies to blobs only.
fn encode_item(item: &PackItem, bases: &[(ObjectId, Bytes)]) -> anyhow::Result<Bytes> {
    let mut best = zlib_compress(&item.full)?;

    if item.object_type == ObjectType::Blob {
        for (base_oid, base_data) in bases {
            let ops = delta::encode(base_data, &item.payload);
            let document = DeltaDocument::new(base_oid.clone(), ops).serialize()?;

            let mut delta_object = Vec::with_capacity(DELTA_MARKER.len() + document.len());
            delta_object.extend_from_slice(DELTA_MARKER);
            delta_object.extend_from_slice(&document);

            let candidate = zlib_compress(&delta_object)?;
            if candidate.len() < best.len() {
                best = candidate;
            }
        }
    }

    Ok(best)
}

fn write_pack(
    pack_path: &Path,
    items: &[PackItem],
    compressed: &[Bytes],
) -> anyhow::Result<Vec<(ObjectId, u64)>> {
    let mut out = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(pack_path)
        .with_context(|| format!("Unable to create pack file {}", pack_path.display()))?;

    out.write_all(PACK_MAGIC)?;
    out.write_u32::<byteorder::NetworkEndian>(PACK_VERSION)?;
    out.write_u32::<byteorder::NetworkEndian>(items.len() as u32)?;

    let mut offsets = Vec::with_capacity(items.len());
    let mut offset = PACK_HEADER_SIZE;

    for (item, comp) in items.iter().zip(compressed) {
        offsets.push((item.oid.clone(), offset));

        item.oid.write_raw_to(&mut out)?;
        out.write_u32::<byteorder::NetworkEndian>(comp.len() as u32)?;
        out.write_all(comp)?;

        offset += 20 + 4 + comp.len() as u64;
    }

    Ok(offsets)
}

fn write_index(idx_path: &Path, offsets: &[(ObjectId, u64)]) -> anyhow::Result<()> {
    let serialized = PackIndex::serialize(offsets)?;

    let mut out = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(idx_path)
        .with_context(|| format!("Unable to create pack index {}", idx_path.display()))?;
    out.write_all(&serialized)?;

    Ok(())
}
