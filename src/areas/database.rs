//! Content-addressable object database.
//!
//! Objects are zlib-compressed `"<kind> <len>\0<data>"` buffers addressed
//! by the SHA-1 of the uncompressed form. Reads check loose storage first
//! (`objects/<2-hex>/<38-hex>`), then every loaded pack; writes are
//! idempotent and atomic (temp file + rename), so a reader never observes a
//! partially written object. Pack entries that decompress to a delta
//! payload are resolved against their base, which may itself be loose or
//! packed, before parsing.

use crate::artifacts::core::{zlib_compress, zlib_decompress};
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object::{Object, ObjectBox, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use crate::artifacts::pack::delta::{self, DeltaDocument, DELTA_MARKER};
use crate::artifacts::pack::pack_file::PackFile;
use crate::artifacts::pack::pack_index::PackIndex;
use crate::errors::EngineError;
use anyhow::Context;
use bytes::Bytes;
use fake::rand;
use std::cell::RefCell;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

/// Directory under `objects/` holding packs
const PACK_DIR: &str = "pack";

/// Directory under `objects/` where GC relocates packed loose objects
const BACKUP_DIR: &str = "backup";

#[derive(Debug)]
struct PackBundle {
    index: PackIndex,
    pack: PackFile,
}

#[derive(Debug)]
pub struct Database {
    path: Box<Path>,
    /// Loaded pack bundles; `None` until first needed or after invalidation
    packs: RefCell<Option<Vec<PackBundle>>>,
}

impl Database {
    pub fn new(path: Box<Path>) -> Self {
        Database {
            path,
            packs: RefCell::new(None),
        }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    pub fn pack_path(&self) -> PathBuf {
        self.path.join(PACK_DIR)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.path.join(BACKUP_DIR)
    }

    /// Store an object. Writing the same object twice is a no-op on the
    /// second call and returns the same id.
    pub fn store(&self, object: &impl Object) -> anyhow::Result<ObjectId> {
        let oid = object.object_id()?;
        let object_path = self.path.join(oid.to_path());

        if !object_path.exists() {
            std::fs::create_dir_all(
                object_path
                    .parent()
                    .context(format!("Invalid object path {}", object_path.display()))?,
            )
            .context(format!(
                "Unable to create object directory {}",
                object_path.display()
            ))?;

            self.write_object(object_path, object.serialize()?)?;
        }

        Ok(oid)
    }

    /// Load the full serialized form of an object, from loose storage or
    /// from a pack (resolving deltas). Fails with
    /// [`EngineError::ObjectNotFound`] when the hash is absent from both.
    pub fn load(&self, oid: &ObjectId) -> anyhow::Result<Bytes> {
        let object_path = self.path.join(oid.to_path());

        if object_path.exists() {
            let compressed = std::fs::read(&object_path).context(format!(
                "Unable to read object file {}",
                object_path.display()
            ))?;
            return zlib_decompress(&compressed);
        }

        if let Some(packed) = self.read_from_packs(oid)? {
            return Ok(packed);
        }

        Err(EngineError::ObjectNotFound(oid.clone()).into())
    }

    /// Whether the object exists, loose or packed.
    pub fn contains(&self, oid: &ObjectId) -> anyhow::Result<bool> {
        if self.path.join(oid.to_path()).exists() {
            return Ok(true);
        }

        self.with_packs(|packs| packs.iter().any(|bundle| bundle.index.contains(oid)))
    }

    pub fn has_loose(&self, oid: &ObjectId) -> bool {
        self.path.join(oid.to_path()).exists()
    }

    /// Split a serialized object into its kind and payload, failing with
    /// [`EngineError::SizeMismatch`] when the declared length disagrees
    /// with the payload. This check runs on every read.
    pub fn parse_raw(content: &Bytes) -> anyhow::Result<(ObjectType, Bytes)> {
        let mut reader = Cursor::new(content.as_ref());
        let (object_type, declared) = ObjectType::parse_header(&mut reader)?;

        let payload = content.slice(reader.position() as usize..);
        if declared != payload.len() {
            return Err(EngineError::SizeMismatch {
                declared,
                actual: payload.len(),
            }
            .into());
        }

        Ok((object_type, payload))
    }

    pub fn parse_object(&self, oid: &ObjectId) -> anyhow::Result<ObjectBox> {
        let (object_type, payload) = Self::parse_raw(&self.load(oid)?)?;
        let reader = Cursor::new(payload);

        match object_type {
            ObjectType::Blob => Ok(ObjectBox::Blob(Box::new(Blob::deserialize(reader)?))),
            ObjectType::Tree => Ok(ObjectBox::Tree(Box::new(Tree::deserialize(reader)?))),
            ObjectType::Commit => Ok(ObjectBox::Commit(Box::new(Commit::deserialize(reader)?))),
        }
    }

    pub fn parse_object_as_blob(&self, oid: &ObjectId) -> anyhow::Result<Option<Blob>> {
        match self.parse_object(oid)? {
            ObjectBox::Blob(blob) => Ok(Some(*blob)),
            _ => Ok(None),
        }
    }

    pub fn parse_object_as_tree(&self, oid: &ObjectId) -> anyhow::Result<Option<Tree>> {
        match self.parse_object(oid)? {
            ObjectBox::Tree(tree) => Ok(Some(*tree)),
            _ => Ok(None),
        }
    }

    pub fn parse_object_as_commit(&self, oid: &ObjectId) -> anyhow::Result<Option<Commit>> {
        match self.parse_object(oid)? {
            ObjectBox::Commit(commit) => Ok(Some(*commit)),
            _ => Ok(None),
        }
    }

    /// Drop the loaded pack list so the next read rescans the pack
    /// directory. Called after a new pack is written.
    pub fn reload_packs(&self) {
        *self.packs.borrow_mut() = None;
    }

    /// After a pack is confirmed written, relocate each packed loose object
    /// to the backup area. Objects are moved, never deleted, so GC stays
    /// reversible.
    pub fn relocate_to_backup(&self, oids: &[ObjectId]) -> anyhow::Result<PathBuf> {
        let backup_dir = self.backup_path();
        std::fs::create_dir_all(&backup_dir).context(format!(
            "Unable to create backup directory {}",
            backup_dir.display()
        ))?;

        for oid in oids {
            let loose_path = self.path.join(oid.to_path());
            if !loose_path.exists() {
                continue;
            }

            let target = backup_dir.join(oid.as_ref());
            if !target.exists() {
                std::fs::rename(&loose_path, &target).context(format!(
                    "Unable to move {} to backup",
                    loose_path.display()
                ))?;
            }

            // prune the fan-out directory once emptied
            if let Some(fan_out) = loose_path.parent()
                && fan_out.read_dir().map(|mut d| d.next().is_none()).unwrap_or(false)
            {
                let _ = std::fs::remove_dir(fan_out);
            }
        }

        Ok(backup_dir)
    }

    fn read_from_packs(&self, oid: &ObjectId) -> anyhow::Result<Option<Bytes>> {
        let raw = self.with_packs(|packs| {
            for bundle in packs {
                if let Some(offset) = bundle.index.offset_of(oid) {
                    return Some(bundle.pack.read_object_at(offset));
                }
            }
            None
        })?;

        match raw {
            None => Ok(None),
            Some(bytes) => {
                let bytes = bytes?;
                if bytes.starts_with(DELTA_MARKER) {
                    Ok(Some(self.resolve_delta(&bytes[DELTA_MARKER.len()..])?))
                } else {
                    Ok(Some(bytes))
                }
            }
        }
    }

    /// Rebuild a delta-encoded blob: load the base (recursively, from loose
    /// storage or any pack), replay the instructions, and re-wrap the
    /// payload in canonical object form.
    fn resolve_delta(&self, payload: &[u8]) -> anyhow::Result<Bytes> {
        let document = DeltaDocument::deserialize(payload)?;

        let base_full = self.load(&document.base)?;
        let (_, base_payload) = Self::parse_raw(&base_full)?;

        let target_payload = delta::apply(&base_payload, &document.ops)?;

        let mut full = Vec::new();
        let header = format!("{} {}\0", ObjectType::Blob.as_str(), target_payload.len());
        full.write_all(header.as_bytes())?;
        full.write_all(&target_payload)?;

        Ok(Bytes::from(full))
    }

    fn with_packs<T>(&self, f: impl FnOnce(&[PackBundle]) -> T) -> anyhow::Result<T> {
        let mut packs = self.packs.borrow_mut();
        if packs.is_none() {
            *packs = Some(self.scan_packs()?);
        }

        Ok(f(packs.as_deref().unwrap_or(&[])))
    }

    fn scan_packs(&self) -> anyhow::Result<Vec<PackBundle>> {
        let pack_dir = self.pack_path();
        if !pack_dir.exists() {
            return Ok(Vec::new());
        }

        let mut bundles = Vec::new();
        for entry in std::fs::read_dir(&pack_dir)? {
            let idx_path = entry?.path();
            if idx_path.extension().and_then(|e| e.to_str()) != Some("idx") {
                continue;
            }

            let pack_path = idx_path.with_extension("pack");
            if pack_path.exists() {
                bundles.push(PackBundle {
                    index: PackIndex::load(&idx_path)?,
                    pack: PackFile::new(pack_path),
                });
            }
        }

        Ok(bundles)
    }

    fn write_object(&self, object_path: PathBuf, object_content: Bytes) -> anyhow::Result<()> {
        let object_dir = object_path
            .parent()
            .context(format!("Invalid object path {}", object_path.display()))?;
        let temp_object_path = object_dir.join(Self::generate_temp_name());

        let object_content = zlib_compress(&object_content)?;

        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_object_path)
            .context(format!(
                "Unable to open object file {}",
                temp_object_path.display()
            ))?;

        file.write_all(&object_content).context(format!(
            "Unable to write object file {}",
            temp_object_path.display()
        ))?;

        // rename the temp file onto the object file to make the write atomic
        std::fs::rename(&temp_object_path, &object_path).context(format!(
            "Unable to rename object file to {}",
            object_path.display()
        ))?;

        Ok(())
    }

    fn generate_temp_name() -> String {
        format!("tmp-obj-{}", rand::random::<u32>())
    }
}
