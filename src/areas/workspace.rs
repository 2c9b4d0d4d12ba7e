//! Working-tree file I/O.
//!
//! Reads are binary-safe; writes create parent directories and set the
//! executable bit when the staged mode requires it. Paths are always
//! relative to the workspace root.

use crate::artifacts::index::index_entry::EntryMetadata;
use bytes::Bytes;
use std::path::Path;

#[derive(Debug)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: Box<Path>) -> Self {
        Workspace { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_file(&self, file_path: &Path) -> anyhow::Result<Bytes> {
        let file_path = self.path.join(file_path);
        let content = std::fs::read(file_path)?;

        Ok(Bytes::from(content))
    }

    pub fn stat_file(&self, file_path: &Path) -> anyhow::Result<EntryMetadata> {
        let full_path = self.path.join(file_path);
        let metadata = std::fs::metadata(&full_path)?;

        (full_path.as_path(), metadata).try_into()
    }

    pub fn write_file(
        &self,
        file_path: &Path,
        data: &[u8],
        executable: bool,
    ) -> anyhow::Result<()> {
        let full_path = self.path.join(file_path);

        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full_path, data)?;

        if executable {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o755))?;
        }

        Ok(())
    }

    pub fn file_exists(&self, file_path: &Path) -> bool {
        self.path.join(file_path).exists()
    }
}
