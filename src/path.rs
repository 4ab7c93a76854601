//! Path and filehandle record (C1): the immutable-after-init pathname plus
//! the mutable server filehandle pair that every open-state owns.

use std::sync::RwLock;

use crate::error::HostStatus;

/// Bound on the textual path, matching the kernel upcall's packed field.
pub const MAX_PATH: usize = 4096;

/// Bound on an NFS filehandle's opaque byte length.
pub const MAX_FH: usize = 128;

/// An opaque NFSv4 filehandle, bounded by [`MAX_FH`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FileHandle(Vec<u8>);

impl FileHandle {
    pub fn new(bytes: Vec<u8>) -> Result<Self, HostStatus> {
        if bytes.len() > MAX_FH {
            return Err(HostStatus::BufferOverflow);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Opaque reference to the kernel's superblock object for a mount. Carried
/// from parent to child during the symlink-creation deferral (SPEC_FULL
/// §4.2 step 3) so a later SETATTR never dereferences a missing superblock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SuperblockRef(pub u64);

/// One half of the `file`/`parent` pair: a filehandle plus the name that
/// resolves to it, and (for `parent`) the superblock it belongs to.
#[derive(Debug, Clone, Default)]
pub struct FileHandleView {
    pub handle: FileHandle,
    pub name: String,
    pub superblock: Option<SuperblockRef>,
}

struct PathInner {
    path: String,
    /// Byte offset of the last path component within `path`.
    name_start: usize,
}

impl PathInner {
    fn new(path: String) -> Self {
        let name_start = last_component_offset(&path);
        Self { path, name_start }
    }

    fn name(&self) -> &str {
        &self.path[self.name_start..]
    }

    fn parent(&self) -> &str {
        if self.name_start == 0 {
            &self.path[..0]
        } else {
            self.path[..self.name_start].trim_end_matches('/')
        }
    }
}

/// Offset of the last `/`-separated component, re-derived whenever the path
/// is rewritten by a reparse. The name slice is always a view into `path`,
/// never an independent allocation.
fn last_component_offset(path: &str) -> usize {
    match path.rfind('/') {
        Some(idx) => idx + 1,
        None => 0,
    }
}

/// C1. Concurrent readers coexist with exclusive writers via a reader-writer
/// lock; writers only run during reparse path rewrites (the path is
/// immutable after construction otherwise).
pub struct PathRecord {
    inner: RwLock<PathInner>,
}

impl PathRecord {
    pub fn new(path: String) -> Result<Self, HostStatus> {
        if path.len() >= MAX_PATH {
            return Err(HostStatus::FilenameExcedRange);
        }
        Ok(Self { inner: RwLock::new(PathInner::new(path)) })
    }

    /// Current full path, cloned out from under the shared lock.
    pub fn full_path(&self) -> String {
        self.inner.read().unwrap().path.clone()
    }

    /// Last path component (the leaf name), cloned out from under the shared lock.
    pub fn name(&self) -> String {
        self.inner.read().unwrap().name().to_string()
    }

    /// Lexical parent of the leaf, cloned out from under the shared lock.
    pub fn parent(&self) -> String {
        self.inner.read().unwrap().parent().to_string()
    }

    /// Rewrites the path (a reparse) under the exclusive lock, re-deriving
    /// the name slice from the new text.
    pub fn rewrite(&self, new_path: String) -> Result<(), HostStatus> {
        if new_path.len() >= MAX_PATH {
            return Err(HostStatus::FilenameExcedRange);
        }
        let mut guard = self.inner.write().unwrap();
        *guard = PathInner::new(new_path);
        Ok(())
    }
}

impl std::fmt::Debug for PathRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathRecord").field("path", &self.full_path()).finish()
    }
}
