//! The NFSv4.1 RPC collaborator contract. XDR encode/decode, COMPOUND framing,
//! and sequence-ordering all belong to this collaborator and are out of
//! scope here (§1) -- this module only states the operations the open-state
//! engine drives: LOOKUP, ACCESS, GETATTR, OPEN (CLAIM_NULL), CLOSE, REMOVE,
//! RENAME, CREATE (DIR/LNK), SETATTR.

use crate::error::NfsStatus;
use crate::path::FileHandle;
use crate::stateid::StateId;

/// Minimal subset of `fattr4` this crate reads back from the server.
#[derive(Debug, Clone, Default)]
pub struct FileAttrs {
    pub size: u64,
    pub mode: u32,
    pub is_directory: bool,
    pub is_symlink: bool,
    pub owner: Option<String>,
    pub owner_group: Option<String>,
    pub change: u64,
}

/// Attributes a CREATE/SETATTR may set. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct SetAttrs {
    pub mode: Option<u32>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct LookupReply {
    pub handle: FileHandle,
    pub attrs: FileAttrs,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CreateHowMode {
    Unchecked,
    Guarded,
    Exclusive4_1,
}

#[derive(Debug, Clone, Copy)]
pub struct OpenArgs<'a> {
    pub parent: &'a FileHandle,
    pub name: &'a str,
    pub owner: &'a [u8],
    pub share_access: u32,
    pub share_deny: u32,
    pub create: Option<CreateHowMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DelegationGrant {
    None,
    Read,
    Write,
}

#[derive(Debug, Clone)]
pub struct OpenReply {
    pub handle: FileHandle,
    pub stateid: StateId,
    pub attrs: FileAttrs,
    pub delegation: DelegationGrant,
}

#[derive(Debug, Clone)]
pub struct CreateReply {
    pub handle: FileHandle,
    pub attrs: FileAttrs,
}

/// Whether the session this open rides on promises persistence across a
/// server reboot; governs GUARDED4 vs EXCLUSIVE4_1 createhowmode selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionInfo {
    pub is_persistent: bool,
}

/// The RPC collaborator. An implementation lives outside this crate (it owns
/// the TCP/RDMA transport, XDR codec, and COMPOUND/sequence bookkeeping); the
/// open-state engine only ever sees this trait.
pub trait NfsRpc: Send + Sync {
    fn session_info(&self) -> SessionInfo;

    fn lookup(&self, parent: &FileHandle, name: &str) -> Result<LookupReply, NfsStatus>;

    fn access(&self, handle: &FileHandle, mask: u32) -> Result<u32, NfsStatus>;

    fn getattr(&self, handle: &FileHandle) -> Result<FileAttrs, NfsStatus>;

    /// Reads a symlink's target text, for reparse-point chasing (SPEC_FULL
    /// §4.2 step 2).
    fn readlink(&self, handle: &FileHandle) -> Result<String, NfsStatus>;

    fn open(&self, args: OpenArgs<'_>) -> Result<OpenReply, NfsStatus>;

    fn close(&self, handle: &FileHandle, stateid: StateId) -> Result<(), NfsStatus>;

    fn remove(&self, parent: &FileHandle, name: &str) -> Result<(), NfsStatus>;

    fn rename(
        &self,
        from_parent: &FileHandle,
        from_name: &str,
        to_parent: &FileHandle,
        to_name: &str,
    ) -> Result<(), NfsStatus>;

    fn create_dir(
        &self,
        parent: &FileHandle,
        name: &str,
        attrs: &SetAttrs,
    ) -> Result<CreateReply, NfsStatus>;

    fn create_symlink(
        &self,
        parent: &FileHandle,
        name: &str,
        target: &str,
        mode: u32,
    ) -> Result<CreateReply, NfsStatus>;

    fn setattr(&self, handle: &FileHandle, attrs: &SetAttrs) -> Result<(), NfsStatus>;
}

/// Layout collaborator consulted by CLOSE (C7) for regular files; pNFS
/// layout logic beyond this call is out of scope (§1 non-goals).
pub trait LayoutCollaborator: Send + Sync {
    fn close_layouts(&self, handle: &FileHandle) -> Result<(), NfsStatus>;
}

/// Maps NFS string owner/owner_group names to local uid/gid. Unmapped names
/// fall back to sentinel nobody/nogroup ids (SPEC_FULL §4.2 step 5).
pub trait IdMapper: Send + Sync {
    fn to_local_uid(&self, nfs_owner: &str) -> u32;
    fn to_local_gid(&self, nfs_owner_group: &str) -> u32;
    fn nobody_uid(&self) -> u32 {
        u32::MAX
    }
    fn nogroup_gid(&self) -> u32 {
        u32::MAX
    }
}
