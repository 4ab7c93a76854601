//! An in-memory NFSv4 server double, used only by the integration tests in
//! this directory. Good enough to drive the OPEN/CLOSE drivers through the
//! scenarios in SPEC_FULL.md §8 without a real network peer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use nfs41_open_state::client::Client;
use nfs41_open_state::config::DaemonConfig;
use nfs41_open_state::delegation::{DelegationHandle, DelegationRegistry, DelegationRequest};
use nfs41_open_state::error::{NfsStatus, RpcStatus};
use nfs41_open_state::nfs_rpc::{
    CreateHowMode, CreateReply, DelegationGrant, FileAttrs, IdMapper, LayoutCollaborator,
    LookupReply, NfsRpc, OpenArgs, OpenReply, SessionInfo, SetAttrs,
};
use nfs41_open_state::path::FileHandle;
use nfs41_open_state::stateid::StateId;

#[derive(Clone)]
enum Node {
    Directory { children: HashMap<String, u64> },
    File { size: u64 },
    Symlink { target: String },
}

/// A tiny single-tree filesystem keyed by an ever-increasing node id.
pub struct FakeServer {
    nodes: Mutex<HashMap<u64, Node>>,
    next_id: AtomicU64,
    next_seqid: AtomicU32,
    pub root: FileHandle,
}

fn handle_of(id: u64) -> FileHandle {
    FileHandle::new(id.to_be_bytes().to_vec()).unwrap()
}

fn id_of(handle: &FileHandle) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(handle.as_bytes());
    u64::from_be_bytes(bytes)
}

impl FakeServer {
    pub fn new() -> Arc<Self> {
        let mut nodes = HashMap::new();
        nodes.insert(0, Node::Directory { children: HashMap::new() });
        Arc::new(Self {
            nodes: Mutex::new(nodes),
            next_id: AtomicU64::new(1),
            next_seqid: AtomicU32::new(1),
            root: handle_of(0),
        })
    }

    /// Pre-seeds a regular file directly under the root, bypassing OPEN.
    pub fn seed_file(&self, name: &str, size: u64) -> FileHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut nodes = self.nodes.lock().unwrap();
        nodes.insert(id, Node::File { size });
        match nodes.get_mut(&0).unwrap() {
            Node::Directory { children } => {
                children.insert(name.to_string(), id);
            }
            _ => unreachable!(),
        }
        handle_of(id)
    }

    /// Pre-seeds a symlink directly under the root.
    pub fn seed_symlink(&self, name: &str, target: &str) -> FileHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut nodes = self.nodes.lock().unwrap();
        nodes.insert(id, Node::Symlink { target: target.to_string() });
        match nodes.get_mut(&0).unwrap() {
            Node::Directory { children } => {
                children.insert(name.to_string(), id);
            }
            _ => unreachable!(),
        }
        handle_of(id)
    }

    pub fn file_exists(&self, name: &str) -> bool {
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(&0).unwrap() {
            Node::Directory { children } => children.contains_key(name),
            _ => unreachable!(),
        }
    }

    fn attrs_for(&self, id: u64) -> FileAttrs {
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(&id) {
            Some(Node::Directory { .. }) => FileAttrs {
                size: 0,
                mode: 0o755,
                is_directory: true,
                is_symlink: false,
                owner: Some("alice".to_string()),
                owner_group: Some("staff".to_string()),
                change: 1,
            },
            Some(Node::File { size }) => FileAttrs {
                size: *size,
                mode: 0o644,
                is_directory: false,
                is_symlink: false,
                owner: Some("alice".to_string()),
                owner_group: Some("staff".to_string()),
                change: 1,
            },
            Some(Node::Symlink { .. }) => FileAttrs {
                size: 0,
                mode: 0o777,
                is_directory: false,
                is_symlink: true,
                owner: Some("alice".to_string()),
                owner_group: Some("staff".to_string()),
                change: 1,
            },
            None => FileAttrs::default(),
        }
    }

    fn fresh_stateid(&self) -> StateId {
        let seqid = self.next_seqid.fetch_add(1, Ordering::Relaxed);
        StateId { other: [seqid as u8; 12], seqid: 1 }
    }
}

impl NfsRpc for FakeServer {
    fn session_info(&self) -> SessionInfo {
        SessionInfo { is_persistent: false }
    }

    fn lookup(&self, parent: &FileHandle, name: &str) -> Result<LookupReply, NfsStatus> {
        let nodes = self.nodes.lock().unwrap();
        let parent_id = id_of(parent);
        let child_id = match nodes.get(&parent_id) {
            Some(Node::Directory { children }) => children.get(name).copied(),
            _ => None,
        };
        let child_id = child_id.ok_or(NfsStatus::NoEnt)?;
        drop(nodes);
        Ok(LookupReply { handle: handle_of(child_id), attrs: self.attrs_for(child_id) })
    }

    fn access(&self, _: &FileHandle, mask: u32) -> Result<u32, NfsStatus> {
        Ok(mask)
    }

    fn getattr(&self, handle: &FileHandle) -> Result<FileAttrs, NfsStatus> {
        Ok(self.attrs_for(id_of(handle)))
    }

    fn readlink(&self, handle: &FileHandle) -> Result<String, NfsStatus> {
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(&id_of(handle)) {
            Some(Node::Symlink { target }) => Ok(target.clone()),
            _ => Err(NfsStatus::Inval),
        }
    }

    fn open(&self, args: OpenArgs<'_>) -> Result<OpenReply, NfsStatus> {
        let parent_id = id_of(args.parent);
        let mut nodes = self.nodes.lock().unwrap();
        let existing = match nodes.get(&parent_id) {
            Some(Node::Directory { children }) => children.get(args.name).copied(),
            _ => return Err(NfsStatus::NotDir),
        };

        let id = match (existing, args.create) {
            (Some(id), None) => id,
            (Some(_), Some(CreateHowMode::Guarded | CreateHowMode::Exclusive4_1)) => {
                return Err(NfsStatus::Exist)
            }
            (Some(id), Some(CreateHowMode::Unchecked)) => {
                nodes.insert(id, Node::File { size: 0 });
                id
            }
            (None, None) => return Err(NfsStatus::NoEnt),
            (None, Some(_)) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                nodes.insert(id, Node::File { size: 0 });
                match nodes.get_mut(&parent_id).unwrap() {
                    Node::Directory { children } => {
                        children.insert(args.name.to_string(), id);
                    }
                    _ => unreachable!(),
                }
                id
            }
        };
        drop(nodes);

        Ok(OpenReply {
            handle: handle_of(id),
            stateid: self.fresh_stateid(),
            attrs: self.attrs_for(id),
            delegation: DelegationGrant::None,
        })
    }

    fn close(&self, _: &FileHandle, _: StateId) -> Result<(), NfsStatus> {
        Ok(())
    }

    fn remove(&self, parent: &FileHandle, name: &str) -> Result<(), NfsStatus> {
        let mut nodes = self.nodes.lock().unwrap();
        let parent_id = id_of(parent);
        let removed_id = match nodes.get_mut(&parent_id) {
            Some(Node::Directory { children }) => children.remove(name),
            _ => return Err(NfsStatus::NotDir),
        };
        let removed_id = removed_id.ok_or(NfsStatus::NoEnt)?;
        nodes.remove(&removed_id);
        Ok(())
    }

    fn rename(
        &self,
        from_parent: &FileHandle,
        from_name: &str,
        to_parent: &FileHandle,
        to_name: &str,
    ) -> Result<(), NfsStatus> {
        let mut nodes = self.nodes.lock().unwrap();
        let from_parent_id = id_of(from_parent);
        let moved = match nodes.get_mut(&from_parent_id) {
            Some(Node::Directory { children }) => children.remove(from_name),
            _ => return Err(NfsStatus::NotDir),
        };
        let moved = moved.ok_or(NfsStatus::NoEnt)?;
        let to_parent_id = id_of(to_parent);
        match nodes.get_mut(&to_parent_id) {
            Some(Node::Directory { children }) => {
                children.insert(to_name.to_string(), moved);
            }
            _ => return Err(NfsStatus::NotDir),
        }
        Ok(())
    }

    fn create_dir(&self, parent: &FileHandle, name: &str, _: &SetAttrs) -> Result<CreateReply, NfsStatus> {
        let parent_id = id_of(parent);
        let mut nodes = self.nodes.lock().unwrap();
        if let Some(Node::Directory { children }) = nodes.get(&parent_id) {
            if children.contains_key(name) {
                return Err(NfsStatus::Exist);
            }
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        nodes.insert(id, Node::Directory { children: HashMap::new() });
        match nodes.get_mut(&parent_id).unwrap() {
            Node::Directory { children } => {
                children.insert(name.to_string(), id);
            }
            _ => return Err(NfsStatus::NotDir),
        }
        drop(nodes);
        Ok(CreateReply { handle: handle_of(id), attrs: self.attrs_for(id) })
    }

    fn create_symlink(
        &self,
        parent: &FileHandle,
        name: &str,
        target: &str,
        _: u32,
    ) -> Result<CreateReply, NfsStatus> {
        let parent_id = id_of(parent);
        let mut nodes = self.nodes.lock().unwrap();
        if let Some(Node::Directory { children }) = nodes.get(&parent_id) {
            if children.contains_key(name) {
                return Err(NfsStatus::Exist);
            }
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        nodes.insert(id, Node::Symlink { target: target.to_string() });
        match nodes.get_mut(&parent_id).unwrap() {
            Node::Directory { children } => {
                children.insert(name.to_string(), id);
            }
            _ => return Err(NfsStatus::NotDir),
        }
        drop(nodes);
        Ok(CreateReply { handle: handle_of(id), attrs: self.attrs_for(id) })
    }

    fn setattr(&self, handle: &FileHandle, attrs: &SetAttrs) -> Result<(), NfsStatus> {
        if let Some(size) = attrs.size {
            let mut nodes = self.nodes.lock().unwrap();
            if let Some(Node::File { size: stored }) = nodes.get_mut(&id_of(handle)) {
                *stored = size;
            }
        }
        Ok(())
    }
}

pub struct NoopDelegations;
impl DelegationRegistry for NoopDelegations {
    fn lookup_cached(&self, _: &FileHandle) -> Option<DelegationHandle> {
        None
    }
    fn register(&self, _: u64, _: &FileHandle, _: DelegationRequest) -> Option<DelegationHandle> {
        None
    }
    fn return_delegation(&self, _: &DelegationHandle) -> Result<(), RpcStatus> {
        Ok(())
    }
    fn detach_srv_open(&self, _: u64) {}
}

pub struct NoopLayouts;
impl LayoutCollaborator for NoopLayouts {
    fn close_layouts(&self, _: &FileHandle) -> Result<(), NfsStatus> {
        Ok(())
    }
}

pub struct NoopIdMap;
impl IdMapper for NoopIdMap {
    fn to_local_uid(&self, _: &str) -> u32 {
        1000
    }
    fn to_local_gid(&self, _: &str) -> u32 {
        1000
    }
}

/// Builds a client wired to a fresh [`FakeServer`], returning both so tests
/// can seed files and assert on server-side state after the fact.
pub fn test_client() -> (Arc<Client>, Arc<FakeServer>) {
    let server = FakeServer::new();
    let client = Arc::new(Client::new(
        server.clone(),
        Arc::new(NoopDelegations),
        Arc::new(NoopLayouts),
        Arc::new(NoopIdMap),
        DaemonConfig::default(),
    ));
    (client, server)
}

pub fn base_request(path: &str) -> nfs41_open_state::open_driver::OpenRequest {
    use nfs41_open_state::mapper::Disposition;
    nfs41_open_state::open_driver::OpenRequest {
        path: path.to_string(),
        access_mask: nfs41_open_state::mapper::access_mask::FILE_READ_DATA,
        access_mode: nfs41_open_state::mapper::share_mode::SHARE_READ
            | nfs41_open_state::mapper::share_mode::SHARE_WRITE,
        file_attrs: 0,
        create_opts: 0,
        disposition: Disposition::Open,
        open_owner_id: 1,
        mode: 0o644,
        owner_local_uid: None,
        owner_group_local_gid: None,
        srv_open: 0,
        symlink: None,
        ea: None,
    }
}
