//! OPEN driver (C5): lookup, reparse chasing, type checks, CREATE vs OPEN
//! decision, delegation consultation, retry-on-conflict. The largest single
//! component; see SPEC_FULL.md §4.2 for the numbered algorithm this follows
//! step for step.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::client::Client;
use crate::delegation::{DelegationKind, DelegationRequest};
use crate::error::{nfs_to_host_error, HostStatus, NfsStatus, OpenError};
use crate::mapper::{self, CreateDecision, Disposition, LookupStatus, MapperInput};
use crate::nfs_rpc::{CreateHowMode, DelegationGrant, FileAttrs, OpenArgs, SetAttrs};
use crate::open_state::{FileKind, OpenState};
use crate::owner::OpenOwner;
use crate::path::{FileHandle, FileHandleView, PathRecord, SuperblockRef};
use crate::state_ref::StateRef;

/// Bytes carried in a kernel OPEN upcall (SPEC_FULL §6).
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub path: String,
    pub access_mask: u32,
    pub access_mode: u32,
    pub file_attrs: u32,
    pub create_opts: u32,
    pub disposition: Disposition,
    pub open_owner_id: u32,
    pub mode: u32,
    pub owner_local_uid: Option<u32>,
    pub owner_group_local_gid: Option<u32>,
    pub srv_open: u64,
    pub symlink: Option<String>,
    pub ea: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BasicInfo {
    pub attrs: u32,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StdInfo {
    pub size: u64,
    pub nlink: u32,
    pub directory: bool,
}

/// Bytes carried back on a kernel OPEN downcall (SPEC_FULL §6).
#[derive(Debug, Clone)]
pub struct OpenInfo {
    pub basic: BasicInfo,
    pub std: StdInfo,
    pub state_ref: StateRef,
    pub mode: u32,
    pub owner_local_uid: Option<u32>,
    pub owner_group_local_gid: Option<u32>,
    pub changeattr: u64,
    pub deleg_type: DelegationGrant,
    pub do_close: bool,
    pub created: bool,
    /// Set alongside success when the kernel must still be told a create
    /// path was taken (SPEC_FULL §4.1, "pre-error hint").
    pub pre_error_hint: Option<HostStatus>,
}

/// What the OPEN driver hands back to the upcall dispatcher.
#[derive(Debug, Clone)]
pub enum OpenOutcome {
    Opened(OpenInfo),
    /// A symlink was found mid-path (or, without `OPEN_REPARSE_POINT`, at the
    /// leaf); the kernel must re-issue the OPEN against the rewritten path.
    Reparse { path: String, embedded: bool },
}

fn attrs_to_info(attrs: &FileAttrs) -> (BasicInfo, StdInfo) {
    (
        BasicInfo { attrs: 0, atime: 0, mtime: 0, ctime: 0 },
        StdInfo { size: attrs.size, nlink: 1, directory: attrs.is_directory },
    )
}

fn open_for_attributes(req: &OpenRequest, found: bool) -> bool {
    use mapper::access_mask::{READ_SHAPED, WRITE_SHAPED};
    let no_data_rights = req.access_mask & (READ_SHAPED | WRITE_SHAPED) == 0;
    no_data_rights && found
        && matches!(req.disposition, Disposition::Open | Disposition::Overwrite)
}

fn is_symlink_create_pattern(req: &OpenRequest) -> bool {
    use mapper::access_mask::{DELETE, FILE_WRITE_ATTRIBUTES, SYNCHRONIZE};
    use mapper::create_opts::OPEN_REPARSE_POINT;

    req.disposition == Disposition::Create
        && req.access_mask == (FILE_WRITE_ATTRIBUTES | SYNCHRONIZE | DELETE)
        && req.access_mode == 0
        && req.create_opts & OPEN_REPARSE_POINT != 0
}

enum Lookup {
    Found { handle: FileHandle, attrs: FileAttrs },
    NotFound,
    Reparse { rewritten_path: String, embedded: bool },
}

/// Resolves `path` against the server, chasing intermediate symlinks up to
/// `max_depth` times (SPEC_FULL §4.2 step 2).
fn resolve(
    client: &Client,
    root: &FileHandle,
    path: &PathRecord,
    leaf_wants_reparse_point: bool,
    max_depth: u32,
) -> Result<Lookup, OpenError> {
    // A single reparse point can appear at most once per call: whichever
    // component triggers it causes an immediate return so the kernel can
    // re-issue OPEN against the rewritten path (SPEC_FULL §4.2 step 2).
    let mut depth = 0;
    let full = path.full_path();
    let components: Vec<&str> = full.trim_start_matches('/').split('/').collect();
    let mut current = root.clone();
    let mut attrs = FileAttrs::default();

    for (i, component) in components.iter().enumerate() {
        if component.is_empty() {
            continue;
        }
        match client.rpc.lookup(&current, component) {
            Ok(reply) => {
                attrs = reply.attrs.clone();
                current = reply.handle;
                let is_leaf = i + 1 == components.len();
                if attrs.is_symlink && !(is_leaf && leaf_wants_reparse_point) {
                    depth += 1;
                    if depth > max_depth {
                        return Err(OpenError::Host(HostStatus::TooManyLinks));
                    }
                    let target = client.rpc.readlink(&current)?;
                    let rewritten = rewrite_with_target(&full, component, &target);
                    let embedded = !is_leaf;
                    return Ok(Lookup::Reparse { rewritten_path: rewritten, embedded });
                }
            }
            Err(NfsStatus::NoEnt) => return Ok(Lookup::NotFound),
            Err(status) => return Err(OpenError::Nfs(status)),
        }
    }
    Ok(Lookup::Found { handle: current, attrs })
}

fn rewrite_with_target(full_path: &str, component: &str, target: &str) -> String {
    match full_path.find(component) {
        Some(idx) => {
            let mut out = String::with_capacity(full_path.len());
            out.push_str(&full_path[..idx]);
            out.push_str(target);
            out.push_str(&full_path[idx + component.len()..]);
            out
        }
        None => full_path.to_string(),
    }
}

fn check_type_against_create_opts(create_opts: u32, is_dir: bool) -> Result<(), HostStatus> {
    use mapper::create_opts::{DIRECTORY_FILE, NON_DIRECTORY_FILE};
    if create_opts & DIRECTORY_FILE != 0 && !is_dir {
        return Err(HostStatus::BadFileType);
    }
    if create_opts & NON_DIRECTORY_FILE != 0 && is_dir {
        return Err(HostStatus::Directory);
    }
    Ok(())
}

/// `open_or_delegate` (SPEC_FULL §4.2 step 8): consults the delegation
/// registry before sending an OPEN; registers with it afterwards.
fn open_or_delegate(
    client: &Client,
    state: &OpenState,
    parent: &FileHandle,
    name: &str,
    share_access: u32,
    share_deny: u32,
    create: Option<CreateHowMode>,
) -> Result<DelegationGrant, OpenError> {
    let owner = state.owner.as_bytes().to_vec();

    if create.is_none() {
        if let Some(cached) = client.delegations.lookup_cached(&state.file().handle) {
            state.attach_delegation(cached);
            return Ok(DelegationGrant::None);
        }
    }

    let reply = client.rpc.open(OpenArgs {
        parent,
        name,
        owner: &owner,
        share_access,
        share_deny,
        create,
    })?;

    state.set_file(FileHandleView {
        handle: reply.handle.clone(),
        name: name.to_string(),
        superblock: None,
    });
    let srv_open = client.next_srv_open();
    state.set_open_stateid(reply.stateid, srv_open);

    let suppress = share_access & mapper::share_access::WANT_NO_DELEG != 0;
    if let Some(handle) = client.delegations.register(
        state.srv_open(),
        &reply.handle,
        DelegationRequest { share_access, suppress },
    ) {
        state.attach_delegation(handle);
    }

    Ok(reply.delegation)
}

/// SUPERSEDE pre-remove (SPEC_FULL §4.2 step 7): return any write delegation,
/// REMOVE, then OPEN/CREATE, retrying a bounded number of times if the
/// CREATE races and loses (REDESIGN FLAG R1 -- the original left this
/// unbounded).
fn supersede_then_create(
    client: &Client,
    state: &OpenState,
    parent: &FileHandle,
    name: &str,
    share_access: u32,
    share_deny: u32,
    createhow: CreateHowMode,
) -> Result<DelegationGrant, OpenError> {
    for attempt in 0..client.config.max_supersede_retries {
        if let Some(delegation) = state.delegation() {
            if matches!(delegation.kind(), DelegationKind::Write) {
                let _ = client.delegations.return_delegation(&delegation);
                state.detach_delegation();
            }
        }

        match client.rpc.remove(parent, name) {
            Ok(()) | Err(NfsStatus::NoEnt) => {}
            Err(status) => return Err(OpenError::Nfs(status)),
        }

        match open_or_delegate(client, state, parent, name, share_access, share_deny, Some(createhow)) {
            Ok(grant) => return Ok(grant),
            Err(OpenError::Nfs(NfsStatus::Exist)) => {
                debug!(attempt, "supersede CREATE raced with another creator, retrying");
                continue;
            }
            Err(other) => return Err(other),
        }
    }
    warn!(
        retries = client.config.max_supersede_retries,
        "supersede retry cap exceeded"
    );
    Err(OpenError::Host(HostStatus::InternalError))
}

/// `create_open_state` + the full algorithm of SPEC_FULL §4.2.
#[instrument(skip(client, req), fields(path = %req.path))]
pub fn open(client: &Client, root: &FileHandle, req: OpenRequest) -> Result<OpenOutcome, HostStatus> {
    let provisional_kind = if req.create_opts & mapper::create_opts::DIRECTORY_FILE != 0 {
        FileKind::Directory
    } else {
        FileKind::Other
    };

    let path = PathRecord::new(req.path.clone())?;
    let owner = OpenOwner::from_id(req.open_owner_id);
    let state = OpenState::new(path, owner, provisional_kind, Arc::clone(&client.rpc));

    match open_inner(client, root, &req, &state) {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            // Nothing was published; the only reference is the local `state`,
            // which is dropped here, running cleanup (design §7: "on any
            // failure after allocation, release the initial reference").
            Err(err.to_host(HostStatus::FileNotFound))
        }
    }
}

fn open_inner(
    client: &Client,
    root: &FileHandle,
    req: &OpenRequest,
    state: &Arc<OpenState>,
) -> Result<OpenOutcome, OpenError> {
    let leaf_wants_reparse_point = req.create_opts & mapper::create_opts::OPEN_REPARSE_POINT != 0;

    let lookup = resolve(client, root, &state.path, leaf_wants_reparse_point, client.config.max_symlink_depth)?;

    let (found, attrs, server_handle) = match lookup {
        Lookup::Reparse { rewritten_path, embedded } => {
            state.path.rewrite(rewritten_path.clone())?;
            return Ok(OpenOutcome::Reparse { path: rewritten_path, embedded });
        }
        Lookup::Found { handle, attrs } => {
            check_type_against_create_opts(req.create_opts, attrs.is_directory)?;
            state.set_kind(if attrs.is_directory {
                FileKind::Directory
            } else if attrs.is_symlink {
                FileKind::Symlink
            } else {
                FileKind::Regular
            });
            (true, Some(attrs.clone()), Some(handle))
        }
        Lookup::NotFound => (false, None, None),
    };

    if let Some(handle) = &server_handle {
        state.set_file(FileHandleView { handle: handle.clone(), name: state.path.name(), superblock: None });
    }

    // Step 3: symlink-creation deferral.
    if !found && is_symlink_create_pattern(req) {
        let parent_sb = SuperblockRef(0);
        state.set_parent(FileHandleView {
            handle: FileHandle::default(),
            name: state.path.parent(),
            superblock: Some(parent_sb),
        });
        return Ok(publish(client, state, build_info(StateRef::from_wire(0), DelegationGrant::None, false, None, req, None)));
    }

    // Step 4: cygwin-style symlink.
    if let Some(target) = &req.symlink {
        if !target.is_empty() {
            let parent = server_parent_handle(client, root, state)?;
            let created = client.rpc.create_symlink(&parent, &state.path.name(), target, 0o777)?;
            state.set_file(FileHandleView { handle: created.handle, name: state.path.name(), superblock: None });
            state.set_kind(FileKind::Symlink);
            return Ok(publish(client, state, build_info(StateRef::from_wire(0), DelegationGrant::None, true, None, req, None)));
        }
    }

    // Step 5: attributes-only opens.
    if open_for_attributes(req, found) {
        let mut attrs = attrs.expect("found implies attrs");
        if attrs.owner.is_none() || attrs.owner_group.is_none() {
            attrs = client.rpc.getattr(server_handle.as_ref().expect("found implies handle"))?;
        }
        let uid = attrs.owner.as_deref().map(|o| client.idmap.to_local_uid(o));
        let gid = attrs.owner_group.as_deref().map(|g| client.idmap.to_local_gid(g));
        return Ok(publish(
            client,
            state,
            build_info(StateRef::from_wire(0), DelegationGrant::None, false, None, req, Some((&attrs, uid, gid))),
        ));
    }

    // Step 6: data-bearing opens -- compute OPEN arguments via the mapper.
    let mapped = mapper::map(MapperInput {
        access_mask: req.access_mask,
        access_mode: req.access_mode,
        disposition: req.disposition,
        lookup_status: if found { LookupStatus::Found } else { LookupStatus::NotFound },
        session_is_persistent: client.rpc.session_info().is_persistent,
    })?;

    if req.access_mask & mapper::access_mask::FILE_EXECUTE != 0 {
        if let Some(handle) = &server_handle {
            let requested = mapper::access_mask::FILE_EXECUTE | mapper::access_mask::FILE_READ_DATA;
            let _ = client.rpc.access(handle, requested);
            // A server unable to verify EXECUTE accepts READ as a proxy
            // (SPEC_FULL §4.2 step 6); we do not hard-fail on this check.
        }
    }

    let parent = server_parent_handle(client, root, state)?;
    state.set_share_bits(mapped.share_access, mapped.share_deny.as_bits());
    let deleg_type = if req.disposition == Disposition::Supersede && found {
        // Step 7: supersede pre-remove + retry.
        let createhow = match mapped.create {
            CreateDecision::Create(mode) => mode,
            CreateDecision::NoCreate => CreateHowMode::Exclusive4_1,
        };
        supersede_then_create(
            client,
            state,
            &parent,
            &state.path.name(),
            mapped.share_access,
            mapped.share_deny.as_bits(),
            createhow,
        )?
    } else if req.create_opts & mapper::create_opts::DIRECTORY_FILE != 0 {
        // Step 8: directory create, no stateid. An existing directory
        // (`NoCreate`) keeps the handle `resolve()` already looked up rather
        // than re-issuing CREATE, which the server would answer with `Exist`.
        match mapped.create {
            CreateDecision::Create(_) => {
                let set_attrs = SetAttrs { mode: Some(req.mode), size: None };
                let created = client.rpc.create_dir(&parent, &state.path.name(), &set_attrs)?;
                state.set_file(FileHandleView { handle: created.handle, name: state.path.name(), superblock: None });
            }
            CreateDecision::NoCreate => {
                let handle = server_handle.clone().expect("NoCreate directory disposition implies a resolved handle");
                state.set_file(FileHandleView { handle, name: state.path.name(), superblock: None });
            }
        }
        state.set_kind(FileKind::Directory);
        DelegationGrant::None
    } else {
        // Step 8: regular OPEN or OPEN+CREATE.
        let createhow = match mapped.create {
            CreateDecision::Create(mode) => Some(mode),
            CreateDecision::NoCreate => None,
        };
        let grant = open_or_delegate(
            client,
            state,
            &parent,
            &state.path.name(),
            mapped.share_access,
            mapped.share_deny.as_bits(),
            createhow,
        )?;
        state.set_kind(FileKind::Regular);
        grant
    };

    // Step 9: EA set.
    let is_create_disposition = matches!(
        req.disposition,
        Disposition::Supersede | Disposition::Create | Disposition::Overwrite | Disposition::OverwriteIf
    ) || (req.disposition == Disposition::OpenIf && !found);
    if let Some(ea) = &req.ea {
        if is_create_disposition {
            state.set_ea(ea.clone());
        }
    }

    Ok(publish(
        client,
        state,
        build_info(StateRef::from_wire(0), deleg_type, !found, mapped.pre_error_hint, req, attrs.as_ref().map(|a| (a, None, None))),
    ))
}

fn server_parent_handle(
    client: &Client,
    root: &FileHandle,
    state: &Arc<OpenState>,
) -> Result<FileHandle, OpenError> {
    let parent_path = state.path.parent();
    let mut current = root.clone();
    for component in parent_path.trim_start_matches('/').split('/') {
        if component.is_empty() {
            continue;
        }
        current = client.rpc.lookup(&current, component)?.handle;
    }
    Ok(current)
}

fn build_info(
    state_ref: StateRef,
    deleg_type: DelegationGrant,
    created: bool,
    pre_error_hint: Option<HostStatus>,
    req: &OpenRequest,
    attrs: Option<(&FileAttrs, Option<u32>, Option<u32>)>,
) -> OpenInfo {
    let (basic, std) = match attrs {
        Some((a, _, _)) => attrs_to_info(a),
        None => (BasicInfo::default(), StdInfo::default()),
    };
    let (uid, gid) = match attrs {
        Some((_, uid, gid)) => (uid.or(req.owner_local_uid), gid.or(req.owner_group_local_gid)),
        None => (req.owner_local_uid, req.owner_group_local_gid),
    };
    OpenInfo {
        basic,
        std,
        state_ref,
        mode: req.mode,
        owner_local_uid: uid,
        owner_group_local_gid: gid,
        changeattr: attrs.map(|(a, _, _)| a.change).unwrap_or(0),
        deleg_type,
        do_close: false,
        created,
        pre_error_hint,
    }
}

/// Step 10: publish the state into the client's open list and hand back the
/// second reference as a [`StateRef`].
fn publish(client: &Client, state: &Arc<OpenState>, mut info: OpenInfo) -> OpenOutcome {
    info.do_close = state.do_close();
    let state_ref = client.open_states.insert(Arc::clone(state));
    info.state_ref = state_ref;
    OpenOutcome::Opened(info)
}

#[allow(dead_code)]
fn fallback_host_error(status: NfsStatus) -> HostStatus {
    nfs_to_host_error(status, HostStatus::FileNotFound)
}
