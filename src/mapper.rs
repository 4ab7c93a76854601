//! Disposition/access mapper (C4): a pure translation from host-OS OPEN
//! parameters to NFSv4 OPEN arguments. No I/O, no allocation beyond the
//! output -- every branch here is a total function of its inputs, which is
//! what makes the round-trip laws in the design's testable-properties
//! section checkable directly against this module.

use crate::error::HostStatus;
use crate::nfs_rpc::CreateHowMode;

pub mod access_mask {
    pub const FILE_READ_DATA: u32 = 0x0000_0001;
    pub const FILE_WRITE_DATA: u32 = 0x0000_0002;
    pub const FILE_APPEND_DATA: u32 = 0x0000_0004;
    pub const FILE_EXECUTE: u32 = 0x0000_0020;
    pub const DELETE: u32 = 0x0001_0000;
    pub const SYNCHRONIZE: u32 = 0x0010_0000;
    pub const FILE_WRITE_ATTRIBUTES: u32 = 0x0000_0100;

    pub const READ_SHAPED: u32 = FILE_READ_DATA | FILE_EXECUTE;
    pub const WRITE_SHAPED: u32 = FILE_WRITE_DATA | FILE_APPEND_DATA | FILE_WRITE_ATTRIBUTES;
}

pub mod share_mode {
    pub const SHARE_READ: u32 = 0x0000_0001;
    pub const SHARE_WRITE: u32 = 0x0000_0002;
    pub const SHARE_DELETE: u32 = 0x0000_0004;
}

pub mod create_opts {
    pub const DIRECTORY_FILE: u32 = 0x0000_0001;
    pub const NON_DIRECTORY_FILE: u32 = 0x0000_0040;
    pub const OPEN_REPARSE_POINT: u32 = 0x0020_0000;
}

pub mod share_access {
    pub const READ: u32 = 0x0000_0001;
    pub const WRITE: u32 = 0x0000_0002;
    pub const BOTH: u32 = READ | WRITE;
    pub const WANT_NO_DELEG: u32 = 0x0001_0000;
}

/// The deny side of an OPEN's share reservation (RFC 5661 §18.16).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShareDeny {
    None,
    Write,
    Read,
    Both,
}

impl ShareDeny {
    pub fn as_bits(self) -> u32 {
        match self {
            ShareDeny::None => 0,
            ShareDeny::Write => 1,
            ShareDeny::Read => 2,
            ShareDeny::Both => 3,
        }
    }
}

/// The host's CreateDisposition (Windows NtCreateFile semantics).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Disposition {
    Supersede,
    Create,
    Open,
    OpenIf,
    Overwrite,
    OverwriteIf,
}

/// Whether the lookup that preceded the mapper found the object.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LookupStatus {
    Found,
    NotFound,
}

/// What to send on the wire for CREATE vs plain OPEN.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CreateDecision {
    NoCreate,
    Create(CreateHowMode),
}

#[derive(Debug, Clone, Copy)]
pub struct MapperInput {
    pub access_mask: u32,
    pub access_mode: u32,
    pub disposition: Disposition,
    pub lookup_status: LookupStatus,
    pub session_is_persistent: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct MapperOutput {
    pub share_access: u32,
    pub share_deny: ShareDeny,
    pub create: CreateDecision,
    /// A value returned alongside success indicating the kernel should be
    /// told the create path was taken, even though the op itself succeeded.
    pub pre_error_hint: Option<HostStatus>,
}

fn createhowmode(session_is_persistent: bool) -> CreateHowMode {
    if session_is_persistent {
        CreateHowMode::Guarded
    } else {
        CreateHowMode::Exclusive4_1
    }
}

fn share_access(access_mask: u32) -> u32 {
    use access_mask::{READ_SHAPED, WRITE_SHAPED};

    let wants_read = access_mask & READ_SHAPED != 0;
    let wants_write = access_mask & WRITE_SHAPED != 0;

    match (wants_read, wants_write) {
        (true, true) => share_access::BOTH,
        (false, true) => share_access::WRITE,
        (true, false) => share_access::READ,
        (false, false) => share_access::READ | share_access::WANT_NO_DELEG,
    }
}

fn share_deny(access_mode: u32) -> ShareDeny {
    use share_mode::{SHARE_READ, SHARE_WRITE};

    match (access_mode & SHARE_READ != 0, access_mode & SHARE_WRITE != 0) {
        (true, true) => ShareDeny::None,
        (true, false) => ShareDeny::Write,
        (false, true) => ShareDeny::Read,
        (false, false) => ShareDeny::Both,
    }
}

/// Translates host OPEN parameters to NFS OPEN arguments (SPEC_FULL §4.1).
pub fn map(input: MapperInput) -> Result<MapperOutput, HostStatus> {
    let share_access = share_access(input.access_mask);
    let share_deny = share_deny(input.access_mode);
    let guarded_or_exclusive = createhowmode(input.session_is_persistent);

    let (create, pre_error_hint) = match (input.disposition, input.lookup_status) {
        (Disposition::Supersede, LookupStatus::NotFound) => (
            CreateDecision::Create(guarded_or_exclusive),
            Some(HostStatus::FileNotFound),
        ),
        (Disposition::Supersede, LookupStatus::Found) => {
            (CreateDecision::Create(guarded_or_exclusive), None)
        }
        (Disposition::Create, LookupStatus::NotFound) => {
            (CreateDecision::Create(guarded_or_exclusive), None)
        }
        (Disposition::Create, LookupStatus::Found) => return Err(HostStatus::FileExists),
        (Disposition::Open, LookupStatus::NotFound) => return Err(HostStatus::FileNotFound),
        (Disposition::Open, LookupStatus::Found) => (CreateDecision::NoCreate, None),
        (Disposition::OpenIf, LookupStatus::NotFound) => (
            CreateDecision::Create(guarded_or_exclusive),
            Some(HostStatus::FileNotFound),
        ),
        (Disposition::OpenIf, LookupStatus::Found) => (CreateDecision::NoCreate, None),
        (Disposition::Overwrite, LookupStatus::NotFound) => return Err(HostStatus::FileNotFound),
        (Disposition::Overwrite, LookupStatus::Found) => {
            (CreateDecision::Create(CreateHowMode::Unchecked), None)
        }
        (Disposition::OverwriteIf, LookupStatus::NotFound) => (
            CreateDecision::Create(guarded_or_exclusive),
            Some(HostStatus::FileNotFound),
        ),
        (Disposition::OverwriteIf, LookupStatus::Found) => {
            (CreateDecision::Create(CreateHowMode::Unchecked), None)
        }
    };

    Ok(MapperOutput { share_access, share_deny, create, pre_error_hint })
}
