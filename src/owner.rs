//! Open-owner identity (C2): the opaque byte string the server uses to
//! attribute OPEN operations to a caller, derived deterministically from a
//! kernel-supplied id so replays and retries name the same owner.

/// Bound on the opaque owner (and EA name/value) byte strings.
pub const OPAQUE_LIMIT: usize = 32;

/// Opaque open-owner, ≤ [`OPAQUE_LIMIT`] bytes. Two opens with the same
/// `open_owner_id` share an owner identity on the wire; different ids never do.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpenOwner(String);

impl OpenOwner {
    /// Derives the owner from the caller-supplied id via decimal text
    /// encoding -- the same encoding the kernel and server both expect.
    pub fn from_id(open_owner_id: u32) -> Self {
        let owner = open_owner_id.to_string();
        debug_assert!(owner.len() <= OPAQUE_LIMIT);
        Self(owner)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
