//! Object identity types shared by every correlation table
//!
//! All of these are small `Copy` records. They mirror what the probe side can
//! capture without allocating: numeric ids and fixed-width name buffers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Width of kernel object names and task command names (BPF_OBJ_NAME_LEN, TASK_COMM_LEN)
pub const NAME_LEN: usize = 16;

/// The (process, thread) pair that performed an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorIdentity {
    /// Process ID (tgid)
    pub pid: u32,
    /// Thread ID (pid in kernel terms)
    pub tid: u32,
}

impl ActorIdentity {
    pub const fn new(pid: u32, tid: u32) -> Self {
        Self { pid, tid }
    }

    /// Split the packed value returned by `bpf_get_current_pid_tgid`
    pub const fn from_pid_tgid(pid_tgid: u64) -> Self {
        Self {
            pid: (pid_tgid >> 32) as u32,
            tid: pid_tgid as u32,
        }
    }

    pub const fn pid_tgid(&self) -> u64 {
        ((self.pid as u64) << 32) | self.tid as u64
    }
}

impl fmt::Display for ActorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pid, self.tid)
    }
}

/// How the kernel makes an object addressable once it exists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityScheme {
    /// A numeric id is assigned synchronously at creation
    StableId,
    /// Only the descriptor returned by the completing syscall identifies it
    Handle,
}

/// Kind of kernel object operation being tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ProgramLoad,
    MapCreate,
    LinkCreate,
    BtfLoad,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::ProgramLoad,
        OperationKind::MapCreate,
        OperationKind::LinkCreate,
        OperationKind::BtfLoad,
    ];

    pub const fn identity_scheme(&self) -> IdentityScheme {
        match self {
            OperationKind::ProgramLoad | OperationKind::MapCreate | OperationKind::BtfLoad => {
                IdentityScheme::StableId
            }
            OperationKind::LinkCreate => IdentityScheme::Handle,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationKind::ProgramLoad => "program_load",
            OperationKind::MapCreate => "map_create",
            OperationKind::LinkCreate => "link_create",
            OperationKind::BtfLoad => "btf_load",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-width, NUL-padded name buffer
///
/// Input longer than `NAME_LEN - 1` bytes is truncated so the buffer always
/// keeps a terminating NUL, as the kernel does for object and task names.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ObjectName([u8; NAME_LEN]);

impl ObjectName {
    pub const fn empty() -> Self {
        Self([0u8; NAME_LEN])
    }

    pub fn new(name: &str) -> Self {
        Self::from_bytes(name.as_bytes())
    }

    /// Build from a raw buffer, stopping at the first NUL
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buf = [0u8; NAME_LEN];
        let end = bytes
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(bytes.len())
            .min(NAME_LEN - 1);
        buf[..end].copy_from_slice(&bytes[..end]);
        Self(buf)
    }

    pub fn as_bytes(&self) -> &[u8] {
        let end = self.0.iter().position(|&c| c == 0).unwrap_or(NAME_LEN);
        &self.0[..end]
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }

    /// Name as text (lossy for non UTF-8 bytes)
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_bytes()).to_string()
    }
}

impl fmt::Debug for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_string_lossy())
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl From<&str> for ObjectName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl Serialize for ObjectName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string_lossy())
    }
}

impl<'de> Deserialize<'de> for ObjectName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::new(&name))
    }
}

/// Provisional attributes captured when an operation starts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attributes {
    /// Object name as passed to the kernel
    pub name: ObjectName,
    /// Command name of the task performing the operation
    pub comm: ObjectName,
    /// Program type, map type or link attach type
    pub object_type: u32,
    pub flags: u32,
    /// Kind-specific size (instruction count, max entries, BTF blob size)
    pub size: u32,
}

impl Attributes {
    pub fn named(name: &str) -> Self {
        Self {
            name: ObjectName::new(name),
            ..Default::default()
        }
    }
}

/// A creation observed at its start but not yet at its completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub actor: ActorIdentity,
    pub kind: OperationKind,
    /// Monotonic timestamp of the entry notification (ns)
    pub started_at: u64,
    pub attributes: Attributes,
}

/// A settled object whose lifecycle is being followed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedObject {
    /// Kernel id, or the handle value for handle-scheme kinds
    pub object_id: u32,
    pub owner: ActorIdentity,
    pub kind: OperationKind,
    /// Monotonic timestamp of creation (ns)
    pub created_at: u64,
    pub attributes: Attributes,
}

impl TrackedObject {
    /// Registry key for this object, derived from its kind's identity scheme
    pub fn key(&self) -> ObjectKey {
        ObjectKey::for_object(self.kind, self.owner, self.object_id)
    }
}

/// Correlation key of a settled object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum ObjectKey {
    /// Kernel-assigned id; program, map and BTF ids are separate namespaces
    Id { kind: OperationKind, id: u32 },
    /// Descriptor owned by a process
    Handle {
        pid: u32,
        kind: OperationKind,
        handle: u32,
    },
}

impl ObjectKey {
    pub fn for_object(kind: OperationKind, owner: ActorIdentity, object_id: u32) -> Self {
        match kind.identity_scheme() {
            IdentityScheme::StableId => ObjectKey::Id { kind, id: object_id },
            IdentityScheme::Handle => ObjectKey::Handle {
                pid: owner.pid,
                kind,
                handle: object_id,
            },
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            ObjectKey::Id { kind, .. } | ObjectKey::Handle { kind, .. } => *kind,
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKey::Id { kind, id } => write!(f, "{}#{}", kind, id),
            ObjectKey::Handle { pid, kind, handle } => write!(f, "{}@{}:{}", kind, pid, handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_tgid_split() {
        let actor = ActorIdentity::from_pid_tgid((1234u64 << 32) | 5678);
        assert_eq!(actor, ActorIdentity::new(1234, 5678));
        assert_eq!(actor.pid_tgid(), (1234u64 << 32) | 5678);
    }

    #[test]
    fn test_object_name_truncates() {
        let name = ObjectName::new("a_very_long_program_name");
        assert_eq!(name.as_bytes().len(), NAME_LEN - 1);
        assert_eq!(name.to_string_lossy(), "a_very_long_pro");
    }

    #[test]
    fn test_object_name_stops_at_nul() {
        let name = ObjectName::from_bytes(b"xdp_prog\0garbage");
        assert_eq!(name.to_string_lossy(), "xdp_prog");
        assert!(ObjectName::empty().is_empty());
    }

    #[test]
    fn test_object_name_serde_as_string() {
        let attrs = Attributes::named("tc_ingress");
        let json = serde_json::to_string(&attrs).unwrap();
        assert!(json.contains("\"name\":\"tc_ingress\""));
        let back: Attributes = serde_json::from_str(&json).unwrap();
        assert_eq!(back, attrs);
    }

    #[test]
    fn test_key_follows_identity_scheme() {
        let owner = ActorIdentity::new(10, 11);
        assert_eq!(
            ObjectKey::for_object(OperationKind::MapCreate, owner, 42),
            ObjectKey::Id {
                kind: OperationKind::MapCreate,
                id: 42
            }
        );
        assert_eq!(
            ObjectKey::for_object(OperationKind::LinkCreate, owner, 7),
            ObjectKey::Handle {
                pid: 10,
                kind: OperationKind::LinkCreate,
                handle: 7
            }
        );
    }

    #[test]
    fn test_id_namespaces_are_separate() {
        let owner = ActorIdentity::new(1, 1);
        let prog = ObjectKey::for_object(OperationKind::ProgramLoad, owner, 5);
        let map = ObjectKey::for_object(OperationKind::MapCreate, owner, 5);
        assert_ne!(prog, map);
    }
}
