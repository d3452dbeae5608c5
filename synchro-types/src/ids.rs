//! Identity types for synchro snapshots.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// Content address of a commit or tree.
///
/// 20 bytes, displayed as 40 lowercase hex characters. Ordering is byte-wise,
/// which matches the lexicographic order of the hex form.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ObjectId([u8; 20]);

/// Sentinel id meaning "does not exist / deleted".
///
/// It shares the type of real ids so that conflict lists compare and sort
/// uniformly. A real object hashing to all zeros would be indistinguishable
/// from it.
pub const NULL_SHA1: ObjectId = ObjectId([0u8; 20]);

impl ObjectId {
    /// Length of an id in bytes.
    pub const LEN: usize = 20;

    /// Create an ObjectId from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() == Self::LEN {
            let mut arr = [0u8; Self::LEN];
            arr.copy_from_slice(bytes);
            Some(Self(arr))
        } else {
            None
        }
    }

    /// Get the raw bytes of this ObjectId.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parse a 40-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        let bytes = hex::decode(s).map_err(|_| TypesError::InvalidObjectId(s.to_string()))?;
        Self::from_bytes(&bytes).ok_or_else(|| TypesError::InvalidObjectId(s.to_string()))
    }

    /// Hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Whether this is [`NULL_SHA1`].
    pub fn is_null(&self) -> bool {
        *self == NULL_SHA1
    }

    /// Content address of `payload` stored as an object of `kind`.
    ///
    /// SHA-256 over `"<kind> <len>\0" || payload`, truncated to 20 bytes.
    pub fn digest(kind: &str, payload: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update(b" ");
        hasher.update(payload.len().to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(payload);
        let result = hasher.finalize();
        let mut bytes = [0u8; Self::LEN];
        bytes.copy_from_slice(&result[..Self::LEN]);
        Self(bytes)
    }

    /// Content address of a serializable object, using its canonical
    /// MessagePack encoding.
    pub fn of<T: Serialize>(kind: &str, value: &T) -> Result<Self, TypesError> {
        let payload = rmp_serde::to_vec(value).map_err(TypesError::Encoding)?;
        Ok(Self::digest(kind, &payload))
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", &self.to_hex()[..10])
    }
}

impl FromStr for ObjectId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Identity of a replicated repo: owner username plus repo name.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepoKey {
    /// Username of the owner.
    pub owner: String,
    /// Repo name, unique per owner.
    pub name: String,
}

impl RepoKey {
    /// Create a RepoKey.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl fmt::Debug for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RepoKey({})", self)
    }
}

impl FromStr for RepoKey {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(owner, name))
            }
            _ => Err(TypesError::InvalidRepoKey(s.to_string())),
        }
    }
}

/// Ref name of a local branch, `branches/<branch>`.
pub fn branch_ref(branch: &str) -> String {
    format!("branches/{}", branch)
}

/// Ref name of a mirrored remote branch, `remotes/<remote>/branches/<branch>`.
pub fn remote_branch_ref(remote: &str, branch: &str) -> String {
    format!("remotes/{}/branches/{}", remote, branch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_hex_roundtrip() {
        let id = ObjectId::digest("blob", b"hello");
        let restored: ObjectId = id.to_hex().parse().unwrap();
        assert_eq!(id, restored);
        assert_eq!(id.to_hex().len(), 40);
    }

    #[test]
    fn object_id_rejects_bad_hex() {
        assert!(ObjectId::from_hex("xyz").is_err());
        assert!(ObjectId::from_hex("abcd").is_err());
        assert!(ObjectId::from_hex(&"0".repeat(42)).is_err());
    }

    #[test]
    fn null_sha1_is_forty_zeros() {
        assert_eq!(NULL_SHA1.to_hex(), "0".repeat(40));
        assert!(NULL_SHA1.is_null());
        assert!(!ObjectId::digest("blob", b"x").is_null());
    }

    #[test]
    fn null_sha1_sorts_first() {
        let mut ids = vec![ObjectId::digest("blob", b"a"), NULL_SHA1];
        ids.sort();
        assert_eq!(ids[0], NULL_SHA1);
    }

    #[test]
    fn digest_depends_on_kind() {
        assert_ne!(
            ObjectId::digest("tree", b"same"),
            ObjectId::digest("commit", b"same")
        );
    }

    #[test]
    fn object_id_serializes_as_hex_string() {
        let id = ObjectId::digest("blob", b"json");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
        let back: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn repo_key_parse_and_display() {
        let key: RepoKey = "alice/photos".parse().unwrap();
        assert_eq!(key, RepoKey::new("alice", "photos"));
        assert_eq!(key.to_string(), "alice/photos");
    }

    #[test]
    fn repo_key_rejects_malformed() {
        assert!("alice".parse::<RepoKey>().is_err());
        assert!("/photos".parse::<RepoKey>().is_err());
        assert!("alice/".parse::<RepoKey>().is_err());
        assert!("alice/a/b".parse::<RepoKey>().is_err());
    }

    #[test]
    fn ref_names() {
        assert_eq!(branch_ref("master"), "branches/master");
        assert_eq!(
            remote_branch_ref("peer-b", "master"),
            "remotes/peer-b/branches/master"
        );
    }
}
