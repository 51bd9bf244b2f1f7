//! Broadcast, claim and directory record types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header of a broadcast message. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Message identifier
    pub id: Uuid,
    /// On-chain address of the party that signed the message
    pub author: String,
    /// Namespace the message was broadcast in
    #[serde(default)]
    pub namespace: String,
    /// Creation time in unix milliseconds
    #[serde(default)]
    pub created: i64,
}

/// Opaque reference to a payload attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRef {
    /// Payload identifier
    pub id: Uuid,
    /// Content hash of the payload
    #[serde(default)]
    pub hash: String,
}

/// One entry of the broadcast feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    /// Message header
    pub header: MessageHeader,
    /// Attached payload references
    #[serde(default)]
    pub data: Vec<DataRef>,
}

impl BroadcastMessage {
    /// Message with a fresh id authored by `author`.
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            header: MessageHeader {
                id: Uuid::new_v4(),
                author: author.into(),
                namespace: String::new(),
                created: 0,
            },
            data: Vec::new(),
        }
    }

    /// Set the creation timestamp (unix milliseconds)
    pub fn with_created(mut self, created: i64) -> Self {
        self.header.created = created;
        self
    }

    /// Message identifier
    pub fn id(&self) -> Uuid {
        self.header.id
    }

    /// Signer address
    pub fn author(&self) -> &str {
        &self.header.author
    }
}

/// Decoded organization identity assertion carried by a broadcast message.
///
/// A missing or empty `parent` denotes a root organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationClaim {
    /// Claimed organization identifier
    pub identity: String,
    /// Identity of the attesting parent organization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Display name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Arbitrary profile document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<serde_json::Value>,
}

impl OrganizationClaim {
    /// Claim for a root organization.
    pub fn root(identity: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            parent: None,
            name: name.into(),
            description: String::new(),
            profile: None,
        }
    }

    /// Claim for an organization attested by `parent`.
    pub fn child(
        identity: impl Into<String>,
        parent: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            parent: Some(parent.into()),
            ..Self::root(identity, name)
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the profile document
    pub fn with_profile(mut self, profile: serde_json::Value) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Parent identity, treating an empty string as no parent.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref().filter(|parent| !parent.is_empty())
    }

    /// Whether this claims a root organization
    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    /// Identity whose key must have signed the message: the organization
    /// itself for roots, the parent for children.
    pub fn signing_identity(&self) -> &str {
        self.parent().unwrap_or(&self.identity)
    }
}

/// Persisted directory entry, one per identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    /// Storage-assigned key, kept across updates
    pub id: Uuid,
    /// Message that last updated the record
    pub message: Uuid,
    /// Organization identifier (unique)
    pub identity: String,
    /// Parent identity, frozen at first acceptance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Display name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Arbitrary profile document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<serde_json::Value>,
    /// Creation time of the first accepted claim, unix milliseconds
    pub created: i64,
}

impl DirectoryRecord {
    /// Build a new record from an accepted claim, with a fresh key.
    pub fn from_claim(message: &BroadcastMessage, claim: &OrganizationClaim) -> Self {
        Self {
            id: Uuid::new_v4(),
            message: message.header.id,
            identity: claim.identity.clone(),
            parent: claim.parent().map(str::to_owned),
            name: claim.name.clone(),
            description: claim.description.clone(),
            profile: claim.profile.clone(),
            created: message.header.created,
        }
    }

    /// Copy the mutable fields of `update` into this record. Key, identity,
    /// parent and creation time are left alone.
    pub fn merge_from(&mut self, update: &DirectoryRecord) {
        self.message = update.message;
        self.name.clone_from(&update.name);
        self.description.clone_from(&update.description);
        self.profile.clone_from(&update.profile);
    }
}

/// What an upsert did to the directory.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// No record existed; holds the record as inserted
    Inserted(DirectoryRecord),
    /// Merged into the existing record; holds the stored result
    Merged(DirectoryRecord),
    /// The stored record names a different parent; nothing was written.
    /// Holds the stored record.
    ParentConflict(DirectoryRecord),
}

impl UpsertOutcome {
    /// Record as stored after the call
    pub fn stored(&self) -> &DirectoryRecord {
        match self {
            Self::Inserted(record) | Self::Merged(record) | Self::ParentConflict(record) => record,
        }
    }

    /// Whether the record was written
    pub fn is_written(&self) -> bool {
        !matches!(self, Self::ParentConflict(_))
    }
}

/// Result of resolving a logical identity to its on-chain signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    /// Identity that was resolved
    pub identity: String,
    /// On-chain signer address
    pub on_chain: String,
}
