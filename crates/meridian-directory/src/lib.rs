//! # Meridian Directory - Domain Crate
//!
//! **Purpose**: Validate organization identity claims arriving on the broadcast
//! feed and apply them to the local directory without ever letting the
//! directory diverge from its peers.
//!
//! # Architecture Constraints
//!
//! **Depends only on meridian-core** (foundation).
//! - YES Broadcast, claim and record types
//! - YES Claim validation and the accept/reject/fail decision
//! - YES Collaborator contracts (`DirectoryStore`, `IdentityResolver`)
//! - YES Reference collaborators (in-memory directory, static resolver)
//! - NO feed ordering, transport or payload decoding
//! - NO retry policy (callers wrap collaborators, see `meridian-node`)
//!
//! ## Invariants
//!
//! - At most one record per identity
//! - A record's parent never changes after first acceptance
//! - Children are only accepted once their parent is in the directory
//! - The message author must be the resolved signer of the claim
//! - Re-applying an accepted claim keeps the stored record id

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// In-memory directory store
pub mod memory;

/// Fixed-table identity resolver
pub mod resolver;

/// Collaborator contracts
pub mod traits;

/// Broadcast, claim and record types
pub mod types;

/// Structural claim validation
pub mod validation;

/// Claim validator
pub mod validator;

pub use memory::MemoryDirectory;
pub use resolver::StaticResolver;
pub use traits::{DirectoryStore, IdentityResolver};
pub use types::{
    BroadcastMessage, DataRef, DirectoryRecord, MessageHeader, OrganizationClaim,
    ResolvedIdentity, UpsertOutcome,
};
pub use validation::ClaimValidationError;
pub use validator::{ClaimOutcome, OrgIdentityValidator, RejectReason, RejectionKind};
