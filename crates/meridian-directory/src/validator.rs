//! Organization claim validator.
//!
//! Decides whether a broadcast organization claim is accepted into the
//! directory. The result keeps two failure classes apart:
//!
//! - [`ClaimOutcome::Rejected`]: malformed, adversarial or premature input.
//!   Final, logged at warn level, and the feed keeps moving.
//! - [`ClaimOutcome::Failed`]: a collaborator infrastructure fault or an
//!   interrupted context. The caller must not advance past the message.
//!
//! Only collaborator errors and context errors ever reach `Failed`, and
//! collaborator errors are passed through unmodified.

use crate::traits::{DirectoryStore, IdentityResolver};
use crate::types::{BroadcastMessage, DirectoryRecord, OrganizationClaim, UpsertOutcome};
use crate::validation::ClaimValidationError;
use meridian_core::{Context, MeridianError, Result};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

/// Category of a soft rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionKind {
    /// Malformed payload
    Validation,
    /// Wrong signer or conflicting re-broadcast
    Protocol,
    /// Referenced parent has not arrived yet; redelivery may succeed later
    Deferred,
}

/// Why a claim was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    /// Structural validation failed
    #[error("validation failed: {0}")]
    Invalid(#[from] ClaimValidationError),

    /// The attesting parent is not in the directory yet
    #[error("parent identity '{parent}' not found")]
    ParentNotFound {
        /// Missing parent identity
        parent: String,
    },

    /// The signing identity could not be resolved
    #[error("signing identity '{identity}' could not be resolved: {reason}")]
    UnresolvedSigner {
        /// Identity that failed to resolve
        identity: String,
        /// Resolver's explanation
        reason: String,
    },

    /// The message was not authored by the resolved signer
    #[error("message author {received} does not match signer {expected}")]
    SignatureMismatch {
        /// Resolved on-chain signer
        expected: String,
        /// Author from the message header
        received: String,
    },

    /// A record exists for the identity with a different parent
    #[error("identity '{identity}' is registered under parent {existing:?}, claim names {claimed:?}")]
    ParentConflict {
        /// Claimed identity
        identity: String,
        /// Parent already on record
        existing: Option<String>,
        /// Parent in the new claim
        claimed: Option<String>,
    },
}

impl RejectReason {
    /// Category of this rejection
    pub fn kind(&self) -> RejectionKind {
        match self {
            Self::Invalid(_) => RejectionKind::Validation,
            Self::ParentNotFound { .. } => RejectionKind::Deferred,
            Self::UnresolvedSigner { .. }
            | Self::SignatureMismatch { .. }
            | Self::ParentConflict { .. } => RejectionKind::Protocol,
        }
    }
}

/// Result of validating and applying one claim.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The claim was written; holds the record as stored
    Accepted(DirectoryRecord),
    /// The claim was discarded
    Rejected(RejectReason),
    /// A collaborator failed or the context finished
    Failed(MeridianError),
}

impl ClaimOutcome {
    /// Whether the claim was accepted
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// Whether the claim was rejected
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Whether processing failed
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Rejection reason, if rejected
    pub fn rejection(&self) -> Option<&RejectReason> {
        match self {
            Self::Rejected(reason) => Some(reason),
            _ => None,
        }
    }

    /// Hard error, if failed
    pub fn error(&self) -> Option<&MeridianError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Collapse to "accepted record, rejected, or error".
    pub fn into_result(self) -> Result<Option<DirectoryRecord>> {
        match self {
            Self::Accepted(record) => Ok(Some(record)),
            Self::Rejected(_) => Ok(None),
            Self::Failed(err) => Err(err),
        }
    }
}

/// Validates organization claims and applies accepted ones to a directory.
#[derive(Debug, Clone)]
pub struct OrgIdentityValidator<S, R> {
    store: S,
    resolver: R,
}

impl<S, R> OrgIdentityValidator<S, R>
where
    S: DirectoryStore,
    R: IdentityResolver,
{
    /// Create a validator over the given collaborators
    pub fn new(store: S, resolver: R) -> Self {
        Self { store, resolver }
    }

    /// Directory store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Identity resolver
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Validate `claim`, carried by `message`, and upsert it on success.
    pub async fn validate_and_apply(
        &self,
        ctx: &Context,
        message: &BroadcastMessage,
        claim: &OrganizationClaim,
    ) -> ClaimOutcome {
        let span = tracing::info_span!(
            "org_claim",
            message_id = %message.header.id,
            identity = %claim.identity
        );
        self.apply(ctx, message, claim).instrument(span).await
    }

    async fn apply(
        &self,
        ctx: &Context,
        message: &BroadcastMessage,
        claim: &OrganizationClaim,
    ) -> ClaimOutcome {
        if let Err(err) = claim.validate() {
            return reject(message, RejectReason::Invalid(err));
        }

        let signing_identity = claim.signing_identity();

        if let Some(parent) = claim.parent() {
            match ctx.guard(self.store.get_record(ctx, parent)).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    return reject(
                        message,
                        RejectReason::ParentNotFound {
                            parent: parent.to_owned(),
                        },
                    );
                }
                Err(err) => return ClaimOutcome::Failed(err),
            }
        }

        let signer = match ctx.guard(self.resolver.resolve(ctx, signing_identity)).await {
            Ok(signer) => signer,
            Err(err) => {
                // An interrupted resolution says nothing about the claim.
                if let Some(ctx_err) = ctx.err() {
                    return ClaimOutcome::Failed(ctx_err);
                }
                return reject(
                    message,
                    RejectReason::UnresolvedSigner {
                        identity: signing_identity.to_owned(),
                        reason: err.to_string(),
                    },
                );
            }
        };

        if message.header.author != signer.on_chain {
            return reject(
                message,
                RejectReason::SignatureMismatch {
                    expected: signer.on_chain,
                    received: message.header.author.clone(),
                },
            );
        }

        let existing = match ctx.guard(self.store.get_record(ctx, &claim.identity)).await {
            Ok(existing) => existing,
            Err(err) => return ClaimOutcome::Failed(err),
        };

        let mut record = DirectoryRecord::from_claim(message, claim);
        if let Some(existing) = existing {
            if existing.parent != record.parent {
                return reject(
                    message,
                    RejectReason::ParentConflict {
                        identity: claim.identity.clone(),
                        existing: existing.parent,
                        claimed: record.parent,
                    },
                );
            }
            record.id = existing.id;
            record.created = existing.created;
        }

        // A concurrent claim may have stored a different parent since the
        // lookup above; the store refuses the merge in that case.
        match ctx.guard(self.store.upsert_record(ctx, &record, true)).await {
            Ok(UpsertOutcome::Inserted(stored) | UpsertOutcome::Merged(stored)) => {
                tracing::info!(record_id = %stored.id, "organization claim accepted");
                ClaimOutcome::Accepted(stored)
            }
            Ok(UpsertOutcome::ParentConflict(existing)) => reject(
                message,
                RejectReason::ParentConflict {
                    identity: claim.identity.clone(),
                    existing: existing.parent,
                    claimed: record.parent,
                },
            ),
            Err(err) => ClaimOutcome::Failed(err),
        }
    }
}

fn reject(message: &BroadcastMessage, reason: RejectReason) -> ClaimOutcome {
    tracing::warn!(
        message_id = %message.header.id,
        kind = ?reason.kind(),
        reason = %reason,
        "unable to process organization broadcast"
    );
    ClaimOutcome::Rejected(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDirectory;
    use crate::resolver::StaticResolver;

    fn validator() -> OrgIdentityValidator<MemoryDirectory, StaticResolver> {
        OrgIdentityValidator::new(
            MemoryDirectory::new(),
            StaticResolver::new()
                .with_identity("org-a", "0xaaa")
                .with_identity("org-b", "0xbbb"),
        )
    }

    #[test]
    fn test_rejection_kinds() {
        assert_eq!(
            RejectReason::ParentNotFound {
                parent: "p".into()
            }
            .kind(),
            RejectionKind::Deferred
        );
        assert_eq!(
            RejectReason::SignatureMismatch {
                expected: "a".into(),
                received: "b".into()
            }
            .kind(),
            RejectionKind::Protocol
        );
        assert_eq!(
            RejectReason::Invalid(ClaimValidationError::MissingField { field: "identity" }).kind(),
            RejectionKind::Validation
        );
    }

    #[test]
    fn test_outcome_into_result() {
        let rejected = ClaimOutcome::Rejected(RejectReason::ParentNotFound {
            parent: "p".into(),
        });
        assert_eq!(rejected.into_result(), Ok(None));

        let failed = ClaimOutcome::Failed(MeridianError::storage("down"));
        assert_eq!(failed.into_result(), Err(MeridianError::storage("down")));
    }

    #[tokio::test]
    async fn test_root_claim_accepted() {
        let v = validator();
        let ctx = Context::background();
        let msg = BroadcastMessage::new("0xaaa");
        let claim = OrganizationClaim::root("org-a", "OrgA");

        let outcome = v.validate_and_apply(&ctx, &msg, &claim).await;
        let record = match outcome {
            ClaimOutcome::Accepted(record) => record,
            other => panic!("expected acceptance, got {other:?}"),
        };
        assert_eq!(record.identity, "org-a");
        assert_eq!(record.message, msg.id());
        assert_eq!(v.store().len().await, 1);
    }

    #[tokio::test]
    async fn test_child_signed_by_parent() {
        let v = validator();
        let ctx = Context::background();
        v.validate_and_apply(
            &ctx,
            &BroadcastMessage::new("0xaaa"),
            &OrganizationClaim::root("org-a", "OrgA"),
        )
        .await;

        // Child "org-c" has no signer of its own; the parent signs for it.
        let outcome = v
            .validate_and_apply(
                &ctx,
                &BroadcastMessage::new("0xaaa"),
                &OrganizationClaim::child("org-c", "org-a", "OrgC"),
            )
            .await;
        assert!(outcome.is_accepted(), "{outcome:?}");

        let outcome = v
            .validate_and_apply(
                &ctx,
                &BroadcastMessage::new("0xccc"),
                &OrganizationClaim::child("org-d", "org-a", "OrgD"),
            )
            .await;
        assert!(matches!(
            outcome.rejection(),
            Some(RejectReason::SignatureMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_claim_never_touches_collaborators() {
        let v = validator();
        let ctx = Context::background();
        ctx.cancel();

        // Even with a dead context, a malformed claim is a plain rejection.
        let outcome = v
            .validate_and_apply(
                &ctx,
                &BroadcastMessage::new("0xaaa"),
                &OrganizationClaim::root("", "OrgA"),
            )
            .await;
        assert_eq!(
            outcome.rejection().map(RejectReason::kind),
            Some(RejectionKind::Validation)
        );
    }

    #[tokio::test]
    async fn test_unknown_signer_rejected() {
        let v = validator();
        let outcome = v
            .validate_and_apply(
                &Context::background(),
                &BroadcastMessage::new("0xzzz"),
                &OrganizationClaim::root("org-z", "OrgZ"),
            )
            .await;
        assert!(matches!(
            outcome.rejection(),
            Some(RejectReason::UnresolvedSigner { identity, .. }) if identity == "org-z"
        ));
    }
}
