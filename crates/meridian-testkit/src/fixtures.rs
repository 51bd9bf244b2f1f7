//! Claim, message and resolver fixtures.
//!
//! Every identity gets a deterministic signer address, so a test can build a
//! correctly signed message from the identity alone.

use meridian_core::Context;
use meridian_directory::{
    BroadcastMessage, MemoryDirectory, OrgIdentityValidator, OrganizationClaim, StaticResolver,
};

/// Deterministic on-chain address for `identity`
pub fn signer_address(identity: &str) -> String {
    let hex: String = identity.bytes().map(|b| format!("{b:02x}")).collect();
    format!("0x{hex}")
}

/// Claim for a root organization, named after its identity
pub fn root_claim(identity: &str) -> OrganizationClaim {
    OrganizationClaim::root(identity, display_name(identity))
}

/// Claim for a child organization, named after its identity
pub fn child_claim(identity: &str, parent: &str) -> OrganizationClaim {
    OrganizationClaim::child(identity, parent, display_name(identity))
}

/// Fresh message authored by `author`
pub fn message_from(author: &str) -> BroadcastMessage {
    BroadcastMessage::new(author)
}

/// Message correctly signed for `claim` (by the claim's signing identity)
pub fn signed_message(claim: &OrganizationClaim) -> BroadcastMessage {
    message_from(&signer_address(claim.signing_identity()))
}

/// Resolver knowing each of `identities` under its [`signer_address`]
pub fn resolver_for(identities: &[&str]) -> StaticResolver {
    identities
        .iter()
        .map(|identity| (*identity, signer_address(identity)))
        .collect()
}

/// Validator over an empty in-memory directory and a resolver for `identities`
pub fn memory_validator(
    identities: &[&str],
) -> OrgIdentityValidator<MemoryDirectory, StaticResolver> {
    OrgIdentityValidator::new(MemoryDirectory::new(), resolver_for(identities))
}

/// Apply a correctly signed claim and panic unless it is accepted.
pub async fn seed_claim<S, R>(validator: &OrgIdentityValidator<S, R>, claim: &OrganizationClaim)
where
    S: meridian_directory::DirectoryStore,
    R: meridian_directory::IdentityResolver,
{
    let outcome = validator
        .validate_and_apply(&Context::background(), &signed_message(claim), claim)
        .await;
    assert!(outcome.is_accepted(), "seeding {} failed: {outcome:?}", claim.identity);
}

fn display_name(identity: &str) -> String {
    let name: String = identity
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let name = name.trim_matches(|c: char| !c.is_ascii_alphanumeric());
    if name.is_empty() {
        "org".to_owned()
    } else {
        name.chars().take(64).collect()
    }
}
