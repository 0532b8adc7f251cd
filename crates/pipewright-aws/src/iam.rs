//! Trust policy patching
//!
//! The identity store offers no compare-and-swap on trust policies, so
//! [`add_trust_statement`] is a plain read-modify-write: another writer
//! updating the same role between our read and our write loses its change.
//! pipewright assumes it is the only writer for the roles it patches.

use tracing::info;

use pipewright_common::trust::{Statement, TrustDocument};
use pipewright_common::Result;

use crate::IdentityStore;

/// Append a statement letting `principal_arn` assume `role`.
///
/// Existing statements are written back unchanged and in order. Running this
/// twice for the same principal appends the statement twice.
pub async fn add_trust_statement(
    store: &dyn IdentityStore,
    role: &str,
    principal_arn: &str,
) -> Result<TrustDocument> {
    let raw = store.get_trust_policy(role).await?;
    let mut document = TrustDocument::parse_encoded(role, &raw)?;

    document.append_statement(Statement::assume_role(principal_arn));

    store
        .update_trust_policy(role, &document.to_json(role)?)
        .await?;

    info!(
        role = %role,
        principal = %principal_arn,
        statements = document.statements.len(),
        "Trust policy updated"
    );
    Ok(document)
}
