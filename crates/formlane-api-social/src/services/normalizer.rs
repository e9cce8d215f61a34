//! Canonical identity normalization.

use crate::error::{AuthFlowError, AuthFlowResult};
use crate::models::{CanonicalIdentity, RawProviderUser};

/// Map a provider-shaped user into the one canonical identity record.
///
/// `external_id` and `name` are the only hard requirements. Email is
/// lowercased when present; some widget providers legitimately omit it.
/// Everything else defaults rather than failing.
pub fn normalize(raw: RawProviderUser) -> AuthFlowResult<CanonicalIdentity> {
    if raw.external_id.is_empty() {
        return Err(AuthFlowError::MissingRequiredField {
            field: "external_id",
        });
    }

    let name = raw
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or(AuthFlowError::MissingRequiredField { field: "name" })?;

    Ok(CanonicalIdentity {
        external_id: raw.external_id,
        name,
        email: raw.email.map(|e| e.trim().to_lowercase()),
        avatar_url: raw.avatar_url,
        access_token: raw.access_token,
        refresh_token: raw.refresh_token,
        scopes: raw.scopes,
    })
}
