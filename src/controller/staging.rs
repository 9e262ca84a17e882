//! Label transitions for promoting a version.
//!
//! Each move is one store call. PREVIOUS is attached to the old CURRENT
//! before CURRENT moves, so once the new version is live the history is
//! already in place and a repeated finish only has PENDING left to clear.

use crate::error::Result;
use crate::model::StagingLabel;
use crate::store::SecretStore;
use tracing::debug;

/// Make `token` CURRENT, `old_current` PREVIOUS, and drop PENDING from `token`
pub async fn promote<S: SecretStore + ?Sized>(
    store: &S,
    secret_id: &str,
    token: &str,
    old_current: &str,
) -> Result<()> {
    let labels = store.list_version_labels(secret_id).await?;
    if !labels.has_label(old_current, StagingLabel::Previous) {
        store
            .move_label(
                secret_id,
                StagingLabel::Previous,
                labels.holder(StagingLabel::Previous),
                Some(old_current),
            )
            .await?;
        debug!("PREVIOUS moved to {}", old_current);
    }

    // Secrets Manager re-attaches PREVIOUS to the old holder here, which is
    // where it already sits
    store
        .move_label(secret_id, StagingLabel::Current, Some(old_current), Some(token))
        .await?;
    debug!("CURRENT moved {} -> {}", old_current, token);

    if labels.has_label(token, StagingLabel::Pending) {
        clear_pending(store, secret_id, token).await?;
    }
    Ok(())
}

/// Remove PENDING from `token`
pub async fn clear_pending<S: SecretStore + ?Sized>(
    store: &S,
    secret_id: &str,
    token: &str,
) -> Result<()> {
    store
        .move_label(secret_id, StagingLabel::Pending, Some(token), None)
        .await?;
    debug!("PENDING removed from {}", token);
    Ok(())
}
