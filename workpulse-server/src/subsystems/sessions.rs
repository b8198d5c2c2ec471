//! Session listing: every stored row, unfiltered and unpaginated.

use workpulse_core::SessionStore;

/// Fetch all session rows. An unreachable or failing data API yields `[]`,
/// indistinguishable from an empty table.
pub async fn list_sessions(store: &dyn SessionStore) -> serde_json::Value {
    let rows = store.list().await;
    tracing::debug!(count = rows.len(), "Listed sessions");
    serde_json::Value::Array(rows)
}
