//! Best-effort narrative enrichment of displayed events.

use crate::error::Result;
use crate::event::{keys, Event};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A short comment and urgency tier attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<String>,
}

/// An external service commenting on events.
///
/// Calls happen off the pipeline's critical path: an event is displayed
/// first and patched when (and if) its enrichment arrives.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Whether `event` is worth asking about.
    fn wants(&self, _event: &Event) -> bool {
        true
    }

    /// Comment on `event`. `Ok(None)` means nothing to add.
    async fn enrich(&self, event: &Event) -> Result<Option<Enrichment>>;
}

/// Run `enricher` on `event`, giving up after `timeout`.
///
/// Failures and timeouts are logged and reported as `None`.
pub async fn enrich_with_timeout(
    enricher: &dyn Enricher,
    event: &Event,
    timeout: Duration,
) -> Option<Enrichment> {
    match tokio::time::timeout(timeout, enricher.enrich(event)).await {
        Ok(Ok(enrichment)) => enrichment,
        Ok(Err(e)) => {
            log::warn!(target: "livefeed::enrich", "enrichment of {} failed: {e}", event.id);
            None
        }
        Err(_) => {
            log::warn!(
                target: "livefeed::enrich",
                "enrichment of {} timed out after {timeout:?}",
                event.id
            );
            None
        }
    }
}

/// Write the enrichment into the event's narrative payload fields.
pub fn apply_enrichment(event: &mut Event, enrichment: &Enrichment) {
    event.payload.insert(
        keys::ORACLE_RESPONSE.into(),
        Value::String(enrichment.comment.clone()),
    );
    if let Some(urgency) = &enrichment.urgency {
        event.payload.insert(keys::URGENCY.into(), Value::String(urgency.clone()));
    }
}
