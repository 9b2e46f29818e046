//! Inbound GitLab webhook payload.
//!
//! The merge-request event payload carries dozens of fields; this service
//! reads exactly five. Everything else is left undeserialized; serde
//! drops unknown fields, so the payload acts as an opaque bag around the
//! handful of names below.

use serde::Deserialize;

/// Merge-request webhook event, reduced to the fields policy cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event kind, `"merge_request"` for the events this service handles.
    #[serde(default)]
    pub object_kind: String,

    #[serde(default)]
    pub object_attributes: ObjectAttributes,

    #[serde(default)]
    pub user: EventUser,
}

/// `object_attributes` subset of the MR event payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectAttributes {
    /// What happened: `open`, `reopen`, `approved`, `unapproved`, ...
    #[serde(default)]
    pub action: String,

    /// Project-scoped MR number.
    #[serde(default)]
    pub iid: i64,

    /// Project the MR targets; this is what rules match on.
    #[serde(default)]
    pub target_project_id: i64,
}

/// User that triggered the event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventUser {
    #[serde(default)]
    pub username: String,
}

impl WebhookEvent {
    /// Actions that change approval state or (re)open an MR.
    const RELEVANT_ACTIONS: [&'static str; 4] = ["open", "reopen", "approved", "unapproved"];

    /// Whether this event should trigger a reconciliation at all.
    pub fn is_relevant(&self) -> bool {
        self.object_kind == "merge_request"
            && Self::RELEVANT_ACTIONS.contains(&self.object_attributes.action.as_str())
    }
}
