//! Result envelopes written back to the orchestration host.
//!
//! Success:
//!
//! ```text
//! { "changed": true, "failed": false, "action": "create",
//!   "resources": [ ... ], "instance_ids": { "instances": ["<id>", ...] } }
//! ```
//!
//! Failure:
//!
//! ```text
//! { "failed": true, "changed": false, "msg": "...", "kind": "not_found" }
//! ```

use serde::Serialize;

use crate::profitbricks_error::ProfitbricksError;
use crate::profitbricks_types::Resource;

/// Action reported by a module run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Resources were created (or already existed).
    Create,
    /// Resources were patched.
    Update,
    /// Resources were deleted.
    Delete,
    /// Servers were powered on.
    Start,
    /// Servers were powered off.
    Stop,
}

/// Anything reported in `resources` that carries a provider id.
pub trait Identified {
    /// Provider id.
    fn resource_id(&self) -> &str;
}

impl<P> Identified for Resource<P> {
    fn resource_id(&self) -> &str {
        &self.id
    }
}

/// Ids of the resources a run touched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstanceIds {
    /// Resource ids in batch order.
    pub instances: Vec<String>,
}

/// Success envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleResult<T> {
    /// Whether any infrastructure changed (or would change, in check mode).
    pub changed: bool,
    /// Always false on success.
    pub failed: bool,
    /// Resources in batch order.
    pub resources: Vec<T>,
    /// What the run did.
    pub action: Action,
    /// Ids of `resources`.
    pub instance_ids: InstanceIds,
}

impl<T: Identified> ModuleResult<T> {
    /// Build an envelope, deriving `instance_ids` from `resources`.
    #[must_use]
    pub fn new(action: Action, changed: bool, resources: Vec<T>) -> Self {
        let instances = resources
            .iter()
            .map(|r| r.resource_id().to_string())
            .collect();
        Self {
            changed,
            failed: false,
            resources,
            action,
            instance_ids: InstanceIds { instances },
        }
    }
}

impl<T: Serialize> ModuleResult<T> {
    /// Encode as JSON.
    ///
    /// # Errors
    ///
    /// Returns `Encode` if a resource cannot be serialized.
    pub fn into_json(self) -> Result<serde_json::Value, ProfitbricksError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Failure envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleFailure {
    /// Always true.
    pub failed: bool,
    /// Always false.
    pub changed: bool,
    /// Human-readable message.
    pub msg: String,
    /// Error tag (`validation`, `not_found`, ...).
    pub kind: &'static str,
}

impl From<&ProfitbricksError> for ModuleFailure {
    fn from(err: &ProfitbricksError) -> Self {
        Self {
            failed: true,
            changed: false,
            msg: err.to_string(),
            kind: err.kind_tag(),
        }
    }
}
