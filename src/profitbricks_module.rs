//! Module runner.
//!
//! Decodes the host's parameters, builds the API client and dispatches to
//! the reconciler of the requested module. Reconcilers receive a
//! `ReconcileContext` holding everything that is not a declarative option:
//! the API handle, the wait policy and the check-mode flag.

use std::fmt;

use clap::ValueEnum;
use serde_json::Value;
use tracing::info;

use crate::profitbricks_api::CloudApi;
use crate::profitbricks_client::ProfitbricksClient;
use crate::profitbricks_error::{ProfitbricksError, RemoteContext, Result};
use crate::profitbricks_params::{
    CommonParams, DatacenterParams, LanParams, NicParams, ServerParams, VolumeParams, parse,
};
use crate::profitbricks_state::DesiredState;
use crate::profitbricks_waiter::{WaitPolicy, wait_for_request};
use crate::{
    profitbricks_datacenter, profitbricks_lan, profitbricks_nic, profitbricks_server,
    profitbricks_volume,
};

/// Modules served by the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum ModuleKind {
    /// Virtual datacenters.
    Datacenter,
    /// LANs of a datacenter.
    Lan,
    /// Servers with their boot volume and NICs.
    Server,
    /// Block storage volumes.
    Volume,
    /// NICs of a server.
    Nic,
}

impl ModuleKind {
    /// Module name as given on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Datacenter => "datacenter",
            Self::Lan => "lan",
            Self::Server => "server",
            Self::Volume => "volume",
            Self::Nic => "nic",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a reconciler needs besides its parameters.
#[derive(Clone, Copy)]
pub struct ReconcileContext<'a> {
    /// Cloud API handle.
    pub api: &'a dyn CloudApi,
    /// How to wait for provider requests.
    pub wait: WaitPolicy,
    /// Plan only, mutate nothing.
    pub check_mode: bool,
}

impl<'a> ReconcileContext<'a> {
    /// Context for a run with the given shared options.
    #[must_use]
    pub const fn new(api: &'a dyn CloudApi, common: &CommonParams) -> Self {
        Self {
            api,
            wait: common.wait_policy(),
            check_mode: common.check_mode,
        }
    }

    /// Wait for the request issued by a mutation, as the wait policy allows.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed`, `Timeout` or `Remote` from the waiter.
    pub async fn settle(&self, request_id: Option<&str>, operation: &str) -> Result<()> {
        wait_for_request(self.api, &self.wait, request_id, operation).await
    }
}

/// Error for a state a module does not handle.
#[must_use]
pub fn unsupported_state(kind: ModuleKind, state: DesiredState) -> ProfitbricksError {
    ProfitbricksError::validation(format!(
        "state '{state}' is not supported by the {kind} module"
    ))
}

/// Run a module against the live Cloud API.
///
/// # Errors
///
/// Returns a `Validation` error for bad parameters or missing credentials,
/// and whatever the reconciler reports.
pub async fn run_module(kind: ModuleKind, args: Value) -> Result<Value> {
    let common: CommonParams = parse(args.clone())?;
    let client = ProfitbricksClient::new(common.client_config()?).remote("build API client")?;
    info!(api_url = %client.config().api_url, "cloud api client ready");
    run_with_api(&client, kind, args).await
}

/// Run a module against any `CloudApi` implementation.
///
/// # Errors
///
/// Returns a `Validation` error for bad parameters and whatever the reconciler reports.
pub async fn run_with_api(api: &dyn CloudApi, kind: ModuleKind, args: Value) -> Result<Value> {
    match kind {
        ModuleKind::Datacenter => {
            let params: DatacenterParams = parse(args)?;
            let ctx = start(api, kind, &params.common);
            profitbricks_datacenter::reconcile(&ctx, &params).await
        }
        ModuleKind::Lan => {
            let params: LanParams = parse(args)?;
            let ctx = start(api, kind, &params.common);
            profitbricks_lan::reconcile(&ctx, &params).await
        }
        ModuleKind::Server => {
            let params: ServerParams = parse(args)?;
            let ctx = start(api, kind, &params.common);
            profitbricks_server::reconcile(&ctx, &params).await
        }
        ModuleKind::Volume => {
            let params: VolumeParams = parse(args)?;
            let ctx = start(api, kind, &params.common);
            profitbricks_volume::reconcile(&ctx, &params).await
        }
        ModuleKind::Nic => {
            let params: NicParams = parse(args)?;
            let ctx = start(api, kind, &params.common);
            profitbricks_nic::reconcile(&ctx, &params).await
        }
    }
}

fn start<'a>(api: &'a dyn CloudApi, kind: ModuleKind, common: &CommonParams) -> ReconcileContext<'a> {
    info!(
        module = %kind,
        state = %common.state,
        check_mode = common.check_mode,
        wait = common.wait,
        "running module"
    );
    ReconcileContext::new(api, common)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_names_match_the_cli() {
        for kind in ModuleKind::value_variants() {
            let parsed = ModuleKind::from_str(kind.as_str(), false).unwrap();
            assert_eq!(parsed, *kind);
        }
    }

    #[test]
    fn unsupported_states_are_validation_errors() {
        let err = unsupported_state(ModuleKind::Volume, DesiredState::Running);
        assert_eq!(err.kind_tag(), "validation");
        assert_eq!(
            err.to_string(),
            "state 'running' is not supported by the volume module"
        );
    }
}
