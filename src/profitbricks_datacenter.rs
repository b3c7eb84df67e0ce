//! Datacenter reconciler.
//!
//! - present: created in `location` when no datacenter carries the name.
//! - update: only `description` is mutable.
//! - absent: deleted when found; a missing datacenter is a no-op.

use serde_json::Value;
use tracing::info;

use crate::profitbricks_error::{ProfitbricksError, RemoteContext, Result};
use crate::profitbricks_module::{ModuleKind, ReconcileContext, unsupported_state};
use crate::profitbricks_params::{DatacenterParams, require};
use crate::profitbricks_resolver::{is_uuid, lookup, resolve};
use crate::profitbricks_result::{Action, ModuleResult};
use crate::profitbricks_state::{DesiredState, Observation, PlannedAction, plan};
use crate::profitbricks_types::{Datacenter, DatacenterProperties, Location, ResourceKind};

/// Reconcile one datacenter.
///
/// # Errors
///
/// Returns `Validation` for missing parameters, `NotFound`/`AmbiguousMatch`
/// for unresolvable identities, and waiter or API errors.
pub async fn reconcile(ctx: &ReconcileContext<'_>, params: &DatacenterParams) -> Result<Value> {
    let state = params.common.state;
    match state {
        DesiredState::Present => {
            let name = require(params.name.as_deref(), "name", state)?;
            let (dc, created) = ensure(ctx, name, params.location, params.description.as_deref())
                .await?;
            let resources: Vec<Datacenter> = dc.into_iter().collect();
            ModuleResult::new(Action::Create, created, resources).into_json()
        }
        DesiredState::Update => update(ctx, params).await?.into_json(),
        DesiredState::Absent => remove(ctx, params).await?.into_json(),
        DesiredState::Running | DesiredState::Stopped => {
            Err(unsupported_state(ModuleKind::Datacenter, state))
        }
    }
}

/// Find a datacenter by name or id.
///
/// # Errors
///
/// Returns `AmbiguousMatch` when the name is shared, or `Remote`.
pub async fn find(ctx: &ReconcileContext<'_>, identity: &str) -> Result<Option<Datacenter>> {
    let all = ctx.api.list_datacenters().await.remote("list datacenters")?;
    Ok(lookup(&all, identity, ResourceKind::Datacenter)?.cloned())
}

/// Resolve a datacenter that must exist.
///
/// # Errors
///
/// Returns `NotFound` or `AmbiguousMatch`, or `Remote`.
pub async fn get(ctx: &ReconcileContext<'_>, identity: &str) -> Result<Datacenter> {
    let all = ctx.api.list_datacenters().await.remote("list datacenters")?;
    Ok(resolve(&all, identity, ResourceKind::Datacenter)?.clone())
}

/// Find a datacenter by name or id, creating it when missing.
///
/// Returns the datacenter (`None` only in check mode, when it would be
/// created) and whether it was (or would be) created.
///
/// # Errors
///
/// Returns `NotFound` for a missing UUID (ids are never invented), and
/// waiter or API errors.
pub async fn ensure(
    ctx: &ReconcileContext<'_>,
    identity: &str,
    location: Location,
    description: Option<&str>,
) -> Result<(Option<Datacenter>, bool)> {
    let existing = find(ctx, identity).await?;
    let found = existing.is_some();

    match plan(DesiredState::Present, Observation::of(found, true)) {
        PlannedAction::Create if is_uuid(identity) => Err(ProfitbricksError::not_found(
            ResourceKind::Datacenter,
            identity,
        )),
        PlannedAction::Create if ctx.check_mode => Ok((None, true)),
        PlannedAction::Create => {
            let props = DatacenterProperties {
                name: Some(identity.to_string()),
                location: Some(location.as_str().to_string()),
                description: description.map(str::to_string),
            };
            info!(name = identity, %location, "creating datacenter");
            let accepted = ctx
                .api
                .create_datacenter(&props)
                .await
                .remote("create datacenter")?;
            ctx.settle(accepted.request_id.as_deref(), "create datacenter")
                .await?;
            let fresh = ctx
                .api
                .get_datacenter(&accepted.value.id)
                .await
                .remote("fetch datacenter")?;
            Ok((Some(fresh.unwrap_or(accepted.value)), true))
        }
        _ => Ok((existing, false)),
    }
}

async fn update(
    ctx: &ReconcileContext<'_>,
    params: &DatacenterParams,
) -> Result<ModuleResult<Datacenter>> {
    let identity = require(params.identity(), "name", DesiredState::Update)?;
    let live = get(ctx, identity).await?;

    let description = params
        .description
        .clone()
        .or_else(|| live.properties.description.clone());
    let in_sync = description == live.properties.description;

    match plan(DesiredState::Update, Observation::of(true, in_sync)) {
        PlannedAction::Update if ctx.check_mode => {
            Ok(ModuleResult::new(Action::Update, true, vec![live]))
        }
        PlannedAction::Update => {
            info!(datacenter_id = %live.id, "updating datacenter");
            let patch = DatacenterProperties {
                description,
                ..DatacenterProperties::default()
            };
            let accepted = ctx
                .api
                .update_datacenter(&live.id, &patch)
                .await
                .remote("update datacenter")?;
            ctx.settle(accepted.request_id.as_deref(), "update datacenter")
                .await?;
            let fresh = ctx
                .api
                .get_datacenter(&live.id)
                .await
                .remote("fetch datacenter")?
                .unwrap_or(accepted.value);
            Ok(ModuleResult::new(Action::Update, true, vec![fresh]))
        }
        _ => Ok(ModuleResult::new(Action::Update, false, vec![live])),
    }
}

async fn remove(
    ctx: &ReconcileContext<'_>,
    params: &DatacenterParams,
) -> Result<ModuleResult<Datacenter>> {
    let identity = require(params.identity(), "name", DesiredState::Absent)?;
    let Some(live) = find(ctx, identity).await? else {
        return Ok(ModuleResult::new(Action::Delete, false, Vec::new()));
    };

    if !ctx.check_mode {
        info!(datacenter_id = %live.id, "deleting datacenter");
        let request_id = ctx
            .api
            .delete_datacenter(&live.id)
            .await
            .remote("delete datacenter")?;
        ctx.settle(request_id.as_deref(), "delete datacenter").await?;
    }
    Ok(ModuleResult::new(Action::Delete, true, vec![live]))
}
