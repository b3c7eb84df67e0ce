//! NIC reconciler.
//!
//! NICs belong to a server. `present` needs a LAN; when `name` is omitted a
//! random one is generated, so every such run creates a new NIC.

use serde_json::Value;
use tracing::info;

use crate::profitbricks_datacenter as datacenter;
use crate::profitbricks_error::{RemoteContext, Result};
use crate::profitbricks_lan::lan_id;
use crate::profitbricks_module::{ModuleKind, ReconcileContext, unsupported_state};
use crate::profitbricks_naming::random_name;
use crate::profitbricks_params::{NicParams, require};
use crate::profitbricks_resolver::{lookup, resolve};
use crate::profitbricks_result::{Action, ModuleResult};
use crate::profitbricks_state::{DesiredState, Observation, PlannedAction, plan};
use crate::profitbricks_types::{Nic, NicProperties, ResourceKind};

/// Reconcile one NIC.
///
/// # Errors
///
/// Returns `Validation` for missing parameters, `NotFound`/`AmbiguousMatch`
/// for unresolvable identities, and waiter or API errors.
pub async fn reconcile(ctx: &ReconcileContext<'_>, params: &NicParams) -> Result<Value> {
    let state = params.common.state;
    match state {
        DesiredState::Present => create(ctx, params).await?.into_json(),
        DesiredState::Update => update(ctx, params).await?.into_json(),
        DesiredState::Absent => remove(ctx, params).await?.into_json(),
        DesiredState::Running | DesiredState::Stopped => {
            Err(unsupported_state(ModuleKind::Nic, state))
        }
    }
}

/// Datacenter and server ids a NIC lives under.
struct Parent {
    datacenter_id: String,
    server_id: String,
}

async fn parent(ctx: &ReconcileContext<'_>, params: &NicParams, state: DesiredState) -> Result<Parent> {
    let dc = datacenter::get(ctx, require(params.datacenter.as_deref(), "datacenter", state)?)
        .await?;
    let server = require(params.server.as_deref(), "server", state)?;
    let servers = ctx.api.list_servers(&dc.id).await.remote("list servers")?;
    let server_id = resolve(&servers, server, ResourceKind::Server)?.id.clone();
    Ok(Parent {
        datacenter_id: dc.id,
        server_id,
    })
}

async fn create(ctx: &ReconcileContext<'_>, params: &NicParams) -> Result<ModuleResult<Nic>> {
    let state = DesiredState::Present;
    let lan = require(params.lan.as_ref(), "lan", state)?;
    let Parent {
        datacenter_id,
        server_id,
    } = parent(ctx, params, state).await?;

    let name = params.name.clone().unwrap_or_else(random_name);
    let nics = ctx
        .api
        .list_nics(&datacenter_id, &server_id)
        .await
        .remote("list NICs")?;
    let existing = lookup(&nics, &name, ResourceKind::Nic)?;

    match plan(state, Observation::of(existing.is_some(), true)) {
        PlannedAction::Create if ctx.check_mode => {
            Ok(ModuleResult::new(Action::Create, true, Vec::new()))
        }
        PlannedAction::Create => {
            let lans = ctx
                .api
                .list_lans(&datacenter_id)
                .await
                .remote("list LANs")?;
            let props = NicProperties {
                name: Some(name),
                lan: Some(lan_id(&lans, lan)?),
                nat: params.nat,
                dhcp: params.dhcp,
                firewall_active: params.firewall_active,
                ips: params.ips.clone(),
                mac: None,
            };
            info!(%datacenter_id, %server_id, name = ?props.name, "creating NIC");
            let accepted = ctx
                .api
                .create_nic(&datacenter_id, &server_id, &props)
                .await
                .remote("create NIC")?;
            ctx.settle(accepted.request_id.as_deref(), "create NIC")
                .await?;
            let fresh = ctx
                .api
                .get_nic(&datacenter_id, &server_id, &accepted.value.id)
                .await
                .remote("fetch NIC")?
                .unwrap_or(accepted.value);
            Ok(ModuleResult::new(Action::Create, true, vec![fresh]))
        }
        _ => Ok(ModuleResult::new(
            Action::Create,
            false,
            existing.into_iter().cloned().collect(),
        )),
    }
}

async fn update(ctx: &ReconcileContext<'_>, params: &NicParams) -> Result<ModuleResult<Nic>> {
    let state = DesiredState::Update;
    let identity = require(params.name.as_deref(), "name", state)?;
    let Parent {
        datacenter_id,
        server_id,
    } = parent(ctx, params, state).await?;

    let nics = ctx
        .api
        .list_nics(&datacenter_id, &server_id)
        .await
        .remote("list NICs")?;
    let live = resolve(&nics, identity, ResourceKind::Nic)?.clone();

    let lan = match &params.lan {
        Some(lan) => {
            let lans = ctx
                .api
                .list_lans(&datacenter_id)
                .await
                .remote("list LANs")?;
            Some(lan_id(&lans, lan)?)
        }
        None => live.properties.lan,
    };
    let patch = NicProperties {
        name: None,
        mac: None,
        lan,
        nat: params.nat.or(live.properties.nat),
        dhcp: params.dhcp.or(live.properties.dhcp),
        firewall_active: params.firewall_active.or(live.properties.firewall_active),
        ips: params.ips.clone().or_else(|| live.properties.ips.clone()),
    };
    let in_sync = patch.lan == live.properties.lan
        && patch.nat == live.properties.nat
        && patch.dhcp == live.properties.dhcp
        && patch.firewall_active == live.properties.firewall_active
        && patch.ips == live.properties.ips;

    match plan(state, Observation::of(true, in_sync)) {
        PlannedAction::Update if ctx.check_mode => {
            Ok(ModuleResult::new(Action::Update, true, vec![live]))
        }
        PlannedAction::Update => {
            info!(%datacenter_id, %server_id, nic_id = %live.id, "updating NIC");
            let accepted = ctx
                .api
                .update_nic(&datacenter_id, &server_id, &live.id, &patch)
                .await
                .remote("update NIC")?;
            ctx.settle(accepted.request_id.as_deref(), "update NIC")
                .await?;
            let fresh = ctx
                .api
                .get_nic(&datacenter_id, &server_id, &live.id)
                .await
                .remote("fetch NIC")?
                .unwrap_or(accepted.value);
            Ok(ModuleResult::new(Action::Update, true, vec![fresh]))
        }
        _ => Ok(ModuleResult::new(Action::Update, false, vec![live])),
    }
}

async fn remove(ctx: &ReconcileContext<'_>, params: &NicParams) -> Result<ModuleResult<Nic>> {
    let state = DesiredState::Absent;
    let dc_identity = require(params.datacenter.as_deref(), "datacenter", state)?;
    let server_identity = require(params.server.as_deref(), "server", state)?;
    let identity = require(params.name.as_deref(), "name", state)?;

    let Some(dc) = datacenter::find(ctx, dc_identity).await? else {
        return Ok(ModuleResult::new(Action::Delete, false, Vec::new()));
    };
    let servers = ctx.api.list_servers(&dc.id).await.remote("list servers")?;
    let Some(server) = lookup(&servers, server_identity, ResourceKind::Server)? else {
        return Ok(ModuleResult::new(Action::Delete, false, Vec::new()));
    };
    let nics = ctx
        .api
        .list_nics(&dc.id, &server.id)
        .await
        .remote("list NICs")?;
    let Some(live) = lookup(&nics, identity, ResourceKind::Nic)?.cloned() else {
        return Ok(ModuleResult::new(Action::Delete, false, Vec::new()));
    };

    if !ctx.check_mode {
        info!(datacenter_id = %dc.id, server_id = %server.id, nic_id = %live.id, "deleting NIC");
        let request_id = ctx
            .api
            .delete_nic(&dc.id, &server.id, &live.id)
            .await
            .remote("delete NIC")?;
        ctx.settle(request_id.as_deref(), "delete NIC").await?;
    }
    Ok(ModuleResult::new(Action::Delete, true, vec![live]))
}
