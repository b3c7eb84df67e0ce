//! LAN reconciler and LAN lookups shared with the server and NIC modules.
//!
//! LAN ids are small integers assigned by the provider. They travel as
//! strings in the resource envelope and as numbers in NIC properties.

use serde_json::Value;
use tracing::info;

use crate::profitbricks_datacenter as datacenter;
use crate::profitbricks_error::{ProfitbricksError, RemoteContext, Result};
use crate::profitbricks_module::{ModuleKind, ReconcileContext, unsupported_state};
use crate::profitbricks_params::{LanParams, LanRef, require};
use crate::profitbricks_resolver::{lookup, resolve};
use crate::profitbricks_result::{Action, ModuleResult};
use crate::profitbricks_state::{DesiredState, Observation, PlannedAction, plan};
use crate::profitbricks_types::{Lan, LanProperties, ResourceKind};

/// Name given to the LAN created for `assign_public_ip`.
pub const PUBLIC_LAN_NAME: &str = "public";

/// Reconcile one LAN.
///
/// # Errors
///
/// Returns `Validation` for missing parameters, `NotFound`/`AmbiguousMatch`
/// for unresolvable identities, and waiter or API errors.
pub async fn reconcile(ctx: &ReconcileContext<'_>, params: &LanParams) -> Result<Value> {
    let state = params.common.state;
    match state {
        DesiredState::Present => create(ctx, params).await?.into_json(),
        DesiredState::Update => update(ctx, params).await?.into_json(),
        DesiredState::Absent => remove(ctx, params).await?.into_json(),
        DesiredState::Running | DesiredState::Stopped => {
            Err(unsupported_state(ModuleKind::Lan, state))
        }
    }
}

/// Numeric id of a LAN resource.
///
/// # Errors
///
/// Returns a `Validation` error when the provider id is not numeric.
pub fn lan_number(lan: &Lan) -> Result<u32> {
    lan.id
        .parse()
        .map_err(|_| ProfitbricksError::validation(format!("LAN id '{}' is not numeric", lan.id)))
}

/// Numeric id of the LAN a parameter refers to.
///
/// Numbers are taken as-is; the provider creates a private LAN on first use.
///
/// # Errors
///
/// Returns `NotFound` for an unknown name and `AmbiguousMatch` for a shared one.
pub fn lan_id(lans: &[Lan], lan: &LanRef) -> Result<u32> {
    match lan {
        LanRef::Id(id) => Ok(*id),
        LanRef::Name(name) => match lookup(lans, name, ResourceKind::Lan)? {
            Some(found) => lan_number(found),
            None => name
                .trim()
                .parse()
                .map_err(|_| ProfitbricksError::not_found(ResourceKind::Lan, name.as_str())),
        },
    }
}

/// Id of a public LAN in the datacenter, creating one named `public` when none exists.
///
/// # Errors
///
/// Returns waiter or API errors.
pub async fn ensure_public_lan(ctx: &ReconcileContext<'_>, datacenter_id: &str) -> Result<u32> {
    let lans = ctx.api.list_lans(datacenter_id).await.remote("list LANs")?;
    if let Some(public) = lans.iter().find(|l| l.properties.public == Some(true)) {
        return lan_number(public);
    }

    info!(datacenter_id, "creating public LAN");
    let props = LanProperties {
        name: Some(PUBLIC_LAN_NAME.to_string()),
        public: Some(true),
        ip_failover: None,
    };
    let accepted = ctx
        .api
        .create_lan(datacenter_id, &props)
        .await
        .remote("create LAN")?;
    ctx.settle(accepted.request_id.as_deref(), "create LAN")
        .await?;
    lan_number(&accepted.value)
}

async fn create(ctx: &ReconcileContext<'_>, params: &LanParams) -> Result<ModuleResult<Lan>> {
    let state = DesiredState::Present;
    let dc = datacenter::get(ctx, require(params.datacenter.as_deref(), "datacenter", state)?)
        .await?;
    let name = require(params.name.as_deref(), "name", state)?;

    let lans = ctx.api.list_lans(&dc.id).await.remote("list LANs")?;
    let existing = lookup(&lans, name, ResourceKind::Lan)?;

    match plan(state, Observation::of(existing.is_some(), true)) {
        PlannedAction::Create if ctx.check_mode => {
            Ok(ModuleResult::new(Action::Create, true, Vec::new()))
        }
        PlannedAction::Create => {
            let props = LanProperties {
                name: Some(name.to_string()),
                public: Some(params.public.unwrap_or(true)),
                ip_failover: params.ip_failover.clone(),
            };
            info!(datacenter_id = %dc.id, name, "creating LAN");
            let accepted = ctx
                .api
                .create_lan(&dc.id, &props)
                .await
                .remote("create LAN")?;
            ctx.settle(accepted.request_id.as_deref(), "create LAN")
                .await?;
            let fresh = ctx
                .api
                .get_lan(&dc.id, &accepted.value.id)
                .await
                .remote("fetch LAN")?
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

async fn update(ctx: &ReconcileContext<'_>, params: &LanParams) -> Result<ModuleResult<Lan>> {
    let state = DesiredState::Update;
    let dc = datacenter::get(ctx, require(params.datacenter.as_deref(), "datacenter", state)?)
        .await?;
    let lan_identity = params.identity();
    let identity = require(lan_identity.as_deref(), "name", state)?;

    let lans = ctx.api.list_lans(&dc.id).await.remote("list LANs")?;
    let live = resolve(&lans, identity, ResourceKind::Lan)?.clone();

    let public = params.public.or(live.properties.public);
    let ip_failover = params
        .ip_failover
        .clone()
        .or_else(|| live.properties.ip_failover.clone());
    let in_sync = public == live.properties.public && ip_failover == live.properties.ip_failover;

    match plan(state, Observation::of(true, in_sync)) {
        PlannedAction::Update if ctx.check_mode => {
            Ok(ModuleResult::new(Action::Update, true, vec![live]))
        }
        PlannedAction::Update => {
            let patch = LanProperties {
                name: None,
                public,
                ip_failover,
            };
            info!(datacenter_id = %dc.id, lan_id = %live.id, "updating LAN");
            let accepted = ctx
                .api
                .update_lan(&dc.id, &live.id, &patch)
                .await
                .remote("update LAN")?;
            ctx.settle(accepted.request_id.as_deref(), "update LAN")
                .await?;
            let fresh = ctx
                .api
                .get_lan(&dc.id, &live.id)
                .await
                .remote("fetch LAN")?
                .unwrap_or(accepted.value);
            Ok(ModuleResult::new(Action::Update, true, vec![fresh]))
        }
        _ => Ok(ModuleResult::new(Action::Update, false, vec![live])),
    }
}

async fn remove(ctx: &ReconcileContext<'_>, params: &LanParams) -> Result<ModuleResult<Lan>> {
    let state = DesiredState::Absent;
    let dc_identity = require(params.datacenter.as_deref(), "datacenter", state)?;
    let lan_identity = params.identity();
    let identity = require(lan_identity.as_deref(), "name", state)?;

    let Some(dc) = datacenter::find(ctx, dc_identity).await? else {
        return Ok(ModuleResult::new(Action::Delete, false, Vec::new()));
    };
    let lans = ctx.api.list_lans(&dc.id).await.remote("list LANs")?;
    let Some(live) = lookup(&lans, identity, ResourceKind::Lan)?.cloned() else {
        return Ok(ModuleResult::new(Action::Delete, false, Vec::new()));
    };

    if !ctx.check_mode {
        info!(datacenter_id = %dc.id, lan_id = %live.id, "deleting LAN");
        let request_id = ctx
            .api
            .delete_lan(&dc.id, &live.id)
            .await
            .remote("delete LAN")?;
        ctx.settle(request_id.as_deref(), "delete LAN").await?;
    }
    Ok(ModuleResult::new(Action::Delete, true, vec![live]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profitbricks_types::Resource;

    fn lan(id: &str, name: &str) -> Lan {
        Resource {
            id: id.to_string(),
            resource_type: Some("lan".into()),
            href: None,
            properties: LanProperties {
                name: Some(name.to_string()),
                public: Some(false),
                ip_failover: None,
            },
            entities: None,
            metadata: None,
        }
    }

    #[test]
    fn lan_refs_resolve_to_numbers() {
        let lans = vec![lan("1", "public"), lan("2", "backend")];
        assert_eq!(lan_id(&lans, &LanRef::Name("backend".into())).unwrap(), 2);
        assert_eq!(lan_id(&lans, &LanRef::Name("1".into())).unwrap(), 1);
        assert_eq!(lan_id(&lans, &LanRef::Id(7)).unwrap(), 7);
        assert_eq!(lan_id(&lans, &LanRef::Name("9".into())).unwrap(), 9);
    }

    #[test]
    fn unknown_lan_names_are_not_found() {
        let lans = vec![lan("1", "public")];
        let err = lan_id(&lans, &LanRef::Name("storage".into())).unwrap_err();
        assert!(matches!(err, ProfitbricksError::NotFound { .. }));
    }

    #[test]
    fn non_numeric_provider_ids_are_rejected() {
        assert!(lan_number(&lan("abc", "odd")).is_err());
    }
}
