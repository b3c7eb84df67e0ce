//! Volume reconciler.
//!
//! - present: one volume per expanded name, optionally attached to `server`.
//! - update: `size` and `bus` are mutable; omitted options keep live values.
//! - absent: deleted when found.

use serde_json::Value;
use tracing::{debug, info};

use crate::profitbricks_datacenter as datacenter;
use crate::profitbricks_error::{RemoteContext, Result};
use crate::profitbricks_module::{ModuleKind, ReconcileContext, unsupported_state};
use crate::profitbricks_naming::expand_names;
use crate::profitbricks_params::{VolumeParams, require, target_identities};
use crate::profitbricks_resolver::{is_uuid, lookup, resolve};
use crate::profitbricks_result::{Action, ModuleResult};
use crate::profitbricks_state::{DesiredState, Observation, PlannedAction, plan};
use crate::profitbricks_types::{BusType, ResourceKind, Volume, VolumeProperties};

/// Size (GB) of a new volume when `size` is omitted.
pub const DEFAULT_SIZE_GB: f64 = 10.0;

/// Reconcile the volumes named by the parameters.
///
/// # Errors
///
/// Returns `Validation` for missing parameters, `NotFound`/`AmbiguousMatch`
/// for unresolvable identities, and waiter or API errors.
pub async fn reconcile(ctx: &ReconcileContext<'_>, params: &VolumeParams) -> Result<Value> {
    let state = params.common.state;
    match state {
        DesiredState::Present => create(ctx, params).await?.into_json(),
        DesiredState::Update => update(ctx, params).await?.into_json(),
        DesiredState::Absent => remove(ctx, params).await?.into_json(),
        DesiredState::Running | DesiredState::Stopped => {
            Err(unsupported_state(ModuleKind::Volume, state))
        }
    }
}

async fn create(ctx: &ReconcileContext<'_>, params: &VolumeParams) -> Result<ModuleResult<Volume>> {
    let state = DesiredState::Present;
    let dc = datacenter::get(ctx, require(params.datacenter.as_deref(), "datacenter", state)?)
        .await?;
    let name = require(params.name.as_deref(), "name", state)?;
    let names = expand_names(name, params.count, params.auto_increment)?;

    let server_id = match params.server.as_deref() {
        Some(server) => {
            let servers = ctx.api.list_servers(&dc.id).await.remote("list servers")?;
            Some(resolve(&servers, server, ResourceKind::Server)?.id.clone())
        }
        None => None,
    };

    let existing = ctx.api.list_volumes(&dc.id).await.remote("list volumes")?;
    let mut changed = false;
    let mut records = Vec::with_capacity(names.len());

    for n in &names {
        let found = lookup(&existing, n, ResourceKind::Volume)?;
        match plan(state, Observation::of(found.is_some(), true)) {
            PlannedAction::Create if ctx.check_mode => changed = true,
            PlannedAction::Create => {
                let props = create_properties(n, params);
                info!(datacenter_id = %dc.id, name = %n, "creating volume");
                let accepted = ctx
                    .api
                    .create_volume(&dc.id, &props)
                    .await
                    .remote("create volume")?;
                ctx.settle(accepted.request_id.as_deref(), "create volume")
                    .await?;

                if let Some(server_id) = &server_id {
                    info!(server_id = %server_id, volume_id = %accepted.value.id, "attaching volume");
                    let attached = ctx
                        .api
                        .attach_volume(&dc.id, server_id, &accepted.value.id)
                        .await
                        .remote("attach volume")?;
                    ctx.settle(attached.request_id.as_deref(), "attach volume")
                        .await?;
                }

                let fresh = ctx
                    .api
                    .get_volume(&dc.id, &accepted.value.id)
                    .await
                    .remote("fetch volume")?
                    .unwrap_or(accepted.value);
                changed = true;
                records.push(fresh);
            }
            _ => {
                if let Some(volume) = found {
                    debug!(name = %n, volume_id = %volume.id, "volume already exists");
                    records.push(volume.clone());
                }
            }
        }
    }

    Ok(ModuleResult::new(Action::Create, changed, records))
}

fn create_properties(name: &str, params: &VolumeParams) -> VolumeProperties {
    let (image, image_alias) = match params.image.as_deref() {
        Some(image) if is_uuid(image) => (Some(image.to_string()), None),
        Some(alias) => (None, Some(alias.to_string())),
        None => (None, None),
    };
    // The provider derives the licence from the image when one is given.
    let licence_type = params
        .image
        .is_none()
        .then(|| params.licence_type.as_str().to_string());

    VolumeProperties {
        name: Some(name.to_string()),
        size: Some(params.size.unwrap_or(DEFAULT_SIZE_GB)),
        bus: Some(params.bus.unwrap_or(BusType::Virtio).as_str().to_string()),
        disk_type: Some(params.disk_type.as_str().to_string()),
        image,
        image_alias,
        image_password: params.image_password.clone(),
        ssh_keys: (!params.ssh_keys.is_empty()).then(|| params.ssh_keys.clone()),
        licence_type,
        availability_zone: params.availability_zone.map(|z| z.as_str().to_string()),
    }
}

async fn update(ctx: &ReconcileContext<'_>, params: &VolumeParams) -> Result<ModuleResult<Volume>> {
    let state = DesiredState::Update;
    let dc = datacenter::get(ctx, require(params.datacenter.as_deref(), "datacenter", state)?)
        .await?;
    let identities = target_identities(&params.instance_ids, params.name.as_deref(), state)?;
    let volumes = ctx.api.list_volumes(&dc.id).await.remote("list volumes")?;

    let mut changed = false;
    let mut records = Vec::with_capacity(identities.len());
    for identity in &identities {
        let live = resolve(&volumes, identity, ResourceKind::Volume)?;
        let patch = VolumeProperties {
            size: params.size.or(live.properties.size),
            bus: params
                .bus
                .map(|b| b.as_str().to_string())
                .or_else(|| live.properties.bus.clone()),
            ..VolumeProperties::default()
        };
        let in_sync =
            same_size(patch.size, live.properties.size) && patch.bus == live.properties.bus;

        match plan(state, Observation::of(true, in_sync)) {
            PlannedAction::Update if ctx.check_mode => {
                changed = true;
                records.push(live.clone());
            }
            PlannedAction::Update => {
                info!(datacenter_id = %dc.id, volume_id = %live.id, "updating volume");
                let accepted = ctx
                    .api
                    .update_volume(&dc.id, &live.id, &patch)
                    .await
                    .remote("update volume")?;
                ctx.settle(accepted.request_id.as_deref(), "update volume")
                    .await?;
                let fresh = ctx
                    .api
                    .get_volume(&dc.id, &live.id)
                    .await
                    .remote("fetch volume")?
                    .unwrap_or(accepted.value);
                changed = true;
                records.push(fresh);
            }
            _ => records.push(live.clone()),
        }
    }

    Ok(ModuleResult::new(Action::Update, changed, records))
}

fn same_size(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        (None, None) => true,
        _ => false,
    }
}

async fn remove(ctx: &ReconcileContext<'_>, params: &VolumeParams) -> Result<ModuleResult<Volume>> {
    let state = DesiredState::Absent;
    let dc_identity = require(params.datacenter.as_deref(), "datacenter", state)?;
    let identities = target_identities(&params.instance_ids, params.name.as_deref(), state)?;

    let Some(dc) = datacenter::find(ctx, dc_identity).await? else {
        return Ok(ModuleResult::new(Action::Delete, false, Vec::new()));
    };
    let volumes = ctx.api.list_volumes(&dc.id).await.remote("list volumes")?;

    let mut records = Vec::new();
    for identity in &identities {
        let Some(volume) = lookup(&volumes, identity, ResourceKind::Volume)? else {
            debug!(identity = %identity, "volume already absent");
            continue;
        };
        if !ctx.check_mode {
            info!(datacenter_id = %dc.id, volume_id = %volume.id, "deleting volume");
            let request_id = ctx
                .api
                .delete_volume(&dc.id, &volume.id)
                .await
                .remote("delete volume")?;
            ctx.settle(request_id.as_deref(), "delete volume").await?;
        }
        records.push(volume.clone());
    }

    let changed = !records.is_empty();
    Ok(ModuleResult::new(Action::Delete, changed, records))
}
