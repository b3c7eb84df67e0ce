//! Server reconciler.
//!
//! - present: create the datacenter when missing, then one server per
//!   expanded name. Each new server gets a boot volume and its NICs in a
//!   single create call. Existing names are left alone.
//! - update: patch cores, ram, CPU family and availability zone; omitted
//!   options keep their live values.
//! - absent: delete the boot volume (unless `remove_boot_volume=false`),
//!   then the server.
//! - running / stopped: power servers on or off and wait for `vmState`.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::profitbricks_datacenter as datacenter;
use crate::profitbricks_error::{ProfitbricksError, RemoteContext, Result};
use crate::profitbricks_lan::{ensure_public_lan, lan_id, lan_number};
use crate::profitbricks_module::ReconcileContext;
use crate::profitbricks_naming::{expand_names, random_name};
use crate::profitbricks_params::{ServerParams, require, target_identities};
use crate::profitbricks_resolver::{is_uuid, lookup};
use crate::profitbricks_result::{Action, Identified, ModuleResult};
use crate::profitbricks_state::{DesiredState, Observation, PlannedAction, PowerState, plan};
use crate::profitbricks_types::{
    AvailabilityZone, CpuFamily, NewCollection, NicProperties, ResourceKind, Server,
    ServerCreate, ServerCreateEntities, ServerProperties, VolumeProperties,
};
use crate::profitbricks_waiter::wait_for_power_state;

/// Cores of a new server when `cores` is omitted.
pub const DEFAULT_CORES: u32 = 2;
/// Memory (MB) of a new server when `ram` is omitted.
pub const DEFAULT_RAM_MB: u32 = 2048;
/// LAN a new server joins when neither `lan` nor `assign_public_ip` is given.
pub const DEFAULT_LAN: u32 = 1;

/// A server as reported in the result envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerRecord {
    /// The server resource.
    #[serde(flatten)]
    pub server: Server,
    /// First IP of the NIC on the requested (or public) LAN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
}

impl ServerRecord {
    /// Record without an address.
    #[must_use]
    pub const fn bare(server: Server) -> Self {
        Self {
            server,
            public_ip: None,
        }
    }
}

impl Identified for ServerRecord {
    fn resource_id(&self) -> &str {
        &self.server.id
    }
}

/// Reconcile the servers named by the parameters.
///
/// # Errors
///
/// Returns `Validation` for missing parameters, `NotFound`/`AmbiguousMatch`
/// for unresolvable identities, and waiter or API errors.
pub async fn reconcile(ctx: &ReconcileContext<'_>, params: &ServerParams) -> Result<Value> {
    match params.common.state {
        DesiredState::Present => create(ctx, params).await?.into_json(),
        DesiredState::Update => update(ctx, params).await?.into_json(),
        DesiredState::Absent => remove(ctx, params).await?.into_json(),
        DesiredState::Running | DesiredState::Stopped => set_power(ctx, params).await?.into_json(),
    }
}

// ============================================================================
// present
// ============================================================================

async fn create(
    ctx: &ReconcileContext<'_>,
    params: &ServerParams,
) -> Result<ModuleResult<ServerRecord>> {
    let state = DesiredState::Present;
    let dc_identity = require(params.datacenter.as_deref(), "datacenter", state)?;
    let name = require(params.name.as_deref(), "name", state)?;
    let image = require(params.image.as_deref(), "image", state)?;
    let names = expand_names(name, params.count, params.auto_increment)?;

    let (dc, dc_created) = datacenter::ensure(ctx, dc_identity, params.location, None).await?;
    let Some(dc) = dc else {
        // Check mode with a datacenter still to be created: every server is new.
        return Ok(ModuleResult::new(Action::Create, true, Vec::new()));
    };

    let existing = ctx.api.list_servers(&dc.id).await.remote("list servers")?;
    let mut missing = Vec::new();
    for n in &names {
        if lookup(&existing, n, ResourceKind::Server)?.is_none() {
            missing.push(n.as_str());
        }
    }

    if ctx.check_mode || missing.is_empty() {
        let address_lan = existing_address_lan(ctx, &dc.id, params).await?;
        let mut records = Vec::new();
        for n in &names {
            if let Some(server) = lookup(&existing, n, ResourceKind::Server)? {
                records.push(existing_record(ctx, &dc.id, server, address_lan).await?);
            }
        }
        let changed = dc_created || !missing.is_empty();
        return Ok(ModuleResult::new(Action::Create, changed, records));
    }

    let nics = nic_plan(ctx, &dc.id, params).await?;

    let mut records = Vec::with_capacity(names.len());
    for n in &names {
        if let Some(server) = lookup(&existing, n, ResourceKind::Server)? {
            debug!(name = %n, server_id = %server.id, "server already exists");
            records.push(existing_record(ctx, &dc.id, server, nics.address_lan).await?);
            continue;
        }

        let body = server_create_body(n, image, params, &nics);
        info!(datacenter_id = %dc.id, name = %n, "creating server");
        let accepted = ctx
            .api
            .create_server(&dc.id, &body)
            .await
            .remote("create server")?;
        ctx.settle(accepted.request_id.as_deref(), "create server")
            .await?;

        let server = ctx
            .api
            .get_server(&dc.id, &accepted.value.id)
            .await
            .remote("fetch server")?
            .unwrap_or(accepted.value);
        let public_ip = nics.address_lan.and_then(|lan| first_ip_on_lan(&server, lan));
        records.push(ServerRecord { server, public_ip });
    }

    Ok(ModuleResult::new(Action::Create, true, records))
}

/// LAN whose address is reported for servers that already exist. Never creates a LAN.
async fn existing_address_lan(
    ctx: &ReconcileContext<'_>,
    datacenter_id: &str,
    params: &ServerParams,
) -> Result<Option<u32>> {
    match (&params.lan, params.assign_public_ip) {
        (None, false) => Ok(Some(DEFAULT_LAN)),
        (Some(lan), _) => {
            let lans = ctx.api.list_lans(datacenter_id).await.remote("list LANs")?;
            Ok(Some(lan_id(&lans, lan)?))
        }
        (None, true) => {
            let lans = ctx.api.list_lans(datacenter_id).await.remote("list LANs")?;
            lans.iter()
                .find(|l| l.properties.public == Some(true))
                .map(lan_number)
                .transpose()
        }
    }
}

/// Record for an existing server, re-fetched with its NICs so `public_ip`
/// matches what a fresh create reports.
async fn existing_record(
    ctx: &ReconcileContext<'_>,
    datacenter_id: &str,
    server: &Server,
    address_lan: Option<u32>,
) -> Result<ServerRecord> {
    let Some(lan) = address_lan else {
        return Ok(ServerRecord::bare(server.clone()));
    };
    let full = ctx
        .api
        .get_server(datacenter_id, &server.id)
        .await
        .remote("fetch server")?
        .unwrap_or_else(|| server.clone());
    let public_ip = first_ip_on_lan(&full, lan);
    Ok(ServerRecord {
        server: full,
        public_ip,
    })
}

/// LANs the NICs of a new server join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct NicPlan {
    /// Requested private/public LAN, with NAT as configured.
    requested: Option<u32>,
    /// Public LAN joined for `assign_public_ip`, when different from `requested`.
    public: Option<u32>,
    /// LAN whose NIC address is reported as `public_ip`.
    address_lan: Option<u32>,
}

async fn nic_plan(
    ctx: &ReconcileContext<'_>,
    datacenter_id: &str,
    params: &ServerParams,
) -> Result<NicPlan> {
    let requested = match (&params.lan, params.assign_public_ip) {
        (Some(lan), _) => {
            let lans = ctx.api.list_lans(datacenter_id).await.remote("list LANs")?;
            Some(lan_id(&lans, lan)?)
        }
        (None, false) => Some(DEFAULT_LAN),
        (None, true) => None,
    };

    let public = if params.assign_public_ip {
        let id = ensure_public_lan(ctx, datacenter_id).await?;
        (requested != Some(id)).then_some(id)
    } else {
        None
    };

    let address_lan = if params.lan.is_some() {
        requested
    } else {
        public.or(requested)
    };

    Ok(NicPlan {
        requested,
        public,
        address_lan,
    })
}

fn server_create_body(name: &str, image: &str, params: &ServerParams, nics: &NicPlan) -> ServerCreate {
    let (image_id, image_alias) = if is_uuid(image) {
        (Some(image.to_string()), None)
    } else {
        (None, Some(image.to_string()))
    };

    let boot_volume = VolumeProperties {
        name: Some(random_name()),
        size: Some(params.volume_size),
        bus: Some(params.bus.as_str().to_string()),
        disk_type: Some(params.disk_type.as_str().to_string()),
        image: image_id,
        image_alias,
        image_password: params.image_password.clone(),
        ssh_keys: (!params.ssh_keys.is_empty()).then(|| params.ssh_keys.clone()),
        licence_type: None,
        availability_zone: params
            .volume_availability_zone
            .map(|z| z.as_str().to_string()),
    };

    let mut nic_props = Vec::new();
    if let Some(lan) = nics.requested {
        nic_props.push(NicProperties {
            name: Some(random_name()),
            lan: Some(lan),
            dhcp: Some(true),
            nat: Some(params.nat),
            ..NicProperties::default()
        });
    }
    if let Some(lan) = nics.public {
        nic_props.push(NicProperties {
            name: Some(random_name()),
            lan: Some(lan),
            dhcp: Some(true),
            nat: Some(params.nat),
            ..NicProperties::default()
        });
    }

    ServerCreate {
        properties: ServerProperties {
            name: Some(name.to_string()),
            cores: Some(params.cores.unwrap_or(DEFAULT_CORES)),
            ram: Some(params.ram.unwrap_or(DEFAULT_RAM_MB)),
            cpu_family: Some(
                params
                    .cpu_family
                    .unwrap_or(CpuFamily::AmdOpteron)
                    .as_str()
                    .to_string(),
            ),
            availability_zone: Some(
                params
                    .availability_zone
                    .unwrap_or(AvailabilityZone::Auto)
                    .as_str()
                    .to_string(),
            ),
            ..ServerProperties::default()
        },
        entities: ServerCreateEntities {
            volumes: NewCollection::of(vec![boot_volume]),
            nics: NewCollection::of(nic_props),
        },
    }
}

/// First IP of the server's NIC on `lan`, read from the `entities.nics` tree.
fn first_ip_on_lan(server: &Server, lan: u32) -> Option<String> {
    server
        .entities
        .as_ref()?
        .pointer("/nics/items")?
        .as_array()?
        .iter()
        .filter_map(|nic| nic.get("properties"))
        .find(|props| props.get("lan").and_then(Value::as_u64) == Some(u64::from(lan)))?
        .get("ips")?
        .as_array()?
        .first()?
        .as_str()
        .map(str::to_string)
}

// ============================================================================
// update
// ============================================================================

async fn update(
    ctx: &ReconcileContext<'_>,
    params: &ServerParams,
) -> Result<ModuleResult<ServerRecord>> {
    let state = DesiredState::Update;
    let dc = datacenter::get(ctx, require(params.datacenter.as_deref(), "datacenter", state)?)
        .await?;
    let identities = target_identities(&params.instance_ids, params.name.as_deref(), state)?;
    let servers = ctx.api.list_servers(&dc.id).await.remote("list servers")?;

    let mut changed = false;
    let mut records = Vec::with_capacity(identities.len());
    for identity in &identities {
        let found = lookup(&servers, identity, ResourceKind::Server)?;
        let in_sync = found.is_some_and(|live| {
            settings_match(&merged_patch(&live.properties, params), &live.properties)
        });
        let action = plan(state, Observation::of(found.is_some(), in_sync));
        let live = planned_target(action, found, identity)?;

        if !action.changes() {
            records.push(ServerRecord::bare(live.clone()));
            continue;
        }
        changed = true;
        if ctx.check_mode {
            records.push(ServerRecord::bare(live.clone()));
            continue;
        }

        let patch = merged_patch(&live.properties, params);
        info!(datacenter_id = %dc.id, server_id = %live.id, "updating server");
        let accepted = ctx
            .api
            .update_server(&dc.id, &live.id, &patch)
            .await
            .remote("update server")?;
        ctx.settle(accepted.request_id.as_deref(), "update server")
            .await?;
        let fresh = ctx
            .api
            .get_server(&dc.id, &live.id)
            .await
            .remote("fetch server")?
            .unwrap_or(accepted.value);
        records.push(ServerRecord::bare(fresh));
    }

    Ok(ModuleResult::new(Action::Update, changed, records))
}

/// Server a planned update or power change applies to.
///
/// `Unresolved` plans (no server matched) fail as `NotFound`.
fn planned_target<'a>(
    action: PlannedAction,
    found: Option<&'a Server>,
    identity: &str,
) -> Result<&'a Server> {
    match (action, found) {
        (PlannedAction::Unresolved, _) | (_, None) => {
            Err(ProfitbricksError::not_found(ResourceKind::Server, identity))
        }
        (_, Some(server)) => Ok(server),
    }
}

fn settings_match(patch: &ServerProperties, live: &ServerProperties) -> bool {
    patch.cores == live.cores
        && patch.ram == live.ram
        && patch.cpu_family == live.cpu_family
        && patch.availability_zone == live.availability_zone
}

/// PATCH body: requested values over live ones. A CPU family change needs a reboot.
fn merged_patch(live: &ServerProperties, params: &ServerParams) -> ServerProperties {
    let cpu_family = params
        .cpu_family
        .map(|c| c.as_str().to_string())
        .or_else(|| live.cpu_family.clone());
    let allow_reboot = (cpu_family != live.cpu_family).then_some(true);

    ServerProperties {
        cores: params.cores.or(live.cores),
        ram: params.ram.or(live.ram),
        availability_zone: params
            .availability_zone
            .map(|z| z.as_str().to_string())
            .or_else(|| live.availability_zone.clone()),
        cpu_family,
        allow_reboot,
        ..ServerProperties::default()
    }
}

// ============================================================================
// absent
// ============================================================================

async fn remove(
    ctx: &ReconcileContext<'_>,
    params: &ServerParams,
) -> Result<ModuleResult<ServerRecord>> {
    let state = DesiredState::Absent;
    let dc_identity = require(params.datacenter.as_deref(), "datacenter", state)?;
    let identities = target_identities(&params.instance_ids, params.name.as_deref(), state)?;

    let Some(dc) = datacenter::find(ctx, dc_identity).await? else {
        return Ok(ModuleResult::new(Action::Delete, false, Vec::new()));
    };
    let servers = ctx.api.list_servers(&dc.id).await.remote("list servers")?;

    let mut records = Vec::new();
    for identity in &identities {
        let Some(server) = lookup(&servers, identity, ResourceKind::Server)? else {
            debug!(identity = %identity, "server already absent");
            continue;
        };

        if !ctx.check_mode {
            if params.remove_boot_volume {
                remove_boot_volume(ctx, &dc.id, server).await?;
            }
            info!(datacenter_id = %dc.id, server_id = %server.id, "deleting server");
            let request_id = ctx
                .api
                .delete_server(&dc.id, &server.id)
                .await
                .remote("delete server")?;
            ctx.settle(request_id.as_deref(), "delete server").await?;
        }
        records.push(ServerRecord::bare(server.clone()));
    }

    let changed = !records.is_empty();
    Ok(ModuleResult::new(Action::Delete, changed, records))
}

async fn remove_boot_volume(
    ctx: &ReconcileContext<'_>,
    datacenter_id: &str,
    server: &Server,
) -> Result<()> {
    let boot_volume = match &server.properties.boot_volume {
        Some(volume) => Some(volume.id.clone()),
        None => ctx
            .api
            .get_server(datacenter_id, &server.id)
            .await
            .remote("fetch server")?
            .and_then(|s| s.properties.boot_volume)
            .map(|v| v.id),
    };

    let Some(volume_id) = boot_volume else {
        debug!(server_id = %server.id, "server has no boot volume");
        return Ok(());
    };

    info!(datacenter_id, server_id = %server.id, volume_id = %volume_id, "deleting boot volume");
    let request_id = ctx
        .api
        .delete_volume(datacenter_id, &volume_id)
        .await
        .remote("delete boot volume")?;
    ctx.settle(request_id.as_deref(), "delete boot volume").await
}

// ============================================================================
// running / stopped
// ============================================================================

async fn set_power(
    ctx: &ReconcileContext<'_>,
    params: &ServerParams,
) -> Result<ModuleResult<ServerRecord>> {
    let state = params.common.state;
    let target = state
        .power_target()
        .ok_or_else(|| ProfitbricksError::validation(format!("state '{state}' is not a power state")))?;
    let dc = datacenter::get(ctx, require(params.datacenter.as_deref(), "datacenter", state)?)
        .await?;
    let identities = target_identities(&params.instance_ids, params.name.as_deref(), state)?;
    let servers = ctx.api.list_servers(&dc.id).await.remote("list servers")?;

    let mut switched = Vec::new();
    let mut matched = Vec::with_capacity(identities.len());
    for identity in &identities {
        let found = lookup(&servers, identity, ResourceKind::Server)?;
        let in_sync = found.is_some_and(|s| {
            target.matches(s.properties.vm_state.as_deref().unwrap_or_default())
        });
        let action = plan(state, Observation::of(found.is_some(), in_sync));
        let server = planned_target(action, found, identity)?;

        if action.changes() {
            if !ctx.check_mode {
                info!(datacenter_id = %dc.id, server_id = %server.id, %target, "switching server power");
                let request_id = if action == PlannedAction::Start {
                    ctx.api.start_server(&dc.id, &server.id).await.remote("start server")?
                } else {
                    ctx.api.stop_server(&dc.id, &server.id).await.remote("stop server")?
                };
                ctx.settle(request_id.as_deref(), power_operation(target))
                    .await?;
            }
            switched.push(server.id.clone());
        } else {
            debug!(server_id = %server.id, vm_state = ?server.properties.vm_state, "server already in power state");
        }
        matched.push(server);
    }

    if ctx.check_mode {
        let records: Vec<ServerRecord> =
            matched.into_iter().cloned().map(ServerRecord::bare).collect();
        return Ok(ModuleResult::new(state.action(), !switched.is_empty(), records));
    }

    wait_for_power_state(ctx.api, &ctx.wait, &dc.id, &switched, target).await?;

    let mut records = Vec::with_capacity(matched.len());
    for server in matched {
        let fresh = if switched.contains(&server.id) {
            ctx.api
                .get_server(&dc.id, &server.id)
                .await
                .remote("fetch server")?
                .unwrap_or_else(|| server.clone())
        } else {
            server.clone()
        };
        records.push(ServerRecord::bare(fresh));
    }

    Ok(ModuleResult::new(state.action(), !switched.is_empty(), records))
}

const fn power_operation(target: PowerState) -> &'static str {
    match target {
        PowerState::Running => "start server",
        PowerState::Stopped => "stop server",
    }
}
