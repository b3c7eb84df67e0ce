//! In-memory Cloud API for reconciler tests.
//!
//! `FakeCloud` keeps datacenters, LANs, servers, volumes and NICs in memory,
//! hands out deterministic ids, answers request-status polls from a scripted
//! queue (`DONE` once the queue is empty) and records every mutating call.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use profitbricks_modules::profitbricks_types::{
    Datacenter, DatacenterProperties, Lan, LanProperties, Nic, NicProperties, RequestState,
    RequestStatus, Resource, ResourceRef, Server, ServerCreate, ServerProperties, Volume,
    VolumeProperties,
};
use profitbricks_modules::{Accepted, ApiError, ApiResult, CloudApi};
use reqwest::StatusCode;
use serde_json::json;

/// Test double recording every mutation.
#[derive(Default)]
pub struct FakeCloud {
    world: Mutex<World>,
}

#[derive(Default)]
struct World {
    next_id: u64,
    next_request: u64,
    datacenters: Vec<Datacenter>,
    lans: HashMap<String, Vec<Lan>>,
    servers: HashMap<String, Vec<Server>>,
    volumes: HashMap<String, Vec<Volume>>,
    nics: HashMap<(String, String), Vec<Nic>>,
    statuses: VecDeque<RequestStatus>,
    polls: u32,
    mutations: Vec<String>,
}

impl World {
    fn uuid(&mut self) -> String {
        self.next_id += 1;
        format!("00000000-0000-4000-8000-{:012x}", self.next_id)
    }

    fn request(&mut self, call: String) -> Option<String> {
        self.mutations.push(call);
        self.next_request += 1;
        Some(format!("req-{}", self.next_request))
    }

    fn insert_nic(&mut self, dc: &str, server: &str, mut props: NicProperties) -> Nic {
        let id = self.uuid();
        if props.ips.is_none() {
            props.ips = Some(vec![format!("192.0.2.{}", self.next_id)]);
        }
        props.mac = Some(format!("02:01:00:00:00:{:02x}", self.next_id));
        let nic = resource(id, "nic", props);
        self.nics
            .entry((dc.to_string(), server.to_string()))
            .or_default()
            .push(nic.clone());
        nic
    }

    fn insert_volume(&mut self, dc: &str, props: VolumeProperties) -> Volume {
        let id = self.uuid();
        let volume = resource(id, "volume", props);
        self.volumes
            .entry(dc.to_string())
            .or_default()
            .push(volume.clone());
        volume
    }

    fn insert_lan(&mut self, dc: &str, props: LanProperties) -> Lan {
        let lans = self.lans.entry(dc.to_string()).or_default();
        let id = lans
            .iter()
            .filter_map(|l| l.id.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let lan = resource(id.to_string(), "lan", props);
        lans.push(lan.clone());
        lan
    }

    fn server_with_entities(&self, dc: &str, server: &Server) -> Server {
        let nics = self
            .nics
            .get(&(dc.to_string(), server.id.clone()))
            .cloned()
            .unwrap_or_default();
        let mut full = server.clone();
        full.entities = Some(json!({ "nics": { "items": nics } }));
        full
    }
}

fn resource<P>(id: String, kind: &str, properties: P) -> Resource<P> {
    Resource {
        href: Some(format!("https://api.example.test/{kind}s/{id}")),
        id,
        resource_type: Some(kind.to_string()),
        properties,
        entities: None,
        metadata: None,
    }
}

fn missing(what: &str) -> ApiError {
    ApiError::Api {
        status: StatusCode::NOT_FOUND,
        body: format!("{what} not found"),
    }
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap()
    }

    // --- seeding ---

    pub fn add_datacenter(&self, name: &str) -> String {
        let mut w = self.world();
        let id = w.uuid();
        let props = DatacenterProperties {
            name: Some(name.to_string()),
            location: Some("us/las".to_string()),
            description: None,
        };
        w.datacenters.push(resource(id.clone(), "datacenter", props));
        id
    }

    pub fn add_lan(&self, dc: &str, name: &str, public: bool) -> String {
        let props = LanProperties {
            name: Some(name.to_string()),
            public: Some(public),
            ip_failover: None,
        };
        self.world().insert_lan(dc, props).id
    }

    /// Server with a boot volume, powered on.
    pub fn add_server(&self, dc: &str, name: &str) -> String {
        let mut w = self.world();
        let boot = w.insert_volume(
            dc,
            VolumeProperties {
                name: Some(format!("{name}-boot")),
                size: Some(10.0),
                ..VolumeProperties::default()
            },
        );
        let id = w.uuid();
        let props = ServerProperties {
            name: Some(name.to_string()),
            cores: Some(2),
            ram: Some(2048),
            cpu_family: Some("AMD_OPTERON".to_string()),
            availability_zone: Some("AUTO".to_string()),
            vm_state: Some("RUNNING".to_string()),
            boot_volume: Some(ResourceRef { id: boot.id }),
            allow_reboot: None,
        };
        w.servers
            .entry(dc.to_string())
            .or_default()
            .push(resource(id.clone(), "server", props));
        id
    }

    pub fn add_volume(&self, dc: &str, name: &str, size: f64) -> String {
        let props = VolumeProperties {
            name: Some(name.to_string()),
            size: Some(size),
            bus: Some("VIRTIO".to_string()),
            disk_type: Some("HDD".to_string()),
            ..VolumeProperties::default()
        };
        self.world().insert_volume(dc, props).id
    }

    pub fn add_nic(&self, dc: &str, server: &str, name: &str, lan: u32) -> String {
        let props = NicProperties {
            name: Some(name.to_string()),
            lan: Some(lan),
            dhcp: Some(true),
            ..NicProperties::default()
        };
        self.world().insert_nic(dc, server, props).id
    }

    pub fn set_vm_state(&self, dc: &str, server: &str, vm_state: &str) {
        let mut w = self.world();
        if let Some(s) = w
            .servers
            .get_mut(dc)
            .and_then(|all| all.iter_mut().find(|s| s.id == server))
        {
            s.properties.vm_state = Some(vm_state.to_string());
        }
    }

    /// Answers for the next request-status polls, in order.
    pub fn script_statuses(&self, states: &[RequestState]) {
        self.world()
            .statuses
            .extend(states.iter().copied().map(RequestStatus::of));
    }

    /// Make the next poll report `FAILED` with a message.
    pub fn script_failure(&self, message: &str) {
        let mut status = RequestStatus::of(RequestState::Failed);
        status.metadata.message = Some(message.to_string());
        self.world().statuses.push_back(status);
    }

    // --- inspection ---

    pub fn datacenters(&self) -> Vec<Datacenter> {
        self.world().datacenters.clone()
    }

    pub fn datacenter_id(&self, name: &str) -> Option<String> {
        self.world()
            .datacenters
            .iter()
            .find(|d| d.properties.name.as_deref() == Some(name))
            .map(|d| d.id.clone())
    }

    pub fn servers(&self, dc: &str) -> Vec<Server> {
        self.world().servers.get(dc).cloned().unwrap_or_default()
    }

    pub fn server(&self, dc: &str, id: &str) -> Option<Server> {
        self.servers(dc).into_iter().find(|s| s.id == id)
    }

    pub fn volumes(&self, dc: &str) -> Vec<Volume> {
        self.world().volumes.get(dc).cloned().unwrap_or_default()
    }

    pub fn lans(&self, dc: &str) -> Vec<Lan> {
        self.world().lans.get(dc).cloned().unwrap_or_default()
    }

    pub fn nics(&self, dc: &str, server: &str) -> Vec<Nic> {
        self.world()
            .nics
            .get(&(dc.to_string(), server.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn polls(&self) -> u32 {
        self.world().polls
    }

    pub fn mutations(&self) -> Vec<String> {
        self.world().mutations.clone()
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn list_datacenters(&self) -> ApiResult<Vec<Datacenter>> {
        Ok(self.datacenters())
    }

    async fn get_datacenter(&self, datacenter_id: &str) -> ApiResult<Option<Datacenter>> {
        Ok(self.datacenters().into_iter().find(|d| d.id == datacenter_id))
    }

    async fn create_datacenter(
        &self,
        properties: &DatacenterProperties,
    ) -> ApiResult<Accepted<Datacenter>> {
        let mut w = self.world();
        let id = w.uuid();
        let dc = resource(id, "datacenter", properties.clone());
        w.datacenters.push(dc.clone());
        let request_id = w.request(format!(
            "create_datacenter {}",
            properties.name.as_deref().unwrap_or_default()
        ));
        Ok(Accepted::new(dc, request_id))
    }

    async fn update_datacenter(
        &self,
        datacenter_id: &str,
        properties: &DatacenterProperties,
    ) -> ApiResult<Accepted<Datacenter>> {
        let mut w = self.world();
        let dc = w
            .datacenters
            .iter_mut()
            .find(|d| d.id == datacenter_id)
            .ok_or_else(|| missing("datacenter"))?;
        if properties.description.is_some() {
            dc.properties.description.clone_from(&properties.description);
        }
        let dc = dc.clone();
        let request_id = w.request(format!("update_datacenter {datacenter_id}"));
        Ok(Accepted::new(dc, request_id))
    }

    async fn delete_datacenter(&self, datacenter_id: &str) -> ApiResult<Option<String>> {
        let mut w = self.world();
        w.datacenters.retain(|d| d.id != datacenter_id);
        Ok(w.request(format!("delete_datacenter {datacenter_id}")))
    }

    async fn list_lans(&self, datacenter_id: &str) -> ApiResult<Vec<Lan>> {
        Ok(self.lans(datacenter_id))
    }

    async fn get_lan(&self, datacenter_id: &str, lan_id: &str) -> ApiResult<Option<Lan>> {
        Ok(self.lans(datacenter_id).into_iter().find(|l| l.id == lan_id))
    }

    async fn create_lan(
        &self,
        datacenter_id: &str,
        properties: &LanProperties,
    ) -> ApiResult<Accepted<Lan>> {
        let mut w = self.world();
        let lan = w.insert_lan(datacenter_id, properties.clone());
        let request_id = w.request(format!(
            "create_lan {}",
            properties.name.as_deref().unwrap_or_default()
        ));
        Ok(Accepted::new(lan, request_id))
    }

    async fn update_lan(
        &self,
        datacenter_id: &str,
        lan_id: &str,
        properties: &LanProperties,
    ) -> ApiResult<Accepted<Lan>> {
        let mut w = self.world();
        let lan = w
            .lans
            .get_mut(datacenter_id)
            .and_then(|all| all.iter_mut().find(|l| l.id == lan_id))
            .ok_or_else(|| missing("lan"))?;
        if properties.public.is_some() {
            lan.properties.public = properties.public;
        }
        if properties.ip_failover.is_some() {
            lan.properties.ip_failover.clone_from(&properties.ip_failover);
        }
        let lan = lan.clone();
        let request_id = w.request(format!("update_lan {lan_id}"));
        Ok(Accepted::new(lan, request_id))
    }

    async fn delete_lan(&self, datacenter_id: &str, lan_id: &str) -> ApiResult<Option<String>> {
        let mut w = self.world();
        if let Some(all) = w.lans.get_mut(datacenter_id) {
            all.retain(|l| l.id != lan_id);
        }
        Ok(w.request(format!("delete_lan {lan_id}")))
    }

    async fn list_servers(&self, datacenter_id: &str) -> ApiResult<Vec<Server>> {
        Ok(self.servers(datacenter_id))
    }

    async fn get_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<Option<Server>> {
        let w = self.world();
        Ok(w.servers
            .get(datacenter_id)
            .and_then(|all| all.iter().find(|s| s.id == server_id))
            .map(|s| w.server_with_entities(datacenter_id, s)))
    }

    async fn create_server(
        &self,
        datacenter_id: &str,
        server: &ServerCreate,
    ) -> ApiResult<Accepted<Server>> {
        let mut w = self.world();
        if !w.datacenters.iter().any(|d| d.id == datacenter_id) {
            return Err(missing("datacenter"));
        }

        let mut volumes = Vec::new();
        for v in &server.entities.volumes.items {
            volumes.push(w.insert_volume(datacenter_id, v.properties.clone()));
        }

        let id = w.uuid();
        let mut props = server.properties.clone();
        props.vm_state = Some("RUNNING".to_string());
        props.boot_volume = volumes.first().map(|v| ResourceRef { id: v.id.clone() });

        for n in &server.entities.nics.items {
            w.insert_nic(datacenter_id, &id, n.properties.clone());
        }

        let created = resource(id, "server", props);
        w.servers
            .entry(datacenter_id.to_string())
            .or_default()
            .push(created.clone());
        let request_id = w.request(format!(
            "create_server {}",
            server.properties.name.as_deref().unwrap_or_default()
        ));
        Ok(Accepted::new(created, request_id))
    }

    async fn update_server(
        &self,
        datacenter_id: &str,
        server_id: &str,
        properties: &ServerProperties,
    ) -> ApiResult<Accepted<Server>> {
        let mut w = self.world();
        let server = w
            .servers
            .get_mut(datacenter_id)
            .and_then(|all| all.iter_mut().find(|s| s.id == server_id))
            .ok_or_else(|| missing("server"))?;
        let p = &mut server.properties;
        if properties.cores.is_some() {
            p.cores = properties.cores;
        }
        if properties.ram.is_some() {
            p.ram = properties.ram;
        }
        if properties.cpu_family.is_some() {
            p.cpu_family.clone_from(&properties.cpu_family);
        }
        if properties.availability_zone.is_some() {
            p.availability_zone.clone_from(&properties.availability_zone);
        }
        let server = server.clone();
        let request_id = w.request(format!("update_server {server_id}"));
        Ok(Accepted::new(server, request_id))
    }

    async fn delete_server(
        &self,
        datacenter_id: &str,
        server_id: &str,
    ) -> ApiResult<Option<String>> {
        let mut w = self.world();
        if let Some(all) = w.servers.get_mut(datacenter_id) {
            all.retain(|s| s.id != server_id);
        }
        w.nics
            .remove(&(datacenter_id.to_string(), server_id.to_string()));
        Ok(w.request(format!("delete_server {server_id}")))
    }

    async fn start_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<Option<String>> {
        self.set_vm_state(datacenter_id, server_id, "RUNNING");
        Ok(self.world().request(format!("start_server {server_id}")))
    }

    async fn stop_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<Option<String>> {
        self.set_vm_state(datacenter_id, server_id, "SHUTOFF");
        Ok(self.world().request(format!("stop_server {server_id}")))
    }

    async fn list_volumes(&self, datacenter_id: &str) -> ApiResult<Vec<Volume>> {
        Ok(self.volumes(datacenter_id))
    }

    async fn get_volume(&self, datacenter_id: &str, volume_id: &str) -> ApiResult<Option<Volume>> {
        Ok(self
            .volumes(datacenter_id)
            .into_iter()
            .find(|v| v.id == volume_id))
    }

    async fn create_volume(
        &self,
        datacenter_id: &str,
        properties: &VolumeProperties,
    ) -> ApiResult<Accepted<Volume>> {
        let mut w = self.world();
        let volume = w.insert_volume(datacenter_id, properties.clone());
        let request_id = w.request(format!(
            "create_volume {}",
            properties.name.as_deref().unwrap_or_default()
        ));
        Ok(Accepted::new(volume, request_id))
    }

    async fn update_volume(
        &self,
        datacenter_id: &str,
        volume_id: &str,
        properties: &VolumeProperties,
    ) -> ApiResult<Accepted<Volume>> {
        let mut w = self.world();
        let volume = w
            .volumes
            .get_mut(datacenter_id)
            .and_then(|all| all.iter_mut().find(|v| v.id == volume_id))
            .ok_or_else(|| missing("volume"))?;
        if properties.size.is_some() {
            volume.properties.size = properties.size;
        }
        if properties.bus.is_some() {
            volume.properties.bus.clone_from(&properties.bus);
        }
        let volume = volume.clone();
        let request_id = w.request(format!("update_volume {volume_id}"));
        Ok(Accepted::new(volume, request_id))
    }

    async fn delete_volume(
        &self,
        datacenter_id: &str,
        volume_id: &str,
    ) -> ApiResult<Option<String>> {
        let mut w = self.world();
        if let Some(all) = w.volumes.get_mut(datacenter_id) {
            all.retain(|v| v.id != volume_id);
        }
        Ok(w.request(format!("delete_volume {volume_id}")))
    }

    async fn attach_volume(
        &self,
        datacenter_id: &str,
        server_id: &str,
        volume_id: &str,
    ) -> ApiResult<Accepted<Volume>> {
        let volume = self
            .get_volume(datacenter_id, volume_id)
            .await?
            .ok_or_else(|| missing("volume"))?;
        let request_id = self
            .world()
            .request(format!("attach_volume {volume_id} {server_id}"));
        Ok(Accepted::new(volume, request_id))
    }

    async fn list_nics(&self, datacenter_id: &str, server_id: &str) -> ApiResult<Vec<Nic>> {
        Ok(self.nics(datacenter_id, server_id))
    }

    async fn get_nic(
        &self,
        datacenter_id: &str,
        server_id: &str,
        nic_id: &str,
    ) -> ApiResult<Option<Nic>> {
        Ok(self
            .nics(datacenter_id, server_id)
            .into_iter()
            .find(|n| n.id == nic_id))
    }

    async fn create_nic(
        &self,
        datacenter_id: &str,
        server_id: &str,
        properties: &NicProperties,
    ) -> ApiResult<Accepted<Nic>> {
        let mut w = self.world();
        let nic = w.insert_nic(datacenter_id, server_id, properties.clone());
        let request_id = w.request(format!(
            "create_nic {}",
            properties.name.as_deref().unwrap_or_default()
        ));
        Ok(Accepted::new(nic, request_id))
    }

    async fn update_nic(
        &self,
        datacenter_id: &str,
        server_id: &str,
        nic_id: &str,
        properties: &NicProperties,
    ) -> ApiResult<Accepted<Nic>> {
        let mut w = self.world();
        let nic = w
            .nics
            .get_mut(&(datacenter_id.to_string(), server_id.to_string()))
            .and_then(|all| all.iter_mut().find(|n| n.id == nic_id))
            .ok_or_else(|| missing("nic"))?;
        let p = &mut nic.properties;
        if properties.lan.is_some() {
            p.lan = properties.lan;
        }
        if properties.nat.is_some() {
            p.nat = properties.nat;
        }
        if properties.dhcp.is_some() {
            p.dhcp = properties.dhcp;
        }
        if properties.firewall_active.is_some() {
            p.firewall_active = properties.firewall_active;
        }
        if properties.ips.is_some() {
            p.ips.clone_from(&properties.ips);
        }
        let nic = nic.clone();
        let request_id = w.request(format!("update_nic {nic_id}"));
        Ok(Accepted::new(nic, request_id))
    }

    async fn delete_nic(
        &self,
        datacenter_id: &str,
        server_id: &str,
        nic_id: &str,
    ) -> ApiResult<Option<String>> {
        let mut w = self.world();
        if let Some(all) = w
            .nics
            .get_mut(&(datacenter_id.to_string(), server_id.to_string()))
        {
            all.retain(|n| n.id != nic_id);
        }
        Ok(w.request(format!("delete_nic {nic_id}")))
    }

    async fn request_status(&self, _request_id: &str) -> ApiResult<RequestStatus> {
        let mut w = self.world();
        w.polls += 1;
        Ok(w
            .statuses
            .pop_front()
            .unwrap_or_else(|| RequestStatus::of(RequestState::Done)))
    }
}
