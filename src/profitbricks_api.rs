//! The `CloudApi` seam.
//!
//! Reconcilers only talk to this trait. `ProfitbricksClient` implements it
//! over HTTP; tests implement it in memory.
//!
//! Mutating calls return the provider request id (taken from the `Location`
//! header) so the caller can wait for the change to settle. `get_*` calls
//! return `None` when the resource does not exist.

use async_trait::async_trait;

use crate::profitbricks_client::ApiError;
use crate::profitbricks_types::{
    Datacenter, DatacenterProperties, Lan, LanProperties, Nic, NicProperties, RequestStatus,
    Server, ServerCreate, ServerProperties, Volume, VolumeProperties,
};

/// Result type for Cloud API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Outcome of an accepted mutating call.
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted<T> {
    /// Resource as returned by the call.
    pub value: T,
    /// Provider request tracking the change, if any.
    pub request_id: Option<String>,
}

impl<T> Accepted<T> {
    /// Pair a value with its request id.
    #[must_use]
    pub const fn new(value: T, request_id: Option<String>) -> Self {
        Self { value, request_id }
    }
}

/// Operations of the ProfitBricks Cloud API used by the modules.
#[async_trait]
pub trait CloudApi: Send + Sync {
    // --- Datacenters ---

    /// List all datacenters.
    async fn list_datacenters(&self) -> ApiResult<Vec<Datacenter>>;
    /// Fetch one datacenter.
    async fn get_datacenter(&self, datacenter_id: &str) -> ApiResult<Option<Datacenter>>;
    /// Create a datacenter.
    async fn create_datacenter(
        &self,
        properties: &DatacenterProperties,
    ) -> ApiResult<Accepted<Datacenter>>;
    /// Patch a datacenter.
    async fn update_datacenter(
        &self,
        datacenter_id: &str,
        properties: &DatacenterProperties,
    ) -> ApiResult<Accepted<Datacenter>>;
    /// Delete a datacenter.
    async fn delete_datacenter(&self, datacenter_id: &str) -> ApiResult<Option<String>>;

    // --- LANs ---

    /// List the LANs of a datacenter.
    async fn list_lans(&self, datacenter_id: &str) -> ApiResult<Vec<Lan>>;
    /// Fetch one LAN.
    async fn get_lan(&self, datacenter_id: &str, lan_id: &str) -> ApiResult<Option<Lan>>;
    /// Create a LAN.
    async fn create_lan(
        &self,
        datacenter_id: &str,
        properties: &LanProperties,
    ) -> ApiResult<Accepted<Lan>>;
    /// Patch a LAN.
    async fn update_lan(
        &self,
        datacenter_id: &str,
        lan_id: &str,
        properties: &LanProperties,
    ) -> ApiResult<Accepted<Lan>>;
    /// Delete a LAN.
    async fn delete_lan(&self, datacenter_id: &str, lan_id: &str) -> ApiResult<Option<String>>;

    // --- Servers ---

    /// List the servers of a datacenter.
    async fn list_servers(&self, datacenter_id: &str) -> ApiResult<Vec<Server>>;
    /// Fetch one server including its entities.
    async fn get_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<Option<Server>>;
    /// Create a server with its boot volume and NICs.
    async fn create_server(
        &self,
        datacenter_id: &str,
        server: &ServerCreate,
    ) -> ApiResult<Accepted<Server>>;
    /// Patch a server.
    async fn update_server(
        &self,
        datacenter_id: &str,
        server_id: &str,
        properties: &ServerProperties,
    ) -> ApiResult<Accepted<Server>>;
    /// Delete a server.
    async fn delete_server(&self, datacenter_id: &str, server_id: &str)
    -> ApiResult<Option<String>>;
    /// Power a server on.
    async fn start_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<Option<String>>;
    /// Power a server off.
    async fn stop_server(&self, datacenter_id: &str, server_id: &str) -> ApiResult<Option<String>>;

    // --- Volumes ---

    /// List the volumes of a datacenter.
    async fn list_volumes(&self, datacenter_id: &str) -> ApiResult<Vec<Volume>>;
    /// Fetch one volume.
    async fn get_volume(&self, datacenter_id: &str, volume_id: &str) -> ApiResult<Option<Volume>>;
    /// Create a volume.
    async fn create_volume(
        &self,
        datacenter_id: &str,
        properties: &VolumeProperties,
    ) -> ApiResult<Accepted<Volume>>;
    /// Patch a volume.
    async fn update_volume(
        &self,
        datacenter_id: &str,
        volume_id: &str,
        properties: &VolumeProperties,
    ) -> ApiResult<Accepted<Volume>>;
    /// Delete a volume.
    async fn delete_volume(&self, datacenter_id: &str, volume_id: &str)
    -> ApiResult<Option<String>>;
    /// Attach a volume to a server.
    async fn attach_volume(
        &self,
        datacenter_id: &str,
        server_id: &str,
        volume_id: &str,
    ) -> ApiResult<Accepted<Volume>>;

    // --- NICs ---

    /// List the NICs of a server.
    async fn list_nics(&self, datacenter_id: &str, server_id: &str) -> ApiResult<Vec<Nic>>;
    /// Fetch one NIC.
    async fn get_nic(
        &self,
        datacenter_id: &str,
        server_id: &str,
        nic_id: &str,
    ) -> ApiResult<Option<Nic>>;
    /// Create a NIC on a server.
    async fn create_nic(
        &self,
        datacenter_id: &str,
        server_id: &str,
        properties: &NicProperties,
    ) -> ApiResult<Accepted<Nic>>;
    /// Patch a NIC.
    async fn update_nic(
        &self,
        datacenter_id: &str,
        server_id: &str,
        nic_id: &str,
        properties: &NicProperties,
    ) -> ApiResult<Accepted<Nic>>;
    /// Delete a NIC.
    async fn delete_nic(
        &self,
        datacenter_id: &str,
        server_id: &str,
        nic_id: &str,
    ) -> ApiResult<Option<String>>;

    // --- Requests ---

    /// Current status of a provider request.
    async fn request_status(&self, request_id: &str) -> ApiResult<RequestStatus>;
}
