//! ProfitBricks Cloud API resource model.
//!
//! Every resource on the wire shares the same envelope:
//!
//! ```text
//! { "id": "...", "type": "server", "href": "...", "properties": { ... }, "entities": { ... } }
//! ```
//!
//! `Resource<P>` models that envelope once; each kind only defines its
//! `properties` bag. Property fields are optional so the same struct serves
//! as a create body, a PATCH body and a response.
//!
//! Enumerated module options (`cpu_family`, `bus`, ...) are validated when
//! parameters are parsed and travel on the wire as plain strings, so a value
//! the API adds later never breaks decoding of a listed resource.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Generic Cloud API resource envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource<P> {
    /// Provider-assigned id (a UUID, or a small integer for LANs).
    pub id: String,
    /// Resource type as reported by the API.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Canonical URL of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    /// Kind-specific properties.
    pub properties: P,
    /// Nested entities, present when fetched with `depth > 0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<serde_json::Value>,
    /// Provisioning metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResourceMetadata>,
}

impl<P: Properties> Resource<P> {
    /// Display name of the resource, if it has one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.properties.name()
    }
}

/// Access to the fields shared by every properties bag.
pub trait Properties {
    /// Human-readable name.
    fn name(&self) -> Option<&str>;
}

/// Provisioning metadata attached to a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    /// Provisioning state (`AVAILABLE`, `BUSY`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Entity tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

/// Reference to another resource by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Referenced resource id.
    pub id: String,
}

// ============================================================================
// Properties per kind
// ============================================================================

/// Datacenter properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatacenterProperties {
    /// Datacenter name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Physical location, e.g. `us/las`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Server (virtual machine) properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerProperties {
    /// Server name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Number of CPU cores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,
    /// Memory in MB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram: Option<u32>,
    /// CPU family, e.g. `AMD_OPTERON`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_family: Option<String>,
    /// Compute availability zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    /// Power state reported by the hypervisor (read-only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_state: Option<String>,
    /// Boot volume reference (read-only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_volume: Option<ResourceRef>,
    /// Permit a reboot when an update requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_reboot: Option<bool>,
}

/// Volume properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeProperties {
    /// Volume name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Size in GB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    /// Bus type (`VIRTIO` or `IDE`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bus: Option<String>,
    /// Disk type (`HDD` or `SSD`).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub disk_type: Option<String>,
    /// Image UUID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Image alias such as `ubuntu:latest`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_alias: Option<String>,
    /// Password for the image's administrative user (write-only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_password: Option<String>,
    /// Public SSH keys injected into the image (write-only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_keys: Option<Vec<String>>,
    /// OS licence type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub licence_type: Option<String>,
    /// Storage availability zone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
}

/// NIC properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NicProperties {
    /// NIC name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// MAC address (read-only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Assigned IP addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ips: Option<Vec<String>>,
    /// DHCP enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp: Option<bool>,
    /// LAN id the NIC is connected to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lan: Option<u32>,
    /// Firewall enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firewall_active: Option<bool>,
    /// Outbound NAT for the private IP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nat: Option<bool>,
}

/// LAN properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanProperties {
    /// LAN name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Public LANs have outbound internet access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
    /// IP failover group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_failover: Option<Vec<IpFailover>>,
}

/// One entry of a LAN's IP failover group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpFailover {
    /// Failover IP address.
    pub ip: String,
    /// NIC that currently owns the IP.
    #[serde(alias = "nic_uuid")]
    pub nic_uuid: String,
}

macro_rules! named_properties {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Properties for $ty {
                fn name(&self) -> Option<&str> {
                    self.name.as_deref()
                }
            }
        )+
    };
}

named_properties!(
    DatacenterProperties,
    ServerProperties,
    VolumeProperties,
    NicProperties,
    LanProperties,
);

/// A datacenter resource.
pub type Datacenter = Resource<DatacenterProperties>;
/// A server resource.
pub type Server = Resource<ServerProperties>;
/// A volume resource.
pub type Volume = Resource<VolumeProperties>;
/// A NIC resource.
pub type Nic = Resource<NicProperties>;
/// A LAN resource.
pub type Lan = Resource<LanProperties>;

// ============================================================================
// Create bodies
// ============================================================================

/// Body of a resource creation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewResource<P> {
    /// Properties of the new resource.
    pub properties: P,
}

/// List of resources created together with their parent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCollection<P> {
    /// Resources to create.
    pub items: Vec<NewResource<P>>,
}

impl<P> NewCollection<P> {
    /// Wrap a list of property bags.
    #[must_use]
    pub fn of(items: Vec<P>) -> Self {
        Self {
            items: items.into_iter().map(|properties| NewResource { properties }).collect(),
        }
    }
}

/// Body of a server creation call: the server plus its boot volume and NICs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerCreate {
    /// Server properties.
    pub properties: ServerProperties,
    /// Volumes and NICs created with the server.
    pub entities: ServerCreateEntities,
}

/// Entities created together with a server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerCreateEntities {
    /// Volumes to create and attach (the first one boots).
    pub volumes: NewCollection<VolumeProperties>,
    /// NICs to create.
    pub nics: NewCollection<NicProperties>,
}

// ============================================================================
// Requests
// ============================================================================

/// Status of an asynchronous provider request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    /// Accepted, not started.
    Queued,
    /// In progress.
    Running,
    /// Completed successfully.
    Done,
    /// Completed with an error.
    Failed,
}

impl RequestState {
    /// Whether polling can stop.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Response of `GET /requests/{id}/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatus {
    /// Status details.
    pub metadata: RequestStatusMetadata,
}

impl RequestStatus {
    /// Build a status with no message.
    #[must_use]
    pub const fn of(status: RequestState) -> Self {
        Self {
            metadata: RequestStatusMetadata {
                status,
                message: None,
            },
        }
    }
}

/// Status details of a provider request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatusMetadata {
    /// Current state.
    pub status: RequestState,
    /// Provider message, usually set on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Kinds and enumerated options
// ============================================================================

/// Resource kinds handled by the modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Virtual datacenter.
    Datacenter,
    /// Virtual machine.
    Server,
    /// Block storage volume.
    Volume,
    /// Network interface.
    Nic,
    /// Virtual network segment.
    Lan,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Datacenter => "Datacenter",
            Self::Server => "Server",
            Self::Volume => "Volume",
            Self::Nic => "NIC",
            Self::Lan => "LAN",
        })
    }
}

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            /// Wire representation.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum!(
    /// CPU family of a server.
    CpuFamily {
        /// AMD Opteron.
        AmdOpteron => "AMD_OPTERON",
        /// Intel Xeon.
        IntelXeon => "INTEL_XEON",
        /// Intel Skylake.
        IntelSkylake => "INTEL_SKYLAKE",
    }
);

wire_enum!(
    /// Availability zone of a server or volume.
    AvailabilityZone {
        /// Chosen by the provider.
        Auto => "AUTO",
        /// Zone 1.
        Zone1 => "ZONE_1",
        /// Zone 2.
        Zone2 => "ZONE_2",
        /// Zone 3.
        Zone3 => "ZONE_3",
    }
);

wire_enum!(
    /// Volume bus type.
    BusType {
        /// Paravirtualized bus.
        Virtio => "VIRTIO",
        /// Emulated IDE.
        Ide => "IDE",
    }
);

wire_enum!(
    /// Volume storage type.
    DiskType {
        /// Spinning disk.
        Hdd => "HDD",
        /// Solid state.
        Ssd => "SSD",
    }
);

wire_enum!(
    /// Volume OS licence type.
    LicenceType {
        /// Linux.
        Linux => "LINUX",
        /// Windows.
        Windows => "WINDOWS",
        /// Windows Server 2016.
        Windows2016 => "WINDOWS2016",
        /// Unknown.
        Unknown => "UNKNOWN",
        /// Other.
        Other => "OTHER",
    }
);

wire_enum!(
    /// Datacenter location.
    Location {
        /// Las Vegas.
        UsLas => "us/las",
        /// Newark.
        UsEwr => "us/ewr",
        /// Frankfurt.
        DeFra => "de/fra",
        /// Karlsruhe.
        DeFkb => "de/fkb",
        /// Berlin.
        DeTxl => "de/txl",
        /// London.
        GbLhr => "gb/lhr",
    }
);

impl Default for Location {
    fn default() -> Self {
        Self::UsLas
    }
}
