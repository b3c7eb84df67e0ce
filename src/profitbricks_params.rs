//! Module parameters.
//!
//! The orchestration host hands each module one flat JSON object. Every
//! module shares the connection and wait options in `CommonParams`
//! (flattened into its own parameter struct) and adds its declarative
//! options on top.
//!
//! Scalars are parsed leniently: the host may pass `"yes"`, `"true"` or `1`
//! for a boolean and `"4"` or `4` for a number, depending on how the value
//! was templated.

use std::fmt;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::profitbricks_client::ClientConfig;
use crate::profitbricks_error::{ProfitbricksError, Result};
use crate::profitbricks_state::DesiredState;
use crate::profitbricks_types::{
    AvailabilityZone, BusType, CpuFamily, DiskType, IpFailover, LicenceType, Location,
};
use crate::profitbricks_waiter::WaitPolicy;

/// Default `wait_timeout` in seconds.
pub const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 600;

/// Options shared by every module.
#[derive(Debug, Clone, Deserialize)]
pub struct CommonParams {
    /// API username (falls back to `PROFITBRICKS_USERNAME`).
    #[serde(default, alias = "subscription_user")]
    pub username: Option<String>,
    /// API password (falls back to `PROFITBRICKS_PASSWORD`).
    #[serde(default, alias = "subscription_password")]
    pub password: Option<String>,
    /// API base URL (falls back to `PROFITBRICKS_API_URL`, then the public endpoint).
    #[serde(default)]
    pub api_url: Option<String>,
    /// Wait for provider requests to complete.
    #[serde(default = "default_true", deserialize_with = "lenient::flag")]
    pub wait: bool,
    /// Seconds to wait before giving up.
    #[serde(default = "default_wait_timeout", deserialize_with = "lenient::seconds")]
    pub wait_timeout: u64,
    /// Requested state.
    #[serde(default)]
    pub state: DesiredState,
    /// Plan only, mutate nothing.
    #[serde(
        default,
        rename = "_ansible_check_mode",
        deserialize_with = "lenient::flag"
    )]
    pub check_mode: bool,
}

impl CommonParams {
    /// Client configuration from the credential parameters and the environment.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error when credentials are missing or a numeric
    /// environment variable is malformed.
    pub fn client_config(&self) -> Result<ClientConfig> {
        ClientConfig::from_credentials(
            self.username.clone(),
            self.password.clone(),
            self.api_url.clone(),
        )
        .map_err(|e| ProfitbricksError::validation(e.to_string()))
    }

    /// Wait policy for this run.
    #[must_use]
    pub const fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy::new(self.wait, self.wait_timeout)
    }
}

/// Decode module parameters from the host's JSON.
///
/// # Errors
///
/// Returns a `Validation` error naming the offending option.
pub fn parse<T: DeserializeOwned>(args: serde_json::Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| ProfitbricksError::validation(format!("invalid module arguments: {e}")))
}

/// Unwrap an option the requested state cannot do without.
///
/// # Errors
///
/// Returns a `Validation` error naming the parameter and the state.
pub fn require<'a, T: ?Sized>(
    value: Option<&'a T>,
    param: &str,
    state: DesiredState,
) -> Result<&'a T> {
    value.ok_or_else(|| {
        ProfitbricksError::validation(format!(
            "parameter '{param}' is required for state '{state}'"
        ))
    })
}

/// LAN given by numeric id or by name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LanRef {
    /// Numeric LAN id.
    Id(u32),
    /// LAN name (or an id passed as a string).
    Name(String),
}

impl fmt::Display for LanRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

// ============================================================================
// Per-module parameters
// ============================================================================

/// Parameters of the `datacenter` module.
#[derive(Debug, Clone, Deserialize)]
pub struct DatacenterParams {
    /// Connection and wait options.
    #[serde(flatten)]
    pub common: CommonParams,
    /// Datacenter name.
    #[serde(default)]
    pub name: Option<String>,
    /// Datacenter id, for `update` and `absent`.
    #[serde(default)]
    pub id: Option<String>,
    /// Location of a new datacenter.
    #[serde(default)]
    pub location: Location,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

impl DatacenterParams {
    /// Id or name identifying the datacenter.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.id.as_deref().or(self.name.as_deref())
    }
}

/// Parameters of the `lan` module.
#[derive(Debug, Clone, Deserialize)]
pub struct LanParams {
    /// Connection and wait options.
    #[serde(flatten)]
    pub common: CommonParams,
    /// Datacenter name or id.
    #[serde(default)]
    pub datacenter: Option<String>,
    /// LAN name.
    #[serde(default)]
    pub name: Option<String>,
    /// LAN id, for `update` and `absent`.
    #[serde(default)]
    pub id: Option<LanRef>,
    /// Public LAN (defaults to true on create).
    #[serde(default, deserialize_with = "lenient::opt_flag")]
    pub public: Option<bool>,
    /// IP failover group.
    #[serde(default)]
    pub ip_failover: Option<Vec<IpFailover>>,
}

impl LanParams {
    /// Id or name identifying the LAN.
    #[must_use]
    pub fn identity(&self) -> Option<String> {
        self.id
            .as_ref()
            .map(ToString::to_string)
            .or_else(|| self.name.clone())
    }
}

/// Parameters of the `server` module.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerParams {
    /// Connection and wait options.
    #[serde(flatten)]
    pub common: CommonParams,
    /// Datacenter name or id (created when missing on `present`).
    #[serde(default)]
    pub datacenter: Option<String>,
    /// Location used when the datacenter has to be created.
    #[serde(default)]
    pub location: Location,
    /// Server name or name template.
    #[serde(default)]
    pub name: Option<String>,
    /// Boot image UUID or alias.
    #[serde(default)]
    pub image: Option<String>,
    /// Boot image password.
    #[serde(default)]
    pub image_password: Option<String>,
    /// Public SSH keys for the boot image.
    #[serde(default)]
    pub ssh_keys: Vec<String>,
    /// CPU cores (2 on create).
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub cores: Option<u32>,
    /// Memory in MB (2048 on create).
    #[serde(default, deserialize_with = "lenient::opt_u32")]
    pub ram: Option<u32>,
    /// CPU family (`AMD_OPTERON` on create).
    #[serde(default)]
    pub cpu_family: Option<CpuFamily>,
    /// Compute availability zone (`AUTO` on create).
    #[serde(default)]
    pub availability_zone: Option<AvailabilityZone>,
    /// Boot volume size in GB.
    #[serde(default = "default_volume_size", deserialize_with = "lenient::size")]
    pub volume_size: f64,
    /// Boot volume storage type.
    #[serde(default = "default_disk_type")]
    pub disk_type: DiskType,
    /// Boot volume availability zone.
    #[serde(default)]
    pub volume_availability_zone: Option<AvailabilityZone>,
    /// Boot volume bus.
    #[serde(default = "default_bus")]
    pub bus: BusType,
    /// LAN to connect the server's NIC to.
    #[serde(default)]
    pub lan: Option<LanRef>,
    /// Outbound NAT for the NIC.
    #[serde(default, deserialize_with = "lenient::flag")]
    pub nat: bool,
    /// Connect a NIC to a public LAN, creating one when none exists.
    #[serde(default, deserialize_with = "lenient::flag")]
    pub assign_public_ip: bool,
    /// Number of servers.
    #[serde(default = "default_count", deserialize_with = "lenient::count")]
    pub count: u32,
    /// Number the names of a batch.
    #[serde(default = "default_true", deserialize_with = "lenient::flag")]
    pub auto_increment: bool,
    /// Servers (names or ids) to update, delete, start or stop.
    #[serde(default)]
    pub instance_ids: Vec<String>,
    /// Delete the boot volume together with the server.
    #[serde(default = "default_true", deserialize_with = "lenient::flag")]
    pub remove_boot_volume: bool,
}

/// Parameters of the `volume` module.
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeParams {
    /// Connection and wait options.
    #[serde(flatten)]
    pub common: CommonParams,
    /// Datacenter name or id.
    #[serde(default)]
    pub datacenter: Option<String>,
    /// Server (name or id) to attach new volumes to.
    #[serde(default)]
    pub server: Option<String>,
    /// Volume name or name template.
    #[serde(default)]
    pub name: Option<String>,
    /// Size in GB (10 on create).
    #[serde(default, deserialize_with = "lenient::opt_size")]
    pub size: Option<f64>,
    /// Image UUID or alias.
    #[serde(default)]
    pub image: Option<String>,
    /// Image password.
    #[serde(default)]
    pub image_password: Option<String>,
    /// Public SSH keys for the image.
    #[serde(default)]
    pub ssh_keys: Vec<String>,
    /// Bus (`VIRTIO` on create).
    #[serde(default)]
    pub bus: Option<BusType>,
    /// Storage type.
    #[serde(default = "default_disk_type")]
    pub disk_type: DiskType,
    /// Licence type, used when no image is given.
    #[serde(default = "default_licence_type")]
    pub licence_type: LicenceType,
    /// Storage availability zone.
    #[serde(default)]
    pub availability_zone: Option<AvailabilityZone>,
    /// Number of volumes.
    #[serde(default = "default_count", deserialize_with = "lenient::count")]
    pub count: u32,
    /// Number the names of a batch.
    #[serde(default = "default_true", deserialize_with = "lenient::flag")]
    pub auto_increment: bool,
    /// Volumes (names or ids) to update or delete.
    #[serde(default)]
    pub instance_ids: Vec<String>,
}

/// Parameters of the `nic` module.
#[derive(Debug, Clone, Deserialize)]
pub struct NicParams {
    /// Connection and wait options.
    #[serde(flatten)]
    pub common: CommonParams,
    /// Datacenter name or id.
    #[serde(default)]
    pub datacenter: Option<String>,
    /// Server name or id.
    #[serde(default)]
    pub server: Option<String>,
    /// NIC name or id (a random name is generated on create when omitted).
    #[serde(default)]
    pub name: Option<String>,
    /// LAN to connect to.
    #[serde(default)]
    pub lan: Option<LanRef>,
    /// Outbound NAT.
    #[serde(default, deserialize_with = "lenient::opt_flag")]
    pub nat: Option<bool>,
    /// DHCP.
    #[serde(default, deserialize_with = "lenient::opt_flag")]
    pub dhcp: Option<bool>,
    /// Firewall.
    #[serde(default, deserialize_with = "lenient::opt_flag")]
    pub firewall_active: Option<bool>,
    /// Fixed IP addresses.
    #[serde(default)]
    pub ips: Option<Vec<String>>,
}

/// Identities a batch module operates on for `update`, `absent`, `running` and `stopped`:
/// `instance_ids` when given, else the plain `name`.
///
/// # Errors
///
/// Returns a `Validation` error when neither is set.
pub fn target_identities(
    instance_ids: &[String],
    name: Option<&str>,
    state: DesiredState,
) -> Result<Vec<String>> {
    if !instance_ids.is_empty() {
        return Ok(instance_ids.to_vec());
    }
    name.map(|n| vec![n.to_string()]).ok_or_else(|| {
        ProfitbricksError::validation(format!(
            "'instance_ids' or 'name' is required for state '{state}'"
        ))
    })
}

const fn default_true() -> bool {
    true
}

const fn default_wait_timeout() -> u64 {
    DEFAULT_WAIT_TIMEOUT_SECS
}

const fn default_count() -> u32 {
    1
}

const fn default_volume_size() -> f64 {
    10.0
}

const fn default_disk_type() -> DiskType {
    DiskType::Hdd
}

const fn default_bus() -> BusType {
    BusType::Virtio
}

const fn default_licence_type() -> LicenceType {
    LicenceType::Unknown
}

// ============================================================================
// Lenient scalars
// ============================================================================

mod lenient {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Bool(bool),
        Unsigned(u64),
        Float(f64),
        Text(String),
    }

    impl Scalar {
        fn into_bool(self) -> Result<bool, String> {
            match self {
                Self::Bool(b) => Ok(b),
                Self::Unsigned(0) => Ok(false),
                Self::Unsigned(1) => Ok(true),
                Self::Text(t) => match t.trim().to_ascii_lowercase().as_str() {
                    "yes" | "y" | "true" | "on" | "1" => Ok(true),
                    "no" | "n" | "false" | "off" | "0" => Ok(false),
                    _ => Err(format!("'{t}' is not a valid boolean")),
                },
                Self::Unsigned(n) => Err(format!("{n} is not a valid boolean")),
                Self::Float(f) => Err(format!("{f} is not a valid boolean")),
            }
        }

        fn into_u64(self) -> Result<u64, String> {
            match self {
                Self::Unsigned(n) => Ok(n),
                Self::Text(t) => t
                    .trim()
                    .parse()
                    .map_err(|_| format!("'{t}' is not a valid non-negative integer")),
                Self::Bool(b) => Err(format!("{b} is not a valid non-negative integer")),
                Self::Float(f) => Err(format!("{f} is not a valid non-negative integer")),
            }
        }

        fn into_u32(self) -> Result<u32, String> {
            let n = self.into_u64()?;
            u32::try_from(n).map_err(|_| format!("{n} is too large"))
        }

        fn into_f64(self) -> Result<f64, String> {
            match self {
                Self::Float(f) => Ok(f),
                Self::Text(t) => t
                    .trim()
                    .parse()
                    .map_err(|_| format!("'{t}' is not a valid number")),
                other => other.into_u32().map(f64::from),
            }
        }
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Scalar::deserialize(d)?.into_bool().map_err(D::Error::custom)
    }

    pub fn opt_flag<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
        Option::<Scalar>::deserialize(d)?
            .map(Scalar::into_bool)
            .transpose()
            .map_err(D::Error::custom)
    }

    pub fn seconds<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        Scalar::deserialize(d)?.into_u64().map_err(D::Error::custom)
    }

    pub fn count<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        Scalar::deserialize(d)?.into_u32().map_err(D::Error::custom)
    }

    pub fn opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        Option::<Scalar>::deserialize(d)?
            .map(Scalar::into_u32)
            .transpose()
            .map_err(D::Error::custom)
    }

    pub fn size<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Scalar::deserialize(d)?.into_f64().map_err(D::Error::custom)
    }

    pub fn opt_size<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Option::<Scalar>::deserialize(d)?
            .map(Scalar::into_f64)
            .transpose()
            .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn server_defaults() {
        let p: ServerParams = parse(json!({ "datacenter": "D", "name": "S1" })).unwrap();
        assert_eq!(p.count, 1);
        assert!(p.auto_increment);
        assert!(p.remove_boot_volume);
        assert!(p.common.wait);
        assert_eq!(p.common.wait_timeout, DEFAULT_WAIT_TIMEOUT_SECS);
        assert_eq!(p.common.state, DesiredState::Present);
        assert_eq!(p.location, Location::UsLas);
        assert_eq!(p.disk_type, DiskType::Hdd);
        assert_eq!(p.bus, BusType::Virtio);
        assert!((p.volume_size - 10.0).abs() < f64::EPSILON);
        assert!(p.cores.is_none());
    }

    #[test]
    fn host_style_scalars_are_accepted() {
        let p: ServerParams = parse(json!({
            "name": "S1",
            "count": "3",
            "cores": 4,
            "ram": "4096",
            "wait": "no",
            "assign_public_ip": "yes",
            "wait_timeout": "30",
            "_ansible_check_mode": true,
            "subscription_user": "alice",
            "lan": 2,
        }))
        .unwrap();
        assert_eq!(p.count, 3);
        assert_eq!(p.cores, Some(4));
        assert_eq!(p.ram, Some(4096));
        assert!(!p.common.wait);
        assert!(p.assign_public_ip);
        assert_eq!(p.common.wait_timeout, 30);
        assert!(p.common.check_mode);
        assert_eq!(p.common.username.as_deref(), Some("alice"));
        assert_eq!(p.lan, Some(LanRef::Id(2)));
    }

    #[test]
    fn enumerated_options_are_validated() {
        let err = parse::<ServerParams>(json!({ "cpu_family": "POWER9" })).unwrap_err();
        assert_eq!(err.kind_tag(), "validation");
        assert!(err.to_string().contains("cpu_family") || err.to_string().contains("POWER9"));

        let err = parse::<ServerParams>(json!({ "state": "exploded" })).unwrap_err();
        assert_eq!(err.kind_tag(), "validation");
    }

    #[test]
    fn bad_booleans_are_rejected() {
        assert!(parse::<NicParams>(json!({ "dhcp": "maybe" })).is_err());
        let p: NicParams = parse(json!({ "dhcp": "false", "lan": "public" })).unwrap();
        assert_eq!(p.dhcp, Some(false));
        assert_eq!(p.lan, Some(LanRef::Name("public".into())));
        assert!(p.nat.is_none());
    }

    #[test]
    fn lan_failover_accepts_snake_case_keys() {
        let p: LanParams = parse(json!({
            "datacenter": "D",
            "name": "ha",
            "ip_failover": [{ "ip": "10.0.0.5", "nic_uuid": "n-1" }],
        }))
        .unwrap();
        let failover = p.ip_failover.as_ref().unwrap();
        assert_eq!(failover[0].nic_uuid, "n-1");
        assert_eq!(p.identity().as_deref(), Some("ha"));
    }

    #[test]
    fn required_parameters_name_the_state() {
        let err = require::<str>(None, "datacenter", DesiredState::Absent).unwrap_err();
        assert_eq!(
            err.to_string(),
            "parameter 'datacenter' is required for state 'absent'"
        );
        let ids = target_identities(&[], Some("web01"), DesiredState::Stopped).unwrap();
        assert_eq!(ids, vec!["web01"]);
        assert!(target_identities(&[], None, DesiredState::Absent).is_err());
    }
}
