//! Typed wire records for the array's REST objects.
//!
//! Zero and empty values are omitted on the wire, matching the array's
//! sparse JSON convention; an id of 0 therefore means "not assigned".
//! Updates never send whole records: each kind has a typed sparse patch
//! whose fields are all optional, so a patch can only name attributes the
//! target record actually has.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::client::ClientError;

fn is_zero(n: &i64) -> bool {
    *n == 0
}

fn is_zero_f32(n: &f32) -> bool {
    *n == 0.0
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Host security method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityMethod {
    None,
    Chap,
    MutualChap,
}

impl SecurityMethod {
    pub const CHOICES: [&'static str; 3] = ["NONE", "CHAP", "MUTUAL_CHAP"];

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityMethod::None => "NONE",
            SecurityMethod::Chap => "CHAP",
            SecurityMethod::MutualChap => "MUTUAL_CHAP",
        }
    }
}

impl fmt::Display for SecurityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecurityMethod {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(SecurityMethod::None),
            "CHAP" => Ok(SecurityMethod::Chap),
            "MUTUAL_CHAP" => Ok(SecurityMethod::MutualChap),
            other => Err(ClientError::Validation(format!(
                "security_method value is invalid: {}, valid choices are: {}",
                other,
                Self::CHOICES.join(", ")
            ))),
        }
    }
}

/// Port transport type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortType {
    Fc,
    Iscsi,
}

impl PortType {
    pub const CHOICES: [&'static str; 2] = ["FC", "ISCSI"];

    pub fn as_str(&self) -> &'static str {
        match self {
            PortType::Fc => "FC",
            PortType::Iscsi => "ISCSI",
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortType {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FC" => Ok(PortType::Fc),
            "ISCSI" => Ok(PortType::Iscsi),
            other => Err(ClientError::Validation(format!(
                "port type value is invalid: {}, valid choices are: {}",
                other,
                Self::CHOICES.join(", ")
            ))),
        }
    }
}

/// Volume provisioning type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvType {
    Thin,
    Thick,
}

impl ProvType {
    pub const CHOICES: [&'static str; 2] = ["THIN", "THICK"];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProvType::Thin => "THIN",
            ProvType::Thick => "THICK",
        }
    }
}

impl fmt::Display for ProvType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProvType {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "THIN" => Ok(ProvType::Thin),
            "THICK" => Ok(ProvType::Thick),
            other => Err(ClientError::Validation(format!(
                "provtype value is invalid: {}, valid choices are: {}",
                other,
                Self::CHOICES.join(", ")
            ))),
        }
    }
}

/// QoS policy attached to a pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QosPolicy {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub burst_duration_seconds: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub burst_enabled: bool,
    #[serde(default, skip_serializing_if = "is_zero_f32")]
    pub burst_factor: f32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_bps: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_ops: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(
        rename = "type",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub policy_type: String,
}

/// A LUN mapping linking a volume to a host or a host cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lun {
    #[serde(default, skip_serializing_if = "is_false")]
    pub clustered: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub host_cluster_id: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub host_id: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub lun: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub volume_id: i64,
}

/// Mapping target of a LUN, derived from which identifier is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LunTarget {
    Host(i64),
    Cluster(i64),
}

impl LunTarget {
    /// Collection path for the target's mappings.
    pub(crate) fn luns_path(&self) -> String {
        match self {
            LunTarget::Host(id) => format!("/hosts/{}/luns", id),
            LunTarget::Cluster(id) => format!("/clusters/{}/luns", id),
        }
    }
}

impl Lun {
    /// Derive the mapping target from the record's identifiers. The cluster
    /// id wins when both are set; neither set is a validation failure,
    /// caught before any network I/O. Map, query, and unmap all route
    /// through this one derivation.
    pub fn target(&self) -> Result<LunTarget, ClientError> {
        if self.host_cluster_id != 0 {
            Ok(LunTarget::Cluster(self.host_cluster_id))
        } else if self.host_id != 0 {
            Ok(LunTarget::Host(self.host_id))
        } else {
            Err(ClientError::Validation(format!(
                "either host_id or host_cluster_id must be set for the lun mapping of volume_id: {}",
                self.volume_id
            )))
        }
    }
}

/// An FC or iSCSI port owned by a host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Port {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub host_id: i64,
    #[serde(rename = "type")]
    pub port_type: PortType,
}

/// A storage-consuming host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Host {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub san_client_type: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub host_cluster_id: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub security_chap_has_inbound_secret: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub security_chap_has_outbound_secret: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub security_chap_inbound_username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub security_chap_inbound_secret: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub security_chap_outbound_username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub security_chap_outbound_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_method: Option<SecurityMethod>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub luns: Vec<Lun>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<Port>,
}

/// A named group of hosts sharing LUN mappings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostCluster {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub san_client_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub luns: Vec<Lun>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<Host>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
}

/// A storage allocation domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pool {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub virtual_capacity: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub physical_capacity: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub allocated_physical_capacity: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub physical_capacity_critical: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub physical_capacity_warning: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub reserved_capacity: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ssd_enabled: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub compression_enabled: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_extend: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub volumes_count: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub snapshots_count: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub filesystems_count: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub filesystem_snapshots_count: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub entities_count: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owners: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qos_policies: Vec<QosPolicy>,
}

/// An addressable block storage object carved from a pool. The lineage
/// fields (parent_id, family_id, cg_id, serial, ...) are pass-through
/// attributes reported by the array, never reconciled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Volume {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub cg_id: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub compression_enabled: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub compression_suppressed: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_snapshot_guid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dataset_type: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub depth: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub family_id: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub has_children: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub mapped: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub num_blocks: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub parent_id: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub pool_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provtype: Option<ProvType>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub qos_policy_id: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub qos_policy_name: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub qos_shared_policy_id: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub qos_shared_policy_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rmr_snapshot_guid: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub rmr_source: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub rmr_target: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub serial: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub ssd_enabled: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub tree_allocated: i64,
    #[serde(
        rename = "type",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub volume_type: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub used: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub write_protected: bool,
}

/// Sparse update for a host. Only set fields travel on the wire.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_method: Option<SecurityMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_chap_inbound_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_chap_inbound_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_chap_outbound_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_chap_outbound_secret: Option<String>,
}

/// Sparse update for a host cluster.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostClusterPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Sparse update for a pool.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_capacity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_capacity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_extend: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_capacity_critical: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical_capacity_warning: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssd_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_enabled: Option<bool>,
}

/// Sparse update for a volume. A pool change does not belong here; it is
/// routed through [`VolumeMove`] instead.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VolumePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provtype: Option<ProvType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssd_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_enabled: Option<bool>,
}

/// Body of the dedicated volume move operation.
#[derive(Debug, Clone, Serialize)]
pub struct VolumeMove {
    pub pool_id: i64,
    pub with_capacity: bool,
}
