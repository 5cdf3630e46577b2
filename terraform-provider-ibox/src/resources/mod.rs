//! Reconciliation drivers for the iBox resources.
//!
//! Each driver translates a desired-state record and the previously
//! observed state into the minimal ordered set of client calls. Absence
//! discovered on read (out-of-band deletion) is reported as an empty state
//! so the caller drops the object from its store; it is never an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use ibox_client::{Client, ClientError};

use crate::schema::{Diagnostic, ResourceSchema};

mod host;
mod host_cluster;
mod lun;
mod pool;
mod volume;

pub use host::HostResource;
pub use host_cluster::HostClusterResource;
pub use lun::LunResource;
pub use pool::PoolResource;
pub use volume::VolumeResource;

/// Result type for resource operations
pub type ResourceResult<T> = Result<T, Vec<Diagnostic>>;

/// Resource state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceState {
    pub values: HashMap<String, Value>,
}

impl ResourceState {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).and_then(|v| v.as_str()).map(String::from)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(|v| v.as_bool())
    }

    /// List-typed attribute; absent or non-list values read as empty.
    pub fn get_list(&self, key: &str) -> Vec<Value> {
        self.values
            .get(key)
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default()
    }

    /// List of integer ids (cluster membership lists).
    pub fn get_i64_list(&self, key: &str) -> Vec<i64> {
        self.get_list(key)
            .iter()
            .filter_map(|v| v.as_i64())
            .collect()
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resource trait
#[async_trait]
pub trait Resource: Send + Sync {
    /// Resource type name
    fn type_name(&self) -> &str;

    /// Get the schema for this resource
    fn schema(&self) -> ResourceSchema;

    /// Validate a configuration before anything is dispatched.
    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        let _ = config;
        Vec::new()
    }

    /// Create a new resource
    async fn create(
        &self,
        client: &Client,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState>;

    /// Read an existing resource
    async fn read(
        &self,
        client: &Client,
        current: &ResourceState,
    ) -> ResourceResult<ResourceState>;

    /// Update an existing resource
    async fn update(
        &self,
        client: &Client,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState>;

    /// Delete a resource
    async fn delete(&self, client: &Client, current: &ResourceState) -> ResourceResult<()>;

    /// Plan changes
    fn plan_change(
        &self,
        current: Option<&ResourceState>,
        proposed: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let _ = current;
        Ok(proposed.clone())
    }
}

/// A compensating action recorded during a compound create.
#[derive(Debug, Clone, Copy)]
pub enum Compensation {
    DeleteHost { host_id: i64 },
    DeleteHostCluster { host_cluster_id: i64 },
}

/// Rollback bookkeeping for compound creates: steps are armed as each
/// action succeeds and run in reverse order when a later step fails.
/// Compensation failures are collected, never swallowed, so the caller can
/// surface them next to the original error.
#[derive(Debug, Default)]
pub struct Rollback {
    steps: Vec<Compensation>,
}

impl Rollback {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn arm(&mut self, step: Compensation) {
        self.steps.push(step);
    }

    /// Drop all recorded steps; called once the compound operation has
    /// fully succeeded.
    pub fn disarm(&mut self) {
        self.steps.clear();
    }

    /// Run the recorded compensations in reverse order, best effort.
    pub async fn run(&mut self, client: &Client) -> Vec<ClientError> {
        let mut failures = Vec::new();
        while let Some(step) = self.steps.pop() {
            let outcome = match step {
                Compensation::DeleteHost { host_id } => {
                    tracing::warn!(host_id, "rolling back partially created host");
                    client.delete_host(host_id).await
                }
                Compensation::DeleteHostCluster { host_cluster_id } => {
                    tracing::warn!(host_cluster_id, "rolling back partially created host cluster");
                    client.delete_host_cluster(host_cluster_id).await
                }
            };
            if let Err(err) = outcome {
                failures.push(err);
            }
        }
        failures
    }
}

/// Get all available resources
pub fn get_all_resources() -> Vec<Box<dyn Resource>> {
    vec![
        Box::new(HostResource::new()),
        Box::new(HostClusterResource::new()),
        Box::new(PoolResource::new()),
        Box::new(VolumeResource::new()),
        Box::new(LunResource::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_state() {
        let mut state = ResourceState::new();
        state.set("name", serde_json::json!("p1"));
        state.set("virtual_capacity", serde_json::json!(1_000_000_000_000i64));
        state.set("ssd_enabled", serde_json::json!(true));

        assert_eq!(state.get_string("name"), Some("p1".to_string()));
        assert_eq!(state.get_i64("virtual_capacity"), Some(1_000_000_000_000));
        assert_eq!(state.get_bool("ssd_enabled"), Some(true));
        assert!(state.get_string("missing").is_none());
    }

    #[test]
    fn test_resource_state_i64_list() {
        let mut state = ResourceState::new();
        state.set("hosts", serde_json::json!([10, 20]));
        assert_eq!(state.get_i64_list("hosts"), vec![10, 20]);
        assert!(state.get_i64_list("missing").is_empty());
    }

    #[test]
    fn test_all_resources_registered() {
        let names: Vec<String> = get_all_resources()
            .iter()
            .map(|r| r.type_name().to_string())
            .collect();
        assert!(names.contains(&"ibox_host".to_string()));
        assert!(names.contains(&"ibox_host_cluster".to_string()));
        assert!(names.contains(&"ibox_pool".to_string()));
        assert!(names.contains(&"ibox_volume".to_string()));
        assert!(names.contains(&"ibox_lun".to_string()));
    }
}
