//! Terraform Provider Implementation
//!
//! Implements the Terraform Plugin Protocol for the iBox storage array.

use crate::resources::{get_all_resources, Resource, ResourceState};
use crate::schema::{
    Diagnostic, ProviderSchema, RpcRequest, RpcResponse, SchemaAttribute, SchemaBlock,
};
use ibox_client::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::runtime::Runtime;

/// Provider configuration. Each field falls back to its `IBOX_*`
/// environment variable when not set in configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub hostname: Option<String>,
}

impl ProviderConfig {
    fn resolve(value: &Option<String>, env_var: &str) -> Option<String> {
        value
            .clone()
            .filter(|v| !v.is_empty())
            .or_else(|| std::env::var(env_var).ok())
    }

    fn username(&self) -> Option<String> {
        Self::resolve(&self.username, "IBOX_USERNAME")
    }

    fn password(&self) -> Option<String> {
        Self::resolve(&self.password, "IBOX_PASSWORD")
    }

    fn hostname(&self) -> Option<String> {
        Self::resolve(&self.hostname, "IBOX_HOSTNAME")
    }
}

/// iBox Terraform Provider
pub struct IboxProvider {
    config: Arc<RwLock<Option<ProviderConfig>>>,
    client: Arc<RwLock<Option<Client>>>,
    resources: HashMap<String, Box<dyn Resource>>,
    runtime: Runtime,
}

impl IboxProvider {
    /// Create a new provider
    pub fn new() -> Self {
        let resources: HashMap<String, Box<dyn Resource>> = get_all_resources()
            .into_iter()
            .map(|r| (r.type_name().to_string(), r))
            .collect();

        let runtime = Runtime::new().expect("Failed to create Tokio runtime");

        Self {
            config: Arc::new(RwLock::new(None)),
            client: Arc::new(RwLock::new(None)),
            resources,
            runtime,
        }
    }

    /// Get provider schema
    fn get_schema(&self) -> ProviderSchema {
        let provider_block = SchemaBlock::new()
            .with_attribute(
                "username",
                SchemaAttribute::string()
                    .with_description("iBox username (or IBOX_USERNAME)")
                    .optional(),
            )
            .with_attribute(
                "password",
                SchemaAttribute::string()
                    .with_description("iBox password (or IBOX_PASSWORD)")
                    .optional()
                    .sensitive(),
            )
            .with_attribute(
                "hostname",
                SchemaAttribute::string()
                    .with_description("iBox hostname (or IBOX_HOSTNAME)")
                    .optional(),
            )
            .with_description("iBox storage array provider");

        let mut schema = ProviderSchema::new(provider_block);

        for (name, resource) in &self.resources {
            schema = schema.with_resource(name, resource.schema());
        }

        schema
    }

    /// Configure the provider. Credentials are static; every request
    /// carries basic authentication, so no login round-trip happens here.
    fn configure(&self, config: ProviderConfig) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        let username = match config.username() {
            Some(v) => v,
            None => {
                diagnostics.push(Diagnostic::error("username is required"));
                return diagnostics;
            }
        };
        let password = match config.password() {
            Some(v) => v,
            None => {
                diagnostics.push(Diagnostic::error("password is required"));
                return diagnostics;
            }
        };
        let hostname = match config.hostname() {
            Some(v) => v,
            None => {
                diagnostics.push(Diagnostic::error("hostname is required"));
                return diagnostics;
            }
        };

        let client = Client::new(&username, &password, &hostname);
        tracing::info!(hostname = client.hostname(), "client configured for server");

        *self.config.write().unwrap() = Some(config);
        *self.client.write().unwrap() = Some(client);

        diagnostics
    }

    /// Get the configured client
    fn get_client(&self) -> Result<Client, Diagnostic> {
        self.client
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| Diagnostic::error("Provider not configured"))
    }

    /// Handle an RPC request
    pub fn handle_request(&self, input: &str) -> String {
        let request: RpcRequest = match serde_json::from_str(input) {
            Ok(r) => r,
            Err(e) => {
                return serde_json::to_string(&RpcResponse::error(
                    0,
                    -32700,
                    &format!("Parse error: {}", e),
                ))
                .unwrap_or_default();
            }
        };

        let response = match request.method.as_str() {
            "GetProviderSchema" => self.handle_get_schema(request.id),
            "ConfigureProvider" => self.handle_configure(request.id, &request.params),
            "ValidateResourceConfig" => {
                self.handle_validate_resource(request.id, &request.params)
            }
            "PlanResourceChange" => self.handle_plan_resource(request.id, &request.params),
            "ApplyResourceChange" => self.handle_apply_resource(request.id, &request.params),
            "ReadResource" => self.handle_read_resource(request.id, &request.params),
            "ImportResourceState" => self.handle_import_resource(request.id, &request.params),
            "StopProvider" => RpcResponse::success(request.id, serde_json::json!({})),
            _ => RpcResponse::error(
                request.id,
                -32601,
                &format!("Method not found: {}", request.method),
            ),
        };

        serde_json::to_string(&response).unwrap_or_else(|e| {
            serde_json::to_string(&RpcResponse::error(
                request.id,
                -32603,
                &format!("Serialization error: {}", e),
            ))
            .unwrap_or_default()
        })
    }

    fn state_from(params: &Value, key: &str) -> Option<ResourceState> {
        params.get(key).and_then(|v| {
            v.as_object().map(|obj| {
                let values: HashMap<String, Value> =
                    obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                ResourceState { values }
            })
        })
    }

    fn unknown_resource(id: i64, type_name: &str) -> RpcResponse {
        RpcResponse::success(
            id,
            serde_json::json!({
                "diagnostics": [
                    Diagnostic::error(&format!("Unknown resource type: {}", type_name))
                ]
            }),
        )
    }

    /// Handle GetProviderSchema
    fn handle_get_schema(&self, id: i64) -> RpcResponse {
        let schema = self.get_schema();
        RpcResponse::success(id, serde_json::to_value(schema).unwrap_or_default())
    }

    /// Handle ConfigureProvider
    fn handle_configure(&self, id: i64, params: &Value) -> RpcResponse {
        let config: ProviderConfig = params
            .get("config")
            .and_then(|c| serde_json::from_value(c.clone()).ok())
            .unwrap_or_default();

        let diagnostics = self.configure(config);

        RpcResponse::success(
            id,
            serde_json::json!({
                "diagnostics": diagnostics
            }),
        )
    }

    /// Handle ValidateResourceConfig
    fn handle_validate_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let type_name = params
            .get("type_name")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let resource = match self.resources.get(type_name) {
            Some(r) => r,
            None => return Self::unknown_resource(id, type_name),
        };

        let config = Self::state_from(params, "config").unwrap_or_default();
        let diagnostics = resource.validate(&config);

        RpcResponse::success(
            id,
            serde_json::json!({
                "diagnostics": diagnostics
            }),
        )
    }

    /// Handle PlanResourceChange
    fn handle_plan_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let type_name = params
            .get("type_name")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let resource = match self.resources.get(type_name) {
            Some(r) => r,
            None => return Self::unknown_resource(id, type_name),
        };

        let proposed_state = Self::state_from(params, "proposed_new_state").unwrap_or_default();
        let prior_state = Self::state_from(params, "prior_state");

        match resource.plan_change(prior_state.as_ref(), &proposed_state) {
            Ok(planned) => RpcResponse::success(
                id,
                serde_json::json!({
                    "planned_state": planned.values,
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => RpcResponse::success(
                id,
                serde_json::json!({
                    "diagnostics": diagnostics
                }),
            ),
        }
    }

    /// Handle ApplyResourceChange
    fn handle_apply_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let type_name = params
            .get("type_name")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let resource = match self.resources.get(type_name) {
            Some(r) => r,
            None => return Self::unknown_resource(id, type_name),
        };

        let client = match self.get_client() {
            Ok(c) => c,
            Err(diag) => {
                return RpcResponse::success(
                    id,
                    serde_json::json!({
                        "diagnostics": [diag]
                    }),
                );
            }
        };

        let planned_state = Self::state_from(params, "planned_state").unwrap_or_default();
        let prior_state = Self::state_from(params, "prior_state");

        let is_destroy = params
            .get("planned_state")
            .map(|v| v.is_null())
            .unwrap_or(false);

        let result = self.runtime.block_on(async {
            if is_destroy {
                if let Some(prior) = prior_state {
                    resource.delete(&client, &prior).await.map(|_| None)
                } else {
                    Ok(None)
                }
            } else if prior_state.is_none() {
                resource.create(&client, &planned_state).await.map(Some)
            } else {
                resource
                    .update(&client, prior_state.as_ref().unwrap(), &planned_state)
                    .await
                    .map(Some)
            }
        });

        match result {
            Ok(Some(new_state)) => RpcResponse::success(
                id,
                serde_json::json!({
                    "new_state": new_state.values,
                    "diagnostics": []
                }),
            ),
            Ok(None) => RpcResponse::success(
                id,
                serde_json::json!({
                    "new_state": null,
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => RpcResponse::success(
                id,
                serde_json::json!({
                    "diagnostics": diagnostics
                }),
            ),
        }
    }

    /// Handle ReadResource
    fn handle_read_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let type_name = params
            .get("type_name")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let resource = match self.resources.get(type_name) {
            Some(r) => r,
            None => return Self::unknown_resource(id, type_name),
        };

        let client = match self.get_client() {
            Ok(c) => c,
            Err(diag) => {
                return RpcResponse::success(
                    id,
                    serde_json::json!({
                        "diagnostics": [diag]
                    }),
                );
            }
        };

        let current_state = Self::state_from(params, "current_state").unwrap_or_default();

        let result = self
            .runtime
            .block_on(async { resource.read(&client, &current_state).await });

        match result {
            Ok(state) => {
                if state.is_empty() {
                    // Resource no longer exists
                    RpcResponse::success(
                        id,
                        serde_json::json!({
                            "new_state": null,
                            "diagnostics": []
                        }),
                    )
                } else {
                    RpcResponse::success(
                        id,
                        serde_json::json!({
                            "new_state": state.values,
                            "diagnostics": []
                        }),
                    )
                }
            }
            Err(diagnostics) => RpcResponse::success(
                id,
                serde_json::json!({
                    "diagnostics": diagnostics
                }),
            ),
        }
    }

    /// Handle ImportResourceState
    fn handle_import_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let type_name = params
            .get("type_name")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        let resource_id = params.get("id").and_then(|v| v.as_str()).unwrap_or("");

        let resource = match self.resources.get(type_name) {
            Some(r) => r,
            None => return Self::unknown_resource(id, type_name),
        };

        let client = match self.get_client() {
            Ok(c) => c,
            Err(diag) => {
                return RpcResponse::success(
                    id,
                    serde_json::json!({
                        "diagnostics": [diag]
                    }),
                );
            }
        };

        // Object identities are numeric on the array.
        let numeric_id: i64 = match resource_id.parse() {
            Ok(v) => v,
            Err(_) => {
                return RpcResponse::success(
                    id,
                    serde_json::json!({
                        "diagnostics": [
                            Diagnostic::error(&format!("Invalid resource id: {}", resource_id))
                        ]
                    }),
                );
            }
        };

        let mut import_state = ResourceState::new();
        import_state.set("id", serde_json::json!(numeric_id));

        let result = self
            .runtime
            .block_on(async { resource.read(&client, &import_state).await });

        match result {
            Ok(state) => {
                if state.is_empty() {
                    RpcResponse::success(
                        id,
                        serde_json::json!({
                            "diagnostics": [
                                Diagnostic::error(&format!("Resource {} not found", resource_id))
                            ]
                        }),
                    )
                } else {
                    RpcResponse::success(
                        id,
                        serde_json::json!({
                            "imported_resources": [{
                                "type_name": type_name,
                                "state": state.values
                            }],
                            "diagnostics": []
                        }),
                    )
                }
            }
            Err(diagnostics) => RpcResponse::success(
                id,
                serde_json::json!({
                    "diagnostics": diagnostics
                }),
            ),
        }
    }
}

impl Default for IboxProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_creation() {
        let provider = IboxProvider::new();
        assert_eq!(provider.resources.len(), 5);
    }

    #[test]
    fn test_provider_schema() {
        let provider = IboxProvider::new();
        let schema = provider.get_schema();

        assert!(schema.provider.attributes.contains_key("username"));
        assert!(schema.provider.attributes.contains_key("password"));
        assert!(schema.provider.attributes.contains_key("hostname"));
        assert!(schema.provider.attributes["password"].sensitive);
        assert!(schema.resource_schemas.contains_key("ibox_volume"));
        assert!(schema.resource_schemas.contains_key("ibox_lun"));
    }

    #[test]
    fn test_handle_get_schema() {
        let provider = IboxProvider::new();
        let response = provider.handle_request(
            r#"{"jsonrpc":"2.0","id":1,"method":"GetProviderSchema","params":{}}"#,
        );

        assert!(response.contains("provider"));
        assert!(response.contains("resource_schemas"));
    }

    #[test]
    fn test_handle_unknown_method() {
        let provider = IboxProvider::new();
        let response = provider.handle_request(
            r#"{"jsonrpc":"2.0","id":1,"method":"UnknownMethod","params":{}}"#,
        );

        assert!(response.contains("error"));
        assert!(response.contains("Method not found"));
    }

    #[test]
    fn test_validate_resource_reports_diagnostics() {
        let provider = IboxProvider::new();
        let response = provider.handle_request(
            r#"{"jsonrpc":"2.0","id":1,"method":"ValidateResourceConfig","params":{
                "type_name":"ibox_lun",
                "config":{"volume_id":17}
            }}"#,
        );

        assert!(response.contains("host_id or host_cluster_id"));
    }

    #[test]
    fn test_configure_without_credentials_fails() {
        // Guard against ambient credentials leaking into the test.
        std::env::remove_var("IBOX_USERNAME");
        std::env::remove_var("IBOX_PASSWORD");
        std::env::remove_var("IBOX_HOSTNAME");

        let provider = IboxProvider::new();
        let diagnostics = provider.configure(ProviderConfig::default());
        assert!(!diagnostics.is_empty());
        assert!(diagnostics[0].summary.contains("username"));
    }
}
