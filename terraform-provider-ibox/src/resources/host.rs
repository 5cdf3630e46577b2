//! Host resource driver.
//!
//! Creating a host with ports is a compound operation: the host record is
//! created first (producing the identity), then every declared port is
//! attached sequentially. If any attachment fails the whole create rolls
//! back by deleting the just-created host, which removes already-attached
//! ports transitively.

use async_trait::async_trait;
use serde_json::Value;

use ibox_client::types::{Host, HostPatch, Port, PortType, SecurityMethod};
use ibox_client::{validate, Client};

use crate::resources::{Compensation, Resource, ResourceResult, ResourceState, Rollback};
use crate::schema::{
    Diagnostic, NestedBlock, NestingMode, ResourceSchema, SchemaAttribute, SchemaBlock,
};

pub struct HostResource;

impl HostResource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HostResource {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_port(value: &Value) -> Result<Port, Diagnostic> {
    let address = value
        .get("address")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let port_type = value
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .parse::<PortType>()
        .map_err(|err| Diagnostic::error(&err.to_string()).with_attribute(vec![
            "ports".to_string(),
            "type".to_string(),
        ]))?;
    Ok(Port {
        address,
        host_id: 0,
        port_type,
    })
}

fn ports_from_state(state: &ResourceState) -> Result<Vec<Port>, Diagnostic> {
    state.get_list("ports").iter().map(parse_port).collect()
}

fn ports_to_state(ports: &[Port]) -> Value {
    let ports: Vec<Value> = ports
        .iter()
        .map(|port| {
            serde_json::json!({
                "address": port.address,
                "type": port.port_type.as_str(),
                "host_id": port.host_id,
            })
        })
        .collect();
    Value::Array(ports)
}

/// One patch for the whole security change-group. An empty incoming method
/// is normalized to `NONE`.
fn security_patch(planned: &ResourceState) -> Result<HostPatch, Diagnostic> {
    let method = match planned.get_string("security_method") {
        Some(value) if !value.is_empty() => value
            .parse::<SecurityMethod>()
            .map_err(|err| Diagnostic::error(&err.to_string()))?,
        _ => SecurityMethod::None,
    };

    let mut patch = HostPatch {
        security_method: Some(method),
        ..Default::default()
    };
    if let Some(value) = planned.get_string("security_chap_inbound_username") {
        if !value.is_empty() {
            patch.security_chap_inbound_username = Some(value);
        }
    }
    if let Some(value) = planned.get_string("security_chap_inbound_secret") {
        if !value.is_empty() {
            patch.security_chap_inbound_secret = Some(value);
        }
    }
    if let Some(value) = planned.get_string("security_chap_outbound_username") {
        if !value.is_empty() {
            patch.security_chap_outbound_username = Some(value);
        }
    }
    if let Some(value) = planned.get_string("security_chap_outbound_secret") {
        if !value.is_empty() {
            patch.security_chap_outbound_secret = Some(value);
        }
    }
    Ok(patch)
}

const SECURITY_FIELDS: &[&str] = &[
    "security_method",
    "security_chap_inbound_username",
    "security_chap_inbound_secret",
    "security_chap_outbound_username",
    "security_chap_outbound_secret",
];

#[async_trait]
impl Resource for HostResource {
    fn type_name(&self) -> &str {
        "ibox_host"
    }

    fn schema(&self) -> ResourceSchema {
        let port_block = SchemaBlock::new()
            .with_attribute(
                "address",
                SchemaAttribute::string()
                    .with_description("IQN for ISCSI or WWN address for FC")
                    .optional(),
            )
            .with_attribute(
                "type",
                SchemaAttribute::string()
                    .with_description("Port type FC or ISCSI")
                    .optional(),
            )
            .with_attribute("host_id", SchemaAttribute::number().computed());

        let block = SchemaBlock::new()
            .with_attribute("name", SchemaAttribute::string().required())
            .with_attribute(
                "security_method",
                SchemaAttribute::string()
                    .with_description("NONE, CHAP or MUTUAL_CHAP")
                    .optional(),
            )
            .with_attribute(
                "security_chap_inbound_username",
                SchemaAttribute::string().optional(),
            )
            .with_attribute(
                "security_chap_inbound_secret",
                SchemaAttribute::string().optional().sensitive(),
            )
            .with_attribute(
                "security_chap_outbound_username",
                SchemaAttribute::string().optional(),
            )
            .with_attribute(
                "security_chap_outbound_secret",
                SchemaAttribute::string().optional().sensitive(),
            )
            .with_attribute("id", SchemaAttribute::number().computed())
            .with_block(
                "ports",
                NestedBlock {
                    nesting_mode: NestingMode::List,
                    block: port_block,
                    min_items: None,
                    max_items: None,
                },
            )
            .with_description("Manages an iBox host and its FC/ISCSI ports");

        ResourceSchema::new(1, block)
    }

    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if let Some(method) = config.get_string("security_method") {
            if let Err(err) =
                validate::string_in_list("security_method", &method, &SecurityMethod::CHOICES, false)
            {
                diagnostics.push(Diagnostic::error(&err.to_string()));
            }
        }

        for field in ["security_chap_inbound_secret", "security_chap_outbound_secret"] {
            if let Some(secret) = config.get_string(field) {
                if let Err(err) = validate::string_length_in_range(field, &secret, 14, 255) {
                    diagnostics.push(Diagnostic::error(&err.to_string()));
                }
            }
        }

        for value in config.get_list("ports") {
            let port = match parse_port(&value) {
                Ok(port) => port,
                Err(diag) => {
                    diagnostics.push(diag);
                    continue;
                }
            };
            let outcome = match port.port_type {
                PortType::Iscsi => validate::validate_iqn("address", &port.address),
                PortType::Fc => validate::validate_wwn("address", &port.address),
            };
            if let Err(err) = outcome {
                diagnostics.push(Diagnostic::error(&err.to_string()));
            }
        }

        diagnostics
    }

    async fn create(
        &self,
        client: &Client,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let name = planned
            .get_string("name")
            .ok_or_else(|| vec![Diagnostic::error("Host name is required")])?;

        let mut host = Host {
            name,
            ..Default::default()
        };
        if let Some(method) = planned.get_string("security_method") {
            host.security_method = Some(
                method
                    .parse::<SecurityMethod>()
                    .map_err(|err| vec![Diagnostic::error(&err.to_string())])?,
            );
        }
        if let Some(value) = planned.get_string("security_chap_inbound_username") {
            host.security_chap_inbound_username = value;
        }
        if let Some(value) = planned.get_string("security_chap_inbound_secret") {
            host.security_chap_inbound_secret = value;
        }
        if let Some(value) = planned.get_string("security_chap_outbound_username") {
            host.security_chap_outbound_username = value;
        }
        if let Some(value) = planned.get_string("security_chap_outbound_secret") {
            host.security_chap_outbound_secret = value;
        }

        let created = client
            .create_host(&host)
            .await
            .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;

        // Every step after this point must undo the create on failure.
        let mut rollback = Rollback::new();
        rollback.arm(Compensation::DeleteHost {
            host_id: created.id,
        });

        for value in planned.get_list("ports") {
            let port = match parse_port(&value) {
                Ok(port) => port,
                Err(diag) => {
                    let mut diagnostics = vec![diag];
                    for failure in rollback.run(client).await {
                        diagnostics.push(Diagnostic::error(&format!(
                            "rollback of host id: {} failed: {}",
                            created.id, failure
                        )));
                    }
                    return Err(diagnostics);
                }
            };

            if let Err(err) = client.create_port(created.id, &port).await {
                let mut diagnostics = vec![Diagnostic::error(&format!(
                    "port: {} cannot be added to host id: {}, rolling back the host: {}",
                    port.address, created.id, err
                ))];
                for failure in rollback.run(client).await {
                    diagnostics.push(Diagnostic::error(&format!(
                        "rollback of host id: {} failed: {}",
                        created.id, failure
                    )));
                }
                return Err(diagnostics);
            }
        }
        rollback.disarm();

        let mut seed = ResourceState::new();
        seed.set("id", serde_json::json!(created.id));
        self.read(client, &seed).await
    }

    async fn read(
        &self,
        client: &Client,
        current: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let host_id = current
            .get_i64("id")
            .ok_or_else(|| vec![Diagnostic::error("Host ID is required")])?;

        let host = client
            .read_host(host_id)
            .await
            .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;

        let host = match host {
            Some(host) => host,
            None => {
                tracing::warn!(host_id, "host was deleted out of band, removing it from state");
                return Ok(ResourceState::new());
            }
        };

        let mut state = ResourceState::new();
        state.set("id", serde_json::json!(host.id));
        state.set("name", serde_json::json!(host.name));
        if let Some(method) = host.security_method {
            state.set("security_method", serde_json::json!(method.as_str()));
        }
        state.set("ports", ports_to_state(&host.ports));
        Ok(state)
    }

    async fn update(
        &self,
        client: &Client,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let host_id = current
            .get_i64("id")
            .ok_or_else(|| vec![Diagnostic::error("Host ID is required")])?;

        // The three change-groups below are independent: a failure in one
        // does not undo an earlier one.
        if planned.get_string("name") != current.get_string("name") {
            let patch = HostPatch {
                name: planned.get_string("name"),
                ..Default::default()
            };
            client
                .update_host(host_id, &patch)
                .await
                .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;
        }

        let security_changed = SECURITY_FIELDS
            .iter()
            .any(|&field| planned.get(field) != current.get(field));
        if security_changed {
            let patch = security_patch(planned).map_err(|diag| vec![diag])?;
            client
                .update_host(host_id, &patch)
                .await
                .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;
        }

        let old_ports = ports_from_state(current).map_err(|diag| vec![diag])?;
        let new_ports = ports_from_state(planned).map_err(|diag| vec![diag])?;

        // Symmetric difference: ports present in both sets are untouched; a
        // changed address or type is a delete plus a create.
        for port in old_ports.iter().filter(|p| !new_ports.contains(p)) {
            client
                .delete_port(host_id, port)
                .await
                .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;
        }
        for port in new_ports.iter().filter(|p| !old_ports.contains(p)) {
            client
                .create_port(host_id, port)
                .await
                .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;
        }

        let mut seed = ResourceState::new();
        seed.set("id", serde_json::json!(host_id));
        self.read(client, &seed).await
    }

    async fn delete(&self, client: &Client, current: &ResourceState) -> ResourceResult<()> {
        let host_id = current
            .get_i64("id")
            .ok_or_else(|| vec![Diagnostic::error("Host ID is required")])?;

        client
            .delete_host(host_id)
            .await
            .map_err(|err| vec![Diagnostic::error(&err.to_string())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::matchers::*;
    use httptest::responders::*;
    use httptest::{Expectation, Server};

    fn envelope(result: serde_json::Value) -> String {
        serde_json::json!({"metadata": {"ready": true}, "result": result}).to_string()
    }

    fn error_envelope(code: &str, message: &str) -> String {
        serde_json::json!({
            "error": {"code": code, "message": message, "severity": "ERROR", "is_remote": false},
            "result": null,
        })
        .to_string()
    }

    fn client_for(server: &Server) -> Client {
        Client::new("admin", "secret", &server.addr().to_string())
    }

    #[tokio::test]
    async fn test_create_host_with_port_then_read() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/rest/hosts/"))
                .times(1)
                .respond_with(
                    status_code(201).body(envelope(serde_json::json!({"id": 7, "name": "h1"}))),
                ),
        );
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/rest/hosts/7/ports"))
                .times(1)
                .respond_with(status_code(201).body(envelope(serde_json::json!({
                    "address": "iqn.2020-01.com.example:h1",
                    "host_id": 7,
                    "type": "ISCSI",
                })))),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/rest/hosts/7"))
                .times(1)
                .respond_with(status_code(200).body(envelope(serde_json::json!({
                    "id": 7,
                    "name": "h1",
                    "ports": [
                        {"address": "iqn.2020-01.com.example:h1", "host_id": 7, "type": "ISCSI"},
                    ],
                })))),
        );

        let mut planned = ResourceState::new();
        planned.set("name", serde_json::json!("h1"));
        planned.set(
            "ports",
            serde_json::json!([{"address": "iqn.2020-01.com.example:h1", "type": "ISCSI"}]),
        );

        let client = client_for(&server);
        let state = HostResource::new().create(&client, &planned).await.unwrap();
        assert!(state.get_i64("id").unwrap() > 0);
        let ports = state.get_list("ports");
        assert_eq!(ports.len(), 1);
        assert_eq!(
            ports[0].get("address").unwrap().as_str().unwrap(),
            "iqn.2020-01.com.example:h1"
        );
        assert_eq!(ports[0].get("type").unwrap().as_str().unwrap(), "ISCSI");
    }

    #[tokio::test]
    async fn test_failed_port_attach_rolls_back_the_host() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/rest/hosts/"))
                .times(1)
                .respond_with(
                    status_code(201).body(envelope(serde_json::json!({"id": 7, "name": "h1"}))),
                ),
        );
        // First port attaches, the second is rejected.
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/api/rest/hosts/7/ports"),
                request::body(json_decoded(eq(serde_json::json!({
                    "address": "iqn.2020-01.com.example:p1",
                    "type": "ISCSI",
                })))),
            ])
            .times(1)
            .respond_with(status_code(201).body(envelope(serde_json::json!({
                "address": "iqn.2020-01.com.example:p1",
                "host_id": 7,
                "type": "ISCSI",
            })))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/api/rest/hosts/7/ports"),
                request::body(json_decoded(eq(serde_json::json!({
                    "address": "iqn.2020-01.com.example:p2",
                    "type": "ISCSI",
                })))),
            ])
            .times(1)
            .respond_with(
                status_code(409).body(error_envelope("PORT_IN_USE", "address already claimed")),
            ),
        );
        // The compensating delete must run.
        server.expect(
            Expectation::matching(request::method_path("DELETE", "/api/rest/hosts/7"))
                .times(1)
                .respond_with(status_code(200).body(envelope(serde_json::json!({"id": 7})))),
        );

        let mut planned = ResourceState::new();
        planned.set("name", serde_json::json!("h1"));
        planned.set(
            "ports",
            serde_json::json!([
                {"address": "iqn.2020-01.com.example:p1", "type": "ISCSI"},
                {"address": "iqn.2020-01.com.example:p2", "type": "ISCSI"},
            ]),
        );

        let client = client_for(&server);
        let diagnostics = HostResource::new()
            .create(&client, &planned)
            .await
            .unwrap_err();
        assert!(diagnostics[0].summary.contains("iqn.2020-01.com.example:p2"));
    }

    #[tokio::test]
    async fn test_update_ports_applies_symmetric_difference() {
        let server = Server::run();
        // p1 leaves, p3 joins, p2 generates no calls.
        server.expect(
            Expectation::matching(request::method_path(
                "DELETE",
                "/api/rest/hosts/7/ports/ISCSI/iqn.2020-01.com.example:p1",
            ))
            .times(1)
            .respond_with(status_code(200).body(
                serde_json::json!({
                    "metadata": {"number_of_objects": 1},
                    "result": [{"address": "iqn.2020-01.com.example:p1", "host_id": 7, "type": "ISCSI"}],
                })
                .to_string(),
            )),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/api/rest/hosts/7/ports"),
                request::body(json_decoded(eq(serde_json::json!({
                    "address": "iqn.2020-01.com.example:p3",
                    "type": "ISCSI",
                })))),
            ])
            .times(1)
            .respond_with(status_code(201).body(envelope(serde_json::json!({
                "address": "iqn.2020-01.com.example:p3",
                "host_id": 7,
                "type": "ISCSI",
            })))),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/rest/hosts/7"))
                .times(1)
                .respond_with(status_code(200).body(envelope(serde_json::json!({
                    "id": 7,
                    "name": "h1",
                    "ports": [
                        {"address": "iqn.2020-01.com.example:p2", "host_id": 7, "type": "ISCSI"},
                        {"address": "iqn.2020-01.com.example:p3", "host_id": 7, "type": "ISCSI"},
                    ],
                })))),
        );

        let mut current = ResourceState::new();
        current.set("id", serde_json::json!(7));
        current.set("name", serde_json::json!("h1"));
        current.set(
            "ports",
            serde_json::json!([
                {"address": "iqn.2020-01.com.example:p1", "type": "ISCSI"},
                {"address": "iqn.2020-01.com.example:p2", "type": "ISCSI"},
            ]),
        );

        let mut planned = ResourceState::new();
        planned.set("name", serde_json::json!("h1"));
        planned.set(
            "ports",
            serde_json::json!([
                {"address": "iqn.2020-01.com.example:p2", "type": "ISCSI"},
                {"address": "iqn.2020-01.com.example:p3", "type": "ISCSI"},
            ]),
        );

        let client = client_for(&server);
        let state = HostResource::new()
            .update(&client, &current, &planned)
            .await
            .unwrap();
        assert_eq!(state.get_list("ports").len(), 2);
    }

    #[test]
    fn test_validate_rejects_short_chap_secret_and_bad_port_type() {
        let mut config = ResourceState::new();
        config.set("name", serde_json::json!("h1"));
        config.set("security_method", serde_json::json!("CHAP"));
        config.set("security_chap_inbound_secret", serde_json::json!("short"));
        config.set(
            "ports",
            serde_json::json!([{"address": "iqn.2020-01.com.example:h1", "type": "SAS"}]),
        );

        let diagnostics = HostResource::new().validate(&config);
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_security_patch_normalizes_empty_method_to_none() {
        let mut planned = ResourceState::new();
        planned.set("security_method", serde_json::json!(""));
        let patch = security_patch(&planned).unwrap();
        assert_eq!(patch.security_method, Some(SecurityMethod::None));
    }
}
