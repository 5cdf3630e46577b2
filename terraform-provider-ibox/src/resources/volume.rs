//! Volume resource driver.
//!
//! Like pools, updates go out one field at a time. A change to the owning
//! pool is the exception: it is routed to the dedicated move operation
//! instead of the generic patch path, and existing allocated capacity
//! stays behind.

use async_trait::async_trait;

use ibox_client::types::{ProvType, Volume, VolumeMove, VolumePatch};
use ibox_client::{validate, Client};

use crate::resources::{Resource, ResourceResult, ResourceState};
use crate::schema::{Diagnostic, ResourceSchema, SchemaAttribute, SchemaBlock};

pub struct VolumeResource;

impl VolumeResource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for VolumeResource {
    fn default() -> Self {
        Self::new()
    }
}

/// Declared attributes, walked in order on update.
const VOLUME_FIELDS: &[&str] = &[
    "name",
    "pool_id",
    "size",
    "provtype",
    "ssd_enabled",
    "compression_enabled",
];

fn size_checks(config: &ResourceState) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    if let Some(size) = config.get_i64("size") {
        if let Err(err) = validate::integer_at_least("size", size, validate::VOLUME_MIN_SIZE) {
            diagnostics.push(Diagnostic::error(&err.to_string()));
        }
        if let Err(err) = validate::verify_capacity(size, validate::UNIT_SIZE) {
            diagnostics.push(Diagnostic::error(&err.to_string()));
        }
    }
    diagnostics
}

fn parse_provtype(config: &ResourceState) -> Result<Option<ProvType>, Diagnostic> {
    match config.get_string("provtype") {
        Some(value) if !value.is_empty() => value
            .parse::<ProvType>()
            .map(Some)
            .map_err(|err| Diagnostic::error(&err.to_string())),
        _ => Ok(None),
    }
}

#[async_trait]
impl Resource for VolumeResource {
    fn type_name(&self) -> &str {
        "ibox_volume"
    }

    fn schema(&self) -> ResourceSchema {
        let block = SchemaBlock::new()
            .with_attribute("name", SchemaAttribute::string().required())
            .with_attribute(
                "pool_id",
                SchemaAttribute::number()
                    .with_description("Owning pool id")
                    .required(),
            )
            .with_attribute(
                "size",
                SchemaAttribute::number()
                    .with_description("Volume size in bytes")
                    .required(),
            )
            .with_attribute(
                "provtype",
                SchemaAttribute::string()
                    .with_description("Provision type THIN/THICK")
                    .optional(),
            )
            .with_attribute(
                "ssd_enabled",
                SchemaAttribute::bool()
                    .with_description("Enable/Disable SSD read cache for volume")
                    .optional(),
            )
            .with_attribute(
                "compression_enabled",
                SchemaAttribute::bool()
                    .with_description("Enable/Disable compression for volume")
                    .optional(),
            )
            .with_attribute("id", SchemaAttribute::number().computed())
            // Snapshot/clone lineage reported by the array; never reconciled.
            .with_attribute("parent_id", SchemaAttribute::number().computed())
            .with_attribute("family_id", SchemaAttribute::number().computed())
            .with_attribute("serial", SchemaAttribute::string().computed())
            .with_description("Manages an iBox volume");

        ResourceSchema::new(1, block)
    }

    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        let mut diagnostics = size_checks(config);

        if let Some(provtype) = config.get_string("provtype") {
            if let Err(err) =
                validate::string_in_list("provtype", &provtype, &ProvType::CHOICES, false)
            {
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
            .ok_or_else(|| vec![Diagnostic::error("Volume name is required")])?;

        let diagnostics = size_checks(planned);
        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }

        let volume = Volume {
            name,
            pool_id: planned.get_i64("pool_id").unwrap_or_default(),
            size: planned.get_i64("size").unwrap_or_default(),
            provtype: parse_provtype(planned).map_err(|diag| vec![diag])?,
            ssd_enabled: planned.get_bool("ssd_enabled").unwrap_or_default(),
            compression_enabled: planned.get_bool("compression_enabled").unwrap_or_default(),
            ..Default::default()
        };

        let created = client
            .create_volume(&volume)
            .await
            .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;

        let mut seed = ResourceState::new();
        seed.set("id", serde_json::json!(created.id));
        self.read(client, &seed).await
    }

    async fn read(
        &self,
        client: &Client,
        current: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let volume_id = current
            .get_i64("id")
            .ok_or_else(|| vec![Diagnostic::error("Volume ID is required")])?;

        let volume = client
            .read_volume(volume_id)
            .await
            .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;

        let volume = match volume {
            Some(volume) => volume,
            None => {
                tracing::warn!(
                    volume_id,
                    "volume was deleted out of band, removing it from state"
                );
                return Ok(ResourceState::new());
            }
        };

        let mut state = ResourceState::new();
        state.set("id", serde_json::json!(volume.id));
        state.set("name", serde_json::json!(volume.name));
        state.set("pool_id", serde_json::json!(volume.pool_id));
        state.set("size", serde_json::json!(volume.size));
        if let Some(provtype) = volume.provtype {
            state.set("provtype", serde_json::json!(provtype.as_str()));
        }
        state.set("ssd_enabled", serde_json::json!(volume.ssd_enabled));
        state.set(
            "compression_enabled",
            serde_json::json!(volume.compression_enabled),
        );
        if volume.parent_id != 0 {
            state.set("parent_id", serde_json::json!(volume.parent_id));
        }
        if volume.family_id != 0 {
            state.set("family_id", serde_json::json!(volume.family_id));
        }
        if !volume.serial.is_empty() {
            state.set("serial", serde_json::json!(volume.serial));
        }
        Ok(state)
    }

    async fn update(
        &self,
        client: &Client,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let volume_id = current
            .get_i64("id")
            .ok_or_else(|| vec![Diagnostic::error("Volume ID is required")])?;

        for &field in VOLUME_FIELDS {
            if planned.get(field) == current.get(field) {
                continue;
            }
            tracing::debug!(field, volume_id, "volume attribute has changed");

            if field == "pool_id" {
                // An owning-pool change is not an attribute update.
                let mv = VolumeMove {
                    pool_id: planned.get_i64("pool_id").unwrap_or_default(),
                    with_capacity: false,
                };
                client
                    .move_volume(volume_id, &mv)
                    .await
                    .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;
                continue;
            }

            let patch = match field {
                "name" => VolumePatch {
                    name: planned.get_string("name"),
                    ..Default::default()
                },
                "size" => {
                    let size = planned.get_i64("size").unwrap_or_default();
                    validate::verify_capacity(size, validate::UNIT_SIZE)
                        .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;
                    VolumePatch {
                        size: Some(size),
                        ..Default::default()
                    }
                }
                "provtype" => VolumePatch {
                    provtype: parse_provtype(planned).map_err(|diag| vec![diag])?,
                    ..Default::default()
                },
                "ssd_enabled" => VolumePatch {
                    ssd_enabled: planned.get_bool("ssd_enabled"),
                    ..Default::default()
                },
                "compression_enabled" => VolumePatch {
                    compression_enabled: planned.get_bool("compression_enabled"),
                    ..Default::default()
                },
                _ => continue,
            };
            client
                .update_volume(volume_id, &patch)
                .await
                .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;
        }

        let mut seed = ResourceState::new();
        seed.set("id", serde_json::json!(volume_id));
        self.read(client, &seed).await
    }

    async fn delete(&self, client: &Client, current: &ResourceState) -> ResourceResult<()> {
        let volume_id = current
            .get_i64("id")
            .ok_or_else(|| vec![Diagnostic::error("Volume ID is required")])?;

        client
            .delete_volume(volume_id)
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

    fn client_for(server: &Server) -> Client {
        Client::new("admin", "secret", &server.addr().to_string())
    }

    #[tokio::test]
    async fn test_undersized_volume_is_rejected_before_any_http_call() {
        let server = Server::run();

        let mut planned = ResourceState::new();
        planned.set("name", serde_json::json!("v1"));
        planned.set("pool_id", serde_json::json!(3));
        planned.set("size", serde_json::json!(512));

        let client = client_for(&server);
        let diagnostics = VolumeResource::new()
            .create(&client, &planned)
            .await
            .unwrap_err();
        assert!(diagnostics[0].summary.contains("size"));
    }

    #[tokio::test]
    async fn test_pool_change_routes_to_move_operation() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/api/rest/volumes/17/move"),
                request::body(json_decoded(eq(serde_json::json!({
                    "pool_id": 4,
                    "with_capacity": false,
                })))),
            ])
            .times(1)
            .respond_with(status_code(200).body(envelope(serde_json::json!({
                "id": 17,
                "name": "v1",
                "pool_id": 4,
            })))),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/rest/volumes/17"))
                .times(1)
                .respond_with(status_code(200).body(envelope(serde_json::json!({
                    "id": 17,
                    "name": "v1",
                    "pool_id": 4,
                    "size": 1_000_000_000i64,
                })))),
        );

        let mut current = ResourceState::new();
        current.set("id", serde_json::json!(17));
        current.set("name", serde_json::json!("v1"));
        current.set("pool_id", serde_json::json!(3));
        current.set("size", serde_json::json!(1_000_000_000i64));

        let mut planned = current.clone();
        planned.set("pool_id", serde_json::json!(4));

        let client = client_for(&server);
        let state = VolumeResource::new()
            .update(&client, &current, &planned)
            .await
            .unwrap();
        assert_eq!(state.get_i64("pool_id"), Some(4));
    }

    #[tokio::test]
    async fn test_size_change_goes_through_generic_patch() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", "/api/rest/volumes/17"),
                request::body(json_decoded(eq(serde_json::json!({
                    "size": 2_000_000_000i64,
                })))),
            ])
            .times(1)
            .respond_with(status_code(200).body(envelope(serde_json::json!({
                "id": 17,
                "name": "v1",
                "size": 2_000_000_000i64,
            })))),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/rest/volumes/17"))
                .times(1)
                .respond_with(status_code(200).body(envelope(serde_json::json!({
                    "id": 17,
                    "name": "v1",
                    "pool_id": 3,
                    "size": 2_000_000_000i64,
                })))),
        );

        let mut current = ResourceState::new();
        current.set("id", serde_json::json!(17));
        current.set("name", serde_json::json!("v1"));
        current.set("pool_id", serde_json::json!(3));
        current.set("size", serde_json::json!(1_000_000_000i64));

        let mut planned = current.clone();
        planned.set("size", serde_json::json!(2_000_000_000i64));

        let client = client_for(&server);
        let state = VolumeResource::new()
            .update(&client, &current, &planned)
            .await
            .unwrap();
        assert_eq!(state.get_i64("size"), Some(2_000_000_000));
    }

    #[test]
    fn test_validate_rejects_unknown_provtype() {
        let mut config = ResourceState::new();
        config.set("name", serde_json::json!("v1"));
        config.set("size", serde_json::json!(1_000_000_000i64));
        config.set("provtype", serde_json::json!("SPARSE"));

        let diagnostics = VolumeResource::new().validate(&config);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("provtype"));
    }
}
