//! LUN mapping resource driver.
//!
//! Every attribute forces recreation; the only reconcilable change is
//! existence. The mapping target is always derived from which identifier
//! is set, for create, read, and delete alike; the `clustered` flag is a
//! computed attribute kept in state for display only.

use async_trait::async_trait;

use ibox_client::types::Lun;
use ibox_client::Client;

use crate::resources::{Resource, ResourceResult, ResourceState};
use crate::schema::{Diagnostic, ResourceSchema, SchemaAttribute, SchemaBlock};

pub struct LunResource;

impl LunResource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LunResource {
    fn default() -> Self {
        Self::new()
    }
}

fn lun_from_state(state: &ResourceState) -> Lun {
    Lun {
        id: state.get_i64("id").unwrap_or_default(),
        lun: state.get_i64("lun").unwrap_or_default(),
        volume_id: state.get_i64("volume_id").unwrap_or_default(),
        host_id: state.get_i64("host_id").unwrap_or_default(),
        host_cluster_id: state.get_i64("host_cluster_id").unwrap_or_default(),
        clustered: state.get_bool("clustered").unwrap_or_default(),
    }
}

fn lun_to_state(lun: &Lun) -> ResourceState {
    let mut state = ResourceState::new();
    state.set("id", serde_json::json!(lun.id));
    state.set("volume_id", serde_json::json!(lun.volume_id));
    state.set("host_id", serde_json::json!(lun.host_id));
    state.set("host_cluster_id", serde_json::json!(lun.host_cluster_id));
    state.set("lun", serde_json::json!(lun.lun));
    state.set("clustered", serde_json::json!(lun.clustered));
    state
}

#[async_trait]
impl Resource for LunResource {
    fn type_name(&self) -> &str {
        "ibox_lun"
    }

    fn schema(&self) -> ResourceSchema {
        let block = SchemaBlock::new()
            .with_attribute(
                "volume_id",
                SchemaAttribute::number().required().force_new(),
            )
            .with_attribute(
                "host_id",
                SchemaAttribute::number().optional().force_new(),
            )
            .with_attribute(
                "host_cluster_id",
                SchemaAttribute::number()
                    .optional()
                    .force_new()
                    .conflicts_with(&["host_id"]),
            )
            .with_attribute(
                "lun",
                SchemaAttribute::number()
                    .with_description("Client-visible LUN number")
                    .optional()
                    .force_new(),
            )
            .with_attribute("clustered", SchemaAttribute::bool().computed())
            .with_attribute("id", SchemaAttribute::number().computed())
            .with_description("Maps an iBox volume to a host or host cluster");

        ResourceSchema::new(1, block)
    }

    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        let host_id = config.get_i64("host_id").unwrap_or_default();
        let host_cluster_id = config.get_i64("host_cluster_id").unwrap_or_default();

        if host_id != 0 && host_cluster_id != 0 {
            return vec![Diagnostic::error(
                "host_id and host_cluster_id cannot both be set for a lun mapping",
            )
            .with_attribute(vec!["host_cluster_id".to_string()])];
        }
        if host_id == 0 && host_cluster_id == 0 {
            return vec![Diagnostic::error(
                "either host_id or host_cluster_id must be set for a lun mapping",
            )];
        }
        Vec::new()
    }

    async fn create(
        &self,
        client: &Client,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let lun = Lun {
            volume_id: planned.get_i64("volume_id").unwrap_or_default(),
            lun: planned.get_i64("lun").unwrap_or_default(),
            host_id: planned.get_i64("host_id").unwrap_or_default(),
            host_cluster_id: planned.get_i64("host_cluster_id").unwrap_or_default(),
            ..Default::default()
        };

        // A record naming neither target fails inside the client before
        // any HTTP call is attempted.
        let mapped = client
            .map_lun(&lun)
            .await
            .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;

        Ok(lun_to_state(&mapped))
    }

    async fn read(
        &self,
        client: &Client,
        current: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let lun = lun_from_state(current);

        let found = client
            .query_lun(&lun)
            .await
            .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;

        match found {
            Some(found) => Ok(lun_to_state(&found)),
            None => {
                tracing::warn!(
                    lun_id = lun.id,
                    "lun mapping was deleted out of band, removing it from state"
                );
                Ok(ResourceState::new())
            }
        }
    }

    async fn update(
        &self,
        _client: &Client,
        _current: &ResourceState,
        _planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        Err(vec![Diagnostic::error(
            "Lun mappings cannot be updated in place; every attribute forces recreation",
        )])
    }

    async fn delete(&self, client: &Client, current: &ResourceState) -> ResourceResult<()> {
        let lun = lun_from_state(current);

        client
            .unmap_lun(&lun)
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

    #[test]
    fn test_validate_requires_exactly_one_target() {
        let mut config = ResourceState::new();
        config.set("volume_id", serde_json::json!(17));
        let diagnostics = LunResource::new().validate(&config);
        assert_eq!(diagnostics.len(), 1);

        config.set("host_id", serde_json::json!(7));
        assert!(LunResource::new().validate(&config).is_empty());

        config.set("host_cluster_id", serde_json::json!(4));
        let diagnostics = LunResource::new().validate(&config);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("cannot both be set"));
    }

    #[tokio::test]
    async fn test_create_with_cluster_target_routes_to_cluster_endpoint() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/rest/clusters/4/luns"))
                .times(1)
                .respond_with(status_code(201).body(envelope(serde_json::json!({
                    "id": 99,
                    "lun": 1,
                    "volume_id": 17,
                    "host_cluster_id": 4,
                    "clustered": true,
                })))),
        );

        let mut planned = ResourceState::new();
        planned.set("volume_id", serde_json::json!(17));
        planned.set("host_cluster_id", serde_json::json!(4));
        planned.set("lun", serde_json::json!(1));

        let client = client_for(&server);
        let state = LunResource::new().create(&client, &planned).await.unwrap();
        assert_eq!(state.get_bool("clustered"), Some(true));
        assert_eq!(state.get_i64("id"), Some(99));
    }

    #[tokio::test]
    async fn test_create_without_target_fails_before_any_http_call() {
        let server = Server::run();

        let mut planned = ResourceState::new();
        planned.set("volume_id", serde_json::json!(17));

        let client = client_for(&server);
        let diagnostics = LunResource::new()
            .create(&client, &planned)
            .await
            .unwrap_err();
        assert!(diagnostics[0]
            .summary
            .contains("host_id or host_cluster_id"));
    }

    #[tokio::test]
    async fn test_delete_routes_by_derived_target_not_clustered_flag() {
        let server = Server::run();
        // State carries a stale clustered=false, but the cluster id is
        // set, so the cluster-scoped endpoint is used.
        server.expect(
            Expectation::matching(request::method_path(
                "DELETE",
                "/api/rest/clusters/4/luns/volume_id/17",
            ))
            .times(1)
            .respond_with(status_code(200).body(envelope(serde_json::json!({"id": 99})))),
        );

        let mut current = ResourceState::new();
        current.set("id", serde_json::json!(99));
        current.set("volume_id", serde_json::json!(17));
        current.set("host_cluster_id", serde_json::json!(4));
        current.set("clustered", serde_json::json!(false));

        let client = client_for(&server);
        LunResource::new().delete(&client, &current).await.unwrap();
    }
}
