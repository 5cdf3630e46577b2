//! Host cluster resource driver.
//!
//! Membership is reconciled by set difference: one remove call per
//! departing member, one add call per joining member, nothing for members
//! present on both sides.

use async_trait::async_trait;

use ibox_client::types::{HostCluster, HostClusterPatch};
use ibox_client::Client;

use crate::resources::{Compensation, Resource, ResourceResult, ResourceState, Rollback};
use crate::schema::{
    AttributeType, Diagnostic, ResourceSchema, SchemaAttribute, SchemaBlock,
};

pub struct HostClusterResource;

impl HostClusterResource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HostClusterResource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resource for HostClusterResource {
    fn type_name(&self) -> &str {
        "ibox_host_cluster"
    }

    fn schema(&self) -> ResourceSchema {
        let block = SchemaBlock::new()
            .with_attribute("name", SchemaAttribute::string().required())
            .with_attribute(
                "hosts",
                SchemaAttribute::list(AttributeType::Number)
                    .with_description("Member host ids")
                    .optional(),
            )
            .with_attribute("id", SchemaAttribute::number().computed())
            .with_description("Manages an iBox host cluster and its membership");

        ResourceSchema::new(1, block)
    }

    async fn create(
        &self,
        client: &Client,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let name = planned
            .get_string("name")
            .ok_or_else(|| vec![Diagnostic::error("Host cluster name is required")])?;

        let cluster = HostCluster {
            name,
            ..Default::default()
        };
        let created = client
            .create_host_cluster(&cluster)
            .await
            .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;

        let mut rollback = Rollback::new();
        rollback.arm(Compensation::DeleteHostCluster {
            host_cluster_id: created.id,
        });

        for host_id in planned.get_i64_list("hosts") {
            if let Err(err) = client.add_cluster_member(created.id, host_id).await {
                let mut diagnostics = vec![Diagnostic::error(&format!(
                    "host id: {} cannot be added to host cluster id: {}, rolling back the cluster: {}",
                    host_id, created.id, err
                ))];
                for failure in rollback.run(client).await {
                    diagnostics.push(Diagnostic::error(&format!(
                        "rollback of host cluster id: {} failed: {}",
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
        let host_cluster_id = current
            .get_i64("id")
            .ok_or_else(|| vec![Diagnostic::error("Host cluster ID is required")])?;

        let cluster = client
            .read_host_cluster(host_cluster_id)
            .await
            .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;

        let cluster = match cluster {
            Some(cluster) => cluster,
            None => {
                tracing::warn!(
                    host_cluster_id,
                    "host cluster was deleted out of band, removing it from state"
                );
                return Ok(ResourceState::new());
            }
        };

        let members: Vec<i64> = cluster.hosts.iter().map(|host| host.id).collect();
        let mut state = ResourceState::new();
        state.set("id", serde_json::json!(cluster.id));
        state.set("name", serde_json::json!(cluster.name));
        state.set("hosts", serde_json::json!(members));
        Ok(state)
    }

    async fn update(
        &self,
        client: &Client,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let host_cluster_id = current
            .get_i64("id")
            .ok_or_else(|| vec![Diagnostic::error("Host cluster ID is required")])?;

        let old_members = current.get_i64_list("hosts");
        let new_members = planned.get_i64_list("hosts");

        for host_id in old_members.iter().filter(|id| !new_members.contains(id)) {
            tracing::info!(host_id, host_cluster_id, "removing host from cluster");
            client
                .remove_cluster_member(host_cluster_id, *host_id)
                .await
                .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;
        }
        for host_id in new_members.iter().filter(|id| !old_members.contains(id)) {
            tracing::info!(host_id, host_cluster_id, "adding host to cluster");
            client
                .add_cluster_member(host_cluster_id, *host_id)
                .await
                .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;
        }

        if planned.get_string("name") != current.get_string("name") {
            let patch = HostClusterPatch {
                name: planned.get_string("name"),
            };
            client
                .update_host_cluster(host_cluster_id, &patch)
                .await
                .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;
        }

        let mut seed = ResourceState::new();
        seed.set("id", serde_json::json!(host_cluster_id));
        self.read(client, &seed).await
    }

    async fn delete(&self, client: &Client, current: &ResourceState) -> ResourceResult<()> {
        let host_cluster_id = current
            .get_i64("id")
            .ok_or_else(|| vec![Diagnostic::error("Host cluster ID is required")])?;

        client
            .delete_host_cluster(host_cluster_id)
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
    async fn test_membership_update_issues_minimal_calls() {
        let server = Server::run();
        // [10, 20] -> [20, 30]: exactly one remove for 10 and one add for
        // 30; nothing at all for 20.
        server.expect(
            Expectation::matching(request::method_path(
                "DELETE",
                "/api/rest/clusters/5/hosts/10",
            ))
            .times(1)
            .respond_with(
                status_code(200).body(envelope(serde_json::json!({"id": 5, "name": "c1"}))),
            ),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/api/rest/clusters/5/hosts"),
                request::body(json_decoded(eq(serde_json::json!({"id": 30})))),
            ])
            .times(1)
            .respond_with(
                status_code(201).body(envelope(serde_json::json!({"id": 5, "name": "c1"}))),
            ),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/rest/clusters/5"))
                .times(1)
                .respond_with(status_code(200).body(envelope(serde_json::json!({
                    "id": 5,
                    "name": "c1",
                    "hosts": [{"id": 20, "name": "h20"}, {"id": 30, "name": "h30"}],
                })))),
        );

        let mut current = ResourceState::new();
        current.set("id", serde_json::json!(5));
        current.set("name", serde_json::json!("c1"));
        current.set("hosts", serde_json::json!([10, 20]));

        let mut planned = ResourceState::new();
        planned.set("name", serde_json::json!("c1"));
        planned.set("hosts", serde_json::json!([20, 30]));

        let client = client_for(&server);
        let state = HostClusterResource::new()
            .update(&client, &current, &planned)
            .await
            .unwrap();
        assert_eq!(state.get_i64_list("hosts"), vec![20, 30]);
    }

    #[tokio::test]
    async fn test_failed_member_add_rolls_back_the_cluster() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/rest/clusters/"))
                .times(1)
                .respond_with(
                    status_code(201).body(envelope(serde_json::json!({"id": 5, "name": "c1"}))),
                ),
        );
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/rest/clusters/5/hosts"))
                .times(1)
                .respond_with(
                    status_code(404).body(error_envelope("HOST_NOT_FOUND", "no host with id 10")),
                ),
        );
        server.expect(
            Expectation::matching(request::method_path("DELETE", "/api/rest/clusters/5"))
                .times(1)
                .respond_with(status_code(200).body(envelope(serde_json::json!({"id": 5})))),
        );

        let mut planned = ResourceState::new();
        planned.set("name", serde_json::json!("c1"));
        planned.set("hosts", serde_json::json!([10]));

        let client = client_for(&server);
        let diagnostics = HostClusterResource::new()
            .create(&client, &planned)
            .await
            .unwrap_err();
        assert!(diagnostics[0].summary.contains("host id: 10"));
    }

    #[tokio::test]
    async fn test_read_absent_cluster_clears_state() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/rest/clusters/5"))
                .times(1)
                .respond_with(
                    status_code(404).body(error_envelope("NOT_FOUND", "no such cluster")),
                ),
        );

        let mut current = ResourceState::new();
        current.set("id", serde_json::json!(5));

        let client = client_for(&server);
        let state = HostClusterResource::new()
            .read(&client, &current)
            .await
            .unwrap();
        assert!(state.is_empty());
    }
}
