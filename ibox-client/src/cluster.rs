//! Host cluster operations, including membership management.

use reqwest::{Method, StatusCode};
use serde::Serialize;

use crate::client::{api_error, decode, Client, Result};
use crate::types::{HostCluster, HostClusterPatch};

#[derive(Serialize)]
struct MemberRef {
    id: i64,
}

impl Client {
    /// Create a host cluster. Members are added separately with
    /// [`Client::add_cluster_member`].
    pub async fn create_host_cluster(&self, cluster: &HostCluster) -> Result<HostCluster> {
        let body = Self::encode(cluster)?;
        let request = String::from_utf8_lossy(&body).into_owned();

        let (envelope, status) = self.api_call(Method::POST, "/clusters/", Some(body)).await?;
        if status == StatusCode::CREATED {
            let created: HostCluster = decode(envelope.result, status)?;
            tracing::info!(host_cluster_id = created.id, name = %created.name, "created host cluster");
            Ok(created)
        } else {
            Err(api_error(
                format!("failed to create host cluster record: {}", request),
                status,
                envelope,
            ))
        }
    }

    pub async fn read_host_cluster(&self, host_cluster_id: i64) -> Result<Option<HostCluster>> {
        let (envelope, status) = self
            .api_call(Method::GET, &format!("/clusters/{}", host_cluster_id), None)
            .await?;
        if status == StatusCode::OK {
            let cluster: HostCluster = decode(envelope.result, status)?;
            tracing::info!(host_cluster_id, name = %cluster.name, "fetched host cluster");
            Ok(Some(cluster))
        } else if status == StatusCode::NOT_FOUND {
            tracing::warn!(host_cluster_id, "the host cluster doesn't exist");
            Ok(None)
        } else {
            Err(api_error(
                format!("failed to read host cluster with id: {}", host_cluster_id),
                status,
                envelope,
            ))
        }
    }

    /// Apply a sparse update to a host cluster.
    pub async fn update_host_cluster(
        &self,
        host_cluster_id: i64,
        patch: &HostClusterPatch,
    ) -> Result<HostCluster> {
        let body = Self::encode(patch)?;
        let request = String::from_utf8_lossy(&body).into_owned();

        let (envelope, status) = self
            .api_call(
                Method::PUT,
                &format!("/clusters/{}", host_cluster_id),
                Some(body),
            )
            .await?;
        if status == StatusCode::OK {
            let cluster: HostCluster = decode(envelope.result, status)?;
            tracing::info!(host_cluster_id, "updated host cluster");
            Ok(cluster)
        } else {
            Err(api_error(
                format!(
                    "failed to update host cluster record with id: {} to: {}",
                    host_cluster_id, request
                ),
                status,
                envelope,
            ))
        }
    }

    /// Delete a host cluster. Idempotent.
    pub async fn delete_host_cluster(&self, host_cluster_id: i64) -> Result<()> {
        let (envelope, status) = self
            .api_call(
                Method::DELETE,
                &format!("/clusters/{}?approved=true", host_cluster_id),
                None,
            )
            .await?;
        if status == StatusCode::OK {
            tracing::info!(host_cluster_id, "deleted host cluster");
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            tracing::warn!(host_cluster_id, "the host cluster doesn't exist");
            Ok(())
        } else {
            Err(api_error(
                format!("failed to delete host cluster with id: {}", host_cluster_id),
                status,
                envelope,
            ))
        }
    }

    /// Add one host to a cluster.
    pub async fn add_cluster_member(
        &self,
        host_cluster_id: i64,
        host_id: i64,
    ) -> Result<HostCluster> {
        let body = Self::encode(&MemberRef { id: host_id })?;

        let (envelope, status) = self
            .api_call(
                Method::POST,
                &format!("/clusters/{}/hosts", host_cluster_id),
                Some(body),
            )
            .await?;
        if status == StatusCode::CREATED {
            let cluster: HostCluster = decode(envelope.result, status)?;
            tracing::info!(host_cluster_id, host_id, "added host to host cluster");
            Ok(cluster)
        } else {
            Err(api_error(
                format!(
                    "failed to add host_id: {} to host_cluster_id: {}",
                    host_id, host_cluster_id
                ),
                status,
                envelope,
            ))
        }
    }

    /// Remove one host from a cluster.
    pub async fn remove_cluster_member(
        &self,
        host_cluster_id: i64,
        host_id: i64,
    ) -> Result<HostCluster> {
        let (envelope, status) = self
            .api_call(
                Method::DELETE,
                &format!(
                    "/clusters/{}/hosts/{}?approved=true",
                    host_cluster_id, host_id
                ),
                None,
            )
            .await?;
        if status == StatusCode::OK {
            let cluster: HostCluster = decode(envelope.result, status)?;
            tracing::info!(host_cluster_id, host_id, "removed host from host cluster");
            Ok(cluster)
        } else {
            Err(api_error(
                format!(
                    "failed to remove host_id: {} from host_cluster_id: {}",
                    host_id, host_cluster_id
                ),
                status,
                envelope,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use httptest::matchers::*;
    use httptest::responders::*;
    use httptest::{Expectation, Server};

    use crate::client::Client;
    use crate::types::HostCluster;

    fn envelope(result: serde_json::Value) -> String {
        serde_json::json!({"metadata": {"ready": true}, "result": result}).to_string()
    }

    #[tokio::test]
    async fn test_create_cluster_then_read_is_stable() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/rest/clusters/"))
                .times(1)
                .respond_with(
                    status_code(201).body(envelope(serde_json::json!({"id": 5, "name": "c1"}))),
                ),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/rest/clusters/5"))
                .times(1)
                .respond_with(
                    status_code(200).body(envelope(serde_json::json!({"id": 5, "name": "c1"}))),
                ),
        );

        let client = Client::new("admin", "secret", &server.addr().to_string());
        let cluster = HostCluster {
            name: "c1".to_string(),
            ..Default::default()
        };
        let created = client.create_host_cluster(&cluster).await.unwrap();
        assert!(created.id > 0);

        let fetched = client.read_host_cluster(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.name, "c1");
    }

    #[tokio::test]
    async fn test_add_member_posts_host_reference() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/api/rest/clusters/5/hosts"),
                request::body(json_decoded(eq(serde_json::json!({"id": 10})))),
            ])
            .times(1)
            .respond_with(
                status_code(201).body(envelope(
                    serde_json::json!({"id": 5, "name": "c1", "hosts": [{"id": 10, "name": "h1"}]}),
                )),
            ),
        );

        let client = Client::new("admin", "secret", &server.addr().to_string());
        let cluster = client.add_cluster_member(5, 10).await.unwrap();
        assert_eq!(cluster.hosts.len(), 1);
        assert_eq!(cluster.hosts[0].id, 10);
    }
}
