//! LUN mapping operations.
//!
//! Mappings are scoped to either a host or a host cluster. All three
//! operations derive the scope the same way, from which identifier is set
//! on the record ([`Lun::target`]); a record naming neither fails
//! validation before any HTTP call is attempted.

use reqwest::{Method, StatusCode};

use crate::client::{api_error, decode, number_of_objects, Client, Result};
use crate::types::{Lun, LunTarget};

impl Client {
    /// Map a volume to the record's target under a client-visible LUN
    /// number.
    pub async fn map_lun(&self, lun: &Lun) -> Result<Lun> {
        let target = lun.target()?;
        let body = Self::encode(lun)?;
        let request = String::from_utf8_lossy(&body).into_owned();

        let (envelope, status) = self
            .api_call(Method::POST, &target.luns_path(), Some(body))
            .await?;
        if status == StatusCode::CREATED {
            let mapped: Lun = decode(envelope.result, status)?;
            match target {
                LunTarget::Host(host_id) => {
                    tracing::info!(lun_id = mapped.id, host_id, "mapped lun to host")
                }
                LunTarget::Cluster(host_cluster_id) => {
                    tracing::info!(lun_id = mapped.id, host_cluster_id, "mapped lun to host cluster")
                }
            }
            Ok(mapped)
        } else {
            Err(api_error(
                format!("failed to create lun record: {}", request),
                status,
                envelope,
            ))
        }
    }

    /// Find the record's mapping in the target's collection. The list is
    /// scanned linearly for a matching LUN id; it is typically small. A
    /// missing mapping, or a missing target, is the absent outcome.
    pub async fn query_lun(&self, lun: &Lun) -> Result<Option<Lun>> {
        let target = lun.target()?;

        let (envelope, status) = self.api_call(Method::GET, &target.luns_path(), None).await?;
        if status == StatusCode::OK {
            let luns: Vec<Lun> = decode(envelope.result.clone(), status)?;
            if number_of_objects(&envelope, luns.len()) > 0 {
                if let Some(found) = luns.into_iter().find(|mapped| mapped.id == lun.id) {
                    tracing::info!(lun_id = found.id, "found lun mapping");
                    return Ok(Some(found));
                }
            }
            tracing::warn!(lun_id = lun.id, "unable to find lun mapping");
            Ok(None)
        } else if status == StatusCode::NOT_FOUND {
            tracing::warn!(lun_id = lun.id, "host or host cluster doesn't exist");
            Ok(None)
        } else {
            Err(api_error(
                format!("failed to query lun mappings for lun id: {}", lun.id),
                status,
                envelope,
            ))
        }
    }

    /// Unmap the record's volume from its target. Idempotent.
    pub async fn unmap_lun(&self, lun: &Lun) -> Result<()> {
        let target = lun.target()?;
        let path = format!(
            "{}/volume_id/{}?approved=true",
            target.luns_path(),
            lun.volume_id
        );

        let (envelope, status) = self.api_call(Method::DELETE, &path, None).await?;
        if status == StatusCode::OK {
            match target {
                LunTarget::Host(host_id) => {
                    tracing::info!(volume_id = lun.volume_id, host_id, "unmapped volume from host")
                }
                LunTarget::Cluster(host_cluster_id) => tracing::info!(
                    volume_id = lun.volume_id,
                    host_cluster_id,
                    "unmapped volume from host cluster"
                ),
            }
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            tracing::warn!(volume_id = lun.volume_id, "host or host cluster doesn't exist");
            Ok(())
        } else {
            Err(api_error(
                format!(
                    "failed to unmap volume_id: {} from lun target",
                    lun.volume_id
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

    use crate::client::{Client, ClientError};
    use crate::types::Lun;

    fn envelope(result: serde_json::Value) -> String {
        serde_json::json!({"metadata": {"ready": true}, "result": result}).to_string()
    }

    #[tokio::test]
    async fn test_map_lun_routes_to_cluster_scope() {
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

        let client = Client::new("admin", "secret", &server.addr().to_string());
        let lun = Lun {
            volume_id: 17,
            host_cluster_id: 4,
            lun: 1,
            ..Default::default()
        };
        let mapped = client.map_lun(&lun).await.unwrap();
        assert!(mapped.clustered);
        assert_eq!(mapped.id, 99);
    }

    #[tokio::test]
    async fn test_map_lun_routes_to_host_scope() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/rest/hosts/7/luns"))
                .times(1)
                .respond_with(status_code(201).body(envelope(serde_json::json!({
                    "id": 100,
                    "lun": 2,
                    "volume_id": 17,
                    "host_id": 7,
                })))),
        );

        let client = Client::new("admin", "secret", &server.addr().to_string());
        let lun = Lun {
            volume_id: 17,
            host_id: 7,
            lun: 2,
            ..Default::default()
        };
        let mapped = client.map_lun(&lun).await.unwrap();
        assert!(!mapped.clustered);
        assert_eq!(mapped.host_id, 7);
    }

    #[tokio::test]
    async fn test_map_lun_without_target_fails_before_any_http_call() {
        // No expectations registered: any request would panic the server.
        let server = Server::run();

        let client = Client::new("admin", "secret", &server.addr().to_string());
        let lun = Lun {
            volume_id: 17,
            ..Default::default()
        };
        let err = client.map_lun(&lun).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[tokio::test]
    async fn test_query_lun_scans_collection_for_id() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/rest/hosts/7/luns"))
                .times(1)
                .respond_with(status_code(200).body(
                    serde_json::json!({
                        "metadata": {"number_of_objects": 2},
                        "result": [
                            {"id": 98, "lun": 1, "volume_id": 16, "host_id": 7},
                            {"id": 100, "lun": 2, "volume_id": 17, "host_id": 7},
                        ],
                    })
                    .to_string(),
                )),
        );

        let client = Client::new("admin", "secret", &server.addr().to_string());
        let lun = Lun {
            id: 100,
            volume_id: 17,
            host_id: 7,
            ..Default::default()
        };
        let found = client.query_lun(&lun).await.unwrap().unwrap();
        assert_eq!(found.lun, 2);
    }

    #[tokio::test]
    async fn test_unmap_lun_uses_volume_scoped_path() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path(
                    "DELETE",
                    "/api/rest/clusters/4/luns/volume_id/17"
                ),
                request::query(url_decoded(contains(("approved", "true")))),
            ])
            .times(1)
            .respond_with(status_code(200).body(envelope(serde_json::json!({"id": 99})))),
        );

        let client = Client::new("admin", "secret", &server.addr().to_string());
        let lun = Lun {
            id: 99,
            volume_id: 17,
            host_cluster_id: 4,
            clustered: true,
            ..Default::default()
        };
        client.unmap_lun(&lun).await.unwrap();
    }
}
