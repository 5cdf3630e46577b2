//! Host and port operations.

use reqwest::{Method, StatusCode};

use crate::client::{api_error, decode, number_of_objects, Client, Result};
use crate::types::{Host, HostPatch, Port};

impl Client {
    /// Create a host record. Ports are attached separately with
    /// [`Client::create_port`].
    pub async fn create_host(&self, host: &Host) -> Result<Host> {
        let body = Self::encode(host)?;
        let request = String::from_utf8_lossy(&body).into_owned();

        let (envelope, status) = self.api_call(Method::POST, "/hosts/", Some(body)).await?;
        if status == StatusCode::CREATED {
            let created: Host = decode(envelope.result, status)?;
            tracing::info!(host_id = created.id, name = %created.name, "created host");
            Ok(created)
        } else {
            Err(api_error(
                format!("failed to create host record: {}", request),
                status,
                envelope,
            ))
        }
    }

    /// Read a host by id. A missing host is the absent outcome, not an
    /// error; callers react by clearing local identity.
    pub async fn read_host(&self, host_id: i64) -> Result<Option<Host>> {
        let (envelope, status) = self
            .api_call(Method::GET, &format!("/hosts/{}", host_id), None)
            .await?;
        if status == StatusCode::OK {
            let host: Host = decode(envelope.result, status)?;
            tracing::info!(host_id, name = %host.name, "fetched host");
            Ok(Some(host))
        } else if status == StatusCode::NOT_FOUND {
            tracing::warn!(host_id, "the host doesn't exist");
            Ok(None)
        } else {
            Err(api_error(
                format!("failed to read host with id: {}", host_id),
                status,
                envelope,
            ))
        }
    }

    /// Apply a sparse update to a host.
    pub async fn update_host(&self, host_id: i64, patch: &HostPatch) -> Result<Host> {
        let body = Self::encode(patch)?;
        let request = String::from_utf8_lossy(&body).into_owned();

        let (envelope, status) = self
            .api_call(
                Method::PUT,
                &format!("/hosts/{}?approved=true", host_id),
                Some(body),
            )
            .await?;
        if status == StatusCode::OK {
            let host: Host = decode(envelope.result, status)?;
            tracing::info!(host_id, "updated host");
            Ok(host)
        } else {
            Err(api_error(
                format!(
                    "failed to update host record with id: {} to: {}",
                    host_id, request
                ),
                status,
                envelope,
            ))
        }
    }

    /// Delete a host. Deleting an already-absent host succeeds, so the call
    /// is idempotent.
    pub async fn delete_host(&self, host_id: i64) -> Result<()> {
        let (envelope, status) = self
            .api_call(Method::DELETE, &format!("/hosts/{}", host_id), None)
            .await?;
        if status == StatusCode::OK {
            tracing::info!(host_id, "deleted host");
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            tracing::warn!(host_id, "the host doesn't exist");
            Ok(())
        } else {
            Err(api_error(
                format!("failed to delete host with id: {}", host_id),
                status,
                envelope,
            ))
        }
    }

    /// Attach a port to a host.
    pub async fn create_port(&self, host_id: i64, port: &Port) -> Result<Port> {
        let body = Self::encode(port)?;
        let request = String::from_utf8_lossy(&body).into_owned();

        let (envelope, status) = self
            .api_call(
                Method::POST,
                &format!("/hosts/{}/ports", host_id),
                Some(body),
            )
            .await?;
        if status == StatusCode::CREATED {
            let created: Port = decode(envelope.result, status)?;
            tracing::info!(host_id, address = %created.address, "added port to host");
            Ok(created)
        } else {
            Err(api_error(
                format!("failed to add port record: {}", request),
                status,
                envelope,
            ))
        }
    }

    /// Look a port up by address. The server filter is not guaranteed to be
    /// exact, so the returned collection is filtered again here; the first
    /// exact match wins and no match is the absent outcome.
    pub async fn read_port(&self, host_id: i64, address: &str) -> Result<Option<Port>> {
        let (envelope, status) = self
            .api_call(
                Method::GET,
                &format!("/hosts/{}/ports/?address=eq:{}", host_id, address),
                None,
            )
            .await?;
        if status == StatusCode::OK {
            let ports: Vec<Port> = decode(envelope.result.clone(), status)?;
            if number_of_objects(&envelope, ports.len()) > 0 {
                if let Some(port) = ports.into_iter().find(|p| p.address == address) {
                    tracing::info!(host_id, address = %port.address, "fetched port");
                    return Ok(Some(port));
                }
            }
            tracing::warn!(host_id, address, "port address was not found on host");
            Ok(None)
        } else if status == StatusCode::NOT_FOUND {
            tracing::warn!(host_id, "the host doesn't exist");
            Ok(None)
        } else {
            Err(api_error(
                format!(
                    "failed to read port address: {} of host id: {}",
                    address, host_id
                ),
                status,
                envelope,
            ))
        }
    }

    /// Detach a port from a host. A port that is already gone is the absent
    /// outcome.
    pub async fn delete_port(&self, host_id: i64, port: &Port) -> Result<Option<Port>> {
        let (envelope, status) = self
            .api_call(
                Method::DELETE,
                &format!(
                    "/hosts/{}/ports/{}/{}?approved=true",
                    host_id, port.port_type, port.address
                ),
                None,
            )
            .await?;
        if status == StatusCode::OK {
            let ports: Vec<Port> = decode(envelope.result.clone(), status)?;
            if number_of_objects(&envelope, ports.len()) > 0 {
                let deleted = ports.into_iter().next();
                tracing::info!(host_id, address = %port.address, "deleted port");
                return Ok(deleted);
            }
            tracing::warn!(host_id, address = %port.address, "port address was not found on host");
            Ok(None)
        } else if status == StatusCode::NOT_FOUND {
            tracing::warn!(host_id, address = %port.address, "port or host doesn't exist");
            Ok(None)
        } else {
            Err(api_error(
                format!(
                    "failed to delete port address: {} of host id: {}",
                    port.address, host_id
                ),
                status,
                envelope,
            ))
        }
    }
}
