//! Volume operations.

use reqwest::{Method, StatusCode};

use crate::client::{api_error, decode, Client, Result};
use crate::types::{Volume, VolumeMove, VolumePatch};

impl Client {
    pub async fn create_volume(&self, volume: &Volume) -> Result<Volume> {
        let body = Self::encode(volume)?;
        let request = String::from_utf8_lossy(&body).into_owned();

        let (envelope, status) = self.api_call(Method::POST, "/volumes/", Some(body)).await?;
        if status == StatusCode::CREATED {
            let created: Volume = decode(envelope.result, status)?;
            tracing::info!(volume_id = created.id, name = %created.name, "created volume");
            Ok(created)
        } else {
            Err(api_error(
                format!("failed to create volume record: {}", request),
                status,
                envelope,
            ))
        }
    }

    pub async fn read_volume(&self, volume_id: i64) -> Result<Option<Volume>> {
        let (envelope, status) = self
            .api_call(Method::GET, &format!("/volumes/{}", volume_id), None)
            .await?;
        if status == StatusCode::OK {
            let volume: Volume = decode(envelope.result, status)?;
            tracing::info!(volume_id, name = %volume.name, "fetched volume");
            Ok(Some(volume))
        } else if status == StatusCode::NOT_FOUND {
            tracing::warn!(volume_id, "the volume doesn't exist");
            Ok(None)
        } else {
            Err(api_error(
                format!("failed to read volume with id: {}", volume_id),
                status,
                envelope,
            ))
        }
    }

    /// Apply a sparse update to a volume.
    pub async fn update_volume(&self, volume_id: i64, patch: &VolumePatch) -> Result<Volume> {
        let body = Self::encode(patch)?;
        let request = String::from_utf8_lossy(&body).into_owned();

        let (envelope, status) = self
            .api_call(Method::PUT, &format!("/volumes/{}", volume_id), Some(body))
            .await?;
        if status == StatusCode::OK {
            let volume: Volume = decode(envelope.result, status)?;
            tracing::info!(volume_id, "updated volume");
            Ok(volume)
        } else {
            Err(api_error(
                format!(
                    "failed to update volume record with id: {} to: {}",
                    volume_id, request
                ),
                status,
                envelope,
            ))
        }
    }

    /// Delete a volume. Idempotent.
    pub async fn delete_volume(&self, volume_id: i64) -> Result<()> {
        let (envelope, status) = self
            .api_call(
                Method::DELETE,
                &format!("/volumes/{}?approved=true", volume_id),
                None,
            )
            .await?;
        if status == StatusCode::OK {
            tracing::info!(volume_id, "deleted volume");
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            tracing::warn!(volume_id, "the volume doesn't exist");
            Ok(())
        } else {
            Err(api_error(
                format!("failed to delete volume with id: {}", volume_id),
                status,
                envelope,
            ))
        }
    }

    /// Move a volume to another pool. This is the only way to change a
    /// volume's owning pool; the generic update path does not accept it.
    pub async fn move_volume(&self, volume_id: i64, mv: &VolumeMove) -> Result<Volume> {
        let body = Self::encode(mv)?;
        let request = String::from_utf8_lossy(&body).into_owned();

        let (envelope, status) = self
            .api_call(
                Method::POST,
                &format!("/volumes/{}/move", volume_id),
                Some(body),
            )
            .await?;
        if status == StatusCode::OK {
            let volume: Volume = decode(envelope.result, status)?;
            tracing::info!(volume_id, pool_id = mv.pool_id, "moved volume");
            Ok(volume)
        } else {
            Err(api_error(
                format!("failed to move volume: {}", request),
                status,
                envelope,
            ))
        }
    }
}
