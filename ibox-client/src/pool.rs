//! Pool operations.

use reqwest::{Method, StatusCode};

use crate::client::{api_error, decode, number_of_objects, Client, Result};
use crate::types::{Pool, PoolPatch};

impl Client {
    pub async fn create_pool(&self, pool: &Pool) -> Result<Pool> {
        let body = Self::encode(pool)?;
        let request = String::from_utf8_lossy(&body).into_owned();

        let (envelope, status) = self.api_call(Method::POST, "/pools/", Some(body)).await?;
        if status == StatusCode::CREATED {
            let created: Pool = decode(envelope.result, status)?;
            tracing::info!(pool_id = created.id, name = %created.name, "created pool");
            Ok(created)
        } else {
            Err(api_error(
                format!("failed to create pool record: {}", request),
                status,
                envelope,
            ))
        }
    }

    pub async fn read_pool(&self, pool_id: i64) -> Result<Option<Pool>> {
        let (envelope, status) = self
            .api_call(Method::GET, &format!("/pools/{}", pool_id), None)
            .await?;
        if status == StatusCode::OK {
            let pool: Pool = decode(envelope.result, status)?;
            tracing::info!(pool_id, name = %pool.name, "fetched pool");
            Ok(Some(pool))
        } else if status == StatusCode::NOT_FOUND {
            tracing::warn!(pool_id, "the pool doesn't exist");
            Ok(None)
        } else {
            Err(api_error(
                format!("failed to read pool with id: {}", pool_id),
                status,
                envelope,
            ))
        }
    }

    /// Apply a sparse update to a pool.
    pub async fn update_pool(&self, pool_id: i64, patch: &PoolPatch) -> Result<Pool> {
        let body = Self::encode(patch)?;
        let request = String::from_utf8_lossy(&body).into_owned();

        let (envelope, status) = self
            .api_call(Method::PUT, &format!("/pools/{}", pool_id), Some(body))
            .await?;
        if status == StatusCode::OK {
            let pool: Pool = decode(envelope.result, status)?;
            tracing::info!(pool_id, "updated pool");
            Ok(pool)
        } else {
            Err(api_error(
                format!(
                    "failed to update pool record with id: {} to: {}",
                    pool_id, request
                ),
                status,
                envelope,
            ))
        }
    }

    /// Delete a pool. Idempotent.
    pub async fn delete_pool(&self, pool_id: i64) -> Result<()> {
        let (envelope, status) = self
            .api_call(
                Method::DELETE,
                &format!("/pools/{}?approved=true", pool_id),
                None,
            )
            .await?;
        if status == StatusCode::OK {
            tracing::info!(pool_id, "deleted pool");
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            tracing::warn!(pool_id, "the pool doesn't exist");
            Ok(())
        } else {
            Err(api_error(
                format!("failed to delete pool with id: {}", pool_id),
                status,
                envelope,
            ))
        }
    }

    /// Look a pool up by name. The returned collection is filtered again
    /// client-side; the first exact match wins and an empty result is the
    /// absent outcome, not an error.
    pub async fn find_pool_by_name(&self, pool_name: &str) -> Result<Option<Pool>> {
        let (envelope, status) = self
            .api_call(Method::GET, &format!("/pools?name=eq:{}", pool_name), None)
            .await?;
        if status == StatusCode::OK {
            let pools: Vec<Pool> = decode(envelope.result.clone(), status)?;
            if number_of_objects(&envelope, pools.len()) > 0 {
                if let Some(pool) = pools.into_iter().find(|p| p.name == pool_name) {
                    tracing::info!(pool_id = pool.id, name = %pool.name, "found pool");
                    return Ok(Some(pool));
                }
            }
            tracing::warn!(name = pool_name, "no pool with that name");
            Ok(None)
        } else {
            Err(api_error(
                format!("failed to find pool object name: {}", pool_name),
                status,
                envelope,
            ))
        }
    }
}
