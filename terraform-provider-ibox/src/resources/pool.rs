//! Pool resource driver.
//!
//! Updates are applied one field at a time: every declared attribute that
//! differs between the observed and desired state is sent immediately as
//! its own single-field patch, so N changed fields cost N round trips.

use async_trait::async_trait;

use ibox_client::types::{Pool, PoolPatch};
use ibox_client::{validate, Client};

use crate::resources::{Resource, ResourceResult, ResourceState};
use crate::schema::{Diagnostic, ResourceSchema, SchemaAttribute, SchemaBlock};

pub struct PoolResource;

impl PoolResource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PoolResource {
    fn default() -> Self {
        Self::new()
    }
}

/// Declared attributes, walked in order on update.
const POOL_FIELDS: &[&str] = &[
    "name",
    "virtual_capacity",
    "physical_capacity",
    "max_extend",
    "physical_capacity_critical",
    "physical_capacity_warning",
    "ssd_enabled",
    "compression_enabled",
];

fn capacity_checks(config: &ResourceState) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for field in ["virtual_capacity", "physical_capacity"] {
        if let Some(value) = config.get_i64(field) {
            if let Err(err) = validate::integer_at_least(field, value, validate::POOL_MIN_SIZE) {
                diagnostics.push(Diagnostic::error(&err.to_string()));
            }
            if let Err(err) = validate::verify_capacity(value, validate::UNIT_SIZE) {
                diagnostics.push(Diagnostic::error(&err.to_string()));
            }
        }
    }
    diagnostics
}

fn single_field_patch(planned: &ResourceState, field: &str) -> PoolPatch {
    match field {
        "name" => PoolPatch {
            name: planned.get_string("name"),
            ..Default::default()
        },
        "virtual_capacity" => PoolPatch {
            virtual_capacity: planned.get_i64("virtual_capacity"),
            ..Default::default()
        },
        "physical_capacity" => PoolPatch {
            physical_capacity: planned.get_i64("physical_capacity"),
            ..Default::default()
        },
        "max_extend" => PoolPatch {
            max_extend: planned.get_i64("max_extend"),
            ..Default::default()
        },
        "physical_capacity_critical" => PoolPatch {
            physical_capacity_critical: planned.get_i64("physical_capacity_critical"),
            ..Default::default()
        },
        "physical_capacity_warning" => PoolPatch {
            physical_capacity_warning: planned.get_i64("physical_capacity_warning"),
            ..Default::default()
        },
        "ssd_enabled" => PoolPatch {
            ssd_enabled: planned.get_bool("ssd_enabled"),
            ..Default::default()
        },
        "compression_enabled" => PoolPatch {
            compression_enabled: planned.get_bool("compression_enabled"),
            ..Default::default()
        },
        _ => PoolPatch::default(),
    }
}

#[async_trait]
impl Resource for PoolResource {
    fn type_name(&self) -> &str {
        "ibox_pool"
    }

    fn schema(&self) -> ResourceSchema {
        let block = SchemaBlock::new()
            .with_attribute(
                "name",
                SchemaAttribute::string()
                    .with_description("Pool name")
                    .required(),
            )
            .with_attribute(
                "virtual_capacity",
                SchemaAttribute::number()
                    .with_description("Virtual capacity in bytes")
                    .required(),
            )
            .with_attribute(
                "physical_capacity",
                SchemaAttribute::number()
                    .with_description("Physical capacity in bytes")
                    .required(),
            )
            .with_attribute("max_extend", SchemaAttribute::number().optional())
            .with_attribute(
                "physical_capacity_critical",
                SchemaAttribute::number().optional(),
            )
            .with_attribute(
                "physical_capacity_warning",
                SchemaAttribute::number().optional(),
            )
            .with_attribute(
                "ssd_enabled",
                SchemaAttribute::bool()
                    .with_description("Enable/Disable SSD read cache for pool")
                    .optional(),
            )
            .with_attribute(
                "compression_enabled",
                SchemaAttribute::bool()
                    .with_description("Enable/Disable compression for pool")
                    .optional(),
            )
            .with_attribute("id", SchemaAttribute::number().computed())
            .with_description("Manages an iBox storage pool");

        ResourceSchema::new(1, block)
    }

    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        let mut diagnostics = capacity_checks(config);

        for field in ["physical_capacity_critical", "physical_capacity_warning"] {
            if let Some(value) = config.get_i64(field) {
                if let Err(err) = validate::integer_in_range(field, value, 1, 100) {
                    diagnostics.push(Diagnostic::error(&err.to_string()));
                }
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
            .ok_or_else(|| vec![Diagnostic::error("Pool name is required")])?;

        // Misaligned or undersized capacities are rejected before any
        // network call.
        let diagnostics = capacity_checks(planned);
        if !diagnostics.is_empty() {
            return Err(diagnostics);
        }

        let pool = Pool {
            name,
            virtual_capacity: planned.get_i64("virtual_capacity").unwrap_or_default(),
            physical_capacity: planned.get_i64("physical_capacity").unwrap_or_default(),
            max_extend: planned.get_i64("max_extend").unwrap_or_default(),
            physical_capacity_critical: planned
                .get_i64("physical_capacity_critical")
                .unwrap_or_default(),
            physical_capacity_warning: planned
                .get_i64("physical_capacity_warning")
                .unwrap_or_default(),
            ssd_enabled: planned.get_bool("ssd_enabled").unwrap_or_default(),
            compression_enabled: planned.get_bool("compression_enabled").unwrap_or_default(),
            ..Default::default()
        };

        let created = client
            .create_pool(&pool)
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
        let pool_id = current
            .get_i64("id")
            .ok_or_else(|| vec![Diagnostic::error("Pool ID is required")])?;

        let pool = client
            .read_pool(pool_id)
            .await
            .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;

        let pool = match pool {
            Some(pool) => pool,
            None => {
                tracing::warn!(pool_id, "pool was deleted out of band, removing it from state");
                return Ok(ResourceState::new());
            }
        };

        let mut state = ResourceState::new();
        state.set("id", serde_json::json!(pool.id));
        state.set("name", serde_json::json!(pool.name));
        state.set("virtual_capacity", serde_json::json!(pool.virtual_capacity));
        state.set(
            "physical_capacity",
            serde_json::json!(pool.physical_capacity),
        );
        if pool.max_extend != 0 {
            state.set("max_extend", serde_json::json!(pool.max_extend));
        }
        if pool.physical_capacity_critical != 0 {
            state.set(
                "physical_capacity_critical",
                serde_json::json!(pool.physical_capacity_critical),
            );
        }
        if pool.physical_capacity_warning != 0 {
            state.set(
                "physical_capacity_warning",
                serde_json::json!(pool.physical_capacity_warning),
            );
        }
        state.set("ssd_enabled", serde_json::json!(pool.ssd_enabled));
        state.set(
            "compression_enabled",
            serde_json::json!(pool.compression_enabled),
        );
        Ok(state)
    }

    async fn update(
        &self,
        client: &Client,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let pool_id = current
            .get_i64("id")
            .ok_or_else(|| vec![Diagnostic::error("Pool ID is required")])?;

        for &field in POOL_FIELDS {
            if planned.get(field) == current.get(field) {
                continue;
            }
            tracing::debug!(field, pool_id, "pool attribute has changed");

            if field == "virtual_capacity" || field == "physical_capacity" {
                if let Some(value) = planned.get_i64(field) {
                    validate::verify_capacity(value, validate::UNIT_SIZE)
                        .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;
                }
            }

            let patch = single_field_patch(planned, field);
            client
                .update_pool(pool_id, &patch)
                .await
                .map_err(|err| vec![Diagnostic::error(&err.to_string())])?;
        }

        let mut seed = ResourceState::new();
        seed.set("id", serde_json::json!(pool_id));
        self.read(client, &seed).await
    }

    async fn delete(&self, client: &Client, current: &ResourceState) -> ResourceResult<()> {
        let pool_id = current
            .get_i64("id")
            .ok_or_else(|| vec![Diagnostic::error("Pool ID is required")])?;

        client
            .delete_pool(pool_id)
            .await
            .map_err(|err| vec![Diagnostic::error(&err.to_string())])
    }
}
