//! Registry Publisher: makes the bucket name discoverable

use crate::report::Action;
use crate::traits::RegistryBackend;
use laptop_backup_core::types::{validate_parameter_name, validate_parameter_value, RegistryRecord};
use laptop_backup_core::Result;
use std::sync::Arc;
use tracing::{debug, info};

pub struct RegistryPublisher {
    backend: Arc<dyn RegistryBackend>,
}

impl RegistryPublisher {
    pub fn new(backend: Arc<dyn RegistryBackend>) -> Self {
        Self { backend }
    }

    /// Publish `value` under `name`, overwriting any previous value.
    ///
    /// Publishing the same value again is a no-op.
    pub async fn publish(&self, name: &str, value: &str) -> Result<(RegistryRecord, Action)> {
        validate_parameter_name(name)?;
        validate_parameter_value(name, value)?;

        let record = RegistryRecord::new(name, value);
        let action = match self.backend.get_parameter(name).await? {
            Some(existing) if existing == record => {
                debug!("Parameter {} already set to {}", name, value);
                return Ok((record, Action::Unchanged));
            }
            Some(existing) => {
                info!(
                    "Updating parameter {}: {} -> {}",
                    name, existing.value, value
                );
                Action::Updated
            }
            None => {
                info!("Publishing parameter {} = {}", name, value);
                Action::Created
            }
        };

        self.backend.put_parameter(&record).await?;
        Ok((record, action))
    }

    /// Remove the record at `name`. Returns whether it existed.
    pub async fn withdraw(&self, name: &str) -> Result<bool> {
        validate_parameter_name(name)?;
        let existed = self.backend.delete_parameter(name).await?;
        if existed {
            info!("Withdrew parameter {} via {}", name, self.backend.name());
        } else {
            debug!("Parameter {} was not published", name);
        }
        Ok(existed)
    }

    /// Read the current value at `name`
    pub async fn lookup(&self, name: &str) -> Result<Option<RegistryRecord>> {
        validate_parameter_name(name)?;
        self.backend.get_parameter(name).await
    }
}
