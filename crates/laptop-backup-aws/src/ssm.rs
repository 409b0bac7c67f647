//! SSM Parameter Store registry backend

use crate::errors::sdk_error;
use async_trait::async_trait;
use aws_sdk_ssm::types::ParameterType as SsmParameterType;
use aws_sdk_ssm::Client;
use laptop_backup_core::types::{ParameterType, RegistryRecord};
use laptop_backup_core::Result;
use laptop_backup_provision::RegistryBackend;
use tracing::debug;

pub struct SsmRegistryBackend {
    client: Client,
}

impl SsmRegistryBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn resource(name: &str) -> String {
    format!("parameter {}", name)
}

fn to_ssm_type(parameter_type: ParameterType) -> SsmParameterType {
    match parameter_type {
        ParameterType::String => SsmParameterType::String,
    }
}

#[async_trait]
impl RegistryBackend for SsmRegistryBackend {
    fn name(&self) -> &'static str {
        "ssm"
    }

    async fn get_parameter(&self, name: &str) -> Result<Option<RegistryRecord>> {
        debug!("ssm GetParameter {}", name);
        match self.client.get_parameter().name(name).send().await {
            Ok(resp) => Ok(resp
                .parameter()
                .and_then(|p| p.value())
                .map(|value| RegistryRecord::new(name, value))),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_parameter_not_found()) => {
                Ok(None)
            }
            Err(e) => Err(sdk_error(resource(name), "GetParameter", e)),
        }
    }

    async fn put_parameter(&self, record: &RegistryRecord) -> Result<()> {
        debug!("ssm PutParameter {}", record.name);
        self.client
            .put_parameter()
            .name(&record.name)
            .value(&record.value)
            .r#type(to_ssm_type(record.parameter_type))
            .overwrite(true)
            .send()
            .await
            .map_err(|e| sdk_error(resource(&record.name), "PutParameter", e))?;
        Ok(())
    }

    async fn delete_parameter(&self, name: &str) -> Result<bool> {
        debug!("ssm DeleteParameter {}", name);
        match self.client.delete_parameter().name(name).send().await {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_parameter_not_found()) => {
                Ok(false)
            }
            Err(e) => Err(sdk_error(resource(name), "DeleteParameter", e)),
        }
    }
}
