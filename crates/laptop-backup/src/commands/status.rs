//! Status command

use anyhow::Result;
use camino::Utf8Path;
use laptop_backup_core::ConfigOverrides;
use laptop_backup_provision::DeploymentStatus;
use serde_json::{json, Value};

use crate::cli::StatusArgs;
use crate::output;

pub async fn run(
    args: StatusArgs,
    config_path: Option<&Utf8Path>,
    overrides: ConfigOverrides,
) -> Result<()> {
    let config = super::resolve_config(config_path, &overrides)?;
    let reconciler = super::reconciler(&config).await;

    let status = reconciler.status(config.context.project_name()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&to_json(&status))?);
        return Ok(());
    }

    output::header(&format!("Status: {}", status.project));

    match &status.key {
        Some(key) => {
            output::kv("Key", &format!("alias/{}", key.alias));
            output::kv("Key ARN", &key.arn);
            output::kv("Key state", &key.state.to_string());
        }
        None => output::kv("Key", "not provisioned"),
    }

    match &status.bucket {
        Some(bucket) => {
            output::kv("Bucket", &bucket.state.name);
            match &bucket.drift {
                Some(drift) if drift.is_empty() => output::kv("Bucket policy", "in sync"),
                Some(drift) => {
                    let names: Vec<String> = drift.iter().map(|d| d.to_string()).collect();
                    output::kv("Bucket drift", &names.join(", "));
                }
                None => output::kv("Bucket policy", "unknown (no key)"),
            }
            if let Some(conflict) = &bucket.conflict {
                output::kv("Bucket conflict", conflict);
            }
        }
        None => output::kv("Bucket", "not provisioned"),
    }

    match &status.record {
        Some(record) => output::kv("Record", &format!("{} = {}", record.name, record.value)),
        None => output::kv("Record", "not published"),
    }

    if status.is_converged() {
        output::success("Deployment is converged");
    } else if status.key.as_ref().is_some_and(|k| k.is_pending_deletion()) {
        output::warning("The key is pending deletion; run deploy to cancel it");
    } else {
        output::info("Run deploy to converge");
    }

    Ok(())
}

fn to_json(status: &DeploymentStatus) -> Value {
    json!({
        "project": status.project,
        "converged": status.is_converged(),
        "key": status.key,
        "bucket": status.bucket.as_ref().map(|b| json!({
            "name": b.state.name,
            "drift": b.drift.as_ref().map(|d| d.iter().map(|x| x.to_string()).collect::<Vec<_>>()),
            "conflict": b.conflict,
        })),
        "record": status.record,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_of_empty_deployment() {
        let status = DeploymentStatus {
            project: "acme".to_string(),
            key: None,
            bucket: None,
            record: None,
        };

        let value = to_json(&status);
        assert_eq!(value["project"], "acme");
        assert_eq!(value["converged"], false);
        assert!(value["bucket"].is_null());
    }
}
