//! Destroy command

use anyhow::Result;
use camino::Utf8Path;
use dialoguer::Confirm;
use laptop_backup_core::ConfigOverrides;

use crate::cli::DestroyArgs;
use crate::output;

pub async fn run(
    args: DestroyArgs,
    config_path: Option<&Utf8Path>,
    overrides: ConfigOverrides,
) -> Result<()> {
    let config = super::resolve_config(config_path, &overrides)?;
    let project = config.context.project_name().to_string();

    if !args.force {
        output::info(&format!(
            "The key for '{}' will be scheduled for deletion after {} days; the bucket is kept",
            project, config.key_policy.pending_window_days
        ));
        let confirmed = Confirm::new()
            .with_prompt(format!("Tear down backup storage for '{}'?", project))
            .default(false)
            .interact()?;

        if !confirmed {
            output::info("Cancelled");
            return Ok(());
        }
    }

    output::header(&format!("Tearing down {}", project));
    let mut reconciler = super::reconciler(&config).await;

    let spinner = output::spinner("Withdrawing record and scheduling key deletion...");
    let result = reconciler.teardown(&project).await;
    spinner.finish_and_clear();
    let report = result?;

    if report.record_withdrawn {
        output::success("Registry record withdrawn");
    }
    match (&report.key, report.key_deletion_date) {
        (Some(key), Some(date)) => output::success(&format!(
            "Key {} scheduled for deletion on {}",
            key.arn,
            date.format("%Y-%m-%d")
        )),
        _ => output::info("No key to remove"),
    }
    if let Some(bucket) = &report.retained_bucket {
        output::warning(&format!(
            "Bucket {} was retained with its contents; delete it manually if no longer needed",
            bucket
        ));
        if report.key.is_some() {
            output::warning("Its objects become unreadable once the key is deleted; run deploy to cancel");
        }
    }

    Ok(())
}
