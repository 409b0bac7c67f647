//! Deploy command

use anyhow::Result;
use camino::Utf8Path;
use laptop_backup_core::types::LifecycleRule;
use laptop_backup_core::ConfigOverrides;
use laptop_backup_provision::{Action, DeploymentPlan, ReconcileFailure, ReconcileReport};

use crate::cli::DeployArgs;
use crate::output;

pub async fn run(
    args: DeployArgs,
    config_path: Option<&Utf8Path>,
    overrides: ConfigOverrides,
) -> Result<()> {
    let config = super::resolve_config(config_path, &overrides)?;
    let project = config.context.project_name().to_string();
    let mut reconciler = super::reconciler(&config).await;

    if args.dry_run {
        let plan = reconciler.plan(&project)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            print_plan(&plan);
        }
        return Ok(());
    }

    if !args.json {
        output::header(&format!("Deploying backup storage for {}", project));
    }

    let spinner = output::spinner("Reconciling key, bucket and record...");
    let result = reconciler.reconcile(&project).await;
    spinner.finish_and_clear();

    match result {
        Ok(report) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(())
        }
        Err(failure) => {
            print_failure(&failure);
            Err(failure.into())
        }
    }
}

fn print_plan(plan: &DeploymentPlan) {
    output::header(&format!("Plan for {} (dry run)", plan.project));
    output::kv("Region", &plan.region);
    output::kv(
        "Key",
        &format!(
            "alias/{} ({}-day deletion grace period)",
            plan.key_alias, plan.key_grace_period_days
        ),
    );
    let bucket = if plan.bucket_name_generated {
        format!("{} (generated)", plan.bucket_name)
    } else {
        plan.bucket_name.clone()
    };
    output::kv("Bucket", &bucket);
    output::kv("Record", &plan.parameter_name);

    println!("\nLifecycle:");
    for rule in &plan.lifecycle_rules {
        output::kv(&rule.id, &describe_rule(rule));
    }

    output::info("No changes made");
}

fn describe_rule(rule: &LifecycleRule) -> String {
    let track = |transitions: &[laptop_backup_core::types::Transition]| {
        transitions
            .iter()
            .map(|t| format!("{} after {}d", t.storage_class.as_str(), t.after_days))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut parts = Vec::new();
    if !rule.transitions.is_empty() {
        parts.push(format!("current: {}", track(&rule.transitions)));
    }
    if !rule.noncurrent_transitions.is_empty() {
        parts.push(format!("noncurrent: {}", track(&rule.noncurrent_transitions)));
    }
    if let Some(days) = rule.abort_incomplete_multipart_after_days {
        parts.push(format!("abort incomplete uploads after {}d", days));
    }
    parts.join("; ")
}

fn print_report(report: &ReconcileReport) {
    for change in &report.changes {
        let line = format!("{} {} ({})", change.resource, change.identifier, change.action);
        match change.action {
            Action::Unchanged => output::info(&line),
            Action::Created | Action::Updated => output::success(&line),
        }
        for detail in &change.details {
            output::kv("applied", detail);
        }
    }

    if report.is_noop() {
        output::success("Already up to date");
    } else {
        output::success(&format!("Backups go to {}", report.bucket_name()));
    }
}

fn print_failure(failure: &ReconcileFailure) {
    output::error(&format!(
        "Deployment stopped during {} ({} error)",
        failure.step,
        failure.error().kind()
    ));
    output::error(&failure.error().to_string());

    // Nothing is rolled back
    if let Some(key) = &failure.key {
        output::kv("Key left in place", &key.arn);
    }
    if let Some(bucket) = failure
        .bucket
        .as_ref()
        .and_then(|b| b.resolved_name.as_deref())
    {
        output::kv("Bucket left in place", bucket);
    }
    if failure.key.is_some() {
        output::info("Re-run deploy once the cause is fixed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_default_rule() {
        let rule = &LifecycleRule::defaults()[0];
        assert_eq!(
            describe_rule(rule),
            "current: INTELLIGENT_TIERING after 30d, GLACIER after 180d; \
             noncurrent: STANDARD_IA after 30d, GLACIER after 60d; \
             abort incomplete uploads after 10d"
        );
    }
}
