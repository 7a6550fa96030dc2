use anyhow::{Context as _, Result};
use colored::Colorize;
use planner::{ReconcileContext, ReconcileError};

use super::Session;
use super::display::{ProgressPrinter, display_plan, print_summary};
use crate::Context;
use crate::cli::ReconcileArgs;
use crate::ui;

pub fn run(ctx: &Context, args: ReconcileArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let (template, source) = session.resolve(&args.target)?;
    let prs = session.pull_requests(&source, &args.pull_requests)?;

    let plan = session
        .reconciler
        .plan(&template, &source, &prs)
        .context("Could not compute plan")?;
    display_plan(&plan);

    if plan.is_empty() && plan.skipped.is_empty() {
        return Ok(());
    }

    if args.dry_run {
        println!();
        println!("  {} Dry run - no changes made", "ℹ".blue());
        return Ok(());
    }

    if !plan.is_empty() && !args.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    let jobs = args.jobs.unwrap_or(session.config.jobs);
    let reconcile_ctx = ReconcileContext::new(jobs);
    let mut progress = ProgressPrinter::new(ctx.quiet);

    match session.reconciler.reconcile_with_progress(
        &reconcile_ctx,
        &template,
        &source,
        &prs,
        &mut progress,
    ) {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(ReconcileError::Apply(failures)) => {
            for failure in failures.iter() {
                ui::error(&failure.to_string());
            }
            if failures.is_retryable() {
                ui::dim("All failures are retryable; run reconcile again");
            }
            anyhow::bail!(
                "{} failed",
                ui::plural(failures.len(), "branch operation", "branch operations")
            )
        }
        Err(e) => Err(e).context("Reconcile failed"),
    }
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}
