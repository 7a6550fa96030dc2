use anyhow::{Context as _, Result};
use colored::Colorize;
use planner::types::PR_ID_LABEL;
use planner::{GitRepository, Object, OwnedObjects, Terraform};

use super::Session;
use crate::Context;
use crate::cli::TemplateArgs;
use crate::ui;

pub fn run(ctx: &Context, args: TemplateArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let (template, source, owned) = load(&session, &args)?;

    ui::header(&format!("Branch objects of {}", template.key()));
    ui::kv("Source", &source.key());
    ui::kv("Tracks", source.tracked_branch().unwrap_or("(no branch)"));

    if owned.pairs.is_empty() && owned.strays.is_empty() {
        ui::dim("No branch objects");
        return Ok(());
    }

    for (branch_id, pair) in &owned.pairs {
        let pr_id = pair
            .terraform
            .as_ref()
            .map(|o| o.labels())
            .or(pair.source.as_ref().map(|o| o.labels()))
            .and_then(|labels| labels.get(PR_ID_LABEL))
            .map_or(String::new(), |id| format!(" (#{id})"));
        println!();
        println!("  {} {}{}", "•".cyan(), branch_id.to_string().bold(), pr_id);
        ui::kv(
            "Terraform",
            pair.terraform.as_ref().map_or("(missing)", |o| o.name()),
        );
        ui::kv(
            "GitRepository",
            pair.source.as_ref().map_or("(missing)", |o| o.name()),
        );
    }

    if !owned.strays.is_empty() {
        println!();
        for stray in &owned.strays {
            ui::warn(&format!(
                "Stray {} {} (deleted on next reconcile)",
                stray.kind, stray.name
            ));
        }
    }

    Ok(())
}

/// The template, its source and the branch objects it owns
fn load(
    session: &Session,
    args: &TemplateArgs,
) -> Result<(Terraform, GitRepository, OwnedObjects)> {
    let (template, source) = session.resolve(args)?;
    let owned = session
        .reconciler
        .owned(&template, &source)
        .context("Could not list branch objects")?;
    Ok((template, source, owned))
}
