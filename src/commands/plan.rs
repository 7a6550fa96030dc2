use anyhow::{Context as _, Result};

use super::Session;
use super::display::display_plan;
use crate::Context;
use crate::cli::PlanArgs;
use crate::ui;

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let session = Session::open(ctx)?;
    let (template, source) = session.resolve(&args.target)?;
    let prs = session.pull_requests(&source, &args.pull_requests)?;

    let plan = session
        .reconciler
        .plan(&template, &source, &prs)
        .context("Could not compute plan")?;
    display_plan(&plan);

    if !plan.is_empty() {
        println!();
        ui::info("Run `branch-planner reconcile` with the same arguments to apply");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::Fixture;

    #[test]
    fn test_plan_does_not_write() {
        let fixture = Fixture::new();
        let before = fixture.store().root().join("terraforms");
        let count = || std::fs::read_dir(before.join("flux-system")).unwrap().count();
        let initial = count();

        run(
            &fixture.context(),
            PlanArgs {
                target: fixture.target(),
                pull_requests: fixture.prs(),
            },
        )
        .unwrap();
        assert_eq!(count(), initial);
    }
}
