//! Plan and progress display

use colored::Colorize;
use planner::{
    ApplySummary, BranchChange, BranchOutcome, DerivedObject, ProgressCallback, ReconcilePlan,
    Step,
};
use similar::{ChangeTag, TextDiff};

use crate::ui;

/// Display a plan in a user-friendly format
pub fn display_plan(plan: &ReconcilePlan) {
    for (branch_id, reason) in &plan.skipped {
        ui::warn(&format!("Skipped {branch_id}: {reason}"));
    }

    if plan.is_empty() {
        println!();
        println!(
            "  {} No changes needed ({} up to date)",
            "✓".green(),
            ui::plural(plan.unchanged.len(), "branch", "branches")
        );
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Branch Plan".bold()
    );
    println!("│");

    for change in &plan.changes {
        println!("│ {}", change.label().bold());
        for step in &change.steps {
            let symbol = match step {
                Step::Create(_) => "+".green(),
                Step::Update { .. } => "~".yellow(),
                Step::Delete { .. } => "-".red(),
            };
            println!("│   {} {:<14} {}", symbol, step.kind().as_str(), step.name());

            if let Step::Update { current, updated } = step {
                for (tag, line) in changed_lines(current, updated) {
                    let line = match tag {
                        ChangeTag::Delete => format!("- {line}").red(),
                        _ => format!("+ {line}").green(),
                    };
                    println!("│       {line}");
                }
            }
        }
        println!("│");
    }

    let summary = plan.summary();
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} to create, {} to update, {} to delete ({} unchanged)",
        summary.creates.to_string().green(),
        summary.updates.to_string().yellow(),
        summary.deletes.to_string().red(),
        plan.unchanged.len()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Lines that differ between the JSON renderings of two objects
fn changed_lines(current: &DerivedObject, updated: &DerivedObject) -> Vec<(ChangeTag, String)> {
    let render = |o: &DerivedObject| {
        o.to_json()
            .and_then(|v| serde_json::to_string_pretty(&v))
            .unwrap_or_default()
    };
    let before = render(current);
    let after = render(updated);

    TextDiff::from_lines(&before, &after)
        .iter_all_changes()
        .filter(|c| c.tag() != ChangeTag::Equal)
        .map(|c| (c.tag(), c.value().trim_end().to_string()))
        .collect()
}

/// Prints one line per finished branch
pub struct ProgressPrinter {
    quiet: bool,
}

impl ProgressPrinter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ProgressCallback for ProgressPrinter {
    fn on_apply_start(&mut self, units: usize) {
        if !self.quiet {
            println!();
            println!(
                "  {} Applying {}...",
                "→".cyan(),
                ui::plural(units, "change", "changes")
            );
        }
    }

    fn on_unit_complete(&mut self, change: &BranchChange, outcome: &BranchOutcome<'_>) {
        match outcome {
            BranchOutcome::Applied if !self.quiet => {
                println!("    {} {}", "✓".green(), change.label());
            }
            BranchOutcome::Applied => {}
            BranchOutcome::Failed(error) => {
                println!("    {} {}: {}", "✗".red(), change.label(), error);
            }
        }
    }

    fn on_apply_complete(&mut self) {}
}

/// Print final summary
pub fn print_summary(summary: &ApplySummary) {
    println!();
    if summary.is_success() {
        println!("  {} Branch objects reconciled", "✓".green().bold());
    } else {
        println!("  {} Reconciled with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} created", ui::plural(summary.created, "object", "objects"));
    }
    if summary.updated > 0 {
        println!("    • {} updated", ui::plural(summary.updated, "object", "objects"));
    }
    if summary.deleted > 0 {
        println!("    • {} deleted", ui::plural(summary.deleted, "object", "objects"));
    }
    if summary.failed > 0 {
        println!(
            "    • {} {}",
            ui::plural(summary.failed, "branch", "branches"),
            "failed".red()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planner::{GitRepository, GitRepositorySpec, ObjectMeta};

    fn source(branch: &str) -> GitRepository {
        GitRepository::new(
            ObjectMeta::new("ns", "src-b-1"),
            GitRepositorySpec::new("https://github.com/org/repo", branch),
        )
    }

    #[test]
    fn test_changed_lines_shows_only_differences() {
        let lines = changed_lines(&source("main").into(), &source("b").into());
        assert_eq!(
            lines,
            vec![
                (ChangeTag::Delete, r#"      "branch": "main""#.to_string()),
                (ChangeTag::Insert, r#"      "branch": "b""#.to_string()),
            ]
        );
    }

    #[test]
    fn test_changed_lines_identical() {
        assert!(changed_lines(&source("main").into(), &source("main").into()).is_empty());
    }
}
