use colored::Colorize;
use stackgraph::{RunSummary, Status, StatusCode, StatusWatcher};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Prints every stack status change as it happens
pub struct ConsoleWatcher;

impl StatusWatcher for ConsoleWatcher {
    fn on_status_change(&self, step: &str, _old: &Status, new: &Status) {
        let reason = new.reason().unwrap_or_default();
        match new.code() {
            StatusCode::Pending => {}
            StatusCode::Submitted => println!("  {} {step} {}", "…".blue(), reason.dimmed()),
            StatusCode::Complete => println!("  {} {step} {}", "✓".green(), reason.dimmed()),
            StatusCode::Skipped => println!("  {} {step} {}", "-".dimmed(), reason.dimmed()),
            StatusCode::Failed => eprintln!("  {} {step} {}", "✗".red(), reason.red()),
        }
    }
}

/// One-line tally of a run, e.g. `3 complete, 1 skipped, 1 failed`
pub fn summary_line(summary: &RunSummary) -> String {
    let mut parts = vec![format!("{} complete", summary.complete.len())];
    if !summary.skipped.is_empty() {
        parts.push(format!("{} skipped", summary.skipped.len()));
    }
    if !summary.failed.is_empty() {
        parts.push(format!("{} failed", summary.failed.len()));
    }
    if !summary.pending.is_empty() {
        parts.push(format!("{} pending", summary.pending.len()));
    }
    parts.join(", ")
}

/// Print the outcome of a deploy or destroy
pub fn run_summary(verb: &str, summary: &RunSummary) {
    section("Summary");
    kv("stacks", &summary.total().to_string());
    if !summary.skipped.is_empty() {
        kv("skipped", &summary.skipped.join(", "));
    }
    for name in &summary.failed {
        println!("  {} {}", "✗".red(), name.red());
    }
    if !summary.pending.is_empty() {
        kv("not started", &summary.pending.join(", "));
    }
    println!();

    let line = summary_line(summary);
    if summary.cancelled {
        warn(&format!("{verb} interrupted: {line}"));
    } else if summary.is_success() {
        success(&format!("{verb} finished: {line}"));
    } else {
        error(&format!("{verb} failed: {line}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_line_only_lists_nonzero() {
        let summary = RunSummary {
            complete: vec!["vpc".into(), "bastion".into()],
            failed: vec!["dns".into()],
            ..RunSummary::default()
        };
        assert_eq!(summary_line(&summary), "2 complete, 1 failed");
    }

    #[test]
    fn test_summary_line_empty_run() {
        assert_eq!(summary_line(&RunSummary::default()), "0 complete");
    }
}
