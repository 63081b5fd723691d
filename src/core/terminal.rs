use console::{Emoji, style};

use crate::core::batch::BatchReport;

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_step(step: &str) {
    println!("{} {}", SPARKLE, style(step).bold());
}

/// A titled block of `name  description` rows, used by the help screen.
pub struct GuideSection {
    title: String,
    rows: Vec<(String, String)>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.rows.push((name.to_string(), description.to_string()));
        self
    }

    pub fn print(&self) {
        println!("\n {}", style(&self.title).bold().underlined());
        let width = self.rows.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
        for (name, description) in &self.rows {
            println!(
                "   {:<width$}  {}",
                style(name).green(),
                description,
                width = width
            );
        }
    }
}

pub fn print_report(report: &BatchReport) {
    println!();
    print_step("Migration report");
    print_status("Source", &report.source.display().to_string());
    print_status(
        "Target",
        &format!("{} via {}", report.queue, report.broker_alias),
    );
    print_status("Total", &report.total.to_string());
    print_status("Attempted", &report.attempted.to_string());
    print_status("Succeeded", &report.succeeded.to_string());
    print_status("Failed", &report.failed.to_string());
    print_status("Success rate", &format!("{:.1}%", report.success_rate()));

    if let Some(at) = report.aborted_at {
        print_warn(&format!(
            "Run aborted after message #{} of {}: too many consecutive failures",
            at, report.total
        ));
    }

    if report.failed == 0 {
        print_success("All messages delivered.");
        return;
    }

    print_error(&format!("{} message(s) failed.", report.failed));
    for failure in &report.failures {
        let log = failure
            .log_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "   #{:<5} {:<9} {}  {}",
            failure.ordinal,
            failure.stage.as_str(),
            style(&failure.reason).red(),
            style(log).dim()
        );
    }
    if let Some(dir) = &report.retained_dir {
        println!(
            "\n  {} {}: {}",
            FOLDER,
            style("Staging directory kept").bold(),
            style(dir.display()).underlined().cyan()
        );
    }
    if let Some(replay) = &report.replay_command {
        print_info("Replay a single message (replace <N> with its number):");
        println!("     {}", style(replay).green());
    }
}
