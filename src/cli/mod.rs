mod doctor;

use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;
use tracing::warn;

use crate::core::batch::{BatchSettings, Orchestrator};
use crate::core::config::MigrationConfig;
use crate::core::delivery::{
    BrokerClientExecutor, DeliveryTarget, MarkerClassifier, replay_template,
};
use crate::core::error::MigrationError;
use crate::core::sanitize::FieldSanitizer;
use crate::core::store::SourceDocument;
use crate::core::terminal::{self, GuideSection, print_info, print_step};
use crate::core::workdir::RunDirectory;
use crate::logging;

fn print_help() {
    println!(
        "\n {} {}",
        style("mqmigrate").bold().cyan(),
        env!("CARGO_PKG_VERSION")
    );
    println!(" Replays exported messages into a queue, one broker client call per message.");

    GuideSection::new("Arguments")
        .command("<input.xml>", "Exported message document")
        .command("<queue>", "Target queue name")
        .command("<broker-alias>", "Broker alias known to the broker client")
        .print();

    GuideSection::new("Options")
        .command("--config <file>", "Config file (default: ./mqmigrate.toml)")
        .command("--client <program>", "Broker client program (default: activemq-cli)")
        .command("--work-root <dir>", "Parent of the staging directory")
        .command("--quiet, -q", "Only write the log to the staging directory")
        .command("--help, -h", "Show this help")
        .command("--version, -V", "Show the version")
        .print();

    println!(
        "\n {} {} <input.xml> <queue> <broker-alias> [options]\n",
        style("Usage:").bold(),
        style("mqmigrate").green()
    );
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MigrateArgs {
    pub input: PathBuf,
    pub queue: String,
    pub broker_alias: String,
    pub config: Option<PathBuf>,
    pub client: Option<String>,
    pub work_root: Option<PathBuf>,
    pub quiet: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Invocation {
    Help,
    Version,
    Migrate(MigrateArgs),
}

pub(crate) fn parse_args(
    args: &[String],
    start: usize,
) -> std::result::Result<Invocation, String> {
    let mut positional: Vec<String> = Vec::new();
    let mut config = None;
    let mut client = None;
    let mut work_root = None;
    let mut quiet = false;

    let mut i = start;
    while i < args.len() {
        let value = || {
            args.get(i + 1)
                .cloned()
                .ok_or_else(|| format!("{} needs a value", args[i]))
        };
        match args[i].as_str() {
            "help" | "--help" | "-h" => return Ok(Invocation::Help),
            "--version" | "-V" => return Ok(Invocation::Version),
            "--config" | "-c" => {
                config = Some(PathBuf::from(value()?));
                i += 2;
            }
            "--client" => {
                client = Some(value()?);
                i += 2;
            }
            "--work-root" => {
                work_root = Some(PathBuf::from(value()?));
                i += 2;
            }
            "--quiet" | "-q" => {
                quiet = true;
                i += 1;
            }
            flag if flag.starts_with("--") => return Err(format!("unknown option {}", flag)),
            _ => {
                positional.push(args[i].clone());
                i += 1;
            }
        }
    }

    let [input, queue, broker_alias]: [String; 3] =
        positional.try_into().map_err(|p: Vec<String>| {
            format!(
                "expected <input.xml> <queue> <broker-alias>, got {} argument(s)",
                p.len()
            )
        })?;
    Ok(Invocation::Migrate(MigrateArgs {
        input: PathBuf::from(input),
        queue,
        broker_alias,
        config,
        client,
        work_root,
        quiet,
    }))
}

/// Runs the CLI and returns the process exit code.
pub async fn run_main() -> Result<i32> {
    let args: Vec<String> = std::env::args().collect();
    let migrate = match parse_args(&args, 1) {
        Ok(Invocation::Help) => {
            print_help();
            return Ok(0);
        }
        Ok(Invocation::Version) => {
            println!("mqmigrate {}", env!("CARGO_PKG_VERSION"));
            return Ok(0);
        }
        Ok(Invocation::Migrate(migrate)) => migrate,
        Err(msg) => {
            terminal::print_error(&msg);
            print_help();
            return Ok(1);
        }
    };
    run_migration(migrate).await
}

async fn run_migration(args: MigrateArgs) -> Result<i32> {
    let run_log = logging::init(args.quiet);

    let mut config = MigrationConfig::load(args.config.as_deref()).await?;
    if let Some(client) = args.client {
        config.client.program = client;
    }
    if let Some(root) = args.work_root {
        config.batch.work_root = Some(root);
    }

    doctor::preflight(&config, &args.input)?;

    print_step("Reading message document...");
    let source = SourceDocument::open(&args.input, config.layout.clone()).await?;
    if source.record_count() == 0 {
        return Err(MigrationError::NoRecords {
            path: args.input.clone(),
        }
        .into());
    }
    print_info(&format!(
        "Found {} message(s) in {}",
        source.record_count(),
        args.input.display()
    ));

    let classifier = MarkerClassifier::new(
        config.delivery.success_markers.clone(),
        config.delivery.error_patterns.clone(),
    )
    .context("building the output classifier")?;

    let run_dir = RunDirectory::create(&config.batch.work_root())?;
    if let Err(e) = run_log.attach(&run_dir.run_log_path()) {
        warn!("Run log unavailable: {}", e);
    }
    let executor = BrokerClientExecutor::new(
        &config.client,
        &config.delivery,
        run_dir.path(),
        Box::new(classifier),
    );
    let sanitizer = FieldSanitizer::new(config.sanitize.fields.clone(), config.layout.clone());
    let target = DeliveryTarget {
        queue: args.queue,
        broker_alias: args.broker_alias,
    };

    let run = Orchestrator::new(
        &source,
        &run_dir,
        &sanitizer,
        &executor,
        target.clone(),
        BatchSettings::from(&config),
    )
    .run()
    .await;

    let replay = replay_template(&config.client, run_dir.path());
    let report_path = run_dir.report_path();
    let failed = run.state.failed;
    if failed == 0 {
        run_log.detach();
    }
    let retained = run_dir.finish(failed);
    let report = run.into_report(source.path(), &target, retained, Some(replay));
    if report.is_aborted() {
        warn!(
            "{} of {} message(s) were never attempted",
            report.total - report.attempted,
            report.total
        );
    }
    if report.retained_dir.is_some()
        && let Err(e) = report.write_json(&report_path)
    {
        warn!("Could not write {}: {}", report_path.display(), e);
    }
    run_log.detach();

    terminal::print_report(&report);
    Ok(report.exit_code())
}

#[cfg(test)]
mod tests {
    use super::{Invocation, MigrateArgs, parse_args};
    use std::path::PathBuf;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("mqmigrate")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn parse_args_reads_three_positionals() {
        let parsed = parse_args(&args(&["export.xml", "orders", "local"]), 1).unwrap();
        assert_eq!(
            parsed,
            Invocation::Migrate(MigrateArgs {
                input: PathBuf::from("export.xml"),
                queue: "orders".to_string(),
                broker_alias: "local".to_string(),
                config: None,
                client: None,
                work_root: None,
                quiet: false,
            })
        );
    }

    #[test]
    fn parse_args_reads_options_anywhere() {
        let parsed = parse_args(
            &args(&[
                "--config",
                "m.toml",
                "export.xml",
                "--client",
                "/opt/amq/bin/activemq-cli",
                "orders",
                "-q",
                "local",
                "--work-root",
                "/var/tmp",
            ]),
            1,
        )
        .unwrap();
        let Invocation::Migrate(m) = parsed else {
            panic!("expected migrate invocation");
        };
        assert_eq!(m.config, Some(PathBuf::from("m.toml")));
        assert_eq!(m.client.as_deref(), Some("/opt/amq/bin/activemq-cli"));
        assert_eq!(m.work_root, Some(PathBuf::from("/var/tmp")));
        assert!(m.quiet);
        assert_eq!(m.queue, "orders");
    }

    #[test]
    fn parse_args_rejects_wrong_arity_and_unknown_flags() {
        assert!(parse_args(&args(&["export.xml", "orders"]), 1).is_err());
        assert!(parse_args(&args(&["a", "b", "c", "d"]), 1).is_err());
        assert!(parse_args(&args(&["a", "b", "c", "--bogus"]), 1).is_err());
        assert!(parse_args(&args(&["a", "b", "c", "--client"]), 1).is_err());
    }

    #[test]
    fn parse_args_help_and_version() {
        assert_eq!(parse_args(&args(&["--help"]), 1).unwrap(), Invocation::Help);
        assert_eq!(parse_args(&args(&["-V"]), 1).unwrap(), Invocation::Version);
    }
}
