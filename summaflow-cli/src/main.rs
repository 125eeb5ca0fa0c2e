//! Summaflow CLI: runs the summarization training-data pipeline.

use clap::Parser;
use std::path::{Path, PathBuf};
use summaflow_core::config::{CONFIG_ENV_PREFIX, ConfigDocument, load_document};
use summaflow_core::{ConfigurationManager, ProjectLayout, RunContext};
use summaflow_ml::TrainingPipeline;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Summaflow: dataset ingestion, splitting and tokenization for summarization models
#[derive(Parser, Debug)]
#[command(name = "summaflow", version, about, long_about = None)]
struct Cli {
    /// Project root containing config/, artifacts/, data/ and logs/
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors to stderr
    #[arg(short, long)]
    quiet: bool,

    /// Do not write the JSON run log under logs/<timestamp>/
    #[arg(long)]
    no_log_file: bool,

    /// Subcommand (defaults to `run`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Run ingestion followed by transformation
    Run,
    /// Run the ingestion stage only
    Ingest,
    /// Print the derived stage configurations and exit
    ShowConfig,
}

fn stderr_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Whether this run keeps a local JSON log. It does when either backup leg
/// is on, since the object-storage mirror is taken from the local copy. An
/// unreadable config keeps the log so the failure is recorded.
fn wants_log_file(layout: &ProjectLayout) -> bool {
    match load_document::<ConfigDocument>(&layout.config_path(), CONFIG_ENV_PREFIX) {
        Ok(doc) => doc.data_backup.local_enabled || doc.data_backup.s3_enabled,
        Err(_) => true,
    }
}

/// Install the stderr layer and, when `log_dir` is given, a JSON file layer
/// writing `<log_dir>/<timestamp>.log`.
fn init_tracing(
    filter: &str,
    log_dir: Option<&Path>,
    run: &RunContext,
) -> anyhow::Result<Option<WorkerGuard>> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let (json_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, format!("{run}.log"));
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_file(true)
                .with_line_number(true)
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();
    Ok(guard)
}

fn show_config(run: RunContext, layout: ProjectLayout) -> anyhow::Result<()> {
    let manager = ConfigurationManager::new(run, layout)?;
    println!("# data_ingestion");
    println!("{}", serde_yaml::to_string(&manager.data_ingestion_config()?)?);
    println!("# data_transformation");
    println!(
        "{}",
        serde_yaml::to_string(&manager.data_transformation_config()?)?
    );
    if manager.config_document().data_backup.s3_enabled {
        println!("# s3_handler");
        println!("{}", serde_yaml::to_string(&manager.s3_handler_config()?)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (AWS credentials, AWS_REGION)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);
    let run = RunContext::new();
    let layout = ProjectLayout::rooted_at(&cli.root);

    let log_dir = (!cli.no_log_file
        && command != Commands::ShowConfig
        && wants_log_file(&layout))
        .then(|| layout.run_logs_dir(&run));
    let _guard = init_tracing(
        stderr_filter(cli.verbose, cli.quiet),
        log_dir.as_deref(),
        &run,
    )?;

    match command {
        Commands::ShowConfig => show_config(run, layout)?,
        Commands::Ingest => {
            let pipeline = TrainingPipeline::new(run, layout)?;
            let artifact = pipeline.ingest().await?;
            println!("{artifact}");
        }
        Commands::Run => {
            let pipeline = TrainingPipeline::new(run, layout)?;
            let outcome = pipeline.run().await?;
            println!("{}", outcome.ingestion);
            match &outcome.transformation {
                Some(artifact) => println!("{artifact}"),
                None => println!("Transformation skipped: no ingested data"),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_command_is_none() {
        let cli = Cli::try_parse_from(["summaflow"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.root, PathBuf::from("."));
    }

    #[test]
    fn test_subcommands_and_flags() {
        let cli = Cli::try_parse_from([
            "summaflow",
            "--root",
            "/srv/proj",
            "-vv",
            "--no-log-file",
            "ingest",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(Commands::Ingest));
        assert_eq!(cli.verbose, 2);
        assert!(cli.no_log_file);
        let cli = Cli::try_parse_from(["summaflow", "show-config"]).unwrap();
        assert_eq!(cli.command, Some(Commands::ShowConfig));
    }

    fn layout_with_backup(dir: &Path, local: bool, s3: bool) -> ProjectLayout {
        let layout = ProjectLayout::rooted_at(dir);
        std::fs::create_dir_all(&layout.config_dir).unwrap();
        std::fs::write(
            layout.config_path(),
            format!(
                "data_ingestion:\n  source_URL: http://localhost/d.zip\n  raw_data_filename: d.zip\n  ingested_data_filename: d.csv\ndata_backup:\n  local_enabled: {local}\n  s3_enabled: {s3}\ndata_transformation:\n  train_filename: train.csv\n  val_filename: val.csv\n  test_filename: test.csv\n"
            ),
        )
        .unwrap();
        layout
    }

    #[test]
    fn test_log_file_follows_backup_legs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!wants_log_file(&layout_with_backup(dir.path(), false, false)));
        assert!(wants_log_file(&layout_with_backup(dir.path(), true, false)));
        assert!(wants_log_file(&layout_with_backup(dir.path(), false, true)));
    }

    #[test]
    fn test_unreadable_config_keeps_log_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(wants_log_file(&ProjectLayout::rooted_at(dir.path())));
    }

    #[test]
    fn test_stderr_filter() {
        assert_eq!(stderr_filter(0, true), "error");
        assert_eq!(stderr_filter(0, false), "info");
        assert_eq!(stderr_filter(1, true), "debug");
        assert_eq!(stderr_filter(5, false), "trace");
    }
}
