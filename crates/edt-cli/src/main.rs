use anyhow::Result;
use clap::{Parser, Subcommand};
use edt_pipeline::{Pipeline, PipelineConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "edt-cli")]
#[command(about = "Election date tracker command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Aggregate the jurisdiction-level survey CSV into the state dataset.
    Aggregate,
    /// Scrape SOS calendar pages into sos_scraped.json (network-touching).
    Scrape,
    /// Validate statute rules against scrape results into election_dates.json.
    Validate,
    /// Validate the curated special-elections CSV into special_elections.json.
    Specials,
    /// Run the full offline batch: aggregate, validate, specials.
    Build,
    /// Serve the tool-call contract over HTTP.
    Serve,
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let pipeline = Pipeline::new(PipelineConfig::from_env());

    match cli.command.unwrap_or(Commands::Build) {
        Commands::Aggregate => {
            let stored = pipeline.run_survey().await?;
            println!(
                "survey dataset written: {} ({} bytes, sha256 {})",
                stored.path.display(),
                stored.byte_size,
                stored.content_hash
            );
        }
        Commands::Scrape => {
            let stored = pipeline.run_scrape().await?;
            println!("scrape results written: {}", stored.path.display());
        }
        Commands::Validate => {
            let stored = pipeline.run_validate().await?;
            println!("election dates written: {}", stored.path.display());
        }
        Commands::Specials => {
            let stored = pipeline.run_specials().await?;
            println!("special elections written: {}", stored.path.display());
        }
        Commands::Build => {
            let summary = pipeline.run_build().await?;
            println!(
                "build complete: run_id={} states={} discrepancies={} specials={} survey_states={}",
                summary.run_id,
                summary.states_validated,
                summary.discrepancy_count,
                summary.special_elections,
                summary.survey_states
            );
        }
        Commands::Serve => {
            edt_server::serve_from_env().await?;
        }
    }

    Ok(())
}
