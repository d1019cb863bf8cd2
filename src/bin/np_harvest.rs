use std::fs;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;

use np_harvest::app::{App, HarvestResult, ScaffoldResult};
use np_harvest::config::{ConfigLoader, ConfigOverrides, HarvestConfig};
use np_harvest::domain::read_genus_list;
use np_harvest::error::HarvestError;
use np_harvest::executor::QueryExecutor;
use np_harvest::logging::{TracingSink, init_logging};
use np_harvest::output::JsonOutput;
use np_harvest::query::QueryTemplate;
use np_harvest::sparql::SparqlHttpClient;

#[derive(Parser)]
#[command(name = "np-harvest")]
#[command(about = "Harvest natural products reported per plant genus from Wikidata")]
#[command(version, author)]
struct Cli {
    /// Path to the JSON config (defaults to np-harvest.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print the run summary as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Query every genus missing from the output table (default)")]
    Genera(GeneraArgs),
    #[command(about = "Run the configured scaffold queries and clean their results")]
    Scaffolds,
}

#[derive(Args, Clone, Default)]
struct GeneraArgs {
    /// Genus list, one genus or phylogeny leaf label per line
    #[arg(long)]
    genera: Option<Utf8PathBuf>,

    /// SPARQL template containing a {genus} placeholder
    #[arg(long)]
    template: Option<Utf8PathBuf>,

    #[arg(long)]
    output: Option<Utf8PathBuf>,

    #[arg(long)]
    log_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    concurrency: Option<usize>,

    #[arg(long)]
    max_attempts: Option<u32>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        HarvestError::InvalidGenus(_)
        | HarvestError::DuplicateGenus(_)
        | HarvestError::Template(_)
        | HarvestError::ConfigRead(_)
        | HarvestError::ConfigParse(_)
        | HarvestError::InvalidConfig(_)
        | HarvestError::MissingColumn(_) => 2,
        HarvestError::SparqlHttp(_)
        | HarvestError::SparqlStatus { .. }
        | HarvestError::MaxAttemptsReached
        | HarvestError::MalformedResponse(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Commands::Genera(GeneraArgs::default()));
    let overrides = match &command {
        Commands::Genera(args) => ConfigOverrides {
            genera_file: args.genera.clone(),
            query_template: args.template.clone(),
            output_file: args.output.clone(),
            log_dir: args.log_dir.clone(),
            concurrency: args.concurrency,
            max_attempts: args.max_attempts,
        },
        Commands::Scaffolds => ConfigOverrides::default(),
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?.apply(overrides)?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let log_path = init_logging(&config.log_dir, &timestamp)?;
    tracing::info!("Logging to {log_path}");

    let client = SparqlHttpClient::new(&config.endpoint, config.timeout)?;
    match command {
        Commands::Genera(_) => run_genera(config, client, &timestamp, cli.json),
        Commands::Scaffolds => run_scaffolds(config, client, cli.json),
    }
}

fn run_genera(
    config: HarvestConfig,
    client: SparqlHttpClient,
    timestamp: &str,
    json: bool,
) -> miette::Result<()> {
    let genera = read_genus_list(&config.genera_file)?;
    let template_text = fs::read_to_string(config.query_template.as_std_path()).map_err(|err| {
        HarvestError::Template(format!("read {}: {err}", config.query_template))
    })?;
    let template = QueryTemplate::parse(&template_text)?;

    let app = App::new(config, QueryExecutor::new(client));
    let result = app.harvest_genera(&genera, &template, timestamp, &TracingSink)?;
    if json {
        JsonOutput::print_harvest(&result).into_diagnostic()?;
    } else {
        print_harvest_summary(&result);
    }
    Ok(())
}

fn run_scaffolds(
    config: HarvestConfig,
    client: SparqlHttpClient,
    json: bool,
) -> miette::Result<()> {
    if config.scaffolds.is_empty() {
        tracing::warn!("No scaffold queries configured");
    }
    let app = App::new(config, QueryExecutor::new(client));
    let result = app.harvest_scaffolds(&TracingSink);
    if json {
        JsonOutput::print_scaffolds(&result).into_diagnostic()?;
    } else {
        print_scaffold_summary(&result);
    }
    Ok(())
}

fn print_harvest_summary(result: &HarvestResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}np-harvest summary{reset}");
    println!(
        "{green}Genera requested: {}, queried this run: {}, succeeded: {}{reset}",
        result.requested, result.queried, result.succeeded
    );
    println!("{green}Rows in output table: {}{reset}", result.rows);
    if let Some(path) = &result.output_path {
        println!("{green}   output: {path}{reset}");
    }
    if result.failures.is_empty() {
        println!("{green}Failures: 0{reset}");
        return;
    }
    println!("{yellow}Failures: {}{reset}", result.failures.len());
    for failure in &result.failures {
        println!("{yellow}   {}: {}{reset}", failure.genus, failure.reason);
    }
    if let Some(path) = &result.failure_path {
        println!("{yellow}   failure list: {path}{reset}");
    }
}

fn print_scaffold_summary(result: &ScaffoldResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}np-harvest scaffolds{reset}");
    for item in &result.written {
        println!("{green}{}{reset}", item.summary.describe());
        println!("{green}   output: {}{reset}", item.output_path);
    }
    for skip in &result.skipped {
        println!("{yellow}skipped {}: {}{reset}", skip.name, skip.reason);
    }
}
