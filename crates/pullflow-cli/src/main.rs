//! pullflow CLI: run, validate and explain YAML pipelines.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pullflow_core::config::EngineConfig;
use pullflow_dsl::{parse_pipeline, Pipeline};
use pullflow_exec::{Engine, Resolution};
use pullflow_reactive::Context;

#[derive(Parser)]
#[command(name = "pullflow")]
#[command(about = "pullflow: pull-based streaming pipelines with termination detection", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a pipeline from a YAML file
    Run {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Contexts to spread the nodes across (overrides config)
        #[arg(long)]
        contexts: Option<usize>,

        /// Hard cap on dispatched signals (overrides config)
        #[arg(long)]
        max_steps: Option<u64>,

        /// Print every monitor event the run produced
        #[arg(long)]
        record_events: bool,
    },

    /// Validate a pipeline YAML file
    Validate {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,
    },

    /// Show how a pipeline is wired
    Explain {
        /// Path to the pipeline YAML file
        #[arg(short, long)]
        pipeline: PathBuf,

        /// Contexts to spread the nodes across
        #[arg(long)]
        contexts: Option<usize>,
    },
}

/// Command-line settings; these win over the document and the environment.
#[derive(Debug, Clone, Default)]
struct Overrides {
    contexts: Option<usize>,
    max_steps: Option<u64>,
    record_events: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            pipeline,
            contexts,
            max_steps,
            record_events,
        } => run_pipeline(
            &pipeline,
            &Overrides {
                contexts,
                max_steps,
                record_events,
            },
        ),
        Commands::Validate { pipeline } => {
            validate_pipeline(&pipeline).map(|()| println!("✓ Pipeline is valid"))
        }
        Commands::Explain { pipeline, contexts } => explain_pipeline(&pipeline, contexts),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path) -> Result<Pipeline, Box<dyn std::error::Error>> {
    let yaml_content = fs::read_to_string(path)?;
    Ok(parse_pipeline(&yaml_content)?)
}

fn run_pipeline(path: &Path, overrides: &Overrides) -> Result<(), Box<dyn std::error::Error>> {
    let doc = load(path)?;
    let config = layer_config(EngineConfig::from_env(), &doc, overrides);
    tracing::debug!(?config, "effective configuration");

    let res = execute(&doc, config)?;
    let report = &res.report;

    println!("answers: {:?}", res.answers);
    println!("✓ Pipeline executed");
    println!("  Answers: {}", report.answers);
    if report.terminated {
        println!("  Verdict: terminated");
    } else {
        println!(
            "  Verdict: idle without termination (outstanding answers {}, open paths {})",
            report.ledger.answers, report.ledger.frontiers
        );
    }
    println!("  Steps: {}", report.steps);
    println!("  Duration: {}ms", report.duration_ms());
    if let Some(hash) = report.plan_hash {
        println!("  Plan hash: {hash}");
    }
    if !res.journal.is_empty() {
        println!("  Events:");
        for entry in &res.journal {
            println!("    {:<8} {}", entry.node, entry.event);
        }
    }
    Ok(())
}

/// Wire `doc` across `config.contexts` contexts and run it to idle.
fn execute(doc: &Pipeline, config: EngineConfig) -> Result<Resolution<i64>, Box<dyn std::error::Error>> {
    let contexts = config.contexts;
    let limit = config.answer_limit;
    let mut engine: Engine<i64> = Engine::new(config)?;
    let execution = engine.next_execution();
    for _ in 0..contexts {
        engine.scheduler_mut().add_context();
    }

    let instance = {
        let mut open: Vec<&mut Context<i64>> = engine.scheduler_mut().contexts_mut().collect();
        doc.instantiate(&mut open, execution, limit)?
    };
    let mut res = engine.run(execution, &instance.answers)?;
    res.report.plan_hash = Some(doc.hash()?);
    Ok(res)
}

fn validate_pipeline(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let _ = load(path)?;
    Ok(())
}

fn explain_pipeline(path: &Path, contexts: Option<usize>) -> Result<(), Box<dyn std::error::Error>> {
    let doc = load(path)?;
    let config = layer_config(
        EngineConfig::from_env(),
        &doc,
        &Overrides {
            contexts,
            ..Overrides::default()
        },
    );

    println!("Pipeline Wiring");
    println!("===============");
    println!();
    println!("Contexts: {}", config.contexts);
    println!("Nodes: {}", doc.nodes.len());
    println!();
    print!("{}", doc.explain(config.contexts));
    Ok(())
}

/// Environment-derived `base`, then the document's `config:`, then flags.
fn layer_config(mut config: EngineConfig, doc: &Pipeline, overrides: &Overrides) -> EngineConfig {
    if let Some(from_doc) = &doc.config {
        from_doc.apply(&mut config);
    }
    if let Some(n) = overrides.contexts {
        config.contexts = n;
    }
    if overrides.max_steps.is_some() {
        config.max_total_steps = overrides.max_steps;
    }
    if overrides.record_events {
        config.record_events = true;
    }
    config
}
