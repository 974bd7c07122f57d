//! dynaschema CLI - Runtime schema inference and self-validating extraction.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dynaschema::models::UnresolvedPolicy;
use dynaschema::{
    Config, ExtractionPipeline, Gateway, JsonlWriter, LLMClient, QuizPipeline, Row,
};
use std::path::{Path, PathBuf};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "dynaschema")]
#[command(version)]
#[command(about = "Infer schemas from text and extract self-validated structured records")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (defaults apply when missing)
    #[arg(short, long, global = true, default_value = "dynaschema.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Infer a schema for a concept and extract records from a text file
    Extract {
        /// Path to the text corpus
        #[arg(long)]
        corpus: PathBuf,

        /// Concept to model (e.g. "user", "job posting")
        #[arg(long)]
        concept: String,

        /// Path to output JSONL file (overrides [output].path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the synthesized JSON Schema before the records
        #[arg(long)]
        show_schema: bool,
    },

    /// Generate self-validated multiple choice questions on a topic
    Quiz {
        /// Topic of the questions
        #[arg(short, long)]
        topic: String,

        /// Number of questions (overrides [quiz].questions)
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Path to output JSONL file (overrides [output].path)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate configuration file
    Validate,

    /// Show example configuration
    Example,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn print_example_config() {
    let example = r#"# dynaschema configuration file

[service]
# API key (can also use OPENAI_API_KEY env var, or "${VAR}" expansion)
# api_key = "${OPENAI_API_KEY}"
base_url = "https://api.openai.com/v1"
timeout_secs = 120
transport_retries = 2
# Set to false for endpoints that reject response_format
structured_outputs = true

[extraction]
inference_model = { id = "gpt-3.5-turbo", temperature = 0.7 }
extraction_model = { id = "gpt-3.5-turbo", temperature = 0.0 }
inference_retries = 2
extraction_retries = 2

[quiz]
generation_model = { id = "gpt-3.5-turbo", temperature = 0.7 }
validation_model = { id = "gpt-3.5-turbo", temperature = 0.0 }
generation_retries = 2
validation_retries = 1
questions = 2
on_unresolved = "skip"  # or "abort"

[output]
# path = "output/records.jsonl"   # stdout when unset
include_usage = true
"#;
    println!("{example}");
}

fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load_or_default(path)
        .with_context(|| format!("Failed to load config from {path:?}"))?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn build_gateway(config: &Config) -> Result<Gateway<LLMClient>> {
    let api_key = config.resolve_api_key();
    if api_key.is_none() {
        warn!(
            env_var = %config.service.api_key_env,
            "No API key configured, sending unauthenticated requests"
        );
    }
    let client = LLMClient::from_config(&config.service, api_key)
        .context("Failed to create LLM client")?;
    Ok(Gateway::new(client))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    // Credentials may live in a local .env file.
    if let Ok(path) = dotenvy::dotenv() {
        info!(path = %path.display(), "Loaded environment file");
    }

    match cli.command {
        Commands::Example => {
            print_example_config();
            return Ok(());
        }

        Commands::Validate => {
            let config = load_config(&cli.config)?;

            info!("Configuration is valid");
            info!("  Endpoint: {}", config.service.base_url);
            info!(
                "  API key: {}",
                if config.resolve_api_key().is_some() {
                    "resolved"
                } else {
                    "not set"
                }
            );
            info!(
                "  Extraction: infer with {} ({} retries), extract with {} ({} retries)",
                config.extraction.inference_model.id,
                config.extraction.inference_retries,
                config.extraction.extraction_model.id,
                config.extraction.extraction_retries
            );
            info!(
                "  Quiz: {} questions, generate with {}, validate with {}, on_unresolved = {:?}",
                config.quiz.questions,
                config.quiz.generation_model.id,
                config.quiz.validation_model.id,
                config.quiz.on_unresolved
            );
            return Ok(());
        }

        Commands::Extract {
            corpus,
            concept,
            output,
            show_schema,
        } => {
            let config = load_config(&cli.config)?;
            let text = std::fs::read_to_string(&corpus)
                .with_context(|| format!("Failed to read corpus {corpus:?}"))?;

            let pipeline = ExtractionPipeline::new(build_gateway(&config)?, config.extraction.clone());
            let extraction = pipeline.infer_and_extract(&text, &concept).await?;

            if show_schema {
                let schema = serde_json::to_string_pretty(&extraction.record_type.json_schema())?;
                eprintln!("{schema}");
            }

            let output = output.or(config.output.path.clone());
            let mut writer = JsonlWriter::open(output.as_deref())?;
            for record in &extraction.records {
                writer.write_row(&Row::new(record))?;
            }
            writer.flush()?;

            eprintln!("\n=== Extraction Complete ===");
            eprintln!("Record type: {}", extraction.record_type.name());
            eprintln!(
                "Fields:      {}",
                extraction.record_type.field_names().collect::<Vec<_>>().join(", ")
            );
            eprintln!("Records:     {}", extraction.records.len());
            eprintln!("Calls:       {}", extraction.service_calls);
            eprintln!("Tokens:      {}", extraction.usage.total_tokens);
            if let Some(path) = &output {
                eprintln!("Output:      {path:?}");
            }
        }

        Commands::Quiz {
            topic,
            count,
            output,
        } => {
            let config = load_config(&cli.config)?;
            let count = count.unwrap_or(config.quiz.questions);

            let pipeline = QuizPipeline::new(build_gateway(&config)?, config.quiz.clone())
                .with_progress(true);
            let run = pipeline.run(&topic, count).await?;

            let output = output.or(config.output.path.clone());
            let mut writer = JsonlWriter::open(output.as_deref())?;
            for item in &run.items {
                let row = Row::new(&item.question);
                let row = if config.output.include_usage {
                    row.with_usage(item.usage)
                } else {
                    row
                };
                writer.write_row(&row)?;
            }
            writer.flush()?;

            let stats = &run.stats;
            eprintln!("\n=== Quiz Generation Complete ===");
            eprintln!("Requested:   {}", stats.requested);
            eprintln!("Produced:    {}", stats.produced);
            eprintln!("Skipped:     {}", stats.skipped);
            eprintln!("Replaced:    {} wrong answers", stats.answers_replaced);
            eprintln!("Calls:       {}", stats.service_calls);
            eprintln!(
                "Tokens:      {} ({} prompt, {} completion)",
                stats.usage.total_tokens, stats.usage.prompt_tokens, stats.usage.completion_tokens
            );
            eprintln!("Throughput:  {:.0}/hr", stats.throughput_per_hour);
            eprintln!("Runtime:     {:.1}s", stats.runtime_secs);
            if config.quiz.on_unresolved == UnresolvedPolicy::Skip {
                for (index, error) in &run.skipped {
                    eprintln!("  skipped #{}: {error}", index + 1);
                }
            }
            if let Some(path) = &output {
                eprintln!("Output:      {path:?}");
            }
            if let Some(index) = run.aborted.as_ref().map(|(index, _)| *index) {
                run.into_result()
                    .with_context(|| format!("Quiz run aborted at question {}", index + 1))?;
            }
        }
    }

    Ok(())
}
