//! Main module for the patient RAG CLI application (prag).
//!
//! Handles command parsing, configuration resolution and initialization, then
//! invokes the requested command.
//!
//! # Examples
//!
//! ```sh
//! prag generate --count 100
//! prag search "patients on inhalers" -k 3
//! GROQ_API_KEY=gsk_... prag ask "Which patients have uncontrolled blood pressure?"
//! ```

use clap::Parser;
use crossterm::{
    ExecutableCommand,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
};
use once_cell::sync::OnceCell;
use std::{
    error::Error,
    fs,
    io::{BufRead, Write, stdin, stdout},
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use patient_rag::{
    api::OpenAiCompleter,
    commands::{Cli, Commands},
    config::{RagConfig, load_config},
    config_dir,
    embeddings::{Embedder, load_embedder},
    error::{RagError, Result},
    generator::PatientGenerator,
    models::save_records,
    pipeline::{Answer, Retrieval, RetrievalPipeline},
    template::{DEFAULT_TEMPLATE_NAME, PromptTemplate, resolve_template},
    vector_store::{VectorIndex, open_index},
};

type Pipeline = RetrievalPipeline<Box<dyn Embedder>, Box<dyn VectorIndex>, OpenAiCompleter>;

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> std::result::Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .init();
    });
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(cli))?;
    Ok(())
}

/// Layer config file, environment and CLI flags over the defaults.
fn resolve_config(cli: &Cli) -> Result<RagConfig> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => match config_dir().map(|dir| dir.join("config.yaml")) {
            Ok(path) if path.is_file() => load_config(&path)?,
            _ => RagConfig::default(),
        },
    };
    let mut config = config.apply_env()?;

    if let Some(records) = &cli.records {
        config.patient_data_path = records.display().to_string();
    }
    config.validate()?;
    debug!("Config resolved: {:?}", RagConfig { api_key: "<redacted>".into(), ..config.clone() });
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;

    match cli.command {
        Commands::Init => init(),
        Commands::Generate {
            count,
            seed,
            output,
        } => generate(&config, count, seed, output),
        Commands::Search { query, k } => {
            let pipeline = build_pipeline(&config)?;
            let retrieval = pipeline.retrieve(&query, k.unwrap_or(pipeline.top_k()))?;
            print_hits(&retrieval)?;
            Ok(())
        }
        Commands::Ask { question, k } => {
            config.require_api_key()?;
            let pipeline = build_pipeline(&config)?;
            answer_question(&pipeline, &question, k).await
        }
        Commands::Interactive { k } => {
            config.require_api_key()?;
            let pipeline = build_pipeline(&config)?;
            interactive(&pipeline, k).await
        }
    }
}

/// Load the embedder and template, then ingest the configured record file.
fn build_pipeline(config: &RagConfig) -> Result<Pipeline> {
    let embedder = load_embedder(&config.embedding_model, config.vector_size)?;
    let template = resolve_template(config.template.as_deref())?;

    let mut pipeline = RetrievalPipeline::new(
        config,
        embedder,
        open_index(config.index_backend),
        OpenAiCompleter::new(config),
    )?
    .with_template(template);

    pipeline.ingest_file(&config.patient_data_path)?;
    Ok(pipeline)
}

async fn answer_question(pipeline: &Pipeline, question: &str, k: Option<usize>) -> Result<()> {
    let retrieval = pipeline.retrieve(question, k.unwrap_or(pipeline.top_k()))?;
    let answer = pipeline.answer(question, &retrieval.hits).await?;
    print_answer(&retrieval, &answer)
}

async fn interactive(pipeline: &Pipeline, k: Option<usize>) -> Result<()> {
    let mut out = stdout();
    let mut lines = stdin().lock().lines();

    loop {
        out.execute(SetForegroundColor(Color::Green))
            .and_then(|o| o.execute(Print("\nYou: ")))
            .and_then(|o| o.execute(ResetColor))
            .map_err(console_error)?;
        out.flush().map_err(console_error)?;

        let Some(line) = lines.next() else { break };
        let question = line.map_err(console_error)?;
        let question = question.trim();
        if question.eq_ignore_ascii_case("exit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        if let Err(e) = answer_question(pipeline, question, k).await {
            warn!("Question failed: {e}");
            eprintln!("Error: {e}");
        }
    }
    Ok(())
}

fn console_error(err: std::io::Error) -> RagError {
    RagError::io("<console>", err)
}

fn print_hits(retrieval: &Retrieval) -> Result<()> {
    let mut out = stdout();
    for (rank, hit) in retrieval.hits.iter().enumerate() {
        out.execute(SetForegroundColor(Color::Cyan))
            .and_then(|o| o.execute(SetAttribute(Attribute::Bold)))
            .and_then(|o| {
                o.execute(Print(format!(
                    "{}. {} (score {:.3})\n",
                    rank + 1,
                    hit.payload.patient_id,
                    hit.score
                )))
            })
            .and_then(|o| o.execute(SetAttribute(Attribute::Reset)))
            .and_then(|o| o.execute(ResetColor))
            .map_err(console_error)?;
        writeln!(out, "   {}", hit.payload.text).map_err(console_error)?;
    }
    writeln!(
        out,
        "\n{} result(s), retrieval {:.1} ms",
        retrieval.hits.len(),
        retrieval.latency_ms
    )
    .map_err(console_error)?;
    Ok(())
}

fn print_answer(retrieval: &Retrieval, answer: &Answer) -> Result<()> {
    let mut out = stdout();
    out.execute(SetForegroundColor(Color::Blue))
        .and_then(|o| o.execute(SetAttribute(Attribute::Bold)))
        .and_then(|o| o.execute(Print(format!("{}\n", answer.text.trim()))))
        .and_then(|o| o.execute(SetAttribute(Attribute::Reset)))
        .and_then(|o| o.execute(ResetColor))
        .map_err(console_error)?;

    let cited: Vec<&str> = retrieval
        .hits
        .iter()
        .map(|hit| hit.payload.patient_id.as_str())
        .collect();
    writeln!(
        out,
        "\ncontext: [{}] | retrieval {:.1} ms | generation {:.1} ms",
        cited.join(", "),
        retrieval.latency_ms,
        answer.latency_ms
    )
    .map_err(console_error)?;
    Ok(())
}

fn generate(config: &RagConfig, count: usize, seed: u64, output: Option<PathBuf>) -> Result<()> {
    let output = output.unwrap_or_else(|| PathBuf::from(&config.patient_data_path));
    let patients = PatientGenerator::new(seed).generate(count);
    save_records(&output, &patients)?;

    info!("Generated {count} patient records");
    println!("Generated {count} patient records");
    println!("Saved to {}", output.display());

    if let Some(first) = patients.first() {
        let preview = serde_json::to_string_pretty(first)?;
        let cut: String = preview.chars().take(500).collect();
        println!("\nSample patient record:\n{cut}...");
    }
    Ok(())
}

/// Write a default `config.yaml` and prompt template into the config directory.
///
/// Existing files are left untouched.
fn init() -> Result<()> {
    let dir = config_dir()?;
    let templates = dir.join("templates");
    info!("Creating template config directory: {}", templates.display());
    fs::create_dir_all(&templates).map_err(|e| RagError::io(&templates, e))?;

    let template_path = templates.join(format!("{DEFAULT_TEMPLATE_NAME}.yaml"));
    write_if_absent(&template_path, &serde_yaml::to_string(&PromptTemplate::default())?)?;

    let config_path = dir.join("config.yaml");
    write_if_absent(&config_path, &serde_yaml::to_string(&RagConfig::default())?)?;
    Ok(())
}

fn write_if_absent(path: &Path, contents: &str) -> Result<()> {
    if path.exists() {
        warn!("{} already exists, leaving it as is", path.display());
        return Ok(());
    }
    info!("Creating {}", path.display());
    fs::write(path, contents).map_err(|e| RagError::io(path, e))
}
