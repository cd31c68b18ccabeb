//! `aps`: operational command-line entry point exercising the pipeline
//! end to end, from raw source text to a translated, optionally rendered
//! document. Mirrors the teacher's habit of shipping one thin `clap`
//! binary over the library crate rather than duplicating logic in `main`.

use aps_core::ast::{AstBuilder, DocumentMetadata};
use aps_core::render::{OutputFormat, Renderer, Stylesheet, TemplateCache};
use aps_core::semantic::extract_semantic_structure;
use aps_core::{latex, Config, Orchestrator, OrchestratorRequest};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Format {
    Docx,
    Pdf,
    Epub,
}

impl From<Format> for OutputFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Docx => OutputFormat::Docx,
            Format::Pdf => OutputFormat::Pdf,
            Format::Epub => OutputFormat::Epub,
        }
    }
}

/// Translate a document through the AI Publishing System pipeline.
#[derive(Parser, Debug)]
#[command(name = "aps", about = "Translate and optionally render a document")]
struct Args {
    /// Path to the input text file. Reads stdin when omitted.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Source language tag (overrides the config default).
    #[arg(long)]
    source_lang: Option<String>,

    /// Target language tag (overrides the config default).
    #[arg(long)]
    target_lang: Option<String>,

    /// Path to a TOML config file. Falls back to built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Render the translated text to this container format instead of
    /// printing plain text.
    #[arg(long, value_enum)]
    format: Option<Format>,

    /// Where to write the rendered output. Required when `--format` is set.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Emit newline-delimited JSON logs instead of the default text format.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    aps_core::logging::init_with(args.json_logs);

    let mut config = match &args.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::default(),
    };
    if let Some(lang) = &args.source_lang {
        config.source_lang = lang.clone();
    }
    if let Some(lang) = &args.target_lang {
        config.target_lang = lang.clone();
    }

    let text = match &args.input {
        Some(path) if latex::detect_latex_source(&path.display().to_string()) => {
            let extract_dir = tempfile::tempdir()
                .map_err(|e| anyhow::anyhow!("creating LaTeX extraction dir: {e}"))?;
            let main_tex = latex::ingest(path, extract_dir.path())
                .map_err(|e| anyhow::anyhow!("ingesting LaTeX input {}: {e}", path.display()))?;
            std::fs::read_to_string(&main_tex)
                .map_err(|e| anyhow::anyhow!("reading ingested LaTeX {}: {e}", main_tex.display()))?
        }
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading input {}: {e}", path.display()))?,
        None => std::io::read_to_string(std::io::stdin())
            .map_err(|e| anyhow::anyhow!("reading stdin: {e}"))?,
    };

    let source_lang = config.source_lang.clone();
    let target_lang = config.target_lang.clone();
    let request = OrchestratorRequest {
        text,
        source_lang,
        target_lang,
    };

    let orchestrator = Orchestrator::new(config, Arc::new(aps_core::interfaces::MockTranslator));
    let result = orchestrator.run(request, None).await?;
    let aggregated = result
        .aggregated
        .ok_or_else(|| anyhow::anyhow!("job completed with no aggregated result"))?;

    tracing::info!(
        job_id = result.job_id.as_str(),
        elapsed_secs = result.elapsed_secs,
        success_rate = aggregated.success_rate(),
        "translation complete"
    );

    match args.format {
        None => {
            println!("{}", aggregated.merged_text);
        }
        Some(format) => {
            let output = args
                .output
                .ok_or_else(|| anyhow::anyhow!("--output is required when --format is set"))?;

            let paragraphs: Vec<String> = aggregated
                .merged_text
                .split("\n\n")
                .map(|p| p.to_string())
                .filter(|p| !p.trim().is_empty())
                .collect();
            let nodes = extract_semantic_structure(&paragraphs);
            let ast = AstBuilder::new().build(&nodes, DocumentMetadata::default(), false);

            let templates = TemplateCache::with_builtin_default();
            let stylesheet = Stylesheet::default();
            let renderer = Renderer::new(&templates, &stylesheet);
            let bytes = renderer.render(&ast, format.into(), "default")?;

            std::fs::write(&output, bytes)
                .map_err(|e| anyhow::anyhow!("writing output {}: {e}", output.display()))?;
            tracing::info!(path = %output.display(), "wrote rendered output");
        }
    }

    Ok(())
}
