use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use docqa_core::config::{resolve_with_base, Config, Settings};
use docqa_core::data_processor::DataProcessor;
use docqa_core::extract::PdfToText;
use docqa_core::traits::Embedder;
use docqa_core::types::QueryResponse;
use docqa_embed::get_default_embedder;
use docqa_rag::{
    prepare_index, AnswerOrchestrator, DocumentSource, IndexPolicy, Models, OllamaGenerator,
    RagPipeline, Retriever,
};
use docqa_vector::VectorIndex;

const CONTEXT_PREVIEW_CHARS: usize = 500;

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "Ask questions about a folder of PDF documents")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the index, or load it if one already exists
    Index {
        /// Re-ingest the PDFs and replace the existing index
        #[arg(long)]
        rebuild: bool,

        #[arg(long, value_name = "DIR")]
        pdf_dir: Option<PathBuf>,

        #[arg(long, value_name = "DIR")]
        index_dir: Option<PathBuf>,
    },
    /// Answer a single question
    Ask {
        question: String,

        /// Number of chunks to retrieve
        #[arg(long)]
        k: Option<usize>,

        /// Print the retrieved chunks
        #[arg(long, default_value_t = false)]
        show_context: bool,
    },
    /// Interactive question loop
    Chat {
        /// Print the retrieved chunks after each answer
        #[arg(long, default_value_t = false)]
        show_context: bool,
    },
}

/// Settings plus the directory relative paths are resolved against.
pub struct Context {
    settings: Settings,
    base: PathBuf,
}

impl Context {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = config_path.map_or_else(|| PathBuf::from("config.toml"), Path::to_path_buf);
        let settings = Config::load_from(&path)?.settings()?;
        let base = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::env::current_dir()?,
        };
        Ok(Self { settings, base })
    }

    fn pdf_dir(&self, overridden: Option<PathBuf>) -> PathBuf {
        match overridden {
            Some(p) => resolve_with_base(&self.base, p.to_string_lossy()),
            None => self.settings.data.pdf_dir(&self.base),
        }
    }

    fn index_dir(&self, overridden: Option<PathBuf>) -> PathBuf {
        match overridden {
            Some(p) => resolve_with_base(&self.base, p.to_string_lossy()),
            None => self.settings.data.index_dir(&self.base),
        }
    }

    fn prepare(
        &self,
        policy: IndexPolicy,
        pdf_dir: &Path,
        index_dir: &Path,
        embedder: &dyn Embedder,
    ) -> Result<VectorIndex> {
        let processor = DataProcessor::new(self.settings.chunking)?;
        let extractor = PdfToText::default();
        let source = DocumentSource {
            dir: pdf_dir,
            extractor: &extractor,
            processor: &processor,
            limit: self.settings.data.max_files,
        };
        Ok(prepare_index(index_dir, policy, &source, embedder)?)
    }

    fn pipeline(&self, k: Option<usize>) -> Result<RagPipeline> {
        let retriever = Retriever::new(k.unwrap_or(self.settings.retrieval.k))?;
        let embedder = get_default_embedder(&self.settings.embedding)?;
        let policy = IndexPolicy::from_force_rebuild(self.settings.data.force_rebuild);
        let (pdf_dir, index_dir) = (self.pdf_dir(None), self.index_dir(None));
        let index = self.prepare(policy, &pdf_dir, &index_dir, embedder.as_ref())?;
        let generator = OllamaGenerator::new(&self.settings.generation)?;
        info!("Using {} for generation", generator.model());
        let models = Models { embedder, generator: Box::new(generator) };
        let orchestrator = AnswerOrchestrator::new(self.settings.retrieval.max_context_chars);
        Ok(RagPipeline::new(models, index, retriever, orchestrator))
    }
}

pub fn handle_index(
    ctx: &Context,
    rebuild: bool,
    pdf_dir: Option<PathBuf>,
    index_dir: Option<PathBuf>,
) -> Result<()> {
    let pdf_dir = ctx.pdf_dir(pdf_dir);
    let index_dir = ctx.index_dir(index_dir);
    let embedder = get_default_embedder(&ctx.settings.embedding)?;
    let policy = IndexPolicy::from_force_rebuild(rebuild || ctx.settings.data.force_rebuild);
    let index = ctx.prepare(policy, &pdf_dir, &index_dir, embedder.as_ref())?;
    println!("Index ready at {} ({} chunks)", index.location().display(), index.chunk_count());
    Ok(())
}

pub fn handle_ask(
    ctx: &Context,
    question: &str,
    k: Option<usize>,
    show_context: bool,
) -> Result<()> {
    let pipeline = ctx.pipeline(k)?;
    let response = pipeline.ask(question)?;
    print_response(&response, show_context);
    Ok(())
}

pub fn handle_chat(ctx: &Context, show_context: bool) -> Result<()> {
    let pipeline = ctx.pipeline(None)?;
    println!("Ask about your documents. Type 'quit' to leave.");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("\n> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else { break };
        let question = line?;
        let question = question.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }
        match pipeline.ask(question) {
            Ok(response) => print_response(&response, show_context),
            Err(e) => {
                error!("Query failed: {}", e);
                println!("Error: {e}");
            }
        }
    }
    println!("Goodbye!");
    Ok(())
}

fn print_response(response: &QueryResponse, show_context: bool) {
    println!("\n{}", response.answer.text);
    if !response.answer.sources.is_empty() {
        println!("\nSources:");
        for (i, source) in response.answer.sources.iter().enumerate() {
            println!("  {}. {}", i + 1, basename(source));
        }
    }
    if show_context {
        println!("\nRetrieved context:");
        for (i, scored) in response.retrieved.iter().enumerate() {
            let preview: String = scored.chunk.text.chars().take(CONTEXT_PREVIEW_CHARS).collect();
            let truncated = scored.chunk.text.chars().count() > CONTEXT_PREVIEW_CHARS;
            let ellipsis = if truncated { "..." } else { "" };
            println!(
                "\n[{}] {} #{} (score {:.3})\n{}{}",
                i + 1,
                basename(&scored.chunk.source_id),
                scored.chunk.chunk_index,
                scored.score,
                preview,
                ellipsis
            );
        }
    }
}

fn basename(source_id: &str) -> String {
    Path::new(source_id)
        .file_name()
        .map_or_else(|| source_id.to_string(), |n| n.to_string_lossy().into_owned())
}
