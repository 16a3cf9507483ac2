//! CLI command definitions for question-forge.
//!
//! `run` drives the pipeline on one seed question; `sample` writes an example
//! input file; `stats`, `solutions`, `context`, `export` and `qa` browse what
//! earlier runs stored.

use anyhow::Context as _;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::llm::{ChatClient, LlmConfig};
use crate::pipeline::config::DEFAULT_DATABASE_URL;
use crate::pipeline::{project_results, PipelineConfig, QuestionPipeline, ResultSummary, SeedQuestion};
use crate::storage::{Database, SolutionRow};

/// Default file written by `sample`.
const DEFAULT_SAMPLE_FILE: &str = "sample_input.json";

/// Default file written by `export`.
const DEFAULT_EXPORT_FILE: &str = "database_export.json";

/// Thinking chains longer than this are shortened in the run summary.
const SUMMARY_THINKING_CHARS: usize = 200;

/// Thinking chains longer than this are shortened in the solution list.
const LIST_THINKING_CHARS: usize = 100;

/// Generate similar, solved and verified questions from one seed question.
#[derive(Parser)]
#[command(name = "question-forge")]
#[command(about = "Generate similar questions with verified solutions from a seed question")]
#[command(version)]
#[command(
    long_about = "question-forge tags a seed question, generates similar questions, solves each one and \
grades the solutions, regenerating the ones that fail.\n\nExample usage:\n  question-forge sample\n  \
question-forge run --file sample_input.json\n  question-forge stats"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// SQLite database URL or path.
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the pipeline on a seed question.
    Run(RunArgs),

    /// Write an example seed question file.
    Sample(SampleArgs),

    /// Show row counts and the tag distribution.
    Stats,

    /// List stored solutions, newest first.
    Solutions(SolutionsArgs),

    /// Show a solution with its generated and original question.
    Context(ContextArgs),

    /// Export stored solutions to a JSON file.
    Export(ExportArgs),

    /// Show questions, thinking chains and answers in full.
    Qa(QaArgs),
}

/// Arguments for `question-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// JSON file with `question`, `thinking_chain` and `answer`.
    #[arg(short, long, conflicts_with = "interactive", required_unless_present = "interactive")]
    pub file: Option<PathBuf>,

    /// Read the seed question from standard input.
    #[arg(short, long)]
    pub interactive: bool,

    /// Where to write the results (default: `<input>_results.json` for file input).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the results as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,

    /// Model name (overrides LLM_MODEL).
    #[arg(short, long)]
    pub model: Option<String>,

    /// API key (can also be set via DEEPSEEK_API_KEY or OPENAI_API_KEY).
    #[arg(long)]
    pub api_key: Option<String>,

    /// Number of similar questions to ask for.
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Grading attempts per question, including the first.
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

/// Arguments for `question-forge sample`.
#[derive(Parser, Debug)]
pub struct SampleArgs {
    /// Output file.
    #[arg(short, long, default_value = DEFAULT_SAMPLE_FILE)]
    pub output: PathBuf,
}

/// Arguments for `question-forge solutions`.
#[derive(Parser, Debug)]
pub struct SolutionsArgs {
    /// Only show solutions derived from this seed question.
    #[arg(long)]
    pub seed_id: Option<i64>,

    /// Maximum number of solutions to show.
    #[arg(long)]
    pub limit: Option<u32>,
}

/// Arguments for `question-forge context`.
#[derive(Parser, Debug)]
pub struct ContextArgs {
    /// Solution id.
    pub id: i64,
}

/// Arguments for `question-forge export`.
#[derive(Parser, Debug)]
pub struct ExportArgs {
    /// Output file.
    #[arg(short, long, default_value = DEFAULT_EXPORT_FILE)]
    pub output: PathBuf,
}

/// Arguments for `question-forge qa`.
#[derive(Parser, Debug)]
pub struct QaArgs {
    /// Maximum number of entries to show.
    #[arg(long)]
    pub limit: Option<u32>,
}

/// Seed file contents; missing fields are reported together.
#[derive(Debug, Default, Deserialize)]
struct SeedFile {
    #[serde(default)]
    question: String,
    #[serde(default)]
    thinking_chain: String,
    #[serde(default)]
    answer: String,
}

#[derive(Debug, Serialize)]
struct ExportFile {
    export_time: String,
    total_solutions: usize,
    solutions: Vec<SolutionRow>,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let database_url = cli.database_url;
    match cli.command {
        Commands::Run(args) => run_pipeline_command(args, database_url).await,
        Commands::Sample(args) => run_sample_command(args),
        Commands::Stats => run_stats_command(&viewer_database_url(database_url)).await,
        Commands::Solutions(args) => {
            run_solutions_command(args, &viewer_database_url(database_url)).await
        }
        Commands::Context(args) => run_context_command(args, &viewer_database_url(database_url)).await,
        Commands::Export(args) => run_export_command(args, &viewer_database_url(database_url)).await,
        Commands::Qa(args) => run_qa_command(args, &viewer_database_url(database_url)).await,
    }
}

fn viewer_database_url(database_url: Option<String>) -> String {
    database_url.unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
}

// ============================================================================
// Run Command Implementation
// ============================================================================

async fn run_pipeline_command(args: RunArgs, database_url: Option<String>) -> anyhow::Result<()> {
    let seed = match &args.file {
        Some(path) => load_seed_file(path)?,
        None => {
            let stdin = io::stdin();
            read_seed_interactive(&mut stdin.lock(), &mut io::stdout())?
        }
    };

    let config = pipeline_config(&args, database_url)?;

    let mut llm_config = match args.api_key.clone() {
        Some(key) => apply_llm_env(LlmConfig::new(key)),
        None => LlmConfig::from_env().map_err(|e| {
            anyhow::anyhow!(
                "Failed to initialize LLM client: {}. Please provide --api-key or set \
                 DEEPSEEK_API_KEY/OPENAI_API_KEY env var.",
                e
            )
        })?,
    };
    if let Some(model) = &args.model {
        llm_config = llm_config.with_model(model.clone());
    }
    let llm = ChatClient::new(llm_config)?;
    info!(
        model = %llm.config().model,
        api_base = %llm.config().api_base,
        "Using chat completions endpoint"
    );

    let db = Database::open(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;

    let pipeline = QuestionPipeline::new(Arc::new(llm), Arc::new(db), config);
    let state = pipeline.run(seed).await;
    let summary = project_results(&state);

    let json_output = serde_json::to_string_pretty(&summary)?;
    if args.json {
        println!("{}", json_output);
    } else {
        println!("{}", render_summary(&summary));
    }

    let output_path = args
        .output
        .clone()
        .or_else(|| args.file.as_deref().map(results_path));
    if let Some(path) = output_path {
        fs::write(&path, &json_output)
            .with_context(|| format!("failed to write results to {}", path.display()))?;
        if !args.json {
            println!("\nResults saved to {}", path.display());
        }
    }

    if let ResultSummary::Failed { error } = &summary {
        anyhow::bail!("pipeline failed: {}", error);
    }
    Ok(())
}

/// Environment settings applied on top of an explicitly supplied key.
fn apply_llm_env(mut config: LlmConfig) -> LlmConfig {
    if let Ok(base) = std::env::var("OPENAI_BASE_URL") {
        config = config.with_api_base(base);
    }
    if let Ok(model) = std::env::var("LLM_MODEL") {
        config = config.with_model(model);
    }
    config
}

fn pipeline_config(args: &RunArgs, database_url: Option<String>) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(url) = database_url {
        config = config.with_database_url(url);
    }
    if let Some(count) = args.count {
        config = config.with_target_question_count(count);
    }
    if let Some(attempts) = args.max_attempts {
        config = config.with_max_verification_attempts(attempts);
    }
    config.validate()?;
    Ok(config)
}

/// Reads a seed question from a JSON file. All three fields must be non-empty.
fn load_seed_file(path: &Path) -> anyhow::Result<SeedQuestion> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let file: SeedFile = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    let seed = SeedQuestion::new(file.question, file.thinking_chain, file.answer);
    let missing = seed.missing_fields();
    if !missing.is_empty() {
        anyhow::bail!(
            "{} must contain non-empty fields: {}",
            path.display(),
            missing.join(", ")
        );
    }
    Ok(seed)
}

/// `dir/input.json` becomes `dir/input_results.json`.
fn results_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    input.with_file_name(format!("{}_results.json", stem))
}

/// Prompts for the question and thinking chain (each ended by a blank line)
/// and a one-line answer.
fn read_seed_interactive<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
) -> anyhow::Result<SeedQuestion> {
    writeln!(out, "Enter the seed question (finish each block with an empty line).")?;

    writeln!(out, "\nQuestion:")?;
    out.flush()?;
    let question = read_block(input)?;
    if question.is_empty() {
        anyhow::bail!("question must not be empty");
    }

    writeln!(out, "\nThinking chain:")?;
    out.flush()?;
    let thinking_chain = read_block(input)?;

    writeln!(out, "\nAnswer:")?;
    out.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    let answer = answer.trim().to_string();
    if answer.is_empty() {
        anyhow::bail!("answer must not be empty");
    }

    Ok(SeedQuestion::new(question, thinking_chain, answer))
}

fn read_block<R: BufRead>(input: &mut R) -> io::Result<String> {
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 || line.trim().is_empty() {
            break;
        }
        lines.push(line.trim_end_matches(['\r', '\n']).to_string());
    }
    Ok(lines.join("\n").trim().to_string())
}

fn render_summary(summary: &ResultSummary) -> String {
    let (original_question, generated_questions, verification_summary) = match summary {
        ResultSummary::Failed { error } => return format!("✗ Pipeline failed: {}", error),
        ResultSummary::Success {
            original_question,
            generated_questions,
            verification_summary,
        } => (original_question, generated_questions, verification_summary),
    };

    let mut out = String::new();
    out.push_str("=== Question Forge Results ===\n");
    out.push_str(&format!("Tags:           {}\n", original_question.domain_tags.join(", ")));
    out.push_str(&format!("Question type:  {}\n", original_question.question_type));
    out.push_str(&format!(
        "Verified:       {}/{} passed (average score {:.1})\n",
        verification_summary.passed, verification_summary.total, verification_summary.average_score
    ));
    out.push_str(&format!("\nGenerated questions ({}):\n", generated_questions.len()));

    for (i, item) in generated_questions.iter().enumerate() {
        out.push_str(&format!("\n[{}] {}\n", i + 1, item.question));
        if let Some(solution) = &item.solution {
            out.push_str(&format!(
                "  Thinking: {}\n",
                shorten(&solution.thinking_chain, SUMMARY_THINKING_CHARS)
            ));
            out.push_str(&format!("  Answer:   {}\n", solution.answer));
            if let (Some(score), Some(passed)) =
                (solution.verification_score, solution.verification_passed)
            {
                let mark = if passed { "✓" } else { "✗" };
                out.push_str(&format!("  Verdict:  {} score {}\n", mark, score));
            }
        }
    }
    out
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}...", head)
}

// ============================================================================
// Sample Command Implementation
// ============================================================================

fn sample_seed() -> SeedQuestion {
    SeedQuestion::new(
        "An inlet pipe fills 1/10 of a pool per hour and an outlet pipe drains 1/15 of the pool \
         per hour. The pool is empty. If both pipes are opened at the same time, how many hours \
         does it take to fill the pool?",
        "This is a work-rate problem, so compare the net rate of filling.\n\n\
         Let the pool's capacity be 1.\n\
         Inlet per hour: 1/10\n\
         Outlet per hour: 1/15\n\n\
         Net rate = 1/10 - 1/15 = 3/30 - 2/30 = 1/30\n\n\
         Time to fill = 1 / (1/30) = 30 hours",
        "30 hours",
    )
}

fn run_sample_command(args: SampleArgs) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&sample_seed())?;
    fs::write(&args.output, json)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    println!("✓ Sample input written to {}", args.output.display());
    Ok(())
}

// ============================================================================
// Record Viewer Commands
// ============================================================================

async fn open_database(database_url: &str) -> anyhow::Result<Database> {
    Database::open(database_url)
        .await
        .with_context(|| format!("failed to open database {}", database_url))
}

async fn run_stats_command(database_url: &str) -> anyhow::Result<()> {
    let db = open_database(database_url).await?;
    let stats = db.stats().await?;

    println!("=== Database Statistics ===");
    println!("Original questions:  {}", stats.original);
    println!("Generated questions: {}", stats.generated);
    println!("Solutions:           {}", stats.solutions);
    println!("Verified:            {}", stats.verified);
    println!("Passed:              {}", stats.passed);
    if !stats.tag_counts.is_empty() {
        println!("\nTag distribution:");
        for entry in &stats.tag_counts {
            println!("  {}: {}", entry.tag, entry.count);
        }
    }
    Ok(())
}

async fn run_solutions_command(args: SolutionsArgs, database_url: &str) -> anyhow::Result<()> {
    let db = open_database(database_url).await?;
    let rows = db.list_solutions(args.seed_id, args.limit).await?;
    if rows.is_empty() {
        println!("No solutions found.");
        return Ok(());
    }

    for (i, row) in rows.iter().enumerate() {
        println!("\n{}. Solution {}", i + 1, row.solution_id);
        println!("  Question: {}", row.question);
        println!("  Thinking: {}", shorten(&row.thinking_chain, LIST_THINKING_CHARS));
        println!("  Answer:   {}", row.answer);
        println!("  Verdict:  {}", verdict_label(row));
        println!("  Created:  {}", row.created_at.as_deref().unwrap_or("-"));
    }
    Ok(())
}

fn verdict_label(row: &SolutionRow) -> String {
    match (row.verification_passed, row.verification_score) {
        (Some(true), Some(score)) => format!("passed ({})", score),
        (Some(false), Some(score)) => format!("failed ({})", score),
        _ => "not verified".to_string(),
    }
}

async fn run_context_command(args: ContextArgs, database_url: &str) -> anyhow::Result<()> {
    let db = open_database(database_url).await?;
    let Some(context) = db.solution_context(args.id).await? else {
        anyhow::bail!("no solution with id {}", args.id);
    };

    let original = &context.original_question;
    let generated = &context.generated_question;
    let solution = &context.solution;

    println!("=== Solution {} ===", solution.solution_id);
    println!("\nOriginal question ({}):", original.id);
    println!("  Question: {}", original.question);
    println!("  Tags:     {}", original.domain_tags.join(", "));
    println!("  Answer:   {}", original.answer);

    println!("\nGenerated question ({}):", generated.id);
    println!("  Question: {}", generated.question);
    println!("  Tags:     {}", generated.domain_tags.join(", "));

    println!("\nSolution:");
    println!("  Thinking: {}", solution.thinking_chain);
    println!("  Answer:   {}", solution.answer);
    println!("  Verdict:  {}", verdict_label(solution));
    if let Some(feedback) = &solution.verification_feedback {
        println!("  Feedback: {}", feedback);
    }

    println!("\nTimeline:");
    println!("  Original created:  {}", original.created_at.as_deref().unwrap_or("-"));
    println!("  Generated created: {}", generated.created_at.as_deref().unwrap_or("-"));
    println!("  Solution created:  {}", solution.created_at.as_deref().unwrap_or("-"));
    Ok(())
}

async fn run_export_command(args: ExportArgs, database_url: &str) -> anyhow::Result<()> {
    let db = open_database(database_url).await?;
    let solutions = db.list_solutions(None, None).await?;
    let export = ExportFile {
        export_time: chrono::Local::now().to_rfc3339(),
        total_solutions: solutions.len(),
        solutions,
    };

    fs::write(&args.output, serde_json::to_string_pretty(&export)?)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    println!(
        "✓ Exported {} solutions to {}",
        export.total_solutions,
        args.output.display()
    );
    Ok(())
}

async fn run_qa_command(args: QaArgs, database_url: &str) -> anyhow::Result<()> {
    let db = open_database(database_url).await?;
    let rows = db.list_solutions(None, args.limit).await?;
    if rows.is_empty() {
        println!("No solutions found.");
        return Ok(());
    }

    for (i, row) in rows.iter().enumerate() {
        println!(
            "{}. Solution {} | Question {} | {}",
            i + 1,
            row.solution_id,
            row.question_id,
            row.created_at.as_deref().unwrap_or("-")
        );
        println!("Question: {}", row.question);
        println!("Thinking: {}", row.thinking_chain);
        println!("Answer:   {}", row.answer);
        println!("{}", "-".repeat(80));
    }
    Ok(())
}
