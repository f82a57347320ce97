//! Progeval - generated-program evaluation harness CLI
//!
//! The `progeval` command drives the eval lifecycle for one YAML sample.
//!
//! ## Commands
//!
//! - `bootstrap`: Generate a program from a sample and run every query
//! - `annotate`: Review query results interactively
//! - `iterate`: Leave-one-out improvement over an annotated bootstrap
//! - `eval`: Bootstrap, score against expectation rules, iterate, report
//! - `report`: Assemble pass rates and fold outcomes into report.json

use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};

use progeval_core::{
    apply_rules, build_report, load_bootstrap, load_iteration, pct, save_bootstrap,
    save_iteration, AnnotationSession, BootstrapConfig, BootstrapPipeline, EvalSample, ExecConfig,
    IterationConfig, IterationPipeline, Orchestration, ProgramRunner, DEFAULT_MODEL,
};
use progeval_llm::LlmProgramGenerator;

/// Instructions handed to the generator when no file is supplied.
const DEFAULT_INSTRUCTIONS: &str = "\
Write a single-file, self-contained program. It must support three CLI flags:
--help exits 0 after printing usage; --schema prints a JSON object with
'input' and 'output' keys describing its I/O as JSON Schema; --input <json>
runs the program on the given structured input and prints the structured
output as JSON on stdout. Report failures on stderr and exit nonzero.";

#[derive(Parser)]
#[command(name = "progeval")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bootstrap, iterate, and report on generated LLM programs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Which run a results file under review came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AnnotationPhase {
    /// Bootstrap results (bootstrap_results.json)
    Initial,
    /// Leave-one-out fold results (iteration_results.json)
    Iteration,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a program from a sample and run every query
    Bootstrap {
        /// Path to the YAML eval sample
        #[arg(short, long)]
        sample: PathBuf,

        /// Output directory for the program and results
        #[arg(short, long)]
        output: PathBuf,

        /// Model id for generation (namespaced, e.g. anthropic/... or bedrock/...)
        #[arg(short, long, default_value = DEFAULT_MODEL)]
        model: String,

        /// File with program conventions for the generator
        #[arg(long)]
        instructions: Option<PathBuf>,
    },

    /// Review unannotated bootstrap results interactively
    Annotate {
        /// Path to the YAML eval sample, for showing query text
        #[arg(short, long)]
        sample: Option<PathBuf>,

        /// Path to the results file to annotate in place
        #[arg(short, long)]
        results: PathBuf,

        /// Which run the results file belongs to
        #[arg(long, value_enum, default_value = "initial")]
        phase: AnnotationPhase,
    },

    /// Leave-one-out improvement over a fully annotated bootstrap
    Iterate {
        /// Path to the YAML eval sample
        #[arg(short, long)]
        sample: PathBuf,

        /// Path to the annotated bootstrap results file
        #[arg(short, long)]
        bootstrap: PathBuf,

        /// Output directory for fold artifacts and results
        #[arg(short, long)]
        output: PathBuf,

        /// Model id for improvement calls
        #[arg(short, long, default_value = DEFAULT_MODEL)]
        model: String,

        /// Score fold results from each query's expectation rules
        #[arg(long)]
        auto_score: bool,
    },

    /// Full pipeline: bootstrap, rule scoring, iteration, report
    Eval {
        /// Path to the YAML eval sample
        #[arg(short, long)]
        sample: PathBuf,

        /// Output directory for all artifacts
        #[arg(short, long)]
        output: PathBuf,

        /// Model id used for every LLM call
        #[arg(short, long, default_value = DEFAULT_MODEL)]
        model: String,

        /// File with program conventions for the generator
        #[arg(long)]
        instructions: Option<PathBuf>,
    },

    /// Assemble pass rates and fold outcomes into report.json
    Report {
        /// Path to the YAML eval sample, for the per-dimension breakdown
        #[arg(short, long)]
        sample: Option<PathBuf>,

        /// Path to the annotated bootstrap results file
        #[arg(short, long)]
        bootstrap: PathBuf,

        /// Path to the iteration results file, when one exists
        #[arg(long)]
        iteration: Option<PathBuf>,

        /// Output directory for report.json
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    progeval_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Bootstrap {
            sample,
            output,
            model,
            instructions,
        } => cmd_bootstrap(&sample, &output, &model, instructions.as_deref()).await,
        Commands::Annotate {
            sample,
            results,
            phase,
        } => cmd_annotate(sample.as_deref(), &results, phase),
        Commands::Iterate {
            sample,
            bootstrap,
            output,
            model,
            auto_score,
        } => cmd_iterate(&sample, &bootstrap, &output, &model, auto_score).await,
        Commands::Eval {
            sample,
            output,
            model,
            instructions,
        } => cmd_eval(&sample, &output, &model, instructions.as_deref()).await,
        Commands::Report {
            sample,
            bootstrap,
            iteration,
            output,
        } => cmd_report(sample.as_deref(), &bootstrap, iteration.as_deref(), &output),
    }
}

fn load_sample(path: &Path) -> Result<EvalSample> {
    EvalSample::from_yaml_file(path)
        .with_context(|| format!("Failed to load sample {}", path.display()))
}

fn load_instructions(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read instructions {}", path.display())),
        None => Ok(DEFAULT_INSTRUCTIONS.to_string()),
    }
}

async fn cmd_bootstrap(
    sample_path: &Path,
    output: &Path,
    model: &str,
    instructions: Option<&Path>,
) -> Result<()> {
    let sample = load_sample(sample_path)?;
    let generator = LlmProgramGenerator::new(model);
    let pipeline = BootstrapPipeline::new(&generator, ProgramRunner::new(ExecConfig::default()));

    let result = pipeline
        .run(
            &sample,
            &BootstrapConfig {
                output_dir: output.to_path_buf(),
                skill_instructions: load_instructions(instructions)?,
                orchestration: Orchestration::Llm,
            },
        )
        .await
        .context("Bootstrap run failed")?;

    let errors = result.query_results.iter().filter(|r| r.error.is_some()).count();
    info!(
        sample_id = %result.sample_id,
        queries = result.query_results.len(),
        errors = errors,
        "bootstrap complete"
    );
    println!(
        "Bootstrap complete: {} queries, {} error(s). Results in {}",
        result.query_results.len(),
        errors,
        progeval_core::bootstrap::results_path(output).display()
    );
    Ok(())
}

fn cmd_annotate(
    sample_path: Option<&Path>,
    results_path: &Path,
    phase: AnnotationPhase,
) -> Result<()> {
    let sample = sample_path.map(load_sample).transpose()?;
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut session = AnnotationSession::new(BufReader::new(stdin.lock()), stdout.lock());

    let remaining = match phase {
        AnnotationPhase::Initial => {
            let mut result = load_bootstrap(results_path)
                .with_context(|| format!("Failed to load results {}", results_path.display()))?;
            session
                .run(sample.as_ref(), &mut result, |r| {
                    save_bootstrap(r, results_path)
                })
                .context("Annotation session failed")?;
            result.unannotated_ids().len()
        }
        AnnotationPhase::Iteration => {
            let mut result = load_iteration(results_path)
                .with_context(|| format!("Failed to load results {}", results_path.display()))?;
            session
                .run_iteration(sample.as_ref(), &mut result, |r| {
                    save_iteration(r, results_path)
                })
                .context("Annotation session failed")?;
            result.unannotated_ids().len()
        }
    };

    if remaining > 0 {
        println!("{remaining} query result(s) still unannotated.");
    }
    Ok(())
}

async fn cmd_iterate(
    sample_path: &Path,
    bootstrap_path: &Path,
    output: &Path,
    model: &str,
    auto_score: bool,
) -> Result<()> {
    let sample = load_sample(sample_path)?;
    let bootstrap = load_bootstrap(bootstrap_path)
        .with_context(|| format!("Failed to load bootstrap {}", bootstrap_path.display()))?;

    let generator = LlmProgramGenerator::new(model);
    let pipeline = IterationPipeline::new(&generator, ProgramRunner::new(ExecConfig::default()));
    let result = pipeline
        .run(
            &sample,
            &bootstrap,
            &IterationConfig {
                output_dir: output.to_path_buf(),
                orchestration: Orchestration::Llm,
                auto_score,
            },
        )
        .await
        .context("Iteration run failed")?;

    let skipped = result.folds.iter().filter(|f| f.skipped).count();
    let errors = result
        .folds
        .iter()
        .filter(|f| f.query_result.error.is_some())
        .count();
    println!(
        "Iteration complete: {} fold(s), {} skipped, {} error(s). Results in {}",
        result.folds.len(),
        skipped,
        errors,
        progeval_core::iteration::results_path(output).display()
    );
    Ok(())
}

async fn cmd_eval(
    sample_path: &Path,
    output: &Path,
    model: &str,
    instructions: Option<&Path>,
) -> Result<()> {
    let sample = load_sample(sample_path)?;
    let generator = LlmProgramGenerator::new(model);
    let runner = ProgramRunner::new(ExecConfig::default());

    let bootstrap_pipeline = BootstrapPipeline::new(&generator, runner.clone());
    let mut bootstrap = bootstrap_pipeline
        .run(
            &sample,
            &BootstrapConfig {
                output_dir: output.to_path_buf(),
                skill_instructions: load_instructions(instructions)?,
                orchestration: Orchestration::Direct,
            },
        )
        .await
        .context("Bootstrap run failed")?;

    let scored = apply_rules(&sample, &mut bootstrap);
    let bootstrap_results = progeval_core::bootstrap::results_path(output);
    save_bootstrap(&bootstrap, &bootstrap_results)
        .with_context(|| format!("Failed to save {}", bootstrap_results.display()))?;
    info!(scored = scored, "bootstrap results scored from expectation rules");

    let all_passed = bootstrap.annotations.iter().all(|a| a.acceptable);
    let iteration = if all_passed {
        println!("All queries passed the initial program; skipping iteration.");
        None
    } else {
        let iteration_pipeline = IterationPipeline::new(&generator, runner);
        Some(
            iteration_pipeline
                .run(
                    &sample,
                    &bootstrap,
                    &IterationConfig {
                        output_dir: output.to_path_buf(),
                        orchestration: Orchestration::Direct,
                        auto_score: true,
                    },
                )
                .await
                .context("Iteration run failed")?,
        )
    };

    let report = build_report(Some(&sample), &bootstrap, iteration.as_ref())
        .context("Failed to assemble report")?;
    report.save(&output.join(progeval_core::report::REPORT_FILE))?;
    print!("{}", report.render());
    std::io::stdout().flush().ok();

    if !all_passed {
        bail!(
            "initial pass rate {} is below 100%",
            pct(report.initial)
        );
    }
    Ok(())
}

fn cmd_report(
    sample_path: Option<&Path>,
    bootstrap_path: &Path,
    iteration_path: Option<&Path>,
    output: &Path,
) -> Result<()> {
    let sample = sample_path.map(load_sample).transpose()?;
    let bootstrap = load_bootstrap(bootstrap_path)
        .with_context(|| format!("Failed to load bootstrap {}", bootstrap_path.display()))?;
    let iteration = iteration_path
        .map(|path| {
            load_iteration(path)
                .with_context(|| format!("Failed to load iteration {}", path.display()))
        })
        .transpose()?;

    let report = build_report(sample.as_ref(), &bootstrap, iteration.as_ref())
        .context("Failed to assemble report")?;
    let report_path = output.join(progeval_core::report::REPORT_FILE);
    report.save(&report_path)?;
    print!("{}", report.render());
    println!("Report written to {}", report_path.display());
    Ok(())
}
