//! Collapse CLI - Command-line interface for wear-collapse
//!
//! Commands:
//! - summary: Collapse whole recordings into one row per participant
//! - daily: Collapse recordings into one row per participant-day
//! - dictionary: Write the data dictionary for a level
//! - check: Diagnose configuration and input directory
//! - verify: Re-check numeric invariants of written summary files

use clap::{Parser, Subcommand, ValueEnum};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use wear_collapse::checks::verify_rows;
use wear_collapse::encoder::SummaryEncoder;
use wear_collapse::storage::{dictionary_file_name, read_rows};
use wear_collapse::{
    CollapseConfig, CollapseError, CollapseLevel, CollapseProcessor, CsvDirectorySink,
    CsvDirectorySource, RecordSink, COLLAPSE_VERSION,
};

/// Collapse - Diurnally-adjusted summaries of wearable accelerometer epochs
#[derive(Parser)]
#[command(name = "collapse")]
#[command(version = COLLAPSE_VERSION)]
#[command(about = "Collapse accelerometer epoch tables into summary variables", long_about = None)]
struct Cli {
    /// Configuration file (JSON); defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collapse whole recordings into one row per participant
    Summary(RunArgs),

    /// Collapse recordings into one row per participant-day
    Daily(RunArgs),

    /// Write the data dictionary
    Dictionary {
        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Level to describe (both when omitted)
        #[arg(long, value_enum)]
        level: Option<LevelArg>,
    },

    /// Diagnose configuration and input directory
    Check {
        /// Input directory
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-check wear and threshold consistency of summary or daily files
    Verify {
        /// Summary or daily CSV files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    /// Directory holding `{file_id}_{suffix}.csv` tables
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory
    #[arg(short, long)]
    output: PathBuf,

    /// File ids to process (every input table when omitted)
    #[arg(long, num_args = 1..)]
    ids: Vec<String>,

    /// Write the run report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LevelArg {
    Summary,
    Daily,
}

impl From<LevelArg> for CollapseLevel {
    fn from(level: LevelArg) -> Self {
        match level {
            LevelArg::Summary => CollapseLevel::Summary,
            LevelArg::Daily => CollapseLevel::Daily,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CollapseCliError> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Summary(args) => cmd_collapse(config_path, &args, CollapseLevel::Summary),
        Commands::Daily(args) => cmd_collapse(config_path, &args, CollapseLevel::Daily),
        Commands::Dictionary { output, level } => {
            cmd_dictionary(config_path, &output, level.map(CollapseLevel::from))
        }
        Commands::Check { input, json } => cmd_check(config_path, input.as_deref(), json),
        Commands::Verify { files, json } => cmd_verify(config_path, &files, json),
    }
}

fn load_config(path: Option<&Path>) -> Result<CollapseConfig, CollapseCliError> {
    let config = match path {
        Some(path) => CollapseConfig::from_file(path)?,
        None => CollapseConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn cmd_collapse(
    config_path: Option<&Path>,
    args: &RunArgs,
    level: CollapseLevel,
) -> Result<(), CollapseCliError> {
    let processor = CollapseProcessor::new(load_config(config_path)?)?;
    let source = CsvDirectorySource::new(&args.input, processor.config());

    let ids = if args.ids.is_empty() {
        source.discover()?
    } else {
        args.ids.clone()
    };
    if ids.is_empty() {
        return Err(CollapseCliError::NoInputs(args.input.clone()));
    }

    let mut sink = CsvDirectorySink::new(&args.output)?;
    let report = processor.run_batch(&source, &mut sink, &ids, level)?;

    if let Some(path) = &args.report {
        fs::write(path, report.to_json()?)?;
    }

    println!(
        "{} participants: {} collapsed, {} dummy records, {} failed",
        report.total(),
        report.collapsed.len(),
        report.dummies.len(),
        report.failures.len()
    );
    for failure in &report.failures {
        println!("  [SKIP] {}: {}", failure.id, failure.message);
    }
    Ok(())
}

fn cmd_dictionary(
    config_path: Option<&Path>,
    output: &Path,
    level: Option<CollapseLevel>,
) -> Result<(), CollapseCliError> {
    let config = load_config(config_path)?;
    let mut sink = CsvDirectorySink::new(output)?;

    let levels = match level {
        Some(level) => vec![level],
        None => vec![CollapseLevel::Summary, CollapseLevel::Daily],
    };
    for level in levels {
        let dictionary = SummaryEncoder::new(&config, level).dictionary();
        sink.write_dictionary(level, &dictionary)?;
        println!(
            "Wrote {} ({} variables)",
            output.join(dictionary_file_name(level)).display(),
            dictionary.rows.len()
        );
    }
    Ok(())
}

fn cmd_check(
    config_path: Option<&Path>,
    input: Option<&Path>,
    json: bool,
) -> Result<(), CollapseCliError> {
    let mut checks: Vec<Check> = Vec::new();

    checks.push(Check {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("wear-collapse version {COLLAPSE_VERSION}"),
    });

    let config = match config_path.map(CollapseConfig::from_file) {
        None => {
            checks.push(Check {
                name: "config".to_string(),
                status: CheckStatus::Warning,
                message: "No configuration file given, using defaults".to_string(),
            });
            Some(CollapseConfig::default())
        }
        Some(Ok(config)) => {
            checks.push(Check {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Configuration valid ({} source, {} thresholds)",
                    config.source.as_str(),
                    config.thresholds.len()
                ),
            });
            Some(config)
        }
        Some(Err(e)) => {
            checks.push(Check {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            });
            None
        }
    };

    if let (Some(input), Some(config)) = (input, &config) {
        let source = CsvDirectorySource::new(input, config);
        let check = match source.discover() {
            Ok(ids) if ids.is_empty() => Check {
                name: "input".to_string(),
                status: CheckStatus::Warning,
                message: format!("No *_{}.csv tables found", config.input_suffix),
            },
            Ok(ids) => Check {
                name: "input".to_string(),
                status: CheckStatus::Ok,
                message: format!("{} input tables found", ids.len()),
            },
            Err(e) => Check {
                name: "input".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot read input directory: {e}"),
            },
        };
        checks.push(check);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&checks)?);
    } else {
        println!("Collapse Check Report");
        println!("=====================");
        for check in &checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    if checks.iter().any(|c| matches!(c.status, CheckStatus::Error)) {
        Err(CollapseCliError::ChecksFailed)
    } else {
        Ok(())
    }
}

fn cmd_verify(
    config_path: Option<&Path>,
    files: &[PathBuf],
    json: bool,
) -> Result<(), CollapseCliError> {
    let config = load_config(config_path)?;
    let measures = config.measures();

    let mut results = Vec::new();
    for path in files {
        let rows = read_rows(BufReader::new(File::open(path)?))?;
        let failures = verify_rows(&rows, &config.thresholds, &measures);
        results.push(VerifyResult {
            file: path.display().to_string(),
            rows: rows.len(),
            failures,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for result in &results {
            let status_icon = if result.failures.is_empty() { "[OK]" } else { "[ERR]" };
            println!("{} {} ({} rows)", status_icon, result.file, result.rows);
            for failure in &result.failures {
                println!(
                    "    row {} ({}): {} off by {:.6}",
                    failure.row, failure.id, failure.check, failure.residual
                );
            }
        }
    }

    let failed: usize = results.iter().map(|r| r.failures.len()).sum();
    if failed > 0 {
        Err(CollapseCliError::VerifyFailed(failed))
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum CollapseCliError {
    Io(io::Error),
    Collapse(CollapseError),
    Json(serde_json::Error),
    NoInputs(PathBuf),
    ChecksFailed,
    VerifyFailed(usize),
}

impl From<io::Error> for CollapseCliError {
    fn from(e: io::Error) -> Self {
        CollapseCliError::Io(e)
    }
}

impl From<CollapseError> for CollapseCliError {
    fn from(e: CollapseError) -> Self {
        CollapseCliError::Collapse(e)
    }
}

impl From<serde_json::Error> for CollapseCliError {
    fn from(e: serde_json::Error) -> Self {
        CollapseCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CollapseCliError> for CliError {
    fn from(e: CollapseCliError) -> Self {
        match e {
            CollapseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CollapseCliError::Collapse(e) => {
                let hint = match &e {
                    CollapseError::InvalidConfig(_) => "Run 'collapse check --config <file>' for details",
                    CollapseError::MissingColumn(_) | CollapseError::ParseError(_) => {
                        "Ensure input tables come from the configured upstream processing"
                    }
                    _ => "Check input and output directories",
                };
                CliError {
                    code: e.code().to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            CollapseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            CollapseCliError::NoInputs(dir) => CliError {
                code: "NO_INPUTS".to_string(),
                message: format!("No input tables found in {}", dir.display()),
                hint: Some("Check --input and the configured input_suffix".to_string()),
            },
            CollapseCliError::ChecksFailed => CliError {
                code: "CHECK_FAILED".to_string(),
                message: "One or more checks failed".to_string(),
                hint: Some("Review the check report for details".to_string()),
            },
            CollapseCliError::VerifyFailed(count) => CliError {
                code: "VERIFY_FAILED".to_string(),
                message: format!("{count} consistency checks failed"),
                hint: Some("Inspect the listed rows".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct Check {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

#[derive(serde::Serialize)]
struct VerifyResult {
    file: String,
    rows: usize,
    failures: Vec<wear_collapse::checks::CheckFailure>,
}
