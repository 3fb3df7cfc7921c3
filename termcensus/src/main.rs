//! Termcensus CLI - student-term persistence from census snapshots
//!
//! # Main Commands
//!
//! ```bash
//! termcensus clean --data-dir data --out-dir out   # Build student_level_final_data.csv
//! termcensus report out/student_level_final_data.csv --report-dir out/report
//! termcensus run --data-dir data --out-dir out     # clean + report
//! ```
//!
//! # Diagnostic Commands
//!
//! ```bash
//! termcensus coverage --data-dir data    # Key overlap between enrollment and grades
//! termcensus validate out/final.csv      # Schema-check an exported file
//! termcensus grade-points                # Show the letter-grade scale
//! ```
//!
//! Every path flag can also be set through a `TERMCENSUS_*` environment
//! variable or a `.env` file.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use termcensus::loader::log_coverage;
use termcensus::{
    coverage, load_inputs, read_student_level_csv, run, run_report, validate_records, LetterGrade,
    PipelineConfig, PipelineOutcome, ReportConfig, RunLog,
};

#[derive(Parser)]
#[command(name = "termcensus")]
#[command(about = "Student-term persistence and GPA from census snapshots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the student-level file from the three input tables
    Clean {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Build the report from a student-level file
    Report {
        /// Student-level CSV produced by `clean`
        #[arg(env = "TERMCENSUS_REPORT_INPUT")]
        input: PathBuf,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Clean, then report on the result
    Run {
        #[command(flatten)]
        pipeline: PipelineArgs,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Show (id, term_code) coverage between enrollment and grades
    Coverage {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Validate a student-level CSV against the output schema
    Validate {
        /// Student-level CSV file
        input: PathBuf,
    },

    /// Show the letter-grade to grade-points scale
    GradePoints,
}

#[derive(Args)]
struct PipelineArgs {
    /// JSON config file (overrides the directory layout)
    #[arg(short, long, env = "TERMCENSUS_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the three input files
    #[arg(long, env = "TERMCENSUS_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Directory receiving the student-level file
    #[arg(long, env = "TERMCENSUS_OUT_DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Enrollment table (default: <data-dir>/fall_enrollment.csv)
    #[arg(long, env = "TERMCENSUS_ENROLLMENT")]
    enrollment: Option<PathBuf>,

    /// Grade table (default: <data-dir>/grades.csv)
    #[arg(long, env = "TERMCENSUS_GRADES")]
    grades: Option<PathBuf>,

    /// Program catalog (default: <data-dir>/program_data.csv)
    #[arg(long, env = "TERMCENSUS_PROGRAMS")]
    programs: Option<PathBuf>,

    /// Output file (default: <out-dir>/student_level_final_data.csv)
    #[arg(short, long, env = "TERMCENSUS_OUTPUT")]
    output: Option<PathBuf>,

    /// Census tag of the early snapshot
    #[arg(long, env = "TERMCENSUS_EARLY_TAG")]
    early_tag: Option<String>,

    /// Census tag of the end-of-term snapshot
    #[arg(long, env = "TERMCENSUS_END_TAG")]
    end_tag: Option<String>,

    /// Prefix marking an undeclared major
    #[arg(long, env = "TERMCENSUS_UNDECLARED_PREFIX")]
    undeclared_prefix: Option<String>,

    /// Skip schema validation of the exported rows
    #[arg(long, env = "TERMCENSUS_SKIP_VALIDATION")]
    skip_validation: bool,
}

impl PipelineArgs {
    fn to_config(&self) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_json_file(path)?,
            None => PipelineConfig::from_dirs(&self.data_dir, &self.out_dir),
        };

        if let Some(path) = &self.enrollment {
            config.enrollment_path = path.clone();
        }
        if let Some(path) = &self.grades {
            config.grades_path = path.clone();
        }
        if let Some(path) = &self.programs {
            config.program_path = path.clone();
        }
        if let Some(path) = &self.output {
            config.output_path = path.clone();
        }
        if let Some(tag) = &self.early_tag {
            config.census.early = tag.clone();
        }
        if let Some(tag) = &self.end_tag {
            config.census.end = tag.clone();
        }
        if let Some(prefix) = &self.undeclared_prefix {
            config.undeclared_prefix = prefix.clone();
        }
        config.skip_validation |= self.skip_validation;

        Ok(config)
    }
}

#[derive(Args)]
struct ReportArgs {
    /// Directory receiving report.xlsx and report.json
    #[arg(long, env = "TERMCENSUS_REPORT_DIR", default_value = "report")]
    report_dir: PathBuf,

    /// Degrees shown in the GPA-by-degree table
    #[arg(long, value_delimiter = ',', default_value = "BA,BS,BM,BFA")]
    degrees: Vec<String>,
}

impl ReportArgs {
    fn to_config(&self, input: &Path) -> ReportConfig {
        let mut config = ReportConfig::new(input, &self.report_dir);
        config.target_degrees = self.degrees.clone();
        config
    }
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Clean { pipeline } => cmd_clean(&pipeline).map(|_| ()),
        Commands::Report { input, report } => cmd_report(&report.to_config(&input)),
        Commands::Run { pipeline, report } => cmd_run(&pipeline, &report),
        Commands::Coverage { pipeline } => cmd_coverage(&pipeline),
        Commands::Validate { input } => cmd_validate(&input),
        Commands::GradePoints => cmd_grade_points(),
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn cmd_clean(args: &PipelineArgs) -> Result<PipelineOutcome, Box<dyn std::error::Error>> {
    let config = args.to_config()?;
    let outcome = run(&config)?;

    let summary = &outcome.summary;
    eprintln!("\n📊 Summary:");
    eprintln!("   Student-terms: {}", outcome.records.len());
    eprintln!("   Persisted: {}", summary.derive.persisted);
    eprintln!("   Undeclared -> declared: {}", summary.derive.declared_late);
    eprintln!("   With term GPA: {}", summary.derive.gpa_present);
    if summary.census.unrecognized > 0 {
        eprintln!("   ⚠️  Rows with unrecognized census tag: {}", summary.census.unrecognized);
    }
    if let Some(validation) = &summary.validation {
        if validation.is_clean() {
            eprintln!("   ✅ All {} records valid", validation.valid);
        } else {
            eprintln!("   ❌ {} invalid records", validation.invalid);
        }
    }
    eprintln!("💾 Output written to: {}", config.output_path.display());

    Ok(outcome)
}

fn cmd_report(config: &ReportConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut log = RunLog::new();
    let outcome = run_report(config, &mut log)?;
    for path in &outcome.files {
        eprintln!("   💾 {}", path.display());
    }
    Ok(())
}

fn cmd_run(pipeline: &PipelineArgs, report: &ReportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = pipeline.to_config()?;
    cmd_clean(pipeline)?;
    cmd_report(&report.to_config(&config.output_path))?;
    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_coverage(args: &PipelineArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.to_config()?;
    config.validate()?;

    let mut log = RunLog::new();
    let tables = load_inputs(&config, &mut log)?;
    let cov = coverage(&tables.enrollment, &tables.grades);
    log_coverage(&cov, &mut log);

    println!("{}", serde_json::to_string_pretty(&cov)?);
    Ok(())
}

fn cmd_validate(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating: {}", input.display());

    let records = read_student_level_csv(input)?;
    let summary = validate_records(&records)?;

    for (i, errors) in summary.errors.iter().take(5) {
        eprintln!("\n❌ Record {} invalid:", i);
        for err in errors.iter().take(3) {
            eprintln!("   - {}", err);
        }
    }
    eprintln!("\n📊 Results: {} valid, {} invalid", summary.valid, summary.invalid);

    if !summary.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_grade_points() -> Result<(), Box<dyn std::error::Error>> {
    for grade in LetterGrade::ALL {
        println!("{:<3} {:.1}", grade.to_code(), grade.points());
    }
    Ok(())
}
