//! pietcheck CLI
//!
//! Commands: catalog, validate, normalize, palette
//! Reports go to stdout, logs to stderr (RUST_LOG)
//! Exit code 2 when any program is invalid or unreadable

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pietcheck::{
    normalize, report, Catalog, NormalizeOutcome, NormalizePolicy, Palette, ReportFormat, RunConfig,
    ValidationRun,
};

#[derive(Parser)]
#[command(name = "pietcheck-cli")]
#[command(about = "pietcheck - palette validator for Piet program images")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write programs.json from a directory of program folders
    Catalog {
        /// Directory holding one folder per category
        #[arg(short, long, default_value = "public/bin")]
        root: PathBuf,

        /// Category folders to include
        #[arg(short, long = "category", default_values = ["brainfuck", "piet"])]
        categories: Vec<String>,

        /// URL prefix the programs are served under
        #[arg(short, long, default_value = "/esolangs/bin")]
        url_root: String,

        /// Default program per category, as category=file
        #[arg(short, long = "default", value_parser = parse_default)]
        defaults: Vec<(String, String)>,

        /// Output file
        #[arg(short, long, default_value = "public/programs.json")]
        out: PathBuf,
    },

    /// Validate every program of a category against the palette
    Validate {
        /// Catalog file
        #[arg(long, default_value = "public/programs.json")]
        catalog: PathBuf,

        /// Directory holding the category's program files
        /// [default: <catalog dir>/bin/<category>]
        #[arg(long)]
        programs_dir: Option<PathBuf>,

        /// JSON run configuration
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        category: Option<String>,

        /// in-place, in-memory or off
        #[arg(long)]
        normalize: Option<NormalizePolicy>,

        /// Worker threads, 0 for one per core
        #[arg(short, long)]
        jobs: Option<usize>,

        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },

    /// Strip color-management chunks from image files in place
    Normalize {
        files: Vec<PathBuf>,
    },

    /// Print the palette
    Palette,
}

fn parse_default(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(c, f)| (c.to_string(), f.to_string()))
        .ok_or_else(|| format!("expected category=file, got {:?}", s))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Catalog { root, categories, url_root, defaults, out } => {
            let names: Vec<&str> = categories.iter().map(String::as_str).collect();
            let defaults: BTreeMap<_, _> = defaults.into_iter().collect();
            let catalog = Catalog::generate(&root, &names, &url_root, &defaults)?;
            catalog.save(&out)?;
            log::info!("wrote {}", out.display());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Validate { catalog, programs_dir, config, category, normalize: policy, jobs, format } => {
            let mut run_config = match &config {
                Some(path) => RunConfig::load(path)?,
                None => RunConfig::default(),
            };
            if let Some(category) = category {
                run_config.category = category;
            }
            if let Some(policy) = policy {
                run_config.normalize = policy;
            }
            if let Some(jobs) = jobs {
                run_config.jobs = jobs;
            }

            let programs = Catalog::load(&catalog)?;
            let manifest = programs.category(&run_config.category)?;
            let base_dir = match programs_dir {
                Some(dir) => dir,
                None => default_programs_dir(&catalog, &run_config.category),
            };
            if !base_dir.is_dir() {
                bail!("programs directory {} does not exist", base_dir.display());
            }

            let pipeline = ValidationRun::new(Palette::piet(), run_config);
            let result = pipeline.run(manifest, &base_dir)?;
            report::emit(&mut io::stdout().lock(), &result, format)
                .context("failed to write report")?;

            Ok(if result.all_valid() { ExitCode::SUCCESS } else { ExitCode::from(2) })
        }

        Commands::Normalize { files } => {
            let mut failed = false;
            for path in &files {
                match normalize(path) {
                    Ok(n) => {
                        if let NormalizeOutcome::Stripped { chunks } = n.outcome {
                            println!("{}: removed {}", path.display(), chunks.join(", "));
                        }
                    }
                    Err(e) => {
                        eprintln!("{}: {}", path.display(), e);
                        failed = true;
                    }
                }
            }
            Ok(if failed { ExitCode::from(2) } else { ExitCode::SUCCESS })
        }

        Commands::Palette => {
            let palette = Palette::piet();
            for &color in palette.colors() {
                match palette.describe(color) {
                    Some(codel) => println!("{}  {}", color, codel),
                    None => println!("{}", color),
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// `public/programs.json` pairs with `public/bin/<category>`.
fn default_programs_dir(catalog: &Path, category: &str) -> PathBuf {
    catalog
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("bin")
        .join(category)
}
