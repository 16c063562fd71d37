mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use facescan_core::{build_reference_store, ReferenceStore, ScanPipeline};
use facescan_vision::OnnxExtractor;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facescan", about = "Find photos of known people in an image folder")]
struct Cli {
    /// TOML config file (default: ./facescan.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the reference store from a folder of reference photos
    References {
        #[arg(long)]
        reference_dir: Option<PathBuf>,
        /// Where to write the reference store JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Scan a folder, copy matches and write the results CSV
    Scan {
        /// Match when similarity > 1 - threshold
        #[arg(long)]
        threshold: Option<f32>,
        #[arg(long)]
        candidates: Option<PathBuf>,
        #[arg(long)]
        matches: Option<PathBuf>,
        #[arg(long)]
        results: Option<PathBuf>,
        /// Reference store JSON to load
        #[arg(long)]
        references: Option<PathBuf>,
    },
    /// Score one image against the reference store without writing anything
    Compare {
        image: PathBuf,
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load_config(cli.config.as_deref())?;
    cfg.apply_env();

    match cli.command {
        Commands::References {
            reference_dir,
            output,
        } => {
            override_with(&mut cfg.reference_dir, reference_dir);
            override_with(&mut cfg.reference_store, output);
            references(&cfg)
        }
        Commands::Scan {
            threshold,
            candidates,
            matches,
            results,
            references,
        } => {
            override_with(&mut cfg.threshold, threshold);
            override_with(&mut cfg.candidates_dir, candidates);
            override_with(&mut cfg.matches_dir, matches);
            override_with(&mut cfg.results, results);
            override_with(&mut cfg.reference_store, references);
            scan(&cfg)
        }
        Commands::Compare { image, threshold } => {
            override_with(&mut cfg.threshold, threshold);
            compare(&cfg, &image)
        }
        Commands::Config => {
            print!("{}", config::render_config(&cfg)?);
            Ok(())
        }
    }
}

fn override_with<T>(slot: &mut T, flag: Option<T>) {
    if let Some(value) = flag {
        *slot = value;
    }
}

fn load_extractor(cfg: &Config) -> Result<OnnxExtractor> {
    OnnxExtractor::from_model_dir(&cfg.model_dir, cfg.min_face_confidence)
        .with_context(|| format!("loading models from {}", cfg.model_dir.display()))
}

fn load_pipeline(cfg: &Config) -> Result<ScanPipeline> {
    let store = ReferenceStore::load(&cfg.reference_store).with_context(|| {
        format!(
            "loading reference store {} (run `facescan references` first)",
            cfg.reference_store.display()
        )
    })?;
    let references = store
        .matrix()
        .context("reference store has no usable vectors")?;
    Ok(ScanPipeline::new(cfg.scan_config(), references)?)
}

fn references(cfg: &Config) -> Result<()> {
    let mut extractor = load_extractor(cfg)?;
    let report = build_reference_store(&mut extractor, &cfg.build_config())
        .context("building reference store")?;

    println!(
        "{} of {} reference images stored in {}",
        report.accepted(),
        report.attempted(),
        cfg.reference_store.display()
    );
    for rejection in &report.rejected {
        println!("  skipped {}: {}", rejection.file, rejection.reason);
    }
    Ok(())
}

fn scan(cfg: &Config) -> Result<()> {
    let pipeline = load_pipeline(cfg)?;
    let mut extractor = load_extractor(cfg)?;
    let report = pipeline.run(&mut extractor).context("scan failed")?;

    let s = report.summary;
    println!(
        "scanned {}: {} matched, {} without faces, {} failed",
        s.scanned, s.matched, s.no_face, s.failed
    );
    println!("results: {}", cfg.results.display());
    println!("matches: {}", cfg.matches_dir.display());
    Ok(())
}

fn compare(cfg: &Config, image: &Path) -> Result<()> {
    let pipeline = load_pipeline(cfg)?;
    let mut extractor = load_extractor(cfg)?;
    let decision = pipeline
        .assess(&mut extractor, image)
        .with_context(|| format!("comparing {}", image.display()))?;

    match decision.best_score {
        Some(score) => println!(
            "{}: {} (best score {:.4}, bound {:.4}, {} face(s) compared)",
            image.display(),
            if decision.matched { "match" } else { "no match" },
            score,
            pipeline.config().match_bound(),
            decision.faces_evaluated
        ),
        None => println!("{}: no face found", image.display()),
    }
    Ok(())
}
