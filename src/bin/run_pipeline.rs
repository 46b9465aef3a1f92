use anyhow::Context;
use bio_anomaly_pipeline::pipeline::ExportFormat;
use bio_anomaly_pipeline::{Config, PipelineDriver, UpdateRecord};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Score region-month update counts for instability and anomalies
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON array of {region, month, update_count} rows ("-" reads stdin)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Generate a synthetic table with this many regions instead of reading input
    #[arg(long, conflicts_with = "input")]
    synthetic: Option<usize>,

    /// TOML config file (defaults to $PIPELINE_CONFIG or config/pipeline.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the model seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the expected outlier fraction
    #[arg(long)]
    contamination: Option<f64>,

    /// Export format for both tables (json or csv)
    #[arg(long, default_value_t = ExportFormat::Json)]
    format: ExportFormat,

    /// Anomaly table output path [default: biometric_anomalies.<format>]
    #[arg(long)]
    anomalies_out: Option<PathBuf>,

    /// State table output path [default: state_region_month.<format>]
    #[arg(long)]
    state_out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    if let Some(seed) = args.seed {
        config.anomaly.seed = seed;
    }
    if let Some(contamination) = args.contamination {
        config.anomaly.contamination = contamination;
    }

    bio_anomaly_pipeline::utils::init_from_config(&config.logging)?;

    let driver = PipelineDriver::new(&config.pipeline())?;

    let records = match (&args.input, args.synthetic) {
        (Some(path), _) => read_records(path)?,
        (None, Some(regions)) => generate_synthetic_data(regions, 12, config.anomaly.seed),
        (None, None) => anyhow::bail!("either --input or --synthetic is required"),
    };
    info!(rows = records.len(), "Loaded update records");

    let output = match driver.run(records) {
        Ok(output) => output,
        Err(e) => {
            warn!(kind = ?e.kind(), "Run failed, no tables written");
            return Err(e.into());
        }
    };

    let anomalies_out = args
        .anomalies_out
        .unwrap_or_else(|| PathBuf::from(format!("biometric_anomalies.{}", args.format)));
    let state_out = args
        .state_out
        .unwrap_or_else(|| PathBuf::from(format!("state_region_month.{}", args.format)));

    // serialize both tables before touching the filesystem
    let anomalies = output.render_anomalies(args.format)?;
    let state = output.render_state(args.format)?;

    write_exports(&[
        (anomalies_out.as_path(), anomalies.as_str()),
        (state_out.as_path(), state.as_str()),
    ])?;

    output.report.print_summary();
    println!("Anomaly table: {}", anomalies_out.display());
    println!("State table:   {}", state_out.display());
    println!("Digest:        {}", output.digest());

    Ok(())
}

/// Stage every table in a temp file beside its target, then move them into place.
///
/// If any step fails, files already moved by this call are removed again, so either
/// every export of the run exists or none does.
fn write_exports(exports: &[(&Path, &str)]) -> anyhow::Result<()> {
    let mut staged = Vec::with_capacity(exports.len());
    for &(path, contents) in exports {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("staging {}", path.display()))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("writing {}", path.display()))?;
        staged.push((file, path));
    }

    let mut persisted: Vec<&Path> = Vec::with_capacity(staged.len());
    for (file, path) in staged {
        if let Err(e) = file.persist(path) {
            for done in &persisted {
                if let Err(remove) = std::fs::remove_file(done) {
                    warn!(path = %done.display(), error = %remove, "Could not remove partial export");
                }
            }
            return Err(anyhow::Error::new(e.error).context(format!("writing {}", path.display())));
        }
        persisted.push(path);
    }

    Ok(())
}

fn read_records(path: &Path) -> anyhow::Result<Vec<UpdateRecord>> {
    let mut raw = String::new();
    if path.as_os_str() == "-" {
        std::io::stdin().read_to_string(&mut raw)?;
    } else {
        raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
    }
    serde_json::from_str(&raw).context("input must be a JSON array of update records")
}

/// Seeded synthetic region-month table for demonstration runs.
///
/// A few regions get a one-month surge so the model has something to find.
fn generate_synthetic_data(regions: usize, months: usize, seed: u64) -> Vec<UpdateRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::with_capacity(regions * months);

    for r in 0..regions {
        let region = format!("{}", 110001 + r * 7);
        let base: f64 = rng.gen_range(50.0..5000.0);
        let surge_month = if rng.gen_bool(0.1) {
            Some(rng.gen_range(0..months))
        } else {
            None
        };

        for m in 0..months {
            let noise: f64 = rng.gen_range(-0.1..0.1);
            let mut count = (base * (1.0 + noise)).round();
            if surge_month == Some(m) {
                count *= rng.gen_range(3.0..8.0);
            }
            records.push(UpdateRecord::new(
                region.clone(),
                format!("{}-{:02}", 2024 + m / 12, m % 12 + 1),
                count.max(0.0),
            ));
        }
    }

    records
}
