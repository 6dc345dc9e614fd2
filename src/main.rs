use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use light_outliers::anomaly::isolation_forest::{
    Contamination, IsolationForest, IsolationForestParams, MaxSamples,
};
use light_outliers::anomaly::{score, train, ScoredDataset};
use light_outliers::common::Dataset;
use light_outliers::error::Result;
use light_outliers::partition::{partition, PartitionMode, PartitionResult};
use light_outliers::plot::projection::{ProjectionMode, ScatterPlot};
use light_outliers::plot::PlotStyle;
use light_outliers::trimming::{trim, DEFAULT_DELTA};

#[derive(Parser)]
#[command(name = "light-outliers")]
#[command(about = "Outlier detection on numeric CSV data", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop the records outside the IQR fences of one feature
    Trim {
        /// Input CSV file with a header row
        #[arg(short, long)]
        input: PathBuf,

        /// Feature to trim on
        #[arg(short, long)]
        feature: String,

        /// Fence multiplier applied to the IQR
        #[arg(short, long, default_value_t = DEFAULT_DELTA)]
        delta: f64,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Score every record with an isolation forest and split off the outliers
    Detect {
        #[command(flatten)]
        detect: DetectArgs,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Project records onto their principal components, outliers marked
    Project {
        #[command(flatten)]
        detect: DetectArgs,

        /// Number of components shown (2D or 3D)
        #[arg(long, default_value = "3D")]
        dims: ProjectionMode,

        /// Output file with one row per plotted point
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Args)]
struct DetectArgs {
    /// Input CSV file with a header row
    #[arg(short, long)]
    input: PathBuf,

    /// Comma-separated features used by the model
    #[arg(short, long, value_delimiter = ',', required = true)]
    features: Vec<String>,

    /// Number of trees
    #[arg(long, default_value_t = 1000)]
    n_estimators: usize,

    /// Records per tree: auto, a count, or a fraction
    #[arg(long, default_value = "auto")]
    max_samples: MaxSamples,

    /// Draw records with replacement
    #[arg(long)]
    bootstrap: bool,

    /// Expected share of outliers: auto or a fraction in (0, 0.5]
    #[arg(long, default_value = "auto")]
    contamination: Contamination,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Partition mode (label, threshold, percentile)
    #[arg(short, long, default_value = "label")]
    mode: String,

    /// Score threshold of the threshold mode
    #[arg(long, default_value_t = -0.5, allow_hyphen_values = true)]
    threshold: f64,

    /// Share of records, in percent, of the percentile mode
    #[arg(long, default_value_t = 0.5)]
    percent: f64,
}

impl DetectArgs {
    fn params(&self) -> IsolationForestParams {
        IsolationForestParams::default()
            .with_n_estimators(self.n_estimators)
            .with_max_samples(self.max_samples)
            .with_bootstrap(self.bootstrap)
            .with_contamination(self.contamination)
            .with_seed(Some(self.seed))
    }

    fn run(&self) -> Result<(Dataset<f64>, ScoredDataset<f64>, PartitionResult)> {
        let dataset = load(&self.input)?;
        let mode = PartitionMode::parse(&self.mode, self.threshold, self.percent)?;

        let now = Instant::now();
        let model: IsolationForest<f64> = train(&dataset, &self.features, self.params())?;
        let scored = score(&dataset, &self.features, &model)?;
        let result = partition(&scored, mode)?;
        info!(
            records = dataset.len(),
            outliers = result.n_outliers(),
            elapsed_ms = now.elapsed().as_millis() as u64,
            "detection done"
        );
        Ok((dataset, scored, result))
    }
}

fn load(path: &Path) -> Result<Dataset<f64>> {
    let file = File::open(path)?;
    Dataset::from_csv(BufReader::new(file), None)
}

fn create_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout().lock()),
    })
}

fn write_scores<W: Write>(writer: W, scored: &ScoredDataset<f64>, result: &PartitionResult) -> Result<()> {
    let outliers: std::collections::HashSet<usize> = result.outlier_index.iter().copied().collect();
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(["index", "score", "label", "outlier"])?;
    for (key, label, score) in scored.iter() {
        csv_writer.write_record(&[
            key.to_string(),
            score.to_string(),
            label.to_string(),
            outliers.contains(&key).to_string(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Trim {
            input,
            feature,
            delta,
            output,
        } => {
            let dataset = load(&input)?;
            let trimmed = trim(&dataset, &feature, delta)?;
            info!(
                kept = trimmed.len(),
                removed = dataset.len() - trimmed.len(),
                "trim done"
            );
            trimmed.write_csv(create_output(output.as_deref())?)
        }
        Commands::Detect { detect, output } => {
            let (_, scored, result) = detect.run()?;
            write_scores(create_output(output.as_deref())?, &scored, &result)
        }
        Commands::Project {
            detect,
            dims,
            output,
        } => {
            let (dataset, _, result) = detect.run()?;
            let plot = ScatterPlot::build(
                &dataset,
                &detect.features,
                &result,
                dims,
                PlotStyle::default(),
            )?;
            plot.write_csv(File::create(&output)?)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
