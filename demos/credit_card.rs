use light_outliers::anomaly::isolation_forest::{IsolationForest, IsolationForestParams};
use light_outliers::anomaly::{score, train};
use light_outliers::datasets::credit_card::CreditCard;
use light_outliers::partition::{partition, PartitionMode};
use light_outliers::plot::distribution::{DisplayMode, Histogram};
use light_outliers::plot::PlotStyle;
use light_outliers::trimming::trim;
use std::collections::HashSet;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let now = Instant::now();

    // PARAMETERS
    let features = CreditCard::features();
    let params = IsolationForestParams::default().with_n_estimators(200);

    // LOADING
    let transactions = CreditCard::load::<f64>().unwrap();
    let frauds: HashSet<usize> = CreditCard::frauds(&transactions).unwrap().into_iter().collect();
    println!(
        "Loaded {} transactions, {} frauds",
        transactions.len(),
        frauds.len()
    );

    let trimmed = trim(&transactions, "Amount", 1.5).unwrap();
    println!(
        "IQR trimming on Amount keeps {} transactions",
        trimmed.len()
    );
    let hist = Histogram::build(
        &transactions,
        "Amount",
        DisplayMode::WithoutOutliers,
        50,
        "Amount without outliers",
        PlotStyle::default(),
    )
    .unwrap();
    println!("Histogram of Amount over {} values", hist.n_values());

    // TRAINING AND SCORING
    let model: IsolationForest<f64> = train(&transactions, &features, params).unwrap();
    let scored = score(&transactions, &features, &model).unwrap();

    for mode in [
        PartitionMode::Label,
        PartitionMode::threshold_default(),
        PartitionMode::Percentile { percent: 0.5 },
    ] {
        let result = partition(&scored, mode).unwrap();
        let caught = result
            .outlier_index
            .iter()
            .filter(|key| frauds.contains(*key))
            .count();
        println!(
            "{:>10}: {} outliers, {} of them frauds ({:.2}% of all frauds)",
            mode.kind().to_string(),
            result.n_outliers(),
            caught,
            100.0 * caught as f64 / frauds.len().max(1) as f64
        );
    }

    let elapsed_time = now.elapsed();
    println!("Took {}ms", elapsed_time.as_millis());
}
