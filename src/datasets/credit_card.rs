use crate::common::{Dataset, FType};
use crate::datasets::utils;
use crate::error::Result;
use std::{fs::File, io::BufReader, path::Path};

const URL: &str = "https://maxhalford.github.io/files/datasets/creditcardfraud.zip";
const FILE_NAME: &str = "creditcard.csv";

/// Credit card fraud transactions, September 2013.
///
/// 284,807 transactions over two days, 492 of them fraudulent. `V1` to `V28`
/// are PCA components of undisclosed features; `Time` is in seconds since the
/// first transaction and `Amount` is the transaction amount. `Class` is 1 for
/// a fraud, 0 otherwise.
///
/// # Examples
/// ```no_run
/// use light_outliers::datasets::credit_card::CreditCard;
///
/// let transactions = CreditCard::load::<f64>().unwrap();
/// let frauds = CreditCard::frauds(&transactions).unwrap();
///
/// println!("{} transactions, {} frauds", transactions.len(), frauds.len());
/// ```
///
/// Source: Dal Pozzolo et al., "Calibrating Probability with Undersampling for
/// Unbalanced Classification", CIDM 2015.
pub struct CreditCard;

impl CreditCard {
    /// Name of the fraud indicator column.
    pub const TARGET: &'static str = "Class";

    /// Load every transaction, downloading `creditcard.csv` to the working
    /// directory on first use. The `Class` column is kept.
    pub fn load<F: FType>() -> Result<Dataset<F>> {
        if !Path::new(FILE_NAME).exists() {
            utils::download_zip_file(URL, FILE_NAME)?;
        }
        let file = File::open(FILE_NAME)?;
        Dataset::from_csv(BufReader::new(file), None)
    }

    /// Input features: `Time`, `V1` to `V28` and `Amount`.
    pub fn features() -> Vec<String> {
        let mut features = vec!["Time".to_string()];
        features.extend((1..=28).map(|i| format!("V{}", i)));
        features.push("Amount".to_string());
        features
    }

    /// Index keys of the fraudulent transactions.
    pub fn frauds<F: FType>(transactions: &Dataset<F>) -> Result<Vec<usize>> {
        let class = transactions.column(Self::TARGET)?;
        Ok(transactions
            .index()
            .iter()
            .zip(class.iter())
            .filter(|(_, c)| **c == F::one())
            .map(|(&key, _)| key)
            .collect())
    }
}
