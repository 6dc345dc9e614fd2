use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::{Read, Write};
use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};
use std::str::FromStr;

use ndarray::{Array2, ArrayView1, Axis, ScalarOperand};
use num::{Float, FromPrimitive};
use tracing::debug;

use crate::error::{OutlierError, Result};
use crate::stream::data_stream::{Data, Target};
use crate::stream::iter_csv::IterCsv;

/// Numeric type accepted by every model and dataset in the crate.
///
/// Both `f32` and `f64` implement it.
pub trait FType:
    Float
    + FromPrimitive
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
    + fmt::Debug
    + fmt::Display
    + ScalarOperand
    + FromStr
    + Send
    + Sync
{
}

impl<T> FType for T where
    T: Float
        + FromPrimitive
        + AddAssign
        + SubAssign
        + MulAssign
        + DivAssign
        + fmt::Debug
        + fmt::Display
        + ScalarOperand
        + FromStr
        + Send
        + Sync
{
}

/// Convert a constant into `F`. Total for `f32` and `f64`.
pub(crate) fn cast_f64<F: FType>(value: f64) -> F {
    F::from_f64(value).unwrap_or_else(F::nan)
}

/// Convert a count into `F`. Total for `f32` and `f64`.
pub(crate) fn cast_usize<F: FType>(value: usize) -> F {
    F::from_usize(value).unwrap_or_else(F::infinity)
}

/// Total order on floats with NaN sorted after every number.
pub(crate) fn nan_last<F: FType>(a: &F, b: &F) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
    }
}

/// A single record, using a HashMap of feature names to values.
///
/// # Example
///
/// ```
/// use light_outliers::common::Observation;
///
/// let mut obs: Observation<f32> = Observation::new();
/// obs.insert("feature1".to_string(), 1.0);
/// obs.insert("feature2".to_string(), 2.0);
/// ```
pub type Observation<F> = HashMap<String, F>;

/// Binary verdict of an anomaly detector.
///
/// Encoded as `+1` for normal records and `-1` for outliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnomalyLabel {
    Normal,
    Outlier,
}

impl AnomalyLabel {
    pub fn as_i8(self) -> i8 {
        match self {
            AnomalyLabel::Normal => 1,
            AnomalyLabel::Outlier => -1,
        }
    }

    pub fn is_outlier(self) -> bool {
        self == AnomalyLabel::Outlier
    }
}

impl fmt::Display for AnomalyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i8())
    }
}

/// In-memory tabular dataset of numeric columns.
///
/// Every record carries a stable index key. Filtering keeps the keys of the
/// retained records, so results can always be mapped back to the source rows.
///
/// # Example
///
/// ```
/// use light_outliers::common::Dataset;
/// use ndarray::array;
///
/// let ds = Dataset::new(
///     vec!["height".to_string(), "weight".to_string()],
///     array![[1.6, 60.0], [1.8, 80.0], [1.7, 70.0]],
/// )
/// .unwrap();
///
/// assert_eq!(ds.len(), 3);
/// assert_eq!(ds.index(), &[0, 1, 2]);
/// assert_eq!(ds.column("weight").unwrap()[1], 80.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset<F: FType> {
    columns: Vec<String>,
    index: Vec<usize>,
    values: Array2<F>,
}

impl<F: FType> Dataset<F> {
    /// Build a dataset whose index keys are the row positions `0..n`.
    pub fn new(columns: Vec<String>, values: Array2<F>) -> Result<Self> {
        if values.ncols() != columns.len() {
            return Err(OutlierError::invalid_parameter(
                "columns",
                format!(
                    "{} names given for {} value columns",
                    columns.len(),
                    values.ncols()
                ),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(OutlierError::invalid_parameter(
                "columns",
                format!("duplicate column '{}'", dup),
            ));
        }
        let index = (0..values.nrows()).collect();
        Ok(Dataset {
            columns,
            index,
            values,
        })
    }

    /// Replace the index keys. Keys must be unique and one per record.
    pub fn with_index(mut self, index: Vec<usize>) -> Result<Self> {
        if index.len() != self.values.nrows() {
            return Err(OutlierError::invalid_parameter(
                "index",
                format!("{} keys given for {} records", index.len(), self.len()),
            ));
        }
        let unique: HashSet<usize> = index.iter().copied().collect();
        if unique.len() != index.len() {
            return Err(OutlierError::invalid_parameter(
                "index",
                "keys must be unique",
            ));
        }
        self.index = index;
        Ok(self)
    }

    /// Build a dataset from observations, reading `columns` in the given order.
    pub fn from_records(columns: &[String], records: &[Observation<F>]) -> Result<Self> {
        let mut values = Array2::zeros((records.len(), columns.len()));
        for (row, record) in records.iter().enumerate() {
            for (col, name) in columns.iter().enumerate() {
                values[[row, col]] = *record
                    .get(name)
                    .ok_or_else(|| OutlierError::InvalidFeature(name.clone()))?;
            }
        }
        Dataset::new(columns.to_vec(), values)
    }

    /// Load a dataset from CSV content with a header row.
    ///
    /// Columns listed in `target` are left out, as are columns holding any
    /// non-numeric cell. Blank cells load as NaN. Column order follows the
    /// header.
    pub fn from_csv<R: Read>(reader: R, target: Option<Target>) -> Result<Self> {
        let iter_csv = IterCsv::<F, R>::new(reader, target)?;
        let headers: Vec<String> = iter_csv.feature_names().to_vec();

        let mut rows: Vec<HashMap<String, Data<F>>> = Vec::new();
        for data_stream in iter_csv {
            rows.push(data_stream?.get_x().clone());
        }

        let columns: Vec<String> = headers
            .into_iter()
            .filter(|name| {
                let numeric = rows.iter().all(|row| match row.get(name) {
                    Some(Data::Scalar(_)) => true,
                    Some(Data::String(s)) => s.trim().is_empty(),
                    None => false,
                });
                if !numeric {
                    debug!(column = %name, "dropping non-numeric column");
                }
                numeric
            })
            .collect();

        let mut values = Array2::zeros((rows.len(), columns.len()));
        for (r, row) in rows.iter().enumerate() {
            for (c, name) in columns.iter().enumerate() {
                values[[r, c]] = match row.get(name) {
                    Some(Data::Scalar(v)) => *v,
                    _ => F::nan(),
                };
            }
        }
        Dataset::new(columns, values)
    }

    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn index(&self) -> &[usize] {
        &self.index
    }

    pub fn values(&self) -> &Array2<F> {
        &self.values
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, F>> {
        let col = self
            .column_position(name)
            .ok_or_else(|| OutlierError::InvalidFeature(name.to_string()))?;
        Ok(self.values.column(col))
    }

    /// Project the dataset onto `features`, in the order given.
    pub fn select<S: AsRef<str>>(&self, features: &[S]) -> Result<Array2<F>> {
        if features.is_empty() {
            return Err(OutlierError::InvalidFeatureSet {
                features: Vec::new(),
                reason: "no features selected".to_string(),
            });
        }
        let mut positions = Vec::with_capacity(features.len());
        let mut missing = Vec::new();
        for name in features {
            match self.column_position(name.as_ref()) {
                Some(pos) => positions.push(pos),
                None => missing.push(name.as_ref().to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(OutlierError::missing_features(missing));
        }
        Ok(self.values.select(Axis(1), &positions))
    }

    /// The record at `row` as an observation map.
    pub fn observation(&self, row: usize) -> Observation<F> {
        self.columns
            .iter()
            .cloned()
            .zip(self.values.row(row).iter().copied())
            .collect()
    }

    /// Row position of the record with index key `key`.
    pub fn position(&self, key: usize) -> Option<usize> {
        self.index.iter().position(|&k| k == key)
    }

    /// Lookup table from index key to row position.
    pub fn positions(&self) -> HashMap<usize, usize> {
        self.index
            .iter()
            .enumerate()
            .map(|(row, &key)| (key, row))
            .collect()
    }

    /// Keep the records whose `mask` entry is true.
    pub fn filter_rows(&self, mask: &[bool]) -> Self {
        let rows: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(row, &keep)| keep.then_some(row))
            .collect();
        Dataset {
            columns: self.columns.clone(),
            index: rows.iter().map(|&row| self.index[row]).collect(),
            values: self.values.select(Axis(0), &rows),
        }
    }

    /// Write the records as CSV, with the index keys in a leading `index`
    /// column.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        let mut header = vec!["index".to_string()];
        header.extend(self.columns.iter().cloned());
        csv_writer.write_record(&header)?;
        for (key, row) in self.index.iter().zip(self.values.rows()) {
            let mut record = vec![key.to_string()];
            record.extend(row.iter().map(|v| v.to_string()));
            csv_writer.write_record(&record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;
    use ndarray::array;

    fn sample() -> Dataset<f64> {
        Dataset::new(
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            array![[1.0, 10.0, 100.0], [2.0, 20.0, 200.0], [3.0, 30.0, 300.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_anomaly_label_encoding() {
        assert_eq!(AnomalyLabel::Normal.as_i8(), 1);
        assert_eq!(AnomalyLabel::Outlier.as_i8(), -1);
        assert_eq!(AnomalyLabel::Outlier.to_string(), "-1");
    }

    #[test]
    fn test_new_rejects_mismatched_columns() {
        let result = Dataset::new(vec!["a".to_string()], array![[1.0, 2.0]]);
        assert!(matches!(
            result,
            Err(OutlierError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_new_rejects_duplicate_columns() {
        let result = Dataset::new(vec!["a".to_string(), "a".to_string()], array![[1.0, 2.0]]);
        assert!(result.is_err());
    }

    #[test]
    fn test_with_index_requires_unique_keys() {
        assert!(sample().with_index(vec![5, 5, 6]).is_err());
        assert!(sample().with_index(vec![5, 6]).is_err());
        let ds = sample().with_index(vec![7, 8, 9]).unwrap();
        assert_eq!(ds.position(8), Some(1));
    }

    #[test]
    fn test_select_keeps_requested_order() {
        let x = sample().select(&["c", "a"]).unwrap();
        assert_eq!(x, array![[100.0, 1.0], [200.0, 2.0], [300.0, 3.0]]);
    }

    #[test]
    fn test_select_reports_every_missing_feature() {
        let err = sample().select(&["a", "x", "y"]).unwrap_err();
        match err {
            OutlierError::InvalidFeatureSet { features, .. } => {
                assert_eq!(features, vec!["x".to_string(), "y".to_string()])
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_select_empty_feature_list() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            sample().select(&empty),
            Err(OutlierError::InvalidFeatureSet { .. })
        ));
    }

    #[test]
    fn test_filter_rows_preserves_index_and_columns() {
        let ds = sample().with_index(vec![10, 11, 12]).unwrap();
        let filtered = ds.filter_rows(&[true, false, true]);
        assert_eq!(filtered.index(), &[10, 12]);
        assert_eq!(filtered.columns(), ds.columns());
        assert_eq!(filtered.column("b").unwrap().to_vec(), vec![10.0, 30.0]);
    }

    #[test]
    fn test_from_records_round_trip() {
        let records = vec![
            hashmap! {"x".to_string() => 1.0, "y".to_string() => 2.0},
            hashmap! {"x".to_string() => 3.0, "y".to_string() => 4.0},
        ];
        let columns = vec!["y".to_string(), "x".to_string()];
        let ds: Dataset<f64> = Dataset::from_records(&columns, &records).unwrap();
        assert_eq!(ds.values(), &array![[2.0, 1.0], [4.0, 3.0]]);
        assert_eq!(ds.observation(1), records[1]);
    }

    #[test]
    fn test_from_records_missing_value() {
        let records = vec![hashmap! {"x".to_string() => 1.0}];
        let columns = vec!["x".to_string(), "y".to_string()];
        let result: Result<Dataset<f64>> = Dataset::from_records(&columns, &records);
        assert!(matches!(result, Err(OutlierError::InvalidFeature(name)) if name == "y"));
    }

    #[test]
    fn test_from_csv_drops_text_and_target_columns() {
        let content = "Name,Height,Weight,Score\nAlice,1.6,60.0,90.0\nBob,1.8,80.0,85.0";
        let ds: Dataset<f32> = Dataset::from_csv(
            content.as_bytes(),
            Some(Target::Name("Score".to_string())),
        )
        .unwrap();
        assert_eq!(ds.columns(), &["Height".to_string(), "Weight".to_string()]);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.column("Weight").unwrap()[1], 80.0);
    }

    #[test]
    fn test_write_csv_leads_with_index() {
        let ds = sample().with_index(vec![4, 2, 9]).unwrap();
        let mut buffer = Vec::new();
        ds.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "index,a,b,c\n4,1,10,100\n2,2,20,200\n9,3,30,300\n");
    }

    #[test]
    fn test_from_csv_loads_blank_cells_as_nan() {
        let content = "Height,Weight\n1.6,60.0\n1.8,\n,75.0";
        let ds: Dataset<f64> = Dataset::from_csv(content.as_bytes(), None).unwrap();
        assert_eq!(ds.columns(), &["Height".to_string(), "Weight".to_string()]);
        let weight = ds.column("Weight").unwrap();
        assert_eq!(weight[0], 60.0);
        assert!(weight[1].is_nan());
        assert!(ds.column("Height").unwrap()[2].is_nan());
    }
}
