use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;
use std::{collections::HashMap, marker::PhantomData};

use csv::{Reader, ReaderBuilder, StringRecord};
use num::Float;

use super::data_stream::{Data, DataStream, Target};

/// Iterates over the records of a CSV source with a header row.
///
/// Each record is yielded as a [`DataStream`]; cells in `y_cols` go to the
/// target map, every other cell to the feature map.
pub struct IterCsv<F: Float + FromStr, R: Read> {
    reader: Reader<R>,
    headers: StringRecord,
    feature_names: Vec<String>,
    y_cols: Option<Target>,
    _marker: PhantomData<F>,
}

impl<F: Float + FromStr, R: Read> IterCsv<F, R> {
    pub fn new(reader: R, y_cols: Option<Target>) -> Result<Self, csv::Error> {
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers = reader.headers()?.to_owned();
        let feature_names = headers
            .iter()
            .filter(|h| !y_cols.as_ref().map_or(false, |t| t.contains(h)))
            .map(str::to_string)
            .collect();
        Ok(Self {
            reader,
            headers,
            feature_names,
            y_cols,
            _marker: PhantomData,
        })
    }

    /// Header names of the feature columns, in file order.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }
}

impl<F: Float + FromStr> IterCsv<F, BufReader<File>> {
    pub fn from_path<P: AsRef<Path>>(path: P, y_cols: Option<Target>) -> Result<Self, csv::Error> {
        let file = File::open(path)?;
        IterCsv::new(BufReader::new(file), y_cols)
    }
}

impl<F: Float + FromStr, R: Read> Iterator for IterCsv<F, R> {
    type Item = Result<DataStream<F>, csv::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(false) => None,
            Ok(true) => {
                let mut x_data = HashMap::new();
                let mut y_data = HashMap::new();
                for (header, field) in self.headers.iter().zip(record.iter()) {
                    let cell = Data::parse(field);
                    match &self.y_cols {
                        Some(cols) if cols.contains(header) => {
                            y_data.insert(header.to_string(), cell);
                        }
                        _ => {
                            x_data.insert(header.to_string(), cell);
                        }
                    }
                }
                Some(Ok(match self.y_cols {
                    Some(_) => DataStream::XY(x_data, y_data),
                    None => DataStream::X(x_data),
                }))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    const CONTENT: &str = "Name,Height,Weight,Score
Alice,1.6,60.0,90.0
Bob,1.8,80.0,85.0
Charlie,1.7,70.0,92.5
";

    #[test]
    fn test_iter_csv_splits_features_and_target() {
        let iter_csv: IterCsv<f32, Cursor<&str>> =
            IterCsv::new(Cursor::new(CONTENT), Some(Target::Name("Score".to_string()))).unwrap();
        assert_eq!(iter_csv.feature_names(), &["Name", "Height", "Weight"]);

        let rows: Vec<DataStream<f32>> = iter_csv.map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        let first = &rows[0];
        assert_eq!(first.get_x().get("Height"), Some(&Data::Scalar(1.6)));
        assert_eq!(
            first.get_x().get("Name"),
            Some(&Data::String("Alice".to_string()))
        );
        assert_eq!(
            first.get_y().unwrap().get("Score"),
            Some(&Data::Scalar(90.0))
        );
    }

    #[test]
    fn test_iter_csv_without_target() {
        let iter_csv: IterCsv<f64, Cursor<&str>> = IterCsv::new(Cursor::new(CONTENT), None).unwrap();
        for data_stream in iter_csv {
            let data_stream = data_stream.unwrap();
            assert!(data_stream.get_y().is_none());
            assert_eq!(data_stream.get_x().len(), 4);
        }
    }

    #[test]
    fn test_iter_csv_from_path() {
        let dir = tempdir().expect("failed to create temp dir");
        let file_path = dir.path().join("test.csv");
        std::fs::write(&file_path, CONTENT).expect("failed to write temp file");

        let iter_csv: IterCsv<f32, BufReader<File>> = IterCsv::from_path(&file_path, None).unwrap();
        assert_eq!(iter_csv.count(), 3);
    }
}
