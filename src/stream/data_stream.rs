use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use num::Float;

/// Columns to keep apart from the features: a single one (Name) or several (MultipleNames).
/// # Example
/// ```
/// use light_outliers::stream::data_stream::Target;
/// use light_outliers::stream::iter_csv::IterCsv;
/// use maplit::hashset;
///
/// let content = "Name,Height,Weight,Score\nAlice,1.6,60.0,90.0\nBob,1.8,80.0,85.0";
/// // Single target
/// IterCsv::<f32, &[u8]>::new(content.as_bytes(), Some(Target::Name("Score".to_string()))).unwrap();
/// // Multiple targets
/// IterCsv::<f32, &[u8]>::new(
///     content.as_bytes(),
///     Some(Target::MultipleNames(hashset! {"Height".to_string(), "Weight".to_string()})),
/// )
/// .unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Name(String),
    MultipleNames(HashSet<String>),
}

impl Target {
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Target::Name(n) => n == name,
            Target::MultipleNames(names) => names.contains(name),
        }
    }
}

/// A parsed CSV cell: either a number or raw text.
/// # Example
/// ```
/// use light_outliers::stream::data_stream::Data;
///
/// let scalar = Data::<f32>::Scalar(1.6);
/// let string = Data::<f32>::String("age".to_string());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Data<F: Float + FromStr> {
    Scalar(F),
    String(String),
}

impl<F: Float + FromStr> Data<F> {
    pub fn parse(field: &str) -> Self {
        match field.trim().parse::<F>() {
            Ok(value) => Data::Scalar(value),
            Err(_) => Data::String(field.to_string()),
        }
    }

    pub fn as_scalar(&self) -> Option<F> {
        match self {
            Data::Scalar(v) => Some(*v),
            Data::String(_) => None,
        }
    }
}

/// A streamed record: features only (X) or features plus target columns (XY).
#[derive(Debug, Clone)]
pub enum DataStream<F: Float + FromStr> {
    X(HashMap<String, Data<F>>),
    XY(HashMap<String, Data<F>>, HashMap<String, Data<F>>),
}

impl<F: Float + FromStr> DataStream<F> {
    pub fn get_x(&self) -> &HashMap<String, Data<F>> {
        match self {
            DataStream::X(x) => x,
            DataStream::XY(x, _) => x,
        }
    }

    pub fn get_y(&self) -> Option<&HashMap<String, Data<F>>> {
        match self {
            DataStream::X(_) => None,
            DataStream::XY(_, y) => Some(y),
        }
    }
}
