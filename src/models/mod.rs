//! Purpose: Define the `Model` capability and the TradingHours record kinds.
//! Exports: `Model`, `CsvRecords`, `FinId`, `Currency`, `CurrencyHoliday`, `Market`,
//! `MarketHoliday`, `Schedule`, `Phase`, `PhaseGenerator`.
//! Role: Serialization contract between CSV sources, the store, and the catalog.
//! Invariants: `from_dict(to_dict(r)) == r` and `from_tuple(to_tuple(r)) == r`.
//! Invariants: Tuple order is `FIELDS`; dictionary keys are the snake_case field names.
use std::fs::File;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::core::error::{Error, ErrorKind};

mod currency;
mod fin_id;
mod market;
mod phase;
mod schedule;

pub use currency::{Currency, CurrencyHoliday};
pub use fin_id::FinId;
pub use market::{Market, MarketHoliday};
pub use phase::{Phase, PhaseGenerator, REGULAR_GROUP, parse_date};
pub use schedule::Schedule;

pub trait Model: Serialize + DeserializeOwned + Sized + 'static {
    /// Type name used in diagnostics.
    const NAME: &'static str;
    /// Field names in tuple order.
    const FIELDS: &'static [&'static str];

    fn to_dict(&self) -> Result<Map<String, Value>, Error> {
        match serde_json::to_value(self) {
            Ok(Value::Object(dict)) => Ok(dict),
            Ok(_) => Err(Error::new(ErrorKind::Internal)
                .with_message(format!("{} does not serialize as an object", Self::NAME))),
            Err(err) => Err(Error::new(ErrorKind::Internal)
                .with_message(format!("failed to serialize {}", Self::NAME))
                .with_source(err)),
        }
    }

    fn from_dict(dict: Map<String, Value>) -> Result<Self, Error> {
        serde_json::from_value(Value::Object(dict)).map_err(|err| decode_error::<Self>(err))
    }

    fn to_tuple(&self) -> Result<Vec<Value>, Error> {
        let mut dict = self.to_dict()?;
        Ok(Self::FIELDS
            .iter()
            .map(|field| dict.remove(*field).unwrap_or(Value::Null))
            .collect())
    }

    fn from_tuple(tuple: Vec<Value>) -> Result<Self, Error> {
        if tuple.len() != Self::FIELDS.len() {
            return Err(Error::new(ErrorKind::Corrupt).with_message(format!(
                "{} expects {} fields, got {}",
                Self::NAME,
                Self::FIELDS.len(),
                tuple.len()
            )));
        }
        let dict = Self::FIELDS
            .iter()
            .map(|field| field.to_string())
            .zip(tuple)
            .collect();
        Self::from_dict(dict)
    }

    /// Decodes a persisted record, either a dictionary or a field tuple.
    fn from_record(record: &Value) -> Result<Self, Error> {
        match record {
            Value::Array(tuple) => Self::from_tuple(tuple.clone()),
            _ => serde::Deserialize::deserialize(record).map_err(|err| decode_error::<Self>(err)),
        }
    }

    /// Opens a headered CSV file of this model. Rows are parsed lazily.
    fn from_csv(path: &Path) -> Result<CsvRecords<Self>, Error> {
        CsvRecords::open(path)
    }
}

fn decode_error<M: Model>(err: serde_json::Error) -> Error {
    Error::new(ErrorKind::Corrupt)
        .with_message(format!("record does not decode as {}", M::NAME))
        .with_source(err)
}

/// Lazy, single-pass iterator over the rows of one CSV source.
pub struct CsvRecords<M: Model> {
    path: PathBuf,
    rows: csv::DeserializeRecordsIntoIter<File, M>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> CsvRecords<M> {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = File::open(path).map_err(|err| {
            Error::io(err, path)
                .with_message(format!("{} source is unavailable", M::NAME))
                .with_hint("Run `tradinghours import` to download the data files.")
        })?;
        let rows = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(file)
            .into_deserialize();
        Ok(Self {
            path: path.to_path_buf(),
            rows,
            _model: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<M: Model> Iterator for CsvRecords<M> {
    type Item = Result<M, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(row.map_err(|err| csv_error::<M>(err, &self.path)))
    }
}

fn csv_error<M: Model>(err: csv::Error, path: &Path) -> Error {
    let line = err.position().map(|position| position.line());
    let kind = if err.is_io_error() {
        ErrorKind::Io
    } else {
        ErrorKind::Corrupt
    };
    let mut error = Error::new(kind)
        .with_message(format!("invalid {} row", M::NAME))
        .with_path(path);
    if let Some(line) = line {
        error = error.with_line(line);
    }
    error.with_source(err)
}

#[cfg(test)]
mod tests {
    use super::{Currency, Model};
    use crate::core::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn tuple_follows_field_order() {
        let currency = Currency::sample("USD");
        let tuple = currency.to_tuple().expect("tuple");
        assert_eq!(tuple.len(), Currency::FIELDS.len());
        assert_eq!(tuple[0], json!("USD"));
        assert_eq!(Currency::from_tuple(tuple).expect("from tuple"), currency);
    }

    #[test]
    fn from_record_accepts_dict_or_tuple() {
        let currency = Currency::sample("EUR");
        let dict = serde_json::Value::Object(currency.to_dict().expect("dict"));
        assert_eq!(Currency::from_record(&dict).expect("dict"), currency);
        let tuple = serde_json::Value::Array(currency.to_tuple().expect("tuple"));
        assert_eq!(Currency::from_record(&tuple).expect("tuple"), currency);
    }

    #[test]
    fn mismatched_records_are_decode_errors() {
        let err = Currency::from_record(&json!({ "unexpected": true })).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        let err = Currency::from_tuple(vec![json!("USD")]).expect_err("short tuple");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        let err = Currency::from_record(&json!("USD")).expect_err("scalar");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
    }

    #[test]
    fn missing_csv_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Currency::from_csv(&dir.path().join("currencies.csv"))
            .err()
            .expect("missing source");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn bad_csv_row_reports_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("currencies.csv");
        std::fs::write(&path, "Currency Code,Currency Name\nUSD,US Dollar\nEUR\n").expect("write");
        let rows: Vec<_> = Currency::from_csv(&path).expect("open").collect();
        assert!(rows[0].is_ok());
        let err = rows[1].as_ref().expect_err("short row");
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        assert_eq!(err.line(), Some(3));
    }
}
