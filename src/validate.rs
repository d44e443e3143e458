//! Typed decoding of result rows

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::connection::Row;
use crate::error::{Error, Result};

/// Deserialize every row into `T`.
///
/// Each row is presented to serde as a JSON object keyed by column name. The
/// first row that does not fit becomes [`Error::RowValidation`], carrying the
/// offending row and `context`.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>, context: &JsonValue) -> Result<Vec<T>> {
   rows
      .into_iter()
      .map(|row| {
         let value = JsonValue::Object(row.into_iter().collect());
         serde_json::from_value(value.clone()).map_err(|err| Error::RowValidation {
            expected: std::any::type_name::<T>().to_string(),
            value,
            errors: vec![err.to_string()],
            context: context.clone(),
         })
      })
      .collect()
}
