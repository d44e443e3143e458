//! SQLite value to JSON decoding

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqliteRow, SqliteValueRef};
use sqlx::{Column, Decode, Row as _, Sqlite, TypeInfo, ValueRef};

use crate::config::TypeParsers;
use crate::connection::Row;
use crate::error::Cause;

/// Decode a row into a column-ordered JSON map.
///
/// Columns whose declared type has a registered parser are handed to it as
/// text; everything else goes through [`to_json`]. NULL is never parsed.
pub(crate) fn decode_row(row: &SqliteRow, parsers: Option<&TypeParsers>) -> Result<Row, Cause> {
   let mut value = Row::default();

   for (i, column) in row.columns().iter().enumerate() {
      let raw = row.try_get_raw(i)?;
      let parser = parsers.and_then(|parsers| parsers.get(column.type_info().name()));

      let v = match parser {
         Some(parse) if !raw.is_null() => {
            let text = <String as Decode<Sqlite>>::decode(raw)?;
            parse(&text)
         }
         _ => to_json(raw)?,
      };

      value.insert(column.name().to_string(), v);
   }

   Ok(value)
}

/// Decode a single value by its storage class.
///
/// INTEGER → number, REAL → number (NaN/inf → null), TEXT → string,
/// BLOB → base64 string.
pub(crate) fn to_json(value: SqliteValueRef<'_>) -> Result<JsonValue, Cause> {
   if value.is_null() {
      return Ok(JsonValue::Null);
   }

   let storage = value.type_info().name().to_string();

   let json = match storage.as_str() {
      "INTEGER" | "NUMERIC" | "BOOLEAN" => JsonValue::from(<i64 as Decode<Sqlite>>::decode(value)?),
      "REAL" => {
         let number = <f64 as Decode<Sqlite>>::decode(value)?;
         serde_json::Number::from_f64(number)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
      }
      "BLOB" => {
         let bytes = <Vec<u8> as Decode<Sqlite>>::decode(value)?;
         JsonValue::String(STANDARD.encode(bytes))
      }
      _ => JsonValue::String(<String as Decode<Sqlite>>::decode(value)?),
   };

   Ok(json)
}
