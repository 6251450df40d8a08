//! Rendering of result-set values into CSV field text
//!
//! The exporter never interprets values, it only needs their text form. The
//! decoder for each column is picked from the type the server reports for the
//! value, so every row may be decoded without a schema known in advance.

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::mysql::types::MySqlTime;
use sqlx::mysql::{MySql, MySqlRow, MySqlTypeInfo};
use sqlx::{Row, Type, TypeInfo, ValueRef};

/// One exported row, rendered field by field
pub type FieldValues = Vec<String>;

/// How a MySQL column type is turned into text
#[derive(Debug, Clone, Copy, PartialEq)]
enum RenderCategory {
    SignedInt,
    UnsignedInt,
    Float,
    Double,
    Date,
    Time,
    DateTime,
    Binary,
    /// Character data and anything the server already sends as text (DECIMAL, JSON, ENUM, SET)
    Text,
}

impl RenderCategory {
    /// `TINYINT(1)` is named `BOOLEAN` whether or not it is unsigned, so the
    /// sign is read from the column flags rather than the name.
    fn from_type_info(type_info: &MySqlTypeInfo) -> Self {
        let unsigned = <u64 as Type<MySql>>::compatible(type_info);
        Self::from_mysql_type(type_info.name(), unsigned)
    }

    fn from_mysql_type(type_name: &str, unsigned: bool) -> Self {
        if unsigned || type_name.ends_with("UNSIGNED") || type_name == "BIT" {
            return RenderCategory::UnsignedInt;
        }

        match type_name {
            "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
                RenderCategory::SignedInt
            }
            "FLOAT" => RenderCategory::Float,
            "DOUBLE" => RenderCategory::Double,
            "DATE" => RenderCategory::Date,
            "TIME" => RenderCategory::Time,
            "DATETIME" | "TIMESTAMP" => RenderCategory::DateTime,
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB"
            | "GEOMETRY" => RenderCategory::Binary,
            _ => RenderCategory::Text,
        }
    }
}

/// Render every column of a MySQL row, NULL as an empty field
pub fn mysql_record(row: &MySqlRow) -> Result<FieldValues, sqlx::Error> {
    let mut fields = Vec::with_capacity(row.len());

    for idx in 0..row.len() {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            fields.push(String::new());
            continue;
        }
        let category = RenderCategory::from_type_info(&raw.type_info());

        // The category was chosen from the server-reported type, so the
        // compatibility check of `try_get` would only repeat that decision.
        let field = match category {
            RenderCategory::SignedInt => row.try_get_unchecked::<i64, _>(idx)?.to_string(),
            RenderCategory::UnsignedInt => row.try_get_unchecked::<u64, _>(idx)?.to_string(),
            RenderCategory::Float => row.try_get_unchecked::<f32, _>(idx)?.to_string(),
            RenderCategory::Double => row.try_get_unchecked::<f64, _>(idx)?.to_string(),
            RenderCategory::Date | RenderCategory::DateTime
                if is_zero_temporal(row.try_get_unchecked::<&[u8], _>(idx)?) =>
            {
                if category == RenderCategory::Date {
                    ZERO_DATE.to_string()
                } else {
                    ZERO_DATETIME.to_string()
                }
            }
            RenderCategory::Date => row.try_get_unchecked::<NaiveDate, _>(idx)?.to_string(),
            RenderCategory::DateTime => {
                row.try_get_unchecked::<NaiveDateTime, _>(idx)?.to_string()
            }
            RenderCategory::Time => render_time(&row.try_get_unchecked::<MySqlTime, _>(idx)?),
            RenderCategory::Binary => render_bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
            RenderCategory::Text => row.try_get_unchecked::<String, _>(idx)?,
        };
        fields.push(field);
    }

    Ok(fields)
}

const ZERO_DATE: &str = "0000-00-00";
const ZERO_DATETIME: &str = "0000-00-00 00:00:00";

/// Whether a raw DATE/DATETIME/TIMESTAMP value is MySQL's all-zero date.
///
/// The binary protocol sends the zero date as a zero length prefix with no
/// payload; the text protocol spells it out.
fn is_zero_temporal(raw: &[u8]) -> bool {
    raw.first() == Some(&0) || raw.starts_with(ZERO_DATE.as_bytes())
}

/// MySQL's own TIME text form: signed, at least two hour digits, up to 838
fn render_time(time: &MySqlTime) -> String {
    let sign = if time.is_negative() { "-" } else { "" };
    let mut text = format!(
        "{}{:02}:{:02}:{:02}",
        sign,
        time.hours(),
        time.minutes(),
        time.seconds()
    );
    if time.microseconds() != 0 {
        text.push_str(&format!(".{:06}", time.microseconds()));
    }
    text
}

/// Render every column of a SQLite row, NULL as an empty field
#[cfg(test)]
pub fn sqlite_record(row: &sqlx::sqlite::SqliteRow) -> Result<FieldValues, sqlx::Error> {
    let mut fields = Vec::with_capacity(row.len());

    for idx in 0..row.len() {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            fields.push(String::new());
            continue;
        }
        // SQLite reports the storage class of the value itself
        let field = match raw.type_info().name() {
            "INTEGER" | "BOOLEAN" => row.try_get_unchecked::<i64, _>(idx)?.to_string(),
            "REAL" | "NUMERIC" => row.try_get_unchecked::<f64, _>(idx)?.to_string(),
            "BLOB" => render_bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
            _ => row.try_get_unchecked::<String, _>(idx)?,
        };
        fields.push(field);
    }

    Ok(fields)
}

/// Binary values are copied verbatim when they are UTF-8, hex-encoded otherwise
fn render_bytes(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            let bytes = err.into_bytes();
            let mut hex = String::with_capacity(2 + bytes.len() * 2);
            hex.push_str("0x");
            for byte in bytes {
                hex.push_str(&format!("{:02x}", byte));
            }
            hex
        }
    }
}
