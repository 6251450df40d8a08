use std::fmt;

use crate::error::IngestError;

/// A table name that passed allow-list validation.
///
/// The query protocol cannot bind identifiers as parameters, so the name is
/// interpolated into the statement text. Only `[A-Za-z0-9_$]` is accepted, and
/// the name is always backtick-quoted when embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    /// Validate a raw table name
    pub fn parse(raw: &str) -> Result<Self, IngestError> {
        if is_valid_identifier(raw) {
            Ok(TableName(raw.to_string()))
        } else {
            Err(IngestError::InvalidIdentifier {
                name: raw.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier wrapped in backticks
    pub fn quoted(&self) -> String {
        format!("`{}`", self.0)
    }

    /// Full unfiltered read of the table
    pub fn select_all_sql(&self) -> String {
        format!("SELECT * FROM {}", self.quoted())
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_valid_identifier(raw: &str) -> bool {
    !raw.is_empty()
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
