// ABOUTME: Row and value types exchanged between the source reader and the target writer
// ABOUTME: Implements the binary-to-text coercion and column-name case normalization

use base64::Engine;
use serde::Serialize;
use std::fmt;

/// A single cell as read from either database
///
/// Both adapters read through text protocols, so everything that is not NULL
/// arrives as text, except payloads the source flags as binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SqlValue {
    Null,
    Text(String),
    Bytes(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Option<&str>> for SqlValue {
    fn from(value: Option<&str>) -> Self {
        match value {
            Some(s) => SqlValue::Text(s.to_string()),
            None => SqlValue::Null,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Text(s) => write!(f, "{}", s),
            SqlValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Convert a raw binary payload to its textual representation
///
/// Valid UTF-8 without NUL bytes is kept as-is; anything else is encoded with
/// standard base64, since PostgreSQL text columns reject both.
pub fn binary_to_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if !s.contains('\0') => s.to_string(),
        _ => base64::engine::general_purpose::STANDARD.encode(bytes),
    }
}

/// A page of rows with their column names, in result order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Replace every binary cell with its text form, returning the number of
    /// columns that held at least one binary payload
    pub fn coerce_binary(&mut self) -> usize {
        let mut coerced = vec![false; self.columns.len()];
        for row in &mut self.rows {
            for (idx, value) in row.iter_mut().enumerate() {
                if let SqlValue::Bytes(bytes) = value {
                    *value = SqlValue::Text(binary_to_text(bytes));
                    if let Some(flag) = coerced.get_mut(idx) {
                        *flag = true;
                    }
                }
            }
        }
        coerced.into_iter().filter(|c| *c).count()
    }

    /// Lowercase all column names in place
    pub fn lowercase_columns(&mut self) {
        for column in &mut self.columns {
            *column = column.to_lowercase();
        }
    }

    /// Compare two result sets the way the sanity check does
    ///
    /// Rows must be equal in value and order. Column names are compared
    /// only when both sides returned rows, since an empty PostgreSQL text
    /// result carries no column metadata.
    pub fn same_content(&self, other: &RowSet) -> bool {
        if self.rows != other.rows {
            return false;
        }
        self.rows.is_empty() || self.columns == other.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_to_text_keeps_utf8() {
        assert_eq!(binary_to_text(b"hello"), "hello");
        assert_eq!(binary_to_text("héllo".as_bytes()), "héllo");
    }

    #[test]
    fn test_binary_to_text_encodes_non_text() {
        assert_eq!(binary_to_text(&[0xff, 0x00, 0x10]), "/wAQ");
        assert_eq!(binary_to_text(b"a\0b"), "YQBi");
    }

    #[test]
    fn test_coerce_binary_counts_columns() {
        let mut set = RowSet::new(
            vec!["id".into(), "payload".into()],
            vec![
                vec!["1".into(), SqlValue::Bytes(vec![0xff])],
                vec!["2".into(), SqlValue::Null],
            ],
        );
        assert_eq!(set.coerce_binary(), 1);
        assert_eq!(set.rows[0][1], SqlValue::Text("/w==".to_string()));
        assert_eq!(set.rows[1][1], SqlValue::Null);
    }

    #[test]
    fn test_same_content_ignores_columns_of_empty_sets() {
        let empty_with_columns = RowSet::new(vec!["id".into()], vec![]);
        assert!(empty_with_columns.same_content(&RowSet::default()));

        let mut upper = RowSet::new(vec!["ID".into()], vec![vec!["1".into()]]);
        let lower = RowSet::new(vec!["id".into()], vec![vec!["1".into()]]);
        assert!(!upper.same_content(&lower));
        upper.lowercase_columns();
        assert!(upper.same_content(&lower));
    }
}
