// ABOUTME: Encoders for the two PostgreSQL load paths
// ABOUTME: Text-format COPY payloads and chunked multi-row INSERT statements

use crate::database::{binary_to_text, RowSet, SqlValue, TableRef};
use crate::utils::{quote_pg_ident, quote_pg_literal};
use bytes::{BufMut, BytesMut};

/// Rows per INSERT statement on the fallback path
pub const INSERT_CHUNK_ROWS: usize = 1000;

/// `"schema"."table"`
pub fn qualified_name(table: &TableRef) -> String {
    format!(
        "{}.{}",
        quote_pg_ident(&table.schema),
        quote_pg_ident(&table.table)
    )
}

pub fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_pg_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn cell_text(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Null => None,
        SqlValue::Text(s) => Some(s.clone()),
        SqlValue::Bytes(b) => Some(binary_to_text(b)),
    }
}

/// Escape one value for COPY text format
pub fn copy_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

pub fn copy_statement(table: &TableRef, columns: &[String]) -> String {
    format!(
        "COPY {} ({}) FROM STDIN WITH (FORMAT text)",
        qualified_name(table),
        column_list(columns)
    )
}

/// Tab-separated, newline-terminated rows with `\N` for NULL
pub fn encode_copy_rows(batch: &RowSet) -> BytesMut {
    let mut buf = BytesMut::with_capacity(batch.len() * 128);
    for row in &batch.rows {
        for (idx, value) in row.iter().enumerate() {
            if idx > 0 {
                buf.put_u8(b'\t');
            }
            match cell_text(value) {
                Some(text) => buf.extend_from_slice(copy_escape(&text).as_bytes()),
                None => buf.extend_from_slice(b"\\N"),
            }
        }
        buf.put_u8(b'\n');
    }
    buf
}

/// Multi-row INSERT statements of at most `chunk_rows` rows each
pub fn insert_statements(table: &TableRef, batch: &RowSet, chunk_rows: usize) -> Vec<String> {
    let prefix = format!(
        "INSERT INTO {} ({}) VALUES ",
        qualified_name(table),
        column_list(&batch.columns)
    );

    batch
        .rows
        .chunks(chunk_rows.max(1))
        .map(|chunk| {
            let values: Vec<String> = chunk
                .iter()
                .map(|row| {
                    let cells: Vec<String> = row
                        .iter()
                        .map(|v| match cell_text(v) {
                            Some(text) => quote_pg_literal(&text),
                            None => "NULL".to_string(),
                        })
                        .collect();
                    format!("({})", cells.join(", "))
                })
                .collect();
            format!("{}{}", prefix, values.join(", "))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::testing::text_rows;

    fn batch() -> RowSet {
        RowSet::new(
            vec!["id".into(), "note".into()],
            text_rows(&[
                &[Some("1"), Some("tab\there")],
                &[Some("2"), None],
                &[Some("3"), Some("it's a\\path\nline")],
            ]),
        )
    }

    #[test]
    fn test_copy_escape() {
        assert_eq!(copy_escape("plain"), "plain");
        assert_eq!(copy_escape("a\tb\nc\rd\\e"), "a\\tb\\nc\\rd\\\\e");
    }

    #[test]
    fn test_encode_copy_rows() {
        let buf = encode_copy_rows(&batch());
        assert_eq!(
            &buf[..],
            b"1\ttab\\there\n2\t\\N\n3\tit's a\\\\path\\nline\n".as_slice()
        );
    }

    #[test]
    fn test_encode_copy_rows_coerces_bytes() {
        let rows = RowSet::new(vec!["b".into()], vec![vec![SqlValue::Bytes(vec![0xff, 0x01])]]);
        assert_eq!(&encode_copy_rows(&rows)[..], b"/wE=\n".as_slice());
    }

    #[test]
    fn test_copy_statement() {
        let table = TableRef::new("shop", "orders");
        assert_eq!(
            copy_statement(&table, &["id".into(), "note".into()]),
            "COPY \"shop\".\"orders\" (\"id\", \"note\") FROM STDIN WITH (FORMAT text)"
        );
    }

    #[test]
    fn test_insert_statements_chunking_and_quoting() {
        let table = TableRef::new("shop", "orders");
        let statements = insert_statements(&table, &batch(), 2);
        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0],
            "INSERT INTO \"shop\".\"orders\" (\"id\", \"note\") VALUES ('1', 'tab\there'), ('2', NULL)"
        );
        assert_eq!(
            statements[1],
            "INSERT INTO \"shop\".\"orders\" (\"id\", \"note\") VALUES ('3', 'it''s a\\path\nline')"
        );
    }
}
