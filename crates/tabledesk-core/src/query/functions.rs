//! SQL functions the builder relies on, registered on every engine connection.

use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::Connection;

use crate::error::Result;

/// Unicode case folding for `contains`; SQLite's `lower()` folds ASCII only.
pub const CASEFOLD_FUNCTION: &str = "tabledesk_casefold";

/// Register the builder's SQL functions on a connection.
pub fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        CASEFOLD_FUNCTION,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let folded = match ctx.get_raw(0) {
                ValueRef::Null => None,
                ValueRef::Integer(i) => Some(i.to_string()),
                ValueRef::Real(f) => Some(f.to_string()),
                ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                    Some(String::from_utf8_lossy(bytes).to_lowercase())
                }
            };
            Ok(folded)
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_casefold_handles_non_ascii() {
        let conn = Connection::open_in_memory().unwrap();
        register_functions(&conn).unwrap();

        let folded: String = conn
            .query_row("SELECT tabledesk_casefold('ÄRGER Straße')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(folded, "ärger straße");

        let null: Option<String> = conn
            .query_row("SELECT tabledesk_casefold(NULL)", [], |row| row.get(0))
            .unwrap();
        assert_eq!(null, None);
    }
}
