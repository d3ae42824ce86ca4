//! Small helpers shared by the query modules.

use rusqlite::Connection;

use crate::error::DbError;

/// `?, ?, ?` for `n` parameters.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Escape `%`, `_` and the escape character itself for `LIKE ... ESCAPE '\'`.
pub(crate) fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Run `f` inside a named savepoint, releasing it on success and rolling
/// back to it on failure. Works both inside and outside a transaction.
pub(crate) fn with_savepoint<T>(
    conn: &Connection,
    name: &str,
    f: impl FnOnce() -> Result<T, DbError>,
) -> Result<T, DbError> {
    conn.execute_batch(&format!("SAVEPOINT {name}"))?;
    match f() {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {name}"))?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rb) = conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}")) {
                log::warn!("Failed to roll back savepoint {name}: {rb}");
            }
            Err(e)
        }
    }
}
