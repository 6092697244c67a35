//! Manual transaction helper.
//!
//! `rusqlite::Connection::transaction()` requires `&mut Connection`, which
//! would force every repository to hold an exclusive borrow even for reads.
//! Repositories here hold a shared `&Connection` (matching spec §5: "all
//! repositories serialize writes through a single connection") and use this
//! helper to issue `BEGIN IMMEDIATE` / `COMMIT` / `ROLLBACK` directly, giving
//! batch operations the same all-or-nothing guarantee without the
//! type-level exclusivity.

use rusqlite::Connection;
use wikivault_types::StorageError;

use crate::map_sql_err;

/// Run `f` inside a `BEGIN IMMEDIATE ... COMMIT` block, rolling back on
/// error. `f`'s error is propagated unchanged; the rollback itself is
/// best-effort (a failed rollback cannot make the caller's error worse).
pub(crate) fn with_transaction<T>(
    conn: &Connection,
    f: impl FnOnce() -> Result<T, StorageError>,
) -> Result<T, StorageError> {
    conn.execute_batch("BEGIN IMMEDIATE").map_err(map_sql_err)?;
    match f() {
        Ok(value) => {
            conn.execute_batch("COMMIT").map_err(map_sql_err)?;
            Ok(value)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}
