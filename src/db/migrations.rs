use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Ordered schema steps; entry `i` upgrades `user_version` from `i` to `i + 1`.
const MIGRATIONS: &[(&str, &str)] = &[("schema_v1.sql", include_str!("schemas/schema_v1.sql"))];

pub fn schema_version() -> i32 {
    MIGRATIONS.len() as i32
}

pub fn stored_version(conn: &Connection) -> Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")
}

/// Brings the schema up to [`schema_version`] inside one transaction.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let target = schema_version();
    let found = stored_version(conn)?;

    if found > target {
        bail!("usage database schema v{found} was written by a newer pctimer (this build knows v{target})");
    }

    let pending = &MIGRATIONS[found as usize..];
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction().context("failed to begin migration")?;
    for (name, sql) in pending {
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply {name}"))?;
    }
    tx.pragma_update(None, "user_version", target)
        .context("failed to bump user_version")?;
    tx.commit().context("failed to commit migration")?;

    log::info!("Usage database migrated from v{found} to v{target}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_reaches_current_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        assert_eq!(stored_version(&conn).unwrap(), schema_version());

        // Second run is a no-op.
        run_migrations(&mut conn).unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'blobs'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn newer_schema_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", schema_version() + 1)
            .unwrap();

        let err = run_migrations(&mut conn).unwrap_err();
        assert!(err.to_string().contains("newer pctimer"));
    }
}
