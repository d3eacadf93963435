use sqlx::Connection;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::str::FromStr;
use tracing::info;

/// Embedded schema migrations, applied in order.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../../migrations/001_companies.sql")),
    (2, include_str!("../../migrations/002_company_invites.sql")),
];

/// Create and initialize a SQLite connection pool with WAL mode.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await?;

    info!("database connected: {}", database_url);
    Ok(pool)
}

/// Split SQL text into statements, respecting BEGIN...END blocks (triggers).
fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_begin = false;

    for line in sql.lines() {
        let trimmed = line.trim();
        // Skip pure comment lines outside of a statement
        if trimmed.starts_with("--") && current.trim().is_empty() {
            continue;
        }

        current.push_str(line);
        current.push('\n');

        let upper = trimmed.to_uppercase();
        if upper.starts_with("BEGIN") || upper.ends_with(" BEGIN") {
            in_begin = true;
        }

        if in_begin {
            if upper.starts_with("END;") || upper == "END" {
                in_begin = false;
                let stmt = current.trim().to_string();
                // Remove trailing semicolon for consistency
                let stmt = stmt.strip_suffix(';').unwrap_or(&stmt).trim().to_string();
                if !stmt.is_empty() {
                    statements.push(stmt);
                }
                current.clear();
            }
        } else {
            // Outside BEGIN..END: split on semicolons
            while let Some(pos) = current.find(';') {
                let stmt = current[..pos].trim().to_string();
                if !stmt.is_empty() && !stmt.starts_with("--") {
                    statements.push(stmt);
                }
                current = current[pos + 1..].to_string();
            }
        }
    }

    // Any remaining text
    let remaining = current.trim().to_string();
    if !remaining.is_empty() && !remaining.starts_with("--") {
        let remaining = remaining
            .strip_suffix(';')
            .unwrap_or(&remaining)
            .trim()
            .to_string();
        if !remaining.is_empty() {
            statements.push(remaining);
        }
    }

    statements
}

/// Run all pending migration SQL files against the database.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // Ensure schema_version table exists for tracking
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_version (\
            version     INTEGER PRIMARY KEY, \
            applied_at  TEXT NOT NULL DEFAULT (datetime('now'))\
        )",
    )
    .execute(pool)
    .await?;

    let current_version: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
            .fetch_one(pool)
            .await?;

    for &(version, sql) in MIGRATIONS {
        if version <= current_version {
            continue;
        }
        info!("applying migration {version}...");
        // Use a single connection so PRAGMAs persist across statements
        let mut conn = pool.acquire().await?;
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut *conn)
            .await?;
        let result: Result<(), sqlx::Error> = async {
            let mut tx = conn.begin().await?;
            for statement in split_sql_statements(sql) {
                if !statement.is_empty() {
                    sqlx::query(&statement).execute(&mut *tx).await?;
                }
            }
            sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
                .bind(version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(())
        }
        .await;
        // Always re-enable foreign keys, even if the migration failed
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&mut *conn)
            .await?;
        result?;
    }

    let final_version = MIGRATIONS.last().map(|m| m.0).unwrap_or(0);
    info!("database migrations applied (version: {final_version})");
    Ok(())
}
