use std::path::Path;

use rusqlite::Connection;

use super::DatabaseError;

const MIGRATION_001_PROCESSED_DOCUMENTS: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE processed_documents (
    content_hash TEXT PRIMARY KEY,
    document_number TEXT NOT NULL,
    processed_at TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('DONE', 'DUPLICATE')),
    source_path TEXT
);

INSERT INTO schema_version (version) VALUES (1);
";

const MIGRATION_002_RULE_PROVENANCE: &str = "
ALTER TABLE processed_documents ADD COLUMN rule_id TEXT;
ALTER TABLE processed_documents ADD COLUMN reprocess_count INTEGER NOT NULL DEFAULT 0;

CREATE INDEX IF NOT EXISTS idx_processed_documents_number
    ON processed_documents (document_number, status);

INSERT INTO schema_version (version) VALUES (2);
";

// One DONE owner per document number. Older databases may hold several;
// all but the most recent are demoted to DUPLICATE before the index exists.
const MIGRATION_003_UNIQUE_DONE_NUMBER: &str = "
UPDATE processed_documents SET status = 'DUPLICATE'
WHERE status = 'DONE' AND EXISTS (
    SELECT 1 FROM processed_documents newer
    WHERE newer.document_number = processed_documents.document_number
      AND newer.status = 'DONE'
      AND (newer.processed_at > processed_documents.processed_at
           OR (newer.processed_at = processed_documents.processed_at
               AND newer.content_hash > processed_documents.content_hash))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_processed_documents_done_number
    ON processed_documents (document_number) WHERE status = 'DONE';

INSERT INTO schema_version (version) VALUES (3);
";

const MIGRATIONS: &[(i64, &str)] = &[
    (1, MIGRATION_001_PROCESSED_DOCUMENTS),
    (2, MIGRATION_002_RULE_PROVENANCE),
    (3, MIGRATION_003_UNIQUE_DONE_NUMBER),
];

/// Highest schema version this build knows how to produce.
pub const CURRENT_SCHEMA_VERSION: i64 = 3;

/// Open a SQLite connection to the given path and run migrations
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA busy_timeout=3000;
         PRAGMA foreign_keys=ON;"
    )?;
    Ok(())
}

/// Run pending migrations. A database already at the current version
/// costs a single `MAX(version)` query.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_current_version(conn);

    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(DatabaseError::SchemaTooNew {
            found: current_version,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }
    if current_version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    for (version, sql) in MIGRATIONS {
        if *version > current_version {
            tracing::info!("Running migration v{version}");
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(sql).map_err(|e| DatabaseError::MigrationFailed {
                version: *version,
                reason: e.to_string(),
            })?;
            tx.commit()?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
pub fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get::<_, i64>(0),
    )
    .unwrap_or(0)
}
