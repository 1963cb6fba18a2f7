use crate::audit::{AuditAction, AuditLogEntry, AuditParameters};
use crate::cache::CacheEntry;
use crate::company::CompanyRecord;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// Open (or create) the database file and make sure the schema exists
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Cache Table (one row per source + query, overwritten on every live fetch)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cache_entries (
            key TEXT PRIMARY KEY,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Audit Table (append-only compliance trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entry_id TEXT UNIQUE NOT NULL,
            recorded_at TEXT NOT NULL,
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            parameters TEXT NOT NULL,
            result_count INTEGER NOT NULL,
            sources_used TEXT NOT NULL,
            legal_basis TEXT NOT NULL,
            digest TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS audit_log_no_update
         BEFORE UPDATE ON audit_log
         BEGIN SELECT RAISE(ABORT, 'audit_log is append-only'); END",
        [],
    )?;

    conn.execute(
        "CREATE TRIGGER IF NOT EXISTS audit_log_no_delete
         BEFORE DELETE ON audit_log
         BEGIN SELECT RAISE(ABORT, 'audit_log is append-only'); END",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_recorded_at ON audit_log(recorded_at)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_actor ON audit_log(actor)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// CACHE ENTRIES
// ============================================================================

pub fn load_cache_entry(conn: &Connection, key: &str) -> Result<Option<CacheEntry>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT payload, created_at FROM cache_entries WHERE key = ?1",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((payload_json, created_at_str)) = row else {
        return Ok(None);
    };

    let payload: Vec<CompanyRecord> =
        serde_json::from_str(&payload_json).context("Corrupt cache payload")?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .context("Corrupt cache timestamp")?
        .with_timezone(&Utc);

    Ok(Some(CacheEntry {
        key: key.to_string(),
        payload,
        created_at,
    }))
}

/// Insert or overwrite; concurrent writers to one key resolve last-writer-wins
pub fn store_cache_entry(conn: &Connection, entry: &CacheEntry) -> Result<()> {
    let payload_json = serde_json::to_string(&entry.payload)?;

    conn.execute(
        "INSERT INTO cache_entries (key, payload, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, created_at = excluded.created_at",
        params![entry.key, payload_json, entry.created_at.to_rfc3339()],
    )?;

    Ok(())
}

// ============================================================================
// AUDIT LOG
// ============================================================================

pub fn insert_audit_entry(conn: &Connection, entry: &AuditLogEntry) -> Result<()> {
    let parameters_json = serde_json::to_string(&entry.parameters)?;
    let sources_json = serde_json::to_string(&entry.sources_used)?;

    conn.execute(
        "INSERT INTO audit_log (
            entry_id, recorded_at, actor, action, parameters,
            result_count, sources_used, legal_basis, digest
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.entry_id,
            entry.recorded_at.to_rfc3339(),
            entry.actor,
            entry.action.as_str(),
            parameters_json,
            entry.result_count as i64,
            sources_json,
            entry.legal_basis,
            entry.digest,
        ],
    )?;

    Ok(())
}

pub fn count_audit_entries(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;

    Ok(count)
}

/// Most recent audit entries first (operator tooling; the engine never reads these)
pub fn get_recent_audit_entries(conn: &Connection, limit: usize) -> Result<Vec<AuditLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT entry_id, recorded_at, actor, action, parameters,
                result_count, sources_used, legal_basis, digest
         FROM audit_log
         ORDER BY id DESC
         LIMIT ?1",
    )?;

    let rows = stmt
        .query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(entry_id, recorded_at, actor, action, parameters, result_count, sources, legal_basis, digest)| {
                let parameters: AuditParameters =
                    serde_json::from_str(&parameters).context("Corrupt audit parameters")?;
                Ok(AuditLogEntry {
                    entry_id,
                    recorded_at: DateTime::parse_from_rfc3339(&recorded_at)
                        .context("Corrupt audit timestamp")?
                        .with_timezone(&Utc),
                    actor,
                    action: AuditAction::parse(&action)
                        .ok_or_else(|| anyhow!("Unknown audit action {:?}", action))?,
                    parameters,
                    result_count: result_count.max(0) as usize,
                    sources_used: serde_json::from_str(&sources).context("Corrupt audit sources")?,
                    legal_basis,
                    digest,
                })
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::LEGAL_BASIS;
    use chrono::NaiveDate;

    fn sample_record(tax_id: &str) -> CompanyRecord {
        CompanyRecord::new(
            tax_id,
            "Alpha Comercio Ltda",
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            "SP",
        )
    }

    fn sample_audit_entry(actor: &str) -> AuditLogEntry {
        AuditLogEntry::new(
            actor,
            AuditAction::QueryAuthoritativeRegistry,
            AuditParameters {
                date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
                region: "SP".to_string(),
            },
            2,
            vec!["federal_index".to_string()],
        )
    }

    #[test]
    fn test_cache_entry_round_trip_and_overwrite() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        assert!(load_cache_entry(&conn, "federal_index:2025-03-10:SP").unwrap().is_none());

        let first = CacheEntry {
            key: "federal_index:2025-03-10:SP".to_string(),
            payload: vec![sample_record("00000000000100")],
            created_at: Utc::now(),
        };
        store_cache_entry(&conn, &first).unwrap();
        let loaded = load_cache_entry(&conn, &first.key).unwrap().unwrap();
        assert_eq!(loaded.payload, first.payload);

        // Last writer wins
        let second = CacheEntry {
            payload: vec![sample_record("00000000000200"), sample_record("00000000000300")],
            ..first.clone()
        };
        store_cache_entry(&conn, &second).unwrap();
        let loaded = load_cache_entry(&conn, &first.key).unwrap().unwrap();
        assert_eq!(loaded.payload.len(), 2);
        assert_eq!(loaded.payload[0].tax_id, "00000000000200");
    }

    #[test]
    fn test_audit_log_is_append_only() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        insert_audit_entry(&conn, &sample_audit_entry("ops@example.org")).unwrap();
        insert_audit_entry(&conn, &sample_audit_entry("analyst@example.org")).unwrap();
        assert_eq!(count_audit_entries(&conn).unwrap(), 2);

        assert!(conn.execute("UPDATE audit_log SET actor = 'mallory'", []).is_err());
        assert!(conn.execute("DELETE FROM audit_log", []).is_err());
        assert_eq!(count_audit_entries(&conn).unwrap(), 2);

        let entries = get_recent_audit_entries(&conn, 10).unwrap();
        assert_eq!(entries[0].actor, "analyst@example.org");
        assert_eq!(entries[1].actor, "ops@example.org");
        assert_eq!(entries[0].legal_basis, LEGAL_BASIS);
        assert_eq!(entries[0].sources_used, vec!["federal_index".to_string()]);
        assert!(entries[0].verify_digest());
    }

    #[test]
    fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("radar.db");

        {
            let conn = open_database(&path).unwrap();
            store_cache_entry(
                &conn,
                &CacheEntry {
                    key: "regional_board:2025-03-10:SP".to_string(),
                    payload: vec![sample_record("00000000000200")],
                    created_at: Utc::now(),
                },
            )
            .unwrap();
            insert_audit_entry(&conn, &sample_audit_entry("ops@example.org")).unwrap();
        }

        // Schema setup is idempotent on an existing file
        let conn = open_database(&path).unwrap();
        let loaded = load_cache_entry(&conn, "regional_board:2025-03-10:SP").unwrap().unwrap();
        assert_eq!(loaded.payload[0].tax_id, "00000000000200");
        assert_eq!(count_audit_entries(&conn).unwrap(), 1);
        println!("✅ Cache and audit rows persisted across reopen");
    }
}
