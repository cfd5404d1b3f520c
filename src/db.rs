use crate::engine::{
    merge_source, AddOutcome, DisposableLookup, DomainEntry, DomainSet, EntrySelector, ListKind,
    ProviderStats, RiskLevel, UpsertOutcome, UserListEntry,
};
use crate::error::StoreError;
use crate::store::{SEED_PROVIDERS, SEED_SOURCE};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

pub struct DbClient {
    db_path: String,
    conn: Mutex<Connection>,
}

fn user_table(kind: ListKind) -> &'static str {
    match kind {
        ListKind::Allow => "user_allowlist",
        ListKind::Block => "user_blocklist",
    }
}

fn user_entry_from_row(row: &Row<'_>) -> rusqlite::Result<UserListEntry> {
    Ok(UserListEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        domain: row.get(2)?,
        reason: row.get(3)?,
        is_active: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn parse_risk(value: &str) -> RiskLevel {
    // Column default is 'high'; treat anything unrecognized the same way.
    value.parse().unwrap_or(RiskLevel::High)
}

impl DbClient {
    pub fn new(db_path: String) -> rusqlite::Result<Self> {
        let conn = Connection::open(&db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(Self {
            db_path,
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Ok(Self {
            db_path: ":memory:".to_string(),
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    /// Creates the schema and inserts the seed providers (existing rows are
    /// left untouched).
    pub fn initialize(&self, now: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS disposable_providers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL UNIQUE,
                is_active INTEGER NOT NULL DEFAULT 1,
                risk_level TEXT NOT NULL DEFAULT 'high',
                detected_at INTEGER NOT NULL,
                last_seen_at INTEGER NOT NULL,
                source TEXT
            );
            CREATE TABLE IF NOT EXISTS global_allowlist (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL UNIQUE,
                reason TEXT,
                added_by TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS remote_allowlist (
                domain TEXT PRIMARY KEY,
                source TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                first_seen_at INTEGER NOT NULL,
                last_seen_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS user_allowlist (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                domain TEXT NOT NULL,
                reason TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS user_blocklist (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                domain TEXT NOT NULL,
                reason TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_providers_last_seen ON disposable_providers(last_seen_at);
            CREATE INDEX IF NOT EXISTS idx_user_allowlist_lookup ON user_allowlist(user_id, domain);
            CREATE INDEX IF NOT EXISTS idx_user_blocklist_lookup ON user_blocklist(user_id, domain);",
        )?;

        let mut seeded = 0;
        {
            let mut stmt = conn.prepare_cached(
                "INSERT OR IGNORE INTO disposable_providers
                    (domain, is_active, risk_level, detected_at, last_seen_at, source)
                 VALUES (?1, 1, 'high', ?2, ?2, ?3)",
            )?;
            for domain in SEED_PROVIDERS {
                seeded += stmt.execute(params![domain, now, SEED_SOURCE])?;
            }
        }

        info!(
            "SQLite database initialized at {} ({} seed providers added)",
            self.db_path, seeded
        );
        Ok(())
    }

    pub fn is_user_listed(
        &self,
        kind: ListKind,
        user_id: &str,
        domain: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock()?;
        let sql = format!(
            "SELECT 1 FROM {} WHERE user_id = ?1 AND domain = ?2 AND is_active = 1 LIMIT 1",
            user_table(kind)
        );
        let found = conn
            .prepare_cached(&sql)?
            .query_row(params![user_id, domain], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn add_user_entry(
        &self,
        kind: ListKind,
        user_id: &str,
        domain: &str,
        reason: Option<&str>,
        now: i64,
    ) -> Result<AddOutcome, StoreError> {
        let mut conn = self.conn.lock()?;
        let table = user_table(kind);
        let tx = conn.transaction()?;

        let select = format!(
            "SELECT id, user_id, domain, reason, is_active, created_at FROM {}
             WHERE user_id = ?1 AND domain = ?2
             ORDER BY is_active DESC, created_at DESC, id DESC LIMIT 1",
            table
        );
        let existing = tx
            .query_row(&select, params![user_id, domain], user_entry_from_row)
            .optional()?;

        let outcome = match existing {
            Some(entry) if entry.is_active => {
                return Err(StoreError::Conflict {
                    domain: domain.to_string(),
                });
            }
            Some(mut entry) => {
                tx.execute(
                    &format!(
                        "UPDATE {} SET is_active = 1, reason = COALESCE(?1, reason), created_at = ?2
                         WHERE id = ?3",
                        table
                    ),
                    params![reason, now, entry.id],
                )?;
                entry.is_active = true;
                entry.created_at = now;
                if let Some(reason) = reason {
                    entry.reason = Some(reason.to_string());
                }
                AddOutcome::Reactivated(entry)
            }
            None => {
                tx.execute(
                    &format!(
                        "INSERT INTO {} (user_id, domain, reason, is_active, created_at)
                         VALUES (?1, ?2, ?3, 1, ?4)",
                        table
                    ),
                    params![user_id, domain, reason, now],
                )?;
                AddOutcome::Created(UserListEntry {
                    id: tx.last_insert_rowid(),
                    user_id: user_id.to_string(),
                    domain: domain.to_string(),
                    reason: reason.map(str::to_string),
                    is_active: true,
                    created_at: now,
                })
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    pub fn list_user_entries(
        &self,
        kind: ListKind,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UserListEntry>, StoreError> {
        let conn = self.conn.lock()?;
        let sql = format!(
            "SELECT id, user_id, domain, reason, is_active, created_at FROM {}
             WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
            user_table(kind)
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(
            params![user_id, limit as i64, offset as i64],
            user_entry_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn remove_user_entry(
        &self,
        kind: ListKind,
        user_id: &str,
        selector: &EntrySelector,
    ) -> Result<u64, StoreError> {
        let conn = self.conn.lock()?;
        let table = user_table(kind);
        let changed = match selector {
            EntrySelector::Id(id) => conn.execute(
                &format!(
                    "UPDATE {} SET is_active = 0 WHERE user_id = ?1 AND id = ?2 AND is_active = 1",
                    table
                ),
                params![user_id, id],
            )?,
            EntrySelector::Domain(domain) => conn.execute(
                &format!(
                    "UPDATE {} SET is_active = 0 WHERE user_id = ?1 AND domain = ?2 AND is_active = 1",
                    table
                ),
                params![user_id, domain],
            )?,
        };
        Ok(changed as u64)
    }

    pub fn is_globally_allowed(&self, domain: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock()?;
        let found = conn
            .prepare_cached(
                "SELECT 1 FROM global_allowlist WHERE domain = ?1 AND is_active = 1 LIMIT 1",
            )?
            .query_row(params![domain], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn upsert_global_allow(
        &self,
        domain: &str,
        reason: Option<&str>,
        added_by: Option<&str>,
        now: i64,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM global_allowlist WHERE domain = ?1",
                params![domain],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE global_allowlist
                     SET is_active = 1, reason = COALESCE(?1, reason), added_by = COALESCE(?2, added_by)
                     WHERE id = ?3",
                    params![reason, added_by, id],
                )?;
                UpsertOutcome::Updated
            }
            None => {
                tx.execute(
                    "INSERT INTO global_allowlist (domain, reason, added_by, is_active, created_at)
                     VALUES (?1, ?2, ?3, 1, ?4)",
                    params![domain, reason, added_by, now],
                )?;
                UpsertOutcome::Inserted
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    pub fn remove_global_allow(&self, domain: &str) -> Result<u64, StoreError> {
        let conn = self.conn.lock()?;
        let changed = conn.execute(
            "UPDATE global_allowlist SET is_active = 0 WHERE domain = ?1 AND is_active = 1",
            params![domain],
        )?;
        Ok(changed as u64)
    }

    pub fn is_domain_disposable(&self, domain: &str) -> Result<DisposableLookup, StoreError> {
        let conn = self.conn.lock()?;
        let row: Option<(String, Option<String>)> = conn
            .prepare_cached(
                "SELECT risk_level, source FROM disposable_providers
                 WHERE domain = ?1 AND is_active = 1 LIMIT 1",
            )?
            .query_row(params![domain], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        Ok(match row {
            Some((risk, source)) => DisposableLookup {
                is_disposable: true,
                risk_level: Some(parse_risk(&risk)),
                source,
            },
            None => DisposableLookup::default(),
        })
    }

    pub fn find_provider(&self, domain: &str) -> Result<Option<DomainEntry>, StoreError> {
        let conn = self.conn.lock()?;
        let entry = conn
            .prepare_cached(
                "SELECT domain, is_active, risk_level, detected_at, last_seen_at, source
                 FROM disposable_providers WHERE domain = ?1",
            )?
            .query_row(params![domain], |row| {
                let risk: String = row.get(2)?;
                Ok(DomainEntry {
                    domain: row.get(0)?,
                    is_active: row.get(1)?,
                    risk_level: parse_risk(&risk),
                    detected_at: row.get(3)?,
                    last_seen_at: row.get(4)?,
                    source: row.get(5)?,
                })
            })
            .optional()?;
        Ok(entry)
    }

    pub fn upsert_provider(
        &self,
        domain: &str,
        risk_level: RiskLevel,
        source: &str,
        now: i64,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;

        let existing: Option<(String, Option<String>)> = tx
            .query_row(
                "SELECT risk_level, source FROM disposable_providers WHERE domain = ?1",
                params![domain],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let outcome = match existing {
            Some((current_risk, current_source)) => {
                let merged_risk = parse_risk(&current_risk).max(risk_level);
                let merged_source = merge_source(current_source.as_deref(), source);
                tx.execute(
                    "UPDATE disposable_providers
                     SET last_seen_at = MAX(last_seen_at, ?1), is_active = 1,
                         risk_level = ?2, source = ?3
                     WHERE domain = ?4",
                    params![now, merged_risk.as_str(), merged_source, domain],
                )?;
                UpsertOutcome::Updated
            }
            None => {
                tx.execute(
                    "INSERT INTO disposable_providers
                        (domain, is_active, risk_level, detected_at, last_seen_at, source)
                     VALUES (?1, 1, ?2, ?3, ?3, ?4)",
                    params![domain, risk_level.as_str(), now, source],
                )?;
                UpsertOutcome::Inserted
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    pub fn is_remote_allowed(&self, domain: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock()?;
        let found = conn
            .prepare_cached(
                "SELECT 1 FROM remote_allowlist WHERE domain = ?1 AND is_active = 1 LIMIT 1",
            )?
            .query_row(params![domain], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn upsert_remote_allow(
        &self,
        domain: &str,
        source: &str,
        now: i64,
    ) -> Result<UpsertOutcome, StoreError> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE remote_allowlist
             SET is_active = 1, source = ?2, last_seen_at = MAX(last_seen_at, ?3)
             WHERE domain = ?1",
            params![domain, source, now],
        )?;
        let outcome = if updated > 0 {
            UpsertOutcome::Updated
        } else {
            tx.execute(
                "INSERT INTO remote_allowlist (domain, source, is_active, first_seen_at, last_seen_at)
                 VALUES (?1, ?2, 1, ?3, ?3)",
                params![domain, source, now],
            )?;
            UpsertOutcome::Inserted
        };

        tx.commit()?;
        Ok(outcome)
    }

    pub fn retire_remote_allow(&self, current: &DomainSet) -> Result<u64, StoreError> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction()?;

        let active = {
            let mut stmt = tx.prepare("SELECT domain FROM remote_allowlist WHERE is_active = 1")?;
            let domains = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            domains
        };

        let mut retired = 0;
        {
            let mut stmt =
                tx.prepare("UPDATE remote_allowlist SET is_active = 0 WHERE domain = ?1")?;
            for domain in active.iter().filter(|d| !current.contains(d.as_str())) {
                retired += stmt.execute(params![domain])? as u64;
            }
        }

        tx.commit()?;
        Ok(retired)
    }

    pub fn deactivate_stale(&self, cutoff: i64) -> Result<u64, StoreError> {
        let conn = self.conn.lock()?;
        let providers = conn.execute(
            "UPDATE disposable_providers SET is_active = 0
             WHERE last_seen_at < ?1 AND is_active = 1",
            params![cutoff],
        )?;
        let allowed = conn.execute(
            "UPDATE remote_allowlist SET is_active = 0
             WHERE last_seen_at < ?1 AND is_active = 1",
            params![cutoff],
        )?;
        Ok((providers + allowed) as u64)
    }

    pub fn provider_stats(&self) -> Result<ProviderStats, StoreError> {
        let conn = self.conn.lock()?;
        let stats = conn
            .prepare_cached(
                "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN is_active = 1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN risk_level = 'low' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN risk_level = 'medium' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN risk_level = 'high' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN risk_level = 'critical' THEN 1 ELSE 0 END), 0)
                 FROM disposable_providers",
            )?
            .query_row([], |row| {
                Ok(ProviderStats {
                    total: row.get::<_, i64>(0)? as u64,
                    active: row.get::<_, i64>(1)? as u64,
                    low_risk: row.get::<_, i64>(2)? as u64,
                    medium_risk: row.get::<_, i64>(3)? as u64,
                    high_risk: row.get::<_, i64>(4)? as u64,
                    critical_risk: row.get::<_, i64>(5)? as u64,
                })
            })?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> DbClient {
        let db = DbClient::open_in_memory().unwrap();
        db.initialize(1_000).unwrap();
        db
    }

    #[test]
    fn test_initialize_is_idempotent_and_seeds() {
        let db = client();
        db.initialize(2_000).unwrap();

        let stats = db.provider_stats().unwrap();
        assert_eq!(stats.total, SEED_PROVIDERS.len() as u64);
        assert_eq!(stats.high_risk, SEED_PROVIDERS.len() as u64);

        let seeded = db.find_provider("mailinator.com").unwrap().unwrap();
        assert_eq!(seeded.source.as_deref(), Some(SEED_SOURCE));
        // Second initialize must not touch existing rows.
        assert_eq!(seeded.last_seen_at, 1_000);
    }

    #[test]
    fn test_upsert_escalates_and_appends_source() {
        let db = client();

        let outcome = db
            .upsert_provider("burner.test", RiskLevel::Medium, "list-a", 10)
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Inserted);

        let outcome = db
            .upsert_provider("burner.test", RiskLevel::High, "list-b", 20)
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        db.upsert_provider("burner.test", RiskLevel::Low, "list-b", 15)
            .unwrap();

        let entry = db.find_provider("burner.test").unwrap().unwrap();
        assert_eq!(entry.risk_level, RiskLevel::High);
        assert_eq!(entry.source.as_deref(), Some("list-a, list-b"));
        assert_eq!(entry.detected_at, 10);
        assert_eq!(entry.last_seen_at, 20);
    }

    #[test]
    fn test_deactivate_stale_hides_provider_until_seen_again() {
        let db = client();
        db.upsert_provider("old.test", RiskLevel::High, "list-a", 100)
            .unwrap();
        db.upsert_provider("fresh.test", RiskLevel::High, "list-a", 900)
            .unwrap();

        // Seeds were stamped at 1_000, so only old.test falls behind.
        assert_eq!(db.deactivate_stale(500).unwrap(), 1);
        assert!(!db.is_domain_disposable("old.test").unwrap().is_disposable);
        assert!(db.is_domain_disposable("fresh.test").unwrap().is_disposable);

        db.upsert_provider("old.test", RiskLevel::High, "list-a", 1_200)
            .unwrap();
        let lookup = db.is_domain_disposable("old.test").unwrap();
        assert!(lookup.is_disposable);
        assert_eq!(lookup.risk_level, Some(RiskLevel::High));
    }

    #[test]
    fn test_user_entry_conflict_and_reactivation() {
        let db = client();

        let created = db
            .add_user_entry(ListKind::Block, "u1", "spam.test", Some("spam"), 10)
            .unwrap();
        assert!(matches!(created, AddOutcome::Created(_)));

        let err = db
            .add_user_entry(ListKind::Block, "u1", "spam.test", None, 11)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let removed = db
            .remove_user_entry(ListKind::Block, "u1", &EntrySelector::Id(created.entry().id))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(!db.is_user_listed(ListKind::Block, "u1", "spam.test").unwrap());

        let again = db
            .add_user_entry(ListKind::Block, "u1", "spam.test", None, 50)
            .unwrap();
        match again {
            AddOutcome::Reactivated(entry) => {
                assert_eq!(entry.id, created.entry().id);
                assert_eq!(entry.created_at, 50);
                assert_eq!(entry.reason.as_deref(), Some("spam"));
            }
            other => panic!("expected reactivation, got {:?}", other),
        }

        let listed = db.list_user_entries(ListKind::Block, "u1", 50, 0).unwrap();
        assert_eq!(listed.len(), 1);
        // The allowlist is a separate table.
        assert!(!db.is_user_listed(ListKind::Allow, "u1", "spam.test").unwrap());
    }

    #[test]
    fn test_global_allow_upsert_and_remove() {
        let db = client();
        assert_eq!(
            db.upsert_global_allow("gmail.com", Some("major provider"), Some("admin"), 5)
                .unwrap(),
            UpsertOutcome::Inserted
        );
        assert!(db.is_globally_allowed("gmail.com").unwrap());

        assert_eq!(db.remove_global_allow("gmail.com").unwrap(), 1);
        assert!(!db.is_globally_allowed("gmail.com").unwrap());

        assert_eq!(
            db.upsert_global_allow("gmail.com", None, None, 6).unwrap(),
            UpsertOutcome::Updated
        );
        assert!(db.is_globally_allowed("gmail.com").unwrap());
    }
    #[test]
    fn test_remote_allowlist_mirrors_latest_snapshot() {
        let db = client();

        assert_eq!(
            db.upsert_remote_allow("kept.test", "allow", 10).unwrap(),
            UpsertOutcome::Inserted
        );
        db.upsert_remote_allow("dropped.test", "allow", 10).unwrap();
        assert_eq!(
            db.upsert_remote_allow("kept.test", "allow", 20).unwrap(),
            UpsertOutcome::Updated
        );

        let current: DomainSet = ["kept.test".to_string()].into_iter().collect();
        assert_eq!(db.retire_remote_allow(&current).unwrap(), 1);
        assert!(db.is_remote_allowed("kept.test").unwrap());
        assert!(!db.is_remote_allowed("dropped.test").unwrap());

        // Seen again upstream: back in.
        db.upsert_remote_allow("dropped.test", "allow", 30).unwrap();
        assert!(db.is_remote_allowed("dropped.test").unwrap());

        // kept.test was last seen at 20, dropped.test at 30; seeds at 1_000.
        db.deactivate_stale(25).unwrap();
        assert!(!db.is_remote_allowed("kept.test").unwrap());
        assert!(db.is_remote_allowed("dropped.test").unwrap());
    }
}
