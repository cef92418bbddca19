use super::*;

impl EventDb {
    // =========================================================================
    // Occurrences
    // =========================================================================

    /// Insert an occurrence unless `(entity_id, occurred_at)` is already recorded.
    ///
    /// Returns `true` when a new row was written.
    pub fn insert_occurrence(&self, occurrence: &DbOccurrence) -> Result<bool, DbError> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO occurrences (entity_id, occurred_at, source, recorded_by)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                occurrence.entity_id,
                occurrence.occurred_at,
                occurrence.source.as_str(),
                occurrence.recorded_by,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Insert many occurrences, returning how many were new.
    pub fn insert_occurrences(&self, occurrences: &[DbOccurrence]) -> Result<usize, DbError> {
        let mut stmt = self.conn.prepare(
            "INSERT OR IGNORE INTO occurrences (entity_id, occurred_at, source, recorded_by)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut inserted = 0;
        for occurrence in occurrences {
            inserted += stmt.execute(params![
                occurrence.entity_id,
                occurrence.occurred_at,
                occurrence.source.as_str(),
                occurrence.recorded_by,
            ])?;
        }
        Ok(inserted)
    }

    /// Record an operator-entered occurrence.
    pub fn record_manual_occurrence(
        &self,
        entity_id: &str,
        occurred_at: i64,
        operator: &str,
    ) -> Result<bool, DbError> {
        self.insert_occurrence(&DbOccurrence::manual(entity_id, occurred_at, operator))
    }

    /// Occurrences at or after `since` (Unix seconds), newest first.
    pub fn list_occurrences_since(&self, since: i64) -> Result<Vec<DbOccurrence>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, occurred_at, source, recorded_by
             FROM occurrences
             WHERE occurred_at >= ?1
             ORDER BY occurred_at DESC, entity_id ASC",
        )?;
        let rows = stmt.query_map(params![since], |row| {
            let source: Option<String> = row.get(2)?;
            Ok(DbOccurrence {
                entity_id: row.get(0)?,
                occurred_at: row.get(1)?,
                source: source
                    .as_deref()
                    .and_then(OccurrenceSource::parse)
                    .unwrap_or(OccurrenceSource::Auto),
                recorded_by: row.get(3)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// `listOccurrences(sinceDays)`: occurrences in the trailing window ending at `now`.
    pub fn list_occurrences(&self, since_days: u32, now: i64) -> Result<Vec<DbOccurrence>, DbError> {
        let since = crate::util::offset_from(now, chrono::Duration::days(i64::from(since_days)));
        self.list_occurrences_since(since)
    }

    pub fn occurrence_count(&self) -> Result<usize, DbError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM occurrences", params![], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Move an entity's history to a new display name after a rename.
    ///
    /// Occurrences that already exist under the new name are dropped. The
    /// polling-state row merges into the new name's row, keeping the most
    /// recent timestamps. Runs in one transaction.
    pub fn remap_entity(&self, old_id: &str, new_id: &str) -> Result<RemapSummary, DbError> {
        self.with_transaction(|tx| {
            let old_state = tx.get_polling_state(old_id)?;
            let old_occurrences: i64 = tx.conn.query_row(
                "SELECT COUNT(*) FROM occurrences WHERE entity_id = ?1",
                params![old_id],
                |row| row.get(0),
            )?;
            if old_state.is_none() && old_occurrences == 0 {
                return Err(DbError::EntityNotFound(old_id.to_string()));
            }

            let moved = tx.conn.execute(
                "UPDATE OR IGNORE occurrences SET entity_id = ?2 WHERE entity_id = ?1",
                params![old_id, new_id],
            )?;
            let dropped = tx.conn.execute(
                "DELETE FROM occurrences WHERE entity_id = ?1",
                params![old_id],
            )?;

            let state_merged = match old_state {
                Some(state) => {
                    tx.conn.execute(
                        "INSERT INTO polling_state (entity_id, last_activity_at, last_polled_at, inaccessible)
                         VALUES (?1, ?2, ?3, ?4)
                         ON CONFLICT(entity_id) DO UPDATE SET
                            last_activity_at = MAX(polling_state.last_activity_at, excluded.last_activity_at),
                            last_polled_at = MAX(polling_state.last_polled_at, excluded.last_polled_at),
                            inaccessible = MIN(polling_state.inaccessible, excluded.inaccessible)",
                        params![
                            new_id,
                            state.last_activity_at,
                            state.last_polled_at,
                            state.inaccessible,
                        ],
                    )?;
                    tx.conn.execute(
                        "DELETE FROM polling_state WHERE entity_id = ?1",
                        params![old_id],
                    )?;
                    true
                }
                None => false,
            };

            Ok(RemapSummary {
                occurrences_moved: moved,
                occurrences_dropped: dropped,
                state_merged,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::test_db;
    use super::*;

    const DAY: i64 = 86_400;

    #[test]
    fn test_insert_is_idempotent() {
        let db = test_db();
        let occ = DbOccurrence::auto("Alice", 1_704_103_200);
        assert!(db.insert_occurrence(&occ).unwrap());
        assert!(!db.insert_occurrence(&occ).unwrap());
        assert_eq!(db.occurrence_count().unwrap(), 1);
    }

    #[test]
    fn test_insert_many_counts_only_new_rows() {
        let db = test_db();
        let batch = vec![
            DbOccurrence::auto("Alice", 100),
            DbOccurrence::auto("Alice", 200),
            DbOccurrence::auto("Bob", 100),
        ];
        assert_eq!(db.insert_occurrences(&batch).unwrap(), 3);
        assert_eq!(db.insert_occurrences(&batch).unwrap(), 0);
        assert_eq!(db.occurrence_count().unwrap(), 3);
    }

    #[test]
    fn test_manual_occurrence_does_not_duplicate_auto() {
        let db = test_db();
        db.insert_occurrence(&DbOccurrence::auto("Alice", 500)).unwrap();
        assert!(!db.record_manual_occurrence("Alice", 500, "admin").unwrap());
        assert!(db.record_manual_occurrence("Alice", 600, "admin").unwrap());

        let rows = db.list_occurrences_since(0).unwrap();
        assert_eq!(rows[0].source, OccurrenceSource::Manual);
        assert_eq!(rows[0].recorded_by.as_deref(), Some("admin"));
        assert_eq!(rows[1].source, OccurrenceSource::Auto);
        assert_eq!(rows[1].recorded_by, None);
    }

    #[test]
    fn test_list_occurrences_window() {
        let db = test_db();
        let now = 1_720_000_000;
        db.insert_occurrence(&DbOccurrence::auto("Alice", now - DAY)).unwrap();
        db.insert_occurrence(&DbOccurrence::auto("Bob", now - 8 * DAY)).unwrap();
        db.insert_occurrence(&DbOccurrence::auto("Cara", now - 30 * DAY)).unwrap();

        let rows = db.list_occurrences(7, now).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].entity_id, "Alice");

        let rows = db.list_occurrences(31, now).unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.entity_id.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob", "Cara"]);
    }

    #[test]
    fn test_remap_moves_history() {
        let db = test_db();
        db.upsert_roster(&["OldName".to_string(), "NewName".to_string()]).unwrap();
        db.apply_polling_updates(
            &[PollingUpdate::Active {
                entity_id: "OldName".to_string(),
                latest_activity_at: 900,
            }],
            1_000,
        )
        .unwrap();
        db.insert_occurrence(&DbOccurrence::auto("OldName", 100)).unwrap();
        db.insert_occurrence(&DbOccurrence::auto("OldName", 200)).unwrap();
        db.insert_occurrence(&DbOccurrence::auto("NewName", 200)).unwrap();

        let summary = db.remap_entity("OldName", "NewName").unwrap();
        assert_eq!(summary.occurrences_moved, 1);
        assert_eq!(summary.occurrences_dropped, 1);
        assert!(summary.state_merged);

        assert!(db.get_polling_state("OldName").unwrap().is_none());
        let merged = db.get_polling_state("NewName").unwrap().unwrap();
        assert_eq!(merged.last_activity_at, 900);
        assert_eq!(merged.last_polled_at, 1_000);
        assert_eq!(db.occurrence_count().unwrap(), 2);
    }

    #[test]
    fn test_remap_unknown_entity_fails() {
        let db = test_db();
        let err = db.remap_entity("Nobody", "Somebody").unwrap_err();
        assert!(matches!(err, DbError::EntityNotFound(_)));
    }
}
