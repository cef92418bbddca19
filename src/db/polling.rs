use super::*;

impl EventDb {
    // =========================================================================
    // Polling state
    // =========================================================================

    /// Ensure every roster member has a `polling_state` row.
    ///
    /// New members start with zero sentinels so the next selection picks them
    /// up as stale. Existing rows are left untouched and rows for members who
    /// left the roster are never deleted. Returns the number of new rows.
    pub fn upsert_roster(&self, entity_ids: &[String]) -> Result<usize, DbError> {
        let mut stmt = self.conn.prepare(
            "INSERT OR IGNORE INTO polling_state (entity_id, last_activity_at, last_polled_at, inaccessible)
             VALUES (?1, 0, 0, 0)",
        )?;
        let mut added = 0;
        for entity_id in entity_ids {
            added += stmt.execute(params![entity_id])?;
        }
        Ok(added)
    }

    pub fn get_polling_state(&self, entity_id: &str) -> Result<Option<DbPollingState>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, last_activity_at, last_polled_at, inaccessible
             FROM polling_state WHERE entity_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![entity_id], map_polling_state)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn list_polling_states(&self) -> Result<Vec<DbPollingState>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id, last_activity_at, last_polled_at, inaccessible
             FROM polling_state ORDER BY entity_id ASC",
        )?;
        let rows = stmt.query_map([], map_polling_state)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Pick the next batch of entities to poll, stalest first.
    ///
    /// An entity qualifies when it is readable, active within the recent
    /// window and out of its cool-down, or when it has not been polled since
    /// the staleness cutoff (regardless of activity or accessibility).
    pub fn select_candidates(
        &self,
        cutoffs: &SelectionCutoffs,
        limit: usize,
    ) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id FROM polling_state
             WHERE (inaccessible = 0
                    AND last_activity_at >= ?1
                    AND last_polled_at < ?2)
                OR last_polled_at < ?3
             ORDER BY last_polled_at ASC, entity_id ASC
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            params![
                cutoffs.recent_activity_after,
                cutoffs.cooldown_polled_before,
                cutoffs.stale_polled_before,
                limit as i64,
            ],
            |row| row.get::<_, String>(0),
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Apply per-entity results of one poll. Does not open its own transaction.
    pub fn apply_polling_updates(&self, updates: &[PollingUpdate], now: i64) -> Result<usize, DbError> {
        let mut updated = 0;
        for update in updates {
            updated += match update {
                PollingUpdate::Active {
                    entity_id,
                    latest_activity_at,
                } => self.conn.execute(
                    "UPDATE polling_state
                     SET last_activity_at = MAX(last_activity_at, ?2),
                         last_polled_at = ?3,
                         inaccessible = 0
                     WHERE entity_id = ?1",
                    params![entity_id, latest_activity_at, now],
                )?,
                PollingUpdate::Readable { entity_id } => self.conn.execute(
                    "UPDATE polling_state SET last_polled_at = ?2, inaccessible = 0 WHERE entity_id = ?1",
                    params![entity_id, now],
                )?,
                PollingUpdate::Polled { entity_id } => self.conn.execute(
                    "UPDATE polling_state SET last_polled_at = ?2 WHERE entity_id = ?1",
                    params![entity_id, now],
                )?,
                PollingUpdate::Inaccessible { entity_id } => self.conn.execute(
                    "UPDATE polling_state SET inaccessible = 1, last_polled_at = ?2 WHERE entity_id = ?1",
                    params![entity_id, now],
                )?,
            };
        }
        Ok(updated)
    }

    /// Write one batch's detected occurrences and polling-state changes atomically.
    pub fn reconcile(
        &self,
        occurrences: &[DbOccurrence],
        updates: &[PollingUpdate],
        now: i64,
    ) -> Result<ReconcileSummary, DbError> {
        self.with_transaction(|tx| {
            let occurrences_inserted = tx.insert_occurrences(occurrences)?;
            let states_updated = tx.apply_polling_updates(updates, now)?;
            Ok(ReconcileSummary {
                occurrences_inserted,
                states_updated,
            })
        })
    }

    /// `listInaccessibleEntities()`: members whose feed was last seen private.
    pub fn list_inaccessible(&self) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT entity_id FROM polling_state WHERE inaccessible = 1 ORDER BY entity_id ASC",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn map_polling_state(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbPollingState> {
    Ok(DbPollingState {
        entity_id: row.get(0)?,
        last_activity_at: row.get(1)?,
        last_polled_at: row.get(2)?,
        inaccessible: row.get(3)?,
    })
}
