//! Query and administrative commands behind the CLI front end.
//!
//! Each returns the message text to show the operator. Queries only read;
//! the admin commands write through their own transactions and never touch
//! polling cadence.

use crate::db::EventDb;
use crate::error::CommandError;
use crate::report::{render_inaccessible_list, render_occurrence_table};
use crate::util::{format_activity_date, normalize_display_name, parse_activity_date};

pub const DEFAULT_CAPLIST_DAYS: u32 = 7;

/// Occurrences from the last `days` days as a fixed-width table.
pub fn caplist(db: &EventDb, days: u32, now: i64) -> Result<String, CommandError> {
    let rows = db.list_occurrences(days, now)?;
    Ok(render_occurrence_table(days, &rows))
}

/// Members whose activity feed was last seen private.
pub fn list_private(db: &EventDb) -> Result<String, CommandError> {
    let names = db.list_inaccessible()?;
    Ok(render_inaccessible_list(&names))
}

/// Record a cap an operator vouches for. `at` defaults to `now`.
pub fn set_capped(
    db: &EventDb,
    name: &str,
    at: Option<&str>,
    operator: &str,
    now: i64,
) -> Result<String, CommandError> {
    let name = require_name(name)?;
    let operator = operator.trim();
    if operator.is_empty() {
        return Err(CommandError::InvalidArgument(
            "Operator name must not be empty".to_string(),
        ));
    }

    let occurred_at = match at {
        Some(date) => {
            parse_activity_date(date.trim()).map_err(|_| CommandError::InvalidDate(date.to_string()))?
        }
        None => now,
    };

    let inserted = db.record_manual_occurrence(&name, occurred_at, operator)?;
    let date = format_activity_date(occurred_at);
    if inserted {
        log::info!("Recorded manual cap for {} at {} (by {})", name, date, operator);
        Ok(format!("Recorded cap for {} at {}.", name, date))
    } else {
        Ok(format!("{} already has a cap recorded at {}.", name, date))
    }
}

/// Fold a renamed member's history into their new display name.
pub fn remap(db: &EventDb, old: &str, new: &str) -> Result<String, CommandError> {
    let old = require_name(old)?;
    let new = require_name(new)?;
    if old == new {
        return Err(CommandError::InvalidArgument(
            "Old and new names are the same".to_string(),
        ));
    }

    let summary = db.remap_entity(&old, &new)?;
    log::info!(
        "Remapped {} -> {}: {} occurrences moved, {} dropped",
        old,
        new,
        summary.occurrences_moved,
        summary.occurrences_dropped
    );

    let mut message = format!(
        "Moved {} caps from {} to {}.",
        summary.occurrences_moved, old, new
    );
    if summary.occurrences_dropped > 0 {
        message.push_str(&format!(
            " {} were already recorded under {}.",
            summary.occurrences_dropped, new
        ));
    }
    Ok(message)
}

fn require_name(raw: &str) -> Result<String, CommandError> {
    let name = normalize_display_name(raw);
    if name.is_empty() {
        return Err(CommandError::InvalidArgument(
            "Display name must not be empty".to_string(),
        ));
    }
    Ok(name)
}
