//! Parsing for the clan `members_lite.ws` CSV.
//!
//! The first line is a header (`Clanmate, Clan Rank, Total XP, Kills`).
//! Each member line has at least four comma-separated fields; anything
//! shorter or unparseable is skipped.

use super::RosterMember;
use crate::util::normalize_display_name;

pub fn parse_roster(content: &str) -> Vec<RosterMember> {
    content
        .lines()
        .skip(1)
        .filter_map(parse_member_line)
        .collect()
}

fn parse_member_line(line: &str) -> Option<RosterMember> {
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 4 {
        return None;
    }

    let display_name = normalize_display_name(fields[0]);
    if display_name.is_empty() {
        return None;
    }

    let total_xp = fields[2].trim().parse().ok()?;
    let kills = fields[3].trim().parse().ok()?;

    Some(RosterMember {
        display_name,
        rank: fields[1].trim().to_string(),
        total_xp,
        kills,
    })
}
