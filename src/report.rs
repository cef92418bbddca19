//! Plain-text renderings of store queries for chat front ends.

use crate::db::DbOccurrence;
use crate::util::format_activity_date;

/// Fixed-width table of occurrences, newest first, wrapped in a code block.
pub fn render_occurrence_table(days: u32, rows: &[DbOccurrence]) -> String {
    let mut sorted: Vec<&DbOccurrence> = rows.iter().collect();
    sorted.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));

    let rendered: Vec<(&str, String)> = sorted
        .iter()
        .map(|o| (o.entity_id.as_str(), format_activity_date(o.occurred_at)))
        .collect();

    let longest_name = rendered.iter().map(|(n, _)| n.chars().count()).max().unwrap_or(0);
    let longest_date = rendered.iter().map(|(_, d)| d.chars().count()).max().unwrap_or(0);

    // Two columns: three bars plus one space either side of each cell
    let table_width = longest_name + longest_date + 3 + 4;
    let rule = "-".repeat(table_width);

    let mut message = format!("### Users that have capped in the last {} days:\n", days);
    message.push_str("```\n");
    message.push_str(&rule);
    message.push('\n');
    for (name, date) in &rendered {
        message.push_str(&format!(
            "| {:<name_w$} | {:<date_w$} |\n",
            name,
            date,
            name_w = longest_name,
            date_w = longest_date
        ));
    }
    message.push_str(&rule);
    message.push_str("```");
    message
}

pub fn render_inaccessible_list(names: &[String]) -> String {
    let mut message = String::from("### Users with private Alogs:\n");
    if names.is_empty() {
        message.push_str("None");
    } else {
        let lines: Vec<String> = names.iter().map(|n| format!("- {}", n)).collect();
        message.push_str(&lines.join("\n"));
    }
    message
}
