use chrono::TimeDelta;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::timestamps::delta_seconds;

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

pub fn format_minutes(delta: TimeDelta) -> String {
    format!("{:.1}min", delta_seconds(delta) / 60.0)
}

pub fn color_coded_duration_cell(delta: TimeDelta) -> Cell {
    let minutes = delta_seconds(delta) / 60.0;
    let text = format_minutes(delta);
    if minutes <= 30.0 {
        Cell::new(text).fg(TableColor::Green)
    } else if minutes <= 60.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Red)
    }
}

/// Any time spent blocked is worth flagging.
pub fn color_coded_blocked_cell(delta: TimeDelta) -> Cell {
    let text = format_minutes(delta);
    if delta > TimeDelta::zero() {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Green)
    }
}

pub fn color_coded_outcome_cell(success: Option<bool>) -> Cell {
    match success {
        Some(true) => Cell::new("committed").fg(TableColor::Green),
        Some(false) => Cell::new("failed").fg(TableColor::Red),
        None => Cell::new("in progress").fg(TableColor::Yellow),
    }
}
