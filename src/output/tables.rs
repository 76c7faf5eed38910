use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::report::Severity;

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

/// Compact human duration: seconds, minutes, hours or days.
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.0}s")
    } else if seconds < 3600.0 {
        format!("{:.1}min", seconds / 60.0)
    } else if seconds < 86_400.0 {
        format!("{:.1}h", seconds / 3600.0)
    } else {
        format!("{:.1}d", seconds / 86_400.0)
    }
}

pub fn color_coded_conformance_cell(rate: f64) -> Cell {
    let text = format!("{rate:.1}%");
    if rate > 80.0 {
        Cell::new(text).fg(TableColor::Green)
    } else if rate >= 50.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Red)
    }
}

pub fn color_coded_impact_cell(score: f64) -> Cell {
    let text = format!("{score:.1}");
    if score >= 75.0 {
        Cell::new(text).fg(TableColor::Red)
    } else if score >= 40.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Green)
    }
}

pub fn color_coded_utilization_cell(percentage: f64) -> Cell {
    let text = format!("{percentage:.1}%");
    if percentage >= 90.0 {
        Cell::new(text).fg(TableColor::Red)
    } else if percentage >= 70.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Green)
    }
}

pub fn color_coded_confidence_cell(score: f64) -> Cell {
    let text = format!("{score:.0}");
    if score >= 70.0 {
        Cell::new(text).fg(TableColor::Green)
    } else if score >= 40.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Red)
    }
}

pub fn severity_cell(severity: Severity) -> Cell {
    let color = match severity {
        Severity::Low => TableColor::Green,
        Severity::Medium => TableColor::Yellow,
        Severity::High => TableColor::Red,
        Severity::Critical => TableColor::Magenta,
    };
    Cell::new(severity.to_string()).fg(color)
}
