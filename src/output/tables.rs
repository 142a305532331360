use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use super::styling::Tone;

const JOB_COLUMNS: [&str; 6] = ["ID", "Test", "Scenario", "State", "Result", "Clone"];

/// An empty jobs table with its header row in place.
pub fn jobs_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            JOB_COLUMNS
                .iter()
                .map(|label| Cell::new(*label).fg(TableColor::Cyan)),
        );
    table
}

/// A cell colored the way [`Tone::paint`] colors terminal text.
pub fn toned_cell(text: impl std::fmt::Display, tone: Tone) -> Cell {
    let cell = Cell::new(text);
    match tone {
        Tone::Good => cell.fg(TableColor::Green),
        Tone::Warning => cell.fg(TableColor::Yellow),
        Tone::Bad => cell.fg(TableColor::Red),
        Tone::Muted => cell.fg(TableColor::DarkGrey),
        Tone::Plain => cell,
    }
}
