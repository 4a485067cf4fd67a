//! Terminal and JSON output helpers

use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, presets};
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::OutputFormat;

/// Style configuration for text output
pub struct OutputStyle {
    pub use_color: bool,
    pub use_unicode: bool,
}

impl Default for OutputStyle {
    fn default() -> Self {
        Self {
            use_color: std::env::var("NO_COLOR").is_err(),
            use_unicode: true,
        }
    }
}

impl OutputStyle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

/// Print `value` as JSON in the requested layout
pub fn print_json<T: Serialize>(value: &T, format: OutputFormat) -> anyhow::Result<()> {
    let output = if matches!(format, OutputFormat::JsonPretty) {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{output}");
    Ok(())
}

pub fn format_success(text: &str, style: &OutputStyle) -> String {
    if style.use_color {
        text.green().to_string()
    } else {
        text.to_string()
    }
}

pub fn format_warning(text: &str, style: &OutputStyle) -> String {
    if style.use_color {
        text.yellow().to_string()
    } else {
        text.to_string()
    }
}

pub fn format_key_value(key: &str, value: &str, style: &OutputStyle) -> String {
    if style.use_color {
        format!("{}: {}", key.cyan(), value)
    } else {
        format!("{key}: {value}")
    }
}

/// Format a count badge such as "(42 beatmaps)"
pub fn format_count_badge(count: usize, item_name: &str, style: &OutputStyle) -> String {
    let text = if count == 1 {
        format!("({count} {item_name})")
    } else {
        format!("({count} {item_name}s)")
    };

    if style.use_color {
        text.dimmed().to_string()
    } else {
        text
    }
}

pub fn create_table(style: &OutputStyle) -> Table {
    let mut table = Table::new();

    if style.use_unicode {
        table
            .load_preset(presets::UTF8_FULL)
            .apply_modifier(comfy_table::modifiers::UTF8_ROUND_CORNERS);
    } else {
        table.load_preset(presets::ASCII_FULL);
    }

    table
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);

    table
}

pub fn header_cell(text: &str, style: &OutputStyle) -> Cell {
    let cell = Cell::new(text).add_attribute(Attribute::Bold);
    if style.use_color {
        cell.fg(Color::Cyan).set_alignment(CellAlignment::Left)
    } else {
        cell.set_alignment(CellAlignment::Left)
    }
}

pub fn regular_cell(text: &str) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Left)
}

pub fn numeric_cell(text: &str) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

pub fn print_section_header(title: &str, style: &OutputStyle) {
    if style.use_color {
        println!("\n{}", title.bold().bright_blue());
        println!("{}", "═".repeat(title.chars().count()).bright_blue());
    } else {
        println!("\n{title}");
        println!("{}", "=".repeat(title.chars().count()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_formatting() {
        let style = OutputStyle::new().no_color();
        assert_eq!(format_count_badge(1, "beatmap", &style), "(1 beatmap)");
        assert_eq!(format_count_badge(3, "beatmap", &style), "(3 beatmaps)");
        assert_eq!(format_key_value("Version", "20250107", &style), "Version: 20250107");
        assert_eq!(format_success("done", &style), "done");
    }
}
