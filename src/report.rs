use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Row, Table};
use std::fmt;

use crate::settings::Settings;

const PREVIEW_CHARS: usize = 60;

/// Terminal rendering of the stored settings.
pub struct SettingsReport<'a> {
    settings: &'a Settings,
    source: &'a str,
}

impl<'a> SettingsReport<'a> {
    pub fn new(settings: &'a Settings, source: &'a str) -> Self {
        Self { settings, source }
    }
}

impl fmt::Display for SettingsReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .force_no_tty();

        table.set_header(vec![
            Cell::new(format!("Settings · {}", self.source)),
            Cell::new("Value"),
        ]);

        let settings = self.settings;
        table.add_row(Row::from(vec![
            Cell::new("Text"),
            Cell::new(preview(&settings.text)),
        ]));
        table.add_row(Row::from(vec![
            Cell::new("Delay"),
            Cell::new(format!("{} ms", settings.delay)),
        ]));
        table.add_row(Row::from(vec![
            Cell::new("Loop"),
            Cell::new(if settings.loop_typing { "yes" } else { "no" }),
        ]));
        table.add_row(Row::from(vec![
            Cell::new("Hotkey"),
            Cell::new(&settings.hotkey),
        ]));
        table.add_row(Row::from(vec![
            Cell::new("Update checks"),
            Cell::new(if settings.check_for_updates { "on" } else { "off" }),
        ]));
        for (idx, entry) in settings.history.iter().enumerate() {
            table.add_row(Row::from(vec![
                Cell::new(format!("History #{}", idx + 1)),
                Cell::new(preview(entry)),
            ]));
        }

        write!(f, "{table}")
    }
}

/// Single-line, length-capped rendering of a stored text.
pub fn preview(text: &str) -> String {
    let flat: String = text
        .chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect();
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(PREVIEW_CHARS - 1).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_flattens_and_truncates() {
        assert_eq!(preview("a\nb"), "a b");
        let long = "x".repeat(100);
        let shown = preview(&long);
        assert_eq!(shown.chars().count(), PREVIEW_CHARS);
        assert!(shown.ends_with('…'));
    }

    #[test]
    fn report_lists_history_entries() {
        let mut settings = Settings::default();
        settings.remember("first");
        settings.remember("second");
        let rendered = SettingsReport::new(&settings, "test").to_string();
        assert!(rendered.contains("History #1"));
        assert!(rendered.contains("second"));
        assert!(rendered.contains("50 ms"));
    }
}
