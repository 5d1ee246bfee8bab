//! Output formatting

use crate::output::human::format_human;
use crate::output::json::format_json;
use crate::output::sink::OutputEvent;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

pub fn format_event(event: &OutputEvent, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Human => format_human(event),
        OutputFormat::Json => format_json(event),
    }
}
