//! JSON output formatting, one object per line

use crate::output::sink::OutputEvent;

pub fn format_json(event: &OutputEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string())
}
