//! Destinations for pipeline output

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::output::formatter::{format_event, OutputFormat};

/// Something a running pipeline produced for its user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputEvent {
    /// Interpolated text of a MSG statement
    Message { text: String },
    /// Combined stdout/stderr of a finished STEP
    StepOutput {
        pipeline: String,
        script: String,
        exit_code: i32,
        output: String,
    },
}

pub trait OutputSink {
    fn emit(&mut self, event: OutputEvent);
}

/// Prints events to stdout
#[derive(Debug, Clone, Default)]
pub struct ConsoleSink {
    format: OutputFormat,
}

impl ConsoleSink {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }
}

impl OutputSink for ConsoleSink {
    fn emit(&mut self, event: OutputEvent) {
        let text = format_event(&event, &self.format);
        if !text.is_empty() {
            println!("{}", text);
        }
    }
}

/// Collects events in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    events: Arc<Mutex<Vec<OutputEvent>>>,
}

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OutputEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Text of every MSG, in order
    pub fn messages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                OutputEvent::Message { text } => Some(text),
                OutputEvent::StepOutput { .. } => None,
            })
            .collect()
    }
}

impl OutputSink for CapturedOutput {
    fn emit(&mut self, event: OutputEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captured_output_shares_buffer() {
        let captured = CapturedOutput::new();
        let mut sink = captured.clone();
        sink.emit(OutputEvent::Message {
            text: "first".to_string(),
        });
        sink.emit(OutputEvent::StepOutput {
            pipeline: "p".to_string(),
            script: "s.sh".to_string(),
            exit_code: 0,
            output: "hi".to_string(),
        });
        sink.emit(OutputEvent::Message {
            text: "second".to_string(),
        });

        assert_eq!(captured.messages(), vec!["first", "second"]);
        assert_eq!(captured.events().len(), 3);
    }
}
