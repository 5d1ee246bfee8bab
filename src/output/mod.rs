//! Output of MSG statements and step scripts

pub mod formatter;
pub mod human;
pub mod json;
pub mod sink;

pub use formatter::{format_event, OutputFormat};
pub use sink::{CapturedOutput, ConsoleSink, OutputEvent, OutputSink};
