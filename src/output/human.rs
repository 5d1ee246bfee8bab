//! Human-readable output formatting

use crate::output::sink::OutputEvent;

pub fn format_human(event: &OutputEvent) -> String {
    match event {
        OutputEvent::Message { text } => text.clone(),
        OutputEvent::StepOutput {
            pipeline,
            script,
            exit_code,
            output,
        } => {
            let prefix = format!("[{}/{}]", pipeline, script);
            let mut lines: Vec<String> = output
                .lines()
                .map(|line| format!("{} {}", prefix, line))
                .collect();
            if *exit_code != 0 {
                lines.push(format!("{} exited with status {}", prefix, exit_code));
            }
            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_is_verbatim() {
        let event = OutputEvent::Message {
            text: "armv7 is armv7".to_string(),
        };
        assert_eq!(format_human(&event), "armv7 is armv7");
    }

    #[test]
    fn test_step_output_is_prefixed() {
        let event = OutputEvent::StepOutput {
            pipeline: "build".to_string(),
            script: "make.sh".to_string(),
            exit_code: 2,
            output: "compiling\nfailed\n".to_string(),
        };
        assert_eq!(
            format_human(&event),
            "[build/make.sh] compiling\n[build/make.sh] failed\n[build/make.sh] exited with status 2"
        );
    }

    #[test]
    fn test_silent_successful_step() {
        let event = OutputEvent::StepOutput {
            pipeline: "p".to_string(),
            script: "s.sh".to_string(),
            exit_code: 0,
            output: String::new(),
        };
        assert_eq!(format_human(&event), "");
    }
}
