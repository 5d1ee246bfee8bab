//! Human-readable outline of a pipeline tree

use crate::parser::{Pipeline, Statement, StatementKind};

const INDENT: &str = "  ";

/// Explain a pipeline without executing it, one numbered line per item
pub fn explain_pipeline(root: &Pipeline) -> Vec<String> {
    let mut lines = Vec::new();
    explain_frame(root, 0, &mut lines);

    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| format!("{}. {}", i + 1, line))
        .collect()
}

fn explain_frame(pipeline: &Pipeline, depth: usize, lines: &mut Vec<String>) {
    let container = match &pipeline.helper_image {
        Some(image) => format!("starts a container from {}", image),
        None => "runs in the enclosing container".to_string(),
    };
    let mut line = format!("{}PIPELINE {} {}", INDENT.repeat(depth), pipeline.name, container);
    if let Some(command) = &pipeline.start_command {
        line.push_str(&format!(" (start command: {})", command));
    }
    lines.push(line);

    for statement in &pipeline.statements {
        explain_statement(pipeline, statement, depth + 1, lines);
    }
}

fn explain_statement(owner: &Pipeline, statement: &Statement, depth: usize, lines: &mut Vec<String>) {
    let pad = INDENT.repeat(depth);
    match &statement.kind {
        StatementKind::Assign { name, value } => {
            lines.push(format!("{}SET ${} = \"{}\"", pad, name, value));
        }
        StatementKind::Step { script } => {
            lines.push(format!("{}STEP {}/{} (sets $LAST_RC)", pad, owner.name, script));
        }
        StatementKind::Msg { text } => lines.push(format!("{}MSG \"{}\"", pad, text)),
        StatementKind::If(if_stmt) => {
            lines.push(format!("{}IF {}", pad, if_stmt.condition));
            for inner in &if_stmt.then_branch {
                explain_statement(owner, inner, depth + 1, lines);
            }
            if let Some(else_branch) = &if_stmt.else_branch {
                lines.push(format!("{}ELSE", pad));
                for inner in else_branch {
                    explain_statement(owner, inner, depth + 1, lines);
                }
            }
        }
        StatementKind::Exit => lines.push(format!("{}EXIT stops the whole run", pad)),
        StatementKind::Pipeline(nested) => explain_frame(nested, depth, lines),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_pipeline;

    #[test]
    fn test_explain_outline() {
        let source = r#"
PIPELINE(name="p", helper_image="img")
    $arch = "armv7"
    IF $arch == "armv7": MSG("ok") ELSE: EXIT END
    PIPELINE(name="build")
        STEP make.sh
    END
END
"#;
        let root = parse_pipeline(source).unwrap();
        let lines = explain_pipeline(&root);
        assert_eq!(
            lines,
            vec![
                "1. PIPELINE p starts a container from img",
                "2.   SET $arch = \"armv7\"",
                "3.   IF $arch == \"armv7\"",
                "4.     MSG \"ok\"",
                "5.   ELSE",
                "6.     EXIT stops the whole run",
                "7.   PIPELINE build runs in the enclosing container",
                "8.     STEP build/make.sh (sets $LAST_RC)",
            ]
        );
    }

    #[test]
    fn test_explain_start_command() {
        let root = parse_pipeline(
            "PIPELINE(name=\"p\", helper_image=\"img\", start_command=\"sleep 600\")\nEND",
        )
        .unwrap();
        assert_eq!(
            explain_pipeline(&root),
            vec!["1. PIPELINE p starts a container from img (start command: sleep 600)"]
        );
    }
}
