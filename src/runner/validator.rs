//! Pre-flight validation for wrci pipelines
//!
//! Catches problems that parse fine but would fail or misbehave at run time,
//! before any container is started.

use std::path::PathBuf;

use serde::Serialize;

use crate::engine::step::{StepRunner, DEFAULT_MOUNT_POINT};
use crate::parser::{Condition, Operand, Pipeline, Statement, StatementKind};

/// Default limit on nested pipelines and IFs
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 16;

/// A problem found during validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub line: usize,
    pub message: String,
    pub severity: ValidationSeverity,
}

/// Severity level for validation issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationSeverity {
    Error,
    Warning,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            ValidationSeverity::Error => "ERROR",
            ValidationSeverity::Warning => "WARNING",
        };
        write!(f, "{} (line {}): {}", prefix, self.line, self.message)
    }
}

/// Validation options
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    /// Maximum nesting depth for pipelines and IFs below the root
    pub max_nesting_depth: usize,
    /// When set, STEP scripts are checked on the host
    pub script_dir: Option<PathBuf>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
            script_dir: None,
        }
    }
}

/// Validate a parsed pipeline tree
pub fn validate_pipeline(root: &Pipeline, options: &ValidationOptions) -> Vec<ValidationIssue> {
    let mut validator = Validator {
        options,
        steps: options
            .script_dir
            .as_ref()
            .map(|dir| StepRunner::new(dir.clone(), DEFAULT_MOUNT_POINT)),
        issues: Vec::new(),
    };
    validator.pipeline(root, 0);
    validator.issues
}

/// Check if any issue is an error
pub fn has_errors(issues: &[ValidationIssue]) -> bool {
    issues
        .iter()
        .any(|issue| issue.severity == ValidationSeverity::Error)
}

/// Check if any issue is a warning
pub fn has_warnings(issues: &[ValidationIssue]) -> bool {
    issues
        .iter()
        .any(|issue| issue.severity == ValidationSeverity::Warning)
}

struct Validator<'o> {
    options: &'o ValidationOptions,
    steps: Option<StepRunner>,
    issues: Vec<ValidationIssue>,
}

impl Validator<'_> {
    fn pipeline(&mut self, pipeline: &Pipeline, depth: usize) {
        if depth > self.options.max_nesting_depth {
            self.push(
                pipeline.line,
                ValidationSeverity::Error,
                format!(
                    "Maximum nesting depth ({}) exceeded by pipeline '{}'",
                    self.options.max_nesting_depth, pipeline.name
                ),
            );
            return;
        }
        self.block(pipeline, &pipeline.statements, depth);
    }

    fn block(&mut self, owner: &Pipeline, statements: &[Statement], depth: usize) {
        let mut exited = false;
        for statement in statements {
            if exited {
                self.push(
                    statement.line,
                    ValidationSeverity::Warning,
                    "Unreachable statement after EXIT",
                );
                // One warning per block is enough
                break;
            }
            self.statement(owner, statement, depth);
            exited = matches!(statement.kind, StatementKind::Exit);
        }
    }

    fn statement(&mut self, owner: &Pipeline, statement: &Statement, depth: usize) {
        match &statement.kind {
            StatementKind::Step { script } => self.step(owner, script, statement.line),
            StatementKind::If(if_stmt) => {
                if depth + 1 > self.options.max_nesting_depth {
                    self.push(
                        statement.line,
                        ValidationSeverity::Error,
                        format!(
                            "Maximum nesting depth ({}) exceeded",
                            self.options.max_nesting_depth
                        ),
                    );
                    return;
                }
                if is_constant(&if_stmt.condition) {
                    self.push(
                        statement.line,
                        ValidationSeverity::Warning,
                        format!(
                            "Condition '{}' compares two constants",
                            if_stmt.condition
                        ),
                    );
                }
                self.block(owner, &if_stmt.then_branch, depth + 1);
                if let Some(else_branch) = &if_stmt.else_branch {
                    self.block(owner, else_branch, depth + 1);
                }
            }
            StatementKind::Pipeline(nested) => self.pipeline(nested, depth + 1),
            StatementKind::Assign { .. } | StatementKind::Msg { .. } | StatementKind::Exit => {}
        }
    }

    fn step(&mut self, owner: &Pipeline, script: &str, line: usize) {
        let Some(steps) = &self.steps else {
            return;
        };
        if let Err(e) = steps.locate(&owner.name, script) {
            self.push(line, ValidationSeverity::Warning, e.to_string());
        }
    }

    fn push(&mut self, line: usize, severity: ValidationSeverity, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            line,
            message: message.into(),
            severity,
        });
    }
}

fn is_constant(condition: &Condition) -> bool {
    let literal = |operand: &Operand| match operand {
        Operand::Variable(_) => false,
        Operand::Literal(text) => !text.contains('$'),
    };
    literal(&condition.left) && literal(&condition.right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_pipeline;

    fn validate(source: &str) -> Vec<ValidationIssue> {
        let root = parse_pipeline(source).unwrap();
        validate_pipeline(&root, &ValidationOptions::default())
    }

    #[test]
    fn test_clean_pipeline() {
        let issues = validate(
            r#"
PIPELINE(name="p", helper_image="img")
    $arch = "armv7"
    IF $arch == "armv7": MSG("ok") END
END
"#,
        );
        assert!(issues.is_empty(), "{:?}", issues);
    }

    #[test]
    fn test_unreachable_after_exit() {
        let issues = validate(
            "PIPELINE(name=\"p\", helper_image=\"img\")\nEXIT\nMSG(\"a\")\nMSG(\"b\")\nEND",
        );
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].line, 3);
        assert_eq!(issues[0].severity, ValidationSeverity::Warning);
        assert!(!has_errors(&issues));
        assert!(has_warnings(&issues));
    }

    #[test]
    fn test_constant_condition() {
        let issues = validate(
            "PIPELINE(name=\"p\", helper_image=\"img\")\nIF \"a\" == \"b\": MSG(\"x\") END\nEND",
        );
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("constants"));
        assert_eq!(issues[0].line, 2);
    }

    #[test]
    fn test_nesting_depth_exceeded() {
        let source = r#"
PIPELINE(name="p", helper_image="img")
    PIPELINE(name="a")
        PIPELINE(name="b")
            MSG("deep")
        END
    END
END
"#;
        let root = parse_pipeline(source).unwrap();
        let options = ValidationOptions {
            max_nesting_depth: 1,
            script_dir: None,
        };
        let issues = validate_pipeline(&root, &options);
        assert!(has_errors(&issues));
        assert_eq!(issues[0].line, 4);
        assert!(issues[0].to_string().starts_with("ERROR (line 4)"));
    }

    #[test]
    fn test_issue_serializes_for_json_output() {
        let issue = ValidationIssue {
            line: 3,
            message: "Unreachable statement after EXIT".to_string(),
            severity: ValidationSeverity::Warning,
        };
        assert_eq!(
            serde_json::to_string(&issue).unwrap(),
            r#"{"line":3,"message":"Unreachable statement after EXIT","severity":"warning"}"#
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_step_script_warns() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("p");
        std::fs::create_dir_all(&dir).unwrap();
        let present = dir.join("present.sh");
        std::fs::write(&present, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&present, std::fs::Permissions::from_mode(0o755)).unwrap();

        let root = parse_pipeline(
            "PIPELINE(name=\"p\", helper_image=\"img\")\nSTEP present.sh\nSTEP absent.sh\nEND",
        )
        .unwrap();
        let options = ValidationOptions {
            script_dir: Some(temp.path().to_path_buf()),
            ..Default::default()
        };
        let issues = validate_pipeline(&root, &options);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].line, 3);
        assert_eq!(issues[0].severity, ValidationSeverity::Warning);
    }
}
