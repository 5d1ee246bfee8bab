//! Abstract Syntax Tree definitions for pipeline files

use std::fmt;

use serde::{Deserialize, Serialize};

/// A named block of statements, optionally owning a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Names the `<script-dir>/<name>` directory holding this pipeline's steps
    pub name: String,
    /// Image for this pipeline's own container; `None` runs in the ancestor's
    pub helper_image: Option<String>,
    /// Command the container is started with
    pub start_command: Option<String>,
    pub statements: Vec<Statement>,
    /// Line of the opening `PIPELINE(...)`
    pub line: usize,
}

/// A statement together with the line it starts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub line: usize,
    pub kind: StatementKind,
}

impl Statement {
    pub fn new(line: usize, kind: StatementKind) -> Self {
        Self { line, kind }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    /// `$name = "value"`
    Assign { name: String, value: String },
    /// `STEP script.sh`
    Step { script: String },
    /// `MSG("text")`
    Msg { text: String },
    If(IfStatement),
    Exit,
    Pipeline(Pipeline),
}

/// IF conditional statement
///
/// Branches are lists so that multi-statement branches only need a parser
/// change; the parser currently admits exactly one statement per branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IfStatement {
    pub condition: Condition,
    pub then_branch: Vec<Statement>,
    pub else_branch: Option<Vec<Statement>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub left: Operand,
    pub comparator: Comparator,
    pub right: Operand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// `$name`
    Variable(String),
    /// `"text"`, interpolated at evaluation time
    Literal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    Equal,
    NotEqual,
}

impl Pipeline {
    /// Nested pipelines declared directly in this one, including those inside
    /// IF branches but not those inside other nested pipelines.
    pub fn child_pipelines(&self) -> Vec<&Pipeline> {
        let mut children = Vec::new();
        collect_children(&self.statements, &mut children);
        children
    }
}

fn collect_children<'a>(statements: &'a [Statement], out: &mut Vec<&'a Pipeline>) {
    for statement in statements {
        match &statement.kind {
            StatementKind::Pipeline(p) => out.push(p),
            StatementKind::If(i) => {
                collect_children(&i.then_branch, out);
                if let Some(else_branch) = &i.else_branch {
                    collect_children(else_branch, out);
                }
            }
            _ => {}
        }
    }
}

// ============================================================================
// Rendering back to source
// ============================================================================

const INDENT: &str = "    ";

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparator::Equal => write!(f, "=="),
            Comparator::NotEqual => write!(f, "!="),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Variable(name) => write!(f, "${}", name),
            Operand::Literal(text) => write!(f, "\"{}\"", text),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.left, self.comparator, self.right)
    }
}

impl fmt::Display for Pipeline {
    /// Renders canonical source that parses back to the same tree.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_pipeline(f, self, 0)
    }
}

impl Pipeline {
    /// The `PIPELINE(...)` header line, without indentation.
    pub fn header(&self) -> String {
        let mut params = vec![format!("name=\"{}\"", self.name)];
        if let Some(image) = &self.helper_image {
            params.push(format!("helper_image=\"{}\"", image));
        }
        if let Some(command) = &self.start_command {
            params.push(format!("start_command=\"{}\"", command));
        }
        format!("PIPELINE({})", params.join(", "))
    }
}

fn write_pipeline(f: &mut fmt::Formatter<'_>, pipeline: &Pipeline, depth: usize) -> fmt::Result {
    writeln!(f, "{}{}", INDENT.repeat(depth), pipeline.header())?;
    for statement in &pipeline.statements {
        write_statement(f, statement, depth + 1)?;
    }
    writeln!(f, "{}END", INDENT.repeat(depth))
}

fn write_statement(f: &mut fmt::Formatter<'_>, statement: &Statement, depth: usize) -> fmt::Result {
    let pad = INDENT.repeat(depth);
    match &statement.kind {
        StatementKind::Assign { name, value } => writeln!(f, "{}${} = \"{}\"", pad, name, value),
        StatementKind::Step { script } => writeln!(f, "{}STEP {}", pad, script),
        StatementKind::Msg { text } => writeln!(f, "{}MSG(\"{}\")", pad, text),
        StatementKind::Exit => writeln!(f, "{}EXIT", pad),
        StatementKind::Pipeline(nested) => write_pipeline(f, nested, depth),
        StatementKind::If(if_stmt) => {
            writeln!(f, "{}IF {}:", pad, if_stmt.condition)?;
            for inner in &if_stmt.then_branch {
                write_statement(f, inner, depth + 1)?;
            }
            if let Some(else_branch) = &if_stmt.else_branch {
                writeln!(f, "{}ELSE:", pad)?;
                for inner in else_branch {
                    write_statement(f, inner, depth + 1)?;
                }
            }
            writeln!(f, "{}END", pad)
        }
    }
}
