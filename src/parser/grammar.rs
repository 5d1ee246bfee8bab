//! Pest grammar parser for pipeline files
//!
//! The pest grammar recognises individual items (`PIPELINE(...)`, `IF ...:`,
//! `ELSE:`, `END`, simple statements); [`TreeBuilder`] assembles them into
//! the block structure with an explicit stack so that unbalanced blocks are
//! reported against the line that opened them.

use std::collections::HashMap;

use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::environment::RESERVED_VARIABLES;
use crate::error::ParseError;
use crate::parser::ast::*;

#[derive(Parser)]
#[grammar = "../grammar/wrci.pest"]
pub struct WrciParser;

type ParseResult<T> = std::result::Result<T, ParseError>;

/// Parse pipeline source text into the root pipeline
pub fn parse_pipeline(input: &str) -> ParseResult<Pipeline> {
    let mut pairs = WrciParser::parse(Rule::file, input).map_err(from_pest_error)?;

    let file = pairs
        .next()
        .ok_or_else(|| ParseError::new(1, "empty input"))?;

    let mut builder = TreeBuilder::default();

    for pair in file.into_inner() {
        let line = line_of(&pair);
        match pair.as_rule() {
            Rule::pipeline_open => {
                let is_root = builder.is_empty();
                builder.open_pipeline(parse_header(pair, line, is_root)?)?;
            }
            Rule::if_open => builder.open_if(parse_if_open(pair)?, line)?,
            Rule::else_branch => builder.open_else(line)?,
            Rule::end => builder.close(line)?,
            Rule::exit => builder.push(Statement::new(line, StatementKind::Exit))?,
            Rule::step => builder.push(Statement::new(line, parse_step(pair)?))?,
            Rule::msg => builder.push(Statement::new(line, parse_msg(pair)?))?,
            Rule::assign => builder.push(Statement::new(line, parse_assign(pair, line)?))?,
            Rule::EOI => {}
            other => {
                return Err(ParseError::new(
                    line,
                    format!("unexpected {}", describe_rule(&other)),
                ))
            }
        }
    }

    builder.finish()
}

fn line_of(pair: &Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

fn from_pest_error(err: pest::error::Error<Rule>) -> ParseError {
    let line = match err.line_col {
        LineColLocation::Pos((line, _)) => line,
        LineColLocation::Span((line, _), _) => line,
    };
    let err = err.renamed_rules(describe_rule);
    ParseError::new(line, err.variant.message().into_owned())
}

fn describe_rule(rule: &Rule) -> String {
    match rule {
        Rule::pipeline_open => "PIPELINE(...)".to_string(),
        Rule::param => "parameter (name=\"value\")".to_string(),
        Rule::if_open => "IF <condition>:".to_string(),
        Rule::condition => "condition".to_string(),
        Rule::comparator => "== or !=".to_string(),
        Rule::else_branch => "ELSE:".to_string(),
        Rule::end => "END".to_string(),
        Rule::exit => "EXIT".to_string(),
        Rule::step => "STEP <script>".to_string(),
        Rule::filename => "script name".to_string(),
        Rule::msg => "MSG(\"...\")".to_string(),
        Rule::assign => "$name = \"value\"".to_string(),
        Rule::variable => "$variable".to_string(),
        Rule::ident => "identifier".to_string(),
        Rule::string => "quoted string".to_string(),
        Rule::EOI => "end of input".to_string(),
        other => format!("{:?}", other),
    }
}

// ============================================================================
// Item Parsing
// ============================================================================

fn parse_header(pair: Pair<Rule>, line: usize, is_root: bool) -> ParseResult<Pipeline> {
    let mut name = None;
    let mut helper_image = None;
    let mut start_command = None;

    for param in pair.into_inner() {
        let mut inner = param.into_inner();
        let key = inner
            .next()
            .ok_or_else(|| ParseError::new(line, "expected parameter name"))?
            .as_str();
        let value = inner
            .next()
            .map(string_value)
            .ok_or_else(|| ParseError::new(line, format!("expected value for '{}'", key)))?;

        let slot = match key {
            "name" => &mut name,
            "helper_image" => &mut helper_image,
            "start_command" => &mut start_command,
            other => {
                return Err(ParseError::new(
                    line,
                    format!(
                        "unknown PIPELINE parameter '{}' (expected name, helper_image or start_command)",
                        other
                    ),
                ))
            }
        };
        if slot.is_some() {
            return Err(ParseError::new(
                line,
                format!("duplicate PIPELINE parameter '{}'", key),
            ));
        }
        *slot = Some(value);
    }

    let name = name.ok_or_else(|| {
        ParseError::new(line, "PIPELINE is missing required parameter 'name'")
    })?;
    validate_pipeline_name(&name, line)?;

    if helper_image.as_deref() == Some("") {
        return Err(ParseError::new(
            line,
            format!("PIPELINE '{}' has an empty helper_image", name),
        ));
    }
    if is_root && helper_image.is_none() {
        return Err(ParseError::new(
            line,
            format!("root PIPELINE '{}' must declare helper_image", name),
        ));
    }

    Ok(Pipeline {
        name,
        helper_image,
        start_command,
        statements: Vec::new(),
        line,
    })
}

fn validate_pipeline_name(name: &str, line: usize) -> ParseResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ParseError::new(
            line,
            format!("invalid pipeline name '{}': must be a plain directory name", name),
        ));
    }
    Ok(())
}

fn parse_if_open(pair: Pair<Rule>) -> ParseResult<Condition> {
    let line = line_of(&pair);
    let condition = pair
        .into_inner()
        .next()
        .ok_or_else(|| ParseError::new(line, "expected condition after IF"))?;

    let mut inner = condition.into_inner();
    let left = inner.next().map(parse_operand);
    let comparator = inner.next().map(|p| match p.as_str() {
        "!=" => Comparator::NotEqual,
        _ => Comparator::Equal,
    });
    let right = inner.next().map(parse_operand);

    match (left, comparator, right) {
        (Some(left), Some(comparator), Some(right)) => Ok(Condition {
            left,
            comparator,
            right,
        }),
        _ => Err(ParseError::new(line, "malformed IF condition")),
    }
}

fn parse_operand(pair: Pair<Rule>) -> Operand {
    match pair.as_rule() {
        Rule::variable => Operand::Variable(variable_name(pair)),
        _ => Operand::Literal(string_value(pair)),
    }
}

fn parse_step(pair: Pair<Rule>) -> ParseResult<StatementKind> {
    let line = line_of(&pair);
    let script = pair
        .into_inner()
        .next()
        .ok_or_else(|| ParseError::new(line, "expected script name after STEP"))?
        .as_str()
        .to_string();
    Ok(StatementKind::Step { script })
}

fn parse_msg(pair: Pair<Rule>) -> ParseResult<StatementKind> {
    let line = line_of(&pair);
    let text = pair
        .into_inner()
        .next()
        .map(string_value)
        .ok_or_else(|| ParseError::new(line, "expected quoted string in MSG"))?;
    Ok(StatementKind::Msg { text })
}

fn parse_assign(pair: Pair<Rule>, line: usize) -> ParseResult<StatementKind> {
    let mut inner = pair.into_inner();
    let name = inner
        .next()
        .map(variable_name)
        .ok_or_else(|| ParseError::new(line, "expected variable name"))?;
    let value = inner
        .next()
        .map(string_value)
        .ok_or_else(|| ParseError::new(line, format!("expected value for '${}'", name)))?;

    if RESERVED_VARIABLES.contains(&name.as_str()) {
        return Err(ParseError::new(
            line,
            format!("cannot assign to reserved variable '${}'", name),
        ));
    }

    Ok(StatementKind::Assign { name, value })
}

fn variable_name(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|ident| ident.as_str().to_string())
        .unwrap_or_default()
}

fn string_value(pair: Pair<Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|text| text.as_str().to_string())
        .unwrap_or_default()
}

// ============================================================================
// Block Assembly
// ============================================================================

/// A block whose END has not been seen yet
#[derive(Debug)]
enum OpenBlock {
    Pipeline(Pipeline),
    If {
        line: usize,
        condition: Condition,
        then_branch: Vec<Statement>,
        else_branch: Option<Vec<Statement>>,
    },
}

impl OpenBlock {
    fn line(&self) -> usize {
        match self {
            OpenBlock::Pipeline(p) => p.line,
            OpenBlock::If { line, .. } => *line,
        }
    }
}

#[derive(Debug, Default)]
struct TreeBuilder {
    stack: Vec<OpenBlock>,
    root: Option<Pipeline>,
}

impl TreeBuilder {
    fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Check that a statement starting on `line` has somewhere to go.
    fn ensure_slot(&self, line: usize) -> ParseResult<()> {
        match self.stack.last() {
            None if self.root.is_some() => Err(ParseError::new(
                line,
                "unexpected content after the root pipeline's END",
            )),
            None => Err(ParseError::new(line, "statement outside of a PIPELINE block")),
            Some(OpenBlock::If {
                then_branch,
                else_branch,
                ..
            }) => {
                let branch = else_branch.as_ref().unwrap_or(then_branch);
                if branch.is_empty() {
                    Ok(())
                } else {
                    Err(ParseError::new(
                        line,
                        "IF branches hold a single statement; expected ELSE: or END",
                    ))
                }
            }
            Some(OpenBlock::Pipeline(_)) => Ok(()),
        }
    }

    fn push(&mut self, statement: Statement) -> ParseResult<()> {
        self.ensure_slot(statement.line)?;
        match self.stack.last_mut() {
            Some(OpenBlock::Pipeline(p)) => p.statements.push(statement),
            Some(OpenBlock::If {
                then_branch,
                else_branch,
                ..
            }) => match else_branch {
                Some(branch) => branch.push(statement),
                None => then_branch.push(statement),
            },
            None => {
                return Err(ParseError::new(
                    statement.line,
                    "statement outside of a PIPELINE block",
                ))
            }
        }
        Ok(())
    }

    fn open_pipeline(&mut self, pipeline: Pipeline) -> ParseResult<()> {
        if self.stack.is_empty() {
            if self.root.is_some() {
                return Err(ParseError::new(
                    pipeline.line,
                    "only one top-level PIPELINE is allowed",
                ));
            }
        } else {
            self.ensure_slot(pipeline.line)?;
        }
        self.stack.push(OpenBlock::Pipeline(pipeline));
        Ok(())
    }

    fn open_if(&mut self, condition: Condition, line: usize) -> ParseResult<()> {
        self.ensure_slot(line)?;
        self.stack.push(OpenBlock::If {
            line,
            condition,
            then_branch: Vec::new(),
            else_branch: None,
        });
        Ok(())
    }

    fn open_else(&mut self, line: usize) -> ParseResult<()> {
        match self.stack.last_mut() {
            Some(OpenBlock::If {
                then_branch,
                else_branch,
                ..
            }) => {
                if else_branch.is_some() {
                    return Err(ParseError::new(line, "duplicate ELSE in IF block"));
                }
                if then_branch.is_empty() {
                    return Err(ParseError::new(line, "IF has no statement before ELSE"));
                }
                *else_branch = Some(Vec::new());
                Ok(())
            }
            _ => Err(ParseError::new(line, "ELSE without matching IF")),
        }
    }

    fn close(&mut self, line: usize) -> ParseResult<()> {
        let block = self
            .stack
            .pop()
            .ok_or_else(|| ParseError::new(line, "END without matching block"))?;

        match block {
            OpenBlock::If {
                line: if_line,
                condition,
                then_branch,
                else_branch,
            } => {
                if then_branch.is_empty() {
                    return Err(ParseError::new(if_line, "IF has no statement"));
                }
                if else_branch.as_ref().is_some_and(|b| b.is_empty()) {
                    return Err(ParseError::new(line, "ELSE has no statement"));
                }
                self.push(Statement::new(
                    if_line,
                    StatementKind::If(IfStatement {
                        condition,
                        then_branch,
                        else_branch,
                    }),
                ))
            }
            OpenBlock::Pipeline(pipeline) => {
                check_sibling_names(&pipeline)?;
                if self.stack.is_empty() {
                    self.root = Some(pipeline);
                    Ok(())
                } else {
                    let line = pipeline.line;
                    self.push(Statement::new(line, StatementKind::Pipeline(pipeline)))
                }
            }
        }
    }

    fn finish(self) -> ParseResult<Pipeline> {
        if let Some(block) = self.stack.last() {
            let what = match block {
                OpenBlock::Pipeline(p) => format!("PIPELINE '{}'", p.name),
                OpenBlock::If { .. } => "IF".to_string(),
            };
            return Err(ParseError::new(
                block.line(),
                format!("unclosed {} block (missing END)", what),
            ));
        }
        self.root
            .ok_or_else(|| ParseError::new(1, "no PIPELINE block found"))
    }
}

fn check_sibling_names(pipeline: &Pipeline) -> ParseResult<()> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for child in pipeline.child_pipelines() {
        if let Some(first) = seen.insert(child.name.as_str(), child.line) {
            return Err(ParseError::new(
                child.line,
                format!(
                    "duplicate pipeline name '{}' in '{}' (first declared on line {})",
                    child.name, pipeline.name, first
                ),
            ));
        }
    }
    Ok(())
}
