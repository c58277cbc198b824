use heapless::{String, Vec};
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::instruction::{self, Instruction, Shape};
use crate::lexer::{self, InstructionTokens, Token};
use crate::state::{Label, MachineState};
use crate::target::{parse_immediate, Operand, Target};

/// Size limits enforced by `compile`. They are clamped to the state's
/// capacities.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Limits {
    pub max_lines: usize,
    pub max_columns: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_lines: 40,
            max_columns: 18,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperandIssue {
    Missing,
    Excess,
    NotATarget,
    NotWritable,
}

#[derive(Error, Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    #[error("too many lines")]
    TooManyLines,
    #[error("line too long")]
    LineTooLong,
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("unknown instruction")]
    UnknownInstruction,
    #[error("invalid operand ({0:?})")]
    InvalidOperand(OperandIssue),
    #[error("undefined label")]
    UndefinedLabel,
    #[error("duplicate label")]
    DuplicateLabel,
}

impl ErrorKind {
    /// Stable key for the UI to localise.
    pub fn message_key(&self) -> &'static str {
        match self {
            ErrorKind::TooManyLines => "message.too_many_lines",
            ErrorKind::LineTooLong => "message.line_too_long",
            ErrorKind::UnexpectedToken => "message.unexpected_token",
            ErrorKind::UnknownInstruction => "message.unknown_instruction",
            ErrorKind::InvalidOperand(OperandIssue::Missing) => "message.missing_parameter",
            ErrorKind::InvalidOperand(OperandIssue::Excess) => "message.excess_tokens",
            ErrorKind::InvalidOperand(OperandIssue::NotATarget) => "message.invalid_target",
            ErrorKind::InvalidOperand(OperandIssue::NotWritable) => "message.invalid_destination",
            ErrorKind::UndefinedLabel => "message.label_not_found",
            ErrorKind::DuplicateLabel => "message.duplicate_label",
        }
    }
}

/// A compile failure located in the source. `line` is 1-based, the columns
/// are byte offsets into the normalized line.
#[derive(Error, Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} at line {line}, columns {start_column}..{end_column}")]
pub struct ParseError {
    pub kind: ErrorKind,
    pub line: usize,
    pub start_column: usize,
    pub end_column: usize,
}

impl ParseError {
    pub fn new(kind: ErrorKind, line_index: usize, start_column: usize, end_column: usize) -> Self {
        Self {
            kind,
            line: line_index.saturating_add(1),
            start_column,
            end_column,
        }
    }

    fn at(kind: ErrorKind, line_index: usize, token: Token<'_>) -> Self {
        Self::new(kind, line_index, token.start, token.end)
    }
}

/// A check that can only run once every line has been parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Validator<const COLUMNS: usize> {
    /// The jump at instruction `at` needs `label` to exist.
    JumpTarget {
        label: String<COLUMNS>,
        at: usize,
        line_index: usize,
        start_column: usize,
        end_column: usize,
    },
}

impl<const COLUMNS: usize> Validator<COLUMNS> {
    /// Run the check, patching the instruction it was registered for.
    pub fn apply<const LINES: usize>(
        &self,
        state: &mut MachineState<LINES, COLUMNS>,
    ) -> Result<(), ParseError> {
        match self {
            Validator::JumpTarget {
                label,
                at,
                line_index,
                start_column,
                end_column,
            } => {
                let Some(index) = state.label(label.as_str()) else {
                    return Err(ParseError::new(
                        ErrorKind::UndefinedLabel,
                        *line_index,
                        *start_column,
                        *end_column,
                    ));
                };
                if let Some(Instruction::Jump(_, target)) = state.instructions.get_mut(*at) {
                    *target = index;
                }
                Ok(())
            }
        }
    }
}

/// Compile `source` into `state`.
///
/// `state` is cleared first. On failure the program stays empty but the
/// normalized source text is kept so the error can be shown against it.
pub fn compile<'s, I, const LINES: usize, const COLUMNS: usize>(
    source: I,
    limits: &Limits,
    state: &mut MachineState<LINES, COLUMNS>,
) -> Result<(), ParseError>
where
    I: IntoIterator<Item = &'s str>,
{
    state.clear();

    let max_lines = limits.max_lines.min(LINES);
    let max_columns = limits.max_columns.min(COLUMNS);
    let mut overlong = None;
    for (line_index, line) in source.into_iter().enumerate() {
        if line_index >= max_lines {
            state.clear();
            return Err(ParseError::new(ErrorKind::TooManyLines, max_lines.saturating_sub(1), 0, 0));
        }
        let (normalized, truncated) = normalize::<COLUMNS>(line);
        if overlong.is_none() && (truncated || line.chars().count() > max_columns) {
            overlong = Some(line_index);
        }
        if state.code.push(normalized).is_err() {
            state.clear();
            return Err(ParseError::new(ErrorKind::TooManyLines, max_lines.saturating_sub(1), 0, 0));
        }
    }

    let result = parse_program(state, max_columns, overlong);
    if result.is_err() {
        state.clear_program();
    }
    result
}

fn parse_program<const LINES: usize, const COLUMNS: usize>(
    state: &mut MachineState<LINES, COLUMNS>,
    max_columns: usize,
    overlong: Option<usize>,
) -> Result<(), ParseError> {
    let mut validators: Vec<Validator<COLUMNS>, LINES> = Vec::new();

    for (line_index, code) in state.code.iter().enumerate() {
        if overlong == Some(line_index) {
            return Err(ParseError::new(ErrorKind::LineTooLong, line_index, max_columns, max_columns));
        }

        let line = lexer::split_line(code.as_str())
            .map_err(|token| ParseError::at(ErrorKind::UnexpectedToken, line_index, token))?;

        if let Some(label) = line.label {
            if state.labels.iter().any(|known| known.name.as_str() == label.text) {
                return Err(ParseError::at(ErrorKind::DuplicateLabel, line_index, label));
            }
            let name = to_name::<COLUMNS>(label.text)
                .ok_or(ParseError::at(ErrorKind::UnexpectedToken, line_index, label))?;
            state
                .labels
                .push(Label {
                    name,
                    index: state.instructions.len(),
                })
                .map_err(|_| ParseError::at(ErrorKind::TooManyLines, line_index, label))?;
        }

        let Some(tokens) = line.instruction else {
            continue;
        };
        let at = state.instructions.len();
        let instruction = emit(&tokens, line_index, at, &mut validators)?;
        state
            .line_numbers
            .push(line_index)
            .map_err(|_| ParseError::at(ErrorKind::TooManyLines, line_index, tokens.name))?;
        state
            .instructions
            .push(instruction)
            .map_err(|_| ParseError::at(ErrorKind::TooManyLines, line_index, tokens.name))?;
    }

    for validator in validators.iter() {
        validator.apply(state)?;
    }
    Ok(())
}

fn emit<const LINES: usize, const COLUMNS: usize>(
    tokens: &InstructionTokens<'_>,
    line_index: usize,
    at: usize,
    validators: &mut Vec<Validator<COLUMNS>, LINES>,
) -> Result<Instruction, ParseError> {
    let info = instruction::lookup(tokens.name.text)
        .ok_or(ParseError::at(ErrorKind::UnknownInstruction, line_index, tokens.name))?;

    if let Some(excess) = tokens.excess {
        return Err(ParseError::at(
            ErrorKind::InvalidOperand(OperandIssue::Excess),
            line_index,
            excess,
        ));
    }

    match info.shape {
        Shape::Unary(instruction) => {
            reject(tokens.arg1, line_index)?;
            Ok(instruction)
        }
        Shape::Jump(condition) => {
            let label = require(tokens.arg1, tokens.name, line_index)?;
            reject(tokens.arg2, line_index)?;
            let name = to_name::<COLUMNS>(label.text)
                .ok_or(ParseError::at(ErrorKind::UnexpectedToken, line_index, label))?;
            validators
                .push(Validator::JumpTarget {
                    label: name,
                    at,
                    line_index,
                    start_column: label.start,
                    end_column: label.end,
                })
                .map_err(|_| ParseError::at(ErrorKind::TooManyLines, line_index, label))?;
            // Patched once all labels are known.
            Ok(Instruction::Jump(condition, 0))
        }
        Shape::JumpRelative => {
            let operand = require(tokens.arg1, tokens.name, line_index)?;
            reject(tokens.arg2, line_index)?;
            Ok(Instruction::JumpRelative(parse_operand(operand, line_index)?))
        }
        Shape::Arithmetic(arithmetic) => {
            let operand = require(tokens.arg1, tokens.name, line_index)?;
            reject(tokens.arg2, line_index)?;
            Ok(Instruction::Arithmetic(arithmetic, parse_operand(operand, line_index)?))
        }
        Shape::Move => {
            let source = require(tokens.arg1, tokens.name, line_index)?;
            let destination = require(tokens.arg2, source, line_index)?;
            let source = parse_operand(source, line_index)?;
            let destination = parse_destination(destination, line_index)?;
            Ok(Instruction::Mov(source, destination))
        }
    }
}

// Missing operands are reported at the token they should have followed.
fn require<'a>(
    token: Option<Token<'a>>,
    previous: Token<'a>,
    line_index: usize,
) -> Result<Token<'a>, ParseError> {
    token.ok_or(ParseError::at(
        ErrorKind::InvalidOperand(OperandIssue::Missing),
        line_index,
        previous,
    ))
}

fn reject(token: Option<Token<'_>>, line_index: usize) -> Result<(), ParseError> {
    match token {
        Some(token) => Err(ParseError::at(
            ErrorKind::InvalidOperand(OperandIssue::Excess),
            line_index,
            token,
        )),
        None => Ok(()),
    }
}

fn parse_operand(token: Token<'_>, line_index: usize) -> Result<Operand, ParseError> {
    Operand::parse(token.text).ok_or(ParseError::at(
        ErrorKind::InvalidOperand(OperandIssue::NotATarget),
        line_index,
        token,
    ))
}

fn parse_destination(token: Token<'_>, line_index: usize) -> Result<Target, ParseError> {
    if let Some(target) = Target::parse(token.text) {
        return Ok(target);
    }
    let issue = if parse_immediate(token.text).is_some() {
        OperandIssue::NotWritable
    } else {
        OperandIssue::NotATarget
    };
    Err(ParseError::at(ErrorKind::InvalidOperand(issue), line_index, token))
}

/// Upper-case a raw line. Text beyond the storage capacity is dropped and
/// reported through the flag.
fn normalize<const COLUMNS: usize>(line: &str) -> (String<COLUMNS>, bool) {
    let mut out: String<COLUMNS> = String::new();
    for ch in line.chars().flat_map(char::to_uppercase) {
        if out.push(ch).is_err() {
            return (out, true);
        }
    }
    (out, false)
}

fn to_name<const COLUMNS: usize>(text: &str) -> Option<String<COLUMNS>> {
    let mut out: String<COLUMNS> = String::new();
    out.push_str(text).ok()?;
    Some(out)
}
