use crate::compiler::{compile, ErrorKind, Limits, OperandIssue, ParseError, Validator};
use crate::instruction::{Arithmetic, Condition, Instruction, NOP};
use crate::state::MachineState;
use crate::target::{Operand, Port, Target};

extern crate std;
use std::vec::Vec as StdVec;

type State = MachineState<16, 24>;

const LIMITS: Limits = Limits {
    max_lines: 16,
    max_columns: 24,
};

fn compiled(lines: &[&str]) -> State {
    let mut state = State::new();
    compile(lines.iter().copied(), &LIMITS, &mut state).unwrap();
    state
}

fn compile_err(lines: &[&str]) -> (ParseError, State) {
    let mut state = State::new();
    let err = compile(lines.iter().copied(), &LIMITS, &mut state).unwrap_err();
    (err, state)
}

#[test]
fn compiles_basic_program() {
    let state = compiled(&["ADD 3", "SUB 1"]);
    assert_eq!(
        state.instructions(),
        &[
            Instruction::Arithmetic(Arithmetic::Add, Operand::Immediate(3)),
            Instruction::Arithmetic(Arithmetic::Sub, Operand::Immediate(1)),
        ]
    );
    assert_eq!(state.line_numbers(), &[0, 1]);
}

#[test]
fn line_map_skips_blank_comment_and_label_lines() {
    let state = compiled(&[
        "# setup",
        "START:",
        "  mov up, acc   # read",
        "",
        "  add acc",
        "  jmp start",
    ]);
    assert_eq!(state.instructions().len(), 3);
    assert_eq!(state.line_numbers(), &[2, 4, 5]);
    assert_eq!(state.label("START"), Some(0));
    for (index, line) in state.line_numbers().iter().enumerate() {
        assert_eq!(state.line_number(index), Some(*line));
    }
}

#[test]
fn source_is_upper_cased_and_kept() {
    let state = compiled(&["mov left, right # x"]);
    let code: StdVec<&str> = state.code().iter().map(|line| line.as_str()).collect();
    assert_eq!(code, ["MOV LEFT, RIGHT # X"]);
    assert_eq!(
        state.instructions(),
        &[Instruction::Mov(
            Operand::Target(Target::Port(Port::Left)),
            Target::Port(Port::Right)
        )]
    );
}

#[test]
fn nop_is_add_nil() {
    let state = compiled(&["NOP"]);
    assert_eq!(state.instructions(), &[NOP]);
    assert_eq!(
        NOP,
        Instruction::Arithmetic(Arithmetic::Add, Operand::Target(Target::Nil))
    );
}

#[test]
fn forward_label_reference_resolves() {
    let state = compiled(&["JMP END", "ADD 1", "END: SUB 1"]);
    assert_eq!(
        state.instructions().first(),
        Some(&Instruction::Jump(Condition::Always, 2))
    );
}

#[test]
fn label_on_own_line_points_at_next_instruction() {
    let state = compiled(&["ADD 1", "LOOP:", "", "JNZ LOOP"]);
    assert_eq!(state.label("LOOP"), Some(1));
    assert_eq!(
        state.instructions().get(1),
        Some(&Instruction::Jump(Condition::NotZero, 1))
    );
}

#[test]
fn trailing_label_points_past_the_end() {
    let state = compiled(&["JEZ OUT", "ADD 1", "OUT:"]);
    assert_eq!(state.label("OUT"), Some(2));
    assert_eq!(
        state.instructions().first(),
        Some(&Instruction::Jump(Condition::Zero, 2))
    );
}

#[test]
fn undefined_label_reports_the_jump() {
    let (err, state) = compile_err(&["ADD 1", "  JGZ NOWHERE"]);
    assert_eq!(
        err,
        ParseError {
            kind: ErrorKind::UndefinedLabel,
            line: 2,
            start_column: 6,
            end_column: 13,
        }
    );
    assert!(state.is_empty());
    assert!(state.labels().is_empty());
    assert_eq!(state.code().len(), 2);
}

#[test]
fn duplicate_label_is_an_error() {
    let (err, _) = compile_err(&["A: ADD 1", "A: SUB 1"]);
    assert_eq!(err.kind, ErrorKind::DuplicateLabel);
    assert_eq!(err.line, 2);
    assert_eq!((err.start_column, err.end_column), (0, 1));
}

#[test]
fn too_many_lines_leaves_state_empty() {
    let mut state = State::new();
    compile(["ADD 1"], &LIMITS, &mut state).unwrap();
    let limits = Limits {
        max_lines: 2,
        max_columns: 24,
    };
    let err = compile(["NOP", "NOP", "NOP"], &limits, &mut state).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TooManyLines);
    assert_eq!(err.line, 2);
    assert!(state.is_empty());
    assert!(state.labels().is_empty());
    assert!(state.code().is_empty());
}

#[test]
fn too_many_lines_is_capped_by_capacity() {
    let mut state: MachineState<2, 8> = MachineState::new();
    let err = compile(["NOP", "NOP", "NOP"], &LIMITS, &mut state).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TooManyLines);
}

#[test]
fn line_too_long_reports_the_limit() {
    let limits = Limits {
        max_lines: 16,
        max_columns: 8,
    };
    let mut state = State::new();
    let err = compile(["NOP", "MOV LEFT, RIGHT"], &limits, &mut state).unwrap_err();
    assert_eq!(
        err,
        ParseError {
            kind: ErrorKind::LineTooLong,
            line: 2,
            start_column: 8,
            end_column: 8,
        }
    );
    assert!(state.is_empty());
    assert_eq!(state.code().len(), 2);
}

#[test]
fn earlier_syntax_error_wins_over_later_long_line() {
    let limits = Limits {
        max_lines: 16,
        max_columns: 8,
    };
    let mut state = State::new();
    let err = compile(["FOO", "MOV LEFT, RIGHT"], &limits, &mut state).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownInstruction);
    assert_eq!(err.line, 1);
}

#[test]
fn unknown_instruction() {
    let (err, _) = compile_err(&["  HCF"]);
    assert_eq!(err.kind, ErrorKind::UnknownInstruction);
    assert_eq!((err.start_column, err.end_column), (2, 5));
    assert_eq!(err.kind.message_key(), "message.unknown_instruction");
}

#[test]
fn unary_rejects_operands() {
    let (err, _) = compile_err(&["SWP ACC"]);
    assert_eq!(err.kind, ErrorKind::InvalidOperand(OperandIssue::Excess));
    assert_eq!((err.start_column, err.end_column), (4, 7));
}

#[test]
fn single_operand_rejects_second() {
    let (err, _) = compile_err(&["ADD 1, 2"]);
    assert_eq!(err.kind, ErrorKind::InvalidOperand(OperandIssue::Excess));
    assert_eq!((err.start_column, err.end_column), (7, 8));
}

#[test]
fn excess_tokens_after_two_operands() {
    let (err, _) = compile_err(&["MOV 1, ACC NIL"]);
    assert_eq!(err.kind, ErrorKind::InvalidOperand(OperandIssue::Excess));
    assert_eq!(err.start_column, 11);
}

#[test]
fn missing_operands() {
    let (err, _) = compile_err(&["ADD"]);
    assert_eq!(err.kind, ErrorKind::InvalidOperand(OperandIssue::Missing));
    let (err, _) = compile_err(&["MOV ACC"]);
    assert_eq!(err.kind, ErrorKind::InvalidOperand(OperandIssue::Missing));
    assert_eq!((err.start_column, err.end_column), (4, 7));
    let (err, _) = compile_err(&["JMP"]);
    assert_eq!(err.kind, ErrorKind::InvalidOperand(OperandIssue::Missing));
}

#[test]
fn invalid_operand_kinds() {
    let (err, _) = compile_err(&["ADD BAK"]);
    assert_eq!(err.kind, ErrorKind::InvalidOperand(OperandIssue::NotATarget));
    let (err, _) = compile_err(&["MOV ACC, 5"]);
    assert_eq!(err.kind, ErrorKind::InvalidOperand(OperandIssue::NotWritable));
    assert_eq!(err.kind.message_key(), "message.invalid_destination");
    let (err, _) = compile_err(&["MOV ACC, FOO"]);
    assert_eq!(err.kind, ErrorKind::InvalidOperand(OperandIssue::NotATarget));
}

#[test]
fn malformed_label_is_unexpected_token() {
    let (err, _) = compile_err(&["MY LOOP: NOP"]);
    assert_eq!(err.kind, ErrorKind::UnexpectedToken);
    assert_eq!((err.start_column, err.end_column), (0, 7));
}

#[test]
fn register_or_immediate_forms() {
    let state = compiled(&["JRO -2", "JRO ANY", "SHL LAST", "AND 3", "OR NIL", "XOR ACC", "SHR 1"]);
    assert_eq!(
        state.instructions(),
        &[
            Instruction::JumpRelative(Operand::Immediate(-2)),
            Instruction::JumpRelative(Operand::Target(Target::Any)),
            Instruction::Arithmetic(Arithmetic::Shl, Operand::Target(Target::Last)),
            Instruction::Arithmetic(Arithmetic::And, Operand::Immediate(3)),
            Instruction::Arithmetic(Arithmetic::Or, Operand::Target(Target::Nil)),
            Instruction::Arithmetic(Arithmetic::Xor, Operand::Target(Target::Acc)),
            Instruction::Arithmetic(Arithmetic::Shr, Operand::Immediate(1)),
        ]
    );
}

#[test]
fn recompile_discards_previous_program() {
    let mut state = State::new();
    compile(["L: ADD 1", "JMP L"], &LIMITS, &mut state).unwrap();
    state.set_acc(5);
    let err = compile(["SUB 1", "BOGUS"], &LIMITS, &mut state).unwrap_err();
    assert_eq!(err.line, 2);
    assert!(state.is_empty());
    assert!(state.labels().is_empty());
    assert!(state.line_numbers().is_empty());
    assert_eq!(state.acc(), 0);
    assert_eq!(state.code().len(), 2);
}

#[test]
fn validator_failure_is_inspectable() {
    let mut state = State::new();
    compile(["THERE: NOP"], &LIMITS, &mut state).unwrap();
    let mut label = heapless::String::new();
    label.push_str("ELSEWHERE").unwrap();
    let validator: Validator<24> = Validator::JumpTarget {
        label,
        at: 0,
        line_index: 4,
        start_column: 4,
        end_column: 13,
    };
    let err = validator.apply(&mut state).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UndefinedLabel);
    assert_eq!(err.line, 5);
}

#[test]
fn column_limit_is_capped_by_capacity() {
    let limits = Limits {
        max_lines: 4,
        max_columns: 40,
    };
    let mut state: MachineState<4, 5> = MachineState::new();
    let err = compile(["ADD 50"], &limits, &mut state).unwrap_err();
    assert_eq!(
        err,
        ParseError {
            kind: ErrorKind::LineTooLong,
            line: 1,
            start_column: 5,
            end_column: 5,
        }
    );
    assert!(state.is_empty());

    // Seven characters, but more bytes than the line can hold once stored.
    let mut state: MachineState<4, 8> = MachineState::new();
    let err = compile(["ADD ÖÖÖ"], &limits, &mut state).unwrap_err();
    assert_eq!(err.kind, ErrorKind::LineTooLong);
    assert!(state.is_empty());
}

#[test]
fn non_ascii_text_is_upper_cased() {
    let state = compiled(&["schön: jmp schön"]);
    assert_eq!(state.code().first().map(|line| line.as_str()), Some("SCHÖN: JMP SCHÖN"));
    assert_eq!(state.label("SCHÖN"), Some(0));
    assert_eq!(
        state.instructions(),
        &[Instruction::Jump(Condition::Always, 0)]
    );
}

#[test]
fn parse_error_survives_serialization() {
    let (err, _) = compile_err(&["MOV ACC, 5"]);
    let mut buffer = [0u8; 32];
    let bytes = postcard::to_slice(&err, &mut buffer).unwrap();
    let decoded: ParseError = postcard::from_bytes(bytes).unwrap();
    assert_eq!(decoded, err);
    assert_eq!(
        decoded.kind,
        ErrorKind::InvalidOperand(OperandIssue::NotWritable)
    );
}
