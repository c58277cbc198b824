use variant_count::VariantCount;

use crate::target::{Operand, Target};
use crate::{clamp, Word};

/// Every mnemonic the compiler accepts.
#[derive(VariantCount, Copy, Clone, Debug, PartialEq, Eq)]
pub enum Opcode {
    Nop,
    Jmp,
    Jez,
    Jgz,
    Jlz,
    Jnz,
    Jro,
    Mov,
    Sav,
    Swp,
    Neg,
    Add,
    Sub,
    Not,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

/// Binary operations that fold an operand into `ACC`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Arithmetic {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

impl Arithmetic {
    pub fn apply(self, acc: Word, operand: Word) -> Word {
        let acc = i32::from(acc);
        let operand = i32::from(operand);
        let result = match self {
            Arithmetic::Add => acc.saturating_add(operand),
            Arithmetic::Sub => acc.saturating_sub(operand),
            Arithmetic::And => acc & operand,
            Arithmetic::Or => acc | operand,
            Arithmetic::Xor => acc ^ operand,
            Arithmetic::Shl => acc.wrapping_shl(shift_amount(operand)),
            Arithmetic::Shr => acc.wrapping_shr(shift_amount(operand)),
        };
        clamp(result)
    }
}

// Shifting a register-range value by at most 15 can not leave i32.
fn shift_amount(operand: i32) -> u32 {
    u32::try_from(operand.clamp(0, 15)).unwrap_or(0)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    Always,
    Zero,
    GreaterThanZero,
    LessThanZero,
    NotZero,
}

impl Condition {
    pub fn holds(self, acc: Word) -> bool {
        match self {
            Condition::Always => true,
            Condition::Zero => acc == 0,
            Condition::GreaterThanZero => acc > 0,
            Condition::LessThanZero => acc < 0,
            Condition::NotZero => acc != 0,
        }
    }
}

/// A compiled instruction. Pure data; `Machine` gives it meaning.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    Arithmetic(Arithmetic, Operand),
    Not,
    Neg,
    Sav,
    Swp,
    Mov(Operand, Target),
    /// Jump to an instruction index resolved from a label.
    Jump(Condition, usize),
    JumpRelative(Operand),
}

/// `NOP` has no instruction of its own.
pub const NOP: Instruction = Instruction::Arithmetic(Arithmetic::Add, Operand::Target(Target::Nil));

/// How a mnemonic consumes its operands and what it builds from them.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Shape {
    /// No operands.
    Unary(Instruction),
    /// One label operand.
    Jump(Condition),
    /// One target-or-immediate operand.
    JumpRelative,
    /// One target-or-immediate operand.
    Arithmetic(Arithmetic),
    /// A target-or-immediate source and a target destination.
    Move,
}

#[derive(Copy, Clone, Debug)]
pub struct OpcodeInfo {
    pub name: &'static str,
    pub opcode: Opcode,
    pub shape: Shape,
}

const fn entry(name: &'static str, opcode: Opcode, shape: Shape) -> OpcodeInfo {
    OpcodeInfo {
        name,
        opcode,
        shape,
    }
}

pub const OPCODES: [OpcodeInfo; Opcode::VARIANT_COUNT] = [
    entry("NOP", Opcode::Nop, Shape::Unary(NOP)),
    entry("JMP", Opcode::Jmp, Shape::Jump(Condition::Always)),
    entry("JEZ", Opcode::Jez, Shape::Jump(Condition::Zero)),
    entry("JGZ", Opcode::Jgz, Shape::Jump(Condition::GreaterThanZero)),
    entry("JLZ", Opcode::Jlz, Shape::Jump(Condition::LessThanZero)),
    entry("JNZ", Opcode::Jnz, Shape::Jump(Condition::NotZero)),
    entry("JRO", Opcode::Jro, Shape::JumpRelative),
    entry("MOV", Opcode::Mov, Shape::Move),
    entry("SAV", Opcode::Sav, Shape::Unary(Instruction::Sav)),
    entry("SWP", Opcode::Swp, Shape::Unary(Instruction::Swp)),
    entry("NEG", Opcode::Neg, Shape::Unary(Instruction::Neg)),
    entry("ADD", Opcode::Add, Shape::Arithmetic(Arithmetic::Add)),
    entry("SUB", Opcode::Sub, Shape::Arithmetic(Arithmetic::Sub)),
    entry("NOT", Opcode::Not, Shape::Unary(Instruction::Not)),
    entry("AND", Opcode::And, Shape::Arithmetic(Arithmetic::And)),
    entry("OR", Opcode::Or, Shape::Arithmetic(Arithmetic::Or)),
    entry("XOR", Opcode::Xor, Shape::Arithmetic(Arithmetic::Xor)),
    entry("SHL", Opcode::Shl, Shape::Arithmetic(Arithmetic::Shl)),
    entry("SHR", Opcode::Shr, Shape::Arithmetic(Arithmetic::Shr)),
];

pub fn lookup(name: &str) -> Option<&'static OpcodeInfo> {
    OPCODES.iter().find(|info| info.name == name)
}
