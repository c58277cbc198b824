#![no_std]

#![cfg_attr(
    not(test),
    deny(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing,
        clippy::string_slice,
        clippy::arithmetic_side_effects,
        clippy::panicking_unwrap,
        clippy::out_of_bounds_indexing,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
    )
)]
#![cfg_attr(not(test), warn(clippy::missing_panics_doc))]

//! Core of the casing computer: a compiler that turns per node assembly
//! source into a `MachineState`, and the per node execution engine that
//! advances that state one instruction per tick.
//!
//! Nodes talk to each other through capacity-1 `Pipe`s. The engine never
//! touches a pipe directly, it goes through a `PortBus` supplied by whoever
//! owns the grid so that visibility of a write can be deferred to the next
//! tick.
//!
//! All storage is fixed capacity. `LINES` bounds the number of source lines
//! (and therefore instructions and labels), `COLUMNS` bounds the length of a
//! single line. The configured `Limits` handed to the compiler must not exceed
//! them.

pub mod compiler;
pub mod execution;
pub mod instruction;
pub mod lexer;
pub mod pipe;
pub mod state;
pub mod target;

pub use compiler::{compile, ErrorKind, Limits, OperandIssue, ParseError};
pub use execution::{DebugView, Machine, PortBus, Status};
pub use instruction::{Arithmetic, Condition, Instruction, Opcode};
pub use pipe::Pipe;
pub use state::MachineState;
pub use target::{Operand, Port, Target};

/// Register and transfer value type.
pub type Word = i16;

pub const WORD_MIN: Word = -999;
pub const WORD_MAX: Word = 999;

/// Saturate an intermediate result into the register range.
pub fn clamp(value: i32) -> Word {
    // The clamp makes the narrowing cast lossless.
    value.clamp(i32::from(WORD_MIN), i32::from(WORD_MAX)) as Word
}

#[cfg(test)]
mod compiler_test;
