use heapless::{String, Vec};

use crate::instruction::Instruction;
use crate::target::Port;
use crate::Word;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Label<const COLUMNS: usize> {
    pub name: String<COLUMNS>,
    pub index: usize,
}

/// Compiled program and live registers of one node.
///
/// Only `compile` populates the program half. `instructions`,
/// `line_numbers` and `labels` are always consistent with each other: either
/// all empty or all describing the same successfully compiled source.
#[derive(Clone, Debug)]
pub struct MachineState<const LINES: usize, const COLUMNS: usize> {
    pub(crate) instructions: Vec<Instruction, LINES>,
    pub(crate) labels: Vec<Label<COLUMNS>, LINES>,
    /// Source line (0-based) of each instruction, by instruction index.
    pub(crate) line_numbers: Vec<usize, LINES>,
    /// Normalized source text, kept even when compiling fails.
    pub(crate) code: Vec<String<COLUMNS>, LINES>,
    pub(crate) acc: Word,
    pub(crate) bak: Word,
    pub(crate) pc: usize,
    pub(crate) last: Option<Port>,
}

impl<const LINES: usize, const COLUMNS: usize> MachineState<LINES, COLUMNS> {
    pub fn new() -> Self {
        Self {
            instructions: Vec::new(),
            labels: Vec::new(),
            line_numbers: Vec::new(),
            code: Vec::new(),
            acc: 0,
            bak: 0,
            pc: 0,
            last: None,
        }
    }

    /// Hard reset: program, source text and registers.
    pub fn clear(&mut self) {
        self.clear_program();
        self.code.clear();
    }

    /// Drop the program and registers but keep the source text.
    pub fn clear_program(&mut self) {
        self.instructions.clear();
        self.labels.clear();
        self.line_numbers.clear();
        self.reset_registers();
    }

    pub fn reset_registers(&mut self) {
        self.acc = 0;
        self.bak = 0;
        self.pc = 0;
        self.last = None;
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn labels(&self) -> &[Label<COLUMNS>] {
        &self.labels
    }

    pub fn label(&self, name: &str) -> Option<usize> {
        self.labels
            .iter()
            .find(|label| label.name.as_str() == name)
            .map(|label| label.index)
    }

    /// Source line of the instruction at `index`.
    pub fn line_number(&self, index: usize) -> Option<usize> {
        self.line_numbers.get(index).copied()
    }

    pub fn line_numbers(&self) -> &[usize] {
        &self.line_numbers
    }

    pub fn code(&self) -> &[String<COLUMNS>] {
        &self.code
    }

    /// Source line of the instruction about to execute.
    pub fn current_line(&self) -> Option<usize> {
        self.line_number(self.pc)
    }

    pub fn current_instruction(&self) -> Option<Instruction> {
        self.instructions.get(self.pc).copied()
    }

    pub fn acc(&self) -> Word {
        self.acc
    }

    pub fn bak(&self) -> Word {
        self.bak
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn last(&self) -> Option<Port> {
        self.last
    }

    pub fn set_acc(&mut self, value: Word) {
        self.acc = value.clamp(crate::WORD_MIN, crate::WORD_MAX);
    }

    pub fn set_bak(&mut self, value: Word) {
        self.bak = value.clamp(crate::WORD_MIN, crate::WORD_MAX);
    }

    pub(crate) fn advance(&mut self) {
        let len = self.instructions.len();
        self.pc = self
            .pc
            .checked_add(1)
            .filter(|next| *next < len)
            .unwrap_or(0);
    }

    pub(crate) fn jump(&mut self, index: usize) {
        self.pc = if index < self.instructions.len() { index } else { 0 };
    }

    /// Move `pc` by `offset`, wrapping modulo the program length.
    pub(crate) fn jump_relative(&mut self, offset: Word) {
        let Ok(len) = i64::try_from(self.instructions.len()) else {
            self.pc = 0;
            return;
        };
        let Ok(pc) = i64::try_from(self.pc) else {
            self.pc = 0;
            return;
        };
        let target = pc
            .saturating_add(i64::from(offset))
            .checked_rem_euclid(len)
            .unwrap_or(0);
        self.pc = usize::try_from(target).unwrap_or(0);
    }
}

impl<const LINES: usize, const COLUMNS: usize> Default for MachineState<LINES, COLUMNS> {
    fn default() -> Self {
        Self::new()
    }
}
