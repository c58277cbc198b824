use serde::{Deserialize, Serialize};

use crate::compiler::{self, Limits, ParseError};
use crate::instruction::Instruction;
use crate::state::MachineState;
use crate::target::{Operand, Port, Target};
use crate::{clamp, Word};

/// The node's view of its ports. Implemented by the grid that owns the pipes.
pub trait PortBus {
    /// Offer `value` on `port`. False if the port is unlinked or still busy.
    fn offer(&mut self, port: Port, value: Word) -> bool;

    /// Offer `value` on every linked port as a single write: the first claim
    /// withdraws the other copies. Re-offering while one copy is claimed is a
    /// no-op.
    fn offer_any(&mut self, value: Word) -> bool;

    fn try_claim(&mut self, port: Port) -> Option<Word>;

    /// The port whose offer has been claimed and committed, if any. Consumes
    /// the delivery and withdraws the node's remaining offers.
    fn poll_delivered(&mut self) -> Option<Port>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// No program, or not started yet.
    Idle,
    Running,
    WaitingRead,
    WaitingWrite,
}

/// Snapshot for an editor overlay.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugView {
    /// Source line (0-based) of the instruction at `pc`.
    pub current_line: Option<usize>,
    pub pc: usize,
    pub status: Status,
    pub acc: Word,
    pub bak: Word,
    pub last: Option<Port>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct PendingWrite {
    value: Word,
    target: Target,
}

/// Execution engine of one node: at most one instruction per `step`.
///
/// A port read that finds nothing leaves the node in `WaitingRead` at the same
/// instruction; it is simply retried next step. A port write parks the value
/// in `WaitingWrite` until the bus reports the offer as delivered.
#[derive(Clone, Debug)]
pub struct Machine<const LINES: usize, const COLUMNS: usize> {
    state: MachineState<LINES, COLUMNS>,
    status: Status,
    pending: Option<PendingWrite>,
    enabled: bool,
}

impl<const LINES: usize, const COLUMNS: usize> Machine<LINES, COLUMNS> {
    pub fn new() -> Self {
        Self {
            state: MachineState::new(),
            status: Status::Idle,
            pending: None,
            enabled: false,
        }
    }

    /// Replace the program. Registers are reset whether or not it compiles.
    pub fn compile<'s, I>(&mut self, source: I, limits: &Limits) -> Result<(), ParseError>
    where
        I: IntoIterator<Item = &'s str>,
    {
        self.pending = None;
        self.status = Status::Idle;
        let result = compiler::compile(source, limits, &mut self.state);
        self.wake();
        result
    }

    /// Back to the first instruction with cleared registers; the program
    /// stays.
    pub fn reset(&mut self) {
        self.state.reset_registers();
        self.pending = None;
        self.status = Status::Idle;
        self.wake();
    }

    /// A disabled node keeps its state but does nothing on `step`.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.wake();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn state(&self) -> &MachineState<LINES, COLUMNS> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut MachineState<LINES, COLUMNS> {
        &mut self.state
    }

    pub fn debug_view(&self) -> DebugView {
        DebugView {
            current_line: self.state.current_line(),
            pc: self.state.pc,
            status: self.status,
            acc: self.state.acc,
            bak: self.state.bak,
            last: self.state.last,
        }
    }

    pub fn step<B: PortBus>(&mut self, bus: &mut B) {
        if !self.enabled {
            return;
        }
        match self.status {
            Status::Idle => {}
            Status::WaitingWrite => self.complete_write(bus),
            Status::Running | Status::WaitingRead => self.execute(bus),
        }
    }

    fn wake(&mut self) {
        if self.enabled && self.status == Status::Idle && !self.state.is_empty() {
            self.status = Status::Running;
        }
    }

    fn execute<B: PortBus>(&mut self, bus: &mut B) {
        let Some(instruction) = self.state.current_instruction() else {
            self.status = Status::Idle;
            return;
        };

        match instruction {
            Instruction::Arithmetic(arithmetic, operand) => {
                let Some(value) = self.read(operand, bus) else {
                    self.status = Status::WaitingRead;
                    return;
                };
                self.state.acc = arithmetic.apply(self.state.acc, value);
                self.finish();
            }
            Instruction::Not => {
                self.state.acc = clamp(!i32::from(self.state.acc));
                self.finish();
            }
            Instruction::Neg => {
                self.state.acc = clamp(i32::from(self.state.acc).saturating_neg());
                self.finish();
            }
            Instruction::Sav => {
                self.state.bak = self.state.acc;
                self.finish();
            }
            Instruction::Swp => {
                core::mem::swap(&mut self.state.acc, &mut self.state.bak);
                self.finish();
            }
            Instruction::Mov(source, destination) => {
                let Some(value) = self.read(source, bus) else {
                    self.status = Status::WaitingRead;
                    return;
                };
                self.write(value, destination, bus);
            }
            Instruction::Jump(condition, target) => {
                if condition.holds(self.state.acc) {
                    self.state.jump(target);
                } else {
                    self.state.advance();
                }
                self.status = Status::Running;
            }
            Instruction::JumpRelative(operand) => {
                let Some(offset) = self.read(operand, bus) else {
                    self.status = Status::WaitingRead;
                    return;
                };
                self.state.jump_relative(offset);
                self.status = Status::Running;
            }
        }
    }

    fn finish(&mut self) {
        self.state.advance();
        self.status = Status::Running;
    }

    fn read<B: PortBus>(&mut self, operand: Operand, bus: &mut B) -> Option<Word> {
        let target = match operand {
            Operand::Immediate(value) => return Some(value),
            Operand::Target(target) => target,
        };
        match target {
            Target::Acc => Some(self.state.acc),
            Target::Nil => Some(0),
            Target::Port(port) => bus.try_claim(port),
            Target::Any => {
                let (port, value) = Port::ALL
                    .iter()
                    .find_map(|port| bus.try_claim(*port).map(|value| (*port, value)))?;
                self.state.last = Some(port);
                Some(value)
            }
            // Without a prior ANY, LAST reads like NIL.
            Target::Last => match self.state.last {
                Some(port) => bus.try_claim(port),
                None => Some(0),
            },
        }
    }

    fn write<B: PortBus>(&mut self, value: Word, destination: Target, bus: &mut B) {
        match destination {
            Target::Acc => {
                self.state.acc = value;
                self.finish();
            }
            Target::Nil => self.finish(),
            Target::Last if self.state.last.is_none() => self.finish(),
            Target::Port(_) | Target::Any | Target::Last => {
                let pending = PendingWrite {
                    value,
                    target: destination,
                };
                self.pending = Some(pending);
                self.status = Status::WaitingWrite;
                self.offer(pending, bus);
            }
        }
    }

    fn complete_write<B: PortBus>(&mut self, bus: &mut B) {
        let Some(pending) = self.pending else {
            self.status = Status::Running;
            return;
        };
        if let Some(port) = bus.poll_delivered() {
            if pending.target == Target::Any {
                self.state.last = Some(port);
            }
            self.pending = None;
            self.finish();
            return;
        }
        // Offers are idempotent; this restores one lost to a relink.
        self.offer(pending, bus);
    }

    fn offer<B: PortBus>(&self, pending: PendingWrite, bus: &mut B) {
        match pending.target {
            Target::Port(port) => {
                bus.offer(port, pending.value);
            }
            Target::Any => {
                bus.offer_any(pending.value);
            }
            Target::Last => {
                if let Some(port) = self.state.last {
                    bus.offer(port, pending.value);
                }
            }
            Target::Acc | Target::Nil => {}
        }
    }
}

impl<const LINES: usize, const COLUMNS: usize> Default for Machine<LINES, COLUMNS> {
    fn default() -> Self {
        Self::new()
    }
}
