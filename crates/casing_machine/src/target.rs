use serde::{Deserialize, Serialize};

use crate::{clamp, Word};

/// A concrete face of a node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Port {
    Left,
    Right,
    Up,
    Down,
}

impl Port {
    /// Order in which `ANY` polls ports when reading.
    pub const ALL: [Port; 4] = [Port::Left, Port::Right, Port::Up, Port::Down];

    pub fn opposite(self) -> Port {
        match self {
            Port::Left => Port::Right,
            Port::Right => Port::Left,
            Port::Up => Port::Down,
            Port::Down => Port::Up,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Port::Left => 0,
            Port::Right => 1,
            Port::Up => 2,
            Port::Down => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Port::Left => "LEFT",
            Port::Right => "RIGHT",
            Port::Up => "UP",
            Port::Down => "DOWN",
        }
    }
}

/// Something an instruction can read from or write to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Acc,
    Nil,
    Port(Port),
    Any,
    Last,
}

impl Target {
    /// Ports are matched before registers.
    pub fn parse(token: &str) -> Option<Target> {
        let target = match token {
            "UP" => Target::Port(Port::Up),
            "DOWN" => Target::Port(Port::Down),
            "LEFT" => Target::Port(Port::Left),
            "RIGHT" => Target::Port(Port::Right),
            "ANY" => Target::Any,
            "LAST" => Target::Last,
            "ACC" => Target::Acc,
            "NIL" => Target::Nil,
            _ => return None,
        };
        Some(target)
    }

    /// True when accessing this target may suspend the node.
    pub fn is_port(self) -> bool {
        matches!(self, Target::Port(_) | Target::Any | Target::Last)
    }
}

/// Source operand: a target or an immediate literal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Target(Target),
    Immediate(Word),
}

impl Operand {
    pub fn parse(token: &str) -> Option<Operand> {
        if let Some(target) = Target::parse(token) {
            return Some(Operand::Target(target));
        }
        parse_immediate(token).map(Operand::Immediate)
    }
}

/// Signed decimal literal, saturated into the register range.
pub fn parse_immediate(token: &str) -> Option<Word> {
    token.parse::<i32>().ok().map(clamp)
}
