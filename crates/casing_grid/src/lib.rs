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

//! Host side of the casing computer. A `Controller` owns a set of modules
//! (execution nodes and forwarders), the pipes that link their ports, and
//! advances all of them in lock step.

pub mod arena;
pub mod bus;
pub mod config;
pub mod controller;
pub mod forwarder;

pub use arena::ModuleId;
pub use config::{ConfigError, Settings};
pub use controller::{Controller, ControllerState, GridError};

use casing_machine::Machine;

/// Most source lines a node can hold, whatever the settings say.
pub const LINES_CAPACITY: usize = 64;
/// Longest source line a node can hold, whatever the settings say.
pub const COLUMNS_CAPACITY: usize = 64;

pub type Node = Machine<LINES_CAPACITY, COLUMNS_CAPACITY>;
