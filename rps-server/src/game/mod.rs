//! Game Logic Module
//!
//! Rock-paper-scissors rules. Pure functions, no I/O.

pub mod rules;

pub use rules::{resolve, resolve_pair, InvalidMove, Move, Outcome};
