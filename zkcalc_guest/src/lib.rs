#![cfg_attr(not(test), no_std)]

//! Code shared between the zkcalc host and the guest programs.
//!
//! Guests read one JSON-encoded input struct from [`inputs`], run the matching
//! reference program from [`programs`] or [`ml`], and commit the journal bytes
//! produced by [`journal`]. The host links the same code to re-derive expected
//! results and to decode journals.

extern crate alloc;

pub mod inputs;
pub mod journal;
pub mod ml;
pub mod programs;

pub use journal::{Journal, JournalError, JournalReader, JournalWriter, WORD_SIZE};

/// Fixed-point scale factor: four decimal digits.
pub const SCALE: i64 = 10_000;

/// Reasons a reference program refuses to produce a journal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramError {
    Overflow,
    NegativeInput,
    EmptyInput,
    TooFewFeatures { needed: usize, got: usize },
}

impl core::fmt::Display for ProgramError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProgramError::Overflow => write!(f, "arithmetic overflow"),
            ProgramError::NegativeInput => write!(f, "input must be non-negative"),
            ProgramError::EmptyInput => write!(f, "input must not be empty"),
            ProgramError::TooFewFeatures { needed, got } => {
                write!(f, "expected at least {needed} features, got {got}")
            }
        }
    }
}
