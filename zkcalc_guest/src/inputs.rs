//! Guest inputs. Each guest reads one of these as a JSON string.
//!
//! Decimal quantities are already fixed-point scaled by [`crate::SCALE`].

use alloc::{string::String, vec::Vec};
use serde::{Deserialize, Serialize};

/// Inputs of `add` and `multiply`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryInput {
    pub a: i64,
    pub b: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqrtInput {
    pub n: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModexpInput {
    pub base: u64,
    pub exponent: u64,
    pub modulus: u64,
}

/// `secret` is private to the prover; only the bounds and the outcome are
/// committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeInput {
    pub secret: u64,
    pub min: u64,
    pub max: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedAddInput {
    pub a: i64,
    pub b: i64,
    pub timestamp: u64,
    pub task_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeuralNetworkInput {
    pub inputs: Vec<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogisticRegressionInput {
    pub features: Vec<i64>,
    pub task: String,
}
