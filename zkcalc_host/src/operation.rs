//! The closed set of operations a caller can request, with their host-side
//! validation, guest input encoding and journal decoding.

use crate::{
    error::{Error, Result},
    fixed_point::{from_fixed_point, to_fixed_point, to_fixed_point_vec},
    utils::{random_hex, unix_timestamp},
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{fmt, path::PathBuf};
use zkcalc_guest::{
    inputs::{
        AuthenticatedAddInput, BinaryInput, LogisticRegressionInput, ModexpInput,
        NeuralNetworkInput, RangeInput, SqrtInput,
    },
    ml,
    programs::{
        self, AuthenticatedAddJournal, BinaryJournal, ModexpJournal, RangeJournal, ScalarJournal,
    },
    Journal, JournalError,
};

#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::AsRefStr,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
    strum_macros::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationKind {
    Add,
    Multiply,
    Sqrt,
    Modexp,
    Range,
    AuthenticatedAdd,
    NeuralNetwork,
    LogisticRegression,
    Dynamic,
    Precompiled,
}

impl OperationKind {
    /// Built-in operations run a guest shipped in the `guests` package whose
    /// binary carries the operation's name.
    pub fn is_builtin(&self) -> bool {
        !matches!(self, OperationKind::Dynamic | OperationKind::Precompiled)
    }

    pub fn builtins() -> impl Iterator<Item = OperationKind> {
        <OperationKind as strum::IntoEnumIterator>::iter().filter(OperationKind::is_builtin)
    }

    /// Decodes a journal committed by this operation's guest.
    pub fn decode_journal(&self, bytes: &[u8]) -> Result<DecodedJournal, JournalError> {
        let decoded = match self {
            OperationKind::Add | OperationKind::Multiply => {
                let j = BinaryJournal::from_bytes(bytes)?;
                DecodedJournal {
                    result: ResultValue::Decimal(from_fixed_point(j.result)),
                    details: json!({
                        "a": from_fixed_point(j.a),
                        "b": from_fixed_point(j.b),
                    }),
                }
            }
            OperationKind::Sqrt
            | OperationKind::NeuralNetwork
            | OperationKind::LogisticRegression => {
                let j = ScalarJournal::from_bytes(bytes)?;
                DecodedJournal {
                    result: ResultValue::Decimal(from_fixed_point(j.value)),
                    details: json!({}),
                }
            }
            OperationKind::Modexp => {
                let j = ModexpJournal::from_bytes(bytes)?;
                DecodedJournal {
                    result: ResultValue::Unsigned(j.result),
                    details: json!({
                        "base": j.base,
                        "exponent": j.exponent,
                        "modulus": j.modulus,
                    }),
                }
            }
            OperationKind::Range => {
                let j = RangeJournal::from_bytes(bytes)?;
                DecodedJournal {
                    result: ResultValue::Bool(j.in_range),
                    details: json!({ "min": j.min, "max": j.max }),
                }
            }
            OperationKind::AuthenticatedAdd => {
                let j = AuthenticatedAddJournal::from_bytes(bytes)?;
                DecodedJournal {
                    result: ResultValue::Integer(j.result),
                    details: json!({
                        "a": j.a,
                        "b": j.b,
                        "timestamp": j.timestamp,
                        "taskId": j.task_id,
                    }),
                }
            }
            OperationKind::Dynamic | OperationKind::Precompiled => {
                let j = ScalarJournal::from_bytes(bytes)?;
                DecodedJournal {
                    result: ResultValue::Integer(j.value),
                    details: json!({}),
                }
            }
        };
        Ok(decoded)
    }
}

/// A typed result extracted from a journal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResultValue {
    Bool(bool),
    Integer(i64),
    Unsigned(u64),
    Decimal(f64),
}

impl ResultValue {
    /// Compares against a user-typed value such as `5.6`, `24` or `true`.
    pub fn matches_str(&self, s: &str) -> bool {
        let s = s.trim();
        match self {
            ResultValue::Bool(b) => s.parse::<bool>().is_ok_and(|v| v == *b),
            ResultValue::Integer(i) => s.parse::<i64>().is_ok_and(|v| v == *i),
            ResultValue::Unsigned(u) => s.parse::<u64>().is_ok_and(|v| v == *u),
            ResultValue::Decimal(d) => s
                .parse::<f64>()
                .is_ok_and(|v| (v - d).abs() < 0.5 / zkcalc_guest::SCALE as f64),
        }
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultValue::Bool(v) => write!(f, "{v}"),
            ResultValue::Integer(v) => write!(f, "{v}"),
            ResultValue::Unsigned(v) => write!(f, "{v}"),
            ResultValue::Decimal(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecodedJournal {
    pub result: ResultValue,
    /// The other public values the guest committed.
    pub details: Value,
}

/// Per-request metadata bound into authenticated journals and signatures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMeta {
    pub task_id: String,
    pub timestamp: u64,
}

impl TaskMeta {
    pub fn new() -> Self {
        let timestamp = unix_timestamp();
        Self {
            task_id: format!("task_{timestamp}_{}", random_hex(4)),
            timestamp,
        }
    }
}

impl Default for TaskMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// One requested computation and its typed arguments. Decimals are given as
/// floats and scaled on the way into the guest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    Add {
        a: f64,
        b: f64,
    },
    Multiply {
        a: f64,
        b: f64,
    },
    Sqrt {
        n: f64,
    },
    Modexp {
        base: u64,
        exponent: u64,
        modulus: u64,
    },
    Range {
        secret: u64,
        min: u64,
        max: u64,
    },
    AuthenticatedAdd {
        a: i64,
        b: i64,
    },
    NeuralNetwork {
        inputs: Vec<f64>,
    },
    LogisticRegression {
        features: Vec<f64>,
        task: String,
    },
    Dynamic {
        source: String,
        #[serde(default)]
        inputs: Value,
    },
    Precompiled {
        elf_path: PathBuf,
        #[serde(default)]
        inputs: Value,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Add { .. } => OperationKind::Add,
            Operation::Multiply { .. } => OperationKind::Multiply,
            Operation::Sqrt { .. } => OperationKind::Sqrt,
            Operation::Modexp { .. } => OperationKind::Modexp,
            Operation::Range { .. } => OperationKind::Range,
            Operation::AuthenticatedAdd { .. } => OperationKind::AuthenticatedAdd,
            Operation::NeuralNetwork { .. } => OperationKind::NeuralNetwork,
            Operation::LogisticRegression { .. } => OperationKind::LogisticRegression,
            Operation::Dynamic { .. } => OperationKind::Dynamic,
            Operation::Precompiled { .. } => OperationKind::Precompiled,
        }
    }

    /// Rejects malformed arguments before anything is built or spawned.
    pub fn validate(&self) -> Result<()> {
        match self {
            Operation::Add { a, b } | Operation::Multiply { a, b } => {
                to_fixed_point(*a)?;
                to_fixed_point(*b)?;
            }
            Operation::Sqrt { n } => {
                if *n < 0.0 {
                    return Err(Error::ArgumentOutOfRange(format!(
                        "cannot take the square root of {n}"
                    )));
                }
                to_fixed_point(*n)?;
            }
            Operation::Modexp { .. } | Operation::AuthenticatedAdd { .. } => {}
            Operation::Range { min, max, .. } => {
                if min > max {
                    return Err(Error::InvalidRequest(format!(
                        "range minimum {min} exceeds maximum {max}"
                    )));
                }
            }
            Operation::NeuralNetwork { inputs } => {
                if inputs.is_empty() {
                    return Err(Error::InvalidRequest(
                        "neural network needs at least one input".to_string(),
                    ));
                }
                to_fixed_point_vec(inputs)?;
            }
            Operation::LogisticRegression { features, task } => {
                if features.len() < 2 {
                    return Err(Error::InvalidRequest(format!(
                        "logistic regression needs at least 2 features, got {}",
                        features.len()
                    )));
                }
                if task.trim().is_empty() {
                    return Err(Error::InvalidRequest("task must not be empty".to_string()));
                }
                to_fixed_point_vec(features)?;
            }
            Operation::Dynamic { source, .. } => {
                if source.trim().is_empty() {
                    return Err(Error::InvalidRequest("source must not be empty".to_string()));
                }
            }
            Operation::Precompiled { elf_path, .. } => {
                if elf_path.as_os_str().is_empty() {
                    return Err(Error::InvalidRequest("elf path must not be empty".to_string()));
                }
            }
        }
        Ok(())
    }

    /// The JSON document the guest reads as its only input.
    pub fn guest_input(&self, meta: &TaskMeta) -> Result<String> {
        match self {
            Operation::Add { a, b } | Operation::Multiply { a, b } => to_json(&BinaryInput {
                a: to_fixed_point(*a)?,
                b: to_fixed_point(*b)?,
            }),
            Operation::Sqrt { n } => to_json(&SqrtInput {
                n: to_fixed_point(*n)?,
            }),
            Operation::Modexp {
                base,
                exponent,
                modulus,
            } => to_json(&ModexpInput {
                base: *base,
                exponent: *exponent,
                modulus: *modulus,
            }),
            Operation::Range { secret, min, max } => to_json(&RangeInput {
                secret: *secret,
                min: *min,
                max: *max,
            }),
            Operation::AuthenticatedAdd { a, b } => to_json(&AuthenticatedAddInput {
                a: *a,
                b: *b,
                timestamp: meta.timestamp,
                task_id: meta.task_id.clone(),
            }),
            Operation::NeuralNetwork { inputs } => to_json(&NeuralNetworkInput {
                inputs: to_fixed_point_vec(inputs)?,
            }),
            Operation::LogisticRegression { features, task } => {
                to_json(&LogisticRegressionInput {
                    features: to_fixed_point_vec(features)?,
                    task: task.clone(),
                })
            }
            Operation::Dynamic { inputs, .. } | Operation::Precompiled { inputs, .. } => {
                to_json(inputs)
            }
        }
    }

    /// The inputs as shown to the caller. Private inputs are left out.
    pub fn public_inputs(&self) -> Value {
        match self {
            Operation::Add { a, b } | Operation::Multiply { a, b } => json!({ "a": a, "b": b }),
            Operation::Sqrt { n } => json!({ "n": n }),
            Operation::Modexp {
                base,
                exponent,
                modulus,
            } => json!({ "base": base, "exponent": exponent, "modulus": modulus }),
            Operation::Range { min, max, .. } => json!({ "min": min, "max": max }),
            Operation::AuthenticatedAdd { a, b } => json!({ "a": a, "b": b }),
            Operation::NeuralNetwork { inputs } => json!({ "inputs": inputs }),
            Operation::LogisticRegression { features, task } => {
                json!({ "features": features, "task": task })
            }
            Operation::Dynamic { source, inputs } => json!({
                "sourceHash": crate::synthesizer::source_hash(source),
                "inputs": inputs,
            }),
            Operation::Precompiled { elf_path, inputs } => json!({
                "elfPath": elf_path.display().to_string(),
                "inputs": inputs,
            }),
        }
    }

    /// Re-derives the result natively, independent of the proof. `None` for
    /// operations whose program is not known to the host.
    pub fn expected(&self, meta: &TaskMeta) -> Result<Option<ResultValue>> {
        let kind = self.kind();
        if !kind.is_builtin() {
            return Ok(None);
        }
        let journal = run_builtin(kind, &self.guest_input(meta)?)?;
        let decoded = kind
            .decode_journal(&journal)
            .map_err(|e| Error::ExecutionFailed(format!("reference journal: {e}")))?;
        Ok(Some(decoded.result))
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::InvalidRequest(format!("failed to encode guest input: {e}")))
}

fn from_json<'a, T: Deserialize<'a>>(input: &'a str) -> Result<T> {
    serde_json::from_str(input)
        .map_err(|e| Error::ExecutionFailed(format!("invalid guest input encoding: {e}")))
}

/// Runs a built-in guest program natively on its JSON input and returns the
/// journal it would commit.
pub fn run_builtin(kind: OperationKind, input: &str) -> Result<Vec<u8>> {
    let failed = |e: zkcalc_guest::ProgramError| Error::ExecutionFailed(format!("{kind}: {e}"));
    let journal = match kind {
        OperationKind::Add => programs::add(&from_json(input)?).map_err(failed)?.to_bytes(),
        OperationKind::Multiply => programs::multiply(&from_json(input)?)
            .map_err(failed)?
            .to_bytes(),
        OperationKind::Sqrt => programs::sqrt(&from_json(input)?).map_err(failed)?.to_bytes(),
        OperationKind::Modexp => programs::modexp(&from_json(input)?).to_bytes(),
        OperationKind::Range => programs::range(&from_json(input)?).to_bytes(),
        OperationKind::AuthenticatedAdd => programs::authenticated_add(&from_json(input)?)
            .map_err(failed)?
            .to_bytes(),
        OperationKind::NeuralNetwork => ml::neural_network(&from_json(input)?)
            .map_err(failed)?
            .to_bytes(),
        OperationKind::LogisticRegression => ml::logistic_regression(&from_json(input)?)
            .map_err(failed)?
            .to_bytes(),
        OperationKind::Dynamic | OperationKind::Precompiled => {
            return Err(Error::ExecutionFailed(format!(
                "`{kind}` guests cannot run natively"
            )))
        }
    };
    Ok(journal)
}

/// One call into the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    #[serde(flatten)]
    pub operation: Operation,
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default)]
    pub force_rebuild: bool,
}

impl OperationRequest {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            key_id: None,
            force_rebuild: false,
        }
    }

    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    pub fn with_force_rebuild(mut self, force_rebuild: bool) -> Self {
        self.force_rebuild = force_rebuild;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.operation.validate()?;
        if self.operation.kind() == OperationKind::AuthenticatedAdd && self.key_id.is_none() {
            return Err(Error::InvalidRequest(
                "authenticated_add requires a key id".to_string(),
            ));
        }
        if matches!(&self.key_id, Some(id) if id.trim().is_empty()) {
            return Err(Error::InvalidRequest("key id must not be empty".to_string()));
        }
        Ok(())
    }
}
