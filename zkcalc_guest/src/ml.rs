//! Integer-only inference for the machine-learning guests.
//!
//! Features and outputs are fixed-point at [`SCALE`]; model weights and biases
//! are fixed-point at [`WEIGHT_SCALE`] so that small coefficients such as
//! `0.00001` stay exact. The sigmoid is evaluated at 10^12 precision and
//! rounded back to [`SCALE`].

use crate::{
    inputs::{LogisticRegressionInput, NeuralNetworkInput},
    programs::ScalarJournal,
    ProgramError, SCALE,
};
use alloc::{vec, vec::Vec};

pub const WEIGHT_SCALE: i64 = 1_000_000;

const ONE: i128 = 1_000_000_000_000;
const LN_2: i128 = 693_147_180_560;
const TAYLOR_TERMS: i128 = 24;

/// `e^-x` for `x >= 0`, both at [`ONE`] precision.
fn exp_neg(x: i128) -> i128 {
    debug_assert!(x >= 0);
    let k = x / LN_2;
    if k >= 100 {
        return 0;
    }
    // e^-x = e^-r / 2^k with 0 <= r < ln 2
    let r = x - k * LN_2;
    let mut sum = ONE;
    let mut term = ONE;
    for i in 1..=TAYLOR_TERMS {
        term = term * r / ONE / i;
        if term == 0 {
            break;
        }
        if i % 2 == 1 {
            sum -= term;
        } else {
            sum += term;
        }
    }
    sum >> k
}

/// Logistic function of a [`SCALE`]-fixed input, returned at [`SCALE`].
pub fn sigmoid(z: i128) -> i64 {
    let z = z.saturating_mul(ONE / SCALE as i128);
    let s = if z >= 0 {
        ONE * ONE / (ONE + exp_neg(z))
    } else {
        let e = exp_neg(z.saturating_neg());
        ONE * e / (ONE + e)
    };
    ((s * SCALE as i128 + ONE / 2) / ONE) as i64
}

/// `bias + sum(w_i * x_i)` at [`SCALE`]. Extra features beyond the weights
/// are ignored.
fn linear(weights: &[i64], bias: i64, features: &[i64]) -> i128 {
    let acc = weights
        .iter()
        .zip(features)
        .fold(bias as i128 * SCALE as i128, |acc, (w, x)| {
            acc + *w as i128 * *x as i128
        });
    acc / WEIGHT_SCALE as i128
}

fn neural_network_weights(n: usize) -> Vec<i64> {
    match n {
        1 => vec![500_000],
        2 => vec![700_000, -300_000],
        3 => vec![600_000, -400_000, 800_000],
        _ => vec![500_000; n],
    }
}

const NEURAL_NETWORK_BIAS: i64 = 200_000;

/// Single-layer perceptron with a sigmoid activation.
pub fn neural_network(input: &NeuralNetworkInput) -> Result<ScalarJournal, ProgramError> {
    if input.inputs.is_empty() {
        return Err(ProgramError::EmptyInput);
    }
    let weights = neural_network_weights(input.inputs.len());
    let z = linear(&weights, NEURAL_NETWORK_BIAS, &input.inputs);
    Ok(ScalarJournal { value: sigmoid(z) })
}

/// Pre-trained coefficients and bias for a named task.
pub fn logistic_model(task: &str, n_features: usize) -> (Vec<i64>, i64) {
    match task {
        // age, income, credit score
        "loan_approval" => (vec![10_000, 10, 5_000], -2_500_000),
        // word count, spam words, sender reputation
        "spam_detection" => (vec![-5_000, 800_000, -2_000_000], 500_000),
        // tenure, usage, complaints
        "customer_churn" => (vec![-100_000, -20_000, 500_000], 1_000_000),
        _ => (vec![100_000; n_features], 0),
    }
}

/// Probability of the positive class at [`SCALE`].
pub fn logistic_regression(
    input: &LogisticRegressionInput,
) -> Result<ScalarJournal, ProgramError> {
    if input.features.len() < 2 {
        return Err(ProgramError::TooFewFeatures {
            needed: 2,
            got: input.features.len(),
        });
    }
    if input.task.is_empty() {
        return Err(ProgramError::EmptyInput);
    }
    let (weights, bias) = logistic_model(&input.task, input.features.len());
    let z = linear(&weights, bias, &input.features);
    Ok(ScalarJournal { value: sigmoid(z) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    fn close(actual: i64, expected: i64) {
        assert!(
            (actual - expected).abs() <= 1,
            "expected {expected} (+-1), got {actual}"
        );
    }

    #[test]
    fn test_sigmoid_known_values() {
        assert_eq!(sigmoid(0), 5_000);
        close(sigmoid(10_000), 7_311);
        close(sigmoid(-10_000), 2_689);
        close(sigmoid(50_000), 9_933);
        assert_eq!(sigmoid(1_000_000), SCALE);
        assert_eq!(sigmoid(-1_000_000), 0);
        assert_eq!(sigmoid(i128::MAX / 2), SCALE);
    }

    #[test]
    fn test_sigmoid_is_monotonic() {
        let mut last = 0;
        for z in (-100_000..100_000).step_by(997) {
            let s = sigmoid(z);
            assert!(s >= last);
            last = s;
        }
    }

    #[test]
    fn test_neural_network() {
        let out = neural_network(&NeuralNetworkInput {
            inputs: vec![5_000, 3_000, 8_000],
        })
        .unwrap();
        // sigmoid(0.2 + 0.3 - 0.12 + 0.64)
        close(out.value, 7_350);
        assert_eq!(
            neural_network(&NeuralNetworkInput { inputs: vec![] }),
            Err(ProgramError::EmptyInput)
        );
    }

    #[test]
    fn test_loan_approval_ordering() {
        let good = logistic_regression(&LogisticRegressionInput {
            features: vec![350_000, 500_000_000, 7_200_000],
            task: "loan_approval".to_string(),
        })
        .unwrap();
        let risky = logistic_regression(&LogisticRegressionInput {
            features: vec![180_000, 150_000_000, 5_000_000],
            task: "loan_approval".to_string(),
        })
        .unwrap();
        // sigmoid(0.35 + 0.5 + 3.6 - 2.5)
        close(good.value, 8_755);
        assert!(risky.value < good.value);
    }

    #[test]
    fn test_logistic_rejects_short_input() {
        let err = logistic_regression(&LogisticRegressionInput {
            features: vec![1],
            task: "loan_approval".to_string(),
        });
        assert_eq!(err, Err(ProgramError::TooFewFeatures { needed: 2, got: 1 }));
    }
}
