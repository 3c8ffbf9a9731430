#![no_main]

use risc0_zkvm::guest::env;
use zkcalc_guest::{inputs::LogisticRegressionInput, ml, Journal};

risc0_zkvm::guest::entry!(main);

fn main() {
    let raw: String = env::read();
    let input: LogisticRegressionInput = serde_json::from_str(&raw).expect("malformed logistic_regression input");
    let journal = ml::logistic_regression(&input).expect("bad feature vector");
    env::commit_slice(&journal.to_bytes());
}
