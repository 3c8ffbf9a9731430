#![no_main]

use risc0_zkvm::guest::env;
use zkcalc_guest::{inputs::NeuralNetworkInput, ml, Journal};

risc0_zkvm::guest::entry!(main);

fn main() {
    let raw: String = env::read();
    let input: NeuralNetworkInput = serde_json::from_str(&raw).expect("malformed neural_network input");
    let journal = ml::neural_network(&input).expect("bad network input");
    env::commit_slice(&journal.to_bytes());
}
