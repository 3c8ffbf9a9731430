#![no_main]

use risc0_zkvm::guest::env;
use zkcalc_guest::{inputs::SqrtInput, programs, Journal};

risc0_zkvm::guest::entry!(main);

fn main() {
    let raw: String = env::read();
    let input: SqrtInput = serde_json::from_str(&raw).expect("malformed sqrt input");
    let journal = programs::sqrt(&input).expect("sqrt of a negative number");
    env::commit_slice(&journal.to_bytes());
}
