#![no_main]

use risc0_zkvm::guest::env;
use zkcalc_guest::{inputs::BinaryInput, programs, Journal};

risc0_zkvm::guest::entry!(main);

fn main() {
    let raw: String = env::read();
    let input: BinaryInput = serde_json::from_str(&raw).expect("malformed multiply input");
    let journal = programs::multiply(&input).expect("multiply overflowed");
    env::commit_slice(&journal.to_bytes());
}
