#![no_main]

use risc0_zkvm::guest::env;
use zkcalc_guest::{inputs::RangeInput, programs, Journal};

risc0_zkvm::guest::entry!(main);

fn main() {
    let raw: String = env::read();
    let input: RangeInput = serde_json::from_str(&raw).expect("malformed range input");
    // only the bounds and the flag leave the guest
    let journal = programs::range(&input);
    env::commit_slice(&journal.to_bytes());
}
