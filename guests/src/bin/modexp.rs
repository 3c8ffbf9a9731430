#![no_main]

use risc0_zkvm::guest::env;
use zkcalc_guest::{inputs::ModexpInput, programs, Journal};

risc0_zkvm::guest::entry!(main);

fn main() {
    let raw: String = env::read();
    let input: ModexpInput = serde_json::from_str(&raw).expect("malformed modexp input");
    let journal = programs::modexp(&input);
    env::commit_slice(&journal.to_bytes());
}
