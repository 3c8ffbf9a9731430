#![no_main]

use risc0_zkvm::guest::env;
use zkcalc_guest::{inputs::AuthenticatedAddInput, programs, Journal};

risc0_zkvm::guest::entry!(main);

fn main() {
    let raw: String = env::read();
    let input: AuthenticatedAddInput = serde_json::from_str(&raw).expect("malformed authenticated_add input");
    let journal = programs::authenticated_add(&input).expect("add overflowed");
    env::commit_slice(&journal.to_bytes());
}
