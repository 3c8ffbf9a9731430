use console::style;
use serde::Serialize;
use std::{backtrace::BacktraceStatus, fmt};

/// Prints a right-aligned, cargo-style status line to stderr.
pub fn print_cargo_message(status: &str, msg: fmt::Arguments) {
    eprintln!("{:>12} {msg}", style(status).green().bold());
}

/// Writes the machine-readable result as one JSON document on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_error(e: anyhow::Error) {
    let core = e.chain().find_map(|e| e.downcast_ref::<zkcalc_host::Error>());
    let label = match core {
        Some(core) => format!("error[{}]", core.kind()),
        None => "error".to_string(),
    };
    for e in e.chain().rev() {
        eprintln!(
            "{}{} {}",
            style(&label).red().bold(),
            style(":").white().bold(),
            e
        );
    }
    if let Some(hint) = core.and_then(|core| core.hint()) {
        print_note("hint", hint);
    }
    if core.is_some_and(|core| core.is_retryable()) {
        print_note("note", "this error is transient");
    }
    let bt = e.backtrace();
    if bt.status() == BacktraceStatus::Captured {
        eprintln!("error backtrace:");
        eprintln!("{bt}");
    }
}

fn print_note(label: &str, msg: &str) {
    eprintln!(
        "{}{} {msg}",
        style(label).cyan().bold(),
        style(":").white().bold()
    );
}
