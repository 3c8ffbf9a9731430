use std::{env, fmt::Write};
use vergen_git2::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let build = BuildBuilder::default().build_timestamp(true).build()?;
    let git2 = Git2Builder::default().sha(true).dirty(true).build()?;
    let rustc = RustcBuilder::default()
        .channel(true)
        .commit_date(true)
        .build()?;

    Emitter::default()
        .add_instructions(&build)?
        .add_instructions(&git2)?
        .add_instructions(&rustc)?
        .emit_and_set()?;

    // outside a git checkout vergen leaves these unset
    let var = |name: &str| env::var(name).unwrap_or_else(|_| "unknown".to_string());
    let mut version = String::from(env!("CARGO_PKG_VERSION"));
    write!(version, " ({}", var("VERGEN_GIT_SHA"))?;
    if var("VERGEN_GIT_DIRTY") == "true" {
        write!(version, "-dirty")?;
    }
    write!(
        version,
        " rustc-{}-{} {})",
        var("VERGEN_RUSTC_CHANNEL"),
        var("VERGEN_RUSTC_COMMIT_DATE"),
        var("VERGEN_BUILD_TIMESTAMP")
    )?;
    println!("cargo:rustc-env=ZKCALC_VERSION={version}");
    Ok(())
}
