//! Build the built-in guest package.
//!
//! The guests target the zkVM and live outside the host workspace, so they
//! are compiled by the configured toolchain (`cargo risczero build` unless the
//! config says otherwise) against `guests/Cargo.toml`. Binaries land in
//! `builtin_elf_dir`, where the registry looks for them.

use super::common_args::CoreOptions;
use crate::utils::{print_cargo_message, print_json};
use anyhow::bail;
use clap::Parser;
use std::time::Instant;
use zkcalc_host::{BuildState, OperationKind};

#[derive(Parser)]
#[command(name = "build", about = "Compile the built-in guest programs")]
pub struct BuildCmd {
    #[clap(flatten, next_help_heading = "Core Options")]
    options: CoreOptions,

    /// Only report this guest, failing if it is still unbuilt afterwards.
    #[arg(long)]
    guest: Option<OperationKind>,
}

impl BuildCmd {
    pub async fn run(self) -> anyhow::Result<()> {
        let calc = self.options.init()?;
        print_cargo_message(
            "Building",
            format_args!("guests in {}", calc.config().guests_dir.display()),
        );
        let start = Instant::now();
        let mut guests = calc.build_guests().await?;
        if let Some(guest) = self.guest {
            guests.retain(|g| g.operation == guest);
            if guests.is_empty() {
                bail!("`{guest}` is not a built-in guest");
            }
        }
        for guest in &guests {
            if guest.state != BuildState::Ready {
                bail!(
                    "guest `{}` is {} after the build, expected {}",
                    guest.name,
                    guest.state,
                    guest.elf_path.display()
                );
            }
        }
        print_cargo_message(
            "Finished",
            format_args!(
                "{} guest(s) in {:.2}s",
                guests.len(),
                start.elapsed().as_secs_f32()
            ),
        );
        print_json(&guests)
    }
}
