use crate::{commands::*, utils::*};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};

mod commands;
mod utils;

const ZKCALC_VERSION: &str = env!("ZKCALC_VERSION");

#[derive(Parser)]
#[command(name = "cargo", bin_name = "cargo")]
enum Cargo {
    #[command(name = "zkcalc")]
    ZkCalc(ZkCalcCli),
}

#[derive(Args)]
#[command(
    author,
    about,
    long_about = None,
    version = ZKCALC_VERSION
)]
struct ZkCalcCli {
    #[clap(subcommand)]
    command: ZkCalcCommands,
}

#[derive(Subcommand)]
pub enum ZkCalcCommands {
    Build(BuildCmd),
    Prove(ProveCmd),
    Verify(VerifyCmd),
    Keygen(KeygenCmd),
    Info(InfoCmd),
}

#[tokio::main]
async fn main() {
    let Cargo::ZkCalc(args) = Cargo::parse();
    let result = match args.command {
        ZkCalcCommands::Build(cmd) => cmd
            .run()
            .await
            .context("could not build guests due to previous error"),
        ZkCalcCommands::Prove(cmd) => cmd
            .run()
            .await
            .context("could not prove operation due to previous error"),
        ZkCalcCommands::Verify(cmd) => cmd
            .run()
            .await
            .context("could not verify proof due to previous error"),
        ZkCalcCommands::Keygen(cmd) => cmd
            .run()
            .await
            .context("could not generate key due to previous error"),
        ZkCalcCommands::Info(cmd) => cmd.run(),
    };
    if let Err(e) = result {
        print_error(e);
        std::process::exit(1);
    }
}
