use super::common_args::CoreOptions;
use crate::utils::print_cargo_message;
use anyhow::Context;
use clap::Parser;
use zkcalc_host::FileSecretStore;

#[derive(Parser)]
#[command(name = "keygen", about = "Create an Ed25519 signing key")]
pub struct KeygenCmd {
    #[clap(flatten, next_help_heading = "Core Options")]
    options: CoreOptions,

    /// Name the key is stored and referenced under
    #[clap(long)]
    key_id: String,
}

impl KeygenCmd {
    pub async fn run(self) -> anyhow::Result<()> {
        self.options.try_setup_logger();
        let config = self.options.load_config()?;
        let passphrase = config
            .passphrase
            .as_deref()
            .context("a passphrase is required, set ZKCALC_PASSPHRASE or pass --passphrase")?;
        let store = FileSecretStore::new(&config.keys_dir);
        let public_key = store.generate(&self.key_id, passphrase).await?;
        print_cargo_message(
            "Created",
            format_args!("key `{}` in {}", self.key_id, config.keys_dir.display()),
        );
        println!("{}", hex::encode(public_key));
        Ok(())
    }
}
