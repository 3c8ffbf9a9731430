use super::common_args::CoreOptions;
use clap::Parser;
use zkcalc_host::BackendConfig;

#[derive(Parser)]
#[command(name = "info", about = "Show info of current zkcalc cli")]
pub struct InfoCmd {
    #[clap(flatten, next_help_heading = "Core Options")]
    options: CoreOptions,
}

impl InfoCmd {
    pub fn run(self) -> anyhow::Result<()> {
        eprintln!("OS: {}", std::env::consts::OS);
        eprintln!("Arch: {}", std::env::consts::ARCH);

        let mut enabled_features = vec![];
        if cfg!(debug_assertions) {
            enabled_features.push("debug_assertions");
        }
        if cfg!(target_feature = "avx2") {
            enabled_features.push("avx2");
        }
        if cfg!(target_feature = "neon") {
            enabled_features.push("neon");
        }
        eprintln!("Enabled features: {}", enabled_features.join(", "));

        let config = self.options.load_config()?;
        match &config.backend {
            BackendConfig::Dev => eprintln!("Backend: dev (receipts carry no proof)"),
            BackendConfig::External { program, args } => {
                eprintln!("Backend: external {} {}", program.display(), args.join(" "))
            }
        }
        eprintln!(
            "Toolchain: {} {}",
            config.toolchain.program,
            config.toolchain.args.join(" ")
        );
        eprintln!("Guests: {}", config.builtin_elf_dir.display());
        eprintln!("Artifacts: {}", config.artifact_dir.display());
        eprintln!(
            "Dynamic builds: {}",
            if config.cache_dynamic_builds {
                "cached"
            } else {
                "uncached"
            }
        );

        let calc = zkcalc_host::ZkCalc::new(std::sync::Arc::new(config));
        for guest in calc.registry().describe_builtins() {
            eprintln!("  {:<20} {}", guest.name, guest.state);
        }
        Ok(())
    }
}
