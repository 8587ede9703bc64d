use clap::Parser;
use log::{error, info};

use detsynth::{run_synthesis, Args, SynthesisConfig};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = match SynthesisConfig::try_from(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            std::process::exit(2);
        }
    };

    info!(
        "Synthesizing from {} onto {} into {}",
        config.objects_dir.display(),
        config.backgrounds_dir.display(),
        config.output_dir.display()
    );

    if let Err(e) = run_synthesis(&config) {
        error!("Synthesis failed: {e}");
        std::process::exit(1);
    }
}
