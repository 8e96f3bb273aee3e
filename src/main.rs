use chbridge_lib::config::{CliArgs, ServiceConfig};
use clap::Parser;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse();
    let config = match ServiceConfig::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = chbridge_lib::run(config).await {
        log::error!("Service stopped: {}", e);
        std::process::exit(1);
    }
}
