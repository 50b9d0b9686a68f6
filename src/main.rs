use anyhow::{anyhow, Result};
use log::{debug, LevelFilter};

use modbus_rtu_link::cli::{build_cli, handle_subcommands};
use modbus_rtu_link::Config;

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_module("modbus_rtu_link", LevelFilter::Debug);
    }
    builder.init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::from_file(path).map_err(|e| anyhow!("failed to load {}: {}", path, e))?,
        None => Config::default(),
    };
    config
        .apply_matches(&matches)
        .map_err(|e| anyhow!("invalid command line option: {}", e))?;
    config.validate()?;
    debug!("Using serial port {} at {} baud", config.serial.port, config.serial.baud_rate);

    handle_subcommands(&matches, config).await
}
