use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use gpxtx::{Engine, EngineConfig, GenConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Generator config file
    #[arg(long, env = "CONFIG", default_value = "./cfg/example.yml")]
    config: PathBuf,

    /// Debug logging mode
    #[arg(long, env = "DEBUG")]
    debug: bool,

    /// Destination host:port
    #[arg(long, env = "DEST", default_value = "127.0.0.1:30000")]
    dest: String,

    /// TCP dial and write timeout in seconds, 0 disables it (Ctrl-C still interrupts a pending send)
    #[arg(long = "tcp-timeout", alias = "tcpTimeout", env = "TIMEOUT", default_value_t = 10)]
    tcp_timeout: u64,
}

fn log(debug: bool) -> Result<()> {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    simplelog::TermLogger::init(
        level,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .context("initialize logger")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    log(args.debug)?;

    log::info!("loading configuration from {}", args.config.display());
    let gen_config = GenConfig::from_file(&args.config).context("config file error")?;

    let config = EngineConfig::new(args.dest, Duration::from_secs(args.tcp_timeout))
        .with_start_offset(gen_config.start_offset());
    let engine = Engine::new(&gen_config, config).context("error building generators")?;

    let (trigger, shutdown) = gpxtx::shutdown::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!();
            log::warn!("interrupt received, stopping generators");
            trigger.trigger();
        }
    });

    log::info!(
        "sending to {} from {} generators",
        engine.config().destination,
        engine.generators().len()
    );
    engine.run(shutdown).await;
    Ok(())
}
