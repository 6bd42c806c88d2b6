use anyhow::Context;
use plm::domain::config::ApiConfig;
use plm::kernel::config::load_config;
use plm_logger::{Logger, parse_level};
use plm_server::Server;

#[plm_runtime::main(high_performance)]
async fn main() -> anyhow::Result<()> {
    // Config comes first: it decides where and how to log.
    let cfg: ApiConfig = load_config(Some("server")).context("Critical: Configuration is malformed")?;
    let _log = init_logger(&cfg)?;

    Server::builder().config(cfg).build().await?.run().await
}

fn init_logger(cfg: &ApiConfig) -> anyhow::Result<Logger> {
    let level = parse_level(&cfg.logging.level)?;
    let builder = Logger::builder().name(env!("CARGO_PKG_NAME")).level(level);
    let logger = match &cfg.logging.directory {
        Some(directory) => builder.path(directory).json(cfg.logging.json).init()?,
        None => builder.init()?,
    };
    Ok(logger)
}
