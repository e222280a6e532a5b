use clap::Parser;
use log::debug;

use imdedup::Opts;
use imdedup::cli::SubCommandExtend;
use imdedup::config::SubCommand;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    debug!("配置目录: {}", opts.conf_dir);

    match &opts.subcmd {
        SubCommand::Hash(config) => config.run(&opts).await,
        SubCommand::Sight(config) => config.run(&opts).await,
        SubCommand::Scan(config) => config.run(&opts).await,
        SubCommand::Similar(config) => config.run(&opts).await,
        SubCommand::Whitelist(config) => config.run(&opts).await,
        SubCommand::UserWhitelist(config) => config.run(&opts).await,
        SubCommand::Info(config) => config.run(&opts).await,
        SubCommand::Stat(config) => config.run(&opts).await,
        SubCommand::Export(config) => config.run(&opts).await,
        SubCommand::Server(config) => config.run(&opts).await,
    }
}
