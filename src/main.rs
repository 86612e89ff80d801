use clap::Parser;

use faceseek::cli::SubCommandExtend;
use faceseek::config::{Opts, SubCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();
    match &opts.subcmd {
        SubCommand::Import(cmd) => cmd.run(&opts).await,
        SubCommand::Feed(cmd) => cmd.run(&opts).await,
        SubCommand::Similar(cmd) => cmd.run(&opts).await,
        SubCommand::Server(cmd) => cmd.run(&opts).await,
    }
}
