mod feed;
mod import;
pub mod server;
mod similar;

pub use feed::*;
pub use import::*;
pub use server::*;
pub use similar::*;

use std::convert::Infallible;
use std::str::FromStr;

use clap::ValueEnum;

use crate::config::Opts;
use crate::model::Collection;

pub(crate) fn parse_collection(s: &str) -> Result<Collection, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
}

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

#[derive(ValueEnum, Debug, Clone)]
pub enum OutputFormat {
    Json,
    Table,
}

impl FromStr for OutputFormat {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            _ => unreachable!(),
        }
    }
}
