use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;
use crate::feed::FEED_PAGE_SIZE;
use crate::geometry::DEFAULT_BBOX_THRESHOLD;
use crate::similar::SIMILAR_LIMIT;

static CONF_DIR: LazyLock<ConfDir> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "", "faceseek").expect("failed to get project dir");
    ConfDir { path: proj_dirs.config_dir().to_path_buf() }
});

fn default_conf_dir() -> &'static str {
    CONF_DIR.path().to_str().unwrap()
}

#[derive(Parser, Debug, Clone)]
pub struct FeedOptions {
    /// 每页拉取的记录数量
    #[arg(long, value_name = "N", default_value_t = FEED_PAGE_SIZE)]
    pub page_size: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct SimilarOptions {
    /// 返回的相似人脸数量
    #[arg(long, value_name = "N", default_value_t = SIMILAR_LIMIT)]
    pub count: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct GeometryOptions {
    /// 坐标约定启发式的阈值，四个分量都不超过它的包围框视为比例坐标
    #[arg(long, value_name = "T", default_value_t = DEFAULT_BBOX_THRESHOLD)]
    pub bbox_threshold: f64,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "faceseek", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// faceseek 配置文件目录
    #[arg(short, long, default_value = default_conf_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 导入摄取流水线的输出到归档库
    Import(ImportCommand),
    /// 按游标分页浏览一个集合
    Feed(FeedCommand),
    /// 搜索与指定人脸相似的人脸
    Similar(SimilarCommand),
    /// 启动 HTTP 服务
    Server(ServerCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回归档数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("faceseek.db")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}
