use anyhow::Result;
use clap::Parser;

use crate::cli::{OutputFormat, SubCommandExtend, parse_collection};
use crate::config::{FeedOptions, Opts};
use crate::feed::FeedController;
use crate::model::{Collection, Record, RecordFilter};
use crate::store::SqliteStore;

#[derive(Parser, Debug, Clone)]
pub struct FeedCommand {
    #[command(flatten)]
    pub feed: FeedOptions,
    /// 浏览的集合
    #[arg(value_parser = parse_collection)]
    pub collection: Collection,
    /// 父记录过滤：图片按所属文档，人脸按所属图片
    #[arg(long, value_name = "ID")]
    pub parent: Option<String>,
    /// 只保留含人脸的图片
    #[arg(long)]
    pub has_faces: bool,
    /// 连续拉取的页数
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub pages: usize,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for FeedCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let store = SqliteStore::open(opts.conf_dir.database()).await?;

        let mut filter = RecordFilter::collection(self.collection);
        if let Some(parent) = &self.parent {
            filter = filter.with_parent(parent.clone());
        }
        if self.has_faces {
            filter = filter.with_has_faces(true);
        }

        let mut controller = FeedController::with_page_size(filter, self.feed.page_size);
        for _ in 0..self.pages {
            controller.next_page(&store).await?;
            if !controller.has_more() {
                break;
            }
        }

        print_records(controller.items(), &self.output_format)
    }
}

fn print_records(records: &[Record], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(records)?)
        }
        OutputFormat::Table => {
            for record in records {
                let label = match record {
                    Record::Document(d) => d.title.clone(),
                    Record::Image(i) => i.preview_medium.clone().unwrap_or_default(),
                    Record::Face(f) => f.parent_image_id.clone().unwrap_or_default(),
                };
                println!("{}\t{}\t{}", record.ingested_at().to_rfc3339(), record.id(), label);
            }
        }
    }
    Ok(())
}
