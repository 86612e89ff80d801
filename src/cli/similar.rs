use anyhow::Result;
use clap::Parser;
use log::warn;

use crate::cli::{OutputFormat, SubCommandExtend};
use crate::config::{GeometryOptions, Opts, SimilarOptions};
use crate::geometry::Normalizer;
use crate::similar::{SimilarError, SimilarFace, SimilarityService};
use crate::store::SqliteStore;

#[derive(Parser, Debug, Clone)]
pub struct SimilarCommand {
    #[command(flatten)]
    pub similar: SimilarOptions,
    #[command(flatten)]
    pub geometry: GeometryOptions,
    /// 查询的人脸 ID
    pub face_id: String,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SimilarCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let store = SqliteStore::open(opts.conf_dir.database()).await?;
        let service = SimilarityService::with_limit(store, self.similar.count)
            .normalizer(Normalizer::new(self.geometry.bbox_threshold));

        let faces = match service.find_similar(&self.face_id).await {
            Ok(faces) => faces,
            // 记录级问题降级为空结果
            Err(error @ (SimilarError::NotFound(_) | SimilarError::MissingEmbedding(_))) => {
                warn!("{}", error);
                vec![]
            }
            Err(SimilarError::Backend(error)) => return Err(error),
        };

        print_result(&faces, &self.output_format)
    }
}

fn print_result(faces: &[SimilarFace], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(faces)?)
        }
        OutputFormat::Table => {
            for face in faces {
                println!(
                    "{:.4}\t{}\t{}",
                    face.score.unwrap_or_default(),
                    face.id,
                    face.parent_image_id.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}
