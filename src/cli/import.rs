use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use indicatif::ProgressBar;
use log::{info, warn};
use serde::Deserialize;
use walkdir::WalkDir;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::model::{
    BoxConvention, Collection, Document, Face, Image, Record, TextArtifact,
};
use crate::store::SqliteStore;

/// 把摄取流水线的输出目录导入归档库
///
/// 目录约定来自流水线本身：根下的 inventory.json 描述文档，
/// 每张图片的分析目录里有 analysis.json 和 faces.json
#[derive(Parser, Debug, Clone)]
pub struct ImportCommand {
    /// 摄取流水线的输出目录
    pub root: PathBuf,
}

/// inventory.json 中的一条文档元数据
#[derive(Deserialize, Debug)]
struct InventoryEntry {
    id: Option<String>,
    local_path: Option<String>,
    title: Option<String>,
    storage_path: Option<String>,
    content: Option<TextArtifact>,
    ocr: Option<TextArtifact>,
}

/// 图片目录下的 analysis.json
#[derive(Deserialize, Debug, Default)]
struct ImageAnalysis {
    #[serde(default)]
    has_faces: bool,
    width: Option<u32>,
    height: Option<u32>,
}

/// faces.json 中的一个检测结果
#[derive(Deserialize, Debug)]
struct DetectedFace {
    bbox: Vec<f64>,
    det_score: Option<f32>,
    embedding: Option<Vec<f32>>,
}

impl SubCommandExtend for ImportCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let store = SqliteStore::open(opts.conf_dir.database()).await?;

        import_documents(&store, &self.root).await?;
        import_images(&store, &self.root).await?;

        info!(
            "导入完成: {} 文档 / {} 图片 / {} 人脸",
            store.count(Collection::Documents).await?,
            store.count(Collection::Images).await?,
            store.count(Collection::Faces).await?,
        );
        Ok(())
    }
}

async fn import_documents(store: &SqliteStore, root: &Path) -> Result<()> {
    let inventory_path = root.join("inventory.json");
    if !inventory_path.exists() {
        warn!("未找到 {}，跳过文档导入", inventory_path.display());
        return Ok(());
    }

    let raw = fs::read_to_string(&inventory_path)?;
    let inventory: HashMap<String, InventoryEntry> =
        serde_json::from_str(&raw).context("inventory.json 格式非法")?;
    let ingested_at = mtime(&inventory_path);

    let pb = ProgressBar::new(inventory.len() as u64);
    for (url, entry) in inventory {
        pb.inc(1);
        let Some(id) = document_id(&entry) else {
            warn!("清单条目缺少标识，跳过: {}", url);
            continue;
        };
        let document = Document {
            title: entry.title.clone().unwrap_or_else(|| id.clone()),
            ingested_at,
            original_url: Some(url),
            storage_path: entry.storage_path,
            content: entry.content,
            ocr: entry.ocr,
            id,
        };
        store.insert_record(&Record::Document(document)).await?;
    }
    pb.finish();
    Ok(())
}

async fn import_images(store: &SqliteStore, root: &Path) -> Result<()> {
    // 图片分析目录以 analysis.json 或 faces.json 标记
    let dirs: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_dir()
                && (entry.path().join("analysis.json").exists()
                    || entry.path().join("faces.json").exists())
        })
        .map(|entry| entry.into_path())
        .collect();

    let pb = ProgressBar::new(dirs.len() as u64);
    for dir in dirs {
        pb.inc(1);
        if let Err(error) = import_image_dir(store, root, &dir).await {
            warn!("导入 {} 失败: {:#}", dir.display(), error);
        }
    }
    pb.finish();
    Ok(())
}

async fn import_image_dir(store: &SqliteStore, root: &Path, dir: &Path) -> Result<()> {
    let rel = dir.strip_prefix(root).unwrap_or(dir);
    let image_id = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    let parent_doc_id =
        rel.components().next().map(|c| c.as_os_str().to_string_lossy().into_owned());

    let analysis_path = dir.join("analysis.json");
    let analysis: ImageAnalysis = match fs::read_to_string(&analysis_path) {
        Ok(raw) => serde_json::from_str(&raw).context("analysis.json 格式非法")?,
        Err(_) => ImageAnalysis::default(),
    };

    let faces_path = dir.join("faces.json");
    let faces: Vec<DetectedFace> = match fs::read_to_string(&faces_path) {
        Ok(raw) => serde_json::from_str(&raw).context("faces.json 格式非法")?,
        Err(_) => vec![],
    };

    let ingested_at = mtime(&analysis_path);
    let image = Image {
        id: image_id.clone(),
        ingested_at,
        preview_thumb: preview_url(root, dir, "thumb.avif"),
        preview_medium: preview_url(root, dir, "medium.avif"),
        parent_doc_id,
        page_num: dir.file_name().and_then(|n| parse_page_num(&n.to_string_lossy())),
        width: analysis.width,
        height: analysis.height,
        has_faces: analysis.has_faces || !faces.is_empty(),
    };
    store.insert_record(&Record::Image(image)).await?;

    let ingested_at = mtime(&faces_path);
    for (index, detected) in faces.into_iter().enumerate() {
        let Ok(bbox) = <[f64; 4]>::try_from(detected.bbox.as_slice()) else {
            // 单条坏记录只影响它自己
            warn!("{} 的第 {} 个人脸包围框非法，跳过", image_id, index);
            continue;
        };
        let face = Face {
            id: format!("{}#{}", image_id, index),
            ingested_at,
            parent_image_id: Some(image_id.clone()),
            det_score: detected.det_score,
            bbox,
            // 检测器输出的是原图像素坐标
            bbox_convention: Some(BoxConvention::Pixel),
            embedding: detected.embedding,
        };
        store.insert_record(&Record::Face(face)).await?;
    }
    Ok(())
}

fn document_id(entry: &InventoryEntry) -> Option<String> {
    if let Some(id) = &entry.id {
        return Some(id.clone());
    }
    let local_path = entry.local_path.as_deref()?;
    Path::new(local_path).file_name().map(|n| n.to_string_lossy().into_owned())
}

/// 从 pageN_imgM 形式的目录名解出页码
fn parse_page_num(name: &str) -> Option<u32> {
    let rest = name.strip_prefix("page")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn preview_url(root: &Path, dir: &Path, name: &str) -> Option<String> {
    let path = dir.join(name);
    path.exists().then(|| {
        let rel = path.strip_prefix(root).unwrap_or(&path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    })
}

fn mtime(path: &Path) -> DateTime<Utc> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_num() {
        assert_eq!(parse_page_num("page11_img1"), Some(11));
        assert_eq!(parse_page_num("page3"), Some(3));
        assert_eq!(parse_page_num("cover_img1"), None);
        assert_eq!(parse_page_num("page_img1"), None);
    }
}
