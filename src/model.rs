use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 归档中的记录集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Documents,
    Images,
    Faces,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Documents => "documents",
            Self::Images => "images",
            Self::Faces => "faces",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "documents" => Ok(Self::Documents),
            "images" => Ok(Self::Images),
            "faces" => Ok(Self::Faces),
            _ => Err(anyhow::anyhow!("未知集合: {}", s)),
        }
    }
}

/// 包围框坐标约定
///
/// 上游检测器产出的坐标存在两种约定，记录本身不一定携带标记，
/// 带标记的记录优先按标记处理，否则回退到阈值启发式判断
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxConvention {
    /// 图片宽高的比例坐标，范围约 [0, 1]
    Normalized,
    /// 原图像素坐标
    Pixel,
}

impl BoxConvention {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normalized => "normalized",
            Self::Pixel => "pixel",
        }
    }
}

impl FromStr for BoxConvention {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normalized" => Ok(Self::Normalized),
            "pixel" => Ok(Self::Pixel),
            _ => Err(anyhow::anyhow!("未知坐标约定: {}", s)),
        }
    }
}

/// 文本产物链接，markdown 和纯文本至少存在一个
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextArtifact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_url: Option<String>,
}

/// 文档记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// 入库时间，对外序列化为 RFC 3339 文本
    pub ingested_at: DateTime<Utc>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<TextArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr: Option<TextArtifact>,
}

/// 图片记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub ingested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_thumb: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_medium: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_doc_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_num: Option<u32>,
    /// 原图宽度，像素
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// 原图高度，像素
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub has_faces: bool,
}

/// 人脸记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Face {
    pub id: String,
    pub ingested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_image_id: Option<String>,
    /// 检测器置信度
    #[serde(skip_serializing_if = "Option::is_none")]
    pub det_score: Option<f32>,
    /// 包围框 [x1, y1, x2, y2]，坐标约定见 [`BoxConvention`]
    pub bbox: [f64; 4],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox_convention: Option<BoxConvention>,
    /// 特征向量，512 维；只在相似度查询内部使用，不对外序列化
    #[serde(skip_serializing, default)]
    pub embedding: Option<Vec<f32>>,
}

/// 归档记录，按集合区分
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "collection", rename_all = "snake_case")]
pub enum Record {
    Document(Document),
    Image(Image),
    Face(Face),
}

impl Record {
    pub fn id(&self) -> &str {
        match self {
            Self::Document(d) => &d.id,
            Self::Image(i) => &i.id,
            Self::Face(f) => &f.id,
        }
    }

    pub fn ingested_at(&self) -> DateTime<Utc> {
        match self {
            Self::Document(d) => d.ingested_at,
            Self::Image(i) => i.ingested_at,
            Self::Face(f) => f.ingested_at,
        }
    }

    pub fn collection(&self) -> Collection {
        match self {
            Self::Document(_) => Collection::Documents,
            Self::Image(_) => Collection::Images,
            Self::Face(_) => Collection::Faces,
        }
    }

    /// 记录的排序键，入库时间降序，同一时间按 id 降序
    pub fn sort_key(&self) -> (i64, &str) {
        (self.ingested_at().timestamp_millis(), self.id())
    }
}

/// 不透明的分页游标
///
/// 内容为上一页最后一条记录的排序键，只对一个 (过滤器, 排序) 组合有效，
/// 过滤器变化后必须丢弃
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn after(record: &Record) -> Self {
        let (millis, id) = record.sort_key();
        Self(format!("{}:{}", millis, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 解出排序键，供存储层换算范围查询；调用方不应依赖内部格式
    pub fn decode(&self) -> Option<(i64, &str)> {
        let (millis, id) = self.0.split_once(':')?;
        Some((millis.parse().ok()?, id))
    }
}

impl From<String> for Cursor {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// 一次分页查询的过滤条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub collection: Collection,
    /// 父记录过滤：图片按所属文档，人脸按所属图片
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// 只保留含人脸的图片
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_faces: Option<bool>,
}

impl RecordFilter {
    pub fn collection(collection: Collection) -> Self {
        Self { collection, parent_id: None, has_faces: None }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_has_faces(mut self, has_faces: bool) -> Self {
        self.has_faces = Some(has_faces);
        self
    }

    /// 判断一条记录是否落在过滤范围内
    pub fn matches(&self, record: &Record) -> bool {
        if record.collection() != self.collection {
            return false;
        }
        if let Some(parent) = &self.parent_id {
            let actual = match record {
                Record::Image(i) => i.parent_doc_id.as_deref(),
                Record::Face(f) => f.parent_image_id.as_deref(),
                // 文档没有父记录
                Record::Document(_) => None,
            };
            if actual != Some(parent.as_str()) {
                return false;
            }
        }
        if let Some(has_faces) = self.has_faces {
            match record {
                Record::Image(i) if i.has_faces == has_faces => {}
                _ => return false,
            }
        }
        true
    }
}
