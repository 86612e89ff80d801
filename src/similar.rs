//! 人脸相似度搜索服务
//!
//! 给定一个已检测的人脸，解析它的特征向量并在人脸集合上发起
//! 最近邻查询，返回排除自身后的排名结果

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use crate::geometry::{NormalizedBox, Normalizer};
use crate::model::{BoxConvention, Collection, Face, Image, Record};
use crate::store::CollectionStore;

/// 默认返回的相似人脸数量
pub const SIMILAR_LIMIT: usize = 24;
/// 候选数量在展示数量之上的余量
///
/// 查询向量对应的人脸自身必然以距离 0 出现在最近邻中，事后排除会
/// 消耗一个名额；余量同时吸收少量坏记录
const CANDIDATE_SLACK: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum SimilarError {
    /// 标识没有对应的人脸记录
    #[error("人脸记录不存在: {0}")]
    NotFound(String),
    /// 记录存在，但摄取流水线没有为它生成特征向量
    #[error("人脸记录缺少特征向量: {0}")]
    MissingEmbedding(String),
    /// 存储或查询失败的兜底
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// 对外返回的相似人脸
///
/// 特征向量在这里被剥掉，时间戳序列化为 RFC 3339 文本
#[derive(Debug, Clone, Serialize)]
pub struct SimilarFace {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub det_score: Option<f32>,
    pub bbox: [f64; 4],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox_convention: Option<BoxConvention>,
    /// 按所属图片尺寸归一化后的包围框；尺寸未知或包围框非法时为 None，
    /// 调用方可在图片加载后自行归一化
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox_normalized: Option<NormalizedBox>,
    pub ingested_at: DateTime<Utc>,
    /// 余弦相似度，越大越相似
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// 相似度搜索服务
pub struct SimilarityService<S> {
    store: S,
    limit: usize,
    normalizer: Normalizer,
}

impl<S: CollectionStore> SimilarityService<S> {
    pub fn new(store: S) -> Self {
        Self::with_limit(store, SIMILAR_LIMIT)
    }

    pub fn with_limit(store: S, limit: usize) -> Self {
        Self { store, limit, normalizer: Normalizer::default() }
    }

    pub fn normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// 查找与指定人脸最相似的人脸，相似度降序
    ///
    /// 查询人脸自身不会出现在结果里；所有错误对调用方都是可恢复的，
    /// 降级为「没有相似人脸」即可
    pub async fn find_similar(&self, face_id: &str) -> Result<Vec<SimilarFace>, SimilarError> {
        let record = self.store.get_record(Collection::Faces, face_id).await?;
        let face = match record {
            Some(Record::Face(face)) => face,
            _ => return Err(SimilarError::NotFound(face_id.to_string())),
        };
        let embedding = match face.embedding.as_deref() {
            Some(embedding) => embedding,
            None => return Err(SimilarError::MissingEmbedding(face_id.to_string())),
        };

        let hits = self.store.nearest_faces(embedding, self.limit + CANDIDATE_SLACK).await?;
        debug!("最近邻查询返回 {} 个候选", hits.len());

        let mut faces = Vec::with_capacity(self.limit);
        for (hit, score) in hits {
            if hit.id == face_id {
                continue;
            }
            if faces.len() == self.limit {
                break;
            }
            let bbox_normalized = self.normalize_hit(&hit).await;
            faces.push(SimilarFace {
                id: hit.id,
                parent_image_id: hit.parent_image_id,
                det_score: hit.det_score,
                bbox: hit.bbox,
                bbox_convention: hit.bbox_convention,
                bbox_normalized,
                ingested_at: hit.ingested_at,
                score: Some(score),
            });
        }
        Ok(faces)
    }

    /// 尽力归一化一个命中人脸的包围框
    ///
    /// 所属图片的原始尺寸未知或包围框非法时返回 None，单条坏记录
    /// 不影响批次里的其他结果
    async fn normalize_hit(&self, face: &Face) -> Option<NormalizedBox> {
        let natural = match &face.parent_image_id {
            Some(image_id) => self.natural_size(image_id).await,
            None => None,
        };
        match self.normalizer.normalize_face(face, natural) {
            Ok(bbox) => Some(bbox),
            Err(error) => {
                debug!("包围框暂不可渲染: {}: {}", face.id, error);
                None
            }
        }
    }

    async fn natural_size(&self, image_id: &str) -> Option<(f64, f64)> {
        let record = match self.store.get_record(Collection::Images, image_id).await {
            Ok(record) => record,
            Err(error) => {
                debug!("查询图片 {} 失败: {:#}", image_id, error);
                return None;
            }
        };
        match record {
            Some(Record::Image(Image { width: Some(w), height: Some(h), .. })) => {
                Some((f64::from(w), f64::from(h)))
            }
            _ => None,
        }
    }
}
