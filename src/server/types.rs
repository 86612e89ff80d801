use serde::Deserialize;
use utoipa::ToSchema;

/// 信息流分页查询参数
#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    /// 集合名：documents / images / faces
    pub collection: String,
    /// 父记录过滤：图片按所属文档，人脸按所属图片
    pub parent_id: Option<String>,
    /// 只保留含人脸的图片
    pub has_faces: Option<bool>,
    /// 上一页返回的游标
    pub cursor: Option<String>,
    /// 每页记录数量，人脸默认 48，其余默认 20
    pub page_size: Option<usize>,
}

/// 信息流响应（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct FeedResponse {
    /// 本页记录，入库时间降序；人脸记录不携带特征向量
    #[schema(value_type = Vec<Object>)]
    pub records: Vec<serde_json::Value>,
    /// 指向本页最后一条记录的游标
    pub next_cursor: Option<String>,
    /// 是否可能还有下一页
    pub has_more: bool,
}

/// 相似人脸响应（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct SimilarResponse {
    /// 相似人脸，相似度降序，每条带 score 字段
    #[schema(value_type = Vec<Object>)]
    pub faces: Vec<serde_json::Value>,
}
