use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde_json::{Value, json};

use super::error::{AppError, Result};
use super::state::AppState;
use super::types::*;
use crate::feed::{FACE_GRID_PAGE_SIZE, FEED_PAGE_SIZE};
use crate::model::{Collection, Cursor, RecordFilter};
use crate::store::CollectionStore;

/// 每页记录数量的上限
const MAX_PAGE_SIZE: usize = 100;

/// 按游标拉取一页记录
#[utoipa::path(
    get,
    path = "/api/feed",
    responses(
        (status = 200, body = FeedResponse),
    )
)]
pub async fn feed_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Value>> {
    let collection: Collection = query
        .collection
        .parse()
        .map_err(|e: anyhow::Error| AppError::Unprocessable(e.to_string()))?;

    let mut filter = RecordFilter::collection(collection);
    filter.parent_id = query.parent_id;
    filter.has_faces = query.has_faces;

    // 人脸网格一页 48 条，其余集合 20 条
    let default_size = match collection {
        Collection::Faces => FACE_GRID_PAGE_SIZE,
        _ => FEED_PAGE_SIZE,
    };
    let page_size = query.page_size.unwrap_or(default_size).clamp(1, MAX_PAGE_SIZE);
    let cursor = query.cursor.map(Cursor::from);

    let page = state.store.query_page(&filter, cursor.as_ref(), page_size).await?;
    let has_more = page.records.len() == page_size;

    Ok(Json(json!({
        "records": page.records,
        "next_cursor": page.next_cursor,
        "has_more": has_more,
    })))
}

/// 按标识查询单条记录
#[utoipa::path(
    get,
    path = "/api/records/{collection}/{id}",
    responses(
        (status = 200, description = "记录"),
        (status = 404, description = "记录不存在"),
    )
)]
pub async fn record_handler(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let collection: Collection =
        collection.parse().map_err(|e: anyhow::Error| AppError::Unprocessable(e.to_string()))?;
    let record = state
        .store
        .get_record(collection, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("记录不存在: {}", id)))?;
    Ok(Json(json!(record)))
}

/// 搜索与指定人脸相似的人脸
#[utoipa::path(
    get,
    path = "/api/faces/{id}/similar",
    responses(
        (status = 200, body = SimilarResponse),
        (status = 404, description = "人脸记录不存在"),
        (status = 422, description = "人脸记录缺少特征向量"),
    )
)]
pub async fn similar_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let faces = state.similar.find_similar(&id).await?;
    Ok(Json(json!({ "faces": faces })))
}
