use std::path::Path;

use anyhow::{Context, Result};
use chrono::DateTime;
use futures::TryStreamExt;
use log::{debug, info, warn};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow, SqliteSynchronous};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::{CollectionStore, Page};
use crate::model::{
    BoxConvention, Collection, Cursor, Document, Face, Image, Record, RecordFilter, TextArtifact,
};
use crate::rank::{TopK, cosine_similarity};

/// SQLite 归档存储
///
/// 记录由外部摄取流水线写入（经由 import），本 crate 其余部分只读
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// 打开存储，不存在时创建并应用迁移
    pub async fn open(filename: impl AsRef<Path>) -> Result<Self> {
        let filename = filename.as_ref();
        info!("初始化归档数据库: {}", filename.display());

        if let Some(parent) = filename.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .filename(filename)
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await?;

        debug!("检查数据库迁移");
        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool })
    }

    /// 写入或覆盖一条记录，与摄取流水线的 upsert 语义一致
    pub async fn insert_record(&self, record: &Record) -> Result<()> {
        match record {
            Record::Document(d) => {
                let content = d.content.as_ref().map(serde_json::to_string).transpose()?;
                let ocr = d.ocr.as_ref().map(serde_json::to_string).transpose()?;
                sqlx::query(
                    r#"
                    INSERT OR REPLACE INTO record
                        (id, collection, ingested_at, title, original_url, storage_path,
                         content_json, ocr_json)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&d.id)
                .bind(Collection::Documents.as_str())
                .bind(d.ingested_at.timestamp_millis())
                .bind(&d.title)
                .bind(&d.original_url)
                .bind(&d.storage_path)
                .bind(content)
                .bind(ocr)
                .execute(&self.pool)
                .await?;
            }
            Record::Image(i) => {
                sqlx::query(
                    r#"
                    INSERT OR REPLACE INTO record
                        (id, collection, ingested_at, preview_thumb, preview_medium,
                         parent_doc_id, page_num, width, height, has_faces)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&i.id)
                .bind(Collection::Images.as_str())
                .bind(i.ingested_at.timestamp_millis())
                .bind(&i.preview_thumb)
                .bind(&i.preview_medium)
                .bind(&i.parent_doc_id)
                .bind(i.page_num.map(i64::from))
                .bind(i.width.map(i64::from))
                .bind(i.height.map(i64::from))
                .bind(i.has_faces)
                .execute(&self.pool)
                .await?;
            }
            Record::Face(f) => {
                sqlx::query(
                    r#"
                    INSERT OR REPLACE INTO record
                        (id, collection, ingested_at, parent_image_id, det_score,
                         bbox_json, bbox_convention, embedding)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&f.id)
                .bind(Collection::Faces.as_str())
                .bind(f.ingested_at.timestamp_millis())
                .bind(&f.parent_image_id)
                .bind(f.det_score.map(f64::from))
                .bind(serde_json::to_string(&f.bbox)?)
                .bind(f.bbox_convention.map(|c| c.as_str()))
                .bind(f.embedding.as_deref().map(encode_embedding))
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    /// 集合内的记录数量
    pub async fn count(&self, collection: Collection) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM record WHERE collection = ?")
            .bind(collection.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("count")? as u64)
    }
}

impl CollectionStore for SqliteStore {
    async fn query_page(
        &self,
        filter: &RecordFilter,
        cursor: Option<&Cursor>,
        page_size: usize,
    ) -> Result<Page> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM record WHERE collection = ");
        qb.push_bind(filter.collection.as_str());

        if let Some(parent) = &filter.parent_id {
            let column = match filter.collection {
                Collection::Images => "parent_doc_id",
                Collection::Faces => "parent_image_id",
                // 文档没有父记录
                Collection::Documents => return Ok(Page::from_records(vec![])),
            };
            qb.push(format!(" AND {} = ", column));
            qb.push_bind(parent);
        }
        if let Some(has_faces) = filter.has_faces {
            qb.push(" AND has_faces = ");
            qb.push_bind(has_faces);
        }
        if let Some(cursor) = cursor {
            let (millis, id) = cursor.decode().context("无法解析游标")?;
            qb.push(" AND (ingested_at < ");
            qb.push_bind(millis);
            qb.push(" OR (ingested_at = ");
            qb.push_bind(millis);
            qb.push(" AND id < ");
            qb.push_bind(id.to_string());
            qb.push("))");
        }
        qb.push(" ORDER BY ingested_at DESC, id DESC LIMIT ");
        qb.push_bind(page_size as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let records = rows.iter().map(record_from_row).collect::<Result<Vec<_>>>()?;
        Ok(Page::from_records(records))
    }

    async fn get_record(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        let row = sqlx::query("SELECT * FROM record WHERE collection = ? AND id = ?")
            .bind(collection.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn nearest_faces(&self, embedding: &[f32], limit: usize) -> Result<Vec<(Face, f32)>> {
        let mut rows =
            sqlx::query("SELECT * FROM record WHERE collection = ? AND embedding IS NOT NULL")
                .bind(Collection::Faces.as_str())
                .fetch(&self.pool);

        let mut best = TopK::new(limit);
        while let Some(row) = rows.try_next().await? {
            let face = match record_from_row(&row)? {
                Record::Face(face) => face,
                other => {
                    warn!("人脸集合中出现异类记录: {}", other.id());
                    continue;
                }
            };
            let Some(candidate) = face.embedding.as_deref() else { continue };
            // 维数不一致或零向量的记录跳过，不影响同批其他记录
            let Some(score) = cosine_similarity(embedding, candidate) else {
                debug!("跳过不可比对的特征向量: {}", face.id);
                continue;
            };
            best.push(face, score);
        }
        Ok(best.into_vec())
    }
}

fn record_from_row(row: &SqliteRow) -> Result<Record> {
    let id: String = row.try_get("id")?;
    let collection: String = row.try_get("collection")?;
    let millis: i64 = row.try_get("ingested_at")?;
    let ingested_at = DateTime::from_timestamp_millis(millis)
        .with_context(|| format!("记录 {} 的入库时间非法: {}", id, millis))?;

    let record = match collection.parse::<Collection>()? {
        Collection::Documents => Record::Document(Document {
            ingested_at,
            title: row.try_get::<Option<String>, _>("title")?.unwrap_or_default(),
            original_url: row.try_get("original_url")?,
            storage_path: row.try_get("storage_path")?,
            content: decode_artifact(row.try_get("content_json")?)?,
            ocr: decode_artifact(row.try_get("ocr_json")?)?,
            id,
        }),
        Collection::Images => Record::Image(Image {
            ingested_at,
            preview_thumb: row.try_get("preview_thumb")?,
            preview_medium: row.try_get("preview_medium")?,
            parent_doc_id: row.try_get("parent_doc_id")?,
            page_num: row.try_get::<Option<i64>, _>("page_num")?.and_then(|v| v.try_into().ok()),
            width: row.try_get::<Option<i64>, _>("width")?.and_then(|v| v.try_into().ok()),
            height: row.try_get::<Option<i64>, _>("height")?.and_then(|v| v.try_into().ok()),
            has_faces: row.try_get::<Option<bool>, _>("has_faces")?.unwrap_or(false),
            id,
        }),
        Collection::Faces => {
            let bbox_json: String = row.try_get("bbox_json")?;
            let bbox = serde_json::from_str(&bbox_json)
                .with_context(|| format!("记录 {} 的包围框非法: {}", id, bbox_json))?;
            Record::Face(Face {
                ingested_at,
                parent_image_id: row.try_get("parent_image_id")?,
                det_score: row.try_get::<Option<f64>, _>("det_score")?.map(|v| v as f32),
                bbox,
                bbox_convention: row
                    .try_get::<Option<String>, _>("bbox_convention")?
                    .map(|s| s.parse())
                    .transpose()?,
                embedding: row
                    .try_get::<Option<Vec<u8>>, _>("embedding")?
                    .as_deref()
                    .map(decode_embedding),
                id,
            })
        }
    };
    Ok(record)
}

fn decode_artifact(json: Option<String>) -> Result<Option<TextArtifact>> {
    json.as_deref().map(serde_json::from_str).transpose().context("文本产物字段非法")
}

/// 特征向量编码为小端 f32 字节串
fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4).map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, millis: i64) -> Record {
        Record::Document(Document {
            id: id.to_string(),
            ingested_at: DateTime::from_timestamp_millis(millis).unwrap(),
            title: format!("文档 {}", id),
            original_url: None,
            storage_path: Some(format!("v1/documents/{}/original.pdf", id)),
            content: Some(TextArtifact {
                markdown_url: Some(format!("v1/documents/{}/content.md", id)),
                text_url: None,
            }),
            ocr: None,
        })
    }

    fn face(id: &str, millis: i64, embedding: Option<Vec<f32>>) -> Record {
        Record::Face(Face {
            id: id.to_string(),
            ingested_at: DateTime::from_timestamp_millis(millis).unwrap(),
            parent_image_id: Some("img1".to_string()),
            det_score: Some(0.88),
            bbox: [12.0, 20.0, 240.0, 300.0],
            bbox_convention: Some(BoxConvention::Pixel),
            embedding,
        })
    }

    async fn open_store(dir: &tempfile::TempDir) -> SqliteStore {
        SqliteStore::open(dir.path().join("faceseek.db")).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;

        store.insert_record(&face("f1", 1000, Some(vec![0.25, -0.5, 0.75]))).await.unwrap();
        let record = store.get_record(Collection::Faces, "f1").await.unwrap().unwrap();
        let Record::Face(f) = record else { panic!("期望人脸记录") };
        assert_eq!(f.bbox, [12.0, 20.0, 240.0, 300.0]);
        assert_eq!(f.bbox_convention, Some(BoxConvention::Pixel));
        assert_eq!(f.embedding, Some(vec![0.25, -0.5, 0.75]));

        assert!(store.get_record(Collection::Faces, "不存在").await.unwrap().is_none());
        // 集合也是标识的一部分
        assert!(store.get_record(Collection::Images, "f1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_query_page_order_and_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        for i in 0..5 {
            store.insert_record(&doc(&format!("d{}", i), 1000 + i)).await.unwrap();
        }
        // 同一时间戳的记录按 id 降序排
        store.insert_record(&doc("d9", 1004)).await.unwrap();

        let filter = RecordFilter::collection(Collection::Documents);
        let page1 = store.query_page(&filter, None, 4).await.unwrap();
        let ids: Vec<_> = page1.records.iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, ["d9", "d4", "d3", "d2"]);

        let page2 = store.query_page(&filter, page1.next_cursor.as_ref(), 4).await.unwrap();
        let ids: Vec<_> = page2.records.iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids, ["d1", "d0"]);
    }

    #[tokio::test]
    async fn test_nearest_faces_ranked_and_tolerant() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir).await;
        store.insert_record(&face("fa", 1, Some(vec![1.0, 0.0]))).await.unwrap();
        store.insert_record(&face("fb", 2, Some(vec![0.9, 0.1]))).await.unwrap();
        store.insert_record(&face("fc", 3, Some(vec![0.0, 1.0]))).await.unwrap();
        // 缺特征向量和维数不一致的记录被跳过，而不是让整批失败
        store.insert_record(&face("fd", 4, None)).await.unwrap();
        store.insert_record(&face("fe", 5, Some(vec![1.0, 0.0, 0.0]))).await.unwrap();

        let hits = store.nearest_faces(&[1.0, 0.0], 10).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|(f, _)| f.id.as_str()).collect();
        assert_eq!(ids, ["fa", "fb", "fc"]);
        assert!(hits[0].1 > hits[1].1 && hits[1].1 > hits[2].1);
    }
}
