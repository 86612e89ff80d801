//! 归档存储的访问边界
//!
//! 存储本身是外部协作方：支持有序范围查询、游标分页和最近邻向量查询。
//! 这里只定义消费接口，生产实现为 SQLite，测试用内存实现替换

mod memory;
mod sqlite;

use std::future::Future;

use anyhow::Result;

use crate::model::{Collection, Cursor, Face, Record, RecordFilter};

pub use memory::MemStore;
pub use sqlite::SqliteStore;

/// 一页查询结果
#[derive(Debug, Clone)]
pub struct Page {
    /// 按入库时间降序排列的记录
    pub records: Vec<Record>,
    /// 指向本页最后一条记录的游标，本页为空时为 None
    pub next_cursor: Option<Cursor>,
}

impl Page {
    pub fn from_records(records: Vec<Record>) -> Self {
        let next_cursor = records.last().map(Cursor::after);
        Self { records, next_cursor }
    }
}

/// 记录集合的读取接口
///
/// 所有方法都是非阻塞异步 IO；实现负责自身的并发控制，
/// 对本 crate 表现为读已提交
pub trait CollectionStore: Send + Sync {
    /// 按过滤条件和游标拉取一页记录，入库时间降序，同一时间按 id 降序
    fn query_page(
        &self,
        filter: &RecordFilter,
        cursor: Option<&Cursor>,
        page_size: usize,
    ) -> impl Future<Output = Result<Page>> + Send;

    /// 按标识查询单条记录
    fn get_record(
        &self,
        collection: Collection,
        id: &str,
    ) -> impl Future<Output = Result<Option<Record>>> + Send;

    /// 人脸集合上的最近邻查询，余弦相似度降序
    ///
    /// 存储没有「排除自身」的概念，查询向量对应的人脸自身也会出现在结果中，
    /// 由调用方事后过滤
    fn nearest_faces(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> impl Future<Output = Result<Vec<(Face, f32)>>> + Send;
}
