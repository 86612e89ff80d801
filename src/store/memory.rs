use std::cmp::Reverse;
use std::sync::{Arc, RwLock};

use anyhow::Result;

use super::{CollectionStore, Page};
use crate::model::{Collection, Cursor, Face, Record, RecordFilter};
use crate::rank::{TopK, cosine_similarity};

/// 内存存储，接口与生产实现一致，用于测试和演练
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    records: Arc<RwLock<Vec<Record>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    pub fn insert(&self, record: Record) {
        self.records.write().expect("记录锁中毒").push(record);
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("记录锁中毒").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CollectionStore for MemStore {
    async fn query_page(
        &self,
        filter: &RecordFilter,
        cursor: Option<&Cursor>,
        page_size: usize,
    ) -> Result<Page> {
        let records = self.records.read().expect("记录锁中毒");
        let after = match cursor {
            Some(c) => {
                let (millis, id) = c.decode().ok_or_else(|| anyhow::anyhow!("无法解析游标"))?;
                Some((millis, id.to_string()))
            }
            None => None,
        };

        let mut hits: Vec<Record> = records
            .iter()
            .filter(|r| filter.matches(r))
            .filter(|r| match &after {
                // 严格小于游标的排序键才属于后续页
                Some((millis, id)) => {
                    let (m, i) = r.sort_key();
                    (m, i) < (*millis, id.as_str())
                }
                None => true,
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| {
            let (ma, ia) = a.sort_key();
            let (mb, ib) = b.sort_key();
            (Reverse(ma), Reverse(ia)).cmp(&(Reverse(mb), Reverse(ib)))
        });
        hits.truncate(page_size);

        Ok(Page::from_records(hits))
    }

    async fn get_record(&self, collection: Collection, id: &str) -> Result<Option<Record>> {
        let records = self.records.read().expect("记录锁中毒");
        Ok(records.iter().find(|r| r.collection() == collection && r.id() == id).cloned())
    }

    async fn nearest_faces(&self, embedding: &[f32], limit: usize) -> Result<Vec<(Face, f32)>> {
        let records = self.records.read().expect("记录锁中毒");
        let mut best = TopK::new(limit);
        for record in records.iter() {
            let Record::Face(face) = record else { continue };
            let Some(candidate) = face.embedding.as_deref() else { continue };
            let Some(score) = cosine_similarity(embedding, candidate) else { continue };
            best.push(face.clone(), score);
        }
        Ok(best.into_vec())
    }
}
