use std::sync::Arc;

use crate::cli::server::ServerCommand;
use crate::geometry::Normalizer;
use crate::similar::SimilarityService;
use crate::store::SqliteStore;

/// 应用状态
pub struct AppState {
    /// 归档存储
    pub store: SqliteStore,
    /// 相似度搜索服务
    pub similar: SimilarityService<SqliteStore>,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(store: SqliteStore, opts: ServerCommand) -> Arc<Self> {
        let similar = SimilarityService::with_limit(store.clone(), opts.similar.count)
            .normalizer(Normalizer::new(opts.geometry.bbox_threshold));
        Arc::new(AppState { store, similar })
    }
}
