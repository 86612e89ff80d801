//! 游标分页的信息流控制器
//!
//! 一个控制器实例服务一个视图，独占自己的结果窗口；
//! 状态机收敛了原型里分散在多个响应式触发点上的取页逻辑：
//! 同一时刻最多一个在途请求，过滤器切换原子地清空窗口，
//! 迟到的旧过滤器响应按代号丢弃

use anyhow::Result;
use log::{debug, warn};

use crate::model::{Cursor, Record, RecordFilter};
use crate::store::{CollectionStore, Page};

/// 信息流的每页记录数
pub const FEED_PAGE_SIZE: usize = 20;
/// 人脸网格视图的每页记录数
pub const FACE_GRID_PAGE_SIZE: usize = 48;

/// 控制器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// 尚未发起首次请求，或刚切换过滤器
    Idle,
    /// 有一个在途请求
    Loading,
    /// 最近一次请求成功
    Loaded,
    /// 最近一次请求失败，窗口保持失败前的内容，等待调用方显式重试
    Error,
}

/// 一次已登记的取页请求
///
/// 由 [`FeedController::begin_page`] 发出，响应到达后凭它提交；
/// epoch 标记请求属于哪一代过滤器
#[derive(Debug, Clone)]
pub struct PageRequest {
    filter: RecordFilter,
    cursor: Option<Cursor>,
    page_size: usize,
    epoch: u64,
    reset: bool,
}

impl PageRequest {
    pub fn filter(&self) -> &RecordFilter {
        &self.filter
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

/// 信息流控制器
pub struct FeedController {
    filter: RecordFilter,
    items: Vec<Record>,
    cursor: Option<Cursor>,
    has_more: bool,
    status: FeedStatus,
    page_size: usize,
    epoch: u64,
}

impl FeedController {
    pub fn new(filter: RecordFilter) -> Self {
        Self::with_page_size(filter, FEED_PAGE_SIZE)
    }

    pub fn with_page_size(filter: RecordFilter, page_size: usize) -> Self {
        Self {
            filter,
            items: vec![],
            cursor: None,
            has_more: true,
            status: FeedStatus::Idle,
            page_size,
            epoch: 0,
        }
    }

    /// 当前窗口中累积的记录，查询顺序
    pub fn items(&self) -> &[Record] {
        &self.items
    }

    pub fn status(&self) -> FeedStatus {
        self.status
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn filter(&self) -> &RecordFilter {
        &self.filter
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    /// 切换过滤器
    ///
    /// 原子地清空窗口、作废游标并递增代号，旧过滤器的记录从这一刻起
    /// 不再可见，迟到的响应会在提交时被丢弃
    pub fn set_filter(&mut self, filter: RecordFilter) {
        debug!("切换过滤器: {:?} -> {:?}", self.filter, filter);
        self.filter = filter;
        self.items.clear();
        self.cursor = None;
        self.has_more = true;
        self.status = FeedStatus::Idle;
        self.epoch += 1;
    }

    /// 登记一次取页请求
    ///
    /// 守卫条件：没有在途请求、`has_more` 为真，且要么是无游标的首次
    /// 拉取，要么持有上一页的游标。不满足时返回 None，重复触发
    /// 「接近列表尾部」信号不会产生并发请求；失败后的再次调用
    /// 即为显式重试
    pub fn begin_page(&mut self) -> Option<PageRequest> {
        if self.status == FeedStatus::Loading || !self.has_more {
            return None;
        }
        let reset = self.items.is_empty() && self.cursor.is_none();
        if !reset && self.cursor.is_none() {
            return None;
        }
        self.status = FeedStatus::Loading;
        Some(PageRequest {
            filter: self.filter.clone(),
            cursor: self.cursor.clone(),
            page_size: self.page_size,
            epoch: self.epoch,
            reset,
        })
    }

    /// 提交一页成功的响应，返回是否被采纳
    ///
    /// 响应的代号与当前过滤器不一致时整页丢弃
    pub fn commit_page(&mut self, request: &PageRequest, page: Page) -> bool {
        if request.epoch != self.epoch {
            debug!("丢弃过期过滤器的分页响应: epoch {} != {}", request.epoch, self.epoch);
            return false;
        }
        self.has_more = page.records.len() == request.page_size;
        if request.reset {
            self.items = page.records;
        } else {
            self.items.extend(page.records);
        }
        if let Some(cursor) = page.next_cursor {
            self.cursor = Some(cursor);
        }
        self.status = FeedStatus::Loaded;
        true
    }

    /// 登记一次失败的响应
    ///
    /// 窗口和游标保持不变，错误记录日志后由调用方决定是否重试
    pub fn fail_page(&mut self, request: &PageRequest, error: &anyhow::Error) {
        if request.epoch != self.epoch {
            debug!("忽略过期过滤器的查询失败: {:#}", error);
            return;
        }
        warn!("分页查询失败: {:#}", error);
        self.status = FeedStatus::Error;
    }

    /// 取下一页：登记请求、查询存储、提交响应
    ///
    /// 守卫拒绝时返回 Ok(0)；查询失败时窗口不变并把错误传回调用方
    pub async fn next_page<S: CollectionStore>(&mut self, store: &S) -> Result<usize> {
        let Some(request) = self.begin_page() else {
            return Ok(0);
        };
        match store.query_page(&request.filter, request.cursor.as_ref(), request.page_size).await
        {
            Ok(page) => {
                let count = page.records.len();
                if self.commit_page(&request, page) { Ok(count) } else { Ok(0) }
            }
            Err(error) => {
                self.fail_page(&request, &error);
                Err(error)
            }
        }
    }
}
