use std::collections::HashSet;

use anyhow::Result;
use chrono::DateTime;
use faceseek::feed::{FeedController, FeedStatus};
use faceseek::model::{Collection, Cursor, Document, Face, Record, RecordFilter};
use faceseek::store::{CollectionStore, MemStore, Page};
use rstest::rstest;

fn doc(id: &str, millis: i64) -> Record {
    Record::Document(Document {
        id: id.to_string(),
        ingested_at: DateTime::from_timestamp_millis(millis).unwrap(),
        title: format!("文档 {}", id),
        original_url: None,
        storage_path: None,
        content: None,
        ocr: None,
    })
}

fn face(id: &str, millis: i64) -> Record {
    Record::Face(Face {
        id: id.to_string(),
        ingested_at: DateTime::from_timestamp_millis(millis).unwrap(),
        parent_image_id: Some("img1".to_string()),
        det_score: None,
        bbox: [0.1, 0.1, 0.4, 0.4],
        bbox_convention: None,
        embedding: None,
    })
}

fn store_with_docs(n: usize) -> MemStore {
    MemStore::with_records((0..n).map(|i| doc(&format!("d{:03}", i), 1000 + i as i64)))
}

/// 总是失败的存储，用于验证错误路径
struct FailingStore;

impl CollectionStore for FailingStore {
    async fn query_page(
        &self,
        _filter: &RecordFilter,
        _cursor: Option<&Cursor>,
        _page_size: usize,
    ) -> Result<Page> {
        anyhow::bail!("存储故障")
    }

    async fn get_record(&self, _collection: Collection, _id: &str) -> Result<Option<Record>> {
        anyhow::bail!("存储故障")
    }

    async fn nearest_faces(&self, _embedding: &[f32], _limit: usize) -> Result<Vec<(Face, f32)>> {
        anyhow::bail!("存储故障")
    }
}

#[rstest]
#[case::feed_page(20)]
#[case::grid_page(48)]
#[case::odd_page(7)]
#[tokio::test]
async fn test_pages_deduped_and_sorted(#[case] page_size: usize) {
    let store = store_with_docs(45);
    let mut controller = FeedController::with_page_size(
        RecordFilter::collection(Collection::Documents),
        page_size,
    );

    while controller.has_more() {
        controller.next_page(&store).await.unwrap();
    }
    assert_eq!(controller.items().len(), 45);

    // 无重复
    let ids: HashSet<_> = controller.items().iter().map(|r| r.id().to_string()).collect();
    assert_eq!(ids.len(), 45);
    // 入库时间严格降序
    let times: Vec<_> = controller.items().iter().map(|r| r.ingested_at()).collect();
    assert!(times.windows(2).all(|w| w[0] > w[1]));

    // 窗口终止后不再发请求
    assert_eq!(controller.next_page(&store).await.unwrap(), 0);
}

#[tokio::test]
async fn test_has_more_iff_short_page() {
    // 总量正好是页大小的整数倍
    let store = store_with_docs(40);
    let mut controller =
        FeedController::with_page_size(RecordFilter::collection(Collection::Documents), 20);

    controller.next_page(&store).await.unwrap();
    assert!(controller.has_more());
    controller.next_page(&store).await.unwrap();
    // 第二页也是满页，只能等下一次空页来宣告终止
    assert!(controller.has_more());
    assert_eq!(controller.next_page(&store).await.unwrap(), 0);
    assert!(!controller.has_more());
    assert_eq!(controller.items().len(), 40);
}

#[tokio::test]
async fn test_double_trigger_appends_single_page() {
    let store = store_with_docs(45);
    let mut controller =
        FeedController::with_page_size(RecordFilter::collection(Collection::Documents), 20);

    // 连续两次触发，只有第一次登记成功
    let request = controller.begin_page().unwrap();
    assert!(controller.begin_page().is_none());
    assert_eq!(controller.status(), FeedStatus::Loading);

    let page = store
        .query_page(request.filter(), request.cursor(), request.page_size())
        .await
        .unwrap();
    assert!(controller.commit_page(&request, page));
    assert_eq!(controller.items().len(), 20);
    assert_eq!(controller.status(), FeedStatus::Loaded);
}

#[tokio::test]
async fn test_filter_switch_resets_window_and_discards_stale() {
    let store = store_with_docs(30);
    for i in 0..5 {
        store.insert(face(&format!("f{}", i), 5000 + i));
    }

    let mut controller =
        FeedController::with_page_size(RecordFilter::collection(Collection::Documents), 20);
    controller.next_page(&store).await.unwrap();
    assert_eq!(controller.items().len(), 20);

    // 旧过滤器的请求还在途中，此时切换过滤器
    let stale = controller.begin_page().unwrap();
    let stale_page =
        store.query_page(stale.filter(), stale.cursor(), stale.page_size()).await.unwrap();
    controller.set_filter(RecordFilter::collection(Collection::Faces));

    // 切换后窗口立即清空，游标作废
    assert!(controller.items().is_empty());
    assert!(controller.cursor().is_none());
    assert_eq!(controller.status(), FeedStatus::Idle);

    // 迟到的响应被丢弃
    assert!(!controller.commit_page(&stale, stale_page));
    assert!(controller.items().is_empty());

    // 新过滤器正常取页，旧过滤器的记录不再出现
    controller.next_page(&store).await.unwrap();
    assert_eq!(controller.items().len(), 5);
    assert!(controller.items().iter().all(|r| r.collection() == Collection::Faces));
}

#[tokio::test]
async fn test_error_keeps_window_and_allows_retry() {
    let store = store_with_docs(30);
    let mut controller =
        FeedController::with_page_size(RecordFilter::collection(Collection::Documents), 20);

    controller.next_page(&store).await.unwrap();
    let cursor = controller.cursor().cloned();

    // 查询失败：窗口和游标原样保留
    assert!(controller.next_page(&FailingStore).await.is_err());
    assert_eq!(controller.status(), FeedStatus::Error);
    assert_eq!(controller.items().len(), 20);
    assert_eq!(controller.cursor(), cursor.as_ref());

    // 显式重试后恢复
    let appended = controller.next_page(&store).await.unwrap();
    assert_eq!(appended, 10);
    assert_eq!(controller.status(), FeedStatus::Loaded);
    assert_eq!(controller.items().len(), 30);
}

#[tokio::test]
async fn test_stale_error_does_not_poison_new_filter() {
    let store = store_with_docs(10);
    let mut controller =
        FeedController::with_page_size(RecordFilter::collection(Collection::Documents), 20);

    let stale = controller.begin_page().unwrap();
    controller.set_filter(RecordFilter::collection(Collection::Images));
    controller.fail_page(&stale, &anyhow::anyhow!("存储故障"));

    // 旧请求的失败不影响新过滤器的状态
    assert_eq!(controller.status(), FeedStatus::Idle);
    assert_eq!(controller.next_page(&store).await.unwrap(), 0);
}

#[tokio::test]
async fn test_empty_collection_single_round() {
    let store = MemStore::new();
    let mut controller =
        FeedController::with_page_size(RecordFilter::collection(Collection::Faces), 20);

    assert_eq!(controller.next_page(&store).await.unwrap(), 0);
    assert!(controller.items().is_empty());
    assert!(!controller.has_more());
    assert_eq!(controller.status(), FeedStatus::Loaded);
}
