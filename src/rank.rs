//! 余弦相似度与有界 top-k 选择
//!
//! 存储层的最近邻查询算子在此之上实现

/// 计算两个向量的余弦相似度
///
/// 维数不一致、向量为空或任一范数为零时返回 None，调用方按记录跳过
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x = f64::from(x);
        let y = f64::from(y);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some((dot / denom) as f32)
}

/// 维护分数最高的 k 个元素，内部按分数降序排列
pub struct TopK<T> {
    k: usize,
    entries: Vec<(T, f32)>,
}

impl<T> TopK<T> {
    pub fn new(k: usize) -> Self {
        Self { k, entries: Vec::with_capacity(k.saturating_add(1)) }
    }

    pub fn push(&mut self, item: T, score: f32) {
        if self.k == 0 {
            return;
        }
        if self.entries.len() == self.k {
            match self.entries.last() {
                Some((_, worst)) if score <= *worst => return,
                _ => {}
            }
        }
        let pos =
            self.entries.iter().position(|(_, s)| score > *s).unwrap_or(self.entries.len());
        self.entries.insert(pos, (item, score));
        self.entries.truncate(self.k);
    }

    /// 按分数降序返回
    pub fn into_vec(self) -> Vec<(T, f32)> {
        self.entries
    }
}

/// 对一个迭代器做有界 top-k，按分数降序返回
pub fn top_k<T>(items: impl IntoIterator<Item = (T, f32)>, k: usize) -> Vec<(T, f32)> {
    let mut best = TopK::new(k);
    for (item, score) in items {
        best.push(item, score);
    }
    best.into_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![0.3f32; 512];
        let s = cosine_similarity(&v, &v).unwrap();
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        let s = cosine_similarity(&a, &b).unwrap();
        assert!(s.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = [1.0, 2.0];
        let b = [-1.0, -2.0];
        let s = cosine_similarity(&a, &b).unwrap();
        assert!((s + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_dimension_mismatch() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), None);
        assert_eq!(cosine_similarity(&[], &[]), None);
    }

    #[test]
    fn test_cosine_zero_norm() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), None);
    }

    #[test]
    fn test_top_k_orders_descending() {
        let items = vec![("a", 0.1), ("b", 0.9), ("c", 0.5), ("d", 0.7)];
        let best = top_k(items, 3);
        let ids: Vec<_> = best.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, ["b", "d", "c"]);
    }

    #[test]
    fn test_top_k_bounded() {
        let items = (0..100).map(|i| (i, i as f32));
        let best = top_k(items, 5);
        assert_eq!(best.len(), 5);
        assert_eq!(best[0].0, 99);
        assert_eq!(best[4].0, 95);
    }

    #[test]
    fn test_top_k_fewer_items_than_k() {
        let best = top_k(vec![("a", 0.2), ("b", 0.4)], 10);
        assert_eq!(best.len(), 2);
        assert_eq!(best[0].0, "b");
    }

    #[test]
    fn test_top_k_zero() {
        assert!(top_k(vec![("a", 0.2)], 0).is_empty());
    }
}
