//! 包围框归一化与视口映射
//!
//! 全部为纯函数：同样的输入永远得到同样的输出，可以在图片加载、
//! 容器尺寸变化等任意时机反复调用

use serde::Serialize;

use crate::model::{BoxConvention, Face};

/// 坐标约定启发式判定的默认阈值
///
/// 四个分量都不超过该值时视为比例坐标，略超过 1.0 的浮点误差也会被覆盖
pub const DEFAULT_BBOX_THRESHOLD: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum GeometryError {
    /// 原图尺寸未知，像素坐标暂时无法归一化；调用方应在图片加载后重试
    #[error("原图尺寸未知，无法归一化像素坐标")]
    Indeterminate,
    /// 归一化后宽或高不为正，这样的包围框跳过渲染而不是让调用方崩溃
    #[error("非法包围框: {0:?}")]
    Invalid([f64; 4]),
}

/// 归一化后的包围框，四个分量都在 [0, 1] 内且 x2 > x1、y2 > y1
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizedBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl NormalizedBox {
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }
}

/// 人脸裁剪缩放参数
///
/// 以容器宽度的百分比表达，和容器的像素尺寸无关
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CropTransform {
    /// 原图需要缩放到的宽度百分比
    pub width_pct: f64,
    /// 水平平移量，原图宽度的比例
    pub translate_x: f64,
    /// 垂直平移量，原图高度的比例
    pub translate_y: f64,
}

/// 覆盖在当前渲染尺寸上的高亮矩形，单位为像素
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverlayRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// 包围框归一化器
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    threshold: f64,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self { threshold: DEFAULT_BBOX_THRESHOLD }
    }
}

impl Normalizer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// 把任一约定的包围框归一化到 [0, 1] 比例坐标
    ///
    /// 显式的约定标记优先；没有标记时走阈值启发式，仍无法判断且
    /// 原图尺寸未知则返回 [`GeometryError::Indeterminate`]
    pub fn normalize(
        &self,
        bbox: [f64; 4],
        convention: Option<BoxConvention>,
        natural: Option<(f64, f64)>,
    ) -> Result<NormalizedBox, GeometryError> {
        let scaled = match convention {
            Some(BoxConvention::Normalized) => bbox,
            Some(BoxConvention::Pixel) => Self::divide(bbox, natural)?,
            None => {
                if bbox.iter().all(|v| *v <= self.threshold) {
                    bbox
                } else {
                    Self::divide(bbox, natural)?
                }
            }
        };

        let clamp = |v: f64| v.clamp(0.0, 1.0);
        let normalized = NormalizedBox {
            x1: clamp(scaled[0]),
            y1: clamp(scaled[1]),
            x2: clamp(scaled[2]),
            y2: clamp(scaled[3]),
        };
        if normalized.width() <= 0.0 || normalized.height() <= 0.0 {
            return Err(GeometryError::Invalid(bbox));
        }
        Ok(normalized)
    }

    /// 按人脸记录自带的约定标记归一化
    pub fn normalize_face(
        &self,
        face: &Face,
        natural: Option<(f64, f64)>,
    ) -> Result<NormalizedBox, GeometryError> {
        self.normalize(face.bbox, face.bbox_convention, natural)
    }

    fn divide(bbox: [f64; 4], natural: Option<(f64, f64)>) -> Result<[f64; 4], GeometryError> {
        match natural {
            Some((w, h)) if w > 0.0 && h > 0.0 => {
                Ok([bbox[0] / w, bbox[1] / h, bbox[2] / w, bbox[3] / h])
            }
            _ => Err(GeometryError::Indeterminate),
        }
    }
}

/// 计算人脸居中裁剪的缩放与平移
///
/// 约束为「人脸中心映射到容器中心，人脸宽度映射到容器宽度的 1/zoom」，
/// zoom > 1 表示在人脸周围保留上下文，1.0 表示人脸恰好填满容器
pub fn crop_transform(bbox: &NormalizedBox, zoom: f64) -> CropTransform {
    let w = bbox.width();
    let h = bbox.height();
    CropTransform {
        width_pct: (1.0 / w) * 100.0 / zoom,
        translate_x: -bbox.x1 + 0.5 * w * (zoom - 1.0),
        translate_y: -bbox.y1 + 0.5 * h * (zoom - 1.0),
    }
}

/// 按容器当前渲染尺寸换算高亮矩形
pub fn overlay_rect(bbox: &NormalizedBox, container_w: f64, container_h: f64) -> OverlayRect {
    OverlayRect {
        left: bbox.x1 * container_w,
        top: bbox.y1 * container_h,
        width: bbox.width() * container_w,
        height: bbox.height() * container_h,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < EPS, "{} != {}", a, b);
    }

    #[test]
    fn test_normalized_box_passthrough() {
        let normalizer = Normalizer::default();
        let b = normalizer.normalize([0.1, 0.1, 0.5, 0.5], None, None).unwrap();
        assert_eq!(b, NormalizedBox { x1: 0.1, y1: 0.1, x2: 0.5, y2: 0.5 });
    }

    #[test]
    fn test_pixel_box_divided_by_natural_size() {
        let normalizer = Normalizer::default();
        let b = normalizer
            .normalize([100.0, 100.0, 400.0, 400.0], None, Some((800.0, 800.0)))
            .unwrap();
        assert_eq!(b, NormalizedBox { x1: 0.125, y1: 0.125, x2: 0.5, y2: 0.5 });
    }

    #[test]
    fn test_pixel_box_without_dims_is_indeterminate() {
        let normalizer = Normalizer::default();
        let r = normalizer.normalize([100.0, 100.0, 400.0, 400.0], None, None);
        assert_eq!(r, Err(GeometryError::Indeterminate));
    }

    #[test]
    fn test_explicit_convention_beats_heuristic() {
        let normalizer = Normalizer::default();
        // 启发式会把 [0.5, 0.5, 1.0, 1.0] 当作比例坐标，显式标记则强制按像素换算
        let b = normalizer
            .normalize([0.5, 0.5, 1.0, 1.0], Some(BoxConvention::Pixel), Some((2.0, 2.0)))
            .unwrap();
        assert_eq!(b, NormalizedBox { x1: 0.25, y1: 0.25, x2: 0.5, y2: 0.5 });
        // 没有尺寸时显式像素标记同样挂起
        let r = normalizer.normalize([0.5, 0.5, 1.0, 1.0], Some(BoxConvention::Pixel), None);
        assert_eq!(r, Err(GeometryError::Indeterminate));
    }

    #[test]
    fn test_slightly_over_one_is_clamped() {
        let normalizer = Normalizer::default();
        let b = normalizer.normalize([0.2, 0.2, 1.004, 1.01], None, None).unwrap();
        assert_close(b.x2, 1.0);
        assert_close(b.y2, 1.0);
    }

    #[test]
    fn test_zero_width_box_rejected() {
        let normalizer = Normalizer::default();
        let r = normalizer.normalize([0.5, 0.5, 0.5, 0.9], None, None);
        assert_eq!(r, Err(GeometryError::Invalid([0.5, 0.5, 0.5, 0.9])));
    }

    #[test]
    fn test_inverted_box_rejected() {
        let normalizer = Normalizer::default();
        let r = normalizer.normalize([0.6, 0.6, 0.2, 0.9], None, None);
        assert!(matches!(r, Err(GeometryError::Invalid(_))));
    }

    #[test]
    fn test_configurable_threshold() {
        // 阈值降到 0.5 后，[0.6, ...] 被当作像素坐标
        let normalizer = Normalizer::new(0.5);
        let r = normalizer.normalize([0.2, 0.2, 0.6, 0.6], None, None);
        assert_eq!(r, Err(GeometryError::Indeterminate));
    }

    #[test]
    fn test_crop_transform_exact_values() {
        let b = NormalizedBox { x1: 0.1, y1: 0.1, x2: 0.3, y2: 0.3 };
        let t = crop_transform(&b, 1.5);
        assert_close(t.width_pct, 1000.0 / 3.0);
        assert_close(t.translate_x, -0.05);
        assert_close(t.translate_y, -0.05);
    }

    #[test]
    fn test_crop_transform_zoom_one_fills_container() {
        let b = NormalizedBox { x1: 0.25, y1: 0.5, x2: 0.75, y2: 0.75 };
        let t = crop_transform(&b, 1.0);
        assert_close(t.width_pct, 200.0);
        assert_close(t.translate_x, -0.25);
        assert_close(t.translate_y, -0.5);
    }

    #[test]
    fn test_mappings_are_idempotent() {
        let b = NormalizedBox { x1: 0.1, y1: 0.2, x2: 0.4, y2: 0.8 };
        assert_eq!(crop_transform(&b, 1.5), crop_transform(&b, 1.5));
        assert_eq!(overlay_rect(&b, 320.0, 240.0), overlay_rect(&b, 320.0, 240.0));
    }

    #[test]
    fn test_overlay_rect_scales_to_container() {
        let b = NormalizedBox { x1: 0.1, y1: 0.2, x2: 0.4, y2: 0.8 };
        let r = overlay_rect(&b, 200.0, 100.0);
        assert_close(r.left, 20.0);
        assert_close(r.top, 20.0);
        assert_close(r.width, 60.0);
        assert_close(r.height, 60.0);
    }
}
