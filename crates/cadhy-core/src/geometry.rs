//! 二维几何图元与基础算法
//!
//! 提供捕捉和填充渲染共用的纯函数：
//! - 距离与中点
//! - 线段-线段交点
//! - 点到线段的最近点
//! - 点在多边形内判断（射线法）

use crate::math::{BoundingBox2, Point2, EPSILON};
use serde::{Deserialize, Serialize};

/// 投影视图中的线型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineType {
    /// 可见锐边（实线）
    VisibleSharp,
    /// 隐藏锐边（虚线）
    HiddenSharp,
    /// 可见光滑过渡边
    VisibleSmooth,
    /// 隐藏光滑过渡边
    HiddenSmooth,
    /// 可见轮廓线
    VisibleOutline,
    /// 隐藏轮廓线
    HiddenOutline,
    /// 剖切线
    SectionCut,
    /// 中心线（点划线，构造几何）
    Centerline,
}

impl LineType {
    /// 是否为可见线
    pub fn is_visible(&self) -> bool {
        matches!(
            self,
            LineType::VisibleSharp
                | LineType::VisibleSmooth
                | LineType::VisibleOutline
                | LineType::SectionCut
                | LineType::Centerline
        )
    }

    /// 是否参与对象捕捉
    ///
    /// 隐藏线和中心线（构造几何）不参与捕捉。
    pub fn is_snappable(&self) -> bool {
        self.is_visible() && *self != LineType::Centerline
    }
}

/// 二维线段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line2D {
    pub start: Point2,
    pub end: Point2,
    pub line_type: LineType,
}

impl Line2D {
    pub fn new(start: Point2, end: Point2, line_type: LineType) -> Self {
        Self {
            start,
            end,
            line_type,
        }
    }

    /// 可见锐边线段
    pub fn visible(start: Point2, end: Point2) -> Self {
        Self::new(start, end, LineType::VisibleSharp)
    }

    pub fn length(&self) -> f64 {
        distance(&self.start, &self.end)
    }

    pub fn midpoint(&self) -> Point2 {
        midpoint(&self.start, &self.end)
    }

    /// 是否为退化（零长度）线段
    pub fn is_degenerate(&self, tolerance: f64) -> bool {
        self.length() < tolerance
    }
}

/// 点到线段的最近点查询结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPoint {
    /// 线段上的最近点
    pub point: Point2,
    /// 查询点到最近点的距离
    pub distance: f64,
    /// 最近点的线段参数，范围 [0, 1]
    pub t: f64,
}

/// 欧氏距离
pub fn distance(a: &Point2, b: &Point2) -> f64 {
    (b - a).norm()
}

pub fn midpoint(a: &Point2, b: &Point2) -> Point2 {
    nalgebra::center(a, b)
}

/// 线段 p1-p2 与线段 p3-p4 的交点
///
/// 平行或共线（行列式绝对值小于 1e-10）返回 `None`；
/// 两条无限直线相交但交点不在两条线段范围内时同样返回 `None`。
pub fn line_intersection(p1: &Point2, p2: &Point2, p3: &Point2, p4: &Point2) -> Option<Point2> {
    let denom = (p1.x - p2.x) * (p3.y - p4.y) - (p1.y - p2.y) * (p3.x - p4.x);
    if denom.abs() < EPSILON {
        return None;
    }

    let t = ((p1.x - p3.x) * (p3.y - p4.y) - (p1.y - p3.y) * (p3.x - p4.x)) / denom;
    let u = -((p1.x - p2.x) * (p1.y - p3.y) - (p1.y - p2.y) * (p1.x - p3.x)) / denom;

    if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
        Some(Point2::new(
            p1.x + t * (p2.x - p1.x),
            p1.y + t * (p2.y - p1.y),
        ))
    } else {
        None
    }
}

/// 点到线段的最近点，投影参数钳制到 [0, 1]
pub fn closest_point_on_line(point: &Point2, start: &Point2, end: &Point2) -> ClosestPoint {
    let v = end - start;
    let len_sq = v.norm_squared();

    // 零长度线段退化为起点
    if len_sq < EPSILON {
        return ClosestPoint {
            point: *start,
            distance: distance(point, start),
            t: 0.0,
        };
    }

    let t = ((point - start).dot(&v) / len_sq).clamp(0.0, 1.0);
    let closest = *start + v * t;
    ClosestPoint {
        point: closest,
        distance: distance(point, &closest),
        t,
    }
}

/// 射线法判断点是否在多边形内（奇偶规则）
///
/// 多边形按顶点顺序隐式闭合，少于3个顶点时总是返回 `false`。
pub fn point_in_polygon(point: &Point2, polygon: &[Point2]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (&polygon[i], &polygon[j]);
        if (pi.y > point.y) != (pj.y > point.y)
            && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// 多边形有向面积（逆时针为正）
pub fn polygon_area(polygon: &[Point2]) -> f64 {
    if polygon.len() < 3 {
        return 0.0;
    }

    let n = polygon.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let (a, b) = (&polygon[i], &polygon[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice / 2.0
}

pub fn polygon_bounds(polygon: &[Point2]) -> Option<BoundingBox2> {
    BoundingBox2::from_points(polygon.iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance_and_midpoint() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(3.0, 4.0);
        assert_relative_eq!(distance(&a, &b), 5.0);
        assert_eq!(midpoint(&a, &b), Point2::new(1.5, 2.0));
    }

    #[test]
    fn test_crossing_segments_intersect() {
        let p = line_intersection(
            &Point2::new(0.0, 0.0),
            &Point2::new(2.0, 2.0),
            &Point2::new(0.0, 2.0),
            &Point2::new(2.0, 0.0),
        )
        .unwrap();
        assert_relative_eq!(p.x, 1.0);
        assert_relative_eq!(p.y, 1.0);
    }

    #[test]
    fn test_parallel_segments_do_not_intersect() {
        let p = line_intersection(
            &Point2::new(0.0, 0.0),
            &Point2::new(1.0, 0.0),
            &Point2::new(0.0, 1.0),
            &Point2::new(1.0, 1.0),
        );
        assert!(p.is_none());
    }

    #[test]
    fn test_intersection_outside_segment_bounds() {
        // 无限直线在 (3, 0) 相交，但不在第一条线段上
        let p = line_intersection(
            &Point2::new(0.0, 0.0),
            &Point2::new(1.0, 0.0),
            &Point2::new(3.0, -1.0),
            &Point2::new(3.0, 1.0),
        );
        assert!(p.is_none());
    }

    #[test]
    fn test_closest_point_clamps() {
        let start = Point2::new(0.0, 0.0);
        let end = Point2::new(10.0, 0.0);

        let mid = closest_point_on_line(&Point2::new(5.0, 5.0), &start, &end);
        assert_relative_eq!(mid.point.x, 5.0);
        assert_relative_eq!(mid.distance, 5.0);
        assert_relative_eq!(mid.t, 0.5);

        let before = closest_point_on_line(&Point2::new(-5.0, 0.0), &start, &end);
        assert_eq!(before.point, start);
        assert_relative_eq!(before.t, 0.0);

        let after = closest_point_on_line(&Point2::new(12.0, 0.0), &start, &end);
        assert_eq!(after.point, end);
        assert_relative_eq!(after.t, 1.0);
    }

    #[test]
    fn test_closest_point_degenerate_segment() {
        let p = Point2::new(2.0, 2.0);
        let result = closest_point_on_line(&Point2::new(5.0, 6.0), &p, &p);
        assert_eq!(result.point, p);
        assert_relative_eq!(result.distance, 5.0);
        assert_relative_eq!(result.t, 0.0);
    }

    #[test]
    fn test_point_in_polygon() {
        let square = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        assert!(point_in_polygon(&Point2::new(5.0, 5.0), &square));
        assert!(!point_in_polygon(&Point2::new(15.0, 5.0), &square));
        assert!(!point_in_polygon(&Point2::new(5.0, 5.0), &square[..2]));
        assert_relative_eq!(polygon_area(&square), 100.0);
    }

    #[test]
    fn test_snappable_line_types() {
        assert!(LineType::VisibleSharp.is_snappable());
        assert!(LineType::SectionCut.is_snappable());
        assert!(!LineType::HiddenSharp.is_snappable());
        assert!(LineType::Centerline.is_visible());
        assert!(!LineType::Centerline.is_snappable());
    }
}
