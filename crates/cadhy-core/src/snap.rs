//! 二维图纸对象捕捉
//!
//! 针对投影视图中的线段集合，实现绘图常用的捕捉：
//! - 端点 (Endpoint)
//! - 中点 (Midpoint)
//! - 交点 (Intersection)
//! - 最近点 (Nearest，无离散候选时的回退)
//!
//! 候选点先由 [`extract_snap_points`] 预计算并去重，
//! 再由 [`find_nearest_snap_point`] 按光标位置解析。

use crate::geometry::{closest_point_on_line, distance, line_intersection, Line2D};
use crate::math::Point2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// 去重键的坐标精度（小数点后4位）
const KEY_SCALE: f64 = 1e4;

/// 捕捉类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SnapType {
    /// 端点捕捉
    Endpoint,
    /// 中点捕捉
    Midpoint,
    /// 交点捕捉
    Intersection,
    /// 最近点捕捉
    Nearest,
}

impl SnapType {
    /// 优先级，数值越小越优先
    pub fn priority(&self) -> u8 {
        match self {
            SnapType::Intersection => 0,
            SnapType::Endpoint => 1,
            SnapType::Midpoint => 2,
            SnapType::Nearest => 10,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SnapType::Endpoint => "端点",
            SnapType::Midpoint => "中点",
            SnapType::Intersection => "交点",
            SnapType::Nearest => "最近点",
        }
    }

    /// 获取捕捉类型的快捷键
    pub fn shortcut(&self) -> &'static str {
        match self {
            SnapType::Endpoint => "END",
            SnapType::Midpoint => "MID",
            SnapType::Intersection => "INT",
            SnapType::Nearest => "NEA",
        }
    }
}

/// 捕捉点
#[derive(Debug, Clone, PartialEq)]
pub struct SnapPoint {
    /// 捕捉到的图纸坐标
    pub point: Point2,
    pub snap_type: SnapType,
    pub priority: u8,
    /// 来源线段在输入切片中的索引
    pub source_line: Option<usize>,
    /// 交点的第二条线段索引
    pub second_line: Option<usize>,
}

impl SnapPoint {
    pub fn new(point: Point2, snap_type: SnapType, source_line: Option<usize>) -> Self {
        Self {
            point,
            snap_type,
            priority: snap_type.priority(),
            source_line,
            second_line: None,
        }
    }

    fn intersection(point: Point2, first: usize, second: usize) -> Self {
        Self {
            second_line: Some(second),
            ..Self::new(point, SnapType::Intersection, Some(first))
        }
    }
}

/// 二维捕捉配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftSnapConfig {
    pub endpoints: bool,
    pub midpoints: bool,
    pub intersections: bool,
    /// 无离散候选时回退到线上最近点
    pub nearest: bool,
    /// 捕捉容差（图纸单位），距离必须严格小于该值
    pub tolerance: f64,
}

impl Default for DraftSnapConfig {
    fn default() -> Self {
        Self {
            endpoints: true,
            midpoints: true,
            intersections: true,
            nearest: true,
            tolerance: 10.0,
        }
    }
}

/// 去重键的命名空间：中点单独成组，交点与端点共用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum KeySpace {
    Point,
    Midpoint,
}

fn snap_key(space: KeySpace, p: &Point2) -> (KeySpace, i64, i64) {
    // 四舍五入后的整数键，-0.0 与 0.0 映射到同一个键
    (
        space,
        (p.x * KEY_SCALE).round() as i64,
        (p.y * KEY_SCALE).round() as i64,
    )
}

/// 从线段集合提取去重后的候选捕捉点
///
/// 只有可捕捉线型参与计算。输出顺序：按线段顺序的端点与中点，随后是交点。
pub fn extract_snap_points(lines: &[Line2D], config: &DraftSnapConfig) -> Vec<SnapPoint> {
    let visible: Vec<(usize, &Line2D)> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.line_type.is_snappable())
        .collect();

    let mut points = Vec::new();
    let mut seen = HashSet::new();

    for &(index, line) in &visible {
        if config.endpoints {
            for p in [line.start, line.end] {
                if seen.insert(snap_key(KeySpace::Point, &p)) {
                    points.push(SnapPoint::new(p, SnapType::Endpoint, Some(index)));
                }
            }
        }

        if config.midpoints {
            let mid = line.midpoint();
            if seen.insert(snap_key(KeySpace::Midpoint, &mid)) {
                points.push(SnapPoint::new(mid, SnapType::Midpoint, Some(index)));
            }
        }
    }

    if config.intersections {
        for (a, &(i, first)) in visible.iter().enumerate() {
            for &(j, second) in &visible[a + 1..] {
                let Some(p) = line_intersection(&first.start, &first.end, &second.start, &second.end)
                else {
                    continue;
                };
                if seen.insert(snap_key(KeySpace::Point, &p)) {
                    points.push(SnapPoint::intersection(p, i, j));
                }
            }
        }
    }

    debug!(
        lines = lines.len(),
        visible = visible.len(),
        candidates = points.len(),
        "extracted draft snap points"
    );
    points
}

/// 解析光标处的最佳捕捉点
///
/// 在预计算候选中取距离严格小于容差的最近者，距离相同时先出现者胜出；
/// 没有候选时若启用 `nearest`，回退到可捕捉线段上的最近点。
pub fn find_nearest_snap_point(
    cursor: &Point2,
    snap_points: &[SnapPoint],
    lines: &[Line2D],
    config: &DraftSnapConfig,
) -> Option<SnapPoint> {
    let mut best: Option<&SnapPoint> = None;
    let mut best_distance = config.tolerance;

    for candidate in snap_points {
        let d = distance(cursor, &candidate.point);
        if d < best_distance {
            best_distance = d;
            best = Some(candidate);
        }
    }

    if let Some(found) = best {
        return Some(found.clone());
    }

    if !config.nearest {
        return None;
    }

    let mut nearest: Option<SnapPoint> = None;
    for (index, line) in lines.iter().enumerate() {
        if !line.line_type.is_snappable() {
            continue;
        }
        let closest = closest_point_on_line(cursor, &line.start, &line.end);
        if closest.distance < best_distance {
            best_distance = closest.distance;
            nearest = Some(SnapPoint::new(closest.point, SnapType::Nearest, Some(index)));
        }
    }
    nearest
}

/// 二维捕捉器
///
/// 持有配置和缓存的候选点；线段集合变化后调用 [`DraftSnapper::rebuild`]。
#[derive(Debug, Clone, Default)]
pub struct DraftSnapper {
    config: DraftSnapConfig,
    candidates: Vec<SnapPoint>,
}

impl DraftSnapper {
    pub fn new(config: DraftSnapConfig) -> Self {
        Self {
            config,
            candidates: Vec::with_capacity(64),
        }
    }

    pub fn config(&self) -> &DraftSnapConfig {
        &self.config
    }

    /// 替换配置，候选点需要按新配置重建
    pub fn set_config(&mut self, config: DraftSnapConfig, lines: &[Line2D]) {
        self.config = config;
        self.rebuild(lines);
    }

    pub fn rebuild(&mut self, lines: &[Line2D]) {
        self.candidates = extract_snap_points(lines, &self.config);
    }

    pub fn candidates(&self) -> &[SnapPoint] {
        &self.candidates
    }

    pub fn snap(&self, cursor: &Point2, lines: &[Line2D]) -> Option<SnapPoint> {
        find_nearest_snap_point(cursor, &self.candidates, lines, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LineType;
    use approx::assert_relative_eq;

    fn rectangle() -> Vec<Line2D> {
        let corners = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 5.0),
            Point2::new(0.0, 5.0),
        ];
        (0..4)
            .map(|i| Line2D::visible(corners[i], corners[(i + 1) % 4]))
            .collect()
    }

    fn count(points: &[SnapPoint], snap_type: SnapType) -> usize {
        points.iter().filter(|p| p.snap_type == snap_type).count()
    }

    #[test]
    fn test_rectangle_corners_deduplicated() {
        let points = extract_snap_points(&rectangle(), &DraftSnapConfig::default());
        assert_eq!(count(&points, SnapType::Endpoint), 4);
        assert_eq!(count(&points, SnapType::Midpoint), 4);
        // 相邻边在角点相交，但角点已记录为端点
        assert_eq!(count(&points, SnapType::Intersection), 0);
    }

    #[test]
    fn test_crossing_lines_produce_intersection() {
        let lines = vec![
            Line2D::visible(Point2::new(0.0, 0.0), Point2::new(2.0, 2.0)),
            Line2D::visible(Point2::new(0.0, 2.0), Point2::new(2.0, 0.0)),
        ];
        let config = DraftSnapConfig {
            midpoints: false,
            ..Default::default()
        };
        let points = extract_snap_points(&lines, &config);
        let int = points
            .iter()
            .find(|p| p.snap_type == SnapType::Intersection)
            .unwrap();
        assert_eq!(int.priority, 0);
        assert_eq!(int.source_line, Some(0));
        assert_eq!(int.second_line, Some(1));
        assert_relative_eq!(int.point.x, 1.0);
        assert_relative_eq!(int.point.y, 1.0);
    }

    #[test]
    fn test_midpoint_not_conflated_with_endpoint() {
        // 第二条线的端点正好落在第一条线的中点
        let lines = vec![
            Line2D::visible(Point2::new(0.0, 0.0), Point2::new(4.0, 0.0)),
            Line2D::visible(Point2::new(2.0, 0.0), Point2::new(2.0, 3.0)),
        ];
        let config = DraftSnapConfig {
            intersections: false,
            ..Default::default()
        };
        let points = extract_snap_points(&lines, &config);
        let at_two: Vec<_> = points
            .iter()
            .filter(|p| p.point == Point2::new(2.0, 0.0))
            .map(|p| p.snap_type)
            .collect();
        assert_eq!(at_two, vec![SnapType::Midpoint, SnapType::Endpoint]);
    }

    #[test]
    fn test_hidden_and_construction_lines_ignored() {
        let lines = vec![
            Line2D::new(Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), LineType::HiddenSharp),
            Line2D::new(Point2::new(0.0, 1.0), Point2::new(1.0, 1.0), LineType::Centerline),
        ];
        let config = DraftSnapConfig::default();
        assert!(extract_snap_points(&lines, &config).is_empty());
        assert!(find_nearest_snap_point(&Point2::new(0.5, 0.1), &[], &lines, &config).is_none());
    }

    #[test]
    fn test_tolerance_is_strict() {
        let lines = rectangle();
        let config = DraftSnapConfig {
            tolerance: 1.0,
            nearest: false,
            ..Default::default()
        };
        let points = extract_snap_points(&lines, &config);

        let on_boundary = find_nearest_snap_point(&Point2::new(-1.0, 0.0), &points, &lines, &config);
        assert!(on_boundary.is_none());

        let inside = find_nearest_snap_point(&Point2::new(-0.999, 0.0), &points, &lines, &config);
        assert_eq!(inside.unwrap().snap_type, SnapType::Endpoint);
    }

    #[test]
    fn test_first_seen_wins_on_tie() {
        let points = vec![
            SnapPoint::new(Point2::new(1.0, 0.0), SnapType::Midpoint, Some(0)),
            SnapPoint::new(Point2::new(-1.0, 0.0), SnapType::Endpoint, Some(1)),
        ];
        let config = DraftSnapConfig::default();
        let found = find_nearest_snap_point(&Point2::origin(), &points, &[], &config).unwrap();
        assert_eq!(found.snap_type, SnapType::Midpoint);
    }

    #[test]
    fn test_nearest_fallback() {
        let lines = rectangle();
        let config = DraftSnapConfig {
            tolerance: 0.5,
            ..Default::default()
        };
        let points = extract_snap_points(&lines, &config);

        // 距底边 0.2，离所有离散候选都很远
        let found = find_nearest_snap_point(&Point2::new(3.0, 0.2), &points, &lines, &config).unwrap();
        assert_eq!(found.snap_type, SnapType::Nearest);
        assert_eq!(found.priority, 10);
        assert_eq!(found.source_line, Some(0));
        assert_relative_eq!(found.point.x, 3.0);
        assert_relative_eq!(found.point.y, 0.0);

        let disabled = DraftSnapConfig {
            nearest: false,
            ..config
        };
        assert!(find_nearest_snap_point(&Point2::new(3.0, 0.2), &points, &lines, &disabled).is_none());
    }

    #[test]
    fn test_snapper_is_deterministic() {
        let lines = rectangle();
        let mut snapper = DraftSnapper::default();
        snapper.rebuild(&lines);

        let cursor = Point2::new(9.0, 4.5);
        let first = snapper.snap(&cursor, &lines);
        let second = snapper.snap(&cursor, &lines);
        assert_eq!(first, second);
        assert_eq!(first.unwrap().point, Point2::new(10.0, 5.0));
    }
}
