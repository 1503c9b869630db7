//! 剖面填充图案
//!
//! 在闭合多边形内生成平行线族、交叉线和点阵：
//! - 线族：沿每条候选直线以固定步长采样，射线法判断内外，每段连续的内部采样输出一条线段
//! - 点阵：固定种子的线性同余发生器，相同参数的渲染结果完全一致
//! - 实心：直接填充多边形，不生成线和点

use crate::surface::{Color, DrawSurface};
use cadhy_core::geometry::{point_in_polygon, polygon_bounds};
use cadhy_core::math::{Point2, Vector2, EPSILON};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// 沿候选直线的采样步长（图纸单位）
pub const SAMPLE_STEP: f64 = 0.5;

/// 点阵中每个点的半径
pub const DOT_RADIUS: f64 = 0.75;

const LCG_SEED: u64 = 12345;

/// 一族平行线的采样总数上限，超出时不生成线条
pub const MAX_LINE_SAMPLES: f64 = 4_000_000.0;

/// 点阵采样数上限
pub const MAX_DOT_SAMPLES: usize = 100_000;

fn is_finite_polygon(polygon: &[Point2]) -> bool {
    polygon.iter().all(|p| p.x.is_finite() && p.y.is_finite())
}

/// 填充图案
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HatchPattern {
    Solid,
    Lines45,
    Lines135,
    CrossHatch,
    Dots,
    Concrete,
    Steel,
    Wood,
    Earth,
    Brick,
    Insulation,
    None,
}

/// 图案的基础参数，角度为度
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternDefinition {
    pub angle: f64,
    pub spacing: f64,
    pub cross_angle: Option<f64>,
    /// 每平方单位的点数
    pub dot_density: Option<f64>,
}

impl PatternDefinition {
    const fn lines(angle: f64, spacing: f64) -> Self {
        Self {
            angle,
            spacing,
            cross_angle: None,
            dot_density: None,
        }
    }

    const fn crossed(angle: f64, spacing: f64, cross_angle: f64) -> Self {
        Self {
            angle,
            spacing,
            cross_angle: Some(cross_angle),
            dot_density: None,
        }
    }

    const fn dotted(angle: f64, spacing: f64, dot_density: f64) -> Self {
        Self {
            angle,
            spacing,
            cross_angle: None,
            dot_density: Some(dot_density),
        }
    }
}

impl HatchPattern {
    pub const ALL: [HatchPattern; 12] = [
        HatchPattern::Solid,
        HatchPattern::Lines45,
        HatchPattern::Lines135,
        HatchPattern::CrossHatch,
        HatchPattern::Dots,
        HatchPattern::Concrete,
        HatchPattern::Steel,
        HatchPattern::Wood,
        HatchPattern::Earth,
        HatchPattern::Brick,
        HatchPattern::Insulation,
        HatchPattern::None,
    ];

    /// 与序列化名称一致
    pub fn name(&self) -> &'static str {
        match self {
            HatchPattern::Solid => "solid",
            HatchPattern::Lines45 => "lines45",
            HatchPattern::Lines135 => "lines135",
            HatchPattern::CrossHatch => "cross-hatch",
            HatchPattern::Dots => "dots",
            HatchPattern::Concrete => "concrete",
            HatchPattern::Steel => "steel",
            HatchPattern::Wood => "wood",
            HatchPattern::Earth => "earth",
            HatchPattern::Brick => "brick",
            HatchPattern::Insulation => "insulation",
            HatchPattern::None => "none",
        }
    }

    /// 图案的基础参数表
    pub fn definition(&self) -> PatternDefinition {
        match self {
            HatchPattern::Solid | HatchPattern::None => PatternDefinition::lines(0.0, 0.0),
            HatchPattern::Lines45 => PatternDefinition::lines(45.0, 8.0),
            HatchPattern::Lines135 => PatternDefinition::lines(135.0, 8.0),
            HatchPattern::CrossHatch => PatternDefinition::crossed(45.0, 8.0, 135.0),
            HatchPattern::Dots => PatternDefinition::dotted(0.0, 0.0, 0.02),
            HatchPattern::Concrete => PatternDefinition::dotted(45.0, 12.0, 0.01),
            HatchPattern::Steel => PatternDefinition::lines(45.0, 4.0),
            HatchPattern::Wood => PatternDefinition::lines(0.0, 6.0),
            HatchPattern::Earth => PatternDefinition::dotted(0.0, 10.0, 0.015),
            HatchPattern::Brick => PatternDefinition::crossed(0.0, 8.0, 90.0),
            HatchPattern::Insulation => PatternDefinition::crossed(60.0, 5.0, 120.0),
        }
    }

    /// SVG `<pattern>` 元素的 id
    pub fn svg_pattern_id(&self) -> Option<String> {
        match self {
            HatchPattern::None => None,
            other => Some(format!("hatch-{}", other.name())),
        }
    }

    /// DXF HATCH 实体的图案名
    pub fn dxf_pattern_name(&self) -> Option<&'static str> {
        match self {
            HatchPattern::Solid => Some("SOLID"),
            HatchPattern::Lines45 => Some("ANSI31"),
            HatchPattern::Lines135 => Some("ANSI31_135"),
            HatchPattern::CrossHatch => Some("ANSI37"),
            HatchPattern::Dots => Some("DOTS"),
            HatchPattern::Concrete => Some("AR-CONC"),
            HatchPattern::Steel => Some("ANSI32"),
            HatchPattern::Wood => Some("AR-RROOF"),
            HatchPattern::Earth => Some("EARTH"),
            HatchPattern::Brick => Some("AR-B816"),
            HatchPattern::Insulation => Some("INSUL"),
            HatchPattern::None => None,
        }
    }
}

impl fmt::Display for HatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown hatch pattern: {0:?}")]
pub struct PatternParseError(pub String);

impl FromStr for HatchPattern {
    type Err = PatternParseError;

    /// 接受图案名或 DXF 图案名（不区分大小写）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        HatchPattern::ALL
            .into_iter()
            .find(|p| {
                p.name().eq_ignore_ascii_case(s)
                    || p.dxf_pattern_name()
                        .is_some_and(|dxf| dxf.eq_ignore_ascii_case(s))
            })
            .ok_or_else(|| PatternParseError(s.to_string()))
    }
}

/// 填充配置，显式字段覆盖图案默认值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HatchConfig {
    pub angle: Option<f64>,
    pub spacing: Option<f64>,
    pub cross_angle: Option<f64>,
    pub opacity: f64,
    pub color: Color,
    pub line_width: f64,
}

impl Default for HatchConfig {
    fn default() -> Self {
        Self {
            angle: None,
            spacing: None,
            cross_angle: None,
            opacity: 1.0,
            color: Color::default(),
            line_width: 1.0,
        }
    }
}

impl HatchConfig {
    /// 把配置覆盖到图案定义上
    pub fn resolve(&self, base: PatternDefinition) -> PatternDefinition {
        PatternDefinition {
            angle: self.angle.unwrap_or(base.angle),
            spacing: self.spacing.unwrap_or(base.spacing),
            cross_angle: self.cross_angle.or(base.cross_angle),
            dot_density: base.dot_density,
        }
    }
}

/// 待填充区域
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HatchRegion {
    /// 闭合边界，顶点按顺序隐式闭合
    pub boundary: Vec<Point2>,
    pub pattern: HatchPattern,
    #[serde(default)]
    pub config: HatchConfig,
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl HatchRegion {
    pub fn new(boundary: Vec<Point2>, pattern: HatchPattern) -> Self {
        Self {
            boundary,
            pattern,
            config: HatchConfig::default(),
            visible: true,
        }
    }

    pub fn with_config(mut self, config: HatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn is_renderable(&self) -> bool {
        self.visible
            && self.boundary.len() >= 3
            && self.pattern != HatchPattern::None
            && is_finite_polygon(&self.boundary)
    }
}

/// 生成多边形内的一族平行线
///
/// `angle` 为度。候选直线穿过包围盒中心两侧各 `ceil(d / spacing)` 条（`d` 为包围盒对角线），
/// 保证任意角度下都覆盖整个多边形。
pub fn generate_hatch_lines(polygon: &[Point2], angle: f64, spacing: f64) -> Vec<(Point2, Point2)> {
    if polygon.len() < 3
        || !spacing.is_finite()
        || spacing <= 0.0
        || !is_finite_polygon(polygon)
    {
        return Vec::new();
    }
    let Some(bounds) = polygon_bounds(polygon) else {
        return Vec::new();
    };
    let diagonal = bounds.diagonal();
    if !diagonal.is_finite() || diagonal < EPSILON {
        return Vec::new();
    }

    let half_lines = (diagonal / spacing).ceil();
    let per_line = (2.0 * diagonal / SAMPLE_STEP).floor() + 1.0;
    if (2.0 * half_lines + 1.0) * per_line > MAX_LINE_SAMPLES {
        warn!(diagonal, spacing, "hatch spacing too fine for region, skipping lines");
        return Vec::new();
    }

    let center = bounds.center();
    let (sin, cos) = angle.to_radians().sin_cos();
    let dir = Vector2::new(cos, sin);
    let perp = Vector2::new(-sin, cos);

    let num_lines = half_lines as i64;
    let samples = per_line as usize - 1;
    let mut segments = Vec::new();

    for i in -num_lines..=num_lines {
        let origin = center + perp * (i as f64 * spacing);
        // 当前内部段：(起点, 最后一个内部采样, 采样数)
        let mut run: Option<(Point2, Point2, usize)> = None;

        for k in 0..=samples {
            let p = origin + dir * (-diagonal + k as f64 * SAMPLE_STEP);
            if point_in_polygon(&p, polygon) {
                run = Some(match run {
                    Some((start, _, count)) => (start, p, count + 1),
                    None => (p, p, 1),
                });
            } else if let Some((start, end, count)) = run.take() {
                if count >= 2 {
                    segments.push((start, end));
                }
            }
        }
        if let Some((start, end, count)) = run {
            if count >= 2 {
                segments.push((start, end));
            }
        }
    }

    segments
}

/// 线性同余伪随机数发生器，输出 `[0, 1)`
#[derive(Debug, Clone)]
struct Lcg(u64);

impl Lcg {
    fn next_unit(&mut self) -> f64 {
        self.0 = (self.0 * 9301 + 49297) % 233280;
        self.0 as f64 / 233280.0
    }
}

/// 在多边形内散布点，数量为 `floor(包围盒面积 * density)` 个采样中落在内部的那些
pub fn generate_hatch_dots(polygon: &[Point2], density: f64) -> Vec<Point2> {
    if polygon.len() < 3
        || !density.is_finite()
        || density <= 0.0
        || !is_finite_polygon(polygon)
    {
        return Vec::new();
    }
    let Some(bounds) = polygon_bounds(polygon) else {
        return Vec::new();
    };

    let wanted = (bounds.area() * density).floor();
    if !wanted.is_finite() {
        return Vec::new();
    }
    let count = if wanted > MAX_DOT_SAMPLES as f64 {
        warn!(wanted, limit = MAX_DOT_SAMPLES, "hatch dot density too high, clamping");
        MAX_DOT_SAMPLES
    } else {
        wanted as usize
    };
    let mut rng = Lcg(LCG_SEED);
    let mut dots = Vec::new();
    for _ in 0..count {
        let x = bounds.min.x + rng.next_unit() * bounds.width();
        let y = bounds.min.y + rng.next_unit() * bounds.height();
        let p = Point2::new(x, y);
        if point_in_polygon(&p, polygon) {
            dots.push(p);
        }
    }
    dots
}

fn trace_polygon<S: DrawSurface + ?Sized>(surface: &mut S, polygon: &[Point2], offset: Vector2) {
    surface.begin_path();
    for (i, p) in polygon.iter().enumerate() {
        let p = *p + offset;
        if i == 0 {
            surface.move_to(p.x, p.y);
        } else {
            surface.line_to(p.x, p.y);
        }
    }
    surface.close_path();
}

fn stroke_segments<S: DrawSurface + ?Sized>(
    surface: &mut S,
    segments: &[(Point2, Point2)],
    offset: Vector2,
) {
    if segments.is_empty() {
        return;
    }
    surface.begin_path();
    for (start, end) in segments {
        surface.move_to(start.x + offset.x, start.y + offset.y);
        surface.line_to(end.x + offset.x, end.y + offset.y);
    }
    surface.stroke();
}

/// 渲染填充区域
///
/// 不可见、边界少于3个点、坐标非有限或图案为 `None` 时不产生任何绘图调用。
/// 所有坐标平移 `(offset_x, offset_y)` 后绘制。
pub fn render_hatch_region<S: DrawSurface + ?Sized>(
    surface: &mut S,
    region: &HatchRegion,
    offset_x: f64,
    offset_y: f64,
) {
    if !region.is_renderable() {
        return;
    }

    let config = &region.config;
    let resolved = config.resolve(region.pattern.definition());
    let offset = Vector2::new(offset_x, offset_y);

    surface.save();
    surface.set_alpha(config.opacity);

    if region.pattern == HatchPattern::Solid {
        surface.set_fill_color(config.color);
        trace_polygon(surface, &region.boundary, offset);
        surface.fill();
        surface.restore();
        return;
    }

    surface.set_stroke_color(config.color);
    surface.set_line_width(config.line_width);

    let mut line_count = 0;
    if resolved.spacing > 0.0 {
        let lines = generate_hatch_lines(&region.boundary, resolved.angle, resolved.spacing);
        line_count += lines.len();
        stroke_segments(surface, &lines, offset);

        if let Some(cross_angle) = resolved.cross_angle {
            let cross = generate_hatch_lines(&region.boundary, cross_angle, resolved.spacing);
            line_count += cross.len();
            stroke_segments(surface, &cross, offset);
        }
    }

    let mut dot_count = 0;
    if let Some(density) = resolved.dot_density {
        surface.set_fill_color(config.color);
        let dots = generate_hatch_dots(&region.boundary, density);
        dot_count = dots.len();
        for dot in dots {
            surface.begin_path();
            surface.arc(dot.x + offset.x, dot.y + offset.y, DOT_RADIUS, 0.0, TAU);
            surface.fill();
        }
    }

    surface.restore();
    debug!(
        pattern = %region.pattern,
        lines = line_count,
        dots = dot_count,
        "rendered hatch region"
    );
}
