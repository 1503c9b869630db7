//! 三维场景捕捉
//!
//! 在视口中对场景图做对象捕捉，支持：
//! - 网格点 (Grid)
//! - 顶点 (Vertex)
//! - 边中点 (Edge)
//! - 面中心 (Face，默认关闭)
//! - 对象中心 (Center)
//!
//! 候选点与光标的世界距离必须严格小于 `SnapConfig::distance`。
//! 距离相同时按类型排名决胜：顶点 > 边 > 面 > 中心 > 网格。

use crate::camera::Camera;
use crate::error::ConfigError;
use crate::frustum::Frustum;
use crate::math::{Matrix4, Point2, Point3};
use crate::scene::{walk_scene, ObjectId, Scene, SceneNode, SnapIndicator, Visit};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// 三维捕捉类型，声明顺序即距离相同时的优先顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SnapKind {
    Vertex,
    Edge,
    Face,
    Center,
    Grid,
}

impl SnapKind {
    pub fn name(&self) -> &'static str {
        match self {
            SnapKind::Vertex => "顶点",
            SnapKind::Edge => "边中点",
            SnapKind::Face => "面中心",
            SnapKind::Center => "中心",
            SnapKind::Grid => "网格点",
        }
    }
}

/// 三维捕捉配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    pub enabled: bool,
    /// 捕捉距离（世界单位）
    pub distance: f64,
    pub vertex: bool,
    pub edge: bool,
    pub face: bool,
    pub grid: bool,
    pub center: bool,
    pub grid_size: f64,
    /// 只捕捉视锥内的对象
    pub cull_to_frustum: bool,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            distance: 0.5,
            vertex: true,
            edge: true,
            face: false,
            grid: true,
            center: true,
            grid_size: 0.5,
            cull_to_frustum: false,
        }
    }
}

impl SnapConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.distance.is_finite() && self.distance > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "snap distance must be positive, got {}",
                self.distance
            )));
        }
        if !(self.grid_size.is_finite() && self.grid_size > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "grid size must be positive, got {}",
                self.grid_size
            )));
        }
        Ok(())
    }

    /// 合并部分更新，返回新配置
    pub fn merged(&self, update: &SnapConfigUpdate) -> Self {
        Self {
            enabled: update.enabled.unwrap_or(self.enabled),
            distance: update.distance.unwrap_or(self.distance),
            vertex: update.vertex.unwrap_or(self.vertex),
            edge: update.edge.unwrap_or(self.edge),
            face: update.face.unwrap_or(self.face),
            grid: update.grid.unwrap_or(self.grid),
            center: update.center.unwrap_or(self.center),
            grid_size: update.grid_size.unwrap_or(self.grid_size),
            cull_to_frustum: update.cull_to_frustum.unwrap_or(self.cull_to_frustum),
        }
    }
}

/// 配置的部分更新，`None` 字段保持原值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnapConfigUpdate {
    pub enabled: Option<bool>,
    pub distance: Option<f64>,
    pub vertex: Option<bool>,
    pub edge: Option<bool>,
    pub face: Option<bool>,
    pub grid: Option<bool>,
    pub center: Option<bool>,
    pub grid_size: Option<f64>,
    pub cull_to_frustum: Option<bool>,
}

/// 捕捉结果
#[derive(Debug, Clone, PartialEq)]
pub struct SnapResult {
    pub point: Point3,
    pub kind: SnapKind,
    /// 与光标的世界距离
    pub distance: f64,
    /// 来源对象，网格点为 `None`
    pub object: Option<ObjectId>,
    /// 捕捉点的 NDC 坐标，位于相机后方时为 `None`
    pub screen: Option<Point2>,
}

/// 网格捕捉：各轴取最近的 `grid_size` 整数倍（四舍五入，远离零）
pub fn grid_snap(position: &Point3, grid_size: f64) -> Point3 {
    position.map(|v| (v / grid_size).round() * grid_size)
}

struct Best {
    point: Point3,
    kind: SnapKind,
    distance: f64,
    object: Option<ObjectId>,
}

/// 候选收集器：严格小于捕捉距离，距离相同时按类型排名
struct Collector<'a> {
    cursor: &'a Point3,
    max_distance: f64,
    best: Option<Best>,
    considered: usize,
}

impl Collector<'_> {
    fn offer(&mut self, point: Point3, kind: SnapKind, object: Option<ObjectId>) {
        self.considered += 1;
        let distance = (point - *self.cursor).norm();
        if distance >= self.max_distance {
            return;
        }
        let better = match &self.best {
            None => true,
            Some(best) => distance < best.distance || (distance == best.distance && kind < best.kind),
        };
        if better {
            self.best = Some(Best {
                point,
                kind,
                distance,
                object,
            });
        }
    }
}

/// 场景捕捉管理器
///
/// 配置只通过 [`SnapManager::get_config`] 的副本读取，
/// 通过 [`SnapManager::set_config`] 整体替换写入。
#[derive(Debug, Clone, Default)]
pub struct SnapManager {
    config: SnapConfig,
}

impl SnapManager {
    pub fn new(config: SnapConfig) -> Self {
        Self { config }
    }

    /// 获取配置副本
    pub fn get_config(&self) -> SnapConfig {
        self.config.clone()
    }

    /// 合并部分更新；更新后的配置无效时保持原配置
    pub fn set_config(&mut self, update: SnapConfigUpdate) -> Result<(), ConfigError> {
        let merged = self.config.merged(&update);
        merged.validate()?;
        self.config = merged;
        Ok(())
    }

    /// 导入持久化的配置（JSON，可只含部分字段）
    pub fn import_config(&mut self, json: &str) -> Result<(), ConfigError> {
        let update: SnapConfigUpdate = serde_json::from_str(json).map_err(|e| {
            warn!("Rejected snap config import: {}", e);
            e
        })?;
        self.set_config(update)
    }

    pub fn export_config(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(&self.config)?)
    }

    /// 寻找光标附近的最佳捕捉点
    ///
    /// # 参数
    /// - `cursor`: 光标在世界坐标中的位置
    /// - `roots`: 场景根节点
    /// - `camera`: 当前相机，用于计算屏幕坐标和视锥裁剪
    /// - `excluded`: 不参与捕捉的对象（连同子节点），例如正在拖动的对象
    pub fn find_snap_point<N: SceneNode>(
        &self,
        cursor: &Point3,
        roots: &[N],
        camera: &Camera,
        excluded: &[ObjectId],
    ) -> Option<SnapResult> {
        let config = &self.config;
        if !config.enabled {
            return None;
        }

        let mut collector = Collector {
            cursor,
            max_distance: config.distance,
            best: None,
            considered: 0,
        };

        if config.grid {
            collector.offer(grid_snap(cursor, config.grid_size), SnapKind::Grid, None);
        }

        let wants_mesh = config.vertex || config.edge || config.face || config.center;
        if wants_mesh {
            let frustum = config.cull_to_frustum.then(|| Frustum::from_camera(camera));
            walk_scene(roots, &mut |node: &N, world: &Matrix4| {
                if !node.is_visible() || excluded.contains(&node.id()) {
                    return Visit::SkipChildren;
                }
                if let (Some(frustum), Some(bbox)) = (&frustum, node.bounding_box()) {
                    if !frustum.intersects_aabb(&bbox.transformed(world)) {
                        return Visit::Continue;
                    }
                }
                self.collect_node(node, world, &mut collector);
                Visit::Continue
            });
        }

        let considered = collector.considered;
        let result = collector.best.map(|best| SnapResult {
            point: best.point,
            kind: best.kind,
            distance: best.distance,
            object: best.object,
            screen: camera.project(&best.point),
        });

        debug!(
            considered,
            kind = ?result.as_ref().map(|r| r.kind),
            "scene snap query"
        );
        result
    }

    fn collect_node<N: SceneNode>(&self, node: &N, world: &Matrix4, collector: &mut Collector<'_>) {
        let config = &self.config;
        let id = Some(node.id());
        let vertices = node.vertices();
        if vertices.is_empty() {
            return;
        }
        let world_vertices: Vec<Point3> = vertices.iter().map(|v| world.transform_point(v)).collect();

        if config.vertex {
            for v in &world_vertices {
                collector.offer(*v, SnapKind::Vertex, id);
            }
        }

        if config.edge || config.face {
            let mut seen_edges = HashSet::new();
            for tri in node.triangles() {
                let corners: Option<Vec<&Point3>> =
                    tri.iter().map(|&i| world_vertices.get(i as usize)).collect();
                let Some(corners) = corners else {
                    continue;
                };

                if config.edge {
                    for k in 0..3 {
                        let (a, b) = (tri[k], tri[(k + 1) % 3]);
                        if seen_edges.insert((a.min(b), a.max(b))) {
                            let mid = nalgebra::center(corners[k], corners[(k + 1) % 3]);
                            collector.offer(mid, SnapKind::Edge, id);
                        }
                    }
                }

                if config.face {
                    let centroid = Point3::from(
                        (corners[0].coords + corners[1].coords + corners[2].coords) / 3.0,
                    );
                    collector.offer(centroid, SnapKind::Face, id);
                }
            }
        }

        if config.center {
            if let Some(bbox) = node.bounding_box() {
                collector.offer(world.transform_point(&bbox.center()), SnapKind::Center, id);
            }
        }
    }

    /// 在场景中显示捕捉指示器
    ///
    /// 指示器首次使用时创建，之后只更新位置和可见性。
    pub fn show_snap_indicator(&self, position: Point3, scene: &mut Scene) {
        match &mut scene.snap_indicator {
            Some(indicator) => {
                indicator.position = position;
                indicator.visible = true;
            }
            None => {
                debug!("creating snap indicator");
                scene.snap_indicator = Some(SnapIndicator {
                    position,
                    visible: true,
                    size: SnapIndicator::DEFAULT_SIZE,
                });
            }
        }
    }

    pub fn hide_snap_indicator(&self, scene: &mut Scene) {
        if let Some(indicator) = &mut scene.snap_indicator {
            indicator.visible = false;
        }
    }
}
