//! 视锥裁剪
//!
//! 从相机的视图-投影矩阵提取六个裁剪平面（Gribb/Hartmann 方法），
//! 用于剔除视野外的场景对象。

use crate::camera::Camera;
use crate::math::{BoundingBox3, Matrix4, Point3, Vector3, EPSILON};
use crate::scene::{walk_scene, ObjectId, SceneNode, Visit};
use tracing::debug;

/// 平面 `normal · p + d = 0`，法线指向视锥内侧
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vector3,
    pub d: f64,
}

impl Plane {
    fn from_coefficients(a: f64, b: f64, c: f64, d: f64) -> Self {
        let normal = Vector3::new(a, b, c);
        let len = normal.norm();
        if len < EPSILON {
            return Self { normal, d };
        }
        Self {
            normal: normal / len,
            d: d / len,
        }
    }

    /// 有向距离，正值在内侧
    pub fn signed_distance(&self, p: &Point3) -> f64 {
        self.normal.dot(&p.coords) + self.d
    }
}

/// 视锥（左、右、下、上、近、远）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// 从视图-投影矩阵提取（OpenGL 风格裁剪空间，z ∈ [-w, w]）
    pub fn from_matrix(m: &Matrix4) -> Self {
        let plane = |sign: f64, row: usize| {
            Plane::from_coefficients(
                m[(3, 0)] + sign * m[(row, 0)],
                m[(3, 1)] + sign * m[(row, 1)],
                m[(3, 2)] + sign * m[(row, 2)],
                m[(3, 3)] + sign * m[(row, 3)],
            )
        };
        Self {
            planes: [
                plane(1.0, 0),
                plane(-1.0, 0),
                plane(1.0, 1),
                plane(-1.0, 1),
                plane(1.0, 2),
                plane(-1.0, 2),
            ],
        }
    }

    pub fn from_camera(camera: &Camera) -> Self {
        Self::from_matrix(&camera.view_projection())
    }

    pub fn contains_point(&self, p: &Point3) -> bool {
        self.planes.iter().all(|plane| plane.signed_distance(p) >= 0.0)
    }

    pub fn intersects_sphere(&self, center: &Point3, radius: f64) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(center) >= -radius)
    }

    /// 包围盒与视锥相交测试（正顶点法，保守：可能把视锥外的盒子判为可见）
    pub fn intersects_aabb(&self, bbox: &BoundingBox3) -> bool {
        self.planes.iter().all(|plane| {
            let positive = Point3::new(
                if plane.normal.x >= 0.0 { bbox.max.x } else { bbox.min.x },
                if plane.normal.y >= 0.0 { bbox.max.y } else { bbox.min.y },
                if plane.normal.z >= 0.0 { bbox.max.z } else { bbox.min.z },
            );
            plane.signed_distance(&positive) >= 0.0
        })
    }
}

/// 裁剪统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CullStats {
    pub tested: usize,
    pub visible: usize,
}

impl CullStats {
    pub fn culled(&self) -> usize {
        self.tested - self.visible
    }
}

/// 视锥裁剪器
#[derive(Debug, Clone)]
pub struct FrustumCuller {
    frustum: Frustum,
    stats: CullStats,
}

impl FrustumCuller {
    pub fn new(camera: &Camera) -> Self {
        Self {
            frustum: Frustum::from_camera(camera),
            stats: CullStats::default(),
        }
    }

    /// 相机移动后刷新视锥
    pub fn update(&mut self, camera: &Camera) {
        self.frustum = Frustum::from_camera(camera);
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    pub fn stats(&self) -> CullStats {
        self.stats
    }

    pub fn is_visible(&self, world_bbox: &BoundingBox3) -> bool {
        self.frustum.intersects_aabb(world_bbox)
    }

    /// 返回世界包围盒与视锥相交的网格对象
    ///
    /// 隐藏节点连同其子树一起跳过。
    pub fn cull<N: SceneNode>(&mut self, roots: &[N]) -> Vec<ObjectId> {
        let mut stats = CullStats::default();
        let mut visible = Vec::new();
        let frustum = self.frustum;

        walk_scene(roots, &mut |node: &N, world: &Matrix4| {
            if !node.is_visible() {
                return Visit::SkipChildren;
            }
            if let Some(bbox) = node.bounding_box() {
                stats.tested += 1;
                if frustum.intersects_aabb(&bbox.transformed(world)) {
                    stats.visible += 1;
                    visible.push(node.id());
                }
            }
            Visit::Continue
        });

        debug!(tested = stats.tested, visible = stats.visible, "frustum cull");
        self.stats = stats;
        visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Mesh, Scene};

    fn camera() -> Camera {
        Camera::look_at(Point3::new(0.0, 0.0, 10.0), Point3::origin())
    }

    #[test]
    fn test_contains_point() {
        let frustum = Frustum::from_camera(&camera());
        assert!(frustum.contains_point(&Point3::origin()));
        // 相机后方
        assert!(!frustum.contains_point(&Point3::new(0.0, 0.0, 20.0)));
        // 远平面之外
        assert!(!frustum.contains_point(&Point3::new(0.0, 0.0, -2000.0)));
    }

    #[test]
    fn test_sphere_and_aabb() {
        let frustum = Frustum::from_camera(&camera());
        assert!(frustum.intersects_sphere(&Point3::new(0.0, 0.0, 11.0), 2.0));
        assert!(!frustum.intersects_sphere(&Point3::new(0.0, 0.0, 20.0), 2.0));

        let inside = BoundingBox3::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let far_left = BoundingBox3::new(Point3::new(-501.0, -1.0, -1.0), Point3::new(-499.0, 1.0, 1.0));
        assert!(frustum.intersects_aabb(&inside));
        assert!(!frustum.intersects_aabb(&far_left));
    }

    #[test]
    fn test_cull_scene() {
        let mut scene = Scene::new();
        let visible = scene.spawn("visible", Mesh::cuboid(1.0, 1.0, 1.0), Matrix4::identity());
        scene.spawn(
            "behind",
            Mesh::cuboid(1.0, 1.0, 1.0),
            Matrix4::new_translation(&Vector3::new(0.0, 0.0, 50.0)),
        );

        let mut culler = FrustumCuller::new(&camera());
        let ids = culler.cull(scene.objects());
        assert_eq!(ids, vec![visible]);
        assert_eq!(culler.stats().tested, 2);
        assert_eq!(culler.stats().culled(), 1);
    }
}
