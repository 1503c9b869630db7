//! 三维场景图
//!
//! 捕捉和视锥裁剪只依赖 [`SceneNode`] 能力接口（局部变换、网格、包围盒、子节点），
//! 与具体渲染引擎的对象模型无关。[`SceneObject`] / [`Scene`] 是默认实现，
//! 同时持有捕捉指示器这一场景自有的可复用对象。

use crate::math::{BoundingBox3, Matrix4, Point3};
use serde::{Deserialize, Serialize};

/// 场景对象ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

/// 场景节点能力接口
pub trait SceneNode {
    fn id(&self) -> ObjectId;

    /// 相对父节点的变换
    fn local_transform(&self) -> Matrix4;

    /// 局部坐标系下的网格顶点，组节点为空
    fn vertices(&self) -> &[Point3];

    /// 三角形索引
    fn triangles(&self) -> &[[u32; 3]];

    fn is_visible(&self) -> bool {
        true
    }

    /// 局部坐标系下的包围盒
    fn bounding_box(&self) -> Option<BoundingBox3> {
        BoundingBox3::from_points(self.vertices().iter().copied())
    }

    fn children(&self) -> &[Self]
    where
        Self: Sized;
}

/// 遍历控制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    /// 跳过当前节点的子树
    SkipChildren,
}

/// 深度优先遍历场景，为每个节点解析世界变换
pub fn walk_scene<N, F>(roots: &[N], visitor: &mut F)
where
    N: SceneNode,
    F: FnMut(&N, &Matrix4) -> Visit,
{
    for root in roots {
        walk_node(root, &Matrix4::identity(), visitor);
    }
}

fn walk_node<N, F>(node: &N, parent: &Matrix4, visitor: &mut F)
where
    N: SceneNode,
    F: FnMut(&N, &Matrix4) -> Visit,
{
    let world = parent * node.local_transform();
    if visitor(node, &world) == Visit::SkipChildren {
        return;
    }
    for child in node.children() {
        walk_node(child, &world, visitor);
    }
}

/// 三角网格
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<Point3>,
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn new(vertices: Vec<Point3>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            vertices,
            triangles,
        }
    }

    /// 由后端网格化结果的扁平缓冲区构造
    ///
    /// 顶点缓冲长度不是3的倍数，或索引越界时返回 `None`。
    pub fn from_buffers(positions: &[f32], indices: &[u32]) -> Option<Self> {
        if positions.len() % 3 != 0 || indices.len() % 3 != 0 {
            return None;
        }
        let vertices: Vec<Point3> = positions
            .chunks_exact(3)
            .map(|c| Point3::new(c[0] as f64, c[1] as f64, c[2] as f64))
            .collect();
        if indices.iter().any(|&i| i as usize >= vertices.len()) {
            return None;
        }
        let triangles = indices.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
        Some(Self::new(vertices, triangles))
    }

    /// 以原点为中心的长方体
    pub fn cuboid(sx: f64, sy: f64, sz: f64) -> Self {
        let (hx, hy, hz) = (sx / 2.0, sy / 2.0, sz / 2.0);
        let vertices = vec![
            Point3::new(-hx, -hy, -hz),
            Point3::new(hx, -hy, -hz),
            Point3::new(hx, hy, -hz),
            Point3::new(-hx, hy, -hz),
            Point3::new(-hx, -hy, hz),
            Point3::new(hx, -hy, hz),
            Point3::new(hx, hy, hz),
            Point3::new(-hx, hy, hz),
        ];
        let triangles = vec![
            [0, 2, 1], [0, 3, 2], // 底面
            [4, 5, 6], [4, 6, 7], // 顶面
            [0, 1, 5], [0, 5, 4],
            [1, 2, 6], [1, 6, 5],
            [2, 3, 7], [2, 7, 6],
            [3, 0, 4], [3, 4, 7],
        ];
        Self::new(vertices, triangles)
    }
}

/// 默认场景对象
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneObject {
    pub id: ObjectId,
    pub name: String,
    pub transform: Matrix4,
    pub mesh: Option<Mesh>,
    pub visible: bool,
    pub children: Vec<SceneObject>,
}

impl SceneObject {
    pub fn new(id: ObjectId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            transform: Matrix4::identity(),
            mesh: None,
            visible: true,
            children: Vec::new(),
        }
    }

    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_transform(mut self, transform: Matrix4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_child(mut self, child: SceneObject) -> Self {
        self.children.push(child);
        self
    }
}

impl SceneNode for SceneObject {
    fn id(&self) -> ObjectId {
        self.id
    }

    fn local_transform(&self) -> Matrix4 {
        self.transform
    }

    fn vertices(&self) -> &[Point3] {
        match &self.mesh {
            Some(mesh) => &mesh.vertices,
            None => &[],
        }
    }

    fn triangles(&self) -> &[[u32; 3]] {
        match &self.mesh {
            Some(mesh) => &mesh.triangles,
            None => &[],
        }
    }

    fn is_visible(&self) -> bool {
        self.visible
    }

    fn children(&self) -> &[Self] {
        &self.children
    }
}

/// 捕捉指示器（场景自有，只切换可见性，不反复创建/移除）
#[derive(Debug, Clone, PartialEq)]
pub struct SnapIndicator {
    pub position: Point3,
    pub visible: bool,
    /// 指示球半径（世界单位）
    pub size: f64,
}

impl SnapIndicator {
    pub const DEFAULT_SIZE: f64 = 0.08;
}

/// 场景
#[derive(Debug, Default)]
pub struct Scene {
    objects: Vec<SceneObject>,
    next_id: u64,
    pub(crate) snap_indicator: Option<SnapIndicator>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// 分配新的对象ID
    pub fn allocate_id(&mut self) -> ObjectId {
        self.next_id += 1;
        ObjectId(self.next_id)
    }

    /// 创建并加入一个顶层网格对象
    pub fn spawn(&mut self, name: impl Into<String>, mesh: Mesh, transform: Matrix4) -> ObjectId {
        let id = self.allocate_id();
        self.objects
            .push(SceneObject::new(id, name).with_mesh(mesh).with_transform(transform));
        id
    }

    pub fn add(&mut self, object: SceneObject) {
        self.objects.push(object);
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    /// 按ID查找对象（含子节点）
    pub fn find(&self, id: ObjectId) -> Option<&SceneObject> {
        fn search(nodes: &[SceneObject], id: ObjectId) -> Option<&SceneObject> {
            nodes
                .iter()
                .find_map(|n| if n.id == id { Some(n) } else { search(&n.children, id) })
        }
        search(&self.objects, id)
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<SceneObject> {
        let index = self.objects.iter().position(|o| o.id == id)?;
        Some(self.objects.remove(index))
    }

    pub fn snap_indicator(&self) -> Option<&SnapIndicator> {
        self.snap_indicator.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vector3;
    use approx::assert_relative_eq;

    #[test]
    fn test_walk_resolves_world_transforms() {
        let child = SceneObject::new(ObjectId(2), "child")
            .with_mesh(Mesh::cuboid(1.0, 1.0, 1.0))
            .with_transform(Matrix4::new_translation(&Vector3::new(0.0, 3.0, 0.0)));
        let parent = SceneObject::new(ObjectId(1), "parent")
            .with_transform(Matrix4::new_translation(&Vector3::new(5.0, 0.0, 0.0)))
            .with_child(child);

        let mut origins = Vec::new();
        walk_scene(&[parent], &mut |node: &SceneObject, world: &Matrix4| {
            origins.push((node.id, world.transform_point(&Point3::origin())));
            Visit::Continue
        });

        assert_eq!(origins.len(), 2);
        assert_relative_eq!(origins[1].1, Point3::new(5.0, 3.0, 0.0));
    }

    #[test]
    fn test_skip_children() {
        let parent = SceneObject::new(ObjectId(1), "parent")
            .with_child(SceneObject::new(ObjectId(2), "child"));
        let mut visited = Vec::new();
        walk_scene(&[parent], &mut |node: &SceneObject, _: &Matrix4| {
            visited.push(node.id);
            Visit::SkipChildren
        });
        assert_eq!(visited, vec![ObjectId(1)]);
    }

    #[test]
    fn test_mesh_from_buffers() {
        let mesh = Mesh::from_buffers(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], &[0, 1, 2]).unwrap();
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.triangles, vec![[0, 1, 2]]);

        assert!(Mesh::from_buffers(&[0.0, 0.0], &[]).is_none());
        assert!(Mesh::from_buffers(&[0.0, 0.0, 0.0], &[0, 1, 2]).is_none());
    }

    #[test]
    fn test_scene_find_and_remove() {
        let mut scene = Scene::new();
        let a = scene.spawn("a", Mesh::cuboid(1.0, 1.0, 1.0), Matrix4::identity());
        let b = scene.spawn("b", Mesh::cuboid(2.0, 2.0, 2.0), Matrix4::identity());
        assert_ne!(a, b);
        assert_eq!(scene.find(b).map(|o| o.name.as_str()), Some("b"));
        assert!(scene.remove(a).is_some());
        assert!(scene.find(a).is_none());
    }
}
