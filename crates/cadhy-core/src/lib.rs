//! CADHY 交互几何核心
//!
//! 提供绘图交互层所需的几何与调度功能：
//!
//! - 2D 几何图元与多边形工具
//! - 2D 图纸捕捉（端点、中点、交点、最近点）
//! - 3D 场景捕捉管理器与捕捉指示器
//! - 相机、关键帧动画与视锥裁剪
//! - 串行化后端调用的操作队列
//!
//! # 示例
//!
//! ```rust
//! use cadhy_core::prelude::*;
//!
//! let lines = vec![
//!     Line2D::visible(Point2::new(0.0, 0.0), Point2::new(100.0, 0.0)),
//!     Line2D::visible(Point2::new(30.0, -20.0), Point2::new(30.0, 60.0)),
//! ];
//! let config = DraftSnapConfig::default();
//! let candidates = extract_snap_points(&lines, &config);
//!
//! let snap = find_nearest_snap_point(&Point2::new(31.0, 1.0), &candidates, &lines, &config);
//! assert_eq!(snap.map(|s| s.snap_type), Some(SnapType::Intersection));
//! ```

pub mod camera;
pub mod error;
pub mod frustum;
pub mod geometry;
pub mod math;
pub mod op_queue;
pub mod scene;
pub mod snap;
pub mod snap3d;

pub mod prelude {
    //! 常用类型的便捷导入
    pub use crate::camera::{Camera, CameraAnimation, CameraKeyframe, CameraPose};
    pub use crate::error::{ConfigError, QueueError};
    pub use crate::frustum::{CullStats, Frustum, FrustumCuller};
    pub use crate::geometry::{
        closest_point_on_line, line_intersection, point_in_polygon, ClosestPoint, Line2D, LineType,
    };
    pub use crate::math::{BoundingBox2, BoundingBox3, Matrix4, Point2, Point3, Vector2, Vector3};
    pub use crate::op_queue::{
        OperationHandle, OperationId, OperationProgress, OperationQueue, OperationRequest,
        OperationStatus, QueueConfig, QueueStats,
    };
    pub use crate::scene::{Mesh, ObjectId, Scene, SceneNode, SceneObject, SnapIndicator};
    pub use crate::snap::{
        extract_snap_points, find_nearest_snap_point, DraftSnapConfig, DraftSnapper, SnapPoint,
        SnapType,
    };
    pub use crate::snap3d::{SnapConfig, SnapConfigUpdate, SnapKind, SnapManager, SnapResult};
}
