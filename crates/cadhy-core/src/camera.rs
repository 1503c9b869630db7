//! 相机与关键帧动画
//!
//! 透视相机提供世界到屏幕的投影；[`CameraAnimation`] 在关键帧之间做平滑插值，
//! 用于视图切换时的相机过渡。

use crate::math::{Matrix4, Point2, Point3, Vector3, EPSILON};
use serde::{Deserialize, Serialize};

/// 透视相机
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: Point3,
    pub target: Point3,
    pub up: Vector3,
    /// 垂直视场角（弧度）
    pub fov_y: f64,
    pub aspect: f64,
    pub near: f64,
    pub far: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Point3::new(10.0, 10.0, 10.0),
            target: Point3::origin(),
            up: Vector3::y(),
            fov_y: 50f64.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn look_at(position: Point3, target: Point3) -> Self {
        Self {
            position,
            target,
            ..Default::default()
        }
    }

    pub fn view_matrix(&self) -> Matrix4 {
        Matrix4::look_at_rh(&self.position, &self.target, &self.up)
    }

    pub fn projection_matrix(&self) -> Matrix4 {
        Matrix4::new_perspective(self.aspect, self.fov_y, self.near, self.far)
    }

    pub fn view_projection(&self) -> Matrix4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// 世界坐标投影到归一化设备坐标 (NDC)
    ///
    /// 点位于相机后方时返回 `None`。
    pub fn project(&self, world: &Point3) -> Option<Point2> {
        let clip = self.view_projection() * world.to_homogeneous();
        if clip.w <= EPSILON {
            return None;
        }
        Some(Point2::new(clip.x / clip.w, clip.y / clip.w))
    }

    /// NDC 转换为像素坐标（原点在左上角）
    pub fn ndc_to_screen(ndc: &Point2, width: f64, height: f64) -> Point2 {
        Point2::new((ndc.x + 1.0) * 0.5 * width, (1.0 - ndc.y) * 0.5 * height)
    }

    pub fn pose(&self) -> CameraPose {
        CameraPose {
            position: self.position,
            target: self.target,
            fov_y: self.fov_y,
        }
    }

    pub fn apply_pose(&mut self, pose: &CameraPose) {
        self.position = pose.position;
        self.target = pose.target;
        self.fov_y = pose.fov_y;
    }
}

/// 相机姿态（关键帧插值的结果）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub position: Point3,
    pub target: Point3,
    pub fov_y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraKeyframe {
    /// 时间（秒）
    pub time: f64,
    pub position: Point3,
    pub target: Point3,
    pub fov_y: f64,
}

impl CameraKeyframe {
    pub fn new(time: f64, pose: CameraPose) -> Self {
        Self {
            time,
            position: pose.position,
            target: pose.target,
            fov_y: pose.fov_y,
        }
    }

    fn pose(&self) -> CameraPose {
        CameraPose {
            position: self.position,
            target: self.target,
            fov_y: self.fov_y,
        }
    }
}

/// 关键帧相机动画
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraAnimation {
    keyframes: Vec<CameraKeyframe>,
}

impl CameraAnimation {
    pub fn new(mut keyframes: Vec<CameraKeyframe>) -> Self {
        keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keyframes }
    }

    /// 插入关键帧，保持按时间排序
    pub fn add_keyframe(&mut self, keyframe: CameraKeyframe) {
        let index = self.keyframes.partition_point(|k| k.time <= keyframe.time);
        self.keyframes.insert(index, keyframe);
    }

    pub fn keyframes(&self) -> &[CameraKeyframe] {
        &self.keyframes
    }

    pub fn duration(&self) -> f64 {
        match (self.keyframes.first(), self.keyframes.last()) {
            (Some(first), Some(last)) => last.time - first.time,
            _ => 0.0,
        }
    }

    /// 采样给定时间的相机姿态
    ///
    /// 时间在首尾关键帧之外时钳制到端点；没有关键帧时返回 `None`。
    pub fn sample(&self, time: f64) -> Option<CameraPose> {
        let first = self.keyframes.first()?;
        let last = self.keyframes.last()?;
        if time <= first.time {
            return Some(first.pose());
        }
        if time >= last.time {
            return Some(last.pose());
        }

        // time 严格位于首尾之间，至少有两个关键帧
        let next = self.keyframes.partition_point(|k| k.time <= time);
        let (a, b) = (&self.keyframes[next - 1], &self.keyframes[next]);
        let span = b.time - a.time;
        let t = if span < EPSILON {
            1.0
        } else {
            smoothstep((time - a.time) / span)
        };

        Some(CameraPose {
            position: a.position + (b.position - a.position) * t,
            target: a.target + (b.target - a.target) * t,
            fov_y: a.fov_y + (b.fov_y - a.fov_y) * t,
        })
    }
}

fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
