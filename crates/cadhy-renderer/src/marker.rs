//! 捕捉标记绘制

use crate::surface::{Color, DrawSurface};
use cadhy_core::snap::{SnapPoint, SnapType};

/// 标记线宽
const MARKER_LINE_WIDTH: f64 = 1.5;

/// 各捕捉类型的标记颜色
pub fn marker_color(snap_type: SnapType) -> Color {
    match snap_type {
        SnapType::Endpoint => Color::rgb(0x22, 0xc5, 0x5e),
        SnapType::Midpoint => Color::rgb(0x06, 0xb6, 0xd4),
        SnapType::Intersection => Color::rgb(0xef, 0x44, 0x44),
        SnapType::Nearest => Color::rgb(0xea, 0xb3, 0x08),
    }
}

/// 在捕捉点处绘制标记
///
/// 端点为方框，中点为三角形，交点为叉形，最近点为沙漏形。`size` 为标记边长。
pub fn draw_snap_marker<S: DrawSurface + ?Sized>(surface: &mut S, snap_point: &SnapPoint, size: f64) {
    let (x, y) = (snap_point.point.x, snap_point.point.y);
    let h = size / 2.0;

    surface.save();
    surface.set_stroke_color(marker_color(snap_point.snap_type));
    surface.set_line_width(MARKER_LINE_WIDTH);
    surface.begin_path();

    match snap_point.snap_type {
        SnapType::Endpoint => {
            surface.move_to(x - h, y - h);
            surface.line_to(x + h, y - h);
            surface.line_to(x + h, y + h);
            surface.line_to(x - h, y + h);
            surface.close_path();
        }
        SnapType::Midpoint => {
            surface.move_to(x, y - h);
            surface.line_to(x + h, y + h);
            surface.line_to(x - h, y + h);
            surface.close_path();
        }
        SnapType::Intersection => {
            surface.move_to(x - h, y - h);
            surface.line_to(x + h, y + h);
            surface.move_to(x + h, y - h);
            surface.line_to(x - h, y + h);
        }
        SnapType::Nearest => {
            surface.move_to(x - h, y - h);
            surface.line_to(x + h, y - h);
            surface.line_to(x - h, y + h);
            surface.line_to(x + h, y + h);
            surface.close_path();
        }
    }

    surface.stroke();
    surface.restore();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{DrawCommand, RecordingSurface};
    use cadhy_core::math::Point2;

    fn record(snap_type: SnapType) -> RecordingSurface {
        let mut surface = RecordingSurface::new();
        let snap = SnapPoint::new(Point2::new(10.0, 20.0), snap_type, Some(0));
        draw_snap_marker(&mut surface, &snap, 8.0);
        surface
    }

    #[test]
    fn test_marker_is_balanced_and_stroked() {
        for snap_type in [
            SnapType::Endpoint,
            SnapType::Midpoint,
            SnapType::Intersection,
            SnapType::Nearest,
        ] {
            let surface = record(snap_type);
            assert_eq!(surface.commands().first(), Some(&DrawCommand::Save));
            assert_eq!(surface.commands().last(), Some(&DrawCommand::Restore));
            assert_eq!(surface.stroke_count(), 1);
            assert_eq!(surface.fill_count(), 0);
            assert!(surface
                .commands()
                .contains(&DrawCommand::StrokeColor(marker_color(snap_type))));
        }
    }

    #[test]
    fn test_endpoint_square() {
        let surface = record(SnapType::Endpoint);
        assert!(surface.commands().contains(&DrawCommand::MoveTo(6.0, 16.0)));
        assert!(surface.commands().contains(&DrawCommand::LineTo(14.0, 24.0)));
        assert_eq!(surface.count(|c| matches!(c, DrawCommand::ClosePath)), 1);
    }

    #[test]
    fn test_intersection_cross_is_open() {
        let surface = record(SnapType::Intersection);
        assert_eq!(surface.count(|c| matches!(c, DrawCommand::MoveTo(..))), 2);
        assert_eq!(surface.count(|c| matches!(c, DrawCommand::ClosePath)), 0);
    }
}
