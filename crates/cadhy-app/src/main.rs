//! CADHY 命令行入口
//!
//! 装配捕捉、填充渲染、视锥裁剪和操作队列服务，跑一遍渠道断面的演示会话。
//!
//! 用法：`cadhy [snap-config.json] [output.svg]`

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use cadhy_core::camera::{Camera, CameraAnimation, CameraKeyframe, CameraPose};
use cadhy_core::frustum::FrustumCuller;
use cadhy_core::geometry::{polygon_area, Line2D, LineType};
use cadhy_core::math::{Matrix4, Point2, Point3, Vector3};
use cadhy_core::op_queue::{OperationQueue, OperationRequest};
use cadhy_core::scene::{Mesh, Scene};
use cadhy_core::snap::{DraftSnapConfig, DraftSnapper};
use cadhy_core::snap3d::SnapManager;
use cadhy_renderer::{
    draw_snap_marker, render_hatch_region, Color, DrawSurface, HatchConfig, HatchPattern,
    HatchRegion, SvgSurface,
};

/// 演示图纸尺寸（像素）
const SHEET_WIDTH: f64 = 400.0;
const SHEET_HEIGHT: f64 = 300.0;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting CADHY...");

    let mut args = std::env::args().skip(1);
    let config_path = args.next();
    let svg_path = args.next();

    let mut snap_manager = SnapManager::default();
    if let Some(path) = &config_path {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snap config {}", path))?;
        snap_manager
            .import_config(&json)
            .with_context(|| format!("Invalid snap config {}", path))?;
        info!(path = %path, "Loaded snap config");
    }

    run_viewport(&snap_manager);

    let section = channel_section();
    let svg = draw_section(&section)?;
    match &svg_path {
        Some(path) => {
            std::fs::write(path, &svg).with_context(|| format!("Failed to write {}", path))?;
            info!(path = %path, bytes = svg.len(), "Section drawing written");
        }
        None => info!(bytes = svg.len(), "Section drawing rendered"),
    }

    run_backend_calls(&section).await?;

    info!("CADHY session finished");
    Ok(())
}

/// 三维视口：捕捉、指示器、视锥裁剪和相机过渡
fn run_viewport(snap_manager: &SnapManager) {
    let mut scene = Scene::new();
    scene.spawn("channel", Mesh::cuboid(2.0, 1.0, 10.0), Matrix4::identity());
    scene.spawn(
        "culvert",
        Mesh::cuboid(1.0, 1.0, 1.0),
        Matrix4::new_translation(&Vector3::new(4.0, 0.0, 0.0)),
    );
    scene.spawn(
        "offsite_reservoir",
        Mesh::cuboid(5.0, 5.0, 5.0),
        Matrix4::new_translation(&Vector3::new(0.0, 0.0, 5000.0)),
    );

    let mut camera = Camera::default();
    let cursor = Point3::new(1.05, 0.48, 4.9);
    match snap_manager.find_snap_point(&cursor, scene.objects(), &camera, &[]) {
        Some(hit) => {
            info!(
                kind = hit.kind.name(),
                x = hit.point.x,
                y = hit.point.y,
                z = hit.point.z,
                distance = hit.distance,
                "Snapped cursor"
            );
            snap_manager.show_snap_indicator(hit.point, &mut scene);
        }
        None => snap_manager.hide_snap_indicator(&mut scene),
    }

    let mut culler = FrustumCuller::new(&camera);
    let visible = culler.cull(scene.objects());
    let stats = culler.stats();
    info!(
        visible = visible.len(),
        culled = stats.culled(),
        "Frustum culling"
    );

    // 切换到俯视图
    let top = CameraPose {
        position: Point3::new(0.0, 20.0, 0.01),
        target: Point3::origin(),
        fov_y: camera.fov_y,
    };
    let animation = CameraAnimation::new(vec![
        CameraKeyframe::new(0.0, camera.pose()),
        CameraKeyframe::new(0.6, top),
    ]);
    let mut t = 0.0;
    while let Some(pose) = animation.sample(t) {
        camera.apply_pose(&pose);
        culler.update(&camera);
        if t >= animation.duration() {
            break;
        }
        t += 0.2;
    }
    debug!(position = ?camera.position, "Camera transition finished");
}

/// 梯形渠道断面
struct ChannelSection {
    lines: Vec<Line2D>,
    lining: Vec<Point2>,
    water: Vec<Point2>,
}

fn channel_section() -> ChannelSection {
    let outer = [
        Point2::new(40.0, 60.0),
        Point2::new(120.0, 220.0),
        Point2::new(280.0, 220.0),
        Point2::new(360.0, 60.0),
    ];
    let inner = [
        Point2::new(60.0, 60.0),
        Point2::new(130.0, 200.0),
        Point2::new(270.0, 200.0),
        Point2::new(340.0, 60.0),
    ];

    let mut lines: Vec<Line2D> = outer
        .windows(2)
        .chain(inner.windows(2))
        .map(|w| Line2D::new(w[0], w[1], LineType::SectionCut))
        .collect();
    lines.push(Line2D::new(outer[0], inner[0], LineType::SectionCut));
    lines.push(Line2D::new(outer[3], inner[3], LineType::SectionCut));
    lines.push(Line2D::new(
        Point2::new(200.0, 40.0),
        Point2::new(200.0, 240.0),
        LineType::Centerline,
    ));

    let lining = outer.iter().chain(inner.iter().rev()).copied().collect();
    let water = vec![
        Point2::new(95.0, 130.0),
        inner[1],
        inner[2],
        Point2::new(305.0, 130.0),
    ];

    ChannelSection {
        lines,
        lining,
        water,
    }
}

/// 断面图：轮廓线、混凝土衬砌填充、水体填充和捕捉标记
fn draw_section(section: &ChannelSection) -> Result<String> {
    let mut svg = SvgSurface::new(SHEET_WIDTH, SHEET_HEIGHT);

    svg.set_stroke_color(Color::BLACK);
    svg.set_line_width(1.0);
    svg.begin_path();
    for line in section.lines.iter().filter(|l| l.line_type.is_visible()) {
        svg.move_to(line.start.x, line.start.y);
        svg.line_to(line.end.x, line.end.y);
    }
    svg.stroke();

    let water_color: Color = "#3b82f6".parse()?;
    let regions = vec![
        HatchRegion::new(section.lining.clone(), "AR-CONC".parse::<HatchPattern>()?),
        HatchRegion::new(section.water.clone(), HatchPattern::Solid).with_config(HatchConfig {
            opacity: 0.35,
            color: water_color,
            ..Default::default()
        }),
    ];
    debug!(regions = %serde_json::to_string(&regions)?, "Hatch regions");
    for region in &regions {
        render_hatch_region(&mut svg, region, 0.0, 0.0);
    }

    let mut snapper = DraftSnapper::new(DraftSnapConfig::default());
    snapper.rebuild(&section.lines);
    info!(candidates = snapper.candidates().len(), "Draft snap candidates");

    for cursor in [Point2::new(123.0, 216.0), Point2::new(200.0, 150.0)] {
        match snapper.snap(&cursor, &section.lines) {
            Some(snap) => {
                info!(
                    kind = snap.snap_type.name(),
                    x = snap.point.x,
                    y = snap.point.y,
                    "Draft snap"
                );
                draw_snap_marker(&mut svg, &snap, 8.0);
            }
            None => debug!(x = cursor.x, y = cursor.y, "No draft snap"),
        }
    }

    Ok(svg.finish())
}

/// 通过操作队列串行调用（模拟的）后端计算
async fn run_backend_calls(section: &ChannelSection) -> Result<()> {
    let queue = OperationQueue::new("cadhy-backend");

    let lining = section.lining.clone();
    let area = queue.enqueue(OperationRequest::new("lining_area", move || {
        let lining = lining.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok::<_, String>(polygon_area(&lining).abs())
        }
    }));

    // 第一次调用失败，自动重试后成功
    let attempts = Arc::new(AtomicU32::new(0));
    let water = section.water.clone();
    let flow_area = queue.enqueue(
        OperationRequest::new("flow_area", move || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            let water = water.clone();
            async move {
                if attempt == 0 {
                    return Err("backend busy".to_string());
                }
                Ok(polygon_area(&water).abs())
            }
        })
        .with_priority(1),
    );

    let flow_area = flow_area.await?;
    let area = area.await?;
    info!(lining_area = area, flow_area, "Backend results");

    let stats = queue.stats();
    if stats.failed > 0 {
        warn!(failed = stats.failed, "Some backend operations failed");
    }
    info!(
        completed = stats.completed,
        failed = stats.failed,
        "Operation queue drained"
    );
    Ok(())
}
