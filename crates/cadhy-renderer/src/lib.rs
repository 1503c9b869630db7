//! CADHY 二维绘图
//!
//! 基于即时模式 [`DrawSurface`] 接口的剖面填充与捕捉标记渲染，
//! 提供记录表面（测试、回放）和 SVG 表面（导出）两种实现。

pub mod hatch;
pub mod marker;
pub mod surface;
pub mod svg;

pub use hatch::{
    generate_hatch_dots, generate_hatch_lines, render_hatch_region, HatchConfig, HatchPattern,
    HatchRegion, PatternDefinition, PatternParseError,
};
pub use marker::{draw_snap_marker, marker_color};
pub use surface::{Color, ColorParseError, DrawCommand, DrawSurface, RecordingSurface};
pub use svg::SvgSurface;
