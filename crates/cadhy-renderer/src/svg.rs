//! SVG 绘图表面
//!
//! 把画布调用翻译为 SVG `<path>` 元素，用于导出剖面图纸。

use crate::surface::{Color, DrawSurface};
use std::f64::consts::TAU;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Style {
    stroke: Color,
    fill: Color,
    line_width: f64,
    alpha: f64,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            stroke: Color::BLACK,
            fill: Color::BLACK,
            line_width: 1.0,
            alpha: 1.0,
        }
    }
}

/// 生成 SVG 文档的绘图表面
#[derive(Debug, Clone)]
pub struct SvgSurface {
    width: f64,
    height: f64,
    style: Style,
    stack: Vec<Style>,
    path: String,
    elements: Vec<String>,
}

impl SvgSurface {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            style: Style::default(),
            stack: Vec::new(),
            path: String::new(),
            elements: Vec::new(),
        }
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// 输出完整的 SVG 文档
    pub fn finish(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = fmt_num(self.width),
            h = fmt_num(self.height),
        );
        for element in &self.elements {
            let _ = writeln!(out, "  {}", element);
        }
        out.push_str("</svg>\n");
        out
    }

    fn push_segment(&mut self, command: char, x: f64, y: f64) {
        if !self.path.is_empty() {
            self.path.push(' ');
        }
        let _ = write!(self.path, "{} {} {}", command, fmt_num(x), fmt_num(y));
    }

    fn color_attrs(color: Color, alpha: f64) -> (String, f64) {
        let rgb = Color::rgb(color.r, color.g, color.b).to_css();
        (rgb, alpha * f64::from(color.a) / 255.0)
    }
}

fn fmt_num(v: f64) -> String {
    let rounded = (v * 1000.0).round() / 1000.0;
    if rounded == 0.0 {
        // 避免输出 "-0"
        "0".to_string()
    } else {
        format!("{}", rounded)
    }
}

impl DrawSurface for SvgSurface {
    fn save(&mut self) {
        self.stack.push(self.style);
    }

    fn restore(&mut self) {
        if let Some(style) = self.stack.pop() {
            self.style = style;
        }
    }

    fn begin_path(&mut self) {
        self.path.clear();
    }

    fn move_to(&mut self, x: f64, y: f64) {
        self.push_segment('M', x, y);
    }

    fn line_to(&mut self, x: f64, y: f64) {
        if self.path.is_empty() {
            self.push_segment('M', x, y);
        } else {
            self.push_segment('L', x, y);
        }
    }

    fn arc(&mut self, x: f64, y: f64, radius: f64, start_angle: f64, end_angle: f64) {
        let point = |angle: f64| (x + radius * angle.cos(), y + radius * angle.sin());
        let (sx, sy) = point(start_angle);
        self.line_to(sx, sy);

        let sweep = end_angle - start_angle;
        let r = fmt_num(radius);
        if sweep.abs() >= TAU - 1e-9 {
            // 整圆拆成两个半圆弧
            let (mx, my) = point(start_angle + std::f64::consts::PI);
            let _ = write!(
                self.path,
                " A {r} {r} 0 1 1 {} {} A {r} {r} 0 1 1 {} {}",
                fmt_num(mx),
                fmt_num(my),
                fmt_num(sx),
                fmt_num(sy),
            );
        } else {
            let (ex, ey) = point(end_angle);
            let large = u8::from(sweep.abs() > std::f64::consts::PI);
            let positive = u8::from(sweep > 0.0);
            let _ = write!(
                self.path,
                " A {r} {r} 0 {large} {positive} {} {}",
                fmt_num(ex),
                fmt_num(ey),
            );
        }
    }

    fn close_path(&mut self) {
        if !self.path.is_empty() {
            self.path.push_str(" Z");
        }
    }

    fn stroke(&mut self) {
        if self.path.is_empty() {
            return;
        }
        let (color, opacity) = Self::color_attrs(self.style.stroke, self.style.alpha);
        self.elements.push(format!(
            r#"<path d="{}" fill="none" stroke="{}" stroke-width="{}" stroke-opacity="{}"/>"#,
            self.path,
            color,
            fmt_num(self.style.line_width),
            fmt_num(opacity),
        ));
    }

    fn fill(&mut self) {
        if self.path.is_empty() {
            return;
        }
        let (color, opacity) = Self::color_attrs(self.style.fill, self.style.alpha);
        self.elements.push(format!(
            r#"<path d="{}" fill="{}" fill-opacity="{}" fill-rule="evenodd"/>"#,
            self.path,
            color,
            fmt_num(opacity),
        ));
    }

    fn set_stroke_color(&mut self, color: Color) {
        self.style.stroke = color;
    }

    fn set_fill_color(&mut self, color: Color) {
        self.style.fill = color;
    }

    fn set_line_width(&mut self, width: f64) {
        self.style.line_width = width;
    }

    fn set_alpha(&mut self, alpha: f64) {
        self.style.alpha = alpha.clamp(0.0, 1.0);
    }
}
