//! Server-side SVG rendering of a [`ChartConfiguration`] through plotters.

use log::warn;
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::chart_options::{ChartConfiguration, Series};
use crate::error::ChartError;

pub const DEFAULT_WIDTH: u32 = 800;
pub const DEFAULT_HEIGHT: u32 = 600;

const FONT_FAMILY: &str = "sans-serif";
const Y_LABELS: usize = 6;
const HEADROOM: f64 = 0.05;
const SMOOTH_STEPS: usize = 8;
/// Beyond this magnitude the axis span would overflow, so values are drawn scaled down.
const LARGE_MAGNITUDE: f64 = 1e300;
const LARGE_SCALE: f64 = 1e-10;

/// Renders chart configurations to standalone SVG markup.
#[derive(Debug, Clone, Copy)]
pub struct SvgRenderer {
    width: u32,
    height: u32,
}

impl Default for SvgRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl SvgRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Same configuration in, same markup out.
    pub fn render(&self, config: &ChartConfiguration) -> Result<String, ChartError> {
        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, (self.width, self.height)).into_drawing_area();
            draw(&root, config).map_err(|e| ChartError::Render(format!("{:#}", e)))?;
        }
        Ok(svg)
    }
}

/// Value axis range in drawing units. `scale` maps data values onto it.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ValueRange {
    low: f64,
    high: f64,
    scale: f64,
}

impl ValueRange {
    fn from_values(values: &[f64], include_zero: bool) -> Self {
        let finite = values.iter().copied().filter(|v| v.is_finite());
        let (mut low, mut high) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if low > high {
            return Self { low: 0.0, high: 1.0, scale: 1.0 };
        }
        if include_zero {
            low = low.min(0.0);
            high = high.max(0.0);
        }

        let scale = if low.abs().max(high.abs()) > LARGE_MAGNITUDE { LARGE_SCALE } else { 1.0 };
        low *= scale;
        high *= scale;

        let span = high - low;
        if span == 0.0 {
            let pad = if high == 0.0 { 1.0 } else { high.abs() * HEADROOM };
            return Self { low: low - pad, high: high + pad, scale };
        }
        if high > 0.0 {
            high += span * HEADROOM;
        }
        if low < 0.0 {
            low -= span * HEADROOM;
        }
        Self { low, high, scale }
    }

    fn project(&self, value: f64) -> f64 {
        value * self.scale
    }

    fn baseline(&self) -> f64 {
        0.0_f64.clamp(self.low, self.high)
    }
}

fn draw(root: &DrawingArea<SVGBackend<'_>, Shift>, config: &ChartConfiguration) -> anyhow::Result<()> {
    root.fill(&parse_color(&config.background_color))?;

    let categories = &config.x_axis.data;
    let slots = categories.len().max(1) as f64;
    let values: Vec<f64> = config.series.iter().flat_map(|s| s.data().iter().copied()).collect();
    let range = ValueRange::from_values(&values, !config.y_axis.scale);

    let title = &config.title.text_style;
    let title_style = match title.font_weight.as_deref() {
        Some("bold") => FontStyle::Bold,
        _ => FontStyle::Normal,
    };
    let caption = (FONT_FAMILY, title.font_size)
        .into_font()
        .style(title_style)
        .color(&parse_color(&title.color));

    let mut chart = ChartBuilder::on(root)
        .caption(&config.title.text, caption)
        .margin_top(pixels(config.title.top / 4))
        .margin_right(pixels(config.grid.right))
        .x_label_area_size(pixels(config.grid.bottom))
        .y_label_area_size(pixels(config.grid.left))
        .build_cartesian_2d(-0.5..slots - 0.5, range.low..range.high)?;

    let x_label = &config.x_axis.axis_label;
    let mut x_label_style = (FONT_FAMILY, x_label.font_size)
        .into_font()
        .color(&parse_color(&x_label.color));
    // plotters only turns text in quarter steps
    if x_label.rotate.is_some_and(|r| r != 0) {
        x_label_style = x_label_style.transform(FontTransform::Rotate90);
    }
    let y_label = &config.y_axis.axis_label;
    let y_label_style = (FONT_FAMILY, y_label.font_size)
        .into_font()
        .color(&parse_color(&y_label.color));
    let name_style = &config.y_axis.name_text_style;
    let name_style = (FONT_FAMILY, name_style.font_size)
        .into_font()
        .color(&parse_color(&name_style.color));

    let split = &config.y_axis.split_line.line_style;
    let grid_style = parse_color(&split.color)
        .mix(split.opacity.unwrap_or(1.0))
        .stroke_width(split.width.unwrap_or(1));
    let axis_style = parse_color(&config.x_axis.axis_line.line_style.color).stroke_width(1);

    let span = range.high - range.low;
    let category_formatter = |x: &f64| category_label(categories, *x);
    let value_formatter = |y: &f64| scaled_label(*y, range.scale, span);

    let mut mesh = chart.configure_mesh();
    mesh.disable_x_mesh()
        .x_labels(categories.len() + 1)
        .x_label_formatter(&category_formatter)
        .x_label_style(x_label_style)
        .y_labels(Y_LABELS)
        .y_label_style(y_label_style)
        .bold_line_style(grid_style)
        .max_light_lines(0)
        .axis_style(axis_style)
        .axis_desc_style(name_style);
    if range.scale != 1.0 {
        mesh.y_label_formatter(&value_formatter);
    }
    if !config.y_axis.name.is_empty() {
        mesh.y_desc(config.y_axis.name.as_str());
    }
    mesh.draw()?;

    for series in &config.series {
        match series {
            Series::Bar {
                data,
                item_style,
                bar_width,
            } => {
                let fill = parse_color(&item_style.color).filled();
                let half = parse_percentage(bar_width) / 2.0;
                let base = range.baseline();
                chart.draw_series(data.iter().enumerate().map(|(i, &v)| {
                    let x = i as f64;
                    Rectangle::new([(x - half, base), (x + half, range.project(v))], fill)
                }))?;
            }
            Series::Line {
                data,
                smooth,
                line_style,
                item_style,
                symbol_size,
                show_symbol,
                ..
            } => {
                let points: Vec<(f64, f64)> = data
                    .iter()
                    .enumerate()
                    .map(|(i, &v)| (i as f64, range.project(v)))
                    .collect();
                let path = if *smooth { smooth_points(&points) } else { points.clone() };
                let stroke = parse_color(&line_style.color).stroke_width(line_style.width.unwrap_or(1));
                chart.draw_series(LineSeries::new(path, stroke))?;

                if *show_symbol {
                    let marker = parse_color(&item_style.color).filled();
                    let radius = pixels(*symbol_size / 2).max(1);
                    chart.draw_series(points.iter().map(|&p| Circle::new(p, radius, marker)))?;
                }
            }
        }
    }

    root.present()?;
    Ok(())
}

fn pixels(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Category name for a tick sitting on a slot centre; blank elsewhere.
fn category_label(categories: &[String], x: f64) -> String {
    let slot = x.round();
    if (x - slot).abs() > 1e-6 || slot < 0.0 {
        return String::new();
    }
    categories.get(slot as usize).cloned().unwrap_or_default()
}

/// Tick label for a value axis that was scaled down to fit.
fn scaled_label(value: f64, scale: f64, span: f64) -> String {
    if value.abs() < span * 1e-9 {
        return "0".to_string();
    }
    format!("{:.2e}", value / scale)
}

/// Catmull-Rom samples through every point.
fn smooth_points(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let last = points.len() - 1;
    let mut out = Vec::with_capacity(last * SMOOTH_STEPS + 1);
    for i in 0..last {
        let p0 = points[i.saturating_sub(1)];
        let p1 = points[i];
        let p2 = points[i + 1];
        let p3 = points[(i + 2).min(last)];
        for step in 0..SMOOTH_STEPS {
            let t = step as f64 / SMOOTH_STEPS as f64;
            out.push((catmull_rom(p0.0, p1.0, p2.0, p3.0, t), catmull_rom(p0.1, p1.1, p2.1, p3.1, t)));
        }
    }
    out.push(points[last]);
    out
}

fn catmull_rom(p0: f64, p1: f64, p2: f64, p3: f64, t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;
    0.5 * (2.0 * p1 + (p2 - p0) * t + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2 + (3.0 * p1 - p0 - 3.0 * p2 + p3) * t3)
}

fn parse_percentage(value: &str) -> f64 {
    value
        .trim_end_matches('%')
        .parse::<f64>()
        .map(|p| (p / 100.0).clamp(0.0, 1.0))
        .unwrap_or(0.6)
}

/// `#rgb` or `#rrggbb`; anything else falls back to black.
fn parse_color(hex: &str) -> RGBColor {
    let digits = hex.trim_start_matches('#');
    let channel = |pair: &str| u8::from_str_radix(pair, 16).ok();
    let parsed: Option<Vec<u8>> = match digits.len() {
        _ if !digits.is_ascii() => None,
        3 => digits.chars().map(|c| channel(&format!("{c}{c}"))).collect(),
        6 => (0..3).map(|i| channel(&digits[i * 2..i * 2 + 2])).collect(),
        _ => None,
    };
    match parsed.as_deref() {
        Some(&[r, g, b]) => RGBColor(r, g, b),
        _ => {
            warn!("Unrecognised colour '{}', using black", hex);
            BLACK
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart_options::build_chart_options;
    use crate::chart_spec::ChartCandidate;

    fn config(chart_type: &str, title: &str, values: Vec<f64>) -> ChartConfiguration {
        let labels = (0..values.len()).map(|i| format!("L{}", i)).collect();
        let spec = ChartCandidate {
            labels,
            values,
            title: title.to_string(),
            unit: Some("EUR".to_string()),
            chart_type: chart_type.to_string(),
            color_scheme: "fd".to_string(),
        }
        .validate()
        .unwrap();
        build_chart_options(&spec, spec.colors())
    }

    fn text_nodes(svg: &str) -> Vec<String> {
        svg.split("</text>")
            .filter_map(|chunk| chunk.rsplit_once('>').map(|(_, text)| text.to_string()))
            .filter(|text| !text.is_empty())
            .collect()
    }

    #[test]
    fn test_bar_render_contains_bars_and_background() {
        let svg = SvgRenderer::default()
            .render(&config("bar", "Sales", vec![100.0, 150.0]))
            .unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.to_lowercase().contains("#ffeadb"));
        assert_eq!(svg.matches(r##"fill="#379596""##).count(), 2);
        assert!(svg.contains(">Sales</text>"));
        assert!(svg.contains(">EUR</text>"));
        assert!(svg.contains(">L0</text>"));
        assert!(svg.contains(">L1</text>"));
    }

    #[test]
    fn test_line_render_has_polyline_and_markers() {
        let svg = SvgRenderer::default()
            .render(&config("line", "Trend", vec![5.0, 7.0, 12.0, 15.0]))
            .unwrap();
        assert!(svg.contains("<polyline"));
        assert!(svg.contains(r#"stroke-width="3""#));
        assert_eq!(svg.matches("<circle").count(), 4);
    }

    #[test]
    fn test_title_is_escaped() {
        let svg = SvgRenderer::default()
            .render(&config("bar", "R&D <2024>", vec![1.0]))
            .unwrap();
        assert!(svg.contains("&amp;"));
        assert!(!svg.contains("R&D <2024>"));
        assert!(!svg.contains("<2024>"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let cfg = config("line", "Trend", vec![1.5, 2.25, 0.75]);
        let renderer = SvgRenderer::default();
        assert_eq!(renderer.render(&cfg).unwrap(), renderer.render(&cfg).unwrap());
    }

    #[test]
    fn test_extreme_magnitudes_render_without_nan() {
        for chart_type in ["bar", "line"] {
            let svg = SvgRenderer::default()
                .render(&config(chart_type, "Extreem", vec![-1e308, 1e308]))
                .unwrap();
            assert!(!svg.contains("NaN"), "{} chart contains NaN", chart_type);
            assert!(!svg.contains("inf"), "{} chart contains inf", chart_type);
        }
    }

    #[test]
    fn test_small_values_get_distinct_tick_labels() {
        let svg = SvgRenderer::default()
            .render(&config("line", "Klein", vec![0.001, 0.002, 0.003]))
            .unwrap();
        let mut ticks: Vec<String> = text_nodes(&svg)
            .into_iter()
            .filter(|t| t.parse::<f64>().is_ok())
            .collect();
        ticks.sort();
        ticks.dedup();
        assert!(ticks.len() > 2, "tick labels collapsed: {:?}", ticks);
    }

    #[test]
    fn test_value_range_includes_zero_with_headroom() {
        let range = ValueRange::from_values(&[100.0, 150.0], true);
        assert_eq!(range.low, 0.0);
        assert!(range.high > 150.0);
        assert_eq!(range.scale, 1.0);

        let range = ValueRange::from_values(&[-3.0, 7.0], true);
        assert!(range.low < -3.0);
        assert!(range.high > 7.0);
    }

    #[test]
    fn test_value_range_all_zero_is_not_empty() {
        let range = ValueRange::from_values(&[0.0, 0.0], true);
        assert!(range.high > range.low);
    }

    #[test]
    fn test_value_range_scales_huge_values() {
        let range = ValueRange::from_values(&[-1e308, 1e308], true);
        assert!((range.high - range.low).is_finite());
        assert_eq!(range.scale, LARGE_SCALE);
        assert_eq!(scaled_label(range.project(1e308), range.scale, range.high - range.low), "1.00e308");
    }

    #[test]
    fn test_category_label_only_on_slot_centres() {
        let categories = vec!["Jan".to_string(), "Feb".to_string()];
        assert_eq!(category_label(&categories, 0.0), "Jan");
        assert_eq!(category_label(&categories, 1.0000000001), "Feb");
        assert_eq!(category_label(&categories, 0.5), "");
        assert_eq!(category_label(&categories, 2.0), "");
        assert_eq!(category_label(&categories, -1.0), "");
    }

    #[test]
    fn test_smooth_points_pass_through_data() {
        let points = vec![(0.0, 1.0), (1.0, 3.0), (2.0, 2.0)];
        let smooth = smooth_points(&points);
        assert_eq!(smooth.first(), Some(&(0.0, 1.0)));
        assert_eq!(smooth.last(), Some(&(2.0, 2.0)));
        assert!(smooth.contains(&(1.0, 3.0)));
        assert_eq!(smooth_points(&points[..2]), points[..2].to_vec());
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#379596"), RGBColor(0x37, 0x95, 0x96));
        assert_eq!(parse_color("#fff"), RGBColor(255, 255, 255));
        assert_eq!(parse_color("#000"), RGBColor(0, 0, 0));
        assert_eq!(parse_color("teal"), BLACK);
        assert_eq!(parse_color("#ééé"), BLACK);
    }

    #[test]
    fn test_parse_percentage() {
        assert_eq!(parse_percentage("60%"), 0.6);
        assert_eq!(parse_percentage("250%"), 1.0);
        assert_eq!(parse_percentage("wide"), 0.6);
    }
}
