//! Declarative chart configuration in the ECharts option shape.
//!
//! [`build_chart_options`] is a pure function of the specification and the
//! brand colours; serialising its output twice gives identical JSON.

use serde::Serialize;

use crate::chart_spec::{BrandColors, ChartSpecification, ChartType};

pub const TITLE_FONT_SIZE: u32 = 18;
pub const AXIS_FONT_SIZE: u32 = 12;
pub const LABEL_ROTATION: i32 = 45;
pub const GRID_LINE_OPACITY: f64 = 0.2;
pub const BAR_WIDTH: &str = "60%";
pub const LINE_WIDTH: u32 = 3;
pub const SYMBOL_SIZE: u32 = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfiguration {
    pub background_color: String,
    pub title: TitleOption,
    pub grid: GridOption,
    pub x_axis: CategoryAxis,
    pub y_axis: ValueAxis,
    pub series: Vec<Series>,
    pub tooltip: TooltipOption,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleOption {
    pub text: String,
    pub left: String,
    pub top: u32,
    pub text_style: TextStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    pub color: String,
    pub font_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridOption {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
    pub contain_label: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineStyle {
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisLine {
    pub line_style: LineStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisLabel {
    pub color: String,
    pub font_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotate: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAxis {
    #[serde(rename = "type")]
    pub axis_type: String,
    pub data: Vec<String>,
    pub axis_line: AxisLine,
    pub axis_label: AxisLabel,
    pub axis_tick: AxisLine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueAxis {
    #[serde(rename = "type")]
    pub axis_type: String,
    /// `false` keeps zero inside the axis range.
    pub scale: bool,
    pub name: String,
    pub name_location: String,
    pub name_gap: u32,
    pub name_text_style: TextStyle,
    pub axis_line: AxisLine,
    pub axis_label: AxisLabel,
    pub split_line: AxisLine,
    pub axis_tick: AxisLine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemStyle {
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Series {
    #[serde(rename_all = "camelCase")]
    Bar {
        data: Vec<f64>,
        item_style: ItemStyle,
        bar_width: String,
    },
    #[serde(rename_all = "camelCase")]
    Line {
        data: Vec<f64>,
        smooth: bool,
        line_style: LineStyle,
        item_style: ItemStyle,
        symbol: String,
        symbol_size: u32,
        show_symbol: bool,
    },
}

impl Series {
    pub fn data(&self) -> &[f64] {
        match self {
            Series::Bar { data, .. } | Series::Line { data, .. } => data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TooltipOption {
    pub trigger: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub axis_pointer: Option<AxisPointer>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisPointer {
    #[serde(rename = "type")]
    pub pointer_type: String,
}

/// Build the full chart configuration for a validated specification.
pub fn build_chart_options(spec: &ChartSpecification, colors: &BrandColors) -> ChartConfiguration {
    let (series, tooltip) = match spec.chart_type() {
        ChartType::Bar => (
            Series::Bar {
                data: spec.values().to_vec(),
                item_style: ItemStyle {
                    color: colors.primary.to_string(),
                },
                bar_width: BAR_WIDTH.to_string(),
            },
            TooltipOption {
                trigger: "axis".to_string(),
                axis_pointer: Some(AxisPointer {
                    pointer_type: "shadow".to_string(),
                }),
            },
        ),
        ChartType::Line => (
            Series::Line {
                data: spec.values().to_vec(),
                smooth: true,
                line_style: LineStyle {
                    color: colors.primary.to_string(),
                    width: Some(LINE_WIDTH),
                    opacity: None,
                },
                item_style: ItemStyle {
                    color: colors.primary.to_string(),
                },
                symbol: "circle".to_string(),
                symbol_size: SYMBOL_SIZE,
                show_symbol: true,
            },
            TooltipOption {
                trigger: "axis".to_string(),
                axis_pointer: None,
            },
        ),
    };

    ChartConfiguration {
        background_color: colors.background.to_string(),
        title: TitleOption {
            text: spec.title().to_string(),
            left: "center".to_string(),
            top: 20,
            text_style: TextStyle {
                color: colors.content.to_string(),
                font_size: TITLE_FONT_SIZE,
                font_weight: Some("bold".to_string()),
            },
        },
        grid: GridOption {
            left: 80,
            right: 40,
            top: 80,
            bottom: 80,
            contain_label: false,
        },
        x_axis: CategoryAxis {
            axis_type: "category".to_string(),
            data: spec.labels().to_vec(),
            axis_line: content_line(colors),
            axis_label: AxisLabel {
                color: colors.content.to_string(),
                font_size: AXIS_FONT_SIZE,
                rotate: Some(LABEL_ROTATION),
            },
            axis_tick: content_line(colors),
        },
        y_axis: ValueAxis {
            axis_type: "value".to_string(),
            scale: false,
            name: spec.unit().unwrap_or_default().to_string(),
            name_location: "middle".to_string(),
            name_gap: 50,
            name_text_style: TextStyle {
                color: colors.content.to_string(),
                font_size: AXIS_FONT_SIZE,
                font_weight: None,
            },
            axis_line: content_line(colors),
            axis_label: AxisLabel {
                color: colors.content.to_string(),
                font_size: AXIS_FONT_SIZE,
                rotate: None,
            },
            split_line: AxisLine {
                line_style: LineStyle {
                    color: colors.content.to_string(),
                    width: None,
                    opacity: Some(GRID_LINE_OPACITY),
                },
            },
            axis_tick: content_line(colors),
        },
        series: vec![series],
        tooltip,
    }
}

fn content_line(colors: &BrandColors) -> AxisLine {
    AxisLine {
        line_style: LineStyle {
            color: colors.content.to_string(),
            width: None,
            opacity: None,
        },
    }
}
