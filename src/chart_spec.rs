use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The two chart kinds the agent can draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    #[default]
    Bar,
    Line,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChartType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bar" => Ok(ChartType::Bar),
            "line" => Ok(ChartType::Line),
            _ => Err(ValidationError::UnknownChartType(s.to_string())),
        }
    }
}

/// Brand colour schemes. FD is the default when the user states no preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    #[default]
    Fd,
    Bnr,
}

/// Fixed colour triple of a brand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrandColors {
    pub primary: &'static str,
    pub content: &'static str,
    pub background: &'static str,
}

const FD_COLORS: BrandColors = BrandColors {
    primary: "#379596",
    content: "#191919",
    background: "#ffeadb",
};

const BNR_COLORS: BrandColors = BrandColors {
    primary: "#ffd200",
    content: "#000",
    background: "#fff",
};

impl ColorScheme {
    pub fn colors(&self) -> &'static BrandColors {
        match self {
            ColorScheme::Fd => &FD_COLORS,
            ColorScheme::Bnr => &BNR_COLORS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColorScheme::Fd => "fd",
            ColorScheme::Bnr => "bnr",
        }
    }

    /// Name used when talking to the user.
    pub fn display_name(&self) -> &'static str {
        match self {
            ColorScheme::Fd => "FD",
            ColorScheme::Bnr => "BNR",
        }
    }
}

impl fmt::Display for ColorScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ColorScheme {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fd" => Ok(ColorScheme::Fd),
            "bnr" => Ok(ColorScheme::Bnr),
            _ => Err(ValidationError::UnknownColorScheme(s.to_string())),
        }
    }
}

/// Unchecked chart description, as it arrives from a tool call or a parsed sheet.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartCandidate {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub title: String,
    pub unit: Option<String>,
    pub chart_type: String,
    pub color_scheme: String,
}

impl ChartCandidate {
    /// Check the candidate and turn it into an immutable specification.
    pub fn validate(self) -> Result<ChartSpecification, ValidationError> {
        if self.labels.is_empty() {
            return Err(ValidationError::EmptyLabels);
        }
        if self.values.is_empty() {
            return Err(ValidationError::EmptyValues);
        }
        if self.labels.len() != self.values.len() {
            return Err(ValidationError::LengthMismatch {
                labels: self.labels.len(),
                values: self.values.len(),
            });
        }
        let chart_type: ChartType = self.chart_type.parse()?;
        let color_scheme: ColorScheme = self.color_scheme.parse()?;
        if let Some(index) = self.values.iter().position(|v| !v.is_finite()) {
            return Err(ValidationError::NonFiniteValue { index });
        }

        let unit = self
            .unit
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        Ok(ChartSpecification {
            labels: self.labels,
            values: self.values,
            title: self.title,
            unit,
            chart_type,
            color_scheme,
        })
    }
}

/// A validated chart description. Fields are read-only once constructed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSpecification {
    labels: Vec<String>,
    values: Vec<f64>,
    title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
    chart_type: ChartType,
    color_scheme: ColorScheme,
}

impl ChartSpecification {
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn chart_type(&self) -> ChartType {
        self.chart_type
    }

    pub fn color_scheme(&self) -> ColorScheme {
        self.color_scheme
    }

    pub fn colors(&self) -> &'static BrandColors {
        self.color_scheme.colors()
    }

    /// Number of (label, value) points.
    pub fn point_count(&self) -> usize {
        self.labels.len()
    }
}
