use std::path::PathBuf;

use thiserror::Error;

/// A chart specification that cannot be drawn.
///
/// Messages are Dutch because they are handed back to the model, which
/// narrates them to the user.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Er zijn geen labels opgegeven")]
    EmptyLabels,

    #[error("Er zijn geen waarden opgegeven")]
    EmptyValues,

    #[error("Aantal labels ({labels}) komt niet overeen met aantal waarden ({values})")]
    LengthMismatch { labels: usize, values: usize },

    #[error("Onbekend grafiektype '{0}'. Alleen 'bar' en 'line' worden ondersteund")]
    UnknownChartType(String),

    #[error("Onbekend kleurenschema '{0}'. Alleen 'fd' en 'bnr' worden ondersteund")]
    UnknownColorScheme(String),

    #[error("Waarde op positie {index} is geen geldig getal")]
    NonFiniteValue { index: usize },

    #[error("Ongeldige grafiekparameters: {0}")]
    MalformedArguments(String),
}

/// Failures while turning an uploaded spreadsheet into chart data.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Ongeldig bestandstype. Alleen .xlsx en .xls bestanden zijn toegestaan.")]
    UnsupportedFileType,

    #[error("Bestand is te groot. Maximale grootte is 10MB.")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Fout bij het lezen van Excel bestand: {0}")]
    Workbook(String),

    #[error("Excel bestand bevat geen werkbladen")]
    NoSheets,

    #[error("Excel bestand moet minimaal 2 rijen bevatten")]
    TooFewRows,

    #[error("Geen geldige data gevonden in Excel bestand")]
    NoValidData,

    #[error("Fout bij het lezen van Excel bestand '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while producing a chart from a validated specification.
#[derive(Debug, Error)]
pub enum ChartError {
    #[error("Grafiek kon niet worden getekend: {0}")]
    Render(String),

    #[error("Grafiek kon niet worden opgeslagen in '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages_are_dutch() {
        let err = ValidationError::LengthMismatch { labels: 3, values: 2 };
        assert_eq!(
            err.to_string(),
            "Aantal labels (3) komt niet overeen met aantal waarden (2)"
        );
    }

    #[test]
    fn test_render_error_message_is_dutch() {
        let err = ChartError::Render("backend".to_string());
        assert_eq!(err.to_string(), "Grafiek kon niet worden getekend: backend");
    }
}
