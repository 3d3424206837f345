pub mod json;
pub mod report;

use std::io::Write;

use crate::error::RolecallError;
use crate::model::ParseBundle;

pub trait Formatter {
    fn format(&self, bundle: &ParseBundle, writer: &mut dyn Write) -> Result<(), RolecallError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Report,
    Json,
}

impl OutputFormat {
    pub fn formatter(&self) -> Box<dyn Formatter> {
        match self {
            OutputFormat::Report => Box::new(report::ReportFormatter),
            OutputFormat::Json => Box::new(json::JsonFormatter),
        }
    }

    /// File extension for batch output.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Report => "txt",
            OutputFormat::Json => "json",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "report" | "text" => Ok(OutputFormat::Report),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {s}. Valid: report, json")),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Report => write!(f, "report"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("report".parse::<OutputFormat>().unwrap(), OutputFormat::Report);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_output_format_display_roundtrip() {
        for fmt in [OutputFormat::Report, OutputFormat::Json] {
            assert_eq!(fmt.to_string().parse::<OutputFormat>().unwrap(), fmt);
        }
    }
}
