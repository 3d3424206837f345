use std::io::Write;

use crate::error::RolecallError;
use crate::formatter::Formatter;
use crate::model::ParseBundle;

pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format(&self, bundle: &ParseBundle, writer: &mut dyn Write) -> Result<(), RolecallError> {
        // One pretty-printed document; `rolecall apply --bundle` reads it back
        let json = serde_json::to_string_pretty(bundle)?;
        writeln!(writer, "{json}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DecodedInput;
    use crate::parser::{ParseOptions, parse_script};

    #[test]
    fn test_json_roundtrips_bundle() {
        let bundle = parse_script(
            &DecodedInput::Text {
                text: "INT. ROOM - DAY\nJOHN\nHello.\nMARY\nHi.".to_string(),
            },
            &ParseOptions::default(),
        );
        let mut out = Vec::new();
        JsonFormatter.format(&bundle, &mut out).unwrap();

        let parsed: ParseBundle = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.characters.len(), bundle.characters.len());
        assert_eq!(parsed.conflicts.len(), bundle.conflicts.len());
        assert_eq!(parsed.metadata.total_replicas, 2);
    }
}
