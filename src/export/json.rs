use super::{ExportError, ExportFormat, Exporter, ScriptDocument};

/// Pretty-printed document; the same shape [`ScriptStorage`](crate::storage::ScriptStorage) saves.
pub struct JsonExporter;

impl Exporter for JsonExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Json
    }

    fn export(&self, document: &ScriptDocument) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(document)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures::login_script;

    #[test]
    fn steps_keep_the_wire_shape() {
        let document = login_script();
        let text = JsonExporter.export(&document).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["baseUrl"], "https://example.com");
        assert_eq!(value["steps"][0]["type"], "navigate");
        assert_eq!(value["steps"][2]["target"]["candidates"][1]["type"], "testid");

        let parsed: ScriptDocument = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, document);
    }
}
