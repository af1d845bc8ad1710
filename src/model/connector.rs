//! Connector identity as seen by the work tracker.

use serde::{Deserialize, Serialize};

/// Category of connector. A work's type is the type of its connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorType {
    ExternalImport,
    InternalImportFile,
    InternalEnrichment,
    InternalAnalysis,
    InternalExportFile,
    Stream,
}

impl ConnectorType {
    pub fn is_enrichment(self) -> bool {
        self == ConnectorType::InternalEnrichment
    }

    pub fn is_export(self) -> bool {
        self == ConnectorType::InternalExportFile
    }
}

impl std::fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectorType::ExternalImport => "EXTERNAL_IMPORT",
            ConnectorType::InternalImportFile => "INTERNAL_IMPORT_FILE",
            ConnectorType::InternalEnrichment => "INTERNAL_ENRICHMENT",
            ConnectorType::InternalAnalysis => "INTERNAL_ANALYSIS",
            ConnectorType::InternalExportFile => "INTERNAL_EXPORT_FILE",
            ConnectorType::Stream => "STREAM",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ConnectorType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EXTERNAL_IMPORT" => Ok(ConnectorType::ExternalImport),
            "INTERNAL_IMPORT_FILE" => Ok(ConnectorType::InternalImportFile),
            "INTERNAL_ENRICHMENT" => Ok(ConnectorType::InternalEnrichment),
            "INTERNAL_ANALYSIS" => Ok(ConnectorType::InternalAnalysis),
            "INTERNAL_EXPORT_FILE" => Ok(ConnectorType::InternalExportFile),
            "STREAM" => Ok(ConnectorType::Stream),
            _ => Err(crate::error::Error::Other(format!(
                "unknown connector type: {s}"
            ))),
        }
    }
}

/// A registered connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connector {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub connector_type: ConnectorType,
}

impl Connector {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        connector_type: ConnectorType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            connector_type,
        }
    }
}
