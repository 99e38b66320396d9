//! Contract of the external linking widget.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::domain::{LinkToken, UNKNOWN_INSTITUTION};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub institution_id: Option<String>,
}

/// Metadata handed back by the widget alongside the public token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetMetadata {
    #[serde(default)]
    pub institution: Option<InstitutionMetadata>,
    #[serde(default)]
    pub link_session_id: Option<String>,
}

impl WidgetMetadata {
    pub fn with_institution_name(name: impl Into<String>) -> Self {
        Self {
            institution: Some(InstitutionMetadata {
                name: Some(name.into()),
                institution_id: None,
            }),
            link_session_id: None,
        }
    }

    pub fn institution_name(&self) -> String {
        self.institution
            .as_ref()
            .and_then(|institution| institution.name.as_deref())
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(UNKNOWN_INSTITUTION)
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct WidgetError {
    #[serde(default)]
    pub error_code: Option<String>,
    pub message: String,
}

impl WidgetError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error_code: None,
            message: message.into(),
        }
    }
}

/// Exactly one outcome is produced per widget presentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetOutcome {
    Success {
        public_token: String,
        metadata: WidgetMetadata,
    },
    Exit {
        error: Option<WidgetError>,
    },
}

#[async_trait]
pub trait LinkWidget: Send + Sync {
    async fn present(&self, token: &LinkToken) -> WidgetOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn institution_name_falls_back_when_absent_or_blank() {
        assert_eq!(WidgetMetadata::default().institution_name(), UNKNOWN_INSTITUTION);

        let unnamed: WidgetMetadata =
            serde_json::from_str(r#"{"institution": {"institution_id": "ins_3"}}"#)
                .expect("decode");
        assert_eq!(unnamed.institution_name(), UNKNOWN_INSTITUTION);

        let blank = WidgetMetadata::with_institution_name("");
        assert_eq!(blank.institution_name(), UNKNOWN_INSTITUTION);

        let named = WidgetMetadata::with_institution_name("First Platypus Bank");
        assert_eq!(named.institution_name(), "First Platypus Bank");
    }
}
