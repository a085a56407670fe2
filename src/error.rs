use crate::progress::Stage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolysubError {
    #[error("Audio extraction failed: {0}")]
    Extraction(String),

    #[error("Speech recognition failed: {0}")]
    Recognition(String),

    #[error("{service} API error: {message}")]
    Api {
        service: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Translation to '{target}' failed after {retries} retries: {source}")]
    Translation {
        target: String,
        retries: u32,
        #[source]
        source: Box<PolysubError>,
    },

    #[error("Subtitle rendering failed: {0}")]
    Render(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("No subtitles written, every language failed: {}", language_list(.failures))]
    AllLanguagesFailed {
        failures: std::collections::BTreeMap<String, String>,
    },

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<PolysubError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PolysubError {
    /// Build an [`PolysubError::Api`] error for a service response.
    pub fn api(service: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        PolysubError::Api {
            service: service.to_string(),
            status,
            message: message.into(),
        }
    }

    /// Attach stage context. Cancellation and already-wrapped errors pass through.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            PolysubError::Cancelled | PolysubError::Stage { .. } => self,
            other => PolysubError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Whether retrying the same request could succeed.
    ///
    /// Network failures, rate limiting and server errors are transient;
    /// authentication failures, bad requests and local errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            PolysubError::Http(_) => true,
            PolysubError::Api { status, .. } => match status {
                None => true,
                Some(code) => *code == 429 || *code >= 500,
            },
            _ => false,
        }
    }

    /// The stage this error was raised in, if it carries stage context.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PolysubError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

fn language_list(failures: &std::collections::BTreeMap<String, String>) -> String {
    failures.keys().cloned().collect::<Vec<_>>().join(", ")
}

pub type Result<T> = std::result::Result<T, PolysubError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PolysubError::api("google", None, "connection reset").is_transient());
        assert!(PolysubError::api("google", Some(429), "slow down").is_transient());
        assert!(PolysubError::api("deepl", Some(503), "unavailable").is_transient());
        assert!(!PolysubError::api("deepl", Some(403), "bad key").is_transient());
        assert!(!PolysubError::Config("missing key".to_string()).is_transient());
    }

    #[test]
    fn test_stage_wrapping_preserves_cause() {
        let err = PolysubError::Extraction("no audio stream".to_string()).in_stage(Stage::Extracting);
        assert_eq!(err.stage(), Some(Stage::Extracting));
        assert!(err.to_string().contains("no audio stream"));

        // Wrapping twice keeps the innermost stage
        let again = err.in_stage(Stage::Rendering);
        assert_eq!(again.stage(), Some(Stage::Extracting));
    }

    #[test]
    fn test_cancelled_is_not_wrapped() {
        let err = PolysubError::Cancelled.in_stage(Stage::Translating);
        assert!(matches!(err, PolysubError::Cancelled));
    }

    #[test]
    fn test_translation_error_mentions_retries() {
        let err = PolysubError::Translation {
            target: "fr".to_string(),
            retries: 3,
            source: Box::new(PolysubError::api("google", Some(503), "timeout")),
        };
        assert_eq!(
            err.to_string(),
            "Translation to 'fr' failed after 3 retries: google API error: timeout"
        );
    }

    #[test]
    fn test_translation_error_keeps_cause_chain() {
        use std::error::Error as _;

        let err = PolysubError::Translation {
            target: "de".to_string(),
            retries: 1,
            source: Box::new(PolysubError::api("deepl", Some(401), "bad key")),
        }
        .in_stage(Stage::Translating);

        let translation = err.source().unwrap();
        let cause = translation.source().unwrap();
        assert_eq!(cause.to_string(), "deepl API error: bad key");
        assert!(cause.source().is_none());
    }

    #[test]
    fn test_all_languages_failed_lists_codes() {
        let failures = [("fr", "boom"), ("de", "boom")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let err = PolysubError::AllLanguagesFailed { failures };
        assert_eq!(
            err.to_string(),
            "No subtitles written, every language failed: de, fr"
        );
    }
}
