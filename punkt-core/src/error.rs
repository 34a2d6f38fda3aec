use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = PunktError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PunktError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error while processing {path:?}: {source}")]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    #[error("malformed JSON on line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} responded with {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("missing environment variable {0}")]
    MissingEnv(String),
}

impl PunktError {
    pub fn io(source: std::io::Error, path: Option<PathBuf>) -> Self {
        Self::Io { source, path }
    }
}

impl From<std::io::Error> for PunktError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }
}
