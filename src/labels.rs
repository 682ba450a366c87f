use include_dir::{include_dir, Dir};
use serde::Deserialize;
use thiserror::Error;

static LABEL_DIR: Dir = include_dir!("src/labels");

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("label set `{0}` is not bundled")]
    NotFound(String),
    #[error("label set `{0}` is not valid utf-8")]
    Encoding(String),
    #[error("label set `{name}` is malformed: {source}")]
    Malformed {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A bundled catalogue of everything the classifier knows how to name
#[derive(Deserialize, Clone, Debug)]
pub struct LabelSet {
    pub name: String,
    pub size: u32,
    pub labels: Vec<String>,
}

impl LabelSet {
    pub fn new(name: &str) -> Result<Self, LabelError> {
        let file_name = format!("{}.json", name);
        let file = LABEL_DIR
            .get_file(&file_name)
            .ok_or_else(|| LabelError::NotFound(name.to_string()))?;

        let contents = file
            .contents_utf8()
            .ok_or_else(|| LabelError::Encoding(name.to_string()))?;

        serde_json::from_str(contents).map_err(|source| LabelError::Malformed {
            name: name.to_string(),
            source,
        })
    }

    pub fn from_labels(name: impl Into<String>, labels: Vec<String>) -> Self {
        Self {
            name: name.into(),
            size: labels.len() as u32,
            labels,
        }
    }

    /// Labels eligible as drawing targets, in catalogue order
    pub fn playable(&self, banned: &[String]) -> Vec<String> {
        self.labels
            .iter()
            .filter(|label| !is_banned(label, banned))
            .cloned()
            .collect()
    }
}

pub fn is_banned(label: &str, banned: &[String]) -> bool {
    banned.iter().any(|b| b == label)
}
