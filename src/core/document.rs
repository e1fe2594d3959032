use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// One indexable unit of content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Document {
    pub fn new(id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            folder: None,
            tags: Vec::new(),
        }
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    /// Set tags, dropping duplicates while keeping first-seen order.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = dedup_tags(tags.into_iter().map(Into::into));
        self
    }

    /// Reject documents the engine cannot index.
    pub fn validate(&self) -> Result<()> {
        let reason = if self.id.trim().is_empty() {
            "empty id"
        } else if self.title.trim().is_empty() {
            "empty title"
        } else if self.body.trim().is_empty() {
            "empty body"
        } else {
            return Ok(());
        };

        Err(SearchError::InvalidDocument {
            id: self.id.clone(),
            reason: reason.to_string(),
        })
    }

    /// Text handed to the embedding provider.
    pub fn embedding_text(&self) -> String {
        format!("{}\n\n{}", self.title, self.body)
    }

    /// Digest of every stored field, used to skip unchanged documents.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        write_field(&mut hasher, &self.id);
        write_field(&mut hasher, &self.title);
        write_field(&mut hasher, &self.body);
        match &self.folder {
            Some(folder) => {
                hasher.update(&[1]);
                write_field(&mut hasher, folder);
            }
            None => {
                hasher.update(&[0]);
            }
        }
        hasher.update(&(self.tags.len() as u64).to_le_bytes());
        for tag in &self.tags {
            write_field(&mut hasher, tag);
        }
        hasher.finalize().to_hex().to_string()
    }

    pub fn has_tags(&self, required: &[String]) -> bool {
        required.iter().all(|t| self.tags.contains(t))
    }
}

pub(crate) fn dedup_tags<I>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Length-prefixed so `("ab", "c")` and `("a", "bc")` digest differently.
fn write_field(hasher: &mut blake3::Hasher, field: &str) {
    hasher.update(&(field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}
