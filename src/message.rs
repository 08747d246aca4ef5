use serde::{Deserialize, Serialize};

/// One inbound message as handed to the analysis pipeline.
///
/// Owned by the caller for the duration of a single analysis and never
/// persisted. `html` carries raw markup when the caller has it; link
/// extraction scans it separately from the plain-text content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
}

impl Message {
    pub fn new(sender: &str, subject: Option<&str>, content: &str) -> Self {
        Message {
            content: content.to_string(),
            sender: sender.to_string(),
            subject: subject.map(|s| s.to_string()),
            html: None,
        }
    }

    /// True when there is nothing to analyze: content, subject and html
    /// are all absent or blank. Such a message is rejected before the
    /// pipeline starts.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
            && self.subject.as_deref().map_or(true, |s| s.trim().is_empty())
            && self.html.as_deref().map_or(true, |h| h.trim().is_empty())
    }

    /// Domain part of the sender address, lowercased. None when the
    /// sender field has no '@' or nothing after it.
    pub fn sender_domain(&self) -> Option<String> {
        let at = self.sender.rfind('@')?;
        let domain = self.sender[at + 1..].trim().trim_end_matches('>');
        if domain.is_empty() {
            None
        } else {
            Some(domain.to_lowercase())
        }
    }

    /// Subject and content joined for text scanning.
    pub fn combined_text(&self) -> String {
        match &self.subject {
            Some(subject) => format!("{} {}", subject, self.content),
            None => self.content.clone(),
        }
    }
}
