use serde::{Deserialize, Serialize};

use crate::utils::glob_match;

/// A named value injected into matching steps.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Secret {
    pub name: String,
    pub value: String,
    /// Image glob allowlist.
    pub images: Vec<String>,
    /// Event allowlist.
    pub events: Vec<String>,
    /// Redact the value from build logs.
    pub conceal: bool,
}

impl Secret {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            images: vec!["*".to_string()],
            events: vec!["*".to_string()],
            conceal: false,
        }
    }

    pub fn matches(&self, image: &str, event: &str) -> bool {
        self.match_image(image) && self.match_event(event)
    }

    pub fn match_image(&self, image: &str) -> bool {
        let untagged = trim_tag(image);
        self.images
            .iter()
            .any(|pattern| pattern == "*" || glob_match(pattern, image) || glob_match(pattern, untagged))
    }

    pub fn match_event(&self, event: &str) -> bool {
        self.events.iter().any(|pattern| glob_match(pattern, event))
    }
}

/// Strips the `:tag` suffix of an image reference, leaving registry ports alone.
pub fn trim_tag(image: &str) -> &str {
    let name_start = image.rfind('/').map_or(0, |idx| idx + 1);
    match image[name_start..].find(':') {
        Some(idx) => &image[..name_start + idx],
        None => image,
    }
}
