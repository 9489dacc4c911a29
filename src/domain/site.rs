//! Site-wide settings exposed to every template.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    pub site_name: String,
    pub site_url: String,
    pub tagline: String,
    pub language: String,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            site_name: "Lectern".to_string(),
            site_url: "http://localhost:3000".to_string(),
            tagline: String::new(),
            language: "en".to_string(),
        }
    }
}

impl SiteSettings {
    /// Absolute URL for a site-relative path.
    pub fn absolute_url(&self, path: &str) -> String {
        let base = self.site_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            format!("{base}/")
        } else {
            format!("{base}/{path}")
        }
    }
}
