//! Static engine configuration
//!
//! The table is loaded once per page. Key names match the stored JSON table,
//! including the historical `removeRadicalAllPopus` spelling.

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Keep scanning for the whole page lifetime instead of stopping after 30s.
    #[serde(rename = "removeRadicalAllPopus")]
    pub remove_radical_all_popups: bool,
    /// Keywords whose presence in an element's markup marks a cookie banner.
    pub cookie_html_keywords: Vec<String>,
    /// Body class substrings that sites use to lock the page behind a banner.
    pub cookie_body_class_keywords: Vec<String>,
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            remove_radical_all_popups: true,
            cookie_html_keywords: vec!["cookie".to_string()],
            cookie_body_class_keywords: vec!["cookie".to_string(), "consent".to_string()],
            verbose: true,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration table. Missing keys take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(text)?;
        config.normalize();
        Ok(config)
    }

    /// Lower-case the HTML keywords; content is matched lower-cased.
    pub fn normalize(&mut self) {
        for keyword in &mut self.cookie_html_keywords {
            *keyword = keyword.to_lowercase();
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Info
        } else {
            LevelFilter::Error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config = EngineConfig::from_json(r#"{ "verbose": false }"#).expect("config should parse");
        assert!(config.remove_radical_all_popups);
        assert_eq!(config.cookie_html_keywords, vec!["cookie"]);
        assert_eq!(config.log_level(), LevelFilter::Error);
    }

    #[test]
    fn test_stored_table_key_spelling() {
        let config = EngineConfig::from_json(
            r#"{ "removeRadicalAllPopus": false, "cookieHtmlKeywords": ["Cookie", "GDPR"] }"#,
        )
        .expect("config should parse");
        assert!(!config.remove_radical_all_popups);
        assert_eq!(config.cookie_html_keywords, vec!["cookie", "gdpr"]);
    }

    #[test]
    fn test_rejects_bad_table() {
        assert!(EngineConfig::from_json(r#"{ "verbose": "yes" }"#).is_err());
    }
}
