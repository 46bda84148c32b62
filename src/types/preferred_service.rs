use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Which backend service the server should try first when answering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum PreferredService {
    /// Let the server pick the best available service.
    #[default]
    Auto,
    /// Prefer Google Gemini.
    Gemini,
    /// Prefer DeepSeek.
    Deepseek,
    /// Any other selector, passed through verbatim.
    Custom(String),
}

impl PreferredService {
    /// The wire value for this selector.
    pub fn as_str(&self) -> &str {
        match self {
            PreferredService::Auto => "auto",
            PreferredService::Gemini => "gemini",
            PreferredService::Deepseek => "deepseek",
            PreferredService::Custom(s) => s,
        }
    }
}

impl fmt::Display for PreferredService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreferredService {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.to_lowercase().as_str() {
            "" | "auto" => PreferredService::Auto,
            "gemini" => PreferredService::Gemini,
            "deepseek" => PreferredService::Deepseek,
            _ => PreferredService::Custom(s.to_string()),
        })
    }
}

impl Serialize for PreferredService {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PreferredService {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        // Infallible.
        Ok(s.parse().unwrap_or_default())
    }
}
