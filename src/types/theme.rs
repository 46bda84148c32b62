use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Persisted theme preference.
#[derive(Debug, Copy, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Palette for light terminals.
    #[default]
    Light,
    /// Palette for dark terminals.
    Dark,
    /// Follow the environment.
    Auto,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => f.write_str("light"),
            Theme::Dark => f.write_str("dark"),
            Theme::Auto => f.write_str("auto"),
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            "auto" => Ok(Theme::Auto),
            other => Err(format!(
                "unknown theme '{other}' (expected light, dark, or auto)"
            )),
        }
    }
}
