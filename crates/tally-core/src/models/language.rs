//! Language tag derived from an entry name

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unicode Devanagari block.
const DEVANAGARI: std::ops::RangeInclusive<char> = '\u{0900}'..='\u{097F}';

/// Two-letter language tag assigned once at entry creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Hi,
}

impl Language {
    /// Classify text: `hi` when any code point falls in the Devanagari block,
    /// `en` otherwise.
    ///
    /// # Examples
    ///
    /// ```
    /// use tally_core::Language;
    ///
    /// assert_eq!(Language::detect("राम"), Language::Hi);
    /// assert_eq!(Language::detect("Ram"), Language::En);
    /// ```
    #[must_use]
    pub fn detect(text: &str) -> Self {
        if text.chars().any(|ch| DEVANAGARI.contains(&ch)) {
            Self::Hi
        } else {
            Self::En
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Hi => "hi",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Self::En),
            "hi" => Ok(Self::Hi),
            other => Err(format!("unsupported language tag '{other}'")),
        }
    }
}
