//! Enumerated session selector: which scripted agent a caller talks to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Agent tier, fixed by the endpoint that created the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Standard,
    Premium,
}

/// Product line the agent sells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Product {
    Solar,
    /// Electricity contracts.
    Strom,
    /// Mobile phone contracts.
    Handy,
}

/// Conversation language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    German,
    Bosnian,
    Serbian,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Standard => "standard",
            Tier::Premium => "premium",
        }
    }
}

impl Product {
    pub const DEFAULT: Product = Product::Solar;

    /// Case-insensitive parse accepting a few common aliases.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "solar" => Some(Product::Solar),
            "strom" | "electricity" | "power" => Some(Product::Strom),
            "handy" | "mobile" | "phone" => Some(Product::Handy),
            _ => None,
        }
    }

    /// Absent or unrecognized values resolve to [`Product::DEFAULT`].
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse).unwrap_or(Self::DEFAULT)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Product::Solar => "solar",
            Product::Strom => "strom",
            Product::Handy => "handy",
        }
    }
}

impl Language {
    pub const DEFAULT: Language = Language::German;

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "german" | "deutsch" | "de" => Some(Language::German),
            "bosnian" | "bosanski" | "bs" => Some(Language::Bosnian),
            "serbian" | "srpski" | "sr" => Some(Language::Serbian),
            _ => None,
        }
    }

    /// Absent or unrecognized values resolve to [`Language::DEFAULT`].
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse).unwrap_or(Self::DEFAULT)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::German => "german",
            Language::Bosnian => "bosnian",
            Language::Serbian => "serbian",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite key into the agent catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selector {
    pub tier: Tier,
    pub product: Product,
    pub language: Language,
}

impl Selector {
    pub fn new(tier: Tier, product: Product, language: Language) -> Self {
        Self {
            tier,
            product,
            language,
        }
    }

    /// Build a selector from raw request fields, defaulting what is missing
    /// or unrecognized.
    pub fn from_request(tier: Tier, product: Option<&str>, language: Option<&str>) -> Self {
        Self::new(
            tier,
            Product::parse_or_default(product),
            Language::parse_or_default(language),
        )
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tier, self.product, self.language)
    }
}
