//! Compiled filter lines
//!
//! A compiled network filter is one JSON array per line:
//!
//! ```text
//! [categoryBits, tokenHash, {"7":"ads.example.com"}]
//! ```
//!
//! Redirect directives are two-element lines `[categoryBits, "directive"]`.
//! Variant tags are the stable numeric class ids of the matcher family.

use serde::{Deserialize, Serialize};

use crate::types::CategoryBits;

/// Error type for compiled line decoding.
#[derive(Debug, thiserror::Error)]
pub enum CompiledLineError {
    #[error("Malformed compiled line: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unknown compiled section: {0}")]
    UnknownSection(String),
}

// =============================================================================
// Compiled Filters
// =============================================================================

/// Serialized form of one matcher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompiledFilter {
    #[serde(rename = "0")]
    True,
    /// Substring with the token offset inside the pattern
    #[serde(rename = "1")]
    Plain(String, usize),
    /// Substring whose token starts at offset 1
    #[serde(rename = "2")]
    PlainPrefix1(String),
    #[serde(rename = "3")]
    PlainHostname(String),
    #[serde(rename = "4")]
    PlainLeftAnchored(String),
    #[serde(rename = "5")]
    PlainRightAnchored(String),
    #[serde(rename = "6")]
    ExactMatch(String),
    #[serde(rename = "7")]
    PlainHnAnchored(String),
    /// Wildcarded pattern with its anchor bits
    #[serde(rename = "8")]
    Generic(String, u8),
    #[serde(rename = "9")]
    GenericHnAnchored(String),
    #[serde(rename = "10")]
    GenericHnAndRightAnchored(String),
    #[serde(rename = "11")]
    Regex(String),
    #[serde(rename = "12")]
    OriginHit(String, Box<CompiledFilter>),
    #[serde(rename = "13")]
    OriginMiss(String, Box<CompiledFilter>),
    #[serde(rename = "14")]
    OriginHitSet(String, Box<CompiledFilter>),
    #[serde(rename = "15")]
    OriginMissSet(String, Box<CompiledFilter>),
    #[serde(rename = "16")]
    OriginMixedSet(String, Box<CompiledFilter>),
    /// Directive type, directive value, wrapped matcher
    #[serde(rename = "17")]
    DataHolder(String, String, Box<CompiledFilter>),
    /// One entry of a hostname dictionary
    #[serde(rename = "18")]
    HostnameDict(String),
}

impl CompiledFilter {
    /// Numeric class id of this variant.
    pub fn class_id(&self) -> u8 {
        match self {
            Self::True => 0,
            Self::Plain(..) => 1,
            Self::PlainPrefix1(_) => 2,
            Self::PlainHostname(_) => 3,
            Self::PlainLeftAnchored(_) => 4,
            Self::PlainRightAnchored(_) => 5,
            Self::ExactMatch(_) => 6,
            Self::PlainHnAnchored(_) => 7,
            Self::Generic(..) => 8,
            Self::GenericHnAnchored(_) => 9,
            Self::GenericHnAndRightAnchored(_) => 10,
            Self::Regex(_) => 11,
            Self::OriginHit(..) => 12,
            Self::OriginMiss(..) => 13,
            Self::OriginHitSet(..) => 14,
            Self::OriginMissSet(..) => 15,
            Self::OriginMixedSet(..) => 16,
            Self::DataHolder(..) => 17,
            Self::HostnameDict(_) => 18,
        }
    }
}

// =============================================================================
// Compiled Lines
// =============================================================================

/// One atomic compiled filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CompiledLine {
    Filter(CategoryBits, u32, CompiledFilter),
    Redirect(CategoryBits, String),
}

impl CompiledLine {
    pub fn encode(&self) -> Result<String, CompiledLineError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(line: &str) -> Result<Self, CompiledLineError> {
        Ok(serde_json::from_str(line)?)
    }
}

/// Output section of a compiled line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// Network filters
    Network,
    /// Fingerprints of filters cancelled by `badfilter`
    BadFilter,
}

impl Section {
    const fn header(self) -> &'static str {
        match self {
            Self::Network => "#network",
            Self::BadFilter => "#badfilter",
        }
    }
}

/// Compiled lines of one or more filter lists, split by section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledLines {
    pub network: Vec<String>,
    pub bad_filters: Vec<String>,
}

impl CompiledLines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, section: Section, line: &CompiledLine) -> Result<(), CompiledLineError> {
        let encoded = line.encode()?;
        match section {
            Section::Network => self.network.push(encoded),
            Section::BadFilter => self.bad_filters.push(encoded),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.network.len() + self.bad_filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text form: a header line per section followed by its lines.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (section, lines) in [
            (Section::Network, &self.network),
            (Section::BadFilter, &self.bad_filters),
        ] {
            out.push_str(section.header());
            out.push('\n');
            for line in lines {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    /// Parse the text form. Every line is validated.
    pub fn from_text(text: &str) -> Result<Self, CompiledLineError> {
        let mut lines = Self::new();
        let mut section = Section::Network;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('#') {
                section = match line {
                    "#network" => Section::Network,
                    "#badfilter" => Section::BadFilter,
                    other => return Err(CompiledLineError::UnknownSection(other.to_string())),
                };
                continue;
            }
            lines.push(section, &CompiledLine::decode(line)?)?;
        }
        Ok(lines)
    }
}
