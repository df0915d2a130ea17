//! Core type definitions for Sieve
//!
//! These types map directly to the compiled-line format and the category
//! index keys, and are used throughout the matching engine.

use serde::{Deserialize, Serialize};

// =============================================================================
// Category Bits
// =============================================================================

// fedcba9876543210
//       |    | |||
//       |    | ||+---- bit    0: [BlockAction | AllowAction]
//       |    | |+----- bit    1: `important`
//       |    | +------ bit 2- 3: party [0 - 3]
//       |    +-------- bit 4- 8: type [0 - 31]
//       +------------- bit 9-15: unused

/// Bit-packed bucket group key: action, important flag, party and type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryBits(pub u16);

impl CategoryBits {
    pub const BLOCK: Self = Self(0);
    pub const ALLOW: Self = Self(1 << 0);
    pub const IMPORTANT: Self = Self(1 << 1);

    const TYPE_SHIFT: u16 = 4;
    const TYPE_MASK: u16 = 0x1F << Self::TYPE_SHIFT;
    const PARTY_MASK: u16 = 0b11 << 2;

    /// Build the key for one action/party/type combination.
    #[inline]
    pub const fn new(action: RuleAction, important: bool, party: Party, type_value: TypeValue) -> Self {
        let mut bits = action as u16 | party as u16 | ((type_value as u16) << Self::TYPE_SHIFT);
        if important {
            bits |= Self::IMPORTANT.0;
        }
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn is_allow(self) -> bool {
        self.0 & Self::ALLOW.0 != 0
    }

    #[inline]
    pub const fn is_important(self) -> bool {
        self.0 & Self::IMPORTANT.0 != 0
    }

    #[inline]
    pub const fn party(self) -> Party {
        match self.0 & Self::PARTY_MASK {
            4 => Party::First,
            8 => Party::Third,
            _ => Party::Any,
        }
    }

    /// Raw type value in bits 4-8 (0 means typeless).
    #[inline]
    pub const fn type_bits(self) -> u8 {
        ((self.0 & Self::TYPE_MASK) >> Self::TYPE_SHIFT) as u8
    }

    #[inline]
    pub fn type_value(self) -> Option<TypeValue> {
        TypeValue::try_from(self.type_bits()).ok()
    }

    /// Same key with its type field replaced.
    #[inline]
    pub const fn with_type(self, type_value: TypeValue) -> Self {
        Self((self.0 & !Self::TYPE_MASK) | ((type_value as u16) << Self::TYPE_SHIFT))
    }

    /// Same key with its party field replaced.
    #[inline]
    pub const fn with_party(self, party: Party) -> Self {
        Self((self.0 & !Self::PARTY_MASK) | party as u16)
    }
}

impl std::ops::BitOr for CategoryBits {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// =============================================================================
// Rule Actions
// =============================================================================

/// Action to take for a matched rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u16)]
pub enum RuleAction {
    /// Block rule - cancels the request
    #[default]
    Block = 0,
    /// Exception rule (@@...) - allows the request
    Allow = 1,
}

// =============================================================================
// Party
// =============================================================================

/// Whether the request hostname belongs to the document's site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u16)]
pub enum Party {
    #[default]
    Any = 0,
    First = 1 << 2,
    Third = 2 << 2,
}

impl Party {
    /// Party of a request given its third-party flag.
    #[inline]
    pub const fn of_request(is_third_party: bool) -> Self {
        if is_third_party {
            Self::Third
        } else {
            Self::First
        }
    }
}

// =============================================================================
// Request Type Values
// =============================================================================

/// Request type value stored in category bits 4-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TypeValue {
    NoType = 0,
    Stylesheet = 1,
    Image = 2,
    Object = 3,
    Script = 4,
    XmlHttpRequest = 5,
    SubFrame = 6,
    Font = 7,
    Media = 8,
    WebSocket = 9,
    Other = 10,
    // start of behavioral filtering
    Popup = 11,
    Popunder = 12,
    // start of 1st-party-only behavioral filtering
    MainFrame = 13,
    GenericHide = 14,
    InlineFont = 15,
    InlineScript = 16,
    /// Generic data holder
    Data = 17,
    Redirect = 18,
    WebRtc = 19,
    Unsupported = 20,
}

impl TypeValue {
    /// Last type value which has a generic (any-type) counterpart.
    pub const LAST_NETWORK: Self = Self::Other;

    /// Type value for a request type name, as reported by the host.
    pub fn from_name(name: &str) -> Option<Self> {
        let value = match name {
            "no_type" => Self::NoType,
            "stylesheet" => Self::Stylesheet,
            "image" => Self::Image,
            "object" | "object_subrequest" => Self::Object,
            "script" => Self::Script,
            "fetch" | "xmlhttprequest" => Self::XmlHttpRequest,
            "sub_frame" => Self::SubFrame,
            "font" => Self::Font,
            "media" => Self::Media,
            "websocket" => Self::WebSocket,
            "other" => Self::Other,
            "popup" => Self::Popup,
            "popunder" => Self::Popunder,
            "main_frame" => Self::MainFrame,
            "generichide" => Self::GenericHide,
            "inline-font" => Self::InlineFont,
            "inline-script" => Self::InlineScript,
            "data" => Self::Data,
            "redirect" => Self::Redirect,
            "webrtc" => Self::WebRtc,
            "unsupported" => Self::Unsupported,
            _ => return None,
        };
        Some(value)
    }

    /// Filter-option name of this type, used when rebuilding rule text.
    pub const fn option_name(self) -> &'static str {
        match self {
            Self::NoType => "",
            Self::Stylesheet => "stylesheet",
            Self::Image => "image",
            Self::Object => "object",
            Self::Script => "script",
            Self::XmlHttpRequest => "xmlhttprequest",
            Self::SubFrame => "subdocument",
            Self::Font => "font",
            Self::Media => "media",
            Self::WebSocket => "websocket",
            Self::Other => "other",
            Self::Popup => "popup",
            Self::Popunder => "popunder",
            Self::MainFrame => "document",
            Self::GenericHide => "generichide",
            Self::InlineFont => "inline-font",
            Self::InlineScript => "inline-script",
            Self::Data => "data",
            Self::Redirect => "redirect",
            Self::WebRtc => "webrtc",
            Self::Unsupported => "unsupported",
        }
    }

    /// Bit of this type in a [`TypeMask`]. `NoType` has none.
    #[inline]
    pub fn mask_bit(self) -> TypeMask {
        match self {
            Self::NoType => TypeMask::empty(),
            other => TypeMask::from_bits_retain(1 << (other as u32 - 1)),
        }
    }
}

impl TryFrom<u8> for TypeValue {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let type_value = match value {
            0 => Self::NoType,
            1 => Self::Stylesheet,
            2 => Self::Image,
            3 => Self::Object,
            4 => Self::Script,
            5 => Self::XmlHttpRequest,
            6 => Self::SubFrame,
            7 => Self::Font,
            8 => Self::Media,
            9 => Self::WebSocket,
            10 => Self::Other,
            11 => Self::Popup,
            12 => Self::Popunder,
            13 => Self::MainFrame,
            14 => Self::GenericHide,
            15 => Self::InlineFont,
            16 => Self::InlineScript,
            17 => Self::Data,
            18 => Self::Redirect,
            19 => Self::WebRtc,
            20 => Self::Unsupported,
            _ => return Err(()),
        };
        Ok(type_value)
    }
}

// =============================================================================
// Type Masks (rule descriptor)
// =============================================================================

bitflags::bitflags! {
    /// Set of request types a rule applies to. Bit `n - 1` stands for type
    /// value `n`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeMask: u32 {
        const STYLESHEET = 1 << 0;
        const IMAGE = 1 << 1;
        const OBJECT = 1 << 2;
        const SCRIPT = 1 << 3;
        const XMLHTTPREQUEST = 1 << 4;
        const SUB_FRAME = 1 << 5;
        const FONT = 1 << 6;
        const MEDIA = 1 << 7;
        const WEBSOCKET = 1 << 8;
        const OTHER = 1 << 9;
        const POPUP = 1 << 10;
        const POPUNDER = 1 << 11;
        const MAIN_FRAME = 1 << 12;
        const GENERICHIDE = 1 << 13;
        const INLINE_FONT = 1 << 14;
        const INLINE_SCRIPT = 1 << 15;
        const DATA = 1 << 16;
        const REDIRECT = 1 << 17;
        const WEBRTC = 1 << 18;
        const UNSUPPORTED = 1 << 19;

        /// All discrete network request types (stylesheet through other)
        const ALL_NETWORK = (1 << 10) - 1;
    }
}

impl TypeMask {
    /// Type values present in this mask, lowest first.
    pub fn type_values(self) -> impl Iterator<Item = TypeValue> {
        let bits = self.bits();
        (1u8..=20).filter_map(move |value| {
            if bits & (1 << (value - 1)) != 0 {
                TypeValue::try_from(value).ok()
            } else {
                None
            }
        })
    }
}

// =============================================================================
// Request Context
// =============================================================================

/// Context for a request being matched, supplied by the host.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    /// Full request URL
    pub url: &'a str,
    /// Hostname of the document issuing the request
    pub doc_hostname: &'a str,
    /// Request hostname (extracted from URL)
    pub hostname: &'a str,
    /// Request type name (`script`, `image`, `main_frame`, ...)
    pub request_type: &'a str,
    /// Is this a third-party request?
    pub is_third_party: bool,
}

// =============================================================================
// Match Result
// =============================================================================

/// Outcome of evaluating a request against the static filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Decision {
    /// No rule matched: the request is allowed by default
    #[default]
    NoMatch = 0,
    /// A block rule matched and was not excepted
    Block = 1,
    /// An exception rule overrode a matching block rule
    Allow = 2,
}

impl Decision {
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Result of the generic-hide exception sub-protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericHide {
    /// No `generichide` exception applies
    NoException,
    /// An exception applies but an important re-block overrides it
    ImportantOverride,
    /// The exception applies
    ExceptionApplies,
}

impl From<GenericHide> for Decision {
    fn from(value: GenericHide) -> Self {
        match value {
            GenericHide::NoException => Decision::NoMatch,
            GenericHide::ImportantOverride => Decision::Block,
            GenericHide::ExceptionApplies => Decision::Allow,
        }
    }
}

// =============================================================================
// Counters
// =============================================================================

/// Bookkeeping for a filter list load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterCounts {
    /// Lines handed to the compiler
    pub processed: usize,
    /// Filters which produced compiled lines
    pub accepted: usize,
    /// Filters which could not be compiled
    pub rejected: usize,
    /// Compiled lines dropped as duplicates or by `badfilter`
    pub discarded: usize,
    pub block: usize,
    pub allow: usize,
}

impl FilterCounts {
    /// Number of distinct filters in effect.
    #[inline]
    pub fn filter_count(&self) -> usize {
        self.accepted.saturating_sub(self.discarded)
    }
}
