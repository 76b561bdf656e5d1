//! Character budget for reply text.
//!
//! The platform counts message length in Unicode codepoints, not bytes, so
//! a reply mixing ASCII, CJK, and emoji must be measured the same way. The
//! budget is the platform limit minus anything the platform itself will add
//! (a shortened link) minus a small safety margin.

/// Codepoint budget available for one reply's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharBudget {
    available: usize,
}

impl CharBudget {
    /// Platform post length limit, in codepoints.
    pub const PLATFORM_LIMIT: usize = 140;
    /// Slack kept below the limit so a reply is never rejected for length.
    pub const SAFETY_MARGIN: usize = 2;

    /// Budget under the standard platform limit with `reserved` codepoints
    /// set aside for platform-added content.
    #[must_use]
    pub fn new(reserved: usize) -> Self {
        Self::with_limit(Self::PLATFORM_LIMIT, reserved)
    }

    /// Budget under an explicit platform limit.
    #[must_use]
    pub fn with_limit(platform_limit: usize, reserved: usize) -> Self {
        Self {
            available: platform_limit.saturating_sub(reserved + Self::SAFETY_MARGIN),
        }
    }

    /// Codepoints available for reply text.
    #[must_use]
    pub fn available(&self) -> usize {
        self.available
    }

    /// Whether `line` still fits after `joined` plus a line-break separator.
    #[must_use]
    pub fn fits(&self, joined: &str, line: &str) -> bool {
        codepoints(joined) + 1 + codepoints(line) < self.available
    }
}

/// Length in Unicode codepoints (what the platform counts).
#[must_use]
pub fn codepoints(s: &str) -> usize {
    s.chars().count()
}
