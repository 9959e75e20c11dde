//! Regex anchor location.
//!
//! A [`PatternLocator`] runs over the whole file content at once, so an
//! anchor may span several lines. The locator refuses to guess: zero matches
//! is [`LocateError::AnchorNotFound`], and more than one match is
//! [`LocateError::AmbiguousAnchor`] unless the caller opted into
//! [`MatchPolicy::First`].

use crate::splice::Span;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("invalid anchor pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("anchor pattern `{pattern}` matched nothing")]
    AnchorNotFound { pattern: String },

    #[error("anchor pattern `{pattern}` matched {count} locations (expected 1)")]
    AmbiguousAnchor { pattern: String, count: usize },

    #[error("anchor pattern `{pattern}` matched but capture group {group} did not participate")]
    CaptureNotMatched { pattern: String, group: CaptureGroup },
}

/// What to do when a pattern matches more than once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// Exactly one match or an error.
    #[default]
    Unique,
    /// Take the first match and ignore the rest.
    First,
}

/// Capture group whose span becomes the anchor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CaptureGroup {
    Index(usize),
    Name(String),
}

impl fmt::Display for CaptureGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureGroup::Index(idx) => write!(f, "{idx}"),
            CaptureGroup::Name(name) => write!(f, "`{name}`"),
        }
    }
}

impl FromStr for CaptureGroup {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<usize>() {
            Ok(idx) => CaptureGroup::Index(idx),
            Err(_) => CaptureGroup::Name(s.to_string()),
        })
    }
}

/// Regex flags for a pattern anchor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatternOptions {
    /// `.` also matches `\n`, letting a lazy `.*?` run across lines.
    pub dot_matches_newline: bool,
    /// `^`/`$` match at line boundaries.
    pub multi_line: bool,
    pub case_insensitive: bool,
}

#[derive(Debug, Clone)]
pub struct PatternLocator {
    regex: Regex,
    capture: Option<CaptureGroup>,
    policy: MatchPolicy,
}

impl PatternLocator {
    /// Compile `pattern` with default flags and [`MatchPolicy::Unique`].
    pub fn new(pattern: &str) -> Result<Self, LocateError> {
        Self::with_options(pattern, PatternOptions::default())
    }

    pub fn with_options(pattern: &str, options: PatternOptions) -> Result<Self, LocateError> {
        let regex = RegexBuilder::new(pattern)
            .dot_matches_new_line(options.dot_matches_newline)
            .multi_line(options.multi_line)
            .case_insensitive(options.case_insensitive)
            .build()
            .map_err(|source| LocateError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        Ok(Self {
            regex,
            capture: None,
            policy: MatchPolicy::Unique,
        })
    }

    pub fn policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Anchor on a capture group instead of the whole match.
    ///
    /// A group the regex does not define, or one that did not take part in
    /// the match, is reported at locate time as
    /// [`LocateError::CaptureNotMatched`].
    pub fn capture(mut self, group: CaptureGroup) -> Self {
        self.capture = Some(group);
        self
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn match_policy(&self) -> MatchPolicy {
        self.policy
    }

    fn capture_span(&self, caps: &regex::Captures<'_>) -> Option<Span> {
        let m = match &self.capture {
            None => caps.get(0),
            Some(CaptureGroup::Index(idx)) => caps.get(*idx),
            Some(CaptureGroup::Name(name)) => caps.name(name),
        }?;
        Some(Span::new(m.start(), m.end()))
    }
}

/// Locate the anchor for `locator` in `content`.
pub fn find_anchor(content: &str, locator: &PatternLocator) -> Result<Span, LocateError> {
    let mut matches = locator.regex.captures_iter(content);

    let first = matches.next().ok_or_else(|| LocateError::AnchorNotFound {
        pattern: locator.pattern().to_string(),
    })?;

    if locator.policy == MatchPolicy::Unique {
        let extra = matches.count();
        if extra > 0 {
            return Err(LocateError::AmbiguousAnchor {
                pattern: locator.pattern().to_string(),
                count: extra + 1,
            });
        }
    }

    locator
        .capture_span(&first)
        .ok_or_else(|| LocateError::CaptureNotMatched {
            pattern: locator.pattern().to_string(),
            group: locator
                .capture
                .clone()
                .unwrap_or(CaptureGroup::Index(0)),
        })
}
