//! Content policy filter — decides forward/drop per inbound message.
//!
//! Rules are evaluated in a fixed order and the first match wins:
//! exclusion is a hard veto, then the node-presence gate, then the
//! required-keyword check. Keyword matching is case-sensitive
//! substring containment. Pure decision, no side effects.

use crate::pipeline::types::NodeLink;

/// Immutable filter policy, loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    /// Drop messages with no extracted node links.
    pub nodes_only: bool,
    /// If non-empty, the message must contain at least one of these.
    pub required_keywords: Vec<String>,
    /// The message must contain none of these.
    pub excluded_keywords: Vec<String>,
}

/// Outcome of the policy decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Pass,
    Drop(DropReason),
}

/// Why a message was dropped. Carries the matched keyword for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    ExcludedKeyword(String),
    NoNodes,
    NoRequiredKeyword,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExcludedKeyword(kw) => write!(f, "excluded keyword {kw:?}"),
            Self::NoNodes => f.write_str("no node links"),
            Self::NoRequiredKeyword => f.write_str("no required keyword"),
        }
    }
}

impl FilterPolicy {
    /// A policy that passes everything (for tests and disabled filtering).
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Decide whether a message is forwarded. Total and deterministic;
    /// first matching rule wins.
    pub fn decide(&self, text: &str, links: &[NodeLink]) -> FilterDecision {
        if let Some(kw) = self
            .excluded_keywords
            .iter()
            .find(|kw| text.contains(kw.as_str()))
        {
            return FilterDecision::Drop(DropReason::ExcludedKeyword(kw.clone()));
        }

        if self.nodes_only && links.is_empty() {
            return FilterDecision::Drop(DropReason::NoNodes);
        }

        if !self.required_keywords.is_empty()
            && !self
                .required_keywords
                .iter()
                .any(|kw| text.contains(kw.as_str()))
        {
            return FilterDecision::Drop(DropReason::NoRequiredKeyword);
        }

        FilterDecision::Pass
    }
}
