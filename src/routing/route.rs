//! Route labels and the classifier-output parser
//!
//! A [`RouteSet`] is the closed, ordered set of labels a router may pick.
//! Order is priority: when parsing classifier output the first matching rule
//! wins, so a `Contains` rule placed first takes precedence over exact rules
//! that follow it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AgentflowError, Result};

/// Label reserved for classifier output that matches no rule
pub const UNKNOWN_LABEL: &str = "unknown";

/// How a rule's label is compared against normalized classifier output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Output must equal the label
    #[default]
    Exact,
    /// Output must contain the label anywhere
    Contains,
}

/// One legal route and the instruction telling the classifier when to pick it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub label: String,
    /// Condition, phrased to complete "If ..., respond with '<label>'"
    pub rule: String,
    #[serde(default, rename = "match")]
    pub matching: MatchMode,
}

impl RouteRule {
    pub fn new(label: impl Into<String>, rule: impl Into<String>, matching: MatchMode) -> Self {
        Self {
            label: label.into(),
            rule: rule.into(),
            matching,
        }
    }

    fn matches(&self, normalized: &str) -> bool {
        match self.matching {
            MatchMode::Exact => normalized == self.label,
            MatchMode::Contains => normalized.contains(&self.label),
        }
    }
}

/// The route chosen for a request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    /// A label from the configured set
    Matched(String),
    /// Classifier output matched no label
    Unknown,
}

impl Route {
    pub fn label(&self) -> &str {
        match self {
            Route::Matched(label) => label,
            Route::Unknown => UNKNOWN_LABEL,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Route::Unknown)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Closed, priority-ordered set of route rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSet {
    rules: Vec<RouteRule>,
}

impl RouteSet {
    /// Build a set, normalizing labels to lowercase
    ///
    /// Labels must be non-empty, unique, and must not be the reserved
    /// `unknown` label.
    pub fn new(rules: Vec<RouteRule>) -> Result<Self> {
        if rules.is_empty() {
            return Err(AgentflowError::Config("route set is empty".to_string()));
        }

        let mut normalized: Vec<RouteRule> = Vec::with_capacity(rules.len());
        for mut rule in rules {
            rule.label = rule.label.trim().to_lowercase();
            if rule.label.is_empty() {
                return Err(AgentflowError::Config("route label is empty".to_string()));
            }
            if rule.label == UNKNOWN_LABEL {
                return Err(AgentflowError::Config(format!("route label '{}' is reserved", UNKNOWN_LABEL)));
            }
            if normalized.iter().any(|r| r.label == rule.label) {
                return Err(AgentflowError::Config(format!("duplicate route label '{}'", rule.label)));
            }
            normalized.push(rule);
        }

        Ok(Self { rules: normalized })
    }

    /// weather (contains) > reasoning (exact) > conversational (exact)
    pub fn standard() -> Self {
        Self {
            rules: standard_rules(),
        }
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Labels in priority order
    pub fn labels(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.label.as_str()).collect()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.rules.iter().any(|r| r.label == label)
    }

    /// Map raw classifier output to a route
    ///
    /// Total: every input yields a configured label or [`Route::Unknown`].
    /// Output is trimmed, lowercased and stripped of wrapping quotes and a
    /// trailing period, inside or outside the quotes, before matching.
    pub fn parse(&self, raw: &str) -> Route {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return Route::Unknown;
        }

        self.rules
            .iter()
            .find(|r| r.matches(&normalized))
            .map(|r| Route::Matched(r.label.clone()))
            .unwrap_or(Route::Unknown)
    }

    /// Classifier instruction enumerating every label and its rule
    pub fn system_prompt(&self) -> String {
        let quoted: Vec<String> = self.rules.iter().map(|r| format!("'{}'", r.label)).collect();

        let mut prompt = String::from(
            "You are a Router Agent. Your only job is to decide which agent should handle the user's request.\n",
        );
        prompt.push_str(&format!(
            "RESPOND WITH ONLY ONE OF THESE {} WORDS: {}.\n\n",
            self.rules.len(),
            quoted.join(", ")
        ));
        prompt.push_str("Use these rules:\n");
        for rule in &self.rules {
            prompt.push_str(&format!("- If {}, respond with '{}'\n", rule.rule, rule.label));
        }
        prompt
    }
}

impl Default for RouteSet {
    fn default() -> Self {
        Self::standard()
    }
}

pub(crate) fn standard_rules() -> Vec<RouteRule> {
    vec![
        RouteRule::new("weather", "the request is about weather", MatchMode::Contains),
        RouteRule::new(
            "reasoning",
            "the request requires complex reasoning, math, or coding",
            MatchMode::Exact,
        ),
        RouteRule::new(
            "conversational",
            "the request is casual conversation or simple questions",
            MatchMode::Exact,
        ),
    ]
}

fn normalize(raw: &str) -> String {
    raw.trim()
        .trim_end_matches('.')
        .trim_matches(|c| c == '\'' || c == '"' || c == '`')
        .trim_end_matches('.')
        .trim()
        .to_lowercase()
}
