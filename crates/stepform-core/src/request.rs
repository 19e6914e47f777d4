//! Request abstraction.
//!
//! A [`Request`] is the read-only, multi-valued parameter map of one
//! submission or navigation, addressed to one live step by its [`Token`]
//! and tagged with the [`Transition`] the user chose.

use crate::fields::FieldId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Parameter carrying the transition tag in forms and links.
pub const TRANSITION_PARAM: &str = "_do";
/// Parameter carrying the field table version a form was rendered with.
pub const VERSION_PARAM: &str = "_v";

/// Opaque key of a live step in the dispatch table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Token(String);

impl Token {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    pub fn new(user: impl Into<String>) -> Self {
        Self(user.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The "next step" a rendered form or link asks for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transition {
    /// Show the step (first visit, navigation, return from a continuation).
    Enter,
    /// Submit the step's form.
    Submit,
    /// Abandon the step.
    Cancel,
    /// Hand off to a sub-workflow of the given kind.
    Open(String),
}

impl Transition {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "" | "enter" => Some(Self::Enter),
            "submit" => Some(Self::Submit),
            "cancel" => Some(Self::Cancel),
            _ => raw
                .strip_prefix("open:")
                .filter(|kind| !kind.is_empty())
                .map(|kind| Self::Open(kind.to_string())),
        }
    }

    pub fn as_param(&self) -> String {
        match self {
            Self::Enter => "enter".to_string(),
            Self::Submit => "submit".to_string(),
            Self::Cancel => "cancel".to_string(),
            Self::Open(kind) => format!("open:{kind}"),
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_param())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    target: Token,
    transition: Transition,
    params: BTreeMap<String, Vec<String>>,
    identity: Option<Identity>,
    form_version: Option<u64>,
}

impl Request {
    pub fn new(target: Token, transition: Transition) -> Self {
        Self {
            target,
            transition,
            params: BTreeMap::new(),
            identity: None,
            form_version: None,
        }
    }

    /// Builds a request from raw wire pairs, extracting the bookkeeping
    /// parameters. `default` applies when no transition tag is present.
    pub fn from_pairs<I, K, V>(target: Token, default: Transition, pairs: I) -> Option<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut req = Self::new(target, default);
        let mut transition = None;
        for (name, value) in pairs {
            let name = name.into();
            let value = value.into();
            match name.as_str() {
                TRANSITION_PARAM if transition.is_none() => {
                    transition = Some(Transition::parse(&value)?);
                }
                VERSION_PARAM if req.form_version.is_none() => {
                    req.form_version = Some(value.parse().ok()?);
                }
                TRANSITION_PARAM | VERSION_PARAM => {}
                _ => req.params.entry(name).or_default().push(value),
            }
        }
        if let Some(transition) = transition {
            req.transition = transition;
        }
        Some(req)
    }

    pub fn with_identity(mut self, identity: Option<Identity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_user(self, user: impl Into<String>) -> Self {
        self.with_identity(Some(Identity::new(user)))
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn with_form_version(mut self, version: u64) -> Self {
        self.form_version = Some(version);
        self
    }

    pub fn target(&self) -> &Token {
        &self.target
    }

    pub fn transition(&self) -> &Transition {
        &self.transition
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn form_version(&self) -> Option<u64> {
        self.form_version
    }

    /// First value submitted under `id`.
    pub fn param(&self, id: &FieldId) -> Option<&str> {
        self.raw(id.as_str())
    }

    pub fn param_values(&self, id: &FieldId) -> &[String] {
        self.params
            .get(id.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Lookup by raw wire name, for parameters outside any field table.
    pub fn raw(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// The same request re-addressed to a continuation, which is entered
    /// rather than handed a transition meant for another step.
    pub fn entering(&self, target: Token) -> Self {
        Self {
            target,
            transition: Transition::Enter,
            params: self.params.clone(),
            identity: self.identity.clone(),
            form_version: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_parse_round_trip() {
        for t in [
            Transition::Enter,
            Transition::Submit,
            Transition::Cancel,
            Transition::Open("attendees".to_string()),
        ] {
            assert_eq!(Transition::parse(&t.as_param()), Some(t));
        }
        assert_eq!(Transition::parse(""), Some(Transition::Enter));
        assert_eq!(Transition::parse("open:"), None);
        assert_eq!(Transition::parse("delete"), None);
    }

    #[test]
    fn test_from_pairs_extracts_bookkeeping() {
        let req = Request::from_pairs(
            Token::new("abc"),
            Transition::Submit,
            [("_do", "cancel"), ("_v", "3"), ("name.3", "x"), ("name.3", "y")],
        )
        .unwrap();
        assert_eq!(req.transition(), &Transition::Cancel);
        assert_eq!(req.form_version(), Some(3));
        let id = FieldId::for_role("name", 3);
        assert_eq!(req.param(&id), Some("x"));
        assert_eq!(req.param_values(&id).len(), 2);
        assert_eq!(req.raw("_do"), None);
    }

    #[test]
    fn test_from_pairs_rejects_malformed_bookkeeping() {
        let bad_version =
            Request::from_pairs(Token::new("abc"), Transition::Submit, [("_v", "three")]);
        assert!(bad_version.is_none());
        let bad_transition =
            Request::from_pairs(Token::new("abc"), Transition::Enter, [("_do", "explode")]);
        assert!(bad_transition.is_none());
    }

    #[test]
    fn test_entering_keeps_params_and_identity() {
        let req = Request::new(Token::new("a"), Transition::Submit)
            .with_user("alice")
            .with_form_version(2)
            .with_param("k", "v");
        let next = req.entering(Token::new("b"));
        assert_eq!(next.target().as_str(), "b");
        assert_eq!(next.transition(), &Transition::Enter);
        assert_eq!(next.identity().map(Identity::as_str), Some("alice"));
        assert_eq!(next.raw("k"), Some("v"));
        assert_eq!(next.form_version(), None);
    }
}
