//! Field validation.
//!
//! Every check runs independently and records its message against the
//! identifier the field carries in the *next* render, so the user sees every
//! problem in one round trip next to the value they entered.

use crate::fields::{FieldId, FieldSet, Submission};
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const INVALID_DATE: &str = "Not a valid date.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorMap(BTreeMap<FieldId, String>);

impl ErrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` for `id`, replacing an earlier message.
    pub fn insert(&mut self, id: FieldId, message: impl Into<String>) {
        self.0.insert(id, message.into());
    }

    pub fn get(&self, id: &FieldId) -> Option<&str> {
        self.0.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &FieldId) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldId, &str)> {
        self.0.iter().map(|(id, msg)| (id, msg.as_str()))
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

pub fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

/// Validation pass over one submission.
pub struct Checker<'a> {
    submission: &'a Submission,
    next: &'a FieldSet,
    errors: &'a mut ErrorMap,
}

impl<'a> Checker<'a> {
    pub fn new(submission: &'a Submission, next: &'a FieldSet, errors: &'a mut ErrorMap) -> Self {
        Self {
            submission,
            next,
            errors,
        }
    }

    pub fn submission(&self) -> &Submission {
        self.submission
    }

    /// Attaches `message` to `role`.
    pub fn flag(&mut self, role: &str, message: impl Into<String>) {
        match self.next.identify(role) {
            Some(id) => self.errors.insert(id.clone(), message),
            None => tracing::warn!(role, "validation flagged a role outside the form"),
        }
    }

    pub fn is_flagged(&self, role: &str) -> bool {
        self.next
            .identify(role)
            .is_some_and(|id| self.errors.contains(id))
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Submitted text, or empty.
    pub fn text(&self, role: &str) -> String {
        self.submission.text(role).to_string()
    }

    pub fn checked(&self, role: &str) -> bool {
        self.submission.is_checked(role)
    }

    /// Present and non-blank.
    pub fn required(&mut self, role: &str, message: &str) -> Option<String> {
        match self.submission.get(role) {
            Some(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
            _ => {
                self.flag(role, message);
                None
            }
        }
    }

    pub fn date(&mut self, role: &str) -> Option<NaiveDate> {
        let parsed = self.submission.get(role).and_then(parse_date);
        if parsed.is_none() {
            self.flag(role, INVALID_DATE);
        }
        parsed
    }

    pub fn integer_at_least(&mut self, role: &str, min: i64, message: &str) -> Option<i64> {
        let parsed = self
            .submission
            .get(role)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|n| *n >= min);
        if parsed.is_none() {
            self.flag(role, message);
        }
        parsed
    }

    pub fn one_of(&mut self, role: &str, choices: &[&'static str], message: &str) -> Option<&'static str> {
        let found = self
            .submission
            .get(role)
            .and_then(|v| choices.iter().copied().find(|c| *c == v));
        if found.is_none() {
            self.flag(role, message);
        }
        found
    }

    /// Cross-field ordering check. Only runs when both dates parsed, and
    /// reports on the later field.
    pub fn not_before(
        &mut self,
        later_role: &str,
        earlier: Option<NaiveDate>,
        later: Option<NaiveDate>,
        message: &str,
    ) -> bool {
        match (earlier, later) {
            (Some(earlier), Some(later)) if later < earlier => {
                self.flag(later_role, message);
                false
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldSpec, Values};
    use crate::request::{Request, Token, Transition};

    fn read(pairs: &[(&str, &str)]) -> (Submission, FieldSet) {
        let fields = FieldSet::initial(
            vec![
                FieldSpec::text("name", 40),
                FieldSpec::text("start", 20),
                FieldSpec::text("end", 20),
                FieldSpec::text("winners", 3),
                FieldSpec::radio("method", &["a", "b"]),
            ],
            &Values::new(),
        )
        .unwrap();
        let mut req = Request::new(Token::new("t"), Transition::Submit);
        for (k, v) in pairs {
            req = req.with_param(*k, *v);
        }
        let submission = fields.read(&req);
        let next = submission.rebuild();
        (submission, next)
    }

    #[test]
    fn test_required_flags_blank_and_missing() {
        let (submission, next) = read(&[("name.0", "   ")]);
        let mut errors = ErrorMap::new();
        let mut ck = Checker::new(&submission, &next, &mut errors);
        assert_eq!(ck.required("name", "Name required."), None);
        assert_eq!(ck.required("start", "Start required."), None);
        drop(ck);
        assert_eq!(
            errors.get(&FieldId::for_role("name", 1)),
            Some("Name required.")
        );
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_date_checks_are_independent() {
        let (submission, next) = read(&[("start.0", "2024-13-01"), ("end.0", "2024-03-01")]);
        let mut errors = ErrorMap::new();
        let mut ck = Checker::new(&submission, &next, &mut errors);
        assert_eq!(ck.date("start"), None);
        assert_eq!(ck.date("end"), NaiveDate::from_ymd_opt(2024, 3, 1));
        drop(ck);
        assert_eq!(errors.get(&FieldId::for_role("start", 1)), Some(INVALID_DATE));
        assert!(!errors.contains(&FieldId::for_role("end", 1)));
    }

    #[test]
    fn test_not_before_attaches_to_later_field_only() {
        let (submission, next) = read(&[("start.0", "2024-03-10"), ("end.0", "2024-03-01")]);
        let mut errors = ErrorMap::new();
        let mut ck = Checker::new(&submission, &next, &mut errors);
        let start = ck.date("start");
        let end = ck.date("end");
        assert!(!ck.not_before("end", start, end, "End date cannot be before start date."));
        drop(ck);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.get(&FieldId::for_role("end", 1)),
            Some("End date cannot be before start date.")
        );
    }

    #[test]
    fn test_not_before_skips_unparsed_sides() {
        let (submission, next) = read(&[]);
        let mut errors = ErrorMap::new();
        let mut ck = Checker::new(&submission, &next, &mut errors);
        assert!(ck.not_before("end", None, NaiveDate::from_ymd_opt(2024, 1, 1), "x"));
        assert!(!ck.has_errors());
    }

    #[test]
    fn test_integer_and_choice() {
        let (submission, next) = read(&[("winners.0", "0"), ("method.0", "b")]);
        let mut errors = ErrorMap::new();
        let mut ck = Checker::new(&submission, &next, &mut errors);
        assert_eq!(ck.integer_at_least("winners", 1, "At least one."), None);
        assert_eq!(ck.one_of("method", &["a", "b"], "Pick one."), Some("b"));
        assert!(ck.is_flagged("winners"));
        assert!(!ck.is_flagged("method"));
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(NaiveDate::from_ymd_opt(2024, 3, 1)), "2024-03-01");
        assert_eq!(format_date(None), "");
        assert_eq!(parse_date(" 2024-03-01 "), NaiveDate::from_ymd_opt(2024, 3, 1));
    }
}
