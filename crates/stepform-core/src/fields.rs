//! Form field registry.
//!
//! A [`FieldSet`] is the per-render table mapping each field role to the
//! wire-level [`FieldId`] embedded in the page. Identifiers are derived from
//! the role and the table version, so resolution never depends on any
//! object surviving between requests.
//!
//! Reading a submission consumes the table the user saw
//! ([`FieldSet::read`]); the next table can only be obtained from the
//! resulting [`Submission`] ([`Submission::rebuild`]). Reading fields after
//! they were rebuilt is therefore not expressible.

use crate::error::CoreError;
use crate::markup::{InputControl, InputNode};
use crate::request::Request;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Prefill values keyed by field role.
pub type Values = BTreeMap<&'static str, String>;

/// Value submitted by a checked check box.
pub const CHECKED: &str = "on";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(String);

impl FieldId {
    /// Identifier of `role` in the table with the given version.
    pub fn for_role(role: &str, version: u64) -> Self {
        Self(format!("{role}.{version}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    Text { size: u16 },
    TextArea { rows: u16, cols: u16 },
    CheckBox,
    Radio { choices: Vec<&'static str> },
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub role: &'static str,
    pub kind: InputKind,
}

impl FieldSpec {
    pub fn text(role: &'static str, size: u16) -> Self {
        Self {
            role,
            kind: InputKind::Text { size },
        }
    }

    pub fn text_area(role: &'static str, rows: u16, cols: u16) -> Self {
        Self {
            role,
            kind: InputKind::TextArea { rows, cols },
        }
    }

    pub fn check_box(role: &'static str) -> Self {
        Self {
            role,
            kind: InputKind::CheckBox,
        }
    }

    pub fn radio(role: &'static str, choices: &[&'static str]) -> Self {
        Self {
            role,
            kind: InputKind::Radio {
                choices: choices.to_vec(),
            },
        }
    }

    pub fn file(role: &'static str) -> Self {
        Self {
            role,
            kind: InputKind::File,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct BoundField {
    spec: FieldSpec,
    id: FieldId,
    value: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldSet {
    version: u64,
    fields: Vec<BoundField>,
}

impl FieldSet {
    /// Version 0 table, prefilled from `defaults`.
    pub fn initial(specs: Vec<FieldSpec>, defaults: &Values) -> Result<Self, CoreError> {
        let mut seen = HashSet::new();
        for spec in &specs {
            if !seen.insert(spec.role) {
                return Err(CoreError::DuplicateField(spec.role.to_string()));
            }
        }
        let fields = specs
            .into_iter()
            .map(|spec| {
                let value = defaults.get(spec.role).cloned().unwrap_or_default();
                (spec, value)
            })
            .collect();
        Ok(Self::build(0, fields))
    }

    fn build(version: u64, fields: Vec<(FieldSpec, String)>) -> Self {
        let fields = fields
            .into_iter()
            .map(|(spec, value)| BoundField {
                id: FieldId::for_role(spec.role, version),
                spec,
                value,
            })
            .collect();
        Self { version, fields }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn roles(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.spec.role)
    }

    /// The identifier this table embeds for `role`.
    pub fn identify(&self, role: &str) -> Option<&FieldId> {
        self.field(role).ok().map(|f| &f.id)
    }

    pub fn value(&self, role: &str) -> Option<&str> {
        self.field(role).ok().map(|f| f.value.as_str())
    }

    pub fn has_file_chooser(&self) -> bool {
        self.fields.iter().any(|f| f.spec.kind == InputKind::File)
    }

    /// Input node for a non-radio field, prefilled with this table's value.
    pub fn input(&self, role: &str) -> Result<InputNode, CoreError> {
        let field = self.field(role)?;
        let control = match &field.spec.kind {
            InputKind::Text { size } => InputControl::TextInput { size: *size },
            InputKind::TextArea { rows, cols } => InputControl::TextArea {
                rows: *rows,
                cols: *cols,
            },
            InputKind::CheckBox => InputControl::CheckBox,
            InputKind::File => InputControl::FileChooser,
            InputKind::Radio { .. } => {
                return Err(CoreError::WrongKind {
                    role: role.to_string(),
                    expected: "single input",
                });
            }
        };
        Ok(InputNode::new(field.id.clone(), control, field.value.clone()))
    }

    /// One button of a radio group. All buttons of a group share the field's
    /// identifier.
    pub fn radio(&self, role: &str, choice: &str) -> Result<InputNode, CoreError> {
        let field = self.field(role)?;
        let InputKind::Radio { choices } = &field.spec.kind else {
            return Err(CoreError::WrongKind {
                role: role.to_string(),
                expected: "radio group",
            });
        };
        let choice = choices
            .iter()
            .copied()
            .find(|c| *c == choice)
            .ok_or_else(|| CoreError::UnknownChoice {
                role: role.to_string(),
                choice: choice.to_string(),
            })?;
        Ok(InputNode::new(
            field.id.clone(),
            InputControl::RadioButton { choice },
            field.value.clone(),
        ))
    }

    pub fn kind(&self, role: &str) -> Result<&InputKind, CoreError> {
        self.field(role).map(|f| &f.spec.kind)
    }

    /// Resolves every field of the table the user replied to.
    pub fn read(self, req: &Request) -> Submission {
        let version = self.version;
        let fields = self
            .fields
            .into_iter()
            .map(|field| {
                let submitted = req.param(&field.id).map(str::to_string);
                SubmittedField {
                    spec: field.spec,
                    previous: field.value,
                    submitted,
                }
            })
            .collect();
        Submission { version, fields }
    }

    fn field(&self, role: &str) -> Result<&BoundField, CoreError> {
        self.fields
            .iter()
            .find(|f| f.spec.role == role)
            .ok_or_else(|| CoreError::UnknownField(role.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct SubmittedField {
    spec: FieldSpec,
    previous: String,
    submitted: Option<String>,
}

impl SubmittedField {
    /// A file input cannot be prefilled, so an empty upload keeps the earlier content.
    fn value(&self) -> Option<&str> {
        match (&self.spec.kind, self.submitted.as_deref()) {
            (InputKind::File, None | Some("")) if !self.previous.is_empty() => {
                Some(self.previous.as_str())
            }
            (_, submitted) => submitted,
        }
    }

    /// What the next render shows for this field.
    fn carried_value(&self) -> String {
        match (&self.spec.kind, &self.submitted) {
            (InputKind::File, _) => self.value().unwrap_or_default().to_string(),
            (InputKind::CheckBox, Some(_)) => CHECKED.to_string(),
            (InputKind::CheckBox, None) => String::new(),
            (InputKind::Radio { choices }, Some(v)) if choices.iter().any(|c| *c == v.as_str()) => {
                v.clone()
            }
            (InputKind::Radio { .. }, _) => self.previous.clone(),
            (_, Some(v)) => v.clone(),
            (_, None) => self.previous.clone(),
        }
    }
}

/// Values read from one request through the table the user saw.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    version: u64,
    fields: Vec<SubmittedField>,
}

impl Submission {
    /// Version of the table these values were resolved against.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Submitted value, absent when the request did not carry the field.
    /// File fields fall back to the content uploaded in an earlier round.
    pub fn get(&self, role: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.spec.role == role)
            .and_then(SubmittedField::value)
    }

    pub fn text(&self, role: &str) -> &str {
        self.get(role).unwrap_or_default()
    }

    pub fn is_checked(&self, role: &str) -> bool {
        self.get(role).is_some_and(|v| !v.is_empty())
    }

    /// Next table: fresh identifiers, prefilled with what was submitted.
    pub fn rebuild(&self) -> FieldSet {
        let fields = self
            .fields
            .iter()
            .map(|f| (f.spec.clone(), f.carried_value()))
            .collect();
        FieldSet::build(self.version + 1, fields)
    }
}
