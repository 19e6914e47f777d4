//! Stepform core crate.
//!
//! The crate separates a form workflow into layers:
//!
//! - `markup` + `writer` + `page`: the node tree and its indented HTML
//!   serialization.
//! - `fields` + `validate`: per-render field tables with deterministic wire
//!   identifiers, and the error map produced by one validation pass.
//! - `request` + `action` + `form`: the request abstraction, server-held
//!   steps addressed by token, and the generic form-backed step.
//!
//! One submission cycle:
//!
//! 1. Read the values through the table the user saw.
//! 2. Rebuild the next table from those values.
//! 3. Validate all fields, then re-render with errors or commit once and
//!    delegate to the success continuation.
//!
//! The rule that holds everything together: an identifier only ever resolves
//! against the table that rendered it. Values posted under any other version
//! are not read.

pub mod action;
pub mod error;
pub mod fields;
pub mod form;
pub mod markup;
pub mod page;
pub mod request;
pub mod validate;
pub mod writer;

pub use action::{Action, FnAction, Reply, STEP_MOUNT, Slot, StepContext, StepState};
pub use error::{ActionError, CoreError};
pub use fields::{CHECKED, FieldId, FieldSet, FieldSpec, InputKind, Submission, Values};
pub use form::{Form, FormStep, FormView, Mode};
pub use markup::{InputControl, InputNode, Node, Tag};
pub use page::{Head, Page, make_page};
pub use request::{Identity, Request, TRANSITION_PARAM, Token, Transition, VERSION_PARAM};
pub use validate::{Checker, ErrorMap, format_date, parse_date};
pub use writer::{MarkupWriter, escape_html};
