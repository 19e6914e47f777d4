//! Form-backed workflow steps.
//!
//! [`FormStep`] drives one render → submit → (re-render | delegate) cycle for
//! a concrete [`Form`]. On submission it always:
//!
//! 1. reads the values through the field table the user saw,
//! 2. rebuilds the next table from those values,
//! 3. validates every field,
//! 4. re-renders with the error map when anything failed, or
//! 5. commits the payload once and delegates to the success continuation.

use crate::action::{Action, Reply, Slot, StepContext, StepState};
use crate::error::{ActionError, CoreError};
use crate::fields::{FieldSet, FieldSpec, Values};
use crate::markup::{self, InputNode, Node};
use crate::page::{Page, make_page};
use crate::request::{Request, TRANSITION_PARAM, Token, Transition, VERSION_PARAM};
use crate::validate::{Checker, ErrorMap};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    Edit,
    /// Fields render as text, there is no submit control and no form.
    View,
}

impl Mode {
    pub fn is_read_only(self) -> bool {
        self == Self::View
    }
}

pub trait Form: Send + 'static {
    type Payload: Send + 'static;
    type Output;

    fn title(&self, mode: Mode) -> String;

    fn fields(&self) -> Vec<FieldSpec>;

    /// Prefill values for the first render.
    fn defaults(&self, payload: &Self::Payload) -> Values;

    /// Checks the submission. The output is discarded if any error was
    /// recorded.
    fn validate(&self, ck: &mut Checker<'_>) -> Option<Self::Output>;

    /// Applies validated values. On error the payload must be left as it
    /// was; [`ActionError::Collaborator`] re-renders the step with the
    /// message, anything else fails the request.
    fn commit(&mut self, payload: &mut Self::Payload, output: Self::Output)
    -> Result<(), ActionError>;

    fn layout(&self, view: &FormView<'_, Self::Payload>) -> Result<Node, CoreError>;

    fn submit_label(&self, mode: Mode) -> String {
        match mode {
            Mode::Create => "Create".to_string(),
            _ => "Update".to_string(),
        }
    }

    fn cancel_label(&self, mode: Mode) -> String {
        if mode.is_read_only() {
            "Return".to_string()
        } else {
            "Cancel".to_string()
        }
    }

    /// Starts the sub-workflow `kind`. Its continuations should be `owner`
    /// so the user comes back to this step.
    fn open(
        &mut self,
        kind: &str,
        payload: &Self::Payload,
        owner: &Token,
        cx: &mut dyn StepContext,
    ) -> Result<Token, ActionError> {
        let _ = (payload, owner, cx);
        Err(ActionError::UnsupportedTransition {
            step: self.title(Mode::Edit),
            transition: Transition::Open(kind.to_string()).as_param(),
        })
    }

    /// Absorbs results of finished sub-workflows before the step is shown
    /// again.
    fn resume(&mut self, payload: &mut Self::Payload) {
        let _ = payload;
    }
}

/// Everything a layout needs for one render.
pub struct FormView<'a, P> {
    pub mode: Mode,
    pub payload: &'a P,
    pub fields: &'a FieldSet,
    pub errors: &'a ErrorMap,
    pub notice: Option<&'a str>,
    owner: &'a Token,
    submit_label: String,
    cancel_label: String,
    action_url: String,
}

impl<P> FormView<'_, P> {
    pub fn owner(&self) -> &Token {
        self.owner
    }

    pub fn input(&self, role: &str) -> Result<InputNode, CoreError> {
        self.fields.input(role)
    }

    pub fn radio(&self, role: &str, choice: &str) -> Result<InputNode, CoreError> {
        self.fields.radio(role, choice)
    }

    pub fn value(&self, role: &str) -> &str {
        self.fields.value(role).unwrap_or_default()
    }

    pub fn error(&self, role: &str) -> Option<&str> {
        self.fields
            .identify(role)
            .and_then(|id| self.errors.get(id))
    }

    /// The cell for `role`: an input, or its value as text in read-only
    /// mode, followed by an error cell when the field was flagged.
    pub fn field_cells(&self, role: &str) -> Result<Node, CoreError> {
        let content = if self.mode.is_read_only() {
            markup::text(self.value(role))
        } else {
            self.input(role)?.into()
        };
        let cell = markup::cell(content);
        Ok(match self.error(role) {
            Some(message) => Node::list([cell, markup::error_cell(message)]),
            None => cell,
        })
    }

    pub fn link(&self, transition: Transition, label: impl Into<String>) -> Node {
        let href = format!(
            "{}?{}={}",
            self.action_url,
            TRANSITION_PARAM,
            transition.as_param()
        );
        markup::hyperlink(href, Node::text(label))
    }

    /// Link into the sub-workflow `kind`; absent in read-only mode.
    pub fn open_link(&self, kind: &str, label: impl Into<String>) -> Node {
        if self.mode.is_read_only() {
            return Node::Empty;
        }
        self.link(Transition::Open(kind.to_string()), label)
    }

    pub fn cancel_link(&self) -> Node {
        self.link(Transition::Cancel, self.cancel_label.clone())
    }

    /// Submit control; absent in read-only mode.
    pub fn submit(&self) -> Node {
        if self.mode.is_read_only() {
            return Node::Empty;
        }
        markup::submit_button(self.submit_label.clone())
    }
}

pub struct FormStep<F: Form> {
    form: F,
    mode: Mode,
    slot: Slot<F::Payload>,
    success: Token,
    cancel: Token,
    fields: FieldSet,
    state: StepState,
    login_required: bool,
    name: String,
}

impl<F: Form> FormStep<F> {
    pub fn new(
        form: F,
        mode: Mode,
        slot: Slot<F::Payload>,
        success: Token,
        cancel: Token,
    ) -> Result<Self, ActionError> {
        let defaults = slot
            .with(|payload| form.defaults(payload))
            .ok_or(ActionError::PayloadCleared)?;
        let fields = FieldSet::initial(form.fields(), &defaults)?;
        let name = form.title(mode);
        Ok(Self {
            form,
            mode,
            slot,
            success,
            cancel,
            fields,
            state: StepState::RenderInitial,
            login_required: true,
            name,
        })
    }

    /// Allows anonymous callers.
    pub fn public(mut self) -> Self {
        self.login_required = false;
        self
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    pub fn form(&self) -> &F {
        &self.form
    }

    fn render(
        &mut self,
        cx: &mut dyn StepContext,
        errors: ErrorMap,
        notice: Option<&str>,
    ) -> Result<Page, ActionError> {
        let owner = cx.self_token().clone();
        let action_url = cx.action_url(&owner);
        let title = self.form.title(self.mode);
        let body = self
            .slot
            .with(|payload| {
                let view = FormView {
                    mode: self.mode,
                    payload,
                    fields: &self.fields,
                    errors: &errors,
                    notice,
                    owner: &owner,
                    submit_label: self.form.submit_label(self.mode),
                    cancel_label: self.form.cancel_label(self.mode),
                    action_url: action_url.clone(),
                };
                self.form.layout(&view)
            })
            .ok_or(ActionError::PayloadCleared)??;

        let has_notice = notice.is_some();
        let notice = notice
            .map(|msg| markup::paragraph(markup::span("error", msg)))
            .unwrap_or_default();
        let content = if self.mode.is_read_only() {
            body
        } else {
            markup::form(
                action_url,
                self.fields.has_file_chooser(),
                Node::list([
                    markup::hidden(TRANSITION_PARAM, "submit"),
                    markup::hidden(VERSION_PARAM, self.fields.version().to_string()),
                    body,
                ]),
            )
        };

        self.state = if errors.is_empty() && !has_notice {
            StepState::AwaitingSubmission
        } else {
            StepState::RenderWithErrors
        };
        debug!(step = %self.name, version = self.fields.version(), errors = errors.len(), "rendering step");
        Ok(make_page(title.clone(), Node::list([markup::banner(title), notice, content]))
            .with_errors(errors))
    }

    fn submit(&mut self, req: &Request, cx: &mut dyn StepContext) -> Result<Reply, ActionError> {
        if self.mode.is_read_only() {
            return Err(ActionError::ReadOnly(self.name.clone()));
        }
        self.state = StepState::Validating;

        let submission = std::mem::take(&mut self.fields).read(req);
        self.fields = submission.rebuild();

        let mut errors = ErrorMap::new();
        let output = {
            let mut ck = Checker::new(&submission, &self.fields, &mut errors);
            self.form.validate(&mut ck)
        };

        let output = match output {
            Some(output) if errors.is_empty() => output,
            _ => {
                debug!(step = %self.name, errors = errors.len(), "validation failed");
                return self.render(cx, errors, None).map(Reply::Page);
            }
        };

        let form = &mut self.form;
        let committed = self
            .slot
            .commit_with(|payload| form.commit(payload, output))
            .ok_or(ActionError::PayloadCleared)?;
        match committed {
            Ok(()) => {
                info!(step = %self.name, "step committed");
                self.state = StepState::Committed;
                Ok(Reply::Delegate(self.success.clone()))
            }
            Err(err) if err.is_recoverable() => {
                warn!(step = %self.name, error = %err, "commit failed, re-rendering");
                let message = err.to_string();
                self.render(cx, ErrorMap::new(), Some(&message)).map(Reply::Page)
            }
            Err(err) => Err(err),
        }
    }
}

impl<F: Form> Action for FormStep<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_login(&self) -> bool {
        self.login_required
    }

    fn invoke(&mut self, req: &Request, cx: &mut dyn StepContext) -> Result<Reply, ActionError> {
        if self.state.is_terminal() {
            return Err(ActionError::StepFinished(self.name.clone()));
        }
        if self.login_required && req.identity().is_none() {
            debug!(step = %self.name, "login required, suspending step");
            return Ok(Reply::Login);
        }

        match req.transition() {
            Transition::Enter => {
                let form = &mut self.form;
                self.slot
                    .update(|payload| form.resume(payload))
                    .ok_or(ActionError::PayloadCleared)?;
                self.render(cx, ErrorMap::new(), None).map(Reply::Page)
            }
            Transition::Submit => self.submit(req, cx),
            Transition::Cancel => {
                info!(step = %self.name, "step cancelled");
                self.slot.clear();
                self.state = StepState::Cancelled;
                Ok(Reply::Delegate(self.cancel.clone()))
            }
            Transition::Open(kind) => {
                if self.mode.is_read_only() {
                    return Err(ActionError::ReadOnly(self.name.clone()));
                }
                let owner = cx.self_token().clone();
                let form = &mut self.form;
                let token = self
                    .slot
                    .with(|payload| form.open(kind, payload, &owner, cx))
                    .ok_or(ActionError::PayloadCleared)??;
                debug!(step = %self.name, kind = %kind, sub = %token, "opening sub-workflow");
                Ok(Reply::Delegate(token))
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    fn rendered_version(&self) -> Option<u64> {
        (!self.mode.is_read_only()).then_some(self.fields.version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::FnAction;
    use crate::fields::{CHECKED, FieldId};
    use crate::validate::format_date;
    use chrono::NaiveDate;

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Meeting {
        name: String,
        day: Option<NaiveDate>,
        public: bool,
        notes: u32,
    }

    struct MeetingInput {
        name: String,
        day: NaiveDate,
        public: bool,
    }

    #[derive(Default)]
    struct MeetingForm {
        store_down: bool,
        resumed: u32,
    }

    impl Form for MeetingForm {
        type Payload = Meeting;
        type Output = MeetingInput;

        fn title(&self, mode: Mode) -> String {
            match mode {
                Mode::Create => "New meeting".to_string(),
                _ => "Meeting".to_string(),
            }
        }

        fn fields(&self) -> Vec<FieldSpec> {
            vec![
                FieldSpec::text("name", 40),
                FieldSpec::text("day", 12),
                FieldSpec::check_box("public"),
            ]
        }

        fn defaults(&self, payload: &Meeting) -> Values {
            let mut values = Values::new();
            values.insert("name", payload.name.clone());
            values.insert("day", format_date(payload.day));
            if payload.public {
                values.insert("public", CHECKED.to_string());
            }
            values
        }

        fn validate(&self, ck: &mut Checker<'_>) -> Option<MeetingInput> {
            let name = ck.required("name", "Name required.");
            let day = ck.date("day");
            let public = ck.checked("public");
            Some(MeetingInput {
                name: name?,
                day: day?,
                public,
            })
        }

        fn commit(&mut self, payload: &mut Meeting, output: MeetingInput) -> Result<(), ActionError> {
            if self.store_down {
                self.store_down = false;
                return Err(ActionError::collaborator("meeting store unavailable"));
            }
            payload.name = output.name;
            payload.day = Some(output.day);
            payload.public = output.public;
            Ok(())
        }

        fn layout(&self, view: &FormView<'_, Meeting>) -> Result<Node, CoreError> {
            let rows = Node::list([
                markup::row(Node::list([markup::desc("Name"), view.field_cells("name")?])),
                markup::row(Node::list([markup::desc("Day"), view.field_cells("day")?])),
                markup::row(Node::list([markup::desc("Public"), view.field_cells("public")?])),
            ]);
            Ok(Node::list([
                markup::table(None, rows),
                view.open_link("notes", "Add notes"),
                view.submit(),
                view.cancel_link(),
            ]))
        }

        fn open(
            &mut self,
            kind: &str,
            _payload: &Meeting,
            owner: &Token,
            cx: &mut dyn StepContext,
        ) -> Result<Token, ActionError> {
            if kind != "notes" {
                return Err(ActionError::UnsupportedTransition {
                    step: "Meeting".to_string(),
                    transition: kind.to_string(),
                });
            }
            let owner = owner.clone();
            Ok(cx.spawn(Box::new(FnAction::new("notes", move |_, _| {
                Ok(Reply::Delegate(owner.clone()))
            }))))
        }

        fn resume(&mut self, payload: &mut Meeting) {
            self.resumed += 1;
            payload.notes += 1;
        }
    }

    struct TestCx {
        token: Token,
        spawned: Vec<(Token, Box<dyn Action>)>,
    }

    impl TestCx {
        fn new() -> Self {
            Self {
                token: Token::new("meeting"),
                spawned: Vec::new(),
            }
        }
    }

    impl StepContext for TestCx {
        fn self_token(&self) -> &Token {
            &self.token
        }

        fn spawn(&mut self, action: Box<dyn Action>) -> Token {
            let token = Token::new(format!("sub{}", self.spawned.len()));
            self.spawned.push((token.clone(), action));
            token
        }
    }

    fn step(mode: Mode, slot: &Slot<Meeting>) -> FormStep<MeetingForm> {
        FormStep::new(
            MeetingForm::default(),
            mode,
            slot.clone(),
            Token::new("done"),
            Token::new("home"),
        )
        .unwrap()
    }

    fn enter() -> Request {
        Request::new(Token::new("meeting"), Transition::Enter).with_user("alice")
    }

    fn submit(pairs: &[(&str, &str)]) -> Request {
        let mut req = Request::new(Token::new("meeting"), Transition::Submit).with_user("alice");
        for (k, v) in pairs {
            req = req.with_param(*k, *v);
        }
        req
    }

    fn page(reply: Reply) -> Page {
        match reply {
            Reply::Page(page) => page,
            other => panic!("expected a page, got {other:?}"),
        }
    }

    #[test]
    fn test_initial_render_embeds_version_zero() {
        let slot = Slot::new(Meeting {
            name: "Standup".to_string(),
            ..Meeting::default()
        });
        let mut step = step(Mode::Create, &slot);
        let mut cx = TestCx::new();

        let page = page(step.invoke(&enter(), &mut cx).unwrap());
        let html = page.render();
        assert!(html.contains("<form method=\"post\" action=\"/step/meeting\">"));
        assert!(html.contains("name=\"_v\" value=\"0\""));
        assert!(html.contains("name=\"name.0\" size=\"40\" value=\"Standup\""));
        assert!(!html.contains("enctype"));
        assert_eq!(step.state(), StepState::AwaitingSubmission);
        assert_eq!(step.rendered_version(), Some(0));
        assert_eq!(step.form().resumed, 1);
    }

    #[test]
    fn test_invalid_submit_reports_every_error_and_keeps_values() {
        let slot = Slot::new(Meeting::default());
        let mut step = step(Mode::Create, &slot);
        let mut cx = TestCx::new();
        step.invoke(&enter(), &mut cx).unwrap();

        let reply = step
            .invoke(&submit(&[("name.0", " "), ("day.0", "2024-02-30")]), &mut cx)
            .unwrap();
        let page = page(reply);

        assert_eq!(page.errors().len(), 2);
        assert_eq!(
            page.errors().get(&FieldId::for_role("name", 1)),
            Some("Name required.")
        );
        assert!(page.errors().contains(&FieldId::for_role("day", 1)));
        let day = page
            .body()
            .inputs()
            .into_iter()
            .find(|i| i.id() == &FieldId::for_role("day", 1))
            .map(|i| i.value().to_string());
        assert_eq!(day.as_deref(), Some("2024-02-30"));
        assert!(page.render().contains("<td class=\"error\">Not a valid date.</td>"));
        assert_eq!(step.state(), StepState::RenderWithErrors);
        assert_eq!(slot.commits(), 0);
        assert_eq!(slot.get(), Some(Meeting::default()));
    }

    #[test]
    fn test_valid_submit_commits_once_and_delegates() {
        let slot = Slot::new(Meeting {
            public: true,
            ..Meeting::default()
        });
        let mut step = step(Mode::Edit, &slot);
        let mut cx = TestCx::new();
        step.invoke(&enter(), &mut cx).unwrap();

        // unchecked box is simply absent
        let reply = step
            .invoke(&submit(&[("name.0", "Retro"), ("day.0", "2024-03-01")]), &mut cx)
            .unwrap();
        assert!(matches!(reply, Reply::Delegate(t) if t.as_str() == "done"));
        assert_eq!(step.state(), StepState::Committed);
        assert!(step.is_finished());
        assert_eq!(slot.commits(), 1);
        let meeting = slot.get().unwrap();
        assert_eq!(meeting.name, "Retro");
        assert_eq!(meeting.day, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert!(!meeting.public);

        let again = step.invoke(&submit(&[("name.1", "Retro")]), &mut cx);
        assert!(matches!(again, Err(ActionError::StepFinished(_))));
        assert_eq!(slot.commits(), 1);
    }

    #[test]
    fn test_repeated_entry_keeps_one_identifier_per_field() {
        let slot = Slot::new(Meeting::default());
        let mut step = step(Mode::Create, &slot);
        let mut cx = TestCx::new();

        let first = page(step.invoke(&enter(), &mut cx).unwrap());
        let second = page(step.invoke(&enter(), &mut cx).unwrap());
        for page in [&first, &second] {
            let html = page.render();
            assert!(html.contains("name=\"_v\" value=\"0\""));
            assert_eq!(html.matches("name=\"name.0\"").count(), 1);
            assert_eq!(html.matches("name=\"day.0\"").count(), 1);
        }
        let ids = |page: &Page| {
            page.body()
                .inputs()
                .into_iter()
                .map(|i| i.id().clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(step.rendered_version(), Some(0));

        let reply = step
            .invoke(&submit(&[("name.0", "Retro"), ("day.0", "2024-03-01")]), &mut cx)
            .unwrap();
        assert!(matches!(reply, Reply::Delegate(_)));
        assert_eq!(slot.commits(), 1);
        assert_eq!(slot.get().unwrap().name, "Retro");
    }

    #[test]
    fn test_plain_entry_after_errors_awaits_submission() {
        let slot = Slot::new(Meeting::default());
        let mut step = step(Mode::Create, &slot);
        let mut cx = TestCx::new();
        step.invoke(&enter(), &mut cx).unwrap();

        step.invoke(&submit(&[("name.0", "")]), &mut cx).unwrap();
        assert_eq!(step.state(), StepState::RenderWithErrors);

        let page = page(step.invoke(&enter(), &mut cx).unwrap());
        assert!(page.errors().is_empty());
        assert_eq!(step.state(), StepState::AwaitingSubmission);
    }

    #[test]
    fn test_values_under_stale_ids_are_not_read() {
        let slot = Slot::new(Meeting::default());
        let mut step = step(Mode::Create, &slot);
        let mut cx = TestCx::new();
        step.invoke(&enter(), &mut cx).unwrap();

        let page = page(
            step.invoke(&submit(&[("name.1", "Retro"), ("day.1", "2024-03-01")]), &mut cx)
                .unwrap(),
        );
        assert_eq!(page.errors().len(), 2);

        let reply = step
            .invoke(&submit(&[("name.1", "Retro"), ("day.1", "2024-03-01")]), &mut cx)
            .unwrap();
        assert!(matches!(reply, Reply::Delegate(_)));
    }

    #[test]
    fn test_cancel_clears_payload() {
        let slot = Slot::new(Meeting::default());
        let mut step = step(Mode::Create, &slot);
        let mut cx = TestCx::new();
        step.invoke(&enter(), &mut cx).unwrap();

        let req = Request::new(Token::new("meeting"), Transition::Cancel).with_user("alice");
        let reply = step.invoke(&req, &mut cx).unwrap();
        assert!(matches!(reply, Reply::Delegate(t) if t.as_str() == "home"));
        assert!(slot.is_cleared());
        assert_eq!(step.state(), StepState::Cancelled);
        assert_eq!(slot.commits(), 0);
    }

    #[test]
    fn test_anonymous_caller_must_log_in() {
        let slot = Slot::new(Meeting::default());
        let mut step = step(Mode::Create, &slot);
        let mut cx = TestCx::new();

        let req = Request::new(Token::new("meeting"), Transition::Enter);
        assert!(matches!(step.invoke(&req, &mut cx).unwrap(), Reply::Login));
        assert_eq!(step.state(), StepState::RenderInitial);

        let mut public = FormStep::new(
            MeetingForm::default(),
            Mode::Create,
            slot.clone(),
            Token::new("done"),
            Token::new("home"),
        )
        .unwrap()
        .public();
        assert!(matches!(public.invoke(&req, &mut cx).unwrap(), Reply::Page(_)));
    }

    #[test]
    fn test_read_only_mode_has_no_form() {
        let slot = Slot::new(Meeting {
            name: "Standup".to_string(),
            ..Meeting::default()
        });
        let mut step = step(Mode::View, &slot);
        let mut cx = TestCx::new();

        let html = page(step.invoke(&enter(), &mut cx).unwrap()).render();
        assert!(!html.contains("<form"));
        assert!(!html.contains("type=\"submit\""));
        assert!(!html.contains("open:notes"));
        assert!(html.contains("Standup"));
        assert!(html.contains(">Return</a>"));
        assert_eq!(step.rendered_version(), None);

        let err = step.invoke(&submit(&[("name.0", "x")]), &mut cx).unwrap_err();
        assert!(matches!(err, ActionError::ReadOnly(_)));
    }

    #[test]
    fn test_collaborator_failure_re_renders_without_committing() {
        let slot = Slot::new(Meeting::default());
        let mut step = FormStep::new(
            MeetingForm {
                store_down: true,
                ..MeetingForm::default()
            },
            Mode::Create,
            slot.clone(),
            Token::new("done"),
            Token::new("home"),
        )
        .unwrap();
        let mut cx = TestCx::new();
        step.invoke(&enter(), &mut cx).unwrap();

        let page = page(
            step.invoke(&submit(&[("name.0", "Retro"), ("day.0", "2024-03-01")]), &mut cx)
                .unwrap(),
        );
        assert!(page.errors().is_empty());
        assert!(page.render().contains("meeting store unavailable"));
        assert_eq!(slot.commits(), 0);
        assert_eq!(slot.get(), Some(Meeting::default()));

        let reply = step
            .invoke(&submit(&[("name.1", "Retro"), ("day.1", "2024-03-01")]), &mut cx)
            .unwrap();
        assert!(matches!(reply, Reply::Delegate(_)));
        assert_eq!(slot.commits(), 1);
    }

    #[test]
    fn test_open_spawns_sub_workflow_and_resume_absorbs_it() {
        let slot = Slot::new(Meeting::default());
        let mut step = step(Mode::Edit, &slot);
        let mut cx = TestCx::new();
        let html = page(step.invoke(&enter(), &mut cx).unwrap()).render();
        assert!(html.contains("href=\"/step/meeting?_do=open:notes\""));

        let req = Request::new(Token::new("meeting"), Transition::Open("notes".to_string()))
            .with_user("alice");
        let reply = step.invoke(&req, &mut cx).unwrap();
        assert!(matches!(reply, Reply::Delegate(t) if t.as_str() == "sub0"));
        assert_eq!(cx.spawned.len(), 1);

        step.invoke(&enter(), &mut cx).unwrap();
        assert_eq!(slot.get().map(|m| m.notes), Some(2));

        let req = Request::new(Token::new("meeting"), Transition::Open("agenda".to_string()))
            .with_user("alice");
        let err = step.invoke(&req, &mut cx).unwrap_err();
        assert!(matches!(err, ActionError::UnsupportedTransition { .. }));
    }
}
