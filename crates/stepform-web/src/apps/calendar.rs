//! Calendar event editor.
//!
//! [`CalendarHome`] lists the events a user may see and starts create, edit
//! and view steps for them. [`EventForm`] edits one event and hands off to
//! [`SelectUsers`] for the attendee and time-reader lists; those sub-steps
//! return to the event step, which absorbs their result when it is entered
//! again.

use crate::nonce::NonceSource;
use crate::store::RecordStore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stepform_core::markup::{self, Node};
use stepform_core::{
    Action, ActionError, Checker, CoreError, FieldSpec, Form, FormStep, FormView, Mode,
    Reply, Request, Slot, StepContext, Token, Transition, Values, format_date, make_page,
};
use tracing::{debug, info};

pub const NAME_REQUIRED: &str = "Event name must be provided.";
pub const END_BEFORE_START: &str = "End date cannot be before start date.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub note: String,
    pub creator: String,
    pub attendees: Vec<String>,
    pub time_readers: Vec<String>,
}

impl Event {
    pub fn new(creator: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            start: None,
            end: None,
            note: String::new(),
            creator: creator.into(),
            attendees: Vec::new(),
            time_readers: Vec::new(),
        }
    }

    pub fn may_edit(&self, user: &str) -> bool {
        self.creator == user
    }

    /// Creator, attendees and time readers see the event.
    pub fn may_view(&self, user: &str) -> bool {
        self.may_edit(user)
            || self.attendees.iter().any(|u| u == user)
            || self.time_readers.iter().any(|u| u == user)
    }
}

/// One user id per line.
pub fn users_to_string(users: &[String]) -> String {
    users.join("\n")
}

/// Splits on whitespace and commas, keeping first occurrences in order.
pub fn parse_users(raw: &str) -> Vec<String> {
    let mut users: Vec<String> = Vec::new();
    for user in raw.split(|c: char| c.is_whitespace() || c == ',') {
        if !user.is_empty() && !users.iter().any(|u| u == user) {
            users.push(user.to_string());
        }
    }
    users
}

fn is_user_id(user: &str) -> bool {
    user.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserList {
    Attendees,
    TimeReaders,
}

impl UserList {
    pub fn kind(self) -> &'static str {
        match self {
            Self::Attendees => "attendees",
            Self::TimeReaders => "time-readers",
        }
    }

    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "attendees" => Some(Self::Attendees),
            "time-readers" => Some(Self::TimeReaders),
            _ => None,
        }
    }

    fn prompt(self) -> &'static str {
        match self {
            Self::Attendees => "Please enter the user ids of the event attendees.",
            Self::TimeReaders => {
                "Please enter the user ids of who may see the existence of this event."
            }
        }
    }

    fn of(self, event: &Event) -> &Vec<String> {
        match self {
            Self::Attendees => &event.attendees,
            Self::TimeReaders => &event.time_readers,
        }
    }

    fn of_mut(self, event: &mut Event) -> &mut Vec<String> {
        match self {
            Self::Attendees => &mut event.attendees,
            Self::TimeReaders => &mut event.time_readers,
        }
    }
}

/// Edits a list of user ids.
pub struct SelectUsers {
    prompt: String,
    required: bool,
}

impl SelectUsers {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            required: false,
        }
    }

    /// Rejects an empty list.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

impl Form for SelectUsers {
    type Payload = Vec<String>;
    type Output = Vec<String>;

    fn title(&self, _mode: Mode) -> String {
        "Select Users".to_string()
    }

    fn fields(&self) -> Vec<FieldSpec> {
        vec![FieldSpec::text_area("users", 6, 40)]
    }

    fn defaults(&self, users: &Vec<String>) -> Values {
        Values::from([("users", users_to_string(users))])
    }

    fn validate(&self, ck: &mut Checker<'_>) -> Option<Vec<String>> {
        let users = parse_users(&ck.text("users"));
        if self.required && users.is_empty() {
            ck.flag("users", "At least one user id must be entered.");
            return None;
        }
        if let Some(bad) = users.iter().find(|u| !is_user_id(u)) {
            ck.flag("users", format!("Not a valid user id: {bad}"));
            return None;
        }
        Some(users)
    }

    fn commit(&mut self, users: &mut Vec<String>, output: Vec<String>) -> Result<(), ActionError> {
        *users = output;
        Ok(())
    }

    fn layout(&self, view: &FormView<'_, Vec<String>>) -> Result<Node, CoreError> {
        Ok(Node::list([
            markup::paragraph(self.prompt.clone()),
            markup::table(
                None,
                Node::list([
                    markup::row(Node::list([
                        markup::desc("User ids:"),
                        view.field_cells("users")?,
                    ])),
                    markup::row(markup::cell(view.submit())),
                    markup::row(markup::cell(view.cancel_link())),
                ]),
            ),
        ]))
    }

    fn submit_label(&self, _mode: Mode) -> String {
        "Save".to_string()
    }
}

pub struct EventInput {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub note: String,
}

struct PendingList {
    list: UserList,
    slot: Slot<Vec<String>>,
}

/// Create, edit or view one event. Committing saves the event to the store.
pub struct EventForm {
    store: Arc<dyn RecordStore<Event>>,
    nonces: Arc<dyn NonceSource>,
    id: Option<String>,
    pending: Vec<PendingList>,
}

impl EventForm {
    pub fn create(store: Arc<dyn RecordStore<Event>>, nonces: Arc<dyn NonceSource>) -> Self {
        Self {
            store,
            nonces,
            id: None,
            pending: Vec::new(),
        }
    }

    pub fn existing(
        store: Arc<dyn RecordStore<Event>>,
        nonces: Arc<dyn NonceSource>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::create(store, nonces)
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn user_rows(
        &self,
        view: &FormView<'_, Event>,
        label: &str,
        list: UserList,
        link: &str,
    ) -> Vec<Node> {
        let users = users_to_string(list.of(view.payload));
        vec![
            markup::row(Node::list([
                markup::desc(label.to_string()),
                markup::desc(markup::text_lines(&users)),
            ])),
            if view.mode.is_read_only() {
                Node::Empty
            } else {
                markup::row(Node::list([
                    markup::desc(""),
                    markup::desc(view.open_link(list.kind(), link.to_string())),
                ]))
            },
        ]
    }
}

impl Form for EventForm {
    type Payload = Event;
    type Output = EventInput;

    fn title(&self, mode: Mode) -> String {
        match mode {
            Mode::View => "View Event",
            Mode::Create => "Create Event",
            Mode::Edit => "Edit Event",
        }
        .to_string()
    }

    fn fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::text("name", 40),
            FieldSpec::text("start", 40),
            FieldSpec::text("end", 40),
            FieldSpec::text_area("note", 3, 40),
        ]
    }

    fn defaults(&self, event: &Event) -> Values {
        Values::from([
            ("name", event.name.clone()),
            ("start", format_date(event.start)),
            ("end", format_date(event.end)),
            ("note", event.note.clone()),
        ])
    }

    fn validate(&self, ck: &mut Checker<'_>) -> Option<EventInput> {
        let name = ck.required("name", NAME_REQUIRED);
        let start = ck.date("start");
        let end = ck.date("end");
        ck.not_before("end", start, end, END_BEFORE_START);
        let note = ck.text("note");
        Some(EventInput {
            name: name?,
            start: start?,
            end: end?,
            note,
        })
    }

    fn commit(&mut self, event: &mut Event, input: EventInput) -> Result<(), ActionError> {
        let id = match &self.id {
            Some(id) => id.clone(),
            None => format!("ev_{}", self.nonces.generate()),
        };
        let updated = Event {
            name: input.name,
            start: Some(input.start),
            end: Some(input.end),
            note: input.note,
            ..event.clone()
        };
        self.store
            .save(&id, updated.clone())
            .map_err(|err| ActionError::collaborator(format!("The event could not be saved: {err}")))?;
        info!(event = %id, name = %updated.name, "event saved");
        *event = updated;
        self.id = Some(id);
        Ok(())
    }

    fn layout(&self, view: &FormView<'_, Event>) -> Result<Node, CoreError> {
        let mut rows = vec![
            markup::row(Node::list([markup::desc("Name:"), view.field_cells("name")?])),
            markup::row(Node::list([markup::desc("Start:"), view.field_cells("start")?])),
            markup::row(Node::list([markup::desc("End:"), view.field_cells("end")?])),
            markup::row(Node::list([
                markup::desc("Creator:"),
                markup::desc(view.payload.creator.clone()),
            ])),
        ];
        rows.extend(self.user_rows(view, "Attendees:", UserList::Attendees, "Edit attendees"));
        rows.push(markup::row(Node::list([
            markup::desc("Note:"),
            view.field_cells("note")?,
        ])));
        rows.extend(self.user_rows(
            view,
            "Event time visible to creator, attendees, and the following:",
            UserList::TimeReaders,
            "Edit time readers",
        ));
        if !view.mode.is_read_only() {
            rows.push(markup::row(markup::cell(view.submit())));
        }
        rows.push(markup::row(markup::cell(view.cancel_link())));
        Ok(markup::table(None, rows))
    }

    fn submit_label(&self, mode: Mode) -> String {
        match mode {
            Mode::Create => "Create event".to_string(),
            _ => "Update event".to_string(),
        }
    }

    fn open(
        &mut self,
        kind: &str,
        event: &Event,
        owner: &Token,
        cx: &mut dyn StepContext,
    ) -> Result<Token, ActionError> {
        let list = UserList::from_kind(kind).ok_or_else(|| ActionError::UnsupportedTransition {
            step: "Event".to_string(),
            transition: Transition::Open(kind.to_string()).as_param(),
        })?;
        let slot = Slot::new(list.of(event).clone());
        let step = FormStep::new(
            SelectUsers::new(list.prompt()),
            Mode::Edit,
            slot.clone(),
            owner.clone(),
            owner.clone(),
        )?;
        self.pending.retain(|p| p.list != list);
        self.pending.push(PendingList { list, slot });
        Ok(cx.spawn(Box::new(step)))
    }

    fn resume(&mut self, event: &mut Event) {
        self.pending.retain(|pending| {
            if pending.slot.commits() > 0 {
                if let Some(users) = pending.slot.take() {
                    debug!(list = pending.list.kind(), count = users.len(), "user list updated");
                    *pending.list.of_mut(event) = users;
                }
                false
            } else {
                !pending.slot.is_cleared()
            }
        });
    }
}

struct OpenEdit {
    name: String,
    mode: Mode,
    slot: Slot<Event>,
}

/// Entry step of the calendar: lists visible events and starts edits.
pub struct CalendarHome {
    store: Arc<dyn RecordStore<Event>>,
    nonces: Arc<dyn NonceSource>,
    open: Vec<OpenEdit>,
    notices: Vec<String>,
}

impl CalendarHome {
    pub fn new(store: Arc<dyn RecordStore<Event>>, nonces: Arc<dyn NonceSource>) -> Self {
        Self {
            store,
            nonces,
            open: Vec::new(),
            notices: Vec::new(),
        }
    }

    /// Turns finished edits into notices for the next render and forgets
    /// edits whose step is no longer in the table.
    fn collect(&mut self) {
        let notices = &mut self.notices;
        self.open.retain(|edit| {
            if edit.slot.commits() > 0 {
                let name = edit.slot.with(|e| e.name.clone()).unwrap_or_default();
                notices.push(format!("Event \"{name}\" saved."));
                false
            } else if edit.slot.is_cleared() {
                // leaving a read-only view is not a cancellation
                if !edit.mode.is_read_only() {
                    notices.push(format!("{} cancelled.", edit.name));
                }
                false
            } else if edit.slot.is_orphaned() {
                debug!(edit = %edit.name, "abandoned edit dropped");
                false
            } else {
                true
            }
        });
    }

    fn start(
        &mut self,
        target: &str,
        user: &str,
        cx: &mut dyn StepContext,
    ) -> Result<Token, ActionError> {
        let home = cx.self_token().clone();
        let (mode, form, event) = match target.split_once(':') {
            None if target == "new" => (
                Mode::Create,
                EventForm::create(Arc::clone(&self.store), Arc::clone(&self.nonces)),
                Event::new(user),
            ),
            Some(("edit" | "view", id)) => {
                let event = self
                    .store
                    .get(id)
                    .filter(|e| e.may_view(user))
                    .ok_or_else(|| ActionError::MissingParameter(format!("event {id}")))?;
                let mode = if target.starts_with("edit") && event.may_edit(user) {
                    Mode::Edit
                } else {
                    Mode::View
                };
                let form = EventForm::existing(Arc::clone(&self.store), Arc::clone(&self.nonces), id);
                (mode, form, event)
            }
            _ => {
                return Err(ActionError::UnsupportedTransition {
                    step: "Calendar".to_string(),
                    transition: Transition::Open(target.to_string()).as_param(),
                });
            }
        };
        let name = form.title(mode);
        let slot = Slot::new(event);
        let step = FormStep::new(form, mode, slot.clone(), home.clone(), home)?;
        self.open.push(OpenEdit { name, mode, slot });
        Ok(cx.spawn(Box::new(step)))
    }

    fn render(&mut self, user: &str, cx: &dyn StepContext) -> Reply {
        let me = cx.self_token();
        let mut events: Vec<(String, Event)> = self
            .store
            .list()
            .into_iter()
            .filter(|(_, e)| e.may_view(user))
            .collect();
        events.sort_by(|(_, a), (_, b)| a.start.cmp(&b.start).then_with(|| a.name.cmp(&b.name)));

        let mut rows = vec![markup::row(Node::list([
            markup::desc("Event"),
            markup::desc("Start"),
            markup::desc("End"),
            markup::desc("Creator"),
            markup::desc(""),
        ]))];
        for (id, event) in &events {
            let (verb, label) = if event.may_edit(user) {
                ("edit", "Edit")
            } else {
                ("view", "View")
            };
            let href = cx.href(me, &Transition::Open(format!("{verb}:{id}")));
            rows.push(markup::row(Node::list([
                markup::cell(event.name.clone()),
                markup::cell(format_date(event.start)),
                markup::cell(format_date(event.end)),
                markup::cell(event.creator.clone()),
                markup::cell(markup::hyperlink(href, label)),
            ])));
        }

        let notices: Vec<Node> = self
            .notices
            .drain(..)
            .map(|n| markup::paragraph(markup::span("notice", n)))
            .collect();
        let listing = if events.is_empty() {
            markup::paragraph("No events.")
        } else {
            markup::table(Some("events"), rows)
        };
        let body = Node::list([
            markup::banner("Calendar"),
            Node::list(notices),
            markup::paragraph(format!("Logged in as {user}.")),
            listing,
            markup::paragraph(markup::hyperlink(
                cx.href(me, &Transition::Open("new".to_string())),
                "New event",
            )),
        ]);
        Reply::Page(make_page("Calendar", body))
    }
}

impl Action for CalendarHome {
    fn name(&self) -> &str {
        "Calendar"
    }

    fn invoke(&mut self, req: &Request, cx: &mut dyn StepContext) -> Result<Reply, ActionError> {
        let Some(user) = req.identity().map(|id| id.as_str().to_string()) else {
            return Ok(Reply::Login);
        };
        self.collect();
        match req.transition() {
            Transition::Enter => Ok(self.render(&user, cx)),
            Transition::Open(target) => self.start(target, &user, cx).map(Reply::Delegate),
            other => Err(ActionError::UnsupportedTransition {
                step: "Calendar".to_string(),
                transition: other.as_param(),
            }),
        }
    }
}
