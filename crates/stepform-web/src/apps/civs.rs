//! Election creation.
//!
//! A single public form collects the election settings. Committing it
//! generates the election id and the supervisor's secret keys, stores only
//! their hashes, saves the record and hands the control-information mail to
//! the outbox. The confirmation page reports what happened to the mail.

use crate::config::SiteConfig;
use crate::nonce::{NonceSource, key_hash};
use crate::outbox::{Delivery, Message, Outbox};
use crate::store::RecordStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stepform_core::markup::{self, Node};
use stepform_core::{
    Action, ActionError, CHECKED, Checker, CoreError, FieldSpec, FnAction, Form, FormView, Mode,
    Reply, Slot, Values, make_page,
};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionMethod {
    BeatpathWinner,
    CivsRankedPairs,
    Mam,
}

impl CompletionMethod {
    pub const ALL: [CompletionMethod; 3] = [Self::BeatpathWinner, Self::CivsRankedPairs, Self::Mam];

    pub fn param(self) -> &'static str {
        match self {
            Self::BeatpathWinner => "beatpath_winner",
            Self::CivsRankedPairs => "civs_rp",
            Self::Mam => "MAM",
        }
    }

    pub fn from_param(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.param() == raw)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::BeatpathWinner => "Beatpath Winner",
            Self::CivsRankedPairs => "CIVS Ranked Pairs",
            Self::Mam => "MAM",
        }
    }
}

const METHOD_PARAMS: [&str; 3] = ["beatpath_winner", "civs_rp", "MAM"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    pub id: String,
    pub title: String,
    pub supervisor: String,
    pub email: String,
    pub ends: String,
    pub description: String,
    pub choices: Vec<String>,
    pub winners: u32,
    pub public: bool,
    pub allow_writeins: bool,
    pub shuffle: bool,
    pub proportional: bool,
    pub report_ballots: bool,
    pub completion: CompletionMethod,
    pub auth_key_hash: String,
    pub control_key_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub election: Election,
    pub control_url: String,
    pub message: Message,
    /// `None` when the message was only previewed.
    pub delivery: Option<Delivery>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElectionDraft {
    pub created: Option<Created>,
}

/// Collaborators of election creation.
#[derive(Clone)]
pub struct ElectionServices {
    pub config: SiteConfig,
    pub nonces: Arc<dyn NonceSource>,
    pub store: Arc<dyn RecordStore<Election>>,
    pub outbox: Arc<Outbox>,
}

pub struct ElectionInput {
    pub title: String,
    pub supervisor: String,
    pub email: String,
    pub ends: String,
    pub winners: u32,
    pub choices: Vec<String>,
    pub description: String,
    pub public: bool,
    pub allow_writeins: bool,
    pub shuffle: bool,
    pub proportional: bool,
    pub report_ballots: bool,
    pub completion: CompletionMethod,
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

fn choice_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct CreateElection {
    services: ElectionServices,
}

impl CreateElection {
    pub fn new(services: ElectionServices) -> Self {
        Self { services }
    }
}

fn with_error<P>(view: &FormView<'_, P>, role: &str, cell: Node) -> Node {
    match view.error(role) {
        Some(message) => Node::list([cell, markup::error_cell(message)]),
        None => cell,
    }
}

fn typein_explained<P>(
    view: &FormView<'_, P>,
    role: &str,
    explanation: impl Into<String>,
) -> Result<Node, CoreError> {
    let cell = markup::cell(Node::list([
        view.input(role)?.into(),
        markup::br(),
        markup::span("tiny", Into::<String>::into(explanation)),
    ]));
    Ok(with_error(view, role, cell))
}

fn check_box_explained<P>(
    view: &FormView<'_, P>,
    role: &str,
    explanation: &str,
) -> Result<Node, CoreError> {
    Ok(markup::cell(Node::list([
        view.input(role)?.into(),
        markup::span("tiny", explanation),
    ])))
}

fn entry(label: &str, cell: Node) -> Node {
    markup::row(Node::list([markup::desc(label.to_string()), cell]))
}

impl Form for CreateElection {
    type Payload = ElectionDraft;
    type Output = ElectionInput;

    fn title(&self, _mode: Mode) -> String {
        "Create New Election".to_string()
    }

    fn fields(&self) -> Vec<FieldSpec> {
        vec![
            FieldSpec::text("title", 60),
            FieldSpec::text("name", 20),
            FieldSpec::text("email", 20),
            FieldSpec::text("ends", 20),
            FieldSpec::text("winners", 3),
            FieldSpec::text_area("choices", 3, 60),
            FieldSpec::file("names_file"),
            FieldSpec::text_area("description", 3, 60),
            FieldSpec::check_box("public"),
            FieldSpec::check_box("writeins"),
            FieldSpec::check_box("shuffle"),
            FieldSpec::check_box("proportional"),
            FieldSpec::check_box("report_ballots"),
            FieldSpec::radio("completion", &METHOD_PARAMS),
        ]
    }

    fn defaults(&self, _draft: &ElectionDraft) -> Values {
        Values::from([
            ("ends", "tomorrow at 5pm".to_string()),
            ("winners", "1".to_string()),
            ("shuffle", CHECKED.to_string()),
            ("completion", CompletionMethod::BeatpathWinner.param().to_string()),
        ])
    }

    fn validate(&self, ck: &mut Checker<'_>) -> Option<ElectionInput> {
        let title = ck.required("title", "The election needs a name.");
        let supervisor = ck.required("name", "Your name is required.");
        let email = ck.required("email", "An e-mail address is required.");
        if email.as_deref().is_some_and(|e| !is_valid_email(e)) {
            ck.flag("email", "Not a valid e-mail address.");
        }
        let ends = ck.required("ends", "Say when you plan to stop the election.");
        let winners = ck.integer_at_least("winners", 1, "Number of winners must be a positive integer.");

        let mut choices = choice_lines(&ck.text("choices"));
        if choices.is_empty() {
            choices = choice_lines(&ck.text("names_file"));
        }
        if let Some(dup) = choices
            .iter()
            .enumerate()
            .find(|(i, c)| choices[..*i].contains(*c))
            .map(|(_, c)| c.clone())
        {
            ck.flag("choices", format!("Choice \"{dup}\" is listed twice."));
        } else if choices.len() < 2 {
            ck.flag("choices", "At least two choices are required.");
        } else if winners.is_some_and(|w| w as usize >= choices.len()) {
            ck.flag("winners", "There must be more choices than winners.");
        }

        let completion = ck
            .one_of("completion", &METHOD_PARAMS, "Pick a completion method.")
            .and_then(CompletionMethod::from_param);
        let description = ck.text("description").trim().to_string();

        if ck.has_errors() {
            return None;
        }
        Some(ElectionInput {
            title: title?,
            supervisor: supervisor?,
            email: email?,
            ends: ends?,
            winners: u32::try_from(winners?).ok()?,
            choices,
            description,
            public: ck.checked("public"),
            allow_writeins: ck.checked("writeins"),
            shuffle: ck.checked("shuffle"),
            proportional: ck.checked("proportional"),
            report_ballots: ck.checked("report_ballots"),
            completion: completion?,
        })
    }

    fn commit(&mut self, draft: &mut ElectionDraft, input: ElectionInput) -> Result<(), ActionError> {
        let svc = &self.services;
        let auth_key = svc.nonces.generate();
        let control_key = svc.nonces.generate();
        let election = Election {
            id: format!("E_{}", svc.nonces.generate()),
            title: input.title,
            supervisor: input.supervisor,
            email: input.email,
            ends: input.ends,
            description: input.description,
            choices: input.choices,
            winners: input.winners,
            public: input.public,
            allow_writeins: input.allow_writeins,
            shuffle: input.shuffle,
            proportional: input.proportional,
            report_ballots: input.report_ballots,
            completion: input.completion,
            auth_key_hash: key_hash(&auth_key),
            control_key_hash: key_hash(&control_key),
            created_at: Utc::now(),
        };
        let control_url = format!(
            "{}/control?id={}&auth={auth_key}&ctrl={control_key}",
            svc.config.public_url, election.id
        );

        svc.store
            .save(&election.id, election.clone())
            .map_err(|err| {
                ActionError::collaborator(format!("The election could not be saved: {err}"))
            })?;

        let message = control_message(&svc.config, &election, &control_url);
        let delivery = if svc.config.local_debug {
            info!(election = %election.id, "local debug, control information not sent");
            None
        } else {
            Some(svc.outbox.enqueue(message.clone()))
        };
        info!(
            election = %election.id,
            choices = election.choices.len(),
            delivery = ?delivery,
            "election created"
        );
        draft.created = Some(Created {
            election,
            control_url,
            message,
            delivery,
        });
        Ok(())
    }

    fn layout(&self, view: &FormView<'_, ElectionDraft>) -> Result<Node, CoreError> {
        let supervisor = &self.services.config.supervisor_address;
        let mut completion: Vec<Node> = Vec::new();
        for method in CompletionMethod::ALL {
            completion.push(view.radio("completion", method.param())?.into());
            completion.push(markup::text(format!(" {}", method.label())));
        }
        completion.push(markup::br());
        completion.push(markup::span(
            "tiny",
            "Three different methods for resolving circular orderings. \
             It usually doesn't matter which one is used because circularities are uncommon.",
        ));

        let rows = vec![
            entry(
                "Name of the election:",
                typein_explained(view, "title", "e.g., The Democratic Primary")?,
            ),
            entry(
                "Your name:",
                typein_explained(view, "name", "This is used to identify you in e-mails sent to voters.")?,
            ),
            entry(
                "E-mail address:",
                typein_explained(
                    view,
                    "email",
                    format!(
                        "This is needed to send you the election control information. \
                         If a spam service filters your mail, make sure that it does not \
                         block mail from {supervisor}"
                    ),
                )?,
            ),
            entry(
                "When you plan to stop the election:",
                typein_explained(view, "ends", "e.g., Friday at noon, April 5 at 5pm")?,
            ),
            entry(
                "Number of winners:",
                typein_explained(
                    view,
                    "winners",
                    "Any number of choices (candidates) may win the election.",
                )?,
            ),
            entry("Names of the choices:", view.field_cells("choices")?),
            entry("Or upload choice names:", view.field_cells("names_file")?),
            entry("Description of election:", view.field_cells("description")?),
            entry(
                "Public poll?",
                check_box_explained(
                    view,
                    "public",
                    "Voters can add themselves, and there is only a token attempt to prevent multiple voting",
                )?,
            ),
            entry(
                "Allow write-ins?",
                check_box_explained(
                    view,
                    "writeins",
                    "Voters can add new choices (candidates) and revise their votes",
                )?,
            ),
            entry(
                "Shuffle choices?",
                check_box_explained(
                    view,
                    "shuffle",
                    "The order of the choices is randomly permuted on each ballot",
                )?,
            ),
            entry(
                "Proportional representation?",
                check_box_explained(
                    view,
                    "proportional",
                    "An experimental mode that only makes sense when there is more than one winner",
                )?,
            ),
            entry(
                "Anonymous ballot reporting?",
                check_box_explained(
                    view,
                    "report_ballots",
                    "Allow anyone to see the ballots cast, but with all personally identifying information removed.",
                )?,
            ),
            entry(
                "Condorcet completion method:",
                with_error(view, "completion", markup::cell(completion)),
            ),
        ];

        Ok(Node::list([
            markup::paragraph(
                "Use the following form to create an election for which you are the supervisor. \
                 You will be able to authorize voters later.",
            ),
            markup::table(Some("createForm"), rows),
            view.submit(),
            markup::text(" "),
            view.cancel_link(),
        ]))
    }

    fn submit_label(&self, _mode: Mode) -> String {
        "Create election".to_string()
    }
}

/// Body of the control-information mail.
pub fn control_info(config: &SiteConfig, election: &Election, control_url: &str) -> Node {
    let home_url = format!("{}/", config.public_url);
    Node::list([
        markup::paragraph(Node::list([
            markup::text("A new CIVS election named "),
            markup::span("electionTitle", election.title.clone()),
            markup::text(
                " has been created. You have been designated the election supervisor. \
                 To start and stop the election and to add voters, use the following URL: ",
            ),
            markup::hyperlink(control_url, markup::span("URL", control_url)),
        ])),
        markup::paragraph(Node::list([
            markup::text("For more information about the Condorcet Internet Voting Service, visit "),
            markup::hyperlink(home_url.clone(), markup::span("URL", home_url)),
            markup::text("."),
        ])),
    ])
}

pub fn control_message(config: &SiteConfig, election: &Election, control_url: &str) -> Message {
    Message {
        key: format!("control-info:{}", election.id),
        from: config.supervisor_address.clone(),
        to: election.email.clone(),
        subject: format!("CIVS election created: {}", election.title),
        body: control_info(config, election, control_url).render(),
    }
}

/// Success continuation: reports the created election.
pub fn confirmation(slot: Slot<ElectionDraft>, config: SiteConfig) -> impl Action {
    FnAction::new("Election Created", move |_, _| {
        let created = slot
            .with(|draft| draft.created.clone())
            .flatten()
            .ok_or(ActionError::PayloadCleared)?;
        let verb = match created.delivery {
            None => "would be",
            Some(Delivery::Sent | Delivery::Duplicate) => "has been",
            Some(Delivery::Queued) => "will be",
            Some(Delivery::Failed) => "could not be",
        };
        let election = &created.election;
        let report = markup::paragraph(Node::list([
            markup::text("The election "),
            markup::span("electionTitle", election.title.clone()),
            markup::text(format!(
                " has been created. E-mail containing election control information {verb} sent to "
            )),
            markup::span("emailAddr", election.email.clone()),
            markup::text("."),
        ]));
        let preview = if created.delivery.is_none() {
            Node::list([
                markup::hrule(),
                markup::text("E-mail:"),
                markup::br(),
                control_info(&config, election, &created.control_url),
            ])
        } else {
            markup::hrule()
        };
        let page = make_page(
            "CIVS: Election created",
            Node::list([markup::banner("Election Created"), report, preview]),
        );
        Ok(Reply::Page(page))
    })
}

/// Cancel continuation.
pub fn cancelled() -> impl Action {
    FnAction::new("Election Cancelled", move |_, _| {
        let page = make_page(
            "CIVS: Election creation cancelled",
            Node::list([
                markup::banner("Election Not Created"),
                markup::paragraph("No election was created."),
                markup::paragraph(markup::hyperlink("/elections/new", "Create a new election")),
            ]),
        );
        Ok(Reply::Page(page))
    })
}
