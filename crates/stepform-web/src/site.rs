//! One running site: configuration, the dispatch table and the
//! collaborators shared by every step.

use crate::apps::calendar::{CalendarHome, Event};
use crate::apps::civs::{self, CreateElection, Election, ElectionDraft, ElectionServices};
use crate::config::SiteConfig;
use crate::dispatch::{DispatchTable, Dispatched};
use crate::nonce::{NonceSource, RandomNonces};
use crate::outbox::{FlushReport, LogNotifier, Notifier, Outbox};
use crate::pages::{expired_page, failure_page, index_page, login_page, styled};
use crate::store::{MemoryStore, RecordStore};
use std::sync::Arc;
use stepform_core::{ActionError, FormStep, Mode, Page, Request, Slot, Token};
use tracing::{error, info, warn};

/// A page together with the HTTP status it should be served with.
#[derive(Debug)]
pub struct Outcome {
    pub status: u16,
    pub page: Page,
}

impl Outcome {
    fn ok(page: Page) -> Self {
        Self { status: 200, page }
    }
}

pub struct Site {
    config: SiteConfig,
    table: DispatchTable,
    nonces: Arc<dyn NonceSource>,
    outbox: Arc<Outbox>,
    elections: Arc<dyn RecordStore<Election>>,
    events: Arc<dyn RecordStore<Event>>,
}

impl Site {
    /// In-memory stores, random tokens and a notifier that logs.
    pub fn new(config: SiteConfig) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(RandomNonces::default()),
            Arc::new(LogNotifier),
            Arc::new(MemoryStore::<Election>::new()),
            Arc::new(MemoryStore::<Event>::new()),
        )
    }

    pub fn with_collaborators(
        config: SiteConfig,
        nonces: Arc<dyn NonceSource>,
        notifier: Arc<dyn Notifier>,
        elections: Arc<dyn RecordStore<Election>>,
        events: Arc<dyn RecordStore<Event>>,
    ) -> Self {
        let table = DispatchTable::new(Arc::clone(&nonces), &config);
        let outbox = Arc::new(Outbox::new(notifier, config.notify_retries));
        Self {
            config,
            table,
            nonces,
            outbox,
            elections,
            events,
        }
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn elections(&self) -> &dyn RecordStore<Election> {
        self.elections.as_ref()
    }

    pub fn events(&self) -> &dyn RecordStore<Event> {
        self.events.as_ref()
    }

    /// Registers a fresh calendar home step.
    pub fn start_calendar(&self) -> Token {
        let home = CalendarHome::new(Arc::clone(&self.events), Arc::clone(&self.nonces));
        self.table.register(Box::new(home))
    }

    /// Registers an election creation form and its two continuations.
    pub fn start_election(&self) -> Result<Token, ActionError> {
        let slot = Slot::new(ElectionDraft::default());
        let done = self
            .table
            .register(Box::new(civs::confirmation(slot.clone(), self.config.clone())));
        let cancelled = self.table.register(Box::new(civs::cancelled()));
        let services = ElectionServices {
            config: self.config.clone(),
            nonces: Arc::clone(&self.nonces),
            store: Arc::clone(&self.elections),
            outbox: Arc::clone(&self.outbox),
        };
        let step = FormStep::new(CreateElection::new(services), Mode::Create, slot, done, cancelled)?
            .public();
        Ok(self.table.register(Box::new(step)))
    }

    pub fn index(&self) -> Page {
        index_page(&self.config)
    }

    pub fn handle(&self, req: Request) -> Outcome {
        let target = req.target().clone();
        let outcome = match self.table.dispatch(req) {
            Ok(Dispatched::Page { page, .. }) => Outcome::ok(page),
            Ok(Dispatched::Login { resume }) => match login_page(&self.config, &resume) {
                Ok(page) => Outcome::ok(page),
                Err(err) => {
                    error!(token = %resume, error = %err, "login page failed");
                    self.failure(&err.to_string())
                }
            },
            Err(err) if err.is_gone() => {
                info!(token = %target, error = %err, "request for a retired step");
                Outcome {
                    status: 404,
                    page: expired_page(&self.config),
                }
            }
            Err(err) => {
                error!(token = %target, error = %err, "request failed");
                self.failure(&err.to_string())
            }
        };
        Outcome {
            status: outcome.status,
            page: styled(&self.config, outcome.page),
        }
    }

    /// Outcome for a request that could not even be parsed.
    pub fn bad_request(&self, reason: &str) -> Outcome {
        warn!(reason, "malformed request");
        Outcome {
            status: 400,
            page: failure_page(&self.config, reason),
        }
    }

    /// Outcome for a server-side failure outside any step.
    pub fn failure(&self, reason: &str) -> Outcome {
        Outcome {
            status: 500,
            page: failure_page(&self.config, reason),
        }
    }

    /// Periodic upkeep: drops idle steps and retries queued mail.
    pub fn maintain(&self) -> (usize, FlushReport) {
        (self.table.sweep(), self.outbox.flush())
    }
}
