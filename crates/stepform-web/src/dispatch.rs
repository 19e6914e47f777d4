//! Token → live step store.
//!
//! Every live step sits behind its own mutex, so requests for one token are
//! serialized while requests for different tokens run in parallel. The outer
//! map is only locked long enough to look up, insert or remove entries.

use crate::config::SiteConfig;
use crate::error::DispatchError;
use crate::nonce::NonceSource;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stepform_core::{Action, Page, Reply, Request, STEP_MOUNT, StepContext, Token};
use tracing::{debug, info, warn};

/// Outcome of one dispatched request.
#[derive(Debug)]
pub enum Dispatched {
    /// `token` is the step that produced the page.
    Page { page: Page, token: Token },
    /// The step under `resume` needs an authenticated caller.
    Login { resume: Token },
}

struct Entry {
    action: Box<dyn Action>,
    touched: Instant,
}

type SharedEntry = Arc<Mutex<Entry>>;

pub struct DispatchTable {
    steps: RwLock<HashMap<Token, SharedEntry>>,
    nonces: Arc<dyn NonceSource>,
    ttl: Duration,
    max_delegations: usize,
    mount: String,
}

impl DispatchTable {
    pub fn new(nonces: Arc<dyn NonceSource>, config: &SiteConfig) -> Self {
        Self {
            steps: RwLock::new(HashMap::new()),
            nonces,
            ttl: config.step_ttl(),
            max_delegations: config.max_delegations,
            mount: STEP_MOUNT.to_string(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    pub fn register(&self, action: Box<dyn Action>) -> Token {
        let token = Token::new(self.nonces.generate());
        debug!(token = %token, step = action.name(), "step registered");
        self.insert(token.clone(), action);
        token
    }

    fn insert(&self, token: Token, action: Box<dyn Action>) {
        let entry = Entry {
            action,
            touched: Instant::now(),
        };
        self.steps.write().insert(token, Arc::new(Mutex::new(entry)));
    }

    pub fn contains(&self, token: &Token) -> bool {
        self.steps.read().contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.steps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.read().is_empty()
    }

    pub fn retire(&self, token: &Token) -> bool {
        self.steps.write().remove(token).is_some()
    }

    /// Drops every entry idle for longer than the TTL.
    pub fn sweep(&self) -> usize {
        let ttl = self.ttl;
        let mut steps = self.steps.write();
        let before = steps.len();
        // Entries locked by an in-flight request are busy, not idle.
        steps.retain(|_, entry| {
            entry
                .try_lock()
                .is_none_or(|entry| entry.touched.elapsed() <= ttl)
        });
        let removed = before - steps.len();
        if removed > 0 {
            info!(removed, remaining = steps.len(), "expired steps swept");
        }
        removed
    }

    fn lookup(&self, token: &Token) -> Result<SharedEntry, DispatchError> {
        self.steps
            .read()
            .get(token)
            .cloned()
            .ok_or_else(|| DispatchError::UnknownToken(token.clone()))
    }

    /// Runs `req` against its target and follows delegations until a step
    /// answers with a page or asks for a login.
    pub fn dispatch(&self, req: Request) -> Result<Dispatched, DispatchError> {
        let mut req = req;
        for hop in 0..=self.max_delegations {
            let token = req.target().clone();
            let entry = self.lookup(&token)?;
            let mut guard = entry.lock();

            if guard.touched.elapsed() > self.ttl {
                drop(guard);
                self.retire(&token);
                info!(token = %token, "step expired");
                return Err(DispatchError::Expired(token));
            }
            // A request that queued behind the one finishing this step.
            if guard.action.is_finished() {
                drop(guard);
                self.retire(&token);
                info!(token = %token, "step already finished");
                return Err(DispatchError::Expired(token));
            }
            guard.touched = Instant::now();

            if hop == 0 {
                if let (Some(sent), Some(rendered)) =
                    (req.form_version(), guard.action.rendered_version())
                {
                    if sent != rendered {
                        warn!(
                            token = %token,
                            sent,
                            rendered,
                            "stale form submitted, re-entering step"
                        );
                        req = req.entering(token.clone());
                    }
                }
            }

            let mut cx = DispatchContext {
                token: token.clone(),
                mount: &self.mount,
                nonces: self.nonces.as_ref(),
                spawned: Vec::new(),
            };
            let result = guard.action.invoke(&req, &mut cx);
            let finished = guard.action.is_finished();
            let step = guard.action.name().to_string();
            drop(guard);

            for (spawned, action) in cx.spawned {
                self.insert(spawned, action);
            }
            if finished {
                self.retire(&token);
                debug!(token = %token, step = %step, "finished step retired");
            }

            match result.map_err(|source| DispatchError::Action { step, source })? {
                Reply::Page(page) => return Ok(Dispatched::Page { page, token }),
                Reply::Login => return Ok(Dispatched::Login { resume: token }),
                Reply::Delegate(next) => {
                    debug!(from = %token, to = %next, "delegating");
                    req = req.entering(next);
                }
            }
        }
        Err(DispatchError::TooManyDelegations(self.max_delegations))
    }
}

struct DispatchContext<'a> {
    token: Token,
    mount: &'a str,
    nonces: &'a dyn NonceSource,
    spawned: Vec<(Token, Box<dyn Action>)>,
}

impl StepContext for DispatchContext<'_> {
    fn self_token(&self) -> &Token {
        &self.token
    }

    fn spawn(&mut self, action: Box<dyn Action>) -> Token {
        let token = Token::new(self.nonces.generate());
        debug!(parent = %self.token, token = %token, step = action.name(), "sub-step spawned");
        self.spawned.push((token.clone(), action));
        token
    }

    fn mount(&self) -> &str {
        self.mount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nonce::SequentialNonces;
    use stepform_core::{ActionError, FnAction, Transition, make_page};

    fn table() -> DispatchTable {
        DispatchTable::new(Arc::new(SequentialNonces::new("t")), &SiteConfig::minimal())
    }

    fn static_page(title: &'static str) -> Box<dyn Action> {
        Box::new(FnAction::new(title, move |_, _| {
            Ok(Reply::Page(make_page(title, title)))
        }))
    }

    fn title(result: Result<Dispatched, DispatchError>) -> String {
        match result {
            Ok(Dispatched::Page { page, .. }) => page.title().to_string(),
            other => panic!("expected a page, got {other:?}"),
        }
    }

    #[test]
    fn test_delegation_enters_continuation_with_same_params() {
        let table = table();
        let done = table.register(Box::new(FnAction::new("done", |req, _| {
            assert_eq!(req.transition(), &Transition::Enter);
            Ok(Reply::Page(make_page(
                req.raw("note").unwrap_or_default().to_string(),
                "",
            )))
        })));
        let start = table.register(Box::new(FnAction::new("start", move |_, _| {
            Ok(Reply::Delegate(done.clone()))
        })));

        let req = Request::new(start.clone(), Transition::Submit).with_param("note", "carried");
        let result = table.dispatch(req);
        assert_eq!(title(result), "carried");
        assert!(table.contains(&start));
    }

    #[test]
    fn test_unknown_token() {
        let table = table();
        let err = table
            .dispatch(Request::new(Token::new("nope"), Transition::Enter))
            .unwrap_err();
        assert!(err.is_gone());
    }

    #[test]
    fn test_delegation_loop_is_bounded() {
        let table = table();
        let token = Arc::new(Mutex::new(None::<Token>));
        let me = Arc::clone(&token);
        let looping = table.register(Box::new(FnAction::new("loop", move |_, _| {
            let next = me.lock().clone().ok_or(ActionError::PayloadCleared)?;
            Ok(Reply::Delegate(next))
        })));
        *token.lock() = Some(looping.clone());

        let err = table
            .dispatch(Request::new(looping, Transition::Enter))
            .unwrap_err();
        assert!(matches!(err, DispatchError::TooManyDelegations(16)));
    }

    #[test]
    fn test_spawned_steps_are_reachable() {
        let table = table();
        let parent = table.register(Box::new(FnAction::new("parent", |_, cx| {
            let child = cx.spawn(static_page("child"));
            Ok(Reply::Delegate(child))
        })));
        let result = table.dispatch(Request::new(parent, Transition::Enter));
        assert_eq!(title(result), "child");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_action_error_names_step() {
        let table = table();
        let token = table.register(Box::new(FnAction::new("broken", |_, _| {
            Err(ActionError::MissingParameter("title".to_string()))
        })));
        let err = table
            .dispatch(Request::new(token, Transition::Submit))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Action { ref step, .. } if step == "broken"));
        assert!(!err.is_gone());
    }

    #[test]
    fn test_login_reply_keeps_step() {
        let table = table();
        let token = table.register(Box::new(
            FnAction::new("private", |_, _| Ok(Reply::Page(make_page("in", "")))).requiring_login(),
        ));
        let result = table
            .dispatch(Request::new(token.clone(), Transition::Enter))
            .unwrap();
        assert!(matches!(result, Dispatched::Login { ref resume } if resume == &token));

        let again = table.dispatch(Request::new(token, Transition::Enter).with_user("alice"));
        assert_eq!(title(again), "in");
    }

    /// Reports a fixed rendered version and records the transitions it saw.
    struct Versioned {
        seen: Arc<Mutex<Vec<Transition>>>,
    }

    impl Action for Versioned {
        fn name(&self) -> &str {
            "versioned"
        }

        fn requires_login(&self) -> bool {
            false
        }

        fn invoke(&mut self, req: &Request, _cx: &mut dyn StepContext) -> Result<Reply, ActionError> {
            self.seen.lock().push(req.transition().clone());
            Ok(Reply::Page(make_page("versioned", "")))
        }

        fn rendered_version(&self) -> Option<u64> {
            Some(3)
        }
    }

    #[test]
    fn test_stale_submission_re_enters_step() {
        let table = table();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let token = table.register(Box::new(Versioned {
            seen: Arc::clone(&seen),
        }));

        let stale = Request::new(token.clone(), Transition::Submit).with_form_version(2);
        assert_eq!(title(table.dispatch(stale)), "versioned");
        let current = Request::new(token, Transition::Submit).with_form_version(3);
        assert_eq!(title(table.dispatch(current)), "versioned");

        assert_eq!(*seen.lock(), vec![Transition::Enter, Transition::Submit]);
    }

    /// Answers one request, then reports itself finished.
    struct Once {
        calls: Arc<Mutex<usize>>,
        pause: Duration,
    }

    impl Action for Once {
        fn name(&self) -> &str {
            "once"
        }

        fn requires_login(&self) -> bool {
            false
        }

        fn invoke(&mut self, _req: &Request, _cx: &mut dyn StepContext) -> Result<Reply, ActionError> {
            *self.calls.lock() += 1;
            std::thread::sleep(self.pause);
            Ok(Reply::Page(make_page("once", "")))
        }

        fn is_finished(&self) -> bool {
            *self.calls.lock() > 0
        }
    }

    #[test]
    fn test_finished_step_still_in_table_is_gone() {
        let table = table();
        let calls = Arc::new(Mutex::new(1));
        let token = table.register(Box::new(Once {
            calls: Arc::clone(&calls),
            pause: Duration::ZERO,
        }));

        let err = table
            .dispatch(Request::new(token.clone(), Transition::Submit))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Expired(ref t) if t == &token));
        assert!(err.is_gone());
        assert_eq!(*calls.lock(), 1);
        assert!(!table.contains(&token));
    }

    #[test]
    fn test_double_submit_answers_once() {
        let table = Arc::new(table());
        let calls = Arc::new(Mutex::new(0));
        let token = table.register(Box::new(Once {
            calls: Arc::clone(&calls),
            pause: Duration::from_millis(50),
        }));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let table = Arc::clone(&table);
                let token = token.clone();
                std::thread::spawn(move || table.dispatch(Request::new(token, Transition::Submit)))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let err = results.into_iter().find_map(Result::err).unwrap();
        assert!(err.is_gone());
        assert_eq!(*calls.lock(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_expired_entries_are_swept_and_rejected() {
        let table = table().with_ttl(Duration::ZERO);
        let a = table.register(static_page("a"));
        table.register(static_page("b"));
        std::thread::sleep(Duration::from_millis(5));

        let err = table
            .dispatch(Request::new(a, Transition::Enter))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Expired(_)));
        assert_eq!(table.sweep(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_requests_for_one_token_are_serialized() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let table = Arc::new(table());
        let active = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicUsize::new(0));
        let (a, o) = (Arc::clone(&active), Arc::clone(&overlap));
        let token = table.register(Box::new(FnAction::new("slow", move |_, _| {
            if a.fetch_add(1, Ordering::SeqCst) > 0 {
                o.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::sleep(Duration::from_millis(10));
            a.fetch_sub(1, Ordering::SeqCst);
            Ok(Reply::Page(make_page("slow", "")))
        })));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let table = Arc::clone(&table);
                let token = token.clone();
                std::thread::spawn(move || table.dispatch(Request::new(token, Transition::Enter)))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
        assert_eq!(overlap.load(Ordering::SeqCst), 0);
    }
}
