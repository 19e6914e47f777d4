//! Action/continuation engine.
//!
//! An [`Action`] is a server-held handler for one workflow step. It is kept
//! alive by the dispatch table under a [`Token`] and receives every request
//! addressed to that token. It either answers with a page or delegates to a
//! continuation, which the dispatcher then enters with the same request.

use crate::error::ActionError;
use crate::page::Page;
use crate::request::{Request, Token, Transition};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Default mount point of step URLs.
pub const STEP_MOUNT: &str = "/step";

#[derive(Debug)]
pub enum Reply {
    Page(Page),
    /// Enter the step registered under this token with the same request.
    Delegate(Token),
    /// The caller must authenticate first. The step keeps its state and can
    /// be resumed afterwards.
    Login,
}

/// Services the dispatcher offers to a step while it is being invoked.
pub trait StepContext {
    /// Token the current step is registered under.
    fn self_token(&self) -> &Token;

    /// Registers a new step (typically a sub-workflow) and returns its token.
    fn spawn(&mut self, action: Box<dyn Action>) -> Token;

    fn mount(&self) -> &str {
        STEP_MOUNT
    }

    /// URL a form addressed to `token` posts to.
    fn action_url(&self, token: &Token) -> String {
        format!("{}/{}", self.mount(), token)
    }

    /// Link carrying `transition` for `token`.
    fn href(&self, token: &Token, transition: &Transition) -> String {
        format!(
            "{}?{}={}",
            self.action_url(token),
            crate::request::TRANSITION_PARAM,
            transition.as_param()
        )
    }
}

pub trait Action: Send {
    fn name(&self) -> &str;

    fn requires_login(&self) -> bool {
        true
    }

    fn invoke(&mut self, req: &Request, cx: &mut dyn StepContext) -> Result<Reply, ActionError>;

    /// Whether the step took a terminal transition and can be retired.
    fn is_finished(&self) -> bool {
        false
    }

    /// Version of the field table embedded in the last rendered form.
    fn rendered_version(&self) -> Option<u64> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    RenderInitial,
    AwaitingSubmission,
    Validating,
    RenderWithErrors,
    Committed,
    Cancelled,
}

impl StepState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Cancelled)
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RenderInitial => "render-initial",
            Self::AwaitingSubmission => "awaiting-submission",
            Self::Validating => "validating",
            Self::RenderWithErrors => "render-with-errors",
            Self::Committed => "committed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct SlotCell<P> {
    value: Option<P>,
    commits: u64,
}

/// Shared payload cell for a workflow step.
///
/// The step writes it only through [`Slot::commit_with`] after validation
/// succeeded and clears it on cancel; the caller that started the workflow
/// keeps a clone to collect the result.
#[derive(Debug)]
pub struct Slot<P>(Arc<Mutex<SlotCell<P>>>);

impl<P> Clone for Slot<P> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<P> Slot<P> {
    pub fn new(value: P) -> Self {
        Self(Arc::new(Mutex::new(SlotCell {
            value: Some(value),
            commits: 0,
        })))
    }

    pub fn is_cleared(&self) -> bool {
        self.0.lock().value.is_none()
    }

    pub fn clear(&self) {
        self.0.lock().value = None;
    }

    /// True once every other clone is gone, e.g. the step that held it
    /// was retired or swept without finishing.
    pub fn is_orphaned(&self) -> bool {
        Arc::strong_count(&self.0) == 1
    }

    /// Number of successful commits.
    pub fn commits(&self) -> u64 {
        self.0.lock().commits
    }

    pub fn with<R>(&self, f: impl FnOnce(&P) -> R) -> Option<R> {
        self.0.lock().value.as_ref().map(f)
    }

    /// Mutation outside a commit, for absorbing results of finished
    /// sub-workflows.
    pub fn update<R>(&self, f: impl FnOnce(&mut P) -> R) -> Option<R> {
        self.0.lock().value.as_mut().map(f)
    }

    /// Runs `f` against the payload and counts a commit when it succeeds.
    /// `f` must leave the payload untouched when it fails.
    pub fn commit_with<E>(
        &self,
        f: impl FnOnce(&mut P) -> Result<(), E>,
    ) -> Option<Result<(), E>> {
        let mut cell = self.0.lock();
        let result = f(cell.value.as_mut()?);
        if result.is_ok() {
            cell.commits += 1;
        }
        Some(result)
    }

    pub fn take(&self) -> Option<P> {
        self.0.lock().value.take()
    }
}

impl<P: Clone> Slot<P> {
    pub fn get(&self) -> Option<P> {
        self.0.lock().value.clone()
    }
}

/// A step backed by a closure, for continuations that only render a page
/// or route onwards.
pub struct FnAction<F> {
    name: String,
    login: bool,
    f: F,
}

impl<F> FnAction<F>
where
    F: FnMut(&Request, &mut dyn StepContext) -> Result<Reply, ActionError> + Send,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            login: false,
            f,
        }
    }

    pub fn requiring_login(mut self) -> Self {
        self.login = true;
        self
    }
}

impl<F> Action for FnAction<F>
where
    F: FnMut(&Request, &mut dyn StepContext) -> Result<Reply, ActionError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn requires_login(&self) -> bool {
        self.login
    }

    fn invoke(&mut self, req: &Request, cx: &mut dyn StepContext) -> Result<Reply, ActionError> {
        if self.login && req.identity().is_none() {
            return Ok(Reply::Login);
        }
        (self.f)(req, cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_commit_counts_only_success() {
        let slot = Slot::new(1u32);
        let observer = slot.clone();

        let failed = slot.commit_with(|_| Err::<(), _>("store down"));
        assert_eq!(failed, Some(Err("store down")));
        assert_eq!(observer.commits(), 0);

        let ok = slot.commit_with(|v| {
            *v = 2;
            Ok::<(), ()>(())
        });
        assert_eq!(ok, Some(Ok(())));
        assert_eq!(observer.get(), Some(2));
        assert_eq!(observer.commits(), 1);
    }

    #[test]
    fn test_slot_orphaned_after_other_clones_drop() {
        let slot = Slot::new(0u8);
        let held = slot.clone();
        assert!(!slot.is_orphaned());
        drop(held);
        assert!(slot.is_orphaned());
    }

    #[test]
    fn test_slot_clear_is_shared() {
        let slot = Slot::new("draft".to_string());
        let observer = slot.clone();
        slot.clear();
        assert!(observer.is_cleared());
        assert_eq!(observer.with(|s| s.len()), None);
        assert_eq!(slot.commit_with(|_| Ok::<(), ()>(())), None);
    }

    #[test]
    fn test_step_state_terminal() {
        assert!(StepState::Committed.is_terminal());
        assert!(StepState::Cancelled.is_terminal());
        assert!(!StepState::RenderWithErrors.is_terminal());
        assert_eq!(StepState::AwaitingSubmission.to_string(), "awaiting-submission");
    }
}
