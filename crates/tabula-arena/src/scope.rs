//! The ambient "current context".
//!
//! Ambient accessors such as [`Ref::get`](crate::ptr::Ref::get) resolve
//! against the context made current by the innermost live [`Scope`]. Where
//! that slot lives is fixed once per process by a [`ScopePolicy`]:
//!
//! - [`ScopePolicy::PerFlow`] (the default): each thread has its own slot,
//!   so scopes entered on one thread are invisible to every other.
//! - [`ScopePolicy::ProcessWide`]: one slot shared by all threads. Scopes
//!   on different threads then overwrite each other; use this only when a
//!   single flow of control touches contexts at a time.
//!
//! Scopes nest. Dropping a scope restores whatever was current when it was
//! entered, including "nothing".

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::context::{Context, ContextData};
use crate::error::ArenaError;

/// Where the current-context slot lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopePolicy {
    /// One slot for the whole process.
    ProcessWide,
    /// One slot per thread of control.
    PerFlow,
}

impl ScopePolicy {
    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            ScopePolicy::ProcessWide => "process-wide",
            ScopePolicy::PerFlow => "per-flow",
        }
    }
}

static POLICY: OnceLock<ScopePolicy> = OnceLock::new();

static PROCESS_SLOT: Mutex<Option<Context>> = parking_lot::const_mutex(None);

thread_local! {
    static FLOW_SLOT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

fn swap_slot(policy: ScopePolicy, ctx: Option<Context>) -> Option<Context> {
    match policy {
        ScopePolicy::ProcessWide => std::mem::replace(&mut *PROCESS_SLOT.lock(), ctx),
        // During thread teardown the slot may already be gone; nothing to restore then.
        ScopePolicy::PerFlow => FLOW_SLOT
            .try_with(|slot| slot.replace(ctx))
            .unwrap_or(None),
    }
}

/// Guard that keeps a context current until dropped.
///
/// Not `Send`: a per-flow scope must end on the thread that entered it.
#[must_use = "the context is only current while the scope is alive"]
pub struct Scope {
    policy: ScopePolicy,
    previous: Option<Context>,
    _not_send: PhantomData<*const ()>,
}

impl Scope {
    /// Fix the process-wide scope policy.
    ///
    /// Succeeds if no policy was chosen yet or the same one was. Fails with
    /// [`ArenaError::ScopePolicyLocked`] once a different policy is in
    /// effect, including the default chosen implicitly by the first
    /// [`Scope::enter`].
    pub fn set_policy(policy: ScopePolicy) -> Result<(), ArenaError> {
        let current = *POLICY.get_or_init(|| policy);
        if current != policy {
            return Err(ArenaError::ScopePolicyLocked {
                current: current.name(),
                requested: policy.name(),
            });
        }
        Ok(())
    }

    /// The policy in effect, choosing the default if none was set.
    pub fn policy() -> ScopePolicy {
        *POLICY.get_or_init(|| ScopePolicy::PerFlow)
    }

    /// Make `ctx` current until the returned guard is dropped.
    pub fn enter(ctx: &Context) -> Scope {
        let policy = Self::policy();
        let previous = swap_slot(policy, Some(ctx.clone()));
        Scope {
            policy,
            previous,
            _not_send: PhantomData,
        }
    }

    /// The current context, if any.
    pub fn current() -> Option<Context> {
        match Self::policy() {
            ScopePolicy::ProcessWide => PROCESS_SLOT.lock().clone(),
            ScopePolicy::PerFlow => FLOW_SLOT
                .try_with(|slot| slot.borrow().clone())
                .unwrap_or(None),
        }
    }

    /// Run `f` with shared access to the current context.
    pub fn with_current<R>(
        f: impl FnOnce(&ContextData) -> Result<R, ArenaError>,
    ) -> Result<R, ArenaError> {
        let ctx = Self::current().ok_or(ArenaError::NoCurrentContext)?;
        ctx.read(f)
    }

    /// Run `f` with exclusive access to the current context.
    pub fn with_current_mut<R>(
        f: impl FnOnce(&mut ContextData) -> Result<R, ArenaError>,
    ) -> Result<R, ArenaError> {
        let ctx = Self::current().ok_or(ArenaError::NoCurrentContext)?;
        ctx.write(f)
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        swap_slot(self.policy, self.previous.take());
    }
}
