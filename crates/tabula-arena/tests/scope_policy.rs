//! Process-wide scope policy.
//!
//! The policy is fixed once per process, so this file is its own test
//! binary and every test in it opts into the process-wide slot.

use std::sync::Mutex;

use tabula_arena::{ArenaError, Scope, ScopePolicy};
use tabula_test_utils::{populate_airports, TestContextBuilder};

// Tests in one binary run on parallel threads but share the one slot.
static SERIAL: Mutex<()> = Mutex::new(());

fn process_wide() -> std::sync::MutexGuard<'static, ()> {
    let guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    Scope::set_policy(ScopePolicy::ProcessWide).unwrap();
    guard
}

#[test]
fn scope_is_visible_from_other_threads() {
    let _serial = process_wide();
    let ctx = TestContextBuilder::new().build();
    let (airports, _) = populate_airports(&ctx).unwrap();
    let first = airports[0];
    let _scope = ctx.enter();
    let elevation = std::thread::spawn(move || first.get().map(|a| a.elevation_ft))
        .join()
        .unwrap()
        .unwrap();
    assert_eq!(elevation, 433);
}

#[test]
fn slot_cleared_after_scope() {
    let _serial = process_wide();
    let ctx = TestContextBuilder::new().build();
    {
        let _scope = Scope::enter(&ctx);
        assert!(Scope::current().is_some_and(|c| c.same_as(&ctx)));
    }
    assert!(Scope::current().is_none());
}

#[test]
fn policy_cannot_change() {
    let _serial = process_wide();
    assert_eq!(Scope::policy(), ScopePolicy::ProcessWide);
    assert!(matches!(
        Scope::set_policy(ScopePolicy::PerFlow),
        Err(ArenaError::ScopePolicyLocked { .. })
    ));
}
