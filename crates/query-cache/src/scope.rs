//! Scope lifecycle and nesting
//!
//! Each unit of work sees one scope context:
//!
//! - an async task wrapped with [`ScopeController::ambient`] or
//!   [`ScopeController::explicit`] gets a task-local context that travels
//!   with the task across worker threads;
//! - code running directly on a thread (no runtime, or the future driven
//!   by `block_on`) uses a thread-local context;
//! - a spawned tokio task without a task-local context has no context at
//!   all. Several tasks can share one thread, so binding them to the thread
//!   would leak scopes between them; they run uncached instead.
//!
//! A context holds at most one ambient scope and a stack of explicit
//! scopes. The innermost explicit scope shadows everything else; when it
//! ends, the previously visible scope is restored.
//!
//! Every scope is closed when it ends, on all exit paths (return, early
//! return, panic unwinding, future cancellation). Closing discards all
//! entries, so a thread returned to a pool carries nothing into the next
//! unit of work.
//!
//! Guards returned by [`ScopeController::enter_ambient_scope`] and
//! [`ScopeController::enter_explicit_scope`] are `!Send`. Inside async code,
//! prefer the future-wrapping forms so the binding follows the task.

use crate::config::ScopeConfig;
use crate::store::{ScopeKind, ScopeStore};
use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Default, Clone)]
struct ScopeContext {
    ambient: Option<Arc<ScopeStore>>,
    explicit: Vec<Arc<ScopeStore>>,
}

impl ScopeContext {
    fn active(&self) -> Option<Arc<ScopeStore>> {
        self.explicit.last().or(self.ambient.as_ref()).cloned()
    }
}

thread_local! {
    static THREAD_CONTEXT: RefCell<ScopeContext> = RefCell::new(ScopeContext::default());
}

tokio::task_local! {
    static TASK_CONTEXT: RefCell<ScopeContext>;
}

/// Where the current unit of work keeps its scope context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Task,
    Thread,
    /// Inside a spawned task that was never wrapped with a task context
    Detached,
}

fn binding() -> Binding {
    if TASK_CONTEXT.try_with(|_| ()).is_ok() {
        Binding::Task
    } else if tokio::task::try_id().is_some() {
        Binding::Detached
    } else {
        Binding::Thread
    }
}

/// Run `f` against the context of the current unit of work.
///
/// Returns `None` if the context is unreachable (detached task, thread-local
/// storage being destroyed, or a re-entrant borrow); callers treat that as
/// "no scope".
fn with_context<R>(f: impl FnOnce(&mut ScopeContext) -> R) -> Option<R> {
    let apply =
        |cell: &RefCell<ScopeContext>| cell.try_borrow_mut().ok().map(|mut ctx| f(&mut *ctx));

    match binding() {
        Binding::Task => TASK_CONTEXT.try_with(apply).ok().flatten(),
        Binding::Thread => THREAD_CONTEXT.try_with(apply).ok().flatten(),
        Binding::Detached => None,
    }
}

fn snapshot() -> Option<ScopeContext> {
    with_context(|ctx| ctx.clone())
}

fn warn_unavailable(what: &str) {
    if binding() == Binding::Detached {
        warn!(
            "{} entered inside a spawned task without a task scope; wrap the task with \
             ScopeController::ambient. Caching is disabled for it",
            what
        );
    } else {
        warn!("Scope context unavailable; {} will not cache", what);
    }
}

/// The scope currently visible to this unit of work, if any
pub fn active_scope() -> Option<Arc<ScopeStore>> {
    with_context(|ctx| ctx.active()).flatten()
}

/// Whether any scope is visible to this unit of work
pub fn has_active_scope() -> bool {
    active_scope().is_some()
}

/// Discard the entries of the active scope without ending it.
///
/// Returns `false` when no scope is active.
pub fn clear_active_scope() -> bool {
    match active_scope() {
        Some(scope) => {
            scope.clear();
            true
        }
        None => false,
    }
}

/// Closes a scope when dropped
struct Teardown(Arc<ScopeStore>);

impl Drop for Teardown {
    fn drop(&mut self) {
        self.0.close();
        debug!(scope_id = %self.0.id(), kind = ?self.0.kind(), "Scope ended");
    }
}

/// Handle on the ambient scope of the current unit of work.
///
/// The guard that created the scope owns it: dropping that guard unbinds
/// and closes the scope. Guards obtained by re-entering an existing ambient
/// scope only observe it.
pub struct AmbientScope {
    scope: Option<Arc<ScopeStore>>,
    owned: bool,
    _not_send: PhantomData<*const ()>,
}

impl AmbientScope {
    /// The bound scope, or `None` if no context was reachable
    pub fn scope(&self) -> Option<&Arc<ScopeStore>> {
        self.scope.as_ref()
    }

    /// Whether dropping this guard ends the scope
    pub fn is_owner(&self) -> bool {
        self.owned
    }
}

impl Drop for AmbientScope {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        if let Some(scope) = self.scope.take() {
            let id = scope.id();
            with_context(|ctx| {
                if ctx.ambient.as_ref().map(|s| s.id()) == Some(id) {
                    ctx.ambient = None;
                }
            });
            drop(Teardown(scope));
        }
    }
}

/// Handle on an explicit scope; the scope is active until this is dropped
pub struct ExplicitScope {
    scope: Arc<ScopeStore>,
    _not_send: PhantomData<*const ()>,
}

impl ExplicitScope {
    pub fn scope(&self) -> &Arc<ScopeStore> {
        &self.scope
    }
}

impl Drop for ExplicitScope {
    fn drop(&mut self) {
        let id = self.scope.id();
        let out_of_order = with_context(|ctx| {
            match ctx.explicit.iter().rposition(|s| s.id() == id) {
                Some(pos) if pos + 1 == ctx.explicit.len() => {
                    ctx.explicit.pop();
                    false
                }
                Some(pos) => {
                    ctx.explicit.remove(pos);
                    true
                }
                None => false,
            }
        })
        .unwrap_or(false);

        if out_of_order {
            warn!(scope_id = %id, "Explicit scope ended before a scope nested inside it");
        }
        drop(Teardown(Arc::clone(&self.scope)));
    }
}

/// Creates, nests and tears down scopes
#[derive(Debug, Clone, Default)]
pub struct ScopeController {
    config: ScopeConfig,
}

impl ScopeController {
    pub fn new(config: ScopeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    fn new_scope(&self, kind: ScopeKind) -> Arc<ScopeStore> {
        let scope = Arc::new(ScopeStore::new(kind, self.config.clone()));
        debug!(scope_id = %scope.id(), kind = ?kind, "Scope created");
        scope
    }

    /// Bind an ambient scope to the current unit of work, or return the one
    /// already bound.
    pub fn enter_ambient_scope(&self) -> AmbientScope {
        let bound = with_context(|ctx| match &ctx.ambient {
            Some(existing) => (Arc::clone(existing), false),
            None => {
                let scope = self.new_scope(ScopeKind::Ambient);
                ctx.ambient = Some(Arc::clone(&scope));
                (scope, true)
            }
        });

        match bound {
            Some((scope, owned)) => AmbientScope {
                scope: Some(scope),
                owned,
                _not_send: PhantomData,
            },
            None => {
                warn_unavailable("Ambient scope");
                AmbientScope {
                    scope: None,
                    owned: false,
                    _not_send: PhantomData,
                }
            }
        }
    }

    /// Push a fresh scope that shadows whatever is currently visible
    pub fn enter_explicit_scope(&self) -> ExplicitScope {
        let scope = self.new_scope(ScopeKind::Explicit);
        let pushed = with_context(|ctx| ctx.explicit.push(Arc::clone(&scope))).is_some();
        if !pushed {
            warn_unavailable("Explicit scope");
            scope.close();
        }
        ExplicitScope {
            scope,
            _not_send: PhantomData,
        }
    }

    /// Run a synchronous unit of work inside an ambient scope.
    ///
    /// The scope is torn down when `f` returns or unwinds, so the calling
    /// thread can be handed back to a pool safely.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter_ambient_scope();
        f()
    }

    /// Run `f` inside a fresh explicit scope
    pub fn with_explicit_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter_explicit_scope();
        f()
    }

    /// Run an async unit of work inside an ambient scope bound to the task.
    ///
    /// An ambient scope already bound to the task, or to the thread driving
    /// this future, is reused and left to its owner. Otherwise a new scope
    /// is created and torn down when the future completes or is dropped.
    pub async fn ambient<F: Future>(&self, fut: F) -> F::Output {
        match snapshot() {
            Some(context) if context.ambient.is_some() => {
                if binding() == Binding::Task {
                    fut.await
                } else {
                    // Carry the thread's scopes into the task-local context
                    TASK_CONTEXT.scope(RefCell::new(context), fut).await
                }
            }
            current => {
                let scope = self.new_scope(ScopeKind::Ambient);
                let _teardown = Teardown(Arc::clone(&scope));
                let context = ScopeContext {
                    ambient: Some(scope),
                    explicit: current.map(|ctx| ctx.explicit).unwrap_or_default(),
                };
                TASK_CONTEXT.scope(RefCell::new(context), fut).await
            }
        }
    }

    /// Run an async block inside a fresh explicit scope.
    ///
    /// The enclosing context is restored untouched afterwards.
    pub async fn explicit<F: Future>(&self, fut: F) -> F::Output {
        let scope = self.new_scope(ScopeKind::Explicit);
        let _teardown = Teardown(Arc::clone(&scope));
        let mut context = snapshot().unwrap_or_default();
        context.explicit.push(scope);
        TASK_CONTEXT.scope(RefCell::new(context), fut).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::CacheKey;
    use query_core::QueryParams;
    use std::panic::{self, AssertUnwindSafe};
    use std::thread;

    fn key(n: usize) -> CacheKey {
        CacheKey::derive("Orders", &QueryParams::new().with("$top", n)).unwrap()
    }

    #[test]
    fn test_no_scope_by_default() {
        thread::spawn(|| {
            assert!(active_scope().is_none());
            assert!(!clear_active_scope());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_ambient_scope_is_idempotent() {
        let controller = ScopeController::default();
        let outer = controller.enter_ambient_scope();
        let inner = controller.enter_ambient_scope();

        assert!(outer.is_owner());
        assert!(!inner.is_owner());
        assert!(Arc::ptr_eq(outer.scope().unwrap(), inner.scope().unwrap()));

        drop(inner);
        // Dropping a re-entry guard leaves the scope bound
        assert!(Arc::ptr_eq(&active_scope().unwrap(), outer.scope().unwrap()));

        let scope = Arc::clone(outer.scope().unwrap());
        drop(outer);
        assert!(active_scope().is_none());
        assert!(scope.is_closed());
    }

    #[test]
    fn test_explicit_scope_shadows_and_restores() {
        let controller = ScopeController::default();
        let ambient = controller.enter_ambient_scope();
        let ambient_id = ambient.scope().unwrap().id();

        {
            let outer = controller.enter_explicit_scope();
            assert_eq!(active_scope().unwrap().id(), outer.scope().id());

            {
                let inner = controller.enter_explicit_scope();
                assert_eq!(active_scope().unwrap().id(), inner.scope().id());
            }

            assert_eq!(active_scope().unwrap().id(), outer.scope().id());
        }

        assert_eq!(active_scope().unwrap().id(), ambient_id);
    }

    #[test]
    fn test_explicit_scope_without_ambient() {
        let controller = ScopeController::default();
        assert!(active_scope().is_none());

        controller.with_explicit_scope(|| {
            assert!(active_scope().is_some());
        });

        assert!(active_scope().is_none());
    }

    #[test]
    fn test_explicit_scope_entries_discarded_on_exit() {
        let controller = ScopeController::default();
        let escaped = controller.with_explicit_scope(|| {
            let scope = active_scope().unwrap();
            scope.put(key(1), Arc::new(1usize));
            assert_eq!(scope.size(), 1);
            scope
        });

        assert!(escaped.is_closed());
        assert_eq!(escaped.size(), 0);
    }

    #[test]
    fn test_explicit_scope_released_on_panic() {
        let controller = ScopeController::default();
        let _ambient = controller.enter_ambient_scope();
        let ambient_id = active_scope().unwrap().id();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            controller.with_explicit_scope(|| {
                active_scope().unwrap().put(key(1), Arc::new(1usize));
                panic!("simulated failure");
            })
        }));

        assert!(result.is_err());
        assert_eq!(active_scope().unwrap().id(), ambient_id);
        assert_eq!(active_scope().unwrap().size(), 0);
    }

    #[test]
    fn test_out_of_order_drop_removes_correct_scope() {
        let controller = ScopeController::default();
        let outer = controller.enter_explicit_scope();
        let inner = controller.enter_explicit_scope();
        let inner_id = inner.scope().id();

        drop(outer);
        assert_eq!(active_scope().unwrap().id(), inner_id);

        drop(inner);
        assert!(active_scope().is_none());
    }

    #[test]
    fn test_run_tears_down_for_thread_reuse() {
        let controller = ScopeController::default();

        let first = controller.run(|| {
            let scope = active_scope().unwrap();
            scope.put(key(1), Arc::new(1usize));
            scope
        });
        assert!(first.is_closed());
        assert!(active_scope().is_none());

        controller.run(|| {
            let scope = active_scope().unwrap();
            assert_ne!(scope.id(), first.id());
            assert_eq!(scope.size(), 0);
        });
    }

    #[test]
    fn test_run_tears_down_on_panic() {
        let controller = ScopeController::default();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            controller.run(|| {
                active_scope().unwrap().put(key(1), Arc::new(1usize));
                panic!("request failed");
            })
        }));
        assert!(result.is_err());
        assert!(active_scope().is_none());

        controller.run(|| assert_eq!(active_scope().unwrap().size(), 0));
    }

    #[test]
    fn test_clear_active_scope_keeps_identity() {
        let controller = ScopeController::default();
        controller.run(|| {
            let scope = active_scope().unwrap();
            scope.put(key(1), Arc::new(1usize));
            scope.put(key(2), Arc::new(2usize));

            assert!(clear_active_scope());

            let after = active_scope().unwrap();
            assert_eq!(after.id(), scope.id());
            assert_eq!(after.size(), 0);
            assert!(!after.is_closed());
        });
    }

    #[test]
    fn test_threads_have_separate_contexts() {
        let controller = ScopeController::default();
        let _guard = controller.enter_ambient_scope();
        active_scope().unwrap().put(key(1), Arc::new(1usize));

        thread::spawn(|| assert!(active_scope().is_none()))
            .join()
            .unwrap();
    }

    #[tokio::test]
    async fn test_task_ambient_scope() {
        let controller = ScopeController::default();

        let id = controller
            .ambient(async {
                let scope = active_scope().unwrap();
                assert_eq!(scope.kind(), ScopeKind::Ambient);
                scope.id()
            })
            .await;

        let again = controller
            .ambient(async { active_scope().unwrap().id() })
            .await;
        assert_ne!(id, again);
    }

    #[tokio::test]
    async fn test_task_ambient_reentry_reuses_scope() {
        let controller = ScopeController::default();

        controller
            .ambient(async {
                let outer = active_scope().unwrap().id();
                let inner = controller
                    .ambient(async { active_scope().unwrap().id() })
                    .await;
                assert_eq!(outer, inner);

                let guard = controller.enter_ambient_scope();
                assert!(!guard.is_owner());
                assert_eq!(guard.scope().unwrap().id(), outer);
            })
            .await;
    }

    #[tokio::test]
    async fn test_task_explicit_scope_nesting() {
        let controller = ScopeController::default();

        controller
            .ambient(async {
                let ambient = active_scope().unwrap().id();

                controller
                    .explicit(async {
                        let outer = active_scope().unwrap();
                        assert_eq!(outer.kind(), ScopeKind::Explicit);

                        controller
                            .explicit(async {
                                assert_ne!(active_scope().unwrap().id(), outer.id());
                            })
                            .await;

                        assert_eq!(active_scope().unwrap().id(), outer.id());
                    })
                    .await;

                assert_eq!(active_scope().unwrap().id(), ambient);
            })
            .await;
    }

    #[tokio::test]
    async fn test_cancelled_task_tears_down_scope() {
        let controller = ScopeController::default();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn({
            let controller = controller.clone();
            async move {
                controller
                    .ambient(async move {
                        let scope = active_scope().unwrap();
                        scope.put(key(1), Arc::new(1usize));
                        let _ = tx.send(scope);
                        std::future::pending::<()>().await;
                    })
                    .await
            }
        });

        let scope = rx.await.unwrap();
        assert_eq!(scope.size(), 1);

        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        assert!(scope.is_closed());
        assert_eq!(scope.size(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_tasks_are_isolated() {
        let controller = ScopeController::default();
        let mut handles = vec![];

        for task in 0..16usize {
            let controller = controller.clone();
            handles.push(tokio::spawn(async move {
                controller
                    .ambient(async move {
                        let scope = active_scope().unwrap();
                        scope.put(key(task), Arc::new(task));
                        tokio::task::yield_now().await;

                        let scope = active_scope().unwrap();
                        assert_eq!(scope.size(), 1);
                        for other in (0..16).filter(|o| *o != task) {
                            assert!(scope.get(&key(other)).is_none());
                        }
                        scope.id()
                    })
                    .await
            }));
        }

        let ids: std::collections::HashSet<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(ids.len(), 16);
    }

    #[test]
    fn test_ambient_future_reuses_thread_scope() {
        let controller = ScopeController::default();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        controller.run(|| {
            let outer = active_scope().unwrap();
            outer.put(key(1), Arc::new(1usize));

            let (inner, size) = runtime.block_on(controller.ambient(async {
                let scope = active_scope().unwrap();
                (scope.id(), scope.size())
            }));
            assert_eq!(inner, outer.id());
            assert_eq!(size, 1);

            let explicit = runtime.block_on(controller.explicit(async {
                let scope = active_scope().unwrap();
                assert_ne!(scope.id(), outer.id());
                scope
            }));
            assert!(explicit.is_closed());

            // The thread's owner still decides when the scope ends
            assert!(!outer.is_closed());
            assert_eq!(active_scope().unwrap().id(), outer.id());
        });
    }

    #[tokio::test]
    async fn test_guard_on_runtime_thread_binds_to_thread() {
        let controller = ScopeController::default();
        let guard = controller.enter_ambient_scope();
        assert!(guard.is_owner());
        assert_eq!(active_scope().unwrap().id(), guard.scope().unwrap().id());
    }

    #[tokio::test]
    async fn test_local_tasks_do_not_share_thread_scope() {
        let controller = ScopeController::default();
        let local = tokio::task::LocalSet::new();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        local
            .run_until(async move {
                let holder = tokio::task::spawn_local({
                    let controller = controller.clone();
                    async move {
                        let guard = controller.enter_ambient_scope();
                        assert!(guard.scope().is_none());
                        assert!(active_scope().is_none());
                        // Held across an await while the other task runs
                        let _ = rx.await;
                        drop(guard);
                    }
                });

                let observer = tokio::task::spawn_local({
                    let controller = controller.clone();
                    async move {
                        assert!(active_scope().is_none());
                        let guard = controller.enter_ambient_scope();
                        assert!(guard.scope().is_none());
                        let _ = tx.send(());
                    }
                });

                observer.await.unwrap();
                holder.await.unwrap();

                let wrapped: Vec<_> = (0..2)
                    .map(|_| {
                        let controller = controller.clone();
                        tokio::task::spawn_local(async move {
                            controller
                                .ambient(async {
                                    let guard = controller.enter_ambient_scope();
                                    assert!(!guard.is_owner());
                                    tokio::task::yield_now().await;
                                    let id = active_scope().unwrap().id();
                                    assert_eq!(guard.scope().unwrap().id(), id);
                                    id
                                })
                                .await
                        })
                    })
                    .collect();

                let mut ids = vec![];
                for handle in wrapped {
                    ids.push(handle.await.unwrap());
                }
                assert_ne!(ids[0], ids[1]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_spawned_task_does_not_inherit_scope() {
        let controller = ScopeController::default();
        controller
            .ambient(async {
                assert!(active_scope().is_some());
                let seen = tokio::spawn(async { active_scope().is_some() })
                    .await
                    .unwrap();
                assert!(!seen);
            })
            .await;
    }
}
