//! Three-stage middleware pipeline.
//!
//! Every call runs up to three hooks: a fore-request hook before dispatch, a
//! post-request hook after a successful response and a fallback hook on any
//! failure path. Each stage resolves its hook as
//!
//! 1. the module's instance hook, else
//! 2. the process-wide global hook, else
//! 3. the stage default.
//!
//! Hooks are synchronous and receive a [`Next`] continuation. The only way to
//! produce the [`Signal`] a hook must return is to consume that `Next`, so a
//! hook cannot forget to continue the call.
//!
//! ## Examples
//!
//! ```rust
//! use api_module::middleware::{Next, Signal};
//! use api_module::Context;
//!
//! fn require_body(ctx: &mut Context, next: Next) -> Signal {
//!     if ctx.data().body.is_none() {
//!         return next.fail("a body is required");
//!     }
//!     next.pass()
//! }
//! ```

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use strum::{Display, EnumIter};
use tracing::{error, warn};

use crate::context::Context;
use crate::error::ApiError;

/// A middleware hook.
///
/// Implemented for every `Fn(&mut Context, Next) -> Signal + Send + Sync`.
pub trait Hook: Send + Sync {
    /// Runs the hook for one call.
    fn handle(&self, ctx: &mut Context, next: Next) -> Signal;
}

impl<F> Hook for F
where
    F: Fn(&mut Context, Next) -> Signal + Send + Sync,
{
    fn handle(&self, ctx: &mut Context, next: Next) -> Signal {
        self(ctx, next)
    }
}

/// A shareable hook, as stored in [`HookSlots`].
pub type SharedHook = Arc<dyn Hook>;

/// Continuation handed to a hook.
#[derive(Debug)]
pub struct Next {
    _private: (),
}

impl Next {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }

    /// Continues without an error.
    pub fn pass(self) -> Signal {
        Signal { error: None }
    }

    /// Continues with an error. It replaces any error the hook stored on the
    /// context.
    pub fn fail(self, error: impl Into<ApiError>) -> Signal {
        Signal {
            error: Some(error.into()),
        }
    }

    /// Continues with an optional error; `None` behaves like [`pass`](Self::pass).
    pub fn resume(self, error: Option<ApiError>) -> Signal {
        Signal { error }
    }
}

/// Outcome of a hook, obtainable only from [`Next`].
#[derive(Debug)]
#[must_use = "a hook must return the signal produced by `next`"]
pub struct Signal {
    error: Option<ApiError>,
}

impl Signal {
    /// The error passed to `next`, if any.
    pub fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    fn into_error(self) -> Option<ApiError> {
        self.error
    }
}

/// Pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Stage {
    /// Runs before the transport call; may veto it.
    #[strum(serialize = "fore-request")]
    Before,
    /// Runs after a successful transport call; may veto or transform it.
    #[strum(serialize = "post-request")]
    After,
    /// Runs on every failure path; decides the rejection value.
    #[strum(serialize = "fallback")]
    Catch,
}

/// One optional hook per stage.
#[derive(Clone, Default)]
pub struct HookSlots {
    before: Option<SharedHook>,
    after: Option<SharedHook>,
    catch: Option<SharedHook>,
}

impl fmt::Debug for HookSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSlots")
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .field("catch", &self.catch.is_some())
            .finish()
    }
}

impl HookSlots {
    /// The hook registered for `stage`.
    pub fn get(&self, stage: Stage) -> Option<SharedHook> {
        self.slot(stage).clone()
    }

    /// Sets or clears (`None`) the hook for `stage`.
    pub fn set(&mut self, stage: Stage, hook: Option<SharedHook>) {
        *self.slot_mut(stage) = hook;
    }

    /// Removes every hook.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn slot(&self, stage: Stage) -> &Option<SharedHook> {
        match stage {
            Stage::Before => &self.before,
            Stage::After => &self.after,
            Stage::Catch => &self.catch,
        }
    }

    fn slot_mut(&mut self, stage: Stage) -> &mut Option<SharedHook> {
        match stage {
            Stage::Before => &mut self.before,
            Stage::After => &mut self.after,
            Stage::Catch => &mut self.catch,
        }
    }
}

static GLOBAL_HOOKS: LazyLock<RwLock<HookSlots>> = LazyLock::new(|| RwLock::new(HookSlots::default()));

/// Sets or clears the process-wide hook for `stage`.
///
/// Global hooks apply to every module that has no instance hook for the
/// stage.
pub fn set_global_hook(stage: Stage, hook: Option<SharedHook>) {
    GLOBAL_HOOKS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .set(stage, hook);
}

/// The process-wide hook for `stage`.
pub fn global_hook(stage: Stage) -> Option<SharedHook> {
    GLOBAL_HOOKS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(stage)
}

/// Removes every process-wide hook.
pub fn reset_global_hooks() {
    GLOBAL_HOOKS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

/// Instance hook, else global hook.
pub(crate) fn resolve(instance: &HookSlots, stage: Stage) -> Option<SharedHook> {
    instance.get(stage).or_else(|| global_hook(stage))
}

/// Runs one stage and returns the context's error afterwards.
///
/// An error passed to `next` replaces the context error. A panicking hook is
/// logged and treated as `next.pass()`; whatever it stored on the context
/// before panicking is kept.
pub(crate) fn run_stage(
    stage: Stage,
    hook: Option<SharedHook>,
    ctx: &mut Context,
    console: bool,
) -> Option<ApiError> {
    match hook {
        Some(hook) => match catch_unwind(AssertUnwindSafe(|| hook.handle(ctx, Next::new()))) {
            Ok(signal) => {
                if let Some(err) = signal.into_error() {
                    ctx.set_error(err);
                }
            }
            Err(payload) => {
                error!(
                    stage = %stage,
                    endpoint = %ctx.metadata_keys().join("."),
                    panic = %panic_message(payload.as_ref()),
                    "[ApiModule] {stage} middleware panicked, continuing as next()"
                );
            }
        },
        None => run_default(stage, ctx, console),
    }
    ctx.response_error().cloned()
}

fn run_default(stage: Stage, ctx: &Context, console: bool) {
    if stage != Stage::Catch || !console {
        return;
    }
    let Some(err) = ctx.response_error() else {
        warn!(endpoint = %ctx.metadata_keys().join("."), "fallback reached without an error");
        return;
    };
    let metadata = ctx.metadata();
    let name = metadata
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| ctx.metadata_keys().join("."));
    error!(
        "[ApiModule] {name} [{}]: [{}] failed with {err}",
        metadata.method(),
        metadata.url()
    );
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
