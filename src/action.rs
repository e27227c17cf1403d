//! Phase-tagged hooks. An action is a hook plus the phase it runs in.

use crate::context::Context;
use crate::error::{AppError, ConfigError};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The nine fixed points of a route's processing order, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    BeforeQuery,
    OnQuery,
    AfterQuery,
    BeforeRun,
    OnRun,
    AfterRun,
    BeforeConvert,
    OnConvert,
    AfterConvert,
}

pub const PHASE_COUNT: usize = 9;

impl Phase {
    pub const ALL: [Phase; PHASE_COUNT] = [
        Phase::BeforeQuery,
        Phase::OnQuery,
        Phase::AfterQuery,
        Phase::BeforeRun,
        Phase::OnRun,
        Phase::AfterRun,
        Phase::BeforeConvert,
        Phase::OnConvert,
        Phase::AfterConvert,
    ];

    /// Bucket index used by the executor.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::BeforeQuery => "before-query",
            Phase::OnQuery => "on-query",
            Phase::AfterQuery => "after-query",
            Phase::BeforeRun => "before-run",
            Phase::OnRun => "on-run",
            Phase::AfterRun => "after-run",
            Phase::BeforeConvert => "before-convert",
            Phase::OnConvert => "on-convert",
            Phase::AfterConvert => "after-convert",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownPhase(s.to_string()))
    }
}

/// A unit of work run against the request context. Returning `Err` aborts the pipeline.
///
/// `#[async_trait]` so hooks can perform I/O (store lookups, token checks).
#[async_trait]
pub trait Hook: Send + Sync {
    async fn call(&self, ctx: &mut Context) -> Result<(), AppError>;
}

/// Adapter for synchronous closures.
pub struct FnHook<F>(F);

#[async_trait]
impl<F> Hook for FnHook<F>
where
    F: Fn(&mut Context) -> Result<(), AppError> + Send + Sync,
{
    async fn call(&self, ctx: &mut Context) -> Result<(), AppError> {
        (self.0)(ctx)
    }
}

/// A hook tagged with its phase. Immutable once created.
#[derive(Clone)]
pub struct Action {
    phase: Phase,
    hook: Arc<dyn Hook>,
}

impl Action {
    pub fn new(phase: Phase, hook: impl Hook + 'static) -> Self {
        Action {
            phase,
            hook: Arc::new(hook),
        }
    }

    pub fn from_arc(phase: Phase, hook: Arc<dyn Hook>) -> Self {
        Action { phase, hook }
    }

    pub fn from_fn<F>(phase: Phase, f: F) -> Self
    where
        F: Fn(&mut Context) -> Result<(), AppError> + Send + Sync + 'static,
    {
        Action::new(phase, FnHook(f))
    }

    /// Tag by phase name as it appears in configuration ("before-query", "on_run", ...).
    pub fn tagged(phase: &str, hook: Arc<dyn Hook>) -> Result<Self, ConfigError> {
        Ok(Action::from_arc(phase.parse()?, hook))
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub async fn call(&self, ctx: &mut Context) -> Result<(), AppError> {
        self.hook.call(ctx).await
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("phase", &self.phase).finish_non_exhaustive()
    }
}

macro_rules! phase_constructors {
    ($($name:ident => $phase:ident),* $(,)?) => {
        $(
            /// Tag every hook with this phase, preserving order.
            pub fn $name<I>(hooks: I) -> Vec<Action>
            where
                I: IntoIterator<Item = Arc<dyn Hook>>,
            {
                hooks.into_iter().map(|h| Action::from_arc(Phase::$phase, h)).collect()
            }
        )*
    };
}

phase_constructors! {
    before_query => BeforeQuery,
    on_query => OnQuery,
    after_query => AfterQuery,
    before_run => BeforeRun,
    on_run => OnRun,
    after_run => AfterRun,
    before_convert => BeforeConvert,
    on_convert => OnConvert,
    after_convert => AfterConvert,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_names_round_trip_and_order() {
        for (i, p) in Phase::ALL.iter().enumerate() {
            assert_eq!(p.index(), i);
            assert_eq!(p.as_str().parse::<Phase>().unwrap(), *p);
        }
        assert_eq!("BEFORE_QUERY".parse::<Phase>().unwrap(), Phase::BeforeQuery);
    }

    #[test]
    fn unknown_phase_is_a_config_error() {
        let hook: Arc<dyn Hook> = Arc::new(FnHook(|_: &mut Context| -> Result<(), AppError> { Ok(()) }));
        let err = Action::tagged("during-query", hook).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPhase(p) if p == "during-query"));
    }

    #[test]
    fn group_constructors_keep_order() {
        let a: Arc<dyn Hook> = Arc::new(FnHook(|_: &mut Context| -> Result<(), AppError> { Ok(()) }));
        let b: Arc<dyn Hook> = Arc::new(FnHook(|_: &mut Context| -> Result<(), AppError> { Ok(()) }));
        let actions = before_query([a.clone(), b.clone()]);
        assert_eq!(actions.len(), 2);
        assert!(actions.iter().all(|x| x.phase() == Phase::BeforeQuery));
        assert!(Arc::ptr_eq(&actions[0].hook, &a));
        assert!(Arc::ptr_eq(&actions[1].hook, &b));
    }
}
