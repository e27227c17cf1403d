//! Phase-ordered executor: one bucket per phase, run strictly in sequence, abort on first failure.

use crate::action::{Action, Phase, PHASE_COUNT};
use crate::context::Context;
use crate::error::AppError;

/// Actions partitioned into phase buckets. Built once per route, shared by every request.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    buckets: [Vec<Action>; PHASE_COUNT],
}

impl Pipeline {
    /// Partition `actions` by phase, keeping insertion order within each phase.
    pub fn new(actions: impl IntoIterator<Item = Action>) -> Self {
        let mut pipeline = Pipeline::default();
        for action in actions {
            pipeline.push(action);
        }
        pipeline
    }

    pub fn push(&mut self, action: Action) {
        self.buckets[action.phase().index()].push(action);
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn actions_in(&self, phase: Phase) -> &[Action] {
        &self.buckets[phase.index()]
    }

    /// Run every bucket in phase order. The first error is returned untouched.
    pub async fn run(&self, mut ctx: Context) -> Result<Context, AppError> {
        for phase in Phase::ALL {
            let bucket = &self.buckets[phase.index()];
            if bucket.is_empty() {
                continue;
            }
            tracing::debug!(phase = %phase, actions = bucket.len(), "phase");
            for action in bucket {
                if let Err(e) = action.call(&mut ctx).await {
                    tracing::debug!(phase = %phase, error = %e, "pipeline aborted");
                    return Err(e);
                }
            }
        }
        Ok(ctx)
    }
}

/// Run an ad hoc action list against `ctx`.
pub async fn run(actions: &[Action], ctx: Context) -> Result<Context, AppError> {
    Pipeline::new(actions.iter().cloned()).run(ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestData;
    use axum::http::Method;
    use std::sync::{Arc, Mutex};

    fn recorder(log: &Arc<Mutex<Vec<String>>>, phase: Phase, label: &str) -> Action {
        let log = log.clone();
        let label = label.to_string();
        Action::from_fn(phase, move |_ctx| {
            log.lock().unwrap().push(label.clone());
            Ok(())
        })
    }

    fn ctx() -> Context {
        Context::new(RequestData::new(Method::GET, "/posts"))
    }

    #[tokio::test]
    async fn runs_in_phase_order_then_insertion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let actions = vec![
            recorder(&log, Phase::AfterConvert, "after-convert"),
            recorder(&log, Phase::OnRun, "on-run"),
            recorder(&log, Phase::BeforeQuery, "before-query-1"),
            recorder(&log, Phase::OnQuery, "on-query"),
            recorder(&log, Phase::BeforeQuery, "before-query-2"),
            recorder(&log, Phase::BeforeConvert, "before-convert"),
            recorder(&log, Phase::AfterRun, "after-run"),
        ];
        run(&actions, ctx()).await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "before-query-1",
                "before-query-2",
                "on-query",
                "on-run",
                "after-run",
                "before-convert",
                "after-convert",
            ]
        );
    }

    #[tokio::test]
    async fn first_failure_stops_everything_after_it() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let actions = vec![
            recorder(&log, Phase::BeforeQuery, "first"),
            Action::from_fn(Phase::BeforeQuery, |_ctx| Err(AppError::Forbidden("nope".into()))),
            recorder(&log, Phase::BeforeQuery, "same-phase"),
            recorder(&log, Phase::OnRun, "later-phase"),
        ];
        let err = run(&actions, ctx()).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(m) if m == "nope"));
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
    }

    #[tokio::test]
    async fn later_actions_see_earlier_mutations() {
        let actions = vec![
            Action::from_fn(Phase::BeforeQuery, |ctx| {
                ctx.request.body.insert("title".into(), "hi".into());
                Ok(())
            }),
            Action::from_fn(Phase::BeforeQuery, |ctx| {
                let title = ctx.request.body.get("title").cloned().unwrap_or_default();
                ctx.request.body.insert("copy".into(), title);
                Ok(())
            }),
        ];
        let out = run(&actions, ctx()).await.unwrap();
        assert_eq!(out.request.body.get("copy"), Some(&serde_json::Value::from("hi")));
    }

    #[tokio::test]
    async fn empty_pipeline_returns_context_unchanged() {
        let pipeline = Pipeline::new(Vec::<Action>::new());
        assert!(pipeline.is_empty());
        let out = pipeline.run(ctx()).await.unwrap();
        assert!(out.query.is_none());
        assert!(out.output.is_none());
    }
}
