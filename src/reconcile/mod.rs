use futures::future::BoxFuture;
use kube::runtime::controller::Action;
use tokio::time::Duration;

use crate::cluster;
use crate::Result;

/// Control signal threaded through reconciliation phases.
///
/// Empty means "proceed to the next phase". A returning result stops the
/// current pass, either waiting for the next watch event or asking to be
/// requeued after a delay. Phases must not signal both a result and an
/// error; the type system makes that impossible here, and the runner treats
/// an error as overriding in any case.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    stop: Option<Stop>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stop {
    AwaitChange,
    RequeueAfter(Duration),
}

impl ReconcileResult {
    /// Stop reconciling without an error. The next pass happens on the next
    /// watch event; use this when another controller is known to update the
    /// state we are waiting on.
    pub fn with_return() -> ReconcileResult {
        ReconcileResult {
            stop: Some(Stop::AwaitChange),
        }
    }

    /// Stop reconciling and come back after the given delay. Polling
    /// fallback for state no watch will tell us about.
    pub fn with_requeue(after: Duration) -> ReconcileResult {
        ReconcileResult {
            stop: Some(Stop::RequeueAfter(after)),
        }
    }

    pub fn should_return(&self) -> bool {
        self.stop.is_some()
    }

    /// Translation into the controller runtime's requeue triad.
    pub fn to_action(&self) -> Action {
        match self.stop {
            Some(Stop::RequeueAfter(after)) => Action::requeue(after),
            Some(Stop::AwaitChange) | None => Action::await_change(),
        }
    }
}

/// One idempotent reconciliation step run against a mutable cluster spec.
///
/// Phases are plain functions so a reconciler can register its own methods;
/// they return boxed futures because each phase borrows both the reconciler
/// and the spec for the duration of the call.
pub type Phase<R> =
    for<'a> fn(&'a R, &'a mut cluster::Spec) -> BoxFuture<'a, Result<ReconcileResult>>;

/// Runs registered phases in order within a single reconcile invocation.
///
/// A returning result short-circuits all later phases and is propagated
/// untouched. An error stops the pass immediately. There is no state kept
/// between invocations: correctness across passes comes from every phase
/// being safe to re-run from the start.
pub struct PhaseRunner<R> {
    phases: Vec<Phase<R>>,
}

impl<R> PhaseRunner<R> {
    pub fn new() -> PhaseRunner<R> {
        PhaseRunner { phases: Vec::new() }
    }

    pub fn register<I>(mut self, phases: I) -> PhaseRunner<R>
    where
        I: IntoIterator<Item = Phase<R>>,
    {
        self.phases.extend(phases);
        self
    }

    pub async fn run(
        &self,
        reconciler: &R,
        spec: &mut cluster::Spec,
    ) -> Result<ReconcileResult> {
        for phase in &self.phases {
            let result = phase(reconciler, spec).await?;
            if result.should_return() {
                return Ok(result);
            }
        }

        Ok(ReconcileResult::default())
    }
}

impl<R> Default for PhaseRunner<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use futures::FutureExt;

    struct Recorder {
        invoked: std::sync::Mutex<Vec<&'static str>>,
    }

    impl Recorder {
        fn new() -> Recorder {
            Recorder {
                invoked: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn record(&self, name: &'static str) {
            self.invoked.lock().unwrap().push(name);
        }

        fn invoked(&self) -> Vec<&'static str> {
            self.invoked.lock().unwrap().clone()
        }
    }

    fn proceeding_phase<'a>(
        r: &'a Recorder,
        _spec: &'a mut cluster::Spec,
    ) -> BoxFuture<'a, Result<ReconcileResult>> {
        async move {
            r.record("proceed");
            Ok(ReconcileResult::default())
        }
        .boxed()
    }

    fn requeueing_phase<'a>(
        r: &'a Recorder,
        _spec: &'a mut cluster::Spec,
    ) -> BoxFuture<'a, Result<ReconcileResult>> {
        async move {
            r.record("requeue");
            Ok(ReconcileResult::with_requeue(Duration::from_secs(5)))
        }
        .boxed()
    }

    fn failing_phase<'a>(
        r: &'a Recorder,
        _spec: &'a mut cluster::Spec,
    ) -> BoxFuture<'a, Result<ReconcileResult>> {
        async move {
            r.record("fail");
            Err(Error::MalformedAddonState("boom".into()))
        }
        .boxed()
    }

    fn never_phase<'a>(
        r: &'a Recorder,
        _spec: &'a mut cluster::Spec,
    ) -> BoxFuture<'a, Result<ReconcileResult>> {
        async move {
            r.record("never");
            Ok(ReconcileResult::default())
        }
        .boxed()
    }

    #[tokio::test]
    async fn all_phases_run_when_none_returns() {
        let recorder = Recorder::new();
        let mut spec = cluster::Spec::default();

        let result = PhaseRunner::new()
            .register([proceeding_phase as Phase<Recorder>, proceeding_phase])
            .run(&recorder, &mut spec)
            .await
            .unwrap();

        assert!(!result.should_return());
        assert_eq!(recorder.invoked(), vec!["proceed", "proceed"]);
    }

    #[tokio::test]
    async fn returning_phase_short_circuits_later_phases() {
        let recorder = Recorder::new();
        let mut spec = cluster::Spec::default();

        let result = PhaseRunner::new()
            .register([
                requeueing_phase as Phase<Recorder>,
                never_phase,
                never_phase,
            ])
            .run(&recorder, &mut spec)
            .await
            .unwrap();

        assert_eq!(
            result,
            ReconcileResult::with_requeue(Duration::from_secs(5))
        );
        assert_eq!(recorder.invoked(), vec!["requeue"]);
    }

    #[tokio::test]
    async fn error_stops_the_pass_and_wins_over_any_result() {
        let recorder = Recorder::new();
        let mut spec = cluster::Spec::default();

        let err = PhaseRunner::new()
            .register([
                proceeding_phase as Phase<Recorder>,
                failing_phase,
                never_phase,
            ])
            .run(&recorder, &mut spec)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MalformedAddonState(_)));
        assert_eq!(recorder.invoked(), vec!["proceed", "fail"]);
    }

    #[test]
    fn to_action_maps_the_requeue_triad() {
        assert_eq!(
            ReconcileResult::with_requeue(Duration::from_secs(7)).to_action(),
            Action::requeue(Duration::from_secs(7))
        );
        assert_eq!(
            ReconcileResult::with_return().to_action(),
            Action::await_change()
        );
        assert_eq!(ReconcileResult::default().to_action(), Action::await_change());
    }

    #[test]
    fn empty_result_does_not_return() {
        assert!(!ReconcileResult::default().should_return());
        assert!(ReconcileResult::with_return().should_return());
    }
}
