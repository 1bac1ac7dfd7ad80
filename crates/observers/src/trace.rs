use std::fmt::Display;

use rewind_core::Observer;

use crate::traits::CanStopEarly;

/// Records a line of text for every event it observes.
///
/// Works with any event type that implements [`Display`], which includes the
/// events of every tape sweep and solver. With [`Trace::echo`] each line is
/// also written to standard error as it arrives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    lines: Vec<String>,
    echo: bool,
}

impl Trace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also writes each line to standard error.
    #[must_use]
    pub fn echo(mut self) -> Self {
        self.echo = true;
        self
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    /// Returns true if any recorded line contains `pattern`.
    #[must_use]
    pub fn contains(&self, pattern: &str) -> bool {
        self.lines.iter().any(|line| line.contains(pattern))
    }
}

impl<E: Display, A> Observer<E, A> for Trace {
    fn observe(&mut self, event: &E) -> Option<A> {
        let line = event.to_string();
        if self.echo {
            eprintln!("{line}");
        }
        self.lines.push(line);
        None
    }
}

/// Allows `&mut Trace` to be passed to operations that take an observer by
/// value, so the lines can be read after the operation completes.
impl<E: Display, A> Observer<E, A> for &mut Trace {
    fn observe(&mut self, event: &E) -> Option<A> {
        Observer::<E, A>::observe(&mut **self, event)
    }
}

/// Stops an operation after a fixed number of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopAfter {
    limit: usize,
    seen: usize,
}

impl StopAfter {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self { limit, seen: 0 }
    }

    #[must_use]
    pub fn seen(&self) -> usize {
        self.seen
    }
}

impl<E, A: CanStopEarly> Observer<E, A> for StopAfter {
    fn observe(&mut self, _event: &E) -> Option<A> {
        self.seen += 1;
        (self.seen >= self.limit).then(A::stop_early)
    }
}

impl<E, A: CanStopEarly> Observer<E, A> for &mut StopAfter {
    fn observe(&mut self, event: &E) -> Option<A> {
        Observer::<E, A>::observe(&mut **self, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;
    use rewind_core::{Variable, Vector};
    use rewind_solvers::krylov::{self, ConjugateGradient};
    use rewind_tape::{
        Error, FinalFunctional, Tape, adjoint,
        blocks::{LinearCombination, Product},
        replay,
    };

    fn record() -> (Tape, Variable) {
        let mut tape = Tape::default();
        let x = tape.register_initial_condition("x", array![1.0, 2.0]).unwrap();
        let (y, _) = tape.assign("y", Product::new(x.clone(), x.clone())).unwrap();
        tape.assign("z", LinearCombination::new([(y, 3.0)])).unwrap();
        (tape, x)
    }

    #[test]
    fn traces_replay_events() {
        let (mut tape, _) = record();
        let mut trace = Trace::new();
        let report = tape
            .replay_forward(&replay::Config::default(), &mut trace)
            .unwrap();

        assert!(report.is_consistent());
        assert_eq!(trace.lines().len(), 3);
        assert!(trace.lines()[0].starts_with("replay: equation 0 (x:0:0)"));
        assert!(trace.contains("matches"));
    }

    #[test]
    fn traces_adjoint_events() {
        let (mut tape, x) = record();
        let mut trace = Trace::new();
        tape.compute_gradient(&FinalFunctional::new("z"), &[x], |event: &adjoint::Event<'_>| {
            Observer::<_, adjoint::Action>::observe(&mut trace, event)
        })
        .unwrap();

        assert!(trace.contains("adjoint: seeded z:0:0"));
        assert!(trace.contains("adjoint: gradient for x:0:0"));
    }

    #[test]
    fn traces_krylov_iterations() {
        let operator = |x: &Vector| array![4.0 * x[0] + x[1], x[0] + 3.0 * x[1]];
        let mut trace = Trace::new();
        let solution = krylov::cg::solve(
            &operator,
            None,
            &array![1.0, 2.0],
            array![0.0, 0.0],
            ConjugateGradient::default().config(),
            |event: &krylov::Event| Observer::<_, krylov::Action>::observe(&mut trace, event),
        )
        .unwrap();

        assert_eq!(solution.status, krylov::Status::Converged);
        assert_eq!(trace.lines().len(), solution.iters);
        assert!(trace.lines()[0].starts_with("krylov: iteration 1"));
    }

    #[test]
    fn stop_after_ends_replay() {
        let (mut tape, _) = record();
        let mut stop = StopAfter::new(2);
        let report = tape
            .replay_forward(&replay::Config::default(), &mut stop)
            .unwrap();

        assert_eq!(report.status, replay::Status::StoppedByObserver);
        assert_eq!(report.replayed, 2);
        assert_eq!(stop.seen(), 2);
    }

    #[test]
    fn stop_after_aborts_adjoint() {
        let (mut tape, x) = record();
        let result = tape.compute_gradient(&FinalFunctional::new("z"), &[x], StopAfter::new(1));
        assert!(matches!(result, Err(Error::Aborted(_))));
    }

    #[test]
    fn echo_still_records() {
        let mut trace = Trace::new().echo();
        let event = krylov::Event {
            iter: 3,
            residual: 0.5,
        };
        let action: Option<krylov::Action> = trace.observe(&event);
        assert_eq!(action, None);
        assert_eq!(trace.into_lines(), vec!["krylov: iteration 3 |r| = 5e-1".to_string()]);
    }
}
