/// Receives events from a long-running operation and optionally steers it.
///
/// Tape sweeps and solvers call [`Observer::observe`] once per event. Returning
/// `None` lets the operation continue; returning an action asks it to react
/// (stop early, abort, ...), as documented by each operation.
///
/// The unit type `()` is a no-op observer, and any `FnMut(&E) -> Option<A>`
/// closure is an observer.
pub trait Observer<E, A> {
    /// Observes an event and returns an optional action.
    fn observe(&mut self, event: &E) -> Option<A>;
}

impl<E, A> Observer<E, A> for () {
    fn observe(&mut self, _event: &E) -> Option<A> {
        None
    }
}

impl<E, A, F> Observer<E, A> for F
where
    F: FnMut(&E) -> Option<A>,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive<O: Observer<usize, &'static str>>(mut observer: O, events: usize) -> Option<usize> {
        (0..events).find(|event| observer.observe(event).is_some())
    }

    #[test]
    fn unit_never_acts() {
        assert_eq!(drive((), 10), None);
    }

    #[test]
    fn closure_can_act() {
        let observer = |event: &usize| (*event == 3).then_some("stop");
        assert_eq!(drive(observer, 10), Some(3));
    }

    #[test]
    fn borrowed_closure_keeps_state() {
        let mut seen = Vec::new();
        let mut observer = |event: &usize| {
            seen.push(*event);
            None::<&'static str>
        };

        drive(&mut observer, 3);
        drive(&mut observer, 2);

        assert_eq!(seen, vec![0, 1, 2, 0, 1]);
    }
}
