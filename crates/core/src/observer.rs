/// Receives solver events and decides how the iteration should proceed.
///
/// Observers let callers monitor or steer a solver without changing its API,
/// enabling logging, trajectory recording, early stopping, or failure
/// recovery policies.
///
/// The `observe` method returns `Option<A>`, where `Some(action)` requests a
/// solver-specific action and `None` lets the solver continue unchanged.
///
/// Closures automatically implement `Observer`, a built-in impl for `()`
/// provides a no-op observer, and pairs observe in order with the first
/// requested action winning.
pub trait Observer<E, A> {
    /// Observes a solver event and optionally returns a control action.
    fn observe(&mut self, event: &E) -> Option<A>;
}

/// Blanket implementation for observer closures.
impl<E, A, F> Observer<E, A> for F
where
    F: FnMut(&E) -> Option<A>,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        self(event)
    }
}

/// A no-op observer that always returns `None`.
impl<E, A> Observer<E, A> for () {
    fn observe(&mut self, _event: &E) -> Option<A> {
        None
    }
}

/// Both observers see every event; the first one's action takes precedence.
impl<E, A, O1, O2> Observer<E, A> for (O1, O2)
where
    O1: Observer<E, A>,
    O2: Observer<E, A>,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        let first = self.0.observe(event);
        let second = self.1.observe(event);
        first.or(second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_observer_never_acts() {
        let mut observer = ();
        let action: Option<u8> = observer.observe(&1.0);
        assert!(action.is_none());
    }

    #[test]
    fn pair_notifies_both_and_prefers_first() {
        let mut first_seen = 0;
        let mut second_seen = 0;

        {
            let first = |_: &f64| {
                first_seen += 1;
                Some('a')
            };
            let second = |_: &f64| {
                second_seen += 1;
                Some('b')
            };
            let mut pair = (first, second);
            assert_eq!(pair.observe(&0.0), Some('a'));
        }

        assert_eq!(first_seen, 1);
        assert_eq!(second_seen, 1);
    }

    #[test]
    fn pair_falls_back_to_second() {
        let mut pair = (|_: &f64| -> Option<i32> { None }, |_: &f64| Some(7));
        assert_eq!(pair.observe(&0.0), Some(7));
    }
}
