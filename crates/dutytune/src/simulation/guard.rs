use std::path::Path;

use super::Session;

/// Owns a session for one run and closes it exactly once.
///
/// Dropping an unclosed guard closes the session, so early returns and
/// unwinding release it too.
pub struct SessionGuard<S: Session> {
    session: S,
    closed: bool,
}

impl<S: Session> SessionGuard<S> {
    /// Takes ownership of `session` and loads `case` into it.
    ///
    /// # Errors
    ///
    /// Returns the load error. The session is closed before returning.
    pub fn open(session: S, case: &Path) -> Result<Self, S::Error> {
        let mut guard = Self {
            session,
            closed: false,
        };
        tracing::debug!(case = %case.display(), "loading case");
        guard.session.load_case(case)?;
        Ok(guard)
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Closes the session and reports the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the session fails to close.
    pub fn close(mut self) -> Result<(), S::Error> {
        self.closed = true;
        tracing::debug!("closing session");
        self.session.close()
    }
}

impl<S: Session> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.session.close() {
            tracing::warn!(error = %err, "failed to close session");
        }
    }
}
