use std::{
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    thread,
    time::Duration,
};

use thiserror::Error;

use super::{RunStatus, Session};

/// Errors reported by a [`Watchdog`].
#[derive(Debug, Error)]
pub enum WatchdogError<E: std::error::Error + 'static> {
    #[error("{operation} did not answer within {after:?}")]
    TimedOut {
        operation: &'static str,
        after: Duration,
    },

    #[error("session worker is gone")]
    Disconnected,

    #[error("session is unusable after an earlier timeout")]
    Poisoned,

    #[error(transparent)]
    Session(E),
}

type Reply<T, E> = Sender<Result<T, E>>;

enum Request<E> {
    LoadCase(PathBuf, Reply<(), E>),
    SetInput(String, f64, Reply<(), E>),
    Run(Reply<RunStatus, E>),
    GetOutput(String, Reply<f64, E>),
    Close(Reply<(), E>),
}

/// Runs a session on its own thread and bounds every operation by a timeout.
///
/// A timed-out operation poisons the watchdog: the worker may still be stuck
/// inside the simulator, so every later request fails with
/// [`WatchdogError::Poisoned`] and the worker thread is abandoned on drop.
///
/// After a timeout the wrapped session is never closed: `close` is refused
/// like any other request, so a [`SessionGuard`] over a poisoned watchdog
/// cannot release it exactly once. The simulator process has to be cleaned
/// up outside this crate.
///
/// [`SessionGuard`]: super::SessionGuard
pub struct Watchdog<S: Session> {
    requests: Option<Sender<Request<S::Error>>>,
    worker: Option<thread::JoinHandle<()>>,
    timeout: Duration,
    poisoned: bool,
}

impl<S> Watchdog<S>
where
    S: Session + Send + 'static,
{
    /// Moves `session` onto a worker thread.
    #[must_use]
    pub fn spawn(session: S, timeout: Duration) -> Self {
        let (requests, inbox) = mpsc::channel();
        let worker = thread::spawn(move || serve(session, &inbox));
        Self {
            requests: Some(requests),
            worker: Some(worker),
            timeout,
            poisoned: false,
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn request<T>(
        &mut self,
        operation: &'static str,
        make: impl FnOnce(Reply<T, S::Error>) -> Request<S::Error>,
    ) -> Result<T, WatchdogError<S::Error>> {
        if self.poisoned {
            return Err(WatchdogError::Poisoned);
        }
        let requests = self.requests.as_ref().ok_or(WatchdogError::Disconnected)?;

        let (reply, answer) = mpsc::channel();
        requests
            .send(make(reply))
            .map_err(|_| WatchdogError::Disconnected)?;

        match answer.recv_timeout(self.timeout) {
            Ok(result) => result.map_err(WatchdogError::Session),
            Err(RecvTimeoutError::Timeout) => {
                self.poisoned = true;
                tracing::warn!(operation, timeout = ?self.timeout, "session operation timed out");
                Err(WatchdogError::TimedOut {
                    operation,
                    after: self.timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(WatchdogError::Disconnected),
        }
    }
}

fn serve<S: Session>(mut session: S, inbox: &Receiver<Request<S::Error>>) {
    // A dropped reply receiver means the caller gave up; keep serving.
    for request in inbox {
        match request {
            Request::LoadCase(path, reply) => {
                let _ = reply.send(session.load_case(&path));
            }
            Request::SetInput(path, value, reply) => {
                let _ = reply.send(session.set_input(&path, value));
            }
            Request::Run(reply) => {
                let _ = reply.send(session.run());
            }
            Request::GetOutput(path, reply) => {
                let _ = reply.send(session.get_output(&path));
            }
            Request::Close(reply) => {
                let _ = reply.send(session.close());
            }
        }
    }
}

impl<S> Session for Watchdog<S>
where
    S: Session + Send + 'static,
{
    type Error = WatchdogError<S::Error>;

    fn load_case(&mut self, path: &Path) -> Result<(), Self::Error> {
        let path = path.to_path_buf();
        self.request("load_case", |reply| Request::LoadCase(path, reply))
    }

    fn set_input(&mut self, path: &str, value: f64) -> Result<(), Self::Error> {
        let path = path.to_owned();
        self.request("set_input", |reply| Request::SetInput(path, value, reply))
    }

    fn run(&mut self) -> Result<RunStatus, Self::Error> {
        self.request("run", Request::Run)
    }

    fn get_output(&mut self, path: &str) -> Result<f64, Self::Error> {
        let path = path.to_owned();
        self.request("get_output", |reply| Request::GetOutput(path, reply))
    }

    /// Closes the wrapped session.
    ///
    /// Fails with [`WatchdogError::Poisoned`] after a timeout, leaving the
    /// session open.
    fn close(&mut self) -> Result<(), Self::Error> {
        self.request("close", Request::Close)
    }
}

impl<S: Session> Drop for Watchdog<S> {
    fn drop(&mut self) {
        // Closing the channel ends the worker's loop.
        self.requests.take();
        if let Some(worker) = self.worker.take()
            && !self.poisoned
            && worker.join().is_err()
        {
            tracing::warn!("session worker panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::simulation::SurrogateSession;

    use std::convert::Infallible;

    /// Answers instantly except for `run`, which takes `delay`.
    struct Slow {
        delay: Duration,
    }

    impl Session for Slow {
        type Error = Infallible;

        fn load_case(&mut self, _path: &Path) -> Result<(), Infallible> {
            Ok(())
        }

        fn set_input(&mut self, _path: &str, _value: f64) -> Result<(), Infallible> {
            Ok(())
        }

        fn run(&mut self) -> Result<RunStatus, Infallible> {
            thread::sleep(self.delay);
            Ok(RunStatus::Converged)
        }

        fn get_output(&mut self, _path: &str) -> Result<f64, Infallible> {
            Ok(1.0)
        }

        fn close(&mut self) -> Result<(), Infallible> {
            Ok(())
        }
    }

    #[test]
    fn forwards_operations_to_the_worker() {
        let mut watchdog = Watchdog::spawn(SurrogateSession::new(), Duration::from_secs(5));

        watchdog.load_case(Path::new("case.bkp")).unwrap();
        watchdog.set_input(crate::simulation::surrogate::QN1, 560_000.0).unwrap();
        assert_eq!(watchdog.run().unwrap(), RunStatus::Converged);
        assert!(watchdog.get_output(crate::simulation::surrogate::H2S).unwrap() > 0.0);

        let err = watchdog.get_output("\\Data\\Nowhere").unwrap_err();
        assert!(matches!(err, WatchdogError::Session(_)));

        watchdog.close().unwrap();
    }

    #[test]
    fn timeout_poisons_the_session() {
        let mut watchdog = Watchdog::spawn(
            Slow {
                delay: Duration::from_millis(500),
            },
            Duration::from_millis(20),
        );

        watchdog.set_input("x", 1.0).unwrap();
        let err = watchdog.run().unwrap_err();
        assert!(matches!(
            err,
            WatchdogError::TimedOut {
                operation: "run",
                ..
            }
        ));
        assert!(watchdog.is_poisoned());
        assert!(matches!(
            watchdog.get_output("y"),
            Err(WatchdogError::Poisoned)
        ));
        assert!(matches!(watchdog.close(), Err(WatchdogError::Poisoned)));
    }
}
