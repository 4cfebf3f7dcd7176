#![cfg(feature = "net")]

use crate::net::{NetError, ProtocolError};
use crate::timeouts::SERVER_SHUTDOWN_GRACE;
use log::{debug, error, warn};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);

/// Signals the accept loop's exit to `try_shutdown` and `wait`.
struct AcceptLoopState {
    done: Mutex<bool>,
    condvar: Condvar,
}

impl AcceptLoopState {
    fn new() -> Self {
        Self {
            done: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    fn mark_stopped(&self) {
        if let Ok(mut done) = self.done.lock() {
            *done = true;
        }
        self.condvar.notify_all();
    }

    fn wait_for_stop(&self, timeout: Duration, name: &'static str) -> Result<(), NetError> {
        let guard = lock_or_poison(&self.done, "accept loop state")?;
        if *guard {
            return Ok(());
        }
        let (guard, _status) = self
            .condvar
            .wait_timeout_while(guard, timeout, |done| !*done)
            .map_err(|_| {
                NetError::from(ProtocolError::Poisoned {
                    context: "accept loop state",
                })
            })?;
        if *guard {
            Ok(())
        } else {
            Err(NetError::from(ProtocolError::ShutdownTimeout { context: name }))
        }
    }
}

/// Join handles of in-flight connection threads. Finished handles are
/// reaped on every new connection so the list tracks live work only.
#[derive(Default)]
struct ConnectionTracker {
    handles: parking_lot::Mutex<Vec<thread::JoinHandle<()>>>,
}

impl ConnectionTracker {
    fn track(&self, handle: thread::JoinHandle<()>) {
        let mut handles = self.handles.lock();
        handles.retain(|handle| !handle.is_finished());
        handles.push(handle);
    }

    fn join_all(&self) {
        let drained: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in drained {
            let _ = handle.join();
        }
    }
}

struct ConnectionLimiter {
    active: AtomicUsize,
    limit: usize,
}

impl ConnectionLimiter {
    fn new(limit: usize) -> Self {
        Self {
            active: AtomicUsize::new(0),
            limit: limit.max(1),
        }
    }

    fn try_acquire(&self) -> bool {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |value| {
                (value < self.limit).then_some(value + 1)
            })
            .is_ok()
    }

    fn release(&self) {
        self.active.fetch_sub(1, Ordering::Release);
    }
}

struct ConnectionPermit {
    limiter: Arc<ConnectionLimiter>,
}

impl ConnectionPermit {
    fn acquire(limiter: &Arc<ConnectionLimiter>) -> Option<Self> {
        limiter.try_acquire().then(|| Self {
            limiter: limiter.clone(),
        })
    }
}

impl Drop for ConnectionPermit {
    fn drop(&mut self) {
        self.limiter.release();
    }
}

/// Owns a running accept loop. Dropping the handle shuts the listener down.
pub(crate) struct ServerHandle {
    name: &'static str,
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<thread::JoinHandle<()>>,
    connections: Arc<ConnectionTracker>,
    state: Arc<AcceptLoopState>,
}

impl ServerHandle {
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting, waits up to `timeout` for the loop to exit, then
    /// joins in-flight connections.
    pub(crate) fn try_shutdown(&mut self, timeout: Duration) -> Result<(), NetError> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join.take() {
            self.state.wait_for_stop(timeout, self.name)?;
            if handle.join().is_err() {
                warn!("event={}_accept_loop_panic", self.name);
            }
        }
        self.connections.join_all();
        Ok(())
    }

    /// Blocks until the accept loop exits on its own (fatal accept error).
    pub(crate) fn wait(&mut self) {
        if let Some(handle) = self.join.take() {
            if handle.join().is_err() {
                warn!("event={}_accept_loop_panic", self.name);
            }
        }
        self.connections.join_all();
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(err) = self.try_shutdown(SERVER_SHUTDOWN_GRACE) {
            warn!("event={}_shutdown_failed error={err}", self.name);
        }
    }
}

/// Runs `handler` on its own thread for every accepted connection.
///
/// Connections beyond `max_connections` are closed immediately.
pub(crate) fn spawn_listener<F>(
    name: &'static str,
    listener: TcpListener,
    max_connections: Option<usize>,
    handler: F,
) -> io::Result<ServerHandle>
where
    F: Fn(TcpStream, SocketAddr) -> Result<(), NetError> + Send + Sync + 'static,
{
    let local_addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;
    let shutdown = Arc::new(AtomicBool::new(false));
    let connections = Arc::new(ConnectionTracker::default());
    let state = Arc::new(AcceptLoopState::new());
    let handler = Arc::new(handler);
    let limiter = max_connections.map(|limit| Arc::new(ConnectionLimiter::new(limit)));

    let shutdown_flag = shutdown.clone();
    let tracker = connections.clone();
    let accept_state = state.clone();
    let join = thread::Builder::new()
        .name(format!("{name}-accept"))
        .spawn(move || {
            while !shutdown_flag.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, addr)) => {
                        let permit = match limiter.as_ref() {
                            Some(limiter) => match ConnectionPermit::acquire(limiter) {
                                Some(permit) => Some(permit),
                                None => {
                                    warn!(
                                        "event={name}_connection_rejected addr={addr} reason=too_many_connections limit={}",
                                        limiter.limit
                                    );
                                    continue;
                                }
                            },
                            None => None,
                        };
                        // Accepted sockets inherit non-blocking mode on some platforms.
                        if let Err(err) = stream.set_nonblocking(false) {
                            warn!("event={name}_connection_setup_failed addr={addr} error={err}");
                            continue;
                        }
                        let handler = handler.clone();
                        let connection = thread::spawn(move || {
                            let _permit = permit;
                            if let Err(err) = handler(stream, addr) {
                                debug!("event={name}_connection_error addr={addr} error={err}");
                            }
                        });
                        tracker.track(connection);
                    }
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                        thread::sleep(ACCEPT_BACKOFF);
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                    Err(err) => {
                        error!("event={name}_accept_error error={err}");
                        break;
                    }
                }
            }
            accept_state.mark_stopped();
        })?;
    Ok(ServerHandle {
        name,
        local_addr,
        shutdown,
        join: Some(join),
        connections,
        state,
    })
}

fn lock_or_poison<'a, T>(
    mutex: &'a Mutex<T>,
    context: &'static str,
) -> Result<MutexGuard<'a, T>, NetError> {
    mutex
        .lock()
        .map_err(|_| NetError::from(ProtocolError::Poisoned { context }))
}
