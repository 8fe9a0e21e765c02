//! Connection pooling for a single server.
use apm::{ConnectionClosedReason, CheckOutFailedReason, Event, Listener};
use connstring::Host;
use error::Error::{self, ArgumentError, ForeignConnectionError, PoolClosedError,
                   WaitQueueTimeoutError};
use error::Result;
use stream::{Stream, StreamConnector};

use bufstream::BufStream;

use std::collections::VecDeque;
use std::net::Shutdown;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_POOL_SIZE: usize = 5;
pub const DEFAULT_WAIT_QUEUE_TIMEOUT_MS: u64 = 10_000;

/// How many connections a pool will establish concurrently.
const MAX_CONNECTING: usize = 2;
/// How often the background worker tops the pool up to its minimum size.
const MIN_POOL_SIZE_CHECK_FREQUENCY_MS: u64 = 100;

static POOL_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Sizing and timing options for a connection pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// The most connections the pool may have open at once, pending
    /// connections included. Zero disables the limit.
    pub max_pool_size: usize,
    /// The fewest connections the pool keeps open. A background worker
    /// replenishes the pool whenever it dips below this.
    pub min_pool_size: usize,
    /// Connections idle longer than this are destroyed at checkout.
    /// Zero disables the limit.
    pub max_idle_time_ms: u64,
    /// How long a checkout waits for a connection before giving up.
    pub wait_queue_timeout_ms: u64,
}

impl Default for PoolOptions {
    fn default() -> Self {
        PoolOptions {
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            min_pool_size: 0,
            max_idle_time_ms: 0,
            wait_queue_timeout_ms: DEFAULT_WAIT_QUEUE_TIMEOUT_MS,
        }
    }
}

/// A pooled, buffered socket to a server.
///
/// Checked out of a `ConnectionPool` and returned with `check_in`. The
/// generation it carries decides its fate on the way back in.
pub struct Connection {
    id: usize,
    generation: usize,
    pool_id: usize,
    address: Host,
    socket: BufStream<Stream>,
    last_checkin: Instant,
    // Back-references to the owning pool, used to route the connection
    // home if it is checked into the wrong pool.
    home: Weak<Mutex<PoolInner>>,
    home_wait: Weak<Condvar>,
}

impl Connection {
    pub fn id(&self) -> usize {
        self.id
    }

    /// The pool generation this connection was created under.
    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn address(&self) -> &Host {
        &self.address
    }

    /// The underlying buffered socket.
    pub fn get_socket(&mut self) -> &mut BufStream<Stream> {
        &mut self.socket
    }

    fn idle_time(&self) -> Duration {
        self.last_checkin.elapsed()
    }

    fn close(&self) {
        let _ = self.socket.get_ref().shutdown(Shutdown::Both);
    }
}

struct PoolInner {
    // Bumped by clear(); connections from older generations are destroyed
    // lazily when they next pass through the pool.
    generation: usize,
    next_id: usize,
    // Open plus in-flight connections. A pending connection reserves its
    // slot here so concurrent checkouts cannot oversubscribe the pool.
    total: usize,
    pending: usize,
    // Counts failed establishment attempts; waiters watch it to know their
    // spawned connect died and a new one is warranted.
    failed_creations: usize,
    closed: bool,
    available: VecDeque<Connection>,
}

/// A generation-tracked pool of connections to a single server.
///
/// Cheap to clone; clones share the same state. The pool does not keep a
/// background thread alive past `close`, but it must be closed explicitly
/// for the minimum-size worker to stop.
#[derive(Clone)]
pub struct ConnectionPool {
    host: Host,
    id: usize,
    inner: Arc<Mutex<PoolInner>>,
    wait_lock: Arc<Condvar>,
    options: PoolOptions,
    stream_connector: StreamConnector,
    listener: Arc<Listener>,
    error_tx: Arc<Mutex<Option<Sender<Error>>>>,
    maintenance_running: Arc<AtomicBool>,
    maintenance_wake: Arc<(Mutex<()>, Condvar)>,
}

impl ConnectionPool {
    /// Returns a new pool with default options.
    pub fn new(host: Host, stream_connector: StreamConnector) -> Result<ConnectionPool> {
        ConnectionPool::with_options(host,
                                     PoolOptions::default(),
                                     stream_connector,
                                     Arc::new(Listener::new()))
    }

    /// Returns a new pool with the given options.
    pub fn with_options(host: Host,
                        options: PoolOptions,
                        stream_connector: StreamConnector,
                        listener: Arc<Listener>)
                        -> Result<ConnectionPool> {
        if options.max_pool_size > 0 && options.min_pool_size > options.max_pool_size {
            return Err(ArgumentError("minPoolSize must not exceed maxPoolSize.".to_owned()));
        }

        let pool = ConnectionPool {
            host: host,
            id: POOL_COUNTER.fetch_add(1, Ordering::SeqCst),
            inner: Arc::new(Mutex::new(PoolInner {
                generation: 0,
                next_id: 0,
                total: 0,
                pending: 0,
                failed_creations: 0,
                closed: false,
                available: VecDeque::new(),
            })),
            wait_lock: Arc::new(Condvar::new()),
            options: options,
            stream_connector: stream_connector,
            listener: listener,
            error_tx: Arc::new(Mutex::new(None)),
            maintenance_running: Arc::new(AtomicBool::new(false)),
            maintenance_wake: Arc::new((Mutex::new(()), Condvar::new())),
        };

        pool.emit(Event::PoolCreated { address: pool.host.clone() });

        if pool.options.min_pool_size > 0 {
            pool.maintenance_running.store(true, Ordering::SeqCst);
            let worker = pool.clone();
            thread::spawn(move || worker.run_maintenance());
        }

        Ok(pool)
    }

    pub fn address(&self) -> &Host {
        &self.host
    }

    /// Registers a channel that connection establishment errors are
    /// reported over.
    pub fn set_error_sender(&self, sender: Sender<Error>) -> Result<()> {
        *self.error_tx.lock()? = Some(sender);
        Ok(())
    }

    /// The current pool generation.
    pub fn generation(&self) -> Result<usize> {
        Ok(self.inner.lock()?.generation)
    }

    /// Open plus in-flight connections.
    pub fn total_connection_count(&self) -> Result<usize> {
        Ok(self.inner.lock()?.total)
    }

    /// Connections sitting idle in the pool.
    pub fn available_connection_count(&self) -> Result<usize> {
        Ok(self.inner.lock()?.available.len())
    }

    pub fn is_closed(&self) -> Result<bool> {
        Ok(self.inner.lock()?.closed)
    }

    /// Checks out a connection, waiting up to the configured wait queue
    /// timeout for one to become available.
    pub fn check_out(&self) -> Result<Connection> {
        self.check_out_with_timeout(Duration::from_millis(self.options.wait_queue_timeout_ms))
    }

    /// Checks out a connection, waiting up to `timeout`.
    ///
    /// The deadline is measured from the start of the call, so time spent
    /// waiting on earlier rounds counts against later ones.
    pub fn check_out_with_timeout(&self, timeout: Duration) -> Result<Connection> {
        self.emit(Event::CheckOutStarted { address: self.host.clone() });

        let start = Instant::now();
        let mut doomed = Vec::new();
        let result = self.acquire(start, timeout, &mut doomed);

        // Perished connections are destroyed outside the pool lock.
        for (conn, reason) in doomed {
            self.destroy_connection(conn, reason);
        }

        match result {
            Ok(conn) => {
                self.emit(Event::ConnectionCheckedOut {
                    address: self.host.clone(),
                    connection_id: conn.id,
                });
                Ok(conn)
            }
            Err(err) => {
                match err {
                    PoolClosedError(_) => {
                        self.emit(Event::CheckOutFailed {
                            address: self.host.clone(),
                            reason: CheckOutFailedReason::PoolClosed,
                        })
                    }
                    WaitQueueTimeoutError(_) => {
                        self.emit(Event::CheckOutFailed {
                            address: self.host.clone(),
                            reason: CheckOutFailedReason::Timeout,
                        })
                    }
                    _ => {}
                }
                Err(err)
            }
        }
    }

    fn acquire(&self,
               start: Instant,
               timeout: Duration,
               doomed: &mut Vec<(Connection, ConnectionClosedReason)>)
               -> Result<Connection> {
        let max_idle = Duration::from_millis(self.options.max_idle_time_ms);
        // At most one establishment in flight per checkout, re-armed when a
        // creation failure is observed, so a waiter neither over-provisions
        // on a spurious wakeup nor starves behind a dead connect attempt.
        let mut spawned = false;
        let mut inner = self.inner.lock()?;
        let mut seen_failures = inner.failed_creations;

        loop {
            if inner.closed {
                return Err(PoolClosedError(self.host.clone()));
            }

            if inner.failed_creations != seen_failures {
                seen_failures = inner.failed_creations;
                spawned = false;
            }

            while let Some(conn) = inner.available.pop_front() {
                if conn.generation < inner.generation {
                    inner.total -= 1;
                    doomed.push((conn, ConnectionClosedReason::Stale));
                } else if self.options.max_idle_time_ms > 0 && conn.idle_time() >= max_idle {
                    inner.total -= 1;
                    doomed.push((conn, ConnectionClosedReason::Idle));
                } else {
                    return Ok(conn);
                }
            }

            let under_max = self.options.max_pool_size == 0 ||
                            inner.total < self.options.max_pool_size;
            if !spawned && under_max && inner.pending < MAX_CONNECTING {
                spawned = true;
                let id = inner.next_id;
                inner.next_id += 1;
                inner.total += 1;
                inner.pending += 1;
                let generation = inner.generation;
                let pool = self.clone();
                thread::spawn(move || {
                    pool.create_connection(id, generation);
                });
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(WaitQueueTimeoutError(self.host.clone()));
            }

            let (guard, _) = self.wait_lock.wait_timeout(inner, timeout - elapsed)?;
            inner = guard;
        }
    }

    // Establishes a connection for an already reserved slot. Called with no
    // locks held; reports whether the connection was established.
    fn create_connection(&self, id: usize, generation: usize) -> bool {
        self.emit(Event::ConnectionCreated {
            address: self.host.clone(),
            connection_id: id,
        });

        match self.stream_connector.connect(&self.host.host_name, self.host.port) {
            Ok(stream) => {
                let conn = Connection {
                    id: id,
                    generation: generation,
                    pool_id: self.id,
                    address: self.host.clone(),
                    socket: BufStream::new(stream),
                    last_checkin: Instant::now(),
                    home: Arc::downgrade(&self.inner),
                    home_wait: Arc::downgrade(&self.wait_lock),
                };

                let doomed = {
                    let mut inner = match self.inner.lock() {
                        Ok(guard) => guard,
                        Err(_) => return false,
                    };
                    inner.pending -= 1;
                    if inner.closed {
                        inner.total -= 1;
                        Some((conn, ConnectionClosedReason::PoolClosed))
                    } else if conn.generation < inner.generation {
                        inner.total -= 1;
                        Some((conn, ConnectionClosedReason::Stale))
                    } else {
                        inner.available.push_back(conn);
                        None
                    }
                };

                self.wait_lock.notify_all();
                match doomed {
                    Some((conn, reason)) => {
                        self.destroy_connection(conn, reason);
                    }
                    None => {
                        self.emit(Event::ConnectionReady {
                            address: self.host.clone(),
                            connection_id: id,
                        });
                    }
                }
                true
            }
            Err(err) => {
                if let Ok(mut inner) = self.inner.lock() {
                    inner.pending -= 1;
                    inner.total -= 1;
                    inner.failed_creations += 1;
                }
                self.wait_lock.notify_all();
                self.emit(Event::ConnectionClosed {
                    address: self.host.clone(),
                    connection_id: id,
                    reason: ConnectionClosedReason::Error,
                });
                self.report_error(Error::from(err));
                false
            }
        }
    }

    /// Returns a connection to the pool.
    pub fn check_in(&self, conn: Connection) -> Result<()> {
        self.check_in_with_force(conn, false)
    }

    /// Returns a connection to the pool, destroying it if `force` is set.
    ///
    /// Callers force destruction after an error on the connection left its
    /// state unknown.
    pub fn check_in_with_force(&self, mut conn: Connection, force: bool) -> Result<()> {
        if conn.pool_id != self.id {
            // Route the stray back to the pool that owns it so that pool's
            // accounting stays intact; the error goes to the misrouting
            // caller alone.
            if let (Some(inner), Some(wait_lock)) = (conn.home.upgrade(),
                                                     conn.home_wait.upgrade()) {
                give_back(&inner, &wait_lock, conn);
            }
            return Err(ForeignConnectionError(self.host.clone()));
        }

        let id = conn.id;
        let doomed = {
            let mut inner = self.inner.lock()?;
            let reason = if inner.closed {
                Some(ConnectionClosedReason::PoolClosed)
            } else if conn.generation < inner.generation {
                Some(ConnectionClosedReason::Stale)
            } else if force {
                Some(ConnectionClosedReason::Error)
            } else {
                None
            };

            match reason {
                Some(reason) => {
                    inner.total -= 1;
                    Some((conn, reason))
                }
                None => {
                    conn.last_checkin = Instant::now();
                    inner.available.push_back(conn);
                    None
                }
            }
        };

        self.wait_lock.notify_all();
        self.emit(Event::ConnectionCheckedIn {
            address: self.host.clone(),
            connection_id: id,
        });

        if let Some((conn, reason)) = doomed {
            self.destroy_connection(conn, reason);
        }
        Ok(())
    }

    /// Invalidates every connection created so far.
    ///
    /// Checked-out connections are not touched; they are destroyed when
    /// they come back in and their generation no longer matches.
    pub fn clear(&self) -> Result<()> {
        let generation = {
            let mut inner = self.inner.lock()?;
            if inner.closed {
                return Ok(());
            }
            inner.generation += 1;
            inner.generation
        };

        self.wait_lock.notify_all();
        self.emit(Event::PoolCleared {
            address: self.host.clone(),
            generation: generation,
        });
        Ok(())
    }

    /// Closes the pool, destroying its idle connections. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.maintenance_running.store(false, Ordering::SeqCst);
        {
            let (ref _lock, ref cvar) = *self.maintenance_wake;
            cvar.notify_all();
        }

        let idle: Vec<Connection> = {
            let mut inner = self.inner.lock()?;
            if inner.closed {
                return Ok(());
            }
            inner.closed = true;
            let idle: Vec<Connection> = inner.available.drain(..).collect();
            inner.total -= idle.len();
            idle
        };

        self.wait_lock.notify_all();
        for conn in idle {
            self.destroy_connection(conn, ConnectionClosedReason::PoolClosed);
        }
        self.emit(Event::PoolClosed { address: self.host.clone() });
        Ok(())
    }

    // Background worker that keeps the pool at its minimum size.
    fn run_maintenance(&self) {
        while self.maintenance_running.load(Ordering::SeqCst) {
            self.ensure_min_pool_size();

            let (ref lock, ref cvar) = *self.maintenance_wake;
            if let Ok(guard) = lock.lock() {
                let timeout = Duration::from_millis(MIN_POOL_SIZE_CHECK_FREQUENCY_MS);
                let _ = cvar.wait_timeout(guard, timeout);
            }
        }
    }

    // Tops the pool up to minPoolSize, one blocking connect at a time. A
    // failed connect ends the pass; the next tick retries.
    fn ensure_min_pool_size(&self) {
        loop {
            let (id, generation) = {
                let mut inner = match self.inner.lock() {
                    Ok(guard) => guard,
                    Err(_) => return,
                };
                if inner.closed || inner.total >= self.options.min_pool_size {
                    return;
                }
                let id = inner.next_id;
                inner.next_id += 1;
                inner.total += 1;
                inner.pending += 1;
                (id, inner.generation)
            };

            if !self.create_connection(id, generation) {
                return;
            }
        }
    }

    fn destroy_connection(&self, conn: Connection, reason: ConnectionClosedReason) {
        let id = conn.id;
        conn.close();
        self.emit(Event::ConnectionClosed {
            address: self.host.clone(),
            connection_id: id,
            reason: reason,
        });
    }

    fn report_error(&self, err: Error) {
        if let Ok(guard) = self.error_tx.lock() {
            if let Some(ref sender) = *guard {
                let _ = sender.send(err);
            }
        }
    }

    fn emit(&self, event: Event) {
        self.listener.dispatch(&event);
    }
}

// Returns a misrouted connection to the pool that owns it, applying the
// usual closed/staleness checks on the way in.
fn give_back(inner: &Mutex<PoolInner>, wait_lock: &Condvar, mut conn: Connection) {
    let doomed = match inner.lock() {
        Ok(mut guard) => {
            if guard.closed || conn.generation < guard.generation {
                guard.total -= 1;
                Some(conn)
            } else {
                conn.last_checkin = Instant::now();
                guard.available.push_back(conn);
                None
            }
        }
        Err(_) => Some(conn),
    };

    wait_lock.notify_all();
    if let Some(conn) = doomed {
        conn.close();
    }
}
