// TCP server and main loop for the session coordinator.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - Listener thread: non-blocking `accept()` loop; sends each new stream to
//   the main thread as `InternalEvent::NewConnection`.
// - Reader threads (one per connection): read the `Hello` handshake, then
//   every following `ClientMessage`, and forward them as events. EOF, a
//   malformed frame, `Goodbye` or a second `Hello` end the thread with a
//   `Disconnected` event.
// - Main thread: owns the `Session<TcpChannel>`. It assigns connection ids,
//   attaches the write half once the handshake arrives, and turns every
//   event into a queued `SessionInput`. `recv_timeout` doubles as the tick
//   timer: whenever a tick interval has passed, the session ticks with the
//   measured elapsed time.
//
// The main thread is the only writer to sockets, and the session is only
// touched from it, so there is no locking. Shutdown: `ServerHandle::stop`
// clears `keep_running` and joins the main thread.

use std::collections::BTreeMap;
use std::io::BufReader;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use skirmish_protocol::{ClientMessage, ConnectionId, PlayerRequest, recv_json};
use skirmish_session::{Session, SessionConfig, SessionInput, StaticCatalog};
use tracing::{debug, info, warn};

use crate::channel::TcpChannel;
use crate::error::ServerError;

/// How long a new connection may take to send `Hello`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Events sent from listener/reader threads (and the handle) to the main
/// thread.
enum InternalEvent {
    NewConnection {
        stream: TcpStream,
    },
    Hello {
        connection: ConnectionId,
        protocol_version: u32,
        player_name: String,
        skill_rating: Option<f64>,
    },
    Request {
        connection: ConnectionId,
        request: PlayerRequest,
    },
    Disconnected {
        connection: ConnectionId,
    },
    /// Collaborator input injected by the embedding process.
    Input(SessionInput),
}

/// Handle returned by `start_server` to control the running server.
pub struct ServerHandle {
    keep_running: Arc<AtomicBool>,
    events: Sender<InternalEvent>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    /// Queue a collaborator input (winner signal, combat stats) for the
    /// next tick.
    pub fn submit(&self, input: SessionInput) {
        if self.events.send(InternalEvent::Input(input)).is_err() {
            warn!("server loop has stopped; input dropped");
        }
    }

    /// Signal the server to stop and wait for it to shut down.
    pub fn stop(mut self) {
        self.keep_running.store(false, Ordering::SeqCst);
        self.join();
    }

    /// Block until the server loop exits.
    pub fn wait(mut self) {
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// Configuration for starting a server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub tick_interval: Duration,
    pub session: SessionConfig,
    /// Hero list; without one every draft pick falls back to
    /// `SessionConfig::fallback_hero`.
    pub catalog: Option<StaticCatalog>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 7979,
            tick_interval: Duration::from_millis(50),
            session: SessionConfig::default(),
            catalog: None,
        }
    }
}

/// Start the server on a background thread. Returns a handle for stopping
/// it and the bound address (useful with port 0).
pub fn start_server(config: ServerConfig) -> Result<(ServerHandle, SocketAddr), ServerError> {
    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&bind_addr).map_err(|source| ServerError::Bind {
        addr: bind_addr.clone(),
        source,
    })?;
    let addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;

    let mut session = Session::new(config.session, TcpChannel::new())?;
    match config.catalog {
        Some(catalog) => {
            info!(heroes = catalog.len(), "hero catalog loaded");
            session = session.with_catalog(catalog);
        }
        None => warn!("no hero catalog; drafts will use the fallback hero"),
    }

    let keep_running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = mpsc::channel();

    let keep_running_listener = Arc::clone(&keep_running);
    let tx_listener = tx.clone();
    thread::spawn(move || accept_loop(listener, tx_listener, keep_running_listener));

    let mut router = Router {
        next_connection: 0,
        pending: BTreeMap::new(),
        tx: tx.clone(),
        keep_running: Arc::clone(&keep_running),
    };
    let keep_running_main = Arc::clone(&keep_running);
    let tick_interval = config.tick_interval;
    let thread = thread::spawn(move || {
        run_loop(&mut session, &mut router, rx, tick_interval, &keep_running_main);
    });

    info!(%addr, "server listening");
    Ok((
        ServerHandle {
            keep_running,
            events: tx,
            thread: Some(thread),
        },
        addr,
    ))
}

fn accept_loop(listener: TcpListener, tx: Sender<InternalEvent>, keep_running: Arc<AtomicBool>) {
    while keep_running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted connection");
                stream.set_nonblocking(false).ok();
                stream.set_nodelay(true).ok();
                if tx.send(InternalEvent::NewConnection { stream }).is_err() {
                    break;
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(20));
            }
            Err(err) => {
                warn!(%err, "accept failed; listener stopping");
                break;
            }
        }
    }
}

/// Main-thread connection bookkeeping.
struct Router {
    next_connection: u64,
    /// Write halves of connections that have not completed the handshake.
    pending: BTreeMap<ConnectionId, TcpStream>,
    tx: Sender<InternalEvent>,
    keep_running: Arc<AtomicBool>,
}

fn run_loop(
    session: &mut Session<TcpChannel>,
    router: &mut Router,
    rx: Receiver<InternalEvent>,
    tick_interval: Duration,
    keep_running: &AtomicBool,
) {
    let mut last_tick = Instant::now();
    while keep_running.load(Ordering::SeqCst) {
        let wait = tick_interval.saturating_sub(last_tick.elapsed());
        match rx.recv_timeout(wait) {
            Ok(event) => {
                router.handle_event(session, event);
                while let Ok(event) = rx.try_recv() {
                    router.handle_event(session, event);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        let now = Instant::now();
        let elapsed = now - last_tick;
        if elapsed >= tick_interval {
            session.tick(elapsed);
            last_tick = now;
        }
    }
    info!("server loop stopped");
}

impl Router {
    fn handle_event(&mut self, session: &mut Session<TcpChannel>, event: InternalEvent) {
        match event {
            InternalEvent::NewConnection { stream } => self.accept(stream),
            InternalEvent::Hello {
                connection,
                protocol_version,
                player_name,
                skill_rating,
            } => {
                let Some(stream) = self.pending.remove(&connection) else {
                    warn!(%connection, "hello from unknown connection");
                    return;
                };
                session.channel_mut().attach(connection, stream);
                session.enqueue(SessionInput::Connect {
                    connection,
                    protocol_version,
                    player_name,
                    skill_rating,
                });
            }
            InternalEvent::Request {
                connection,
                request,
            } => session.enqueue(SessionInput::Request {
                connection,
                request,
            }),
            InternalEvent::Disconnected { connection } => {
                self.pending.remove(&connection);
                session.enqueue(SessionInput::Disconnect { connection });
            }
            InternalEvent::Input(input) => session.enqueue(input),
        }
    }

    /// Assign a connection id and start its reader thread.
    fn accept(&mut self, stream: TcpStream) {
        let connection = ConnectionId(self.next_connection);
        self.next_connection += 1;
        let reader = match stream.try_clone() {
            Ok(s) => BufReader::new(s),
            Err(err) => {
                warn!(%connection, %err, "cannot clone stream; dropping connection");
                return;
            }
        };
        self.pending.insert(connection, stream);
        let tx = self.tx.clone();
        let keep_running = Arc::clone(&self.keep_running);
        thread::spawn(move || reader_loop(reader, connection, tx, keep_running));
        debug!(%connection, "awaiting handshake");
    }
}

/// Reader loop for one connection. Runs in its own thread.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    connection: ConnectionId,
    tx: Sender<InternalEvent>,
    keep_running: Arc<AtomicBool>,
) {
    if let Some(hello) = read_hello(&mut reader, connection)
        && tx.send(hello).is_ok()
    {
        while keep_running.load(Ordering::SeqCst) {
            match recv_json::<_, ClientMessage>(&mut reader) {
                Ok(ClientMessage::Request(request)) => {
                    let event = InternalEvent::Request {
                        connection,
                        request,
                    };
                    if tx.send(event).is_err() {
                        return;
                    }
                }
                Ok(ClientMessage::Goodbye) => {
                    debug!(%connection, "goodbye");
                    break;
                }
                Ok(ClientMessage::Hello { .. }) => {
                    warn!(%connection, "second hello; disconnecting");
                    break;
                }
                Err(err) => {
                    if !err.is_eof() {
                        debug!(%connection, %err, "read failed");
                    }
                    break;
                }
            }
        }
    }
    let _ = tx.send(InternalEvent::Disconnected { connection });
}

fn read_hello(
    reader: &mut BufReader<TcpStream>,
    connection: ConnectionId,
) -> Option<InternalEvent> {
    reader.get_ref().set_read_timeout(Some(HANDSHAKE_TIMEOUT)).ok();
    let first = recv_json::<_, ClientMessage>(reader);
    reader.get_ref().set_read_timeout(None).ok();
    match first {
        Ok(ClientMessage::Hello {
            protocol_version,
            player_name,
            skill_rating,
        }) => Some(InternalEvent::Hello {
            connection,
            protocol_version,
            player_name,
            skill_rating,
        }),
        Ok(other) => {
            warn!(%connection, ?other, "expected hello as first message");
            None
        }
        Err(err) => {
            warn!(%connection, %err, "handshake failed");
            None
        }
    }
}
