//! The client side: a UDP pipeline and the pending-query registry that
//! matches responses back up with whoever asked.
//!
//! The registry table and the ID counter are owned by a single task and
//! everything talks to it over a command channel, so there are no locks and
//! no chance of two callers grabbing the same transaction ID.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::error::GoatHerdError;
use crate::message::Message;
use crate::packet_dumper::{capture_datagram, Direction};
use crate::{DEFAULT_QUERY_TIMEOUT, MDNS_BUFFER_SIZE};

/// What a streaming callback tells the registry after each delivered
/// response: keep the entry around for more (mDNS answers trickle in from
/// all over the herd) or evict it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackSignal {
    Continue,
    Done,
}

/// Runs on the registry task for every response matching the query's ID.
/// The first response also resolves the [ReplyHandle]; the callback is how
/// second-and-later responses reach the caller.
pub type QueryCallback = Box<dyn FnMut(&Message) -> BoxFuture<'static, CallbackSignal> + Send>;

/// The default callback for unicast DNS - one response and we're done.
pub fn single_shot() -> QueryCallback {
    Box::new(|_| Box::pin(async { CallbackSignal::Done }))
}

/// The caller's end of an outstanding query. Resolves exactly once - with
/// the first matching response, or with a timeout, cancellation or channel
/// failure.
pub struct ReplyHandle {
    rx: oneshot::Receiver<Result<Message, GoatHerdError>>,
}

impl ReplyHandle {
    pub async fn reply(self) -> Result<Message, GoatHerdError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(GoatHerdError::ChannelClosed),
        }
    }
}

/// A waiting entry in the registry.
struct SentQuery {
    /// The message as sent, kept for diagnostics
    query: Message,
    /// Resolves the caller's handle. Taken on first use so later responses
    /// can't re-resolve it.
    resp: Option<oneshot::Sender<Result<Message, GoatHerdError>>>,
    callback: QueryCallback,
}

enum Command {
    Send {
        message: Message,
        callback: QueryCallback,
        timeout: Duration,
        resp: oneshot::Sender<Result<Message, GoatHerdError>>,
    },
    Inbound {
        message: Message,
    },
    TimedOut {
        id: u16,
    },
    CancelAll {
        ack: oneshot::Sender<()>,
    },
    /// The socket or decoder fell over - fail everything and shut down.
    Fail {
        reason: String,
    },
}

/// Knobs for [DnsClient]. The defaults are what a stub resolver wants.
#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Per-query deadline unless the caller says otherwise
    pub timeout: Duration,
    /// Write raw datagrams to `./captures/` as they fly past
    pub capture_packets: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            timeout: DEFAULT_QUERY_TIMEOUT,
            capture_packets: false,
        }
    }
}

/// A UDP DNS client: one socket, one target, and a registry of in-flight
/// queries. Works the same whether the target is a recursive resolver on
/// port 53 or the mDNS group on 5353 - only the socket setup differs.
pub struct DnsClient {
    cmd_tx: mpsc::Sender<Command>,
    timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl DnsClient {
    /// Bind an ephemeral local port and aim at a nameserver.
    pub async fn connect(nameserver: SocketAddr) -> Result<Self, GoatHerdError> {
        Self::connect_with_options(nameserver, ClientOptions::default()).await
    }

    pub async fn connect_with_options(
        nameserver: SocketAddr,
        options: ClientOptions,
    ) -> Result<Self, GoatHerdError> {
        let local: SocketAddr = match nameserver {
            SocketAddr::V4(_) => "0.0.0.0:0".parse().map_err(|e| {
                GoatHerdError::StartupError(format!("failed to parse bind address: {e:?}"))
            })?,
            SocketAddr::V6(_) => "[::]:0".parse().map_err(|e| {
                GoatHerdError::StartupError(format!("failed to parse bind address: {e:?}"))
            })?,
        };
        let socket = UdpSocket::bind(local).await?;
        debug!(
            "bound client socket {} -> {}",
            socket.local_addr()?,
            nameserver
        );
        Ok(Self::from_socket(socket, nameserver, options))
    }

    /// Wrap an already-configured socket - this is how the mDNS query path
    /// gets in, with a socket that's had its multicast options set.
    pub fn from_socket(socket: UdpSocket, target: SocketAddr, options: ClientOptions) -> Self {
        let socket = Arc::new(socket);
        let (cmd_tx, cmd_rx) = mpsc::channel(128);

        let registry = Registry {
            socket: socket.clone(),
            target,
            pending: HashMap::new(),
            next_id: rand::random::<u16>(),
            cmd_tx: cmd_tx.clone(),
            capture_packets: options.capture_packets,
        };

        let manager = tokio::spawn(registry.run(cmd_rx));
        let reader = tokio::spawn(read_pipeline(
            socket,
            cmd_tx.clone(),
            options.capture_packets,
        ));

        DnsClient {
            cmd_tx,
            timeout: options.timeout,
            tasks: vec![manager, reader],
        }
    }

    /// Register the query, put it on the wire, and hand back the reply
    /// handle. The callback decides how long the entry lives; see
    /// [CallbackSignal].
    pub async fn send_query(
        &self,
        message: Message,
        callback: QueryCallback,
        timeout: Duration,
    ) -> Result<ReplyHandle, GoatHerdError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Send {
                message,
                callback,
                timeout,
                resp: tx,
            })
            .await
            .map_err(|_| GoatHerdError::ChannelClosed)?;
        Ok(ReplyHandle { rx })
    }

    /// Fire a query with the single-shot callback and wait for the answer.
    pub async fn query(&self, message: Message) -> Result<Message, GoatHerdError> {
        let handle = self.send_query(message, single_shot(), self.timeout).await?;
        handle.reply().await
    }

    /// Drain the pending table, failing every outstanding handle with
    /// [GoatHerdError::Cancelled].
    pub async fn cancel_all(&self) -> Result<(), GoatHerdError> {
        let (ack, done) = oneshot::channel();
        self.cmd_tx
            .send(Command::CancelAll { ack })
            .await
            .map_err(|_| GoatHerdError::ChannelClosed)?;
        done.await.map_err(|_| GoatHerdError::ChannelClosed)
    }

    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }
}

impl Drop for DnsClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

struct Registry {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
    pending: HashMap<u16, SentQuery>,
    next_id: u16,
    cmd_tx: mpsc::Sender<Command>,
    capture_packets: bool,
}

impl Registry {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Send {
                    message,
                    callback,
                    timeout,
                    resp,
                } => self.handle_send(message, callback, timeout, resp).await,
                Command::Inbound { message } => self.handle_inbound(message).await,
                Command::TimedOut { id } => self.handle_timeout(id),
                Command::CancelAll { ack } => {
                    self.fail_all(|| GoatHerdError::Cancelled);
                    // callers await this so the table is provably empty when they resume
                    let _ = ack.send(());
                }
                Command::Fail { reason } => {
                    error!("client channel failed, dropping {} in-flight queries: {reason}", self.pending.len());
                    self.fail_all(|| GoatHerdError::ChannelClosed);
                    return;
                }
            }
        }
        // client dropped the channel, nothing left to wait for
        self.fail_all(|| GoatHerdError::Cancelled);
    }

    /// Allocates the next free ID - monotonically incrementing, wrapping,
    /// skipping anything still in flight.
    fn allocate_id(&mut self) -> u16 {
        loop {
            self.next_id = self.next_id.wrapping_add(1);
            if !self.pending.contains_key(&self.next_id) {
                return self.next_id;
            }
        }
    }

    async fn handle_send(
        &mut self,
        mut message: Message,
        callback: QueryCallback,
        timeout: Duration,
        resp: oneshot::Sender<Result<Message, GoatHerdError>>,
    ) {
        let id = self.allocate_id();
        message.header.id = id;

        // unicast client questions go out uncompressed, everyone copes
        let buf = match message.as_bytes(false) {
            Ok(value) => value,
            Err(error) => {
                let _ = resp.send(Err(error));
                return;
            }
        };
        if self.capture_packets {
            capture_datagram(Direction::QueryOut, &buf).await;
        }
        trace!("sending query id={id} ({} bytes) to {}", buf.len(), self.target);
        if let Err(error) = self.socket.send_to(&buf, self.target).await {
            error!("failed to send query id={id} to {}: {error:?}", self.target);
            let _ = resp.send(Err(error.into()));
            return;
        }

        self.pending.insert(
            id,
            SentQuery {
                query: message,
                resp: Some(resp),
                callback,
            },
        );

        let timeout_tx = self.cmd_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = timeout_tx.send(Command::TimedOut { id }).await;
        });
    }

    async fn handle_inbound(&mut self, message: Message) {
        let id = message.header.id;
        let entry = match self.pending.get_mut(&id) {
            Some(value) => value,
            None => {
                // late answers and other people's traffic end up here
                warn!("{}", GoatHerdError::UnknownQuery(id));
                return;
            }
        };
        trace!(
            "matched response id={id} to query {:?}",
            entry.query.questions.first().map(|q| q.qname.to_string())
        );

        // first response resolves the handle, later ones only reach the callback
        if let Some(tx) = entry.resp.take() {
            let _ = tx.send(Ok(message.clone()));
        }

        match (entry.callback)(&message).await {
            CallbackSignal::Done => {
                self.pending.remove(&id);
            }
            CallbackSignal::Continue => {}
        }
    }

    fn handle_timeout(&mut self, id: u16) {
        match self.pending.remove(&id) {
            Some(mut entry) => {
                debug!("query id={id} timed out");
                if let Some(tx) = entry.resp.take() {
                    let _ = tx.send(Err(GoatHerdError::Timeout));
                }
            }
            // already answered or cancelled, timers firing late are fine
            None => trace!("timeout for id={id} after eviction, ignoring"),
        }
    }

    fn fail_all(&mut self, error: impl Fn() -> GoatHerdError) {
        for (_, mut entry) in self.pending.drain() {
            if let Some(tx) = entry.resp.take() {
                let _ = tx.send(Err(error()));
            }
        }
    }
}

/// The inbound half: datagram -> bytes -> [Message] -> registry. Decode
/// failures are fatal for the whole client - we can't tell which query a
/// mangled packet belonged to, so every in-flight query is lost.
async fn read_pipeline(socket: Arc<UdpSocket>, cmd_tx: mpsc::Sender<Command>, capture: bool) {
    let mut buf = [0u8; MDNS_BUFFER_SIZE];
    loop {
        let (len, addr) = match socket.recv_from(&mut buf).await {
            Ok(value) => value,
            Err(error) => {
                error!("error receiving from client socket: {error:?}");
                let _ = cmd_tx
                    .send(Command::Fail {
                        reason: format!("socket receive failed: {error:?}"),
                    })
                    .await;
                return;
            }
        };
        trace!("{len} bytes received from {addr:?}");
        if capture {
            capture_datagram(Direction::ReplyIn, &buf[0..len]).await;
        }

        let message = match Message::from_bytes(&buf[0..len]) {
            Ok(value) => value,
            Err(error) => {
                error!("failed to decode datagram from {addr:?}: {error}");
                crate::utils::hexdump(&buf[0..len]);
                let _ = cmd_tx
                    .send(Command::Fail {
                        reason: format!("undecodable datagram from {addr:?}: {error}"),
                    })
                    .await;
                return;
            }
        };

        if cmd_tx.send(Command::Inbound { message }).await.is_err() {
            return;
        }
    }
}
