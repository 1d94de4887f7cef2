//! mDNS group membership and the responder engine.
//!
//! Joins the well-known groups from [RFC6762](https://www.rfc-editor.org/rfc/rfc6762),
//! one bound channel per interface, and runs user handlers over whatever
//! turns up. tokio's `UdpSocket` can't set the multicast options we need at
//! bind time, so the sockets are built with socket2 and handed over.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use crate::client::{ClientOptions, DnsClient};
use crate::error::GoatHerdError;
use crate::message::{Envelope, Message};
use crate::packet_dumper::{capture_datagram, Direction};
use crate::{MDNS_BUFFER_SIZE, MDNS_PORT};

/// The IPv4 mDNS group
pub const MDNS_GROUP_V4: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
/// The IPv6 mDNS group (link-local scope)
pub const MDNS_GROUP_V6: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 0xfb);

/// RFC 6762 section 6 collision avoidance - responders wait a uniformly
/// random delay in this window before answering shared questions.
pub const RESPONSE_DELAY_MIN_MS: u64 = 20;
pub const RESPONSE_DELAY_MAX_MS: u64 = 120;

/// Which interface a channel binds to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MdnsInterface {
    /// IPv4, by interface address. `0.0.0.0` lets the kernel pick.
    V4(Ipv4Addr),
    /// IPv6, by interface index, plus that interface's own address so the
    /// self-traffic filter has something to compare against. Index `0`
    /// lets the kernel pick; `::` skips the self check the same way
    /// `0.0.0.0` does on v4.
    V6 { index: u32, addr: Ipv6Addr },
}

#[derive(Clone, Debug)]
pub struct MulticastOptions {
    /// Turn off multicast loopback so we don't process our own responses.
    /// Off by default - the system default keeps loopback on, which is
    /// what you want on a box running both querier and responder.
    pub ignore_self: bool,
    /// Write raw datagrams to `./captures/` as they fly past
    pub capture_packets: bool,
    /// The mDNS port. 5353 unless you're wiring up tests.
    pub port: u16,
}

impl Default for MulticastOptions {
    fn default() -> Self {
        MulticastOptions {
            ignore_self: false,
            capture_packets: false,
            port: MDNS_PORT,
        }
    }
}

/// Creates a new UDP socket with the REUSEADDR/REUSEPORT options that let
/// several mDNS participants share port 5353 on one machine.
fn new_socket(domain: Domain) -> Result<Socket, GoatHerdError> {
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    // tokio's from_std wants this
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// A responder-side socket: bound to `0.0.0.0` on the mDNS port, joined to
/// the group on the given interface, sending out the same interface.
pub fn multicast_v4_socket(
    iface: Ipv4Addr,
    options: &MulticastOptions,
) -> Result<UdpSocket, GoatHerdError> {
    let socket = new_socket(Domain::IPV4)?;
    socket.join_multicast_v4(&MDNS_GROUP_V4, &iface)?;
    socket.set_multicast_if_v4(&iface)?;
    if options.ignore_self {
        socket.set_multicast_loop_v4(false)?;
    }
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, options.port));
    socket.bind(&addr.into())?;
    Ok(UdpSocket::from_std(socket.into())?)
}

/// Same again for IPv6 - interfaces go by index there.
pub fn multicast_v6_socket(
    iface_index: u32,
    options: &MulticastOptions,
) -> Result<UdpSocket, GoatHerdError> {
    let socket = new_socket(Domain::IPV6)?;
    socket.set_only_v6(true)?;
    socket.join_multicast_v6(&MDNS_GROUP_V6, iface_index)?;
    socket.set_multicast_if_v6(iface_index)?;
    if options.ignore_self {
        socket.set_multicast_loop_v6(false)?;
    }
    let addr = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, options.port, 0, 0));
    socket.bind(&addr.into())?;
    Ok(UdpSocket::from_std(socket.into())?)
}

/// A query-side socket: ephemeral port, group joined so multicast answers
/// are heard, outgoing interface pinned.
pub fn query_socket(
    interface: MdnsInterface,
    options: &MulticastOptions,
) -> Result<UdpSocket, GoatHerdError> {
    match interface {
        MdnsInterface::V4(iface) => {
            let socket = new_socket(Domain::IPV4)?;
            socket.join_multicast_v4(&MDNS_GROUP_V4, &iface)?;
            socket.set_multicast_if_v4(&iface)?;
            if options.ignore_self {
                socket.set_multicast_loop_v4(false)?;
            }
            let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));
            socket.bind(&addr.into())?;
            Ok(UdpSocket::from_std(socket.into())?)
        }
        MdnsInterface::V6 { index, .. } => {
            let socket = new_socket(Domain::IPV6)?;
            socket.set_only_v6(true)?;
            socket.join_multicast_v6(&MDNS_GROUP_V6, index)?;
            socket.set_multicast_if_v6(index)?;
            if options.ignore_self {
                socket.set_multicast_loop_v6(false)?;
            }
            let addr = SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0));
            socket.bind(&addr.into())?;
            Ok(UdpSocket::from_std(socket.into())?)
        }
    }
}

/// The group address a query on this interface should be sent to.
pub fn group_address(interface: MdnsInterface, port: u16) -> SocketAddr {
    match interface {
        MdnsInterface::V4(_) => SocketAddr::V4(SocketAddrV4::new(MDNS_GROUP_V4, port)),
        MdnsInterface::V6 { index, .. } => {
            SocketAddr::V6(SocketAddrV6::new(MDNS_GROUP_V6, port, 0, index))
        }
    }
}

/// An mDNS client: ephemeral-port socket joined to the group, queries aimed
/// at the group address. Pair it with a `Continue`-returning callback,
/// answers arrive from all over the herd.
pub fn mdns_client(
    interface: MdnsInterface,
    multicast_options: &MulticastOptions,
    client_options: ClientOptions,
) -> Result<DnsClient, GoatHerdError> {
    let socket = query_socket(interface, multicast_options)?;
    Ok(DnsClient::from_socket(
        socket,
        group_address(interface, multicast_options.port),
        client_options,
    ))
}

/// One uniformly-random response delay, freshly sampled per response.
pub fn response_delay() -> Duration {
    let mut rng = rand::rng();
    Duration::from_millis(rng.random_range(RESPONSE_DELAY_MIN_MS..=RESPONSE_DELAY_MAX_MS))
}

/// What a responder does with each inbound datagram. Returning `Ok(None)`
/// sends nothing - the question wasn't ours. Errors kill the channel.
#[async_trait]
pub trait MdnsHandler: Send + Sync + 'static {
    async fn handle(&self, query: Envelope) -> Result<Option<Envelope>, GoatHerdError>;
}

/// One bound channel: receives off its socket, runs the handler, and
/// schedules any response after the RFC 6762 delay.
struct Processor<H> {
    socket: Arc<UdpSocket>,
    handler: Arc<H>,
    interface: MdnsInterface,
    options: MulticastOptions,
    shutdown_rx: watch::Receiver<bool>,
}

impl<H: MdnsHandler> Processor<H> {
    async fn process(self) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut buf = vec![0u8; MDNS_BUFFER_SIZE];
        loop {
            if *shutdown_rx.borrow() {
                info!("shutting down mDNS listener on {:?}", self.interface);
                return;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("shutting down mDNS listener on {:?}", self.interface);
                    return;
                }
                res = self.socket.recv_from(&mut buf) => {
                    let (len, addr) = match res {
                        Ok(value) => value,
                        Err(error) => {
                            error!("error receiving on mDNS socket {:?}: {error:?}", self.interface);
                            continue;
                        }
                    };
                    if is_own_traffic(self.interface, &self.options, addr) {
                        trace!("ignoring our own datagram from {addr:?}");
                        continue;
                    }
                    debug!("{len} bytes received from {addr:?} on {:?}", self.interface);
                    if self.options.capture_packets {
                        capture_datagram(Direction::MdnsIn, &buf[0..len]).await;
                    }

                    // a misbehaving peer shouldn't take the responder down
                    // for everyone else, so bad packets are drops, not faults
                    let message = match Message::from_bytes(&buf[0..len]) {
                        Ok(value) => value,
                        Err(error) => {
                            debug!("dropping undecodable mDNS datagram from {addr:?}: {error}");
                            crate::utils::hexdump(&buf[0..len]);
                            continue;
                        }
                    };

                    let reply = match self.handler.handle(Envelope { addr, message }).await {
                        Ok(Some(envelope)) => envelope,
                        Ok(None) => continue,
                        Err(error) => {
                            error!("mDNS handler failed, closing channel {:?}: {error}", self.interface);
                            return;
                        }
                    };
                    self.schedule_response(reply);
                }
            }
        }
    }

    /// RFC 6762 section 6: don't answer immediately, wait 20-120ms so
    /// responders sharing the group don't collide. Sampled per response.
    /// A shutdown between now and then discards the write.
    fn schedule_response(&self, reply: Envelope) {
        let delay = response_delay();
        let socket = self.socket.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();
        let capture = self.options.capture_packets;
        trace!("scheduling mDNS response to {:?} in {delay:?}", reply.addr);
        tokio::spawn(async move {
            if *shutdown_rx.borrow() {
                trace!("channel closed before delayed response, discarding");
                return;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    trace!("channel closed before delayed response, discarding");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            // names repeat constantly in mDNS answers, compression pays for itself
            let bytes = match reply.message.as_bytes(true) {
                Ok(value) => value,
                Err(error) => {
                    error!("failed to encode mDNS response: {error}");
                    return;
                }
            };
            if capture {
                capture_datagram(Direction::MdnsOut, &bytes).await;
            }
            if let Err(error) = socket.send_to(&bytes, reply.addr).await {
                error!("failed to send mDNS response to {:?}: {error:?}", reply.addr);
            }
        });
    }
}

/// When loopback suppression is on, datagrams that came from our own
/// interface address on the mDNS port get dropped too - the socket-level
/// loopback flag only covers packets looped by the local stack. Both
/// families get the same check; an unspecified interface address means
/// there's nothing to compare against, so nothing is dropped.
pub(crate) fn is_own_traffic(
    interface: MdnsInterface,
    options: &MulticastOptions,
    addr: SocketAddr,
) -> bool {
    if !options.ignore_self || addr.port() != options.port {
        return false;
    }
    match interface {
        MdnsInterface::V4(iface) => !iface.is_unspecified() && addr.ip() == IpAddr::V4(iface),
        MdnsInterface::V6 { addr: iface, .. } => {
            !iface.is_unspecified() && addr.ip() == IpAddr::V6(iface)
        }
    }
}

/// Starts one processing loop on an already-bound socket. [Responders::spawn]
/// does this per interface; it's split out so the pipeline can be driven
/// over any socket.
pub(crate) fn spawn_listener<H: MdnsHandler>(
    socket: UdpSocket,
    interface: MdnsInterface,
    handler: Arc<H>,
    options: MulticastOptions,
    shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let processor = Processor {
        socket: Arc::new(socket),
        handler,
        interface,
        options,
        shutdown_rx,
    };
    tokio::spawn(processor.process())
}

/// The responder multiplexer - one [Processor] per interface, all torn down
/// together. Dropping it stops the lot.
pub struct Responders {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Responders {
    /// Bind and join on each requested interface and start processing. At
    /// least one interface has to come up or this is a startup error.
    pub fn spawn<H: MdnsHandler>(
        interfaces: &[MdnsInterface],
        handler: H,
        options: MulticastOptions,
    ) -> Result<Self, GoatHerdError> {
        let handler = Arc::new(handler);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = vec![];

        for interface in interfaces {
            let socket = match interface {
                MdnsInterface::V4(iface) => multicast_v4_socket(*iface, &options),
                MdnsInterface::V6 { index, .. } => multicast_v6_socket(*index, &options),
            };
            let socket = match socket {
                Ok(value) => {
                    info!("joined mDNS group on {interface:?}");
                    value
                }
                Err(error) => {
                    error!("failed to bind mDNS listener on {interface:?}: {error}");
                    continue;
                }
            };
            handles.push(spawn_listener(
                socket,
                *interface,
                handler.clone(),
                options.clone(),
                shutdown_rx.clone(),
            ));
        }

        if handles.is_empty() {
            return Err(GoatHerdError::StartupError(
                "no mDNS listeners could be started".to_string(),
            ));
        }

        Ok(Responders {
            handles,
            shutdown_tx,
        })
    }

    /// Ask every processor to stop. Pending delayed responses are discarded.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for all the processors to finish up.
    pub async fn join_all(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }
}

impl Drop for Responders {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        for handle in &self.handles {
            handle.abort();
        }
    }
}
