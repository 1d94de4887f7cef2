//! End-to-end tests for the client pipeline - a scripted nameserver on
//! loopback, a real client underneath, nothing mocked in between.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::client::{CallbackSignal, DnsClient, QueryCallback};
use crate::enums::{RecordClass, RecordType};
use crate::error::GoatHerdError;
use crate::message::{Message, ResourceRecord};
use crate::name::DnsName;
use crate::rdata::RecordData;
use crate::resolver::{select_nameserver, Resolver};

fn name(input: &str) -> DnsName {
    DnsName::try_from(input).expect("test name should parse")
}

/// A nameserver that answers every A question with 93.184.216.34.
async fn scripted_a_server() -> (SocketAddr, JoinHandle<()>) {
    let socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("test server should bind");
    let addr = socket.local_addr().expect("server should have an address");
    let handle = tokio::spawn(async move {
        let mut buf = [0u8; 512];
        loop {
            let (len, from) = match socket.recv_from(&mut buf).await {
                Ok(value) => value,
                Err(_) => return,
            };
            let query = Message::from_bytes(&buf[0..len]).expect("server should decode query");
            let mut response = Message::response_to(&query);
            response.header.recursion_available = true;
            response.answers.push(ResourceRecord::new(
                query.questions[0].qname.clone(),
                RecordType::A,
                RecordClass::Internet,
                300,
                RecordData::A {
                    address: "93.184.216.34".parse().expect("address should parse"),
                },
            ));
            let bytes = response.as_bytes(false).expect("server should encode");
            // the A payload on the wire is the four address octets
            assert!(bytes
                .windows(4)
                .any(|window| window == [0x5D, 0xB8, 0xD8, 0x22]));
            socket
                .send_to(&bytes, from)
                .await
                .expect("server should send");
        }
    });
    (addr, handle)
}

/// Binds a port and says nothing, ever.
async fn silent_server() -> (SocketAddr, UdpSocket) {
    let socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("test server should bind");
    let addr = socket.local_addr().expect("server should have an address");
    (addr, socket)
}

#[tokio::test]
async fn test_a_query_end_to_end() {
    let (server_addr, server) = scripted_a_server().await;

    let client = DnsClient::connect(server_addr)
        .await
        .expect("client should connect");
    let resolver = Resolver::new(client);
    let addrs = resolver
        .lookup_a("example.com", 443)
        .await
        .expect("lookup should succeed");

    let expected: SocketAddr = "93.184.216.34:443".parse().expect("address should parse");
    assert_eq!(addrs, vec![expected]);
    server.abort();
}

#[tokio::test]
async fn test_query_timeout() {
    let (server_addr, _server) = silent_server().await;

    let client = DnsClient::connect(server_addr)
        .await
        .expect("client should connect");
    let handle = client
        .send_query(
            Message::query(name("quiet.example.goat"), RecordType::A),
            crate::client::single_shot(),
            Duration::from_millis(100),
        )
        .await
        .expect("send should succeed");

    let result = handle.reply().await;
    assert!(matches!(result, Err(GoatHerdError::Timeout)));
}

#[tokio::test]
async fn test_cancel_all_fails_outstanding_queries() {
    let (server_addr, _server) = silent_server().await;

    let client = DnsClient::connect(server_addr)
        .await
        .expect("client should connect");

    let first = client
        .send_query(
            Message::query(name("one.example.goat"), RecordType::A),
            crate::client::single_shot(),
            Duration::from_secs(30),
        )
        .await
        .expect("send should succeed");
    let second = client
        .send_query(
            Message::query(name("two.example.goat"), RecordType::A),
            crate::client::single_shot(),
            Duration::from_secs(30),
        )
        .await
        .expect("send should succeed");

    client.cancel_all().await.expect("cancel should succeed");

    assert!(matches!(first.reply().await, Err(GoatHerdError::Cancelled)));
    assert!(matches!(second.reply().await, Err(GoatHerdError::Cancelled)));
}

#[tokio::test]
async fn test_streaming_callback_gets_every_response() {
    // mDNS-style: several answers come back for one query ID
    let socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("test server should bind");
    let server_addr = socket.local_addr().expect("server should have an address");
    let server = tokio::spawn(async move {
        let mut buf = [0u8; 512];
        let (len, from) = socket
            .recv_from(&mut buf)
            .await
            .expect("server should receive");
        let query = Message::from_bytes(&buf[0..len]).expect("server should decode query");
        for instance in ["one._goat._tcp.local", "two._goat._tcp.local"] {
            let mut response = Message::response_to(&query);
            response.answers.push(ResourceRecord::new(
                query.questions[0].qname.clone(),
                RecordType::PTR,
                RecordClass::Internet,
                10,
                RecordData::PTR {
                    ptrdname: DnsName::try_from(instance).expect("name should parse"),
                },
            ));
            let bytes = response.as_bytes(true).expect("server should encode");
            socket
                .send_to(&bytes, from)
                .await
                .expect("server should send");
        }
    });

    let client = DnsClient::connect(server_addr)
        .await
        .expect("client should connect");

    let deliveries = Arc::new(AtomicUsize::new(0));
    let (notify_tx, mut notify_rx) = tokio::sync::mpsc::unbounded_channel();
    let cb_deliveries = deliveries.clone();
    let callback: QueryCallback = Box::new(move |message: &Message| {
        let count = cb_deliveries.fetch_add(1, Ordering::SeqCst) + 1;
        let answers = message.answers.len();
        let notify_tx = notify_tx.clone();
        async move {
            let _ = notify_tx.send((count, answers));
            CallbackSignal::Continue
        }
        .boxed()
    });

    let handle = client
        .send_query(
            Message::query(name("_goat._tcp.local"), RecordType::PTR),
            callback,
            Duration::from_secs(5),
        )
        .await
        .expect("send should succeed");

    // the handle resolves with the first response only
    let first = handle.reply().await.expect("first response should arrive");
    assert_eq!(first.answers.len(), 1);

    // and the callback sees both
    for _ in 0..2 {
        let (_, answers) = tokio::time::timeout(Duration::from_secs(5), notify_rx.recv())
            .await
            .expect("callback should fire before the deadline")
            .expect("notify channel should stay open");
        assert_eq!(answers, 1);
    }
    assert_eq!(deliveries.load(Ordering::SeqCst), 2);
    server.abort();
}

#[tokio::test]
async fn test_unmatched_id_is_ignored() {
    // a response with a bogus ID shouldn't resolve or kill anything
    let socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("test server should bind");
    let server_addr = socket.local_addr().expect("server should have an address");
    let server = tokio::spawn(async move {
        let mut buf = [0u8; 512];
        let (len, from) = socket
            .recv_from(&mut buf)
            .await
            .expect("server should receive");
        let query = Message::from_bytes(&buf[0..len]).expect("server should decode query");

        let mut wrong = Message::response_to(&query);
        wrong.header.id = query.header.id.wrapping_add(1);
        socket
            .send_to(&wrong.as_bytes(false).expect("encode"), from)
            .await
            .expect("server should send");

        let mut right = Message::response_to(&query);
        right.answers.push(ResourceRecord::new(
            query.questions[0].qname.clone(),
            RecordType::A,
            RecordClass::Internet,
            60,
            RecordData::A {
                address: "192.0.2.99".parse().expect("address should parse"),
            },
        ));
        socket
            .send_to(&right.as_bytes(false).expect("encode"), from)
            .await
            .expect("server should send");
    });

    let client = DnsClient::connect(server_addr)
        .await
        .expect("client should connect");
    let response = client
        .query(Message::query(name("example.goat"), RecordType::A))
        .await
        .expect("query should resolve off the matching response");
    assert_eq!(response.answers.len(), 1);
    server.abort();
}

#[tokio::test]
async fn test_undecodable_datagram_fails_the_client() {
    let socket = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("test server should bind");
    let server_addr = socket.local_addr().expect("server should have an address");
    let server = tokio::spawn(async move {
        let mut buf = [0u8; 512];
        let (_, from) = socket
            .recv_from(&mut buf)
            .await
            .expect("server should receive");
        // five bytes of garbage, not even a whole header
        socket
            .send_to(&[0xFF, 0x00, 0xFF, 0x00, 0xFF], from)
            .await
            .expect("server should send");
    });

    let client = DnsClient::connect(server_addr)
        .await
        .expect("client should connect");
    let result = client
        .query(Message::query(name("garbage.example.goat"), RecordType::A))
        .await;
    assert!(matches!(result, Err(GoatHerdError::ChannelClosed)));
    server.abort();
}

#[test]
fn test_select_nameserver_prefers_ipv4() {
    let v6: IpAddr = "2001:db8::53".parse().expect("address should parse");
    let v4_first: IpAddr = "192.0.2.53".parse().expect("address should parse");
    let v4_second: IpAddr = "192.0.2.54".parse().expect("address should parse");

    assert_eq!(
        select_nameserver(&[v6, v4_first, v4_second]).expect("selection should work"),
        v4_first
    );
    assert_eq!(
        select_nameserver(&[v6]).expect("selection should work"),
        v6
    );
    assert!(matches!(
        select_nameserver(&[]),
        Err(GoatHerdError::MissingNameservers)
    ));
}
