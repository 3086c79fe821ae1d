//! Shared fixtures for relay integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use port_relay::{Server, StatsRecord};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

/// A loopback port that was free a moment ago
pub fn free_tcp_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

pub fn free_udp_port() -> u16 {
    std::net::UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// TCP server echoing every byte back until the peer closes
pub async fn tcp_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    addr
}

/// UDP server echoing every datagram back to its sender
pub async fn udp_echo_server() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 65_535];
        while let Ok((n, peer)) = socket.recv_from(&mut buf).await {
            let _ = socket.send_to(&buf[..n], peer).await;
        }
    });

    addr
}

/// TCP server that reads `expect` bytes, answers with `reply` bytes, then
/// waits for the client to close
pub async fn tcp_request_reply_server(expect: usize, reply: usize) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = vec![0u8; expect];
                if stream.read_exact(&mut request).await.is_err() {
                    return;
                }
                if stream.write_all(&vec![0xAB; reply]).await.is_err() {
                    return;
                }
                let mut rest = Vec::new();
                let _ = stream.read_to_end(&mut rest).await;
            });
        }
    });

    addr
}

/// Stats for one mapping
pub fn stats_for(server: &Server, from: &str) -> Option<StatsRecord> {
    server.get_stats().into_iter().find(|record| record.from == from)
}

/// Poll the registry until the mapping's counters satisfy `check`
pub async fn wait_for_stats<F>(server: &Server, from: &str, check: F) -> StatsRecord
where
    F: Fn(&StatsRecord) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let record = stats_for(server, from).expect("mapping registered");
        if check(&record) {
            return record;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("stats never settled: {:?}", record);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
