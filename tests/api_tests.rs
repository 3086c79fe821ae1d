//! Statistics API integration tests

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use port_relay::metrics::start_api_server;
use port_relay::{Config, Server};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use common::*;

async fn http_get(addr: SocketAddr, path: &str) -> (String, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    let (head, body) = response.split_once("\r\n\r\n").unwrap();
    let status = head.lines().next().unwrap().to_string();
    (status, body.to_string())
}

/// Mappings from a config file show up in `/stats` with live counters
#[tokio::test]
async fn test_stats_endpoint_reports_config_mappings() {
    let echo = tcp_echo_server().await;
    let tcp_from = format!("127.0.0.1:{}", free_tcp_port());
    let udp_from = format!("127.0.0.1:{}", free_udp_port());

    let config = Config::parse(&format!(
        r#"
        [api]
        bind_addr = "127.0.0.1:0"

        [[mappings]]
        from = "{tcp_from}"
        to = "{echo}"

        [[mappings]]
        from = "{udp_from}"
        to = "127.0.0.1:9"
        protocol = "udp"
        "#
    ))
    .unwrap();

    let server = Arc::new(Server::with_relay_config(&config.relay));
    for mapping in &config.mappings {
        server.add_forwarder(mapping.clone()).unwrap();
    }
    let api_addr = start_api_server(config.api.bind_addr, server.clone()).await.unwrap();

    let mut client = TcpStream::connect(&tcp_from).await.unwrap();
    client.write_all(b"hello").await.unwrap();
    let mut echoed = [0u8; 5];
    client.read_exact(&mut echoed).await.unwrap();
    drop(client);
    wait_for_stats(&server, &tcp_from, |r| r.download == 5).await;

    let (status, body) = http_get(api_addr, "/stats").await;
    assert!(status.contains("200"));

    let records: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(records.len(), 2);

    let tcp = records.iter().find(|r| r["from"] == tcp_from.as_str()).unwrap();
    assert_eq!(tcp["to"], echo.to_string());
    assert_eq!(tcp["upload"], 5);
    assert_eq!(tcp["download"], 5);
    assert_eq!(tcp["connections"], 1);

    let udp = records.iter().find(|r| r["from"] == udp_from.as_str()).unwrap();
    assert_eq!(udp["connections"], 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let server = Arc::new(Server::new());
    let api_addr = start_api_server("127.0.0.1:0".parse().unwrap(), server).await.unwrap();

    let (status, body) = http_get(api_addr, "/nope").await;
    assert!(status.contains("404"));
    assert!(body.contains("Not found"));
}
