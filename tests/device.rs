use anyhow::{Result, bail};
use badge_reader::{
    device::Device,
    host::{network::HostNetwork, storage::MemoryStorage},
    peripherals::{CardReader, Console},
    services::{
        feedback::{Color, FeedbackSink},
        network::{Connection, NetworkStack, StaticAddressing},
    },
};
use std::{
    collections::VecDeque,
    net::{Ipv4Addr, SocketAddrV4},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpListener,
    sync::oneshot,
};

// Test doubles shared with the test body through Arc handles
#[derive(Clone, Default)]
struct ScriptedReader {
    cards: Arc<Mutex<VecDeque<[u8; 4]>>>,
}

impl ScriptedReader {
    fn present(&self, uid: [u8; 4]) {
        self.cards.lock().unwrap().push_back(uid);
    }
}

impl CardReader for ScriptedReader {
    fn poll_card(&mut self) -> Option<[u8; 4]> {
        self.cards.lock().unwrap().pop_front()
    }
}

#[derive(Clone, Default)]
struct ScriptedConsole {
    input: Arc<Mutex<VecDeque<u8>>>,
    output: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConsole {
    fn type_line(&self, line: &str) {
        self.input.lock().unwrap().extend(line.bytes());
    }

    fn lines(&self) -> Vec<String> {
        self.output.lock().unwrap().clone()
    }
}

impl Console for ScriptedConsole {
    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        let mut input = self.input.lock().unwrap();
        let count = input.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(input.drain(..count)) {
            *slot = byte;
        }
        count
    }

    fn write_line(&mut self, line: &str) {
        self.output.lock().unwrap().push(line.to_string());
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    colors: Arc<Mutex<Vec<Color>>>,
}

impl RecordingSink {
    fn saw(&self, color: Color) -> bool {
        self.colors.lock().unwrap().contains(&color)
    }
}

impl FeedbackSink for RecordingSink {
    fn set_tone(&mut self, _on: bool) {}

    fn set_color(&mut self, color: Color) {
        self.colors.lock().unwrap().push(color);
    }
}

struct NoConnection;

impl Connection for NoConnection {
    async fn write_all(&mut self, _data: &[u8]) -> Result<()> {
        bail!("not connected")
    }

    fn try_read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn close(&mut self) {}
}

#[derive(Clone, Default)]
struct WatchedNetwork {
    begins: Arc<Mutex<usize>>,
}

impl NetworkStack for WatchedNetwork {
    type Connection = NoConnection;

    async fn begin_dhcp(&mut self, _hardware_address: [u8; 6]) -> Result<Ipv4Addr> {
        *self.begins.lock().unwrap() += 1;
        Ok(Ipv4Addr::UNSPECIFIED)
    }

    async fn begin_static(
        &mut self,
        _hardware_address: [u8; 6],
        addressing: &StaticAddressing,
    ) -> Result<Ipv4Addr> {
        *self.begins.lock().unwrap() += 1;
        Ok(addressing.local)
    }

    async fn connect(&mut self, server: SocketAddrV4) -> Result<NoConnection> {
        bail!("no route to {server}")
    }
}

// Accepts one connection, captures the request head and answers with `body`
async fn start_mock_log_server(
    body: &'static str,
) -> (u16, oneshot::Receiver<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind mock server");
    let port = listener.local_addr().unwrap().port();
    let (request_tx, request_rx) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };

        let mut reader = BufReader::new(&mut stream);
        let mut head = Vec::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                break;
            }
            if line.trim().is_empty() {
                break;
            }
            head.push(line.trim_end().to_string());
        }
        let _ = request_tx.send(head);

        // headers and body in separate writes so the body may arrive split
        let _ = stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n")
            .await;
        let (first, second) = body.split_at(body.len() / 2);
        let _ = stream.write_all(first.as_bytes()).await;
        let _ = stream.flush().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _ = stream.write_all(second.as_bytes()).await;
        let _ = stream.shutdown().await;
    });

    (port, request_rx)
}

async fn poll_until<S, N, R, C, F>(
    device: &mut Device<S, N, R, C, F>,
    mut done: impl FnMut(&Device<S, N, R, C, F>) -> bool,
) where
    S: badge_reader::services::config_store::ConfigStorage,
    N: NetworkStack,
    R: CardReader,
    C: Console,
    F: FeedbackSink,
{
    for _ in 0..400 {
        device.poll(Instant::now()).await;
        if done(device) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("device did not reach the expected state");
}

fn configure_command(port: u16) -> String {
    format!(
        r#"{{"action":"configure","state":"CONFIGURED","usedhcp":1,"serverip":"127.0.0.1","serverport":{port},"mac":"AA-BB-CC-DD-EE-FF","request":"/log?rid=%RID%&cid=%CID%"}}"#
    )
}

#[tokio::test]
async fn test_unconfigured_device_never_initializes_networking() {
    let network = WatchedNetwork::default();
    let reader = ScriptedReader::default();
    let sink = RecordingSink::default();
    let mut device = Device::new(
        MemoryStorage::erased(),
        network.clone(),
        reader.clone(),
        ScriptedConsole::default(),
        sink.clone(),
    );

    device.start(Instant::now()).await;
    reader.present([1, 2, 3, 4]);
    device.poll(Instant::now()).await;

    assert!(!device.is_network_ready());
    assert_eq!(*network.begins.lock().unwrap(), 0);
    assert!(sink.saw(Color::Blue));
}

#[tokio::test]
async fn test_readconfig_after_configure_reflects_written_fields() {
    let console = ScriptedConsole::default();
    let mut device = Device::new(
        MemoryStorage::erased(),
        WatchedNetwork::default(),
        ScriptedReader::default(),
        console.clone(),
        RecordingSink::default(),
    );
    device.start(Instant::now()).await;

    console.type_line(r#"{"action":"configure","state":"CONFIGURED","usedhcp":0,"ip":"192.168.1.50","serverip":"192.168.1.10","subnet":"255.255.255.0","gateway":"192.168.1.1","dnsserver":"192.168.1.2","mac":"DE-AD-BE-EF-00-01"}"#);
    console.type_line("\n");
    console.type_line(r#"{"action":"readconfig"}"#);

    poll_until(&mut device, |_| !console.lines().is_empty()).await;

    assert_eq!(
        console.lines(),
        vec![
            r#"{state:"CONFIGURED",usedhcp:0,"ip":"192.168.1.50","serverip":"192.168.1.10","gateway":"192.168.1.1","dnsserver":"192.168.1.2","subnet":"255.255.255.0","mac":"DE-AD-BE-EF-00-01","serverport":8080,"request":"/forras-admin/rest/createNFCLog?readerid=%RID%&rfid=%CID%&type=RF1"}"#
                .to_string()
        ]
    );
    assert!(device.is_network_ready());
}

#[tokio::test]
async fn test_card_scan_is_logged_and_success_is_signalled() {
    let (port, request_rx) = start_mock_log_server(r#"{"RESPONSE":"OK"}"#).await;

    let console = ScriptedConsole::default();
    let reader = ScriptedReader::default();
    let sink = RecordingSink::default();
    let mut device = Device::new(
        MemoryStorage::erased(),
        HostNetwork::new(Duration::from_secs(2)),
        reader.clone(),
        console.clone(),
        sink.clone(),
    );
    device.start(Instant::now()).await;

    console.type_line(&configure_command(port));
    poll_until(&mut device, |d| d.is_network_ready()).await;

    reader.present([0x01, 0x02, 0x03, 0x04]);
    poll_until(&mut device, |d| d.has_pending_request()).await;
    poll_until(&mut device, |d| !d.has_pending_request()).await;

    let head = request_rx.await.expect("server should capture the request");
    assert_eq!(head[0], "GET /log?rid=AA-BB-CC-DD-EE-FF&cid=01020304 HTTP/1.1");
    assert!(head.contains(&"Host: 127.0.0.1".to_string()));
    assert!(head.contains(&"Connection: close".to_string()));

    assert!(sink.saw(Color::Green));
    assert!(!sink.saw(Color::Red));
}

#[tokio::test]
async fn test_rejected_scan_signals_failure() {
    let (port, _request_rx) = start_mock_log_server(r#"{"RESPONSE":"FAIL"}"#).await;

    let console = ScriptedConsole::default();
    let reader = ScriptedReader::default();
    let sink = RecordingSink::default();
    let mut device = Device::new(
        MemoryStorage::erased(),
        HostNetwork::new(Duration::from_secs(2)),
        reader.clone(),
        console.clone(),
        sink.clone(),
    );
    device.start(Instant::now()).await;

    console.type_line(&configure_command(port));
    poll_until(&mut device, |d| d.is_network_ready()).await;

    reader.present([0xDE, 0xAD, 0xBE, 0xEF]);
    poll_until(&mut device, |d| d.has_pending_request()).await;
    poll_until(&mut device, |d| !d.has_pending_request()).await;

    assert!(sink.saw(Color::Red));
    assert!(!sink.saw(Color::Green));
}

#[tokio::test]
async fn test_unreachable_server_signals_connect_failure() {
    // bind then drop to get a port nobody listens on
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let console = ScriptedConsole::default();
    let reader = ScriptedReader::default();
    let sink = RecordingSink::default();
    let mut device = Device::new(
        MemoryStorage::erased(),
        HostNetwork::new(Duration::from_secs(2)),
        reader.clone(),
        console.clone(),
        sink.clone(),
    );
    device.start(Instant::now()).await;

    console.type_line(&configure_command(port));
    poll_until(&mut device, |d| d.is_network_ready()).await;

    reader.present([1, 2, 3, 4]);
    device.poll(Instant::now()).await;

    assert!(!device.has_pending_request());
    assert!(sink.saw(Color::Blue));
}
