//! Drives a real client against a local TCP listener playing the server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

use slimlink_core::control::ControlResult;
use slimlink_core::protocol::strm::start_command;
use slimlink_core::protocol::{encode_frame, StatusCode, StatusReply};
use slimlink_core::protocol_constants::TAG_STRM;
use slimlink_core::{
    start_client, AudioEngine, ClientConfig, Codec, ConnectionState, HostCollaborators,
    RemoteCommand, ResumePreference, ServerControl, SlimClient, TrackInfo,
};

const WAIT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct TestEngine {
    started: Mutex<Vec<(String, Codec, f64)>>,
    position: Mutex<f64>,
    active: Mutex<bool>,
}

impl AudioEngine for TestEngine {
    fn start_stream(&self, url: &str, codec: Codec, offset: f64) {
        self.started.lock().push((url.to_string(), codec, offset));
        *self.active.lock() = true;
    }
    fn pause(&self) {}
    fn resume(&self) {}
    fn stop(&self) {
        *self.active.lock() = false;
    }
    fn current_time(&self) -> f64 {
        *self.position.lock()
    }
    fn has_active_stream(&self) -> bool {
        *self.active.lock()
    }
    fn set_volume(&self, _volume: f32) {}
    fn set_replay_gain(&self, _gain: f32) {}
}

#[derive(Default)]
struct TestControl {
    calls: Mutex<Vec<String>>,
    server_time: Mutex<f64>,
}

#[async_trait]
impl ServerControl for TestControl {
    async fn play(&self) -> ControlResult<()> {
        self.calls.lock().push("play".into());
        Ok(())
    }
    async fn pause(&self) -> ControlResult<()> {
        self.calls.lock().push("pause".into());
        Ok(())
    }
    async fn stop(&self) -> ControlResult<()> {
        self.calls.lock().push("stop".into());
        Ok(())
    }
    async fn seek(&self, seconds: f64) -> ControlResult<()> {
        self.calls.lock().push(format!("seek {}", seconds));
        Ok(())
    }
    async fn playlist_jump(&self, delta: i32) -> ControlResult<()> {
        self.calls.lock().push(format!("jump {:+}", delta));
        Ok(())
    }
    async fn playlist_jump_to_current(&self, offset: f64) -> ControlResult<()> {
        self.calls.lock().push(format!("jump_current {}", offset));
        Ok(())
    }
    async fn current_time(&self) -> ControlResult<f64> {
        Ok(*self.server_time.lock())
    }
    async fn resume_preference(&self) -> ControlResult<ResumePreference> {
        Ok(ResumePreference::NoResume)
    }
    async fn now_playing(&self) -> ControlResult<Option<TrackInfo>> {
        Ok(None)
    }
}

struct Setup {
    client: SlimClient,
    listener: TcpListener,
    engine: Arc<TestEngine>,
    control: Arc<TestControl>,
}

async fn setup() -> Setup {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = ClientConfig {
        slimproto_port: listener.local_addr().unwrap().port(),
        ..Default::default()
    };
    let engine = Arc::new(TestEngine::default());
    let control = Arc::new(TestControl::default());
    let mut host = HostCollaborators::new(engine.clone());
    host.control = Some(control.clone() as Arc<dyn ServerControl>);

    let client = start_client(config, host).unwrap();
    Setup {
        client,
        listener,
        engine,
        control,
    }
}

async fn read_frame(socket: &mut TcpStream) -> ([u8; 4], Vec<u8>) {
    let mut header = [0u8; 8];
    socket.read_exact(&mut header).await.unwrap();
    let tag = [header[0], header[1], header[2], header[3]];
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let mut payload = vec![0u8; len];
    socket.read_exact(&mut payload).await.unwrap();
    (tag, payload)
}

async fn accept_with_helo(listener: &TcpListener) -> TcpStream {
    let (mut socket, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .unwrap()
        .unwrap();
    let (tag, payload) = read_frame(&mut socket).await;
    assert_eq!(&tag, b"HELO");
    assert!(String::from_utf8_lossy(&payload).contains("Model=slimlink"));
    socket
}

async fn send_start(socket: &mut TcpStream, path: &str) {
    let payload = start_command(Codec::Flac, 1.0, path).encode();
    socket
        .write_all(&encode_frame(TAG_STRM, &payload))
        .await
        .unwrap();
}

async fn expect_status(socket: &mut TcpStream, code: StatusCode) {
    let (tag, payload) = read_frame(socket).await;
    assert_eq!(&tag, b"STAT");
    assert_eq!(StatusReply::decode(&payload).unwrap().code, code);
}

#[tokio::test]
async fn handshake_start_and_clean_shutdown() {
    let s = setup().await;
    s.client.handle().connect().await.unwrap();

    let mut socket = accept_with_helo(&s.listener).await;
    assert!(
        s.client
            .handle()
            .wait_for_state(ConnectionState::Connected, WAIT)
            .await
    );

    send_start(&mut socket, "/stream.mp3?player=00:04:20:12:34:56&start=42").await;
    expect_status(&mut socket, StatusCode::FlushAck).await;

    let started = s.engine.started.lock().clone();
    assert_eq!(started.len(), 1);
    assert_eq!(
        started[0].0,
        "http://127.0.0.1:9000/stream.mp3?player=00:04:20:12:34:56&start=42"
    );
    assert_eq!(started[0].1, Codec::Flac);
    assert_eq!(started[0].2, 42.0);

    s.client.shutdown().await.unwrap();
    let (tag, payload) = read_frame(&mut socket).await;
    assert_eq!(&tag, b"BYE!");
    assert_eq!(payload, vec![0]);
}

#[tokio::test]
async fn reconnects_after_server_drops_connection() {
    let s = setup().await;
    let handle = s.client.handle().clone();
    handle.connect().await.unwrap();

    let socket = accept_with_helo(&s.listener).await;
    assert!(handle.wait_for_state(ConnectionState::Connected, WAIT).await);
    drop(socket);

    assert!(
        handle
            .wait_for_state(ConnectionState::Reconnecting, WAIT)
            .await
    );
    let _socket = accept_with_helo(&s.listener).await;
    assert!(handle.wait_for_state(ConnectionState::Connected, WAIT).await);

    s.client.shutdown().await.unwrap();
}

#[tokio::test]
async fn remote_play_while_disconnected_recovers_position() {
    let s = setup().await;
    let handle = s.client.handle().clone();
    handle.connect().await.unwrap();

    let mut socket = accept_with_helo(&s.listener).await;
    send_start(&mut socket, "/stream.mp3?player=x&start=100").await;
    expect_status(&mut socket, StatusCode::FlushAck).await;

    *s.engine.position.lock() = 120.0;
    *s.control.server_time.lock() = 121.0;
    drop(socket);

    assert!(
        handle
            .wait_for_state(ConnectionState::Reconnecting, WAIT)
            .await
    );
    handle.disconnect().await.unwrap();
    assert!(
        handle
            .wait_for_state(ConnectionState::Disconnected, WAIT)
            .await
    );
    assert_eq!(
        s.client.recovery().saved_position().map(|p| p.seconds),
        Some(120.0)
    );

    handle.remote_command(RemoteCommand::Play).await.unwrap();
    let _socket = accept_with_helo(&s.listener).await;

    tokio::time::timeout(WAIT, async {
        while s.control.calls.lock().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(*s.control.calls.lock(), vec!["play", "seek 120"]);

    s.client.shutdown().await.unwrap();
}
