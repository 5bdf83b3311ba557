//! Shared test harness: ephemeral servers, a recording wrapper and
//! client-side helpers that interleave ticking with socket I/O so tests can
//! stay single-threaded.

// Each test binary uses its own subset of the harness.
#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tickloop::{Connection, ConnectionId, Server, ServerSettings, Wrapper, WrapperError};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything a [`RecordingWrapper`] observed, for assertions.
#[derive(Default)]
pub struct WrapperLog {
    pub inits: usize,
    pub connects: Vec<ConnectionId>,
    pub data: Vec<(ConnectionId, Vec<u8>)>,
    pub disconnects: Vec<ConnectionId>,
    pub stops: usize,
}

type Responder = Box<dyn FnMut(&mut Connection, &[u8])>;

/// A wrapper that records every hook invocation and optionally answers
/// incoming data through a responder closure.
pub struct RecordingWrapper {
    log: Arc<Mutex<WrapperLog>>,
    responder: Option<Responder>,
    fail_init: bool,
}

impl RecordingWrapper {
    pub fn new() -> (Self, Arc<Mutex<WrapperLog>>) {
        let log = Arc::new(Mutex::new(WrapperLog::default()));
        (
            Self {
                log: Arc::clone(&log),
                responder: None,
                fail_init: false,
            },
            log,
        )
    }

    pub fn with_responder<F>(responder: F) -> (Self, Arc<Mutex<WrapperLog>>)
    where
        F: FnMut(&mut Connection, &[u8]) + 'static,
    {
        let (mut wrapper, log) = Self::new();
        wrapper.responder = Some(Box::new(responder));
        (wrapper, log)
    }

    pub fn failing_init() -> (Self, Arc<Mutex<WrapperLog>>) {
        let (mut wrapper, log) = Self::new();
        wrapper.fail_init = true;
        (wrapper, log)
    }

    /// Echo responder: answer every payload with itself.
    pub fn echo() -> (Self, Arc<Mutex<WrapperLog>>) {
        Self::with_responder(|conn, data| conn.send(data))
    }
}

impl Wrapper for RecordingWrapper {
    fn init(&mut self) -> Result<(), WrapperError> {
        self.log.lock().unwrap().inits += 1;
        if self.fail_init {
            return Err(WrapperError::Init("intentional test failure".into()));
        }
        Ok(())
    }

    fn on_connect(&mut self, conn: &mut Connection) {
        self.log.lock().unwrap().connects.push(conn.id());
    }

    fn on_data(&mut self, conn: &mut Connection, data: &[u8]) {
        self.log.lock().unwrap().data.push((conn.id(), data.to_vec()));
        if let Some(responder) = self.responder.as_mut() {
            responder(conn, data);
        }
    }

    fn on_disconnect(&mut self, conn: &Connection) {
        self.log.lock().unwrap().disconnects.push(conn.id());
    }

    fn on_stop(&mut self) {
        self.log.lock().unwrap().stops += 1;
    }
}

/// Settings bound to an ephemeral loopback port.
pub fn loopback_settings() -> ServerSettings {
    let mut settings = ServerSettings::default();
    settings.bind_address = "127.0.0.1".into();
    settings.port = 0;
    settings
}

/// Start a server on an ephemeral loopback port.
pub fn start_server(wrapper: Box<dyn Wrapper>) -> (Server, SocketAddr) {
    start_server_with(loopback_settings(), wrapper)
}

pub fn start_server_with(settings: ServerSettings, wrapper: Box<dyn Wrapper>) -> (Server, SocketAddr) {
    let mut server = Server::new(settings, wrapper);
    server.start().expect("server should bind an ephemeral port");
    let addr = server.local_addr().expect("running server has a local address");
    (server, addr)
}

/// Connect a plaintext client to the server under test.
pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).expect("client connect");
    stream
        .set_nonblocking(true)
        .expect("client set_nonblocking");
    stream
}

/// Tick the server until the client has read `expected` bytes or the test
/// times out. Returns whatever was read.
pub fn read_reply(server: &mut Server, client: &mut TcpStream, expected: usize) -> Vec<u8> {
    let deadline = Instant::now() + TEST_TIMEOUT;
    let mut reply = Vec::new();
    let mut chunk = [0u8; 4096];

    while reply.len() < expected && Instant::now() < deadline {
        server.tick();
        match client.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => reply.extend_from_slice(&chunk[..n]),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(2));
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => panic!("client read failed: {err}"),
        }
    }
    reply
}

/// Write from the client and give the kernel a moment to deliver before the
/// next tick services the connection.
pub fn send(client: &mut TcpStream, data: &[u8]) {
    client.write_all(data).expect("client write");
    thread::sleep(Duration::from_millis(10));
}

/// Assert that the client receives nothing further within a short window.
pub fn assert_no_more_data(server: &mut Server, client: &mut TcpStream) {
    let deadline = Instant::now() + Duration::from_millis(100);
    let mut chunk = [0u8; 64];
    while Instant::now() < deadline {
        server.tick();
        match client.read(&mut chunk) {
            Ok(0) => return,
            Ok(n) => panic!("unexpected extra data: {:?}", &chunk[..n]),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(2));
            }
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => panic!("client read failed: {err}"),
        }
    }
}
