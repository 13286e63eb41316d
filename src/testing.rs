//! In-process stand-in for the cloud relay and the stove behind it.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::config::{ClientConfig, TimingConfig};
use crate::frame::{FRAME_LEN, decode_frame};

/// How the fake stove answers one frame.
pub(crate) enum Reply {
    Bytes(Vec<u8>),
    /// Never answer; the client has to time out.
    Silent,
    /// Hang up instead of answering.
    Close,
    /// Answer, then push bytes nobody asked for onto the idle session.
    Unsolicited(Vec<u8>, Vec<u8>),
    /// Answer, then hang up while the session is idle.
    CloseAfter(Vec<u8>),
}

type Responder = Arc<dyn Fn(&str) -> Reply + Send + Sync>;

#[derive(Debug, Default)]
struct RelayLog {
    accepts: usize,
    handshakes: Vec<String>,
    frames: Vec<String>,
    bad_frames: usize,
    /// Frames that arrived while a previous one was still unanswered.
    overlaps: usize,
}

pub(crate) struct MockRelay {
    addr: SocketAddr,
    log: Arc<Mutex<RelayLog>>,
    accept: JoinHandle<()>,
}

impl MockRelay {
    pub const DEVICE: &'static str = "K4L0R-TEST";

    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        Self::spawn(Arc::new(responder), false).await
    }

    /// Relay that accepts every connection and drops it at once.
    pub async fn hanging_up() -> Self {
        Self::spawn(Arc::new(|_: &str| Reply::Close), true).await
    }

    async fn spawn(responder: Responder, hang_up: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let log = Arc::new(Mutex::new(RelayLog::default()));

        let accept_log = log.clone();
        let accept = tokio::spawn(async move {
            while let Ok((sock, _)) = listener.accept().await {
                accept_log.lock().unwrap().accepts += 1;
                if hang_up {
                    drop(sock);
                    continue;
                }
                tokio::spawn(serve(sock, responder.clone(), accept_log.clone()));
            }
        });
        Self { addr, log, accept }
    }

    /// Client config pointing at this relay, with timings shrunk for tests.
    pub fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(self.addr.ip().to_string(), self.addr.port(), Self::DEVICE);
        config.timing = TimingConfig {
            connect_timeout_ms: 1000,
            command_timeout_ms: 300,
            handshake_settle_ms: 5,
            command_delay_ms: 5,
            queue_depth: 32,
        };
        config
    }

    pub async fn shutdown(self) {
        self.accept.abort();
        let _ = self.accept.await;
    }

    pub fn accepts(&self) -> usize {
        self.log.lock().unwrap().accepts
    }

    pub fn handshakes(&self) -> Vec<String> {
        self.log.lock().unwrap().handshakes.clone()
    }

    pub fn frames(&self) -> Vec<String> {
        self.log.lock().unwrap().frames.clone()
    }

    pub fn overlaps(&self) -> usize {
        self.log.lock().unwrap().overlaps
    }

    pub fn bad_frames(&self) -> usize {
        self.log.lock().unwrap().bad_frames
    }
}

async fn serve(mut sock: TcpStream, responder: Responder, log: Arc<Mutex<RelayLog>>) {
    let mut handshake = Vec::new();
    loop {
        match sock.read_u8().await {
            Ok(b) => {
                handshake.push(b);
                if b == b'#' {
                    break;
                }
            }
            Err(_) => return,
        }
    }
    log.lock()
        .unwrap()
        .handshakes
        .push(String::from_utf8_lossy(&handshake).into_owned());

    let mut frame = [0u8; FRAME_LEN];
    loop {
        if sock.read_exact(&mut frame).await.is_err() {
            return;
        }
        let code = match decode_frame(&frame) {
            Ok(code) => code.to_string(),
            Err(_) => {
                log.lock().unwrap().bad_frames += 1;
                continue;
            }
        };
        log.lock().unwrap().frames.push(code.clone());

        // Nothing else may arrive until this frame has been answered.
        let mut probe = [0u8; 1];
        if let Ok(Ok(n)) = tokio::time::timeout(Duration::from_millis(20), sock.peek(&mut probe)).await
            && n > 0
        {
            log.lock().unwrap().overlaps += 1;
        }

        match responder(&code) {
            Reply::Bytes(bytes) => {
                if sock.write_all(&bytes).await.is_err() {
                    return;
                }
            }
            Reply::Silent => {}
            Reply::Close => return,
            Reply::Unsolicited(bytes, extra) => {
                if sock.write_all(&bytes).await.is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(30)).await;
                if sock.write_all(&extra).await.is_err() {
                    return;
                }
            }
            Reply::CloseAfter(bytes) => {
                let _ = sock.write_all(&bytes).await;
                return;
            }
        }
    }
}

/// Ten-byte reply carrying a 16-bit register value at offset 1.
pub(crate) fn register_reply(value: u16) -> Vec<u8> {
    format!("D{value:04X}0000&").into_bytes()
}

/// Ten-byte reply carrying a 32-bit status word at offset 1.
pub(crate) fn status_reply(word: u32) -> Vec<u8> {
    format!("D{word:08X}&").into_bytes()
}
