use std::{
    net::{SocketAddr, TcpListener as StdListener},
    process::Command,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use poolrelay::config::{RelaySettings, TransportKind};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    time::sleep,
};
use tokio_tungstenite::tungstenite::Message;

// -----------------------------------------------------------------------------
// ----- Fake pool -------------------------------------------------------------

/// A loopback pool speaking the line protocol. Every connection gets the
/// version banner; `JOB` lines get a chatter line and then a job; anything
/// else is treated as a submission and judged on its first field.
#[derive(Clone, Debug)]
pub struct FakePool {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl FakePool {
    pub async fn tcp() -> FakePool {
        Self::tcp_with(PoolBehavior::Normal).await
    }

    pub async fn tcp_with(behavior: PoolBehavior) -> FakePool {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake pool");
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_tcp(stream, behavior));
            }
        });

        FakePool { addr, accepted }
    }

    pub async fn websocket() -> FakePool {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake pool");
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_websocket(stream));
            }
        });

        FakePool { addr, accepted }
    }

    pub fn connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Relay settings that skip the HTTP lookup and dial this pool directly.
    pub fn settings(&self, transport: TransportKind) -> RelaySettings {
        let mut settings = RelaySettings::default();
        settings.pool.locator_url = String::new();
        settings.pool.fallback_host = self.addr.ip().to_string();
        settings.pool.fallback_port = self.addr.port();
        settings.pool.transport = transport;
        settings.session.connect_timeout = Duration::from_secs(2);
        settings.session.receive_timeout = Duration::from_millis(500);
        settings.handshake.timeout = Duration::from_millis(500);
        settings
    }

    pub fn config_toml(&self) -> String {
        format!(
            r#"
[pool]
locator_url = ""
fallback_host = "{}"
fallback_port = {}

[session]
receive_timeout = "500ms"
"#,
            self.addr.ip(),
            self.addr.port()
        )
    }
}

#[allow(dead_code)]
#[derive(Clone, Copy, Debug)]
pub enum PoolBehavior {
    Normal,
    /// Hangs up right after the version banner.
    HangUpAfterBanner,
}

fn reply_to(line: &str) -> String {
    if line.starts_with("JOB,") {
        return "Server notice: maintenance at noon\nAbC123,DeF456,50\n".to_string();
    }

    let verdict = match line.split(',').next() {
        Some("bad") => "BAD,Incorrect result",
        Some("block") => "BLOCK",
        _ => "GOOD",
    };
    format!("{verdict}\n")
}

async fn serve_tcp(stream: TcpStream, behavior: PoolBehavior) {
    let (read, mut write) = stream.into_split();
    if write.write_all(b"3.0\n").await.is_err() {
        return;
    }
    if let PoolBehavior::HangUpAfterBanner = behavior {
        return;
    }

    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let reply = reply_to(&line);
        if write.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

async fn serve_websocket(stream: TcpStream) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    if ws.send(Message::text("3.0".to_string())).await.is_err() {
        return;
    }

    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else { continue };
        let reply = reply_to(text.as_str());
        for line in reply.lines() {
            if ws.send(Message::text(line.to_string())).await.is_err() {
                return;
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Binary helpers --------------------------------------------------------

#[allow(dead_code)]
pub fn reserve_port(host: &str) -> u16 {
    let addr = format!("{host}:0");
    let listener = StdListener::bind(&addr).expect("bind ephemeral port");
    listener.local_addr().unwrap().port()
}

#[allow(dead_code)]
pub fn spawn_poolrelay(host: &str, port: u16, config_path: &std::path::Path) -> std::process::Child {
    let exe = env!("CARGO_BIN_EXE_poolrelay");

    Command::new(exe)
        .env("POOLRELAY_HOST", host)
        .env("POOLRELAY_PORT", port.to_string())
        .env("POOLRELAY_CONFIG_FILE", config_path)
        .env("POOLRELAY_LOG", "warn")
        .env_remove("POOLRELAY_TRANSPORT")
        .env_remove("RUST_LOG")
        .spawn()
        .expect("spawn poolrelay")
}

#[allow(dead_code)]
pub async fn wait_for_listen(host: &str, port: u16) {
    let addr = format!("{host}:{port}");
    for _ in 0..100 {
        if std::net::TcpStream::connect(&addr).is_ok() {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("poolrelay did not start listening on {addr}");
}
