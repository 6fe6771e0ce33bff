//! In-memory raw REPL device for driving sessions in tests.

#![allow(dead_code)]

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use mpflash::{Port, Signals, Transport};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};

/// Everything the host did to the device.
#[derive(Debug, Default)]
pub struct Log {
    pub opens: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub signals: Mutex<Vec<Signals>>,
    pub writes: Mutex<Vec<Vec<u8>>>,
    pub commands: Mutex<Vec<String>>,
    pub dirs: Mutex<Vec<String>>,
    pub files: Mutex<Vec<(String, Vec<u8>)>>,
}

impl Log {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.files.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

/// Host end of an in-memory link.
#[derive(Debug)]
pub struct MockPort {
    io: DuplexStream,
    log: Arc<Log>,
}

impl MockPort {
    /// A port plus the raw device end, for tests that script bytes by hand.
    pub fn pair() -> (Self, DuplexStream, Arc<Log>) {
        let (host, device) = tokio::io::duplex(64 * 1024);
        let log = Arc::new(Log::default());
        let port = Self {
            io: host,
            log: log.clone(),
        };
        (port, device, log)
    }
}

impl AsyncRead for MockPort {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for MockPort {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let res = Pin::new(&mut self.io).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &res {
            self.log.writes.lock().unwrap().push(buf[..*n].to_vec());
        }
        res
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let res = Pin::new(&mut self.io).poll_shutdown(cx);
        if res.is_ready() {
            self.log.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
        res
    }
}

impl Port for MockPort {
    fn set_signals(&mut self, signals: Signals) -> io::Result<()> {
        self.log.signals.lock().unwrap().push(signals);
        Ok(())
    }
}

/// How the emulated device misbehaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct Behavior {
    /// Never print `>>> ` after an interrupt.
    pub silent_after_interrupt: bool,
    /// Never answer the n-th executed command (1-based).
    pub stall_on_execute: Option<usize>,
}

/// Opens in-memory ports backed by an emulated device task.
#[derive(Debug, Default)]
pub struct MockTransport {
    pub log: Arc<Log>,
    pub behavior: Behavior,
    pub fail_open: bool,
}

impl MockTransport {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }
}

impl Transport for MockTransport {
    type Port = MockPort;

    fn open(&mut self, _baud_rate: u32) -> io::Result<MockPort> {
        if self.fail_open {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such port"));
        }
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        let (host, device) = tokio::io::duplex(64 * 1024);
        tokio::spawn(run_device(device, self.behavior, self.log.clone()));
        Ok(MockPort {
            io: host,
            log: self.log.clone(),
        })
    }
}

/// Emulates the MicroPython REPL: friendly prompt, raw mode and the
/// `OK <stdout> \x04 <stderr> \x04 >` execution framing.
pub async fn run_device(mut io: DuplexStream, behavior: Behavior, log: Arc<Log>) {
    let mut raw = false;
    let mut cmd = Vec::new();
    let mut executed = 0;
    let mut buf = [0u8; 512];

    loop {
        let n = match io.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        for &b in &buf[..n] {
            let reply: Vec<u8> = match b {
                0x03 if behavior.silent_after_interrupt => Vec::new(),
                0x03 => b"\r\n>>> ".to_vec(),
                0x01 => {
                    raw = true;
                    cmd.clear();
                    b"raw REPL; CTRL-B to exit\r\n>".to_vec()
                }
                0x02 => {
                    raw = false;
                    cmd.clear();
                    b"\r\nMicroPython v1.24.1 on ESP32C3\r\n>>> ".to_vec()
                }
                0x04 if raw => {
                    executed += 1;
                    let text = String::from_utf8_lossy(&cmd).into_owned();
                    cmd.clear();
                    log.commands.lock().unwrap().push(text.clone());
                    if behavior.stall_on_execute == Some(executed) {
                        Vec::new()
                    } else {
                        execute(&text, &log)
                    }
                }
                _ if raw => {
                    cmd.push(b);
                    Vec::new()
                }
                _ => Vec::new(),
            };
            if !reply.is_empty() && io.write_all(&reply).await.is_err() {
                return;
            }
        }
    }
}

const TRACEBACK: &str = "Traceback (most recent call last):\r\n";

/// Interprets the handful of statements the host generates.
///
/// Directories persist in [`Log::dirs`] across sessions, so a second
/// deployment over the same transport sees the first one's directories.
fn execute(text: &str, log: &Log) -> Vec<u8> {
    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut open_path = None;
    let tolerates_eexist = text.contains("if e.errno != 17:");

    for line in text.lines() {
        let trimmed = line.trim_start();
        if line.starts_with("raise") {
            stderr.push_str(TRACEBACK);
            stderr.push_str("ValueError: boom\r\n");
            break;
        } else if let Some(arg) = quoted_arg(line, "print(\"") {
            stdout.push_str(arg);
            stdout.push_str("\r\n");
        } else if let Some(dir) = quoted_arg(trimmed, "os.mkdir(\"") {
            let mut dirs = log.dirs.lock().unwrap();
            let parent = dir.rsplit_once('/').map(|(p, _)| p);
            if dirs.iter().any(|d| d == dir) {
                if !tolerates_eexist {
                    stderr.push_str(TRACEBACK);
                    stderr.push_str("OSError: [Errno 17] EEXIST\r\n");
                    break;
                }
            } else if parent.is_some_and(|p| !dirs.iter().any(|d| d == p)) {
                stderr.push_str(TRACEBACK);
                stderr.push_str("OSError: [Errno 2] ENOENT\r\n");
                break;
            } else {
                dirs.push(dir.to_owned());
            }
        } else if let Some(path) = quoted_arg(line, "f = open(\"") {
            open_path = Some(path.to_owned());
        } else if let Some(body) = line
            .strip_prefix("f.write(b'")
            .and_then(|rest| rest.strip_suffix("')"))
        {
            let content = mpflash_proto::decode_literal(body).unwrap();
            let path = open_path.take().unwrap();
            log.files.lock().unwrap().push((path, content));
        }
    }

    format!("OK{stdout}\x04{stderr}\x04>").into_bytes()
}

fn quoted_arg<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(prefix)?;
    Some(&rest[..rest.find('"')?])
}

/// Reads whatever the host sent so far, waiting for at least `min` bytes.
pub async fn read_at_least(io: &mut DuplexStream, min: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    while out.len() < min {
        let n = io.read(&mut buf).await.unwrap();
        assert!(n > 0, "host closed early");
        out.extend_from_slice(&buf[..n]);
    }
    out
}
