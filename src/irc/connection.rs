use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tracing::{debug, info, warn};

use crate::config::nickname::is_anonymous;
use crate::config::ChatConfig;
use crate::error::{Error, Result};
use crate::irc::commands::{self, normalize_channel, Capability};
use crate::irc::reader::LineReader;
use irc::proto::Command;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type WriterSlot = Option<BoxedWriter>;

/// Server lines that mean PASS/NICK was rejected.
const AUTH_FAILURES: [&str; 2] = ["Login authentication failed", "Improperly formatted auth"];

/// Lifecycle of a [`Connection`]. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connecting,
    Authenticating,
    NegotiatingCapabilities,
    Streaming,
    Closed,
}

struct Inner {
    state: State,
    /// Joined channels in join order, stored without `#`.
    channels: Vec<String>,
}

/// One Twitch IRC socket: handshake, outgoing commands, channel
/// membership, and the keep-alive half of the read loop.
///
/// All methods take `&self`; share it behind an `Arc` between the read
/// loop and callers.
pub struct Connection {
    address: String,
    port: u16,
    nickname: String,
    password: Option<String>,
    read_timeout: Option<Duration>,
    inner: Mutex<Inner>,
    /// Held across set changes in join/leave so the wire order matches them.
    writer: AsyncMutex<WriterSlot>,
    shutdown: Notify,
}

impl Connection {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            address: config.address.clone(),
            port: config.port,
            nickname: config.nickname.clone(),
            password: config.password(),
            read_timeout: config.read_timeout(),
            inner: Mutex::new(Inner {
                state: State::Disconnected,
                channels: Vec::new(),
            }),
            writer: AsyncMutex::new(None),
            shutdown: Notify::new(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn state(&self) -> State {
        self.inner.lock().state
    }

    pub fn is_alive(&self) -> bool {
        self.state() != State::Closed
    }

    /// Currently joined channels, without `#`, in join order.
    pub fn channels(&self) -> Vec<String> {
        self.inner.lock().channels.clone()
    }

    fn set_state(&self, state: State) {
        let mut inner = self.inner.lock();
        if inner.state != State::Closed {
            inner.state = state;
        }
    }

    /// Open the TCP stream. Blocks until the handshake completes, fails, or
    /// `timeout` elapses.
    pub async fn connect(&self, timeout: Option<Duration>) -> Result<LineReader<BoxedReader>> {
        self.set_state(State::Connecting);
        let addr = self.address();
        info!("Connecting to {}", addr);

        let connecting = TcpStream::connect((self.address.as_str(), self.port));
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, connecting).await {
                Ok(result) => result,
                Err(_) => {
                    self.close();
                    return Err(Error::ConnectTimeout(addr));
                }
            },
            None => connecting.await,
        };

        let stream = match result {
            Ok(stream) => stream,
            Err(source) => {
                self.close();
                return Err(Error::Connect { addr, source });
            }
        };
        let (read, write) = stream.into_split();
        Ok(self.install(Box::new(read), Box::new(write)).await)
    }

    /// Use an already-established stream instead of dialing out.
    pub async fn attach<S>(&self, stream: S) -> LineReader<BoxedReader>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        self.install(Box::new(read), Box::new(write)).await
    }

    async fn install(&self, read: BoxedReader, write: BoxedWriter) -> LineReader<BoxedReader> {
        *self.writer.lock().await = Some(write);
        self.set_state(State::Authenticating);
        LineReader::new(read)
    }

    /// Send `PASS` (when a credential is configured) and `NICK`.
    pub async fn authenticate(&self) -> Result<()> {
        match &self.password {
            Some(password) => self.send(commands::pass(password)).await?,
            None if !is_anonymous(&self.nickname) => {
                warn!("No credential for {}; only justinfan logins work without one", self.nickname)
            }
            None => {}
        }
        self.send(commands::nick(&self.nickname)).await?;
        self.set_state(State::NegotiatingCapabilities);
        Ok(())
    }

    /// Always requests tags; requests commands only when asked to.
    pub async fn request_capabilities(&self, commands: bool) -> Result<()> {
        self.send(commands::cap_req(Capability::Tags)).await?;
        if commands {
            self.send(commands::cap_req(Capability::Commands)).await?;
        }
        self.set_state(State::Streaming);
        Ok(())
    }

    /// Join `name`. A no-op when already a member.
    pub async fn join_channel(&self, name: &str) -> Result<()> {
        let name = normalize_channel(name);
        if name.is_empty() {
            return Ok(());
        }
        let mut writer = self.writer.lock().await;
        {
            let mut inner = self.inner.lock();
            if inner.state == State::Closed {
                return Err(Error::Closed);
            }
            if inner.channels.iter().any(|c| c == name) {
                debug!("Already joined #{}", name);
                return Ok(());
            }
            inner.channels.push(name.to_string());
        }
        write_line(&mut writer, &commands::to_line(&commands::join(name))).await
    }

    /// Leave `name`. Fails with [`Error::NotJoined`] if it is not a member.
    pub async fn leave_channel(&self, name: &str) -> Result<()> {
        let name = normalize_channel(name);
        let mut writer = self.writer.lock().await;
        {
            let mut inner = self.inner.lock();
            if inner.state == State::Closed {
                return Err(Error::Closed);
            }
            let Some(pos) = inner.channels.iter().position(|c| c == name) else {
                return Err(Error::NotJoined(name.to_string()));
            };
            inner.channels.remove(pos);
        }
        write_line(&mut writer, &commands::to_line(&commands::part(name))).await
    }

    pub async fn leave_channels<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        for name in names {
            self.leave_channel(name.as_ref()).await?;
        }
        Ok(())
    }

    /// Send a chat message. Does not check membership.
    pub async fn send_message(&self, text: &str, channel: &str) -> Result<()> {
        self.send(commands::privmsg(channel, text)).await
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.send_raw(&commands::to_line(&command)).await
    }

    /// Send `line` as-is; the terminator is added.
    pub async fn send_raw(&self, line: &str) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::Closed);
        }
        let mut writer = self.writer.lock().await;
        write_line(&mut writer, line).await
    }

    /// Block until the next line that belongs to the session.
    ///
    /// PINGs are answered here and never returned. An authentication
    /// failure, end of stream, read timeout, I/O error, or [`close`] ends
    /// the stream with an error.
    ///
    /// [`close`]: Connection::close
    pub async fn next_line(&self, reader: &mut LineReader<BoxedReader>) -> Result<String> {
        loop {
            let line = tokio::select! {
                _ = self.shutdown.notified() => return Err(Error::Closed),
                line = read_line(reader, self.read_timeout) => line?,
            };
            let Some(line) = line else {
                return Err(Error::Eof);
            };
            if line.is_empty() {
                continue;
            }
            debug!("< {}", line);

            if let Some(pong) = commands::pong_for(&line) {
                self.send(pong).await?;
                continue;
            }
            if is_auth_failure(&line) {
                return Err(Error::Authentication(line));
            }
            return Ok(line);
        }
    }

    /// Mark the connection closed and wake the read loop. Idempotent.
    pub fn close(&self) {
        let previous = {
            let mut inner = self.inner.lock();
            std::mem::replace(&mut inner.state, State::Closed)
        };
        // Never-connected sessions have nothing to report.
        if !matches!(previous, State::Closed | State::Disconnected) {
            info!("Closing connection to {}", self.address());
        }
        self.shutdown.notify_one();
    }

    /// [`close`](Connection::close), then shut the socket's write side.
    pub async fn shutdown(&self) {
        self.close();
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }
}

async fn read_line(reader: &mut LineReader<BoxedReader>, timeout: Option<Duration>) -> Result<Option<String>> {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, reader.next_line()).await {
            Ok(line) => Ok(line?),
            Err(_) => Err(Error::ReadTimeout(limit)),
        },
        None => Ok(reader.next_line().await?),
    }
}

/// Write one line to the socket, appending CRLF.
async fn write_line(slot: &mut WriterSlot, line: &str) -> Result<()> {
    let line = line.trim_start_matches('\n').trim_end_matches(['\r', '\n']);
    if line.starts_with("PASS ") {
        debug!("> PASS <redacted>");
    } else {
        debug!("> {}", line);
    }
    let writer = slot.as_mut().ok_or(Error::Closed)?;
    writer.write_all(format!("{}\r\n", line).as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

fn is_auth_failure(line: &str) -> bool {
    !line.contains(" PRIVMSG ") && AUTH_FAILURES.iter().any(|marker| line.contains(marker))
}
