use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::chat::bus::{EventBus, SubscriptionId};
use crate::chat::event::{CloseReason, Event};
use crate::chat::message::{LookupHandle, Message};
use crate::chat::parser;
use crate::config::ChatConfig;
use crate::error::{Error, Result};
use crate::helix::UserLookup;
use crate::irc::connection::{BoxedReader, Connection, State};
use crate::irc::reader::LineReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Connected (or not yet), configured channels not joined.
    Pending,
    Joined,
    Closed,
}

struct Shared {
    connection: Connection,
    bus: Arc<EventBus>,
    /// Configured channels, `#` stripped, in join order.
    channels: Vec<String>,
    capture_commands: bool,
    lookup: Option<LookupHandle>,
    phase: watch::Sender<Phase>,
}

/// A Twitch chat session.
///
/// Subscribe, then [`connect`](Chat::connect). The first line the server
/// sends after the handshake triggers the join of the configured channels;
/// every later line is parsed and published as an [`Event`]. The session
/// ends with exactly one [`Event::Closed`].
///
/// ```no_run
/// # async fn demo() -> twitch_chat::Result<()> {
/// use twitch_chat::{Chat, ChatConfig, Event};
///
/// let mut chat = Chat::new(ChatConfig::new("lirik", "mybot", "oauth:token"));
/// chat.subscribe(|event| {
///     if let Event::Message(msg) = event {
///         println!("{}", msg.raw());
///     }
/// });
/// chat.connect().await?;
/// chat.send("hello chat").await?;
/// # Ok(())
/// # }
/// ```
pub struct Chat {
    shared: Arc<Shared>,
    connect_timeout: Option<Duration>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Chat {
    pub fn new(config: ChatConfig) -> Self {
        Self::build(config, None)
    }

    /// Like [`new`](Chat::new), with a lookup that resolves chat senders to
    /// profiles via [`ChatMessage::user`](crate::ChatMessage::user).
    pub fn with_lookup(config: ChatConfig, lookup: Arc<dyn UserLookup>) -> Self {
        Self::build(config, Some(lookup))
    }

    fn build(config: ChatConfig, lookup: Option<Arc<dyn UserLookup>>) -> Self {
        let (phase, _) = watch::channel(Phase::Pending);
        let shared = Shared {
            connection: Connection::new(&config),
            bus: Arc::new(EventBus::new()),
            channels: config.channels.to_vec(),
            capture_commands: config.capture_commands,
            lookup: lookup.map(LookupHandle),
            phase,
        };
        Self {
            shared: Arc::new(shared),
            connect_timeout: config.connect_timeout(),
            task: Mutex::new(None),
        }
    }

    /// Connect, authenticate, request capabilities, and start the read loop.
    pub async fn connect(&mut self) -> Result<()> {
        match self.shared.connection.state() {
            State::Disconnected => {}
            State::Closed => return Err(Error::Closed),
            state => {
                warn!("connect() called on a session already in state {:?}", state);
                return Ok(());
            }
        }
        match self.shared.connection.connect(self.connect_timeout).await {
            Ok(reader) => self.start(reader).await,
            Err(e) => {
                self.shared.phase.send_replace(Phase::Closed);
                Err(e)
            }
        }
    }

    async fn start(&self, reader: LineReader<BoxedReader>) -> Result<()> {
        let connection = &self.shared.connection;
        let capture_commands = self.shared.capture_commands;
        let handshake = async {
            connection.authenticate().await?;
            connection.request_capabilities(capture_commands).await
        };
        if let Err(e) = handshake.await {
            error!("Handshake with {} failed: {}", connection.address(), e);
            connection.shutdown().await;
            self.shared.phase.send_replace(Phase::Closed);
            return Err(e);
        }

        info!("Connected to {} as {}", connection.address(), connection.nickname());
        *self.task.lock() = Some(tokio::spawn(run(Arc::clone(&self.shared), reader)));
        Ok(())
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.shared.bus.subscribe(callback)
    }

    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<Event>) {
        self.shared.bus.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.bus.unsubscribe(id)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.shared.bus
    }

    /// Send `text` to the first configured channel, waiting for the join.
    pub async fn send(&self, text: &str) -> Result<()> {
        let channel = self.shared.channels.first().ok_or(Error::NoChannel)?;
        self.send_to(channel, text).await
    }

    /// Send `text` to `channel`, waiting for the join of configured channels.
    pub async fn send_to(&self, channel: &str, text: &str) -> Result<()> {
        self.wait_joined().await?;
        self.shared.connection.send_message(text, channel).await
    }

    async fn wait_joined(&self) -> Result<()> {
        let mut rx = self.shared.phase.subscribe();
        let joined = matches!(
            *rx.wait_for(|phase| *phase != Phase::Pending)
                .await
                .map_err(|_| Error::Closed)?,
            Phase::Joined
        );
        if joined {
            Ok(())
        } else {
            Err(Error::Closed)
        }
    }

    pub async fn join_channel(&self, name: &str) -> Result<()> {
        self.shared.connection.join_channel(name).await
    }

    pub async fn leave_channel(&self, name: &str) -> Result<()> {
        self.shared.connection.leave_channel(name).await
    }

    pub async fn leave_channels<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        self.shared.connection.leave_channels(names).await
    }

    /// Channels currently joined.
    pub fn channels(&self) -> Vec<String> {
        self.shared.connection.channels()
    }

    pub fn is_joined(&self) -> bool {
        *self.shared.phase.borrow() == Phase::Joined
    }

    pub fn state(&self) -> State {
        self.shared.connection.state()
    }

    /// Stop the read loop and wait until [`Event::Closed`] was delivered.
    ///
    /// When several callers race, only one of them waits for the loop.
    pub async fn close(&self) {
        self.shared.connection.close();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Read loop panicked: {}", e);
            }
        }
    }
}

impl Drop for Chat {
    fn drop(&mut self) {
        self.shared.connection.close();
    }
}

async fn run(shared: Arc<Shared>, mut reader: LineReader<BoxedReader>) {
    let reason = loop {
        match shared.connection.next_line(&mut reader).await {
            Ok(line) => shared.handle_line(&line).await,
            Err(e) => break CloseReason::from(e),
        }
    };

    match &reason {
        CloseReason::Requested => info!("Chat session closed"),
        CloseReason::AuthenticationFailed(line) => error!("IRC authentication error: {}", line),
        other => error!("Chat connection lost: {:?}", other),
    }

    shared.connection.shutdown().await;
    shared.phase.send_replace(Phase::Closed);
    shared.bus.publish(&Event::Closed(reason));
}

impl Shared {
    async fn handle_line(&self, line: &str) {
        // The server's greeting is our cue to join; it is not parsed.
        let pending = *self.phase.borrow() == Phase::Pending;
        if pending {
            self.join_configured().await;
            return;
        }

        let Some(mut message) = parser::parse(line, self.capture_commands) else {
            debug!("Dropped line: {}", line);
            return;
        };
        if let Message::Chat(chat) = &mut message {
            chat.lookup = self.lookup.clone();
        }
        self.bus.publish(&Event::Message(message));
    }

    async fn join_configured(&self) {
        for channel in &self.channels {
            if let Err(e) = self.connection.join_channel(channel).await {
                warn!("Failed to join #{}: {}", channel, e);
            }
        }
        self.phase.send_if_modified(|phase| {
            if *phase == Phase::Pending {
                *phase = Phase::Joined;
                true
            } else {
                false
            }
        });
        info!("Joined {:?}", self.channels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::CommandKind;
    use crate::irc::commands::tests::unmark_trailing;
    use crate::helix::User;
    use tokio::io::AsyncWriteExt;
    use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
    use tokio::net::TcpListener;

    const SAMPLE: &str = "@badge-info=;badges=broadcaster/1;color=#FF0000;display-name=Ned;id=abc;room-id=123;subscriber=0;turbo=0;user-id=456 :ned!ned@ned.tmi.twitch.tv PRIVMSG #channelname :Hello world";
    const WELCOME: &str = ":tmi.twitch.tv 001 bot :Welcome, GLHF!";
    const WAIT: Duration = Duration::from_secs(2);

    struct FakeServer {
        reader: LineReader<OwnedReadHalf>,
        writer: OwnedWriteHalf,
    }

    impl FakeServer {
        async fn next(&mut self) -> Option<String> {
            tokio::time::timeout(WAIT, self.reader.next_line())
                .await
                .expect("timed out waiting for client line")
                .unwrap()
        }

        /// Compare one client line, ignoring where the trailing `:` went.
        async fn expect(&mut self, line: &str) {
            let got = self.next().await.map(|l| unmark_trailing(&l));
            assert_eq!(got, Some(unmark_trailing(line)));
        }

        async fn send(&mut self, line: &str) {
            self.writer.write_all(format!("{}\r\n", line).as_bytes()).await.unwrap();
        }

        async fn handshake(&mut self, capture_commands: bool) {
            self.expect("PASS oauth:token").await;
            self.expect("NICK bot").await;
            self.expect("CAP REQ :twitch.tv/tags").await;
            if capture_commands {
                self.expect("CAP REQ :twitch.tv/commands").await;
            }
        }
    }

    async fn listen(mut config: ChatConfig) -> (TcpListener, ChatConfig) {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        config.address = "127.0.0.1".into();
        config.port = listener.local_addr().unwrap().port();
        config.connect_timeout_secs = Some(2);
        (listener, config)
    }

    async fn accept(listener: &TcpListener) -> FakeServer {
        let (stream, _) = tokio::time::timeout(WAIT, listener.accept()).await.unwrap().unwrap();
        let (read, write) = stream.into_split();
        FakeServer {
            reader: LineReader::new(read),
            writer: write,
        }
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_joins_on_first_line_and_delivers_chat() {
        let (listener, config) = listen(ChatConfig::new("#channelname", "bot", "token")).await;
        let mut chat = Chat::new(config);
        let (_, mut events) = chat.subscribe_channel();
        chat.connect().await.unwrap();
        let mut server = accept(&listener).await;

        server.handshake(false).await;
        assert!(!chat.is_joined());
        server.send(WELCOME).await;
        server.expect("JOIN #channelname").await;

        server.send(SAMPLE).await;
        let Event::Message(Message::Chat(msg)) = next_event(&mut events).await else {
            panic!("expected chat message");
        };
        assert_eq!(msg.channel, "channelname");
        assert_eq!(msg.sender, "ned");
        assert_eq!(msg.text, "Hello world");
        assert_eq!(msg.tag("display-name"), Some("Ned"));
        assert_eq!(msg.tag("room-id"), Some("123"));
        assert!(chat.is_joined());
        assert_eq!(chat.channels(), vec!["channelname".to_string()]);
        assert_eq!(chat.state(), State::Streaming);
    }

    #[tokio::test]
    async fn test_multiple_channels_joined_in_order() {
        let channels: &[&str] = &["b", "#a", "c"];
        let (listener, config) = listen(ChatConfig::new(channels, "bot", "token")).await;
        let mut chat = Chat::new(config);
        chat.connect().await.unwrap();
        let mut server = accept(&listener).await;

        server.handshake(false).await;
        server.send(WELCOME).await;
        server.send(":tmi.twitch.tv 002 bot :Your host is tmi.twitch.tv").await;
        server.expect("JOIN #b").await;
        server.expect("JOIN #a").await;
        server.expect("JOIN #c").await;

        chat.join_channel("a").await.unwrap();
        chat.leave_channel("c").await.unwrap();
        server.expect("PART #c").await;
        assert_eq!(chat.channels(), vec!["b".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn test_send_waits_for_join() {
        let (listener, config) = listen(ChatConfig::new("channelname", "bot", "token")).await;
        let mut chat = Chat::new(config);
        chat.connect().await.unwrap();
        let mut server = accept(&listener).await;
        server.handshake(false).await;

        let chat = Arc::new(chat);
        let sender = Arc::clone(&chat);
        let pending = tokio::spawn(async move { sender.send("hello").await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!pending.is_finished());

        server.send(WELCOME).await;
        server.expect("JOIN #channelname").await;
        server.expect("PRIVMSG #channelname :hello").await;
        pending.await.unwrap().unwrap();

        chat.send("again").await.unwrap();
        chat.send_to("#other", "elsewhere").await.unwrap();
        server.expect("PRIVMSG #channelname :again").await;
        server.expect("PRIVMSG #other :elsewhere").await;
    }

    #[tokio::test]
    async fn test_ping_is_answered_and_not_published() {
        let (listener, config) = listen(ChatConfig::new("channelname", "bot", "token")).await;
        let mut chat = Chat::new(config);
        let (_, mut events) = chat.subscribe_channel();
        chat.connect().await.unwrap();
        let mut server = accept(&listener).await;
        server.handshake(false).await;

        server.send("PING :tmi.twitch.tv").await;
        server.expect("PONG :tmi.twitch.tv").await;
        assert!(!chat.is_joined());

        server.send(WELCOME).await;
        server.expect("JOIN #channelname").await;
        server.send("PING :tmi.twitch.tv").await;
        server.expect("PONG :tmi.twitch.tv").await;
        server.send(SAMPLE).await;

        let event = next_event(&mut events).await;
        assert_eq!(event_text(&event), Some("Hello world"));
    }

    #[tokio::test]
    async fn test_commands_captured() {
        let config = ChatConfig::new("lirik", "bot", "token").capture_commands(true);
        let (listener, config) = listen(config).await;
        let mut chat = Chat::new(config);
        let (_, mut events) = chat.subscribe_channel();
        chat.connect().await.unwrap();
        let mut server = accept(&listener).await;

        server.handshake(true).await;
        server.send(WELCOME).await;
        server.expect("JOIN #lirik").await;
        server.send(":tmi.twitch.tv CAP * ACK :twitch.tv/commands").await;
        server.send(":tmi.twitch.tv CLEARCHAT #lirik :ned").await;

        let Event::Message(Message::Command(cmd)) = next_event(&mut events).await else {
            panic!("expected command message");
        };
        assert_eq!(cmd.kind, CommandKind::ClearChat);
        assert_eq!(cmd.channel.as_deref(), Some("lirik"));
        assert_eq!(cmd.payload.as_deref(), Some("ned"));
    }

    #[tokio::test]
    async fn test_commands_dropped_without_capture() {
        let (listener, config) = listen(ChatConfig::new("channelname", "bot", "token")).await;
        let mut chat = Chat::new(config);
        let (_, mut events) = chat.subscribe_channel();
        chat.connect().await.unwrap();
        let mut server = accept(&listener).await;

        server.handshake(false).await;
        server.send(WELCOME).await;
        server.expect("JOIN #channelname").await;
        server.send("@emote-only=0 :tmi.twitch.tv ROOMSTATE #channelname").await;
        server.send(SAMPLE).await;

        let event = next_event(&mut events).await;
        assert_eq!(event_text(&event), Some("Hello world"));
    }

    #[tokio::test]
    async fn test_auth_failure_closes_without_messages() {
        let (listener, config) = listen(ChatConfig::new("channelname", "bot", "token")).await;
        let mut chat = Chat::new(config);
        let (_, mut events) = chat.subscribe_channel();
        chat.connect().await.unwrap();
        let mut server = accept(&listener).await;

        server.handshake(false).await;
        server.send(":tmi.twitch.tv NOTICE * :Login authentication failed").await;

        match next_event(&mut events).await {
            Event::Closed(CloseReason::AuthenticationFailed(line)) => {
                assert!(line.contains("Login authentication failed"))
            }
            other => panic!("unexpected event {:?}", other),
        }
        // No JOIN was sent; the client hung up.
        assert_eq!(server.next().await, None);
        assert!(matches!(chat.send("hello").await, Err(Error::Closed)));
        assert_eq!(chat.state(), State::Closed);
    }

    #[tokio::test]
    async fn test_server_hangup_emits_closed() {
        let (listener, config) = listen(ChatConfig::new("channelname", "bot", "token")).await;
        let mut chat = Chat::new(config);
        let (_, mut events) = chat.subscribe_channel();
        chat.connect().await.unwrap();
        let mut server = accept(&listener).await;
        server.handshake(false).await;
        drop(server);

        let event = next_event(&mut events).await;
        assert!(matches!(event, Event::Closed(CloseReason::EndOfStream)));
        assert!(!chat.is_joined());
    }

    #[tokio::test]
    async fn test_close_emits_requested() {
        let (listener, config) = listen(ChatConfig::new("channelname", "bot", "token")).await;
        let mut chat = Chat::new(config);
        let (_, mut events) = chat.subscribe_channel();
        chat.connect().await.unwrap();
        let mut server = accept(&listener).await;
        server.handshake(false).await;

        chat.close().await;
        let event = next_event(&mut events).await;
        assert!(matches!(event, Event::Closed(CloseReason::Requested)));
        assert_eq!(server.next().await, None);
        assert!(matches!(chat.connect().await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_close_shared_session_while_sending() {
        let (listener, config) = listen(ChatConfig::new("channelname", "bot", "token")).await;
        let mut chat = Chat::new(config);
        let (_, mut events) = chat.subscribe_channel();
        chat.connect().await.unwrap();
        let mut server = accept(&listener).await;
        server.handshake(false).await;

        let chat = Arc::new(chat);
        let sender = Arc::clone(&chat);
        let pending = tokio::spawn(async move { sender.send("hello").await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let closer = Arc::clone(&chat);
        tokio::time::timeout(WAIT, async move { tokio::join!(closer.close(), chat.close()) })
            .await
            .expect("close did not finish");

        assert!(matches!(next_event(&mut events).await, Event::Closed(CloseReason::Requested)));
        assert!(matches!(pending.await.unwrap(), Err(Error::Closed)));
        assert_eq!(server.next().await, None);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let (listener, config) = listen(ChatConfig::new("channelname", "bot", "token")).await;
        drop(listener);
        let mut chat = Chat::new(config);

        assert!(matches!(chat.connect().await, Err(Error::Connect { .. })));
        assert!(matches!(chat.send("hello").await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_send_without_channel() {
        let chat = Chat::new(ChatConfig::anonymous(Vec::<String>::new()));
        assert!(matches!(chat.send("hello").await, Err(Error::NoChannel)));
    }

    #[tokio::test]
    async fn test_chat_message_resolves_user() {
        let (listener, config) = listen(ChatConfig::new("channelname", "bot", "token")).await;
        let lookup = |login: &str| -> anyhow::Result<Option<User>> {
            Ok(Some(User {
                login: login.to_string(),
                display_name: "Ned".into(),
                ..User::default()
            }))
        };
        let mut chat = Chat::with_lookup(config, Arc::new(lookup));
        let (_, mut events) = chat.subscribe_channel();
        chat.connect().await.unwrap();
        let mut server = accept(&listener).await;

        server.handshake(false).await;
        server.send(WELCOME).await;
        server.expect("JOIN #channelname").await;
        server.send(SAMPLE).await;

        let Event::Message(Message::Chat(msg)) = next_event(&mut events).await else {
            panic!("expected chat message");
        };
        let user = msg.user().unwrap();
        assert_eq!(user.login, "ned");
        assert_eq!(user.display_name, "Ned");
    }

    fn event_text(event: &Event) -> Option<&str> {
        match event {
            Event::Message(Message::Chat(msg)) => Some(msg.text.as_str()),
            _ => None,
        }
    }
}
