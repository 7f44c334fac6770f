//! Client messaging context.
//!
//! One context instance per signed-in session. It owns at most one socket
//! connection, mirrors the persisted unread set locally, and fans booking
//! notifications out to whichever views subscribe. Everything here degrades
//! quietly: with no socket configured, or after reconnects are exhausted,
//! every realtime action is a silent no-op and the REST surface keeps
//! working.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use shared::config::client::ClientConfig;
use shared::events::{
    AckStatus, ClientEvent, IdentifyRequest, JoinRoomRequest, SendMessageRequest, ServerEvent,
};
use shared::models::{Conversation, Message};
use thiserror::Error;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiError, MarketplaceApi};
use crate::transport::{SocketConnector, SocketSink, SocketStream};

const RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_DELAY: Duration = Duration::from_millis(500);
const SIGNAL_CAPACITY: usize = 16;
const OUTBOUND_CAPACITY: usize = 16;
const SEEN_MESSAGE_CAPACITY: usize = 128;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Transient booking notification, rendered as a toast by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingToast {
    RequestReceived(Value),
    StatusChanged(Value),
    Cleared { pending_id: String },
}

#[derive(Default)]
struct ContextState {
    user_id: Option<String>,
    unread: HashSet<String>,
    active_conversation: Option<String>,
    panel_open: bool,
    connected: bool,
    outbound: Option<mpsc::Sender<ClientEvent>>,
    seen_messages: HashSet<String>,
    seen_order: VecDeque<String>,
}

impl ContextState {
    /// Record a message id, returning whether it is new. The window is
    /// bounded; the server only duplicates within one fan-out, so a small
    /// recency set is enough.
    fn remember_message(&mut self, id: &str) -> bool {
        if !self.seen_messages.insert(id.to_string()) {
            return false;
        }
        self.seen_order.push_back(id.to_string());
        if self.seen_order.len() > SEEN_MESSAGE_CAPACITY {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen_messages.remove(&oldest);
            }
        }
        true
    }
}

struct Inner {
    api: Arc<dyn MarketplaceApi>,
    state: Mutex<ContextState>,
    refresh_tx: broadcast::Sender<()>,
    toast_tx: broadcast::Sender<BookingToast>,
    message_tx: broadcast::Sender<Message>,
}

/// The realtime service object views talk to.
pub struct MessagingContext {
    config: ClientConfig,
    connector: Arc<dyn SocketConnector>,
    inner: Arc<Inner>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl MessagingContext {
    #[must_use]
    pub fn new(
        config: ClientConfig,
        api: Arc<dyn MarketplaceApi>,
        connector: Arc<dyn SocketConnector>,
    ) -> Self {
        let (refresh_tx, _) = broadcast::channel(SIGNAL_CAPACITY);
        let (toast_tx, _) = broadcast::channel(SIGNAL_CAPACITY);
        let (message_tx, _) = broadcast::channel(SIGNAL_CAPACITY);

        Self {
            config,
            connector,
            inner: Arc::new(Inner {
                api,
                state: Mutex::new(ContextState::default()),
                refresh_tx,
                toast_tx,
                message_tx,
            }),
            pump: Mutex::new(None),
        }
    }

    /// Resolve the local identity, seed the unread set, and bring up the
    /// socket. With no socket URL configured this is a no-op and the context
    /// stays in its disabled state.
    ///
    /// # Errors
    /// Returns an error when the identity or conversation fetch fails; the
    /// socket itself reconnects in the background and never fails `connect`.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if !self.config.messaging_enabled() {
            debug!("no socket URL configured; messaging disabled");
            return Ok(());
        }

        let me = self.inner.api.me().await?;
        {
            let mut state = self.inner.state.lock().await;
            state.user_id = Some(me.id.clone());
        }
        self.refresh_unread().await?;

        let mut pump = self.pump.lock().await;
        if pump.is_some() {
            debug!("socket already running");
            return Ok(());
        }
        *pump = Some(tokio::spawn(run_loop(
            Arc::clone(&self.inner),
            Arc::clone(&self.connector),
            me.id,
        )));

        Ok(())
    }

    /// Tear down the socket. The REST surface stays usable.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.pump.lock().await.take() {
            handle.abort();
        }
        let mut state = self.inner.state.lock().await;
        state.connected = false;
        state.outbound = None;
    }

    /// Re-fetch conversations and rebuild the unread set from persisted
    /// state. Local optimistic updates reconverge here.
    ///
    /// # Errors
    /// Returns an error when the conversation fetch fails.
    pub async fn refresh_unread(&self) -> Result<Vec<Conversation>, ClientError> {
        let conversations = self.inner.api.list_conversations().await?;

        let mut state = self.inner.state.lock().await;
        if let Some(user_id) = state.user_id.clone() {
            state.unread = conversations
                .iter()
                .filter(|conversation| conversation.is_unread_for(&user_id))
                .map(|conversation| conversation.id.clone())
                .collect();
        }

        Ok(conversations)
    }

    /// Find or create the conversation with another user.
    ///
    /// # Errors
    /// Returns an error when the REST call fails.
    pub async fn ensure_conversation(&self, participant_id: &str) -> Result<String, ClientError> {
        Ok(self.inner.api.ensure_conversation(participant_id).await?)
    }

    /// The recent message window for one conversation.
    ///
    /// # Errors
    /// Returns an error when the REST call fails.
    pub async fn load_messages(&self, conversation_id: &str) -> Result<Vec<Message>, ClientError> {
        Ok(self.inner.api.list_messages(conversation_id).await?)
    }

    /// Send a chat message. When the transport is down the message is
    /// dropped silently; there is no offline queue.
    pub async fn send_message(&self, conversation_id: &str, content: &str) {
        let (outbound, user_id) = {
            let state = self.inner.state.lock().await;
            (state.outbound.clone(), state.user_id.clone())
        };
        let (Some(outbound), Some(user_id)) = (outbound, user_id) else {
            debug!(conversation_id, "messaging offline; dropping send");
            return;
        };

        let event = ClientEvent::SendMessage(SendMessageRequest {
            conversation_id: Some(conversation_id.to_string()),
            sender_id: Some(user_id),
            content: Some(content.to_string()),
        });
        if outbound.send(event).await.is_err() {
            debug!(conversation_id, "socket went away mid-send");
        }
    }

    /// Subscribe this connection to a conversation room. Silent no-op when
    /// the transport is down.
    pub async fn join_conversation(&self, conversation_id: &str) {
        let outbound = self.inner.state.lock().await.outbound.clone();
        let Some(outbound) = outbound else {
            return;
        };

        let event = ClientEvent::JoinRoom(JoinRoomRequest {
            room_id: conversation_id.to_string(),
        });
        let _ = outbound.send(event).await;
    }

    /// Make a conversation the active one: open the panel, join its room,
    /// optimistically clear the local unread flag, and fire exactly one
    /// idempotent mark-read call. The call's outcome never re-adds the id.
    pub async fn open_conversation(&self, conversation_id: &str) {
        {
            let mut state = self.inner.state.lock().await;
            state.active_conversation = Some(conversation_id.to_string());
            state.panel_open = true;
            state.unread.remove(conversation_id);
        }

        self.join_conversation(conversation_id).await;

        if let Err(error) = self.inner.api.mark_read(conversation_id).await {
            warn!(%error, conversation_id, "mark-read failed; keeping optimistic state");
        }
    }

    pub async fn set_panel_open(&self, open: bool) {
        self.inner.state.lock().await.panel_open = open;
    }

    pub async fn is_panel_open(&self) -> bool {
        self.inner.state.lock().await.panel_open
    }

    pub async fn active_conversation(&self) -> Option<String> {
        self.inner.state.lock().await.active_conversation.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.state.lock().await.connected
    }

    /// Snapshot of conversation ids with unseen activity.
    pub async fn unread_conversations(&self) -> HashSet<String> {
        self.inner.state.lock().await.unread.clone()
    }

    pub async fn has_unread(&self) -> bool {
        !self.inner.state.lock().await.unread.is_empty()
    }

    /// Fires whenever a booking notification suggests re-fetching bookings.
    #[must_use]
    pub fn subscribe_refresh(&self) -> broadcast::Receiver<()> {
        self.inner.refresh_tx.subscribe()
    }

    /// Transient booking toasts.
    #[must_use]
    pub fn subscribe_toasts(&self) -> broadcast::Receiver<BookingToast> {
        self.inner.toast_tx.subscribe()
    }

    /// Every inbound chat message, already deduplicated by message id.
    #[must_use]
    pub fn subscribe_messages(&self) -> broadcast::Receiver<Message> {
        self.inner.message_tx.subscribe()
    }
}

async fn run_loop(inner: Arc<Inner>, connector: Arc<dyn SocketConnector>, user_id: String) {
    let mut failures = 0;
    loop {
        match connector.connect().await {
            Ok((sink, stream)) => {
                if run_session(&inner, &user_id, sink, stream).await {
                    // A session that identified resets the budget; the next
                    // disconnect gets the full allowance again.
                    failures = 0;
                } else {
                    failures += 1;
                }
            }
            Err(error) => {
                warn!(%error, "socket connect failed");
                failures += 1;
            }
        }

        if failures >= RECONNECT_ATTEMPTS {
            warn!("reconnect attempts exhausted; messaging disabled");
            return;
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Drive one socket session to completion. Returns whether identification
/// succeeded, which resets the reconnect budget.
async fn run_session(
    inner: &Arc<Inner>,
    user_id: &str,
    mut sink: Box<dyn SocketSink>,
    mut stream: Box<dyn SocketStream>,
) -> bool {
    // Room membership did not survive the previous disconnect, so identify
    // on every session before anything else.
    let identify = ClientEvent::Identify(IdentifyRequest {
        user_id: user_id.to_string(),
    });
    if let Err(error) = sink.send(&identify).await {
        warn!(%error, "identify failed");
        return false;
    }

    let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
    {
        let mut state = inner.state.lock().await;
        state.connected = true;
        state.outbound = Some(tx);
    }
    info!("socket connected");

    let writer = tokio::spawn(write_pump(sink, rx));
    while let Some(event) = stream.next_event().await {
        handle_server_event(inner, user_id, event).await;
    }
    writer.abort();

    {
        let mut state = inner.state.lock().await;
        state.connected = false;
        state.outbound = None;
    }
    warn!("socket disconnected");
    true
}

async fn write_pump(mut sink: Box<dyn SocketSink>, mut rx: mpsc::Receiver<ClientEvent>) {
    while let Some(event) = rx.recv().await {
        if let Err(error) = sink.send(&event).await {
            warn!(%error, "failed to send event");
            break;
        }
    }
}

async fn handle_server_event(inner: &Arc<Inner>, user_id: &str, event: ServerEvent) {
    match event {
        ServerEvent::Identified(ack) => {
            debug!(user_id = %ack.user_id, "identified");
        }
        ServerEvent::RoomJoined(ack) => {
            debug!(room = %ack.room, "joined room");
        }
        ServerEvent::MessageSent(ack) => {
            if ack.status == AckStatus::Error {
                warn!(error = ack.error.as_deref().unwrap_or("unknown"), "send rejected");
            }
        }
        ServerEvent::ReceiveMessage(message) => {
            // The server fans out to the conversation room and to identity
            // rooms, so the same message can arrive more than once. Merge
            // here by id; views never see the copies.
            {
                let mut state = inner.state.lock().await;
                if !state.remember_message(&message.id) {
                    debug!(message_id = %message.id, "dropping duplicate message");
                    return;
                }
                let viewing = state.panel_open
                    && state.active_conversation.as_deref() == Some(message.conversation_id.as_str());
                if message.sender_id != user_id && !viewing {
                    state.unread.insert(message.conversation_id.clone());
                }
            }
            let _ = inner.message_tx.send(message);
        }
        ServerEvent::ReceiveBookingRequest(pending) => {
            let _ = inner.refresh_tx.send(());
            let _ = inner.toast_tx.send(BookingToast::RequestReceived(pending));
        }
        ServerEvent::ReceiveBookingStatusUpdate(pending) => {
            let _ = inner.refresh_tx.send(());
            let _ = inner.toast_tx.send(BookingToast::StatusChanged(pending));
        }
        ServerEvent::ReceiveBookingCleared(pending_id) => {
            let _ = inner.refresh_tx.send(());
            let _ = inner.toast_tx.send(BookingToast::Cleared { pending_id });
        }
    }
}
