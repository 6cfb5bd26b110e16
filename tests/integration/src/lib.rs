//! Shared fixtures for the end-to-end tests.
//!
//! A "gateway" here is the real router + registry wired to the in-process
//! bus; clients are simulated by driving frames through `Router::dispatch`
//! and reading pre-framed buffers off the session's outbound queue, exactly
//! what the WebSocket pumps would do.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use chat_bus::{LocalBus, MessageBus};
use chat_core::{
    frame, topics, BusMessage, ChatRequest, Frame, MessageBase, MessageType, Route,
};
use chat_db::{MessageStore, NewMessage, StoreResult};
use chat_gateway::connection::{Session, SessionRegistry, OUTBOUND_QUEUE_CAPACITY};
use chat_gateway::metrics::GatewayMetrics;
use chat_gateway::router::Router;
use chat_service::{spawn_workers, ChatService, PersistQueue};

/// One simulated gateway process.
pub struct TestGateway {
    pub router: Arc<Router>,
    pub registry: Arc<SessionRegistry>,
}

/// Start a gateway on the shared bus, consuming the broadcast topic.
pub async fn start_gateway(bus: &Arc<LocalBus>) -> TestGateway {
    let registry = Arc::new(SessionRegistry::new());
    let metrics = Arc::new(GatewayMetrics::default());
    let router = Arc::new(Router::new(
        registry.clone(),
        bus.clone() as Arc<dyn MessageBus>,
        metrics,
    ));

    let mut broadcasts = bus.subscribe(topics::BROADCAST).await.unwrap();
    let consumer = router.clone();
    tokio::spawn(async move {
        while let Some(delivery) = broadcasts.recv().await {
            consumer.handle_bus_message(&delivery.payload);
        }
    });

    TestGateway { router, registry }
}

/// In-memory message store standing in for PostgreSQL.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<NewMessage>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rows(&self) -> Vec<NewMessage> {
        self.rows.lock().expect("store lock poisoned").clone()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(&self, message: &NewMessage) -> StoreResult<i64> {
        self.rows
            .lock()
            .expect("store lock poisoned")
            .push(message.clone());
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Start a chat service on the shared bus for one game.
pub async fn start_service(
    bus: &Arc<LocalBus>,
    game_id: &str,
    queue_capacity: usize,
    store: Arc<MemoryStore>,
) -> Arc<ChatService> {
    let (persist, persist_rx) = PersistQueue::new(queue_capacity);
    spawn_workers(2, persist_rx, store);

    let service = Arc::new(ChatService::new(bus.clone() as Arc<dyn MessageBus>, persist));

    let mut requests = bus.subscribe(&topics::game_request(game_id)).await.unwrap();
    let consumer = service.clone();
    tokio::spawn(async move {
        while let Some(delivery) = requests.recv().await {
            let Ok(req) = ChatRequest::from_bytes(&delivery.payload) else {
                continue;
            };
            let _ = consumer.handle_request(req).await;
        }
    });

    service
}

/// Open a simulated client connection on a gateway.
pub fn connect(gateway: &TestGateway) -> (Arc<Session>, mpsc::Receiver<Bytes>) {
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    let session = Session::new(tx, None);
    gateway.registry.add(session.clone());
    (session, rx)
}

pub fn chat_request(game_id: &str, user_id: i32, receiver_id: i32, content: &str) -> ChatRequest {
    ChatRequest {
        base: MessageBase {
            game_id: game_id.to_string(),
            user_id,
            timestamp: 1_700_000_000,
            trace_id: String::new(),
            session_id: None,
        },
        receiver_id,
        channel_id: None,
        content: content.to_string(),
        msg_type: MessageType::Text,
    }
}

pub fn chat_frame(req: &ChatRequest) -> Frame {
    Frame::with_sequence(Route::Chat, 1, req.to_bytes().unwrap())
}

/// Pull the next frame off a client's outbound queue and decode the bus
/// message inside it.
pub async fn recv_client_message(rx: &mut mpsc::Receiver<Bytes>) -> BusMessage {
    let framed = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for client delivery")
        .expect("outbound queue closed");

    let decoded = frame::decode(&framed).expect("client received invalid frame");
    assert_eq!(decoded.route, Route::Chat.as_u8());

    BusMessage::decode(&decoded.payload).expect("client received unroutable payload")
}

/// Wait until the store holds `count` rows or the deadline passes.
pub async fn wait_for_rows(store: &MemoryStore, count: usize) -> Vec<NewMessage> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let rows = store.rows();
        if rows.len() >= count {
            return rows;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("expected {count} persisted rows, have {}", rows.len());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
