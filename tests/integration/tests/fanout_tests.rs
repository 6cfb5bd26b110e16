//! End-to-end fan-out scenarios across two gateways and one chat service
//! sharing a bus.

use std::sync::Arc;

use chat_bus::{LocalBus, MessageBus};
use chat_core::{topics, BusMessage, MessageBroadcast, MessageType};
use chat_integration::{
    chat_frame, chat_request, connect, recv_client_message, start_gateway, start_service,
    wait_for_rows, MemoryStore,
};
use chat_service::ServiceError;

#[tokio::test]
async fn private_chat_across_two_gateways() {
    let bus = Arc::new(LocalBus::new());
    let store = MemoryStore::new();

    let g1 = start_gateway(&bus).await;
    let g2 = start_gateway(&bus).await;
    start_service(&bus, "mmo", 1024, store.clone()).await;

    // B identifies itself on G2 first so the broadcast can find it.
    let (session_b, mut rx_b) = connect(&g2);
    g2.router
        .dispatch(&session_b, &chat_frame(&chat_request("mmo", 1002, 0, "here")))
        .await
        .unwrap();

    // B's own ACK arrives on G2 (and only there).
    match recv_client_message(&mut rx_b).await {
        BusMessage::Response(ack) => assert_eq!(ack.target_user_id, 1002),
        other => panic!("expected B's ACK, got {other:?}"),
    }

    // A sends B a private message from G1.
    let (session_a, mut rx_a) = connect(&g1);
    g1.router
        .dispatch(&session_a, &chat_frame(&chat_request("mmo", 1001, 1002, "hi")))
        .await
        .unwrap();

    // A gets exactly one ACK, targeted at A.
    match recv_client_message(&mut rx_a).await {
        BusMessage::Response(ack) => {
            assert!(ack.success);
            assert_eq!(ack.target_user_id, 1001);
            assert!(ack.message_id > 0);
        }
        other => panic!("expected A's ACK, got {other:?}"),
    }

    // B gets exactly one broadcast with A's content.
    match recv_client_message(&mut rx_b).await {
        BusMessage::Broadcast(b) => {
            assert_eq!(b.sender_id, 1001);
            assert_eq!(b.target_user_id, 1002);
            assert_eq!(b.content, "hi");
        }
        other => panic!("expected B's broadcast, got {other:?}"),
    }

    // The message reaches the store.
    let rows = wait_for_rows(&store, 2).await;
    let row = rows
        .iter()
        .find(|r| r.sender_id == 1001)
        .expect("A's message persisted");
    assert_eq!(row.game_id, "mmo");
    assert_eq!(row.receiver_id, 1002);
    assert_eq!(row.content, "hi");
}

#[tokio::test]
async fn reconnect_rebinds_to_the_new_session() {
    let bus = Arc::new(LocalBus::new());
    let store = MemoryStore::new();

    let gateway = start_gateway(&bus).await;
    start_service(&bus, "mmo", 1024, store).await;

    // First connection binds user 1001 to S1.
    let (s1, mut rx1) = connect(&gateway);
    gateway
        .router
        .dispatch(&s1, &chat_frame(&chat_request("mmo", 1001, 0, "first")))
        .await
        .unwrap();
    let _ = recv_client_message(&mut rx1).await; // S1's ACK

    // Reconnect: a new session sends as the same user.
    let (s2, mut rx2) = connect(&gateway);
    gateway
        .router
        .dispatch(&s2, &chat_frame(&chat_request("mmo", 1001, 0, "second")))
        .await
        .unwrap();
    let _ = recv_client_message(&mut rx2).await; // S2's ACK

    // A broadcast addressed to 1001 goes to S2 now.
    let delivery = BusMessage::Broadcast(MessageBroadcast {
        message_id: 99,
        sender_id: 2000,
        sender_name: None,
        content: "wb".to_string(),
        msg_type: MessageType::Text,
        timestamp: 0,
        target_user_id: 1001,
    });
    bus.publish(topics::BROADCAST, &delivery.encode().unwrap())
        .await
        .unwrap();

    match recv_client_message(&mut rx2).await {
        BusMessage::Broadcast(b) => assert_eq!(b.message_id, 99),
        other => panic!("expected the broadcast on S2, got {other:?}"),
    }

    // S1's queue sees nothing for 1001 anymore.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(rx1.try_recv().is_err());
}

#[tokio::test]
async fn unknown_recipient_is_dropped_silently() {
    let bus = Arc::new(LocalBus::new());
    let gateway = start_gateway(&bus).await;

    let delivery = BusMessage::Broadcast(MessageBroadcast {
        message_id: 1,
        sender_id: 1,
        sender_name: None,
        content: "void".to_string(),
        msg_type: MessageType::Text,
        timestamp: 0,
        target_user_id: 9999,
    });
    bus.publish(topics::BROADCAST, &delivery.encode().unwrap())
        .await
        .unwrap();

    // Give the consumer a beat; no session exists, nothing must blow up.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(gateway.registry.session_count(), 0);
}

#[tokio::test]
async fn overloaded_service_denies_the_ack() {
    let bus = Arc::new(LocalBus::new());

    // Capacity 1 and no workers draining: the second request must be
    // refused before anything is published.
    let (persist, persist_rx) = chat_service::PersistQueue::new(1);
    std::mem::forget(persist_rx);
    let service = chat_service::ChatService::new(bus.clone() as Arc<dyn MessageBus>, persist);

    let mut broadcasts = bus.subscribe(topics::BROADCAST).await.unwrap();

    service
        .handle_request(chat_request("mmo", 1, 2, "fits"))
        .await
        .unwrap();

    let err = service
        .handle_request(chat_request("mmo", 3, 4, "refused"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Overloaded));

    // Only the first request produced bus traffic: one ACK and one
    // broadcast.
    let first = recv_bus(&mut broadcasts).await;
    let second = recv_bus(&mut broadcasts).await;
    assert!(matches!(first, BusMessage::Response(_)));
    assert!(matches!(second, BusMessage::Broadcast(_)));

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(broadcasts.try_recv().is_err());
}

async fn recv_bus(rx: &mut tokio::sync::mpsc::Receiver<chat_bus::Delivery>) -> BusMessage {
    let delivery = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for bus message")
        .expect("bus closed");
    BusMessage::decode(&delivery.payload).unwrap()
}
