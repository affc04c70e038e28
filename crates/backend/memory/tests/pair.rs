//! Integration test for the in-memory transport pair.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use memory::MemoryPair;
use transport::{ClientEvent, DisconnectReason, ServerEvent, Transport};

#[test_log::test]
fn client_and_server_talk_in_the_same_process() {
    let mut pair = MemoryPair::new();

    let client_events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&client_events);
    pair.client
        .on_client_event(Box::new(move |event| sink.lock().unwrap().push(event)));

    let server_events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&server_events);
    pair.server
        .on_server_event(Box::new(move |event| sink.lock().unwrap().push(event)));

    pair.server.server_start().unwrap();
    pair.client.client_connect("mem://session").unwrap();

    let connection = match server_events.lock().unwrap().as_slice() {
        [ServerEvent::Connected { connection }] => *connection,
        other => panic!("expected a connected event, got {other:?}"),
    };

    pair.client
        .client_send(0, Bytes::from_static(b"client hello"))
        .unwrap();
    assert!(matches!(
        server_events.lock().unwrap().as_slice(),
        [_, ServerEvent::Message { connection: got, channel: 0, payload }]
            if *got == connection && payload.as_ref() == b"client hello"
    ));

    pair.server
        .server_send(connection, 0, Bytes::from_static(b"server response"))
        .unwrap();
    assert!(matches!(
        client_events.lock().unwrap().as_slice(),
        [ClientEvent::Connected, ClientEvent::Message { channel: 0, payload }]
            if payload.as_ref() == b"server response"
    ));
}

#[test_log::test]
fn shutdown_notifies_the_peer() {
    let mut pair = MemoryPair::new();

    let client_events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&client_events);
    pair.client
        .on_client_event(Box::new(move |event| sink.lock().unwrap().push(event)));

    pair.server.server_start().unwrap();
    pair.client.client_connect("mem://session").unwrap();

    pair.server.shutdown();
    assert!(matches!(
        client_events.lock().unwrap().as_slice(),
        [
            ClientEvent::Connected,
            ClientEvent::Disconnected {
                reason: DisconnectReason::TransportError
            }
        ]
    ));
    assert!(!pair.client.client_connected());
}
