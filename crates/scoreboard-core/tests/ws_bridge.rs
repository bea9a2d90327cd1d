// End-to-end tests for the shim WebSocket bridge over a real loopback socket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use scoreboard_core::model::Scoreboard;
use scoreboard_core::protocol::{parse_host_message, BridgeMessage, HostEvent, HostMessage, OutputEvent};
use scoreboard_core::ws_server::{self, WsEvent};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn shim_round_trip_over_loopback() {
    let listener = ws_server::bind(0).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (ws_tx, mut ws_rx) = mpsc::channel(16);
    let (out_tx, out_rx) = mpsc::channel(16);
    let server = tokio::spawn(ws_server::run(listener, ws_tx, out_rx));

    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("client should connect");

    let connected = ws_rx.recv().await.unwrap();
    assert!(matches!(connected, WsEvent::Connected { .. }));

    client
        .send(Message::Text(
            r#"{"type":"game-exit","gameId":5426,"processName":"League of Legends.exe","pid":7}"#
                .into(),
        ))
        .await
        .unwrap();

    let text = match ws_rx.recv().await.unwrap() {
        WsEvent::Message(text) => text,
        other => panic!("expected Message, got {other:?}"),
    };
    assert_eq!(
        parse_host_message(&text).unwrap(),
        HostMessage::Event(HostEvent::GameExit {
            game_id: 5426,
            process_name: "League of Legends.exe".into(),
            pid: Some(7),
        })
    );

    out_tx
        .send(BridgeMessage::Output(OutputEvent::ScoreboardUpdate {
            scoreboard: Scoreboard::default(),
        }))
        .await
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("frame within timeout")
        .expect("stream open")
        .expect("valid frame");
    let json: serde_json::Value = match frame {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    };
    assert_eq!(json["type"], "scoreboard-update");
    assert_eq!(json["scoreboard"]["players"], serde_json::json!([]));

    client.close(None).await.unwrap();
    assert_eq!(ws_rx.recv().await.unwrap(), WsEvent::Disconnected);

    server.abort();
}
