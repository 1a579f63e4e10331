// Integration tests for the optimistic send pipeline: immediate local
// insert, confirmation swap, upload-first ordering, and the non-fatal
// confirmation-failure path.

mod common;

use chucklechain_client::send::MessageDraft;
use chucklechain_client::types::message::TEMP_ID_PREFIX;
use common::*;
use tokio::time::{Duration, timeout};

#[tokio::test]
async fn send_confirms_and_swaps_provisional_id() {
    let http = RecordingHttpClient::new();
    let conversations = vec![
        conversation_fixture("c1", "p1", vec![]),
        conversation_fixture("c2", "p2", vec![]),
    ];
    let (client, _factory) = connected_client(http.clone(), conversations).await;

    let mut confirmed = message_fixture("m9", "me", "hello");
    confirmed.timestamp = chrono::Utc::now();
    http.route("POST", "/c1", 200, serde_json::to_string(&confirmed).unwrap());

    let sent_id = client
        .send_message(
            "c1",
            MessageDraft {
                text: "hello".into(),
                ..Default::default()
            },
        )
        .await
        .expect("send failed");
    assert_eq!(sent_id, "m9");

    // Exactly one entry: the provisional row was replaced, not duplicated.
    let conversation = client.conversation("c1").await.unwrap();
    assert_eq!(conversation.messages.len(), 1);
    assert_eq!(conversation.messages[0].id, "m9");
    assert!(!conversation.messages[0].is_provisional());
    assert_eq!(conversation.last_message.as_ref().unwrap().text, "hello");

    // New activity reorders the conversation to the top.
    let ids: Vec<_> = client
        .conversations()
        .await
        .iter()
        .map(|c| c.id.clone())
        .collect();
    assert_eq!(ids, ["c1", "c2"]);

    // The durable write carried the composed text.
    let posts = http.requests_to("POST", "/c1");
    assert_eq!(posts.len(), 1);
    assert!(posts[0].body.as_ref().unwrap().contains("\"hello\""));
}

#[tokio::test]
async fn optimistic_entry_is_visible_before_confirmation() {
    let http = RecordingHttpClient::new();
    let (client, _factory) =
        connected_client(http.clone(), vec![conversation_fixture("c1", "p1", vec![])]).await;

    let confirmed = message_fixture("m9", "me", "hello");
    let gate = http.route_gated("POST", "/c1", 200, serde_json::to_string(&confirmed).unwrap());

    let send_client = client.clone();
    let send_task = tokio::spawn(async move {
        send_client
            .send_message(
                "c1",
                MessageDraft {
                    text: "hello".into(),
                    ..Default::default()
                },
            )
            .await
    });

    // While the write is in flight, the provisional entry is already the
    // conversation tail.
    let mut upserts = client.event_bus.message_upserted.subscribe();
    let first = timeout(Duration::from_secs(5), upserts.recv())
        .await
        .expect("no optimistic upsert")
        .unwrap();
    assert!(first.message.id.starts_with(TEMP_ID_PREFIX));
    let conversation = client.conversation("c1").await.unwrap();
    assert_eq!(conversation.messages.len(), 1);
    assert_eq!(conversation.last_message.as_ref().unwrap().text, "hello");

    gate.notify_one();
    let sent_id = send_task.await.unwrap().expect("send failed");
    assert_eq!(sent_id, "m9");

    // Length is unchanged by the confirmation swap.
    let conversation = client.conversation("c1").await.unwrap();
    assert_eq!(conversation.messages.len(), 1);
    assert_eq!(conversation.messages[0].id, "m9");
}

#[tokio::test]
async fn upload_failure_aborts_without_optimistic_entry() {
    let http = RecordingHttpClient::new();
    let (client, _factory) =
        connected_client(http.clone(), vec![conversation_fixture("c1", "p1", vec![])]).await;

    http.route("POST", "/upload", 500, "");

    let result = client
        .send_message(
            "c1",
            MessageDraft {
                text: "with image".into(),
                image: Some(vec![1, 2, 3]),
                ..Default::default()
            },
        )
        .await;

    assert!(result.is_err());
    assert!(client.conversation("c1").await.unwrap().messages.is_empty());
    // No durable write was attempted.
    assert!(http.requests_to("POST", "/c1").is_empty());
}

#[tokio::test]
async fn image_is_uploaded_before_the_durable_write() {
    let http = RecordingHttpClient::new();
    let (client, _factory) =
        connected_client(http.clone(), vec![conversation_fixture("c1", "p1", vec![])]).await;

    http.route("POST", "/upload", 200, r#"{"url":"https://cdn.test/meme.png"}"#);
    let mut confirmed = message_fixture("m9", "me", "look");
    confirmed.image = Some("https://cdn.test/meme.png".into());
    http.route("POST", "/c1", 200, serde_json::to_string(&confirmed).unwrap());

    client
        .send_message(
            "c1",
            MessageDraft {
                text: "look".into(),
                image: Some(vec![1, 2, 3]),
                ..Default::default()
            },
        )
        .await
        .expect("send failed");

    let requests = http.requests();
    let upload_pos = requests
        .iter()
        .position(|r| r.path == "/upload")
        .expect("no upload request");
    let post_pos = requests
        .iter()
        .position(|r| r.path == "/c1")
        .expect("no send request");
    assert!(upload_pos < post_pos);
    // The durable write references the hosted URL, not the raw bytes.
    assert!(
        requests[post_pos]
            .body
            .as_ref()
            .unwrap()
            .contains("https://cdn.test/meme.png")
    );
}

#[tokio::test(start_paused = true)]
async fn failed_confirmation_warns_and_schedules_refresh() {
    let http = RecordingHttpClient::new();
    let (client, _factory) =
        connected_client(http.clone(), vec![conversation_fixture("c1", "p1", vec![])]).await;

    http.route("POST", "/c1", 500, "");
    // Server truth for the reconciliation refresh: the write landed even
    // though its confirmation was lost.
    let server_view = vec![conversation_fixture(
        "c1",
        "p1",
        vec![message_fixture("m9", "me", "hello")],
    )];
    http.set_route(
        "GET",
        "/conversations",
        200,
        serde_json::to_string(&server_view).unwrap(),
    );

    let mut warnings = client.event_bus.send_warning.subscribe();
    let mut replaced = client.event_bus.conversations_replaced.subscribe();

    let sent_id = client
        .send_message(
            "c1",
            MessageDraft {
                text: "hello".into(),
                ..Default::default()
            },
        )
        .await
        .expect("confirmation failure must not fail the send");

    // The optimistic entry is retained under its provisional id.
    assert!(sent_id.starts_with(TEMP_ID_PREFIX));
    let warning = timeout(Duration::from_secs(5), warnings.recv())
        .await
        .expect("no send warning")
        .unwrap();
    assert_eq!(warning.temp_id, sent_id);

    // The scheduled reconciliation refresh replaces the store with server
    // truth, which includes the presumed-saved message.
    timeout(Duration::from_secs(60), replaced.recv())
        .await
        .expect("no reconciliation refresh")
        .unwrap();
    let conversation = client.conversation("c1").await.unwrap();
    assert_eq!(conversation.messages.len(), 1);
    assert_eq!(conversation.messages[0].id, "m9");
}

#[tokio::test]
async fn channel_echo_before_confirmation_does_not_duplicate() {
    let http = RecordingHttpClient::new();
    let (client, _factory) =
        connected_client(http.clone(), vec![conversation_fixture("c1", "p1", vec![])]).await;

    let confirmed = message_fixture("m9", "me", "hello");
    let gate = http.route_gated("POST", "/c1", 200, serde_json::to_string(&confirmed).unwrap());

    let send_client = client.clone();
    let send_task = tokio::spawn(async move {
        send_client
            .send_message(
                "c1",
                MessageDraft {
                    text: "hello".into(),
                    ..Default::default()
                },
            )
            .await
    });

    let mut upserts = client.event_bus.message_upserted.subscribe();
    timeout(Duration::from_secs(5), upserts.recv())
        .await
        .expect("no optimistic upsert")
        .unwrap();

    // The channel echo of our own send lands before the HTTP confirmation.
    let frame = serde_json::json!({
        "event": "newMessage",
        "data": { "conversationId": "c1", "message": confirmed }
    });
    client.handle_frame(&frame.to_string()).await;

    gate.notify_one();
    send_task.await.unwrap().expect("send failed");

    let conversation = client.conversation("c1").await.unwrap();
    let ids: Vec<_> = conversation.messages.iter().map(|m| m.id.clone()).collect();
    assert_eq!(ids, ["m9"], "echo plus confirmation must converge to one row");
}
