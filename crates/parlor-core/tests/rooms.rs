use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;

use parlor_core::coordinator::{AuthContext, Coordinator, DEFAULT_HISTORY_LIMIT};
use parlor_core::dispatcher::{Channel, ConnectionId, Dispatcher};
use parlor_core::error::ChatError;
use parlor_db::Database;
use parlor_db::queries::UserInsert;
use parlor_types::events::GatewayEvent;
use parlor_types::models::MediaKind;

struct Harness {
    coordinator: Arc<Coordinator>,
    dispatcher: Dispatcher,
    db: Arc<Database>,
}

fn harness() -> Harness {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let dispatcher = Dispatcher::new();
    let coordinator = Arc::new(Coordinator::new(db.clone(), dispatcher.clone()));
    Harness {
        coordinator,
        dispatcher,
        db,
    }
}

impl Harness {
    fn signup(&self, name: &str) -> AuthContext {
        let UserInsert::Created(id) = self.db.create_user(name, "hash").unwrap() else {
            panic!("user {name} already exists");
        };
        AuthContext::user(id, name)
    }

    /// Open a simulated gateway connection: register and subscribe the way
    /// the connection handler does at upgrade time.
    async fn connect(
        &self,
        ctx: &AuthContext,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let AuthContext::User { user_id, .. } = ctx else {
            panic!("cannot connect anonymously");
        };
        let rooms = self.coordinator.connect_subscriptions(*user_id).await.unwrap();
        let (conn_id, rx) = self.dispatcher.register(*user_id);
        self.dispatcher.subscribe(conn_id, Channel::User(*user_id));
        for room_id in rooms {
            self.dispatcher.subscribe(conn_id, Channel::Room(room_id));
        }
        (conn_id, rx)
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<GatewayEvent>) -> Vec<GatewayEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn create_room_assigns_distinct_six_digit_codes() {
    let h = harness();
    let alice = h.signup("alice");

    let mut codes = HashSet::new();
    for _ in 0..20 {
        let room = h.coordinator.create_room(&alice, "general").await.unwrap();
        assert_eq!(room.code.len(), 6);
        assert!(room.code.bytes().all(|b| b.is_ascii_digit()));
        assert!(codes.insert(room.code.clone()), "code {} assigned twice", room.code);
    }
}

#[tokio::test]
async fn blank_room_names_fall_back_to_default() {
    let h = harness();
    let alice = h.signup("alice");

    let room = h.coordinator.create_room(&alice, "   ").await.unwrap();
    assert_eq!(room.name, "Untitled room");

    let room = h.coordinator.create_room(&alice, "  lounge ").await.unwrap();
    assert_eq!(room.name, "lounge");
}

#[tokio::test]
async fn join_by_code_adds_membership_and_notices() {
    let h = harness();
    let alice = h.signup("alice");
    let bob = h.signup("bob");

    let room = h.coordinator.create_room(&alice, "general").await.unwrap();

    // surrounding whitespace on the code is tolerated
    let joined = h
        .coordinator
        .join_room(&bob, &format!(" {} ", room.code))
        .await
        .unwrap();
    assert_eq!(joined.id, room.id);

    let history = h
        .coordinator
        .fetch_history(&bob, room.id, DEFAULT_HISTORY_LIMIT)
        .await
        .unwrap();
    let bodies: Vec<&str> = history.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["alice joined the room.", "bob joined the room."]);
    assert!(history.iter().all(|m| m.is_system && m.sender.is_none()));

    // joining twice is rejected and leaves no duplicate membership
    let err = h.coordinator.join_room(&bob, &room.code).await.unwrap_err();
    assert!(matches!(err, ChatError::Conflict(_)));
}

#[tokio::test]
async fn join_rejects_malformed_and_unknown_codes() {
    let h = harness();
    let alice = h.signup("alice");
    let bob = h.signup("bob");
    let room = h.coordinator.create_room(&alice, "general").await.unwrap();

    for bad in ["12345", "1234567", "12a456", ""] {
        let err = h.coordinator.join_room(&bob, bad).await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)), "{bad:?} should fail validation");
    }

    let unknown = if room.code == "000000" { "111111" } else { "000000" };
    let err = h.coordinator.join_room(&bob, unknown).await.unwrap_err();
    assert!(matches!(err, ChatError::NotFound(_)));
}

#[tokio::test]
async fn message_delivery_is_scoped_to_members() {
    let h = harness();
    let alice = h.signup("alice");
    let bob = h.signup("bob");
    let carol = h.signup("carol");

    let room = h.coordinator.create_room(&alice, "general").await.unwrap();
    h.coordinator.join_room(&bob, &room.code).await.unwrap();
    // carol is in her own unrelated room
    h.coordinator.create_room(&carol, "other").await.unwrap();

    let (_, mut bob_rx) = h.connect(&bob).await;
    let (_, mut carol_rx) = h.connect(&carol).await;

    h.coordinator.send_message(&alice, room.id, "hi").await.unwrap();

    let bob_events = drain(&mut bob_rx);
    assert!(bob_events.iter().any(|e| matches!(
        e,
        GatewayEvent::Message { body, sender, .. } if body == "hi" && sender == "alice"
    )));
    assert!(drain(&mut carol_rx).is_empty());
}

#[tokio::test]
async fn non_members_cannot_send_or_fetch() {
    let h = harness();
    let alice = h.signup("alice");
    let carol = h.signup("carol");
    let room = h.coordinator.create_room(&alice, "general").await.unwrap();

    assert!(matches!(
        h.coordinator.send_message(&carol, room.id, "hi").await.unwrap_err(),
        ChatError::Forbidden(_)
    ));
    assert!(matches!(
        h.coordinator.fetch_history(&carol, room.id, 50).await.unwrap_err(),
        ChatError::Forbidden(_)
    ));
    assert!(matches!(
        h.coordinator
            .upload_media(&carol, room.id, "pic.png", vec![1])
            .await
            .unwrap_err(),
        ChatError::Forbidden(_)
    ));
}

#[tokio::test]
async fn blank_messages_are_rejected() {
    let h = harness();
    let alice = h.signup("alice");
    let room = h.coordinator.create_room(&alice, "general").await.unwrap();

    let err = h.coordinator.send_message(&alice, room.id, "   ").await.unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));
}

#[tokio::test]
async fn history_returns_last_fifty_oldest_first() {
    let h = harness();
    let alice = h.signup("alice");
    let room = h.coordinator.create_room(&alice, "general").await.unwrap();

    for i in 1..=60 {
        h.coordinator
            .send_message(&alice, room.id, &format!("msg{i}"))
            .await
            .unwrap();
    }

    let history = h
        .coordinator
        .fetch_history(&alice, room.id, DEFAULT_HISTORY_LIMIT)
        .await
        .unwrap();
    assert_eq!(history.len(), 50);
    // 61 rows exist (creation notice + 60 texts); the window starts at msg11
    assert_eq!(history.first().unwrap().body, "msg11");
    assert_eq!(history.last().unwrap().body, "msg60");
    assert!(history.windows(2).all(|w| w[0].id < w[1].id));
}

#[tokio::test]
async fn history_limit_is_capped() {
    let h = harness();
    let alice = h.signup("alice");
    let room = h.coordinator.create_room(&alice, "general").await.unwrap();

    let AuthContext::User { user_id, .. } = &alice else { unreachable!() };
    for i in 0..250 {
        h.db.insert_text_message(room.id, *user_id, &format!("m{i}"), "2026-01-01T00:00:00+00:00")
            .unwrap();
    }

    let history = h.coordinator.fetch_history(&alice, room.id, 10_000).await.unwrap();
    assert_eq!(history.len(), 200);
}

#[tokio::test]
async fn delete_room_removes_all_traces_and_notifies() {
    let h = harness();
    let alice = h.signup("alice");
    let bob = h.signup("bob");

    let room = h.coordinator.create_room(&alice, "general").await.unwrap();
    h.coordinator.join_room(&bob, &room.code).await.unwrap();
    h.coordinator.send_message(&bob, room.id, "hello").await.unwrap();
    h.coordinator
        .upload_media(&bob, room.id, "pic.png", vec![1, 2, 3])
        .await
        .unwrap();

    let (_, mut bob_rx) = h.connect(&bob).await;

    // only the creator may delete
    assert!(matches!(
        h.coordinator.delete_room(&bob, room.id).await.unwrap_err(),
        ChatError::Forbidden(_)
    ));

    h.coordinator.delete_room(&alice, room.id).await.unwrap();

    let events = drain(&mut bob_rx);
    assert!(events.iter().any(|e| matches!(
        e,
        GatewayEvent::RoomDeleted { room_id } if *room_id == room.id
    )));
    assert_eq!(h.dispatcher.subscriber_count(Channel::Room(room.id)), 0);

    // the room is gone for everyone
    assert!(matches!(
        h.coordinator.fetch_history(&bob, room.id, 50).await.unwrap_err(),
        ChatError::NotFound(_)
    ));
    assert!(matches!(
        h.coordinator.join_room(&bob, &room.code).await.unwrap_err(),
        ChatError::NotFound(_)
    ));

    // storage kept nothing
    let (members, messages, blobs): (i64, i64, i64) = h
        .db
        .with_conn(|conn| {
            let members = conn.query_row(
                "SELECT COUNT(*) FROM memberships WHERE room_id = ?1",
                [room.id],
                |r| r.get(0),
            )?;
            let messages = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE room_id = ?1",
                [room.id],
                |r| r.get(0),
            )?;
            let blobs = conn.query_row("SELECT COUNT(*) FROM media_blobs", [], |r| r.get(0))?;
            Ok((members, messages, blobs))
        })
        .unwrap();
    assert_eq!((members, messages, blobs), (0, 0, 0));
}

#[tokio::test]
async fn upload_rejects_bad_extension_and_oversize() {
    let h = harness();
    let alice = h.signup("alice");
    let room = h.coordinator.create_room(&alice, "general").await.unwrap();

    let err = h
        .coordinator
        .upload_media(&alice, room.id, "script.exe", vec![0u8; 16])
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));

    let err = h
        .coordinator
        .upload_media(&alice, room.id, "movie.mp4", vec![0u8; 21 * 1024 * 1024])
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Validation(_)));

    // neither attempt wrote a message
    let history = h.coordinator.fetch_history(&alice, room.id, 50).await.unwrap();
    assert!(history.iter().all(|m| m.is_system));

    let (id, kind) = h
        .coordinator
        .upload_media(&alice, room.id, "song.mp3", vec![1, 2])
        .await
        .unwrap();
    assert_eq!(kind, MediaKind::Audio);

    let media = h.coordinator.fetch_media(&alice, id).await.unwrap();
    assert_eq!(media.content_type, "audio/mpeg");
    assert_eq!(media.filename, "song.mp3");
    assert_eq!(media.data, vec![1, 2]);
}

#[tokio::test]
async fn media_fetch_requires_membership() {
    let h = harness();
    let alice = h.signup("alice");
    let bob = h.signup("bob");
    let carol = h.signup("carol");

    let room = h.coordinator.create_room(&alice, "general").await.unwrap();
    h.coordinator.join_room(&bob, &room.code).await.unwrap();

    let (id, _) = h
        .coordinator
        .upload_media(&alice, room.id, "shot.png", vec![9, 9])
        .await
        .unwrap();

    let media = h.coordinator.fetch_media(&bob, id).await.unwrap();
    assert_eq!(media.content_type, "image/png");

    assert!(matches!(
        h.coordinator.fetch_media(&carol, id).await.unwrap_err(),
        ChatError::Forbidden(_)
    ));
    assert!(matches!(
        h.coordinator.fetch_media(&alice, id + 1000).await.unwrap_err(),
        ChatError::NotFound(_)
    ));
}

#[tokio::test]
async fn leave_unsubscribes_live_connections_and_notifies_rest() {
    let h = harness();
    let alice = h.signup("alice");
    let bob = h.signup("bob");

    let room = h.coordinator.create_room(&alice, "general").await.unwrap();
    h.coordinator.join_room(&bob, &room.code).await.unwrap();

    let (_, mut alice_rx) = h.connect(&alice).await;
    let (_, mut bob_rx) = h.connect(&bob).await;

    h.coordinator.leave_room(&bob, room.id).await.unwrap();

    // bob's live connection no longer receives room traffic
    h.coordinator
        .send_message(&alice, room.id, "anyone there?")
        .await
        .unwrap();
    assert!(drain(&mut bob_rx).is_empty());

    let alice_events = drain(&mut alice_rx);
    assert!(alice_events.iter().any(|e| matches!(
        e,
        GatewayEvent::RoomNotice { body, .. } if body == "bob left the room."
    )));

    // leaving again is rejected
    assert!(matches!(
        h.coordinator.leave_room(&bob, room.id).await.unwrap_err(),
        ChatError::Forbidden(_)
    ));
}

#[tokio::test]
async fn join_pushes_refresh_to_private_channel() {
    let h = harness();
    let alice = h.signup("alice");
    let bob = h.signup("bob");
    let room = h.coordinator.create_room(&alice, "general").await.unwrap();

    let (_, mut bob_rx) = h.connect(&bob).await;
    h.coordinator.join_room(&bob, &room.code).await.unwrap();

    let events = drain(&mut bob_rx);
    assert!(events.iter().any(|e| matches!(
        e,
        GatewayEvent::Refresh { reason } if reason == "joined_room"
    )));
    // once subscribed, the joiner sees the join notice as well
    assert!(events.iter().any(|e| matches!(
        e,
        GatewayEvent::RoomNotice { body, .. } if body == "bob joined the room."
    )));
}

#[tokio::test]
async fn room_list_tracks_memberships() {
    let h = harness();
    let alice = h.signup("alice");
    let bob = h.signup("bob");

    let first = h.coordinator.create_room(&alice, "alpha").await.unwrap();
    h.coordinator.create_room(&alice, "beta").await.unwrap();
    h.coordinator.join_room(&bob, &first.code).await.unwrap();

    assert_eq!(h.coordinator.list_rooms(&alice).await.unwrap().len(), 2);

    let bob_rooms = h.coordinator.list_rooms(&bob).await.unwrap();
    assert_eq!(bob_rooms.len(), 1);
    assert_eq!(bob_rooms[0].id, first.id);

    h.coordinator.leave_room(&bob, first.id).await.unwrap();
    assert!(h.coordinator.list_rooms(&bob).await.unwrap().is_empty());
}

#[tokio::test]
async fn full_room_lifecycle() {
    let h = harness();
    let alice = h.signup("alice");
    let bob = h.signup("bob");

    let room = h.coordinator.create_room(&alice, "Test").await.unwrap();
    assert_eq!(room.name, "Test");

    h.coordinator.join_room(&bob, &room.code).await.unwrap();
    h.coordinator.send_message(&alice, room.id, "hi").await.unwrap();
    h.coordinator.send_message(&bob, room.id, "hello").await.unwrap();

    let history = h.coordinator.fetch_history(&alice, room.id, 50).await.unwrap();
    let bodies: Vec<&str> = history.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(
        bodies,
        vec!["alice joined the room.", "bob joined the room.", "hi", "hello"]
    );
    assert_eq!(history[2].sender.as_deref(), Some("alice"));
    assert_eq!(history[3].sender.as_deref(), Some("bob"));

    h.coordinator.delete_room(&alice, room.id).await.unwrap();
    for ctx in [&alice, &bob] {
        assert!(matches!(
            h.coordinator.fetch_history(ctx, room.id, 50).await.unwrap_err(),
            ChatError::NotFound(_)
        ));
    }
}

#[tokio::test]
async fn anonymous_callers_are_rejected() {
    let h = harness();
    let anon = AuthContext::Anonymous;

    assert!(matches!(
        h.coordinator.create_room(&anon, "x").await.unwrap_err(),
        ChatError::Unauthenticated
    ));
    assert!(matches!(
        h.coordinator.list_rooms(&anon).await.unwrap_err(),
        ChatError::Unauthenticated
    ));
    assert!(matches!(
        h.coordinator.send_message(&anon, 1, "hi").await.unwrap_err(),
        ChatError::Unauthenticated
    ));
}
