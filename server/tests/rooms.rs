use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc::{channel, Receiver};

use dubsync_server::connection::{ConnectionCommand, ConnectionEvent};
use dubsync_server::server::Server;
use dubsync_server::store::EpisodeStore;
use system::{
    ClientCommand, ClientSession, ConnectionId, DocumentSnapshot, FailureReason, ManualClock,
    RoomId, ServerEvent, VideoState,
};

const CAPTIONS: &str = r#"{
    "characters": [],
    "captions": [
        {"character": "Alice", "start": 0.0, "end": 1.0, "text": "one"},
        {"character": "Bob", "start": 1.0, "end": 2.0, "text": "two"},
        {"character": "Alice", "start": 2.0, "end": 3.0, "text": "three"},
        {"character": "Bob", "start": 3.0, "end": 4.0, "text": "hello"}
    ]
}"#;

struct Client {
    id: ConnectionId,
    rx: Receiver<ConnectionEvent>,
}

impl Client {
    fn events(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(match event {
                ConnectionEvent::Attached { connection_id } => {
                    ServerEvent::Connected { connection_id }
                }
                ConnectionEvent::Event(event) => event,
            });
        }
        events
    }
}

struct Fixture {
    media: TempDir,
    clock: ManualClock,
    server: Server<ManualClock>,
}

impl Fixture {
    fn new() -> Self {
        let media = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(media.path().join("ep1")).expect("mkdir");
        std::fs::write(media.path().join("ep1").join("captions.json"), CAPTIONS).expect("write");
        std::fs::create_dir(media.path().join("ep0")).expect("mkdir");
        let clock = ManualClock::new(1_000_000.0);
        let server = Server::new(
            EpisodeStore::new(media.path()),
            clock.clone(),
            Duration::from_secs(120),
        );
        Self {
            media,
            clock,
            server,
        }
    }

    async fn connect(&mut self) -> Client {
        let (tx, mut rx) = channel(64);
        self.server
            .handle_connection_command(ConnectionCommand::Connect { tx })
            .await;
        let id = match rx.try_recv() {
            Ok(ConnectionEvent::Attached { connection_id }) => connection_id,
            other => panic!("expected attachment, got {:?}", other),
        };
        Client { id, rx }
    }

    async fn send(&mut self, client: &Client, command: ClientCommand) {
        self.server
            .handle_connection_command(ConnectionCommand::Command {
                from: client.id,
                command,
            })
            .await;
    }

    async fn create_room(&mut self, client: &mut Client) -> RoomId {
        self.send(client, ClientCommand::CreateOrJoinRoom { room_id: None })
            .await;
        match client.events().as_slice() {
            [ServerEvent::JoinedRoom { room_id }] => room_id.clone(),
            other => panic!("unexpected {:?}", other),
        }
    }

    async fn join(&mut self, client: &mut Client, room_id: &RoomId) {
        self.send(
            client,
            ClientCommand::JoinRoom {
                room_id: room_id.clone(),
            },
        )
        .await;
        client.events();
    }
}

#[tokio::test]
async fn it_lists_episodes() {
    let mut fixture = Fixture::new();
    let mut a = fixture.connect().await;
    fixture.send(&a, ClientCommand::GetEpisodes).await;
    assert_eq!(
        a.events(),
        vec![ServerEvent::Episodes {
            episodes: vec!["ep0".into(), "ep1".into()]
        }]
    );
}

#[tokio::test]
async fn it_pushes_episode_and_clock_to_other_members() {
    let mut fixture = Fixture::new();
    let mut a = fixture.connect().await;
    let mut b = fixture.connect().await;
    let room_id = fixture.create_room(&mut a).await;
    fixture.join(&mut b, &room_id).await;

    fixture
        .send(
            &a,
            ClientCommand::TogglePause {
                playing: true,
                media_timestamp_ms: 1_000.0,
                vocals_active: false,
            },
        )
        .await;
    b.events();
    fixture.clock.advance(500.0);
    fixture
        .send(
            &a,
            ClientCommand::SetEpisode {
                name: Some("ep1".into()),
            },
        )
        .await;

    assert_eq!(
        a.events(),
        vec![ServerEvent::SetEpisode {
            name: Some("ep1".into())
        }]
    );
    assert_eq!(
        b.events(),
        vec![
            ServerEvent::SetEpisode {
                name: Some("ep1".into())
            },
            ServerEvent::VideoState(VideoState {
                playing: true,
                media_timestamp_ms: 1_500.0,
                vocals_active: false,
                account_for_latency: true,
            })
        ]
    );

    // a late joiner gets the same picture before the join confirmation
    let mut c = fixture.connect().await;
    fixture.clock.advance(1_000.0);
    fixture
        .send(
            &c,
            ClientCommand::CreateOrJoinRoom {
                room_id: Some(room_id.clone()),
            },
        )
        .await;
    assert_eq!(
        c.events(),
        vec![
            ServerEvent::SetEpisode {
                name: Some("ep1".into())
            },
            ServerEvent::VideoState(VideoState {
                playing: true,
                media_timestamp_ms: 2_500.0,
                vocals_active: false,
                account_for_latency: true,
            }),
            ServerEvent::JoinedRoom { room_id },
        ]
    );
}

#[tokio::test]
async fn it_requests_latency_compensation_only_when_playing() {
    let mut fixture = Fixture::new();
    let mut a = fixture.connect().await;
    let mut b = fixture.connect().await;
    let room_id = fixture.create_room(&mut a).await;
    fixture.join(&mut b, &room_id).await;

    fixture
        .send(
            &a,
            ClientCommand::TogglePause {
                playing: false,
                media_timestamp_ms: 42_000.0,
                vocals_active: true,
            },
        )
        .await;
    assert!(a.events().is_empty());
    assert_eq!(
        b.events(),
        vec![ServerEvent::VideoState(VideoState {
            playing: false,
            media_timestamp_ms: 42_000.0,
            vocals_active: true,
            account_for_latency: false,
        })]
    );

    fixture.clock.advance(60_000.0);
    fixture.send(&b, ClientCommand::FetchVideoState).await;
    assert_eq!(
        b.events(),
        vec![ServerEvent::VideoState(VideoState {
            playing: false,
            media_timestamp_ms: 42_000.0,
            vocals_active: true,
            account_for_latency: true,
        })]
    );
}

#[tokio::test]
async fn it_rewrites_and_rebroadcasts_changed_captions() {
    let mut fixture = Fixture::new();
    let mut a = fixture.connect().await;
    let mut b = fixture.connect().await;
    let room_id = fixture.create_room(&mut a).await;
    fixture.join(&mut b, &room_id).await;
    fixture
        .send(
            &a,
            ClientCommand::SetEpisode {
                name: Some("ep1".into()),
            },
        )
        .await;
    b.events();

    // the editing client runs the real client state machine
    let mut editor = ClientSession::new();
    for event in a.events() {
        editor.handle_event(event, 0.0, 0.0);
    }
    for command in editor.take_commands() {
        fixture.send(&a, command).await;
    }
    for event in a.events() {
        editor.handle_event(event, 0.0, 0.0);
    }
    assert!(editor.toggle_edit_mode());
    editor.select(Some(3));
    assert!(editor.edit_selected_text("hello there".into()));
    editor.toggle_edit_mode();
    let flush = editor.take_commands();
    assert!(matches!(flush.as_slice(), [ClientCommand::NewSubtitles { .. }]));
    for command in flush {
        fixture.send(&a, command).await;
    }

    assert!(a.events().is_empty());
    let pushed = match b.events().as_slice() {
        [ServerEvent::Subtitles {
            document: Some(document),
        }] => document.clone(),
        other => panic!("unexpected {:?}", other),
    };
    assert_eq!(pushed.captions[3].text, "hello there");

    let on_disk = std::fs::read_to_string(fixture.media.path().join("ep1").join("captions.json"))
        .expect("readable");
    let on_disk = DocumentSnapshot::from_json(&on_disk).expect("valid");
    assert_eq!(on_disk, pushed);

    fixture.send(&b, ClientCommand::FetchSubtitles).await;
    match b.events().as_slice() {
        [ServerEvent::Subtitles {
            document: Some(document),
        }] => assert_eq!(document.captions[3].text, "hello there"),
        other => panic!("unexpected {:?}", other),
    }

    // flushing the same document again changes nothing
    fixture
        .send(&a, ClientCommand::NewSubtitles { document: pushed })
        .await;
    assert!(b.events().is_empty());
}

#[tokio::test]
async fn it_ignores_captions_without_episode() {
    let mut fixture = Fixture::new();
    let mut a = fixture.connect().await;
    let mut b = fixture.connect().await;
    let room_id = fixture.create_room(&mut a).await;
    fixture.join(&mut b, &room_id).await;

    let document = DocumentSnapshot::from_json(CAPTIONS).expect("valid");
    fixture
        .send(&a, ClientCommand::NewSubtitles { document })
        .await;
    assert!(a.events().is_empty());
    assert!(b.events().is_empty());
    fixture.send(&b, ClientCommand::FetchSubtitles).await;
    assert_eq!(b.events(), vec![ServerEvent::Subtitles { document: None }]);
}

#[tokio::test]
async fn it_refuses_non_finite_times() {
    let mut fixture = Fixture::new();
    let mut a = fixture.connect().await;
    let mut b = fixture.connect().await;
    let room_id = fixture.create_room(&mut a).await;
    fixture.join(&mut b, &room_id).await;
    fixture
        .send(
            &a,
            ClientCommand::SetEpisode {
                name: Some("ep1".into()),
            },
        )
        .await;
    a.events();
    b.events();

    // bincode frames can carry infinities that JSON cannot
    let mut document = DocumentSnapshot::from_json(CAPTIONS).expect("valid");
    document.captions[3].end = f64::INFINITY;
    fixture
        .send(&a, ClientCommand::NewSubtitles { document })
        .await;
    assert!(matches!(
        a.events().as_slice(),
        [ServerEvent::Failure {
            reason: FailureReason::MalformedMessage(_)
        }]
    ));
    assert!(b.events().is_empty());

    fixture
        .send(
            &a,
            ClientCommand::TogglePause {
                playing: true,
                media_timestamp_ms: f64::NAN,
                vocals_active: false,
            },
        )
        .await;
    assert!(matches!(
        a.events().as_slice(),
        [ServerEvent::Failure {
            reason: FailureReason::MalformedMessage(_)
        }]
    ));
    assert!(b.events().is_empty());

    // the episode still loads from disk
    fixture
        .send(
            &b,
            ClientCommand::SetEpisode {
                name: Some("ep1".into()),
            },
        )
        .await;
    assert_eq!(
        b.events(),
        vec![ServerEvent::SetEpisode {
            name: Some("ep1".into())
        }]
    );
    fixture.send(&b, ClientCommand::FetchVideoState).await;
    match b.events().as_slice() {
        [ServerEvent::VideoState(state)] => {
            assert!(!state.playing);
            assert_eq!(state.media_timestamp_ms, 0.0);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn it_reports_missing_episode_without_touching_room() {
    let mut fixture = Fixture::new();
    let mut a = fixture.connect().await;
    let mut b = fixture.connect().await;
    let room_id = fixture.create_room(&mut a).await;
    fixture.join(&mut b, &room_id).await;

    fixture
        .send(
            &a,
            ClientCommand::SetEpisode {
                name: Some("ep0".into()),
            },
        )
        .await;
    assert!(matches!(
        a.events().as_slice(),
        [ServerEvent::Failure {
            reason: FailureReason::Storage(_)
        }]
    ));
    assert!(b.events().is_empty());
    assert_eq!(
        fixture.server.registry().get(&room_id).and_then(|s| s.episode.clone()),
        None
    );
}

#[tokio::test]
async fn it_deletes_room_after_last_member_leaves() {
    let mut fixture = Fixture::new();
    let mut a = fixture.connect().await;
    let mut b = fixture.connect().await;
    let room_id = fixture.create_room(&mut a).await;
    fixture.join(&mut b, &room_id).await;

    fixture.send(&a, ClientCommand::LeaveRoom).await;
    assert_eq!(a.events(), vec![ServerEvent::LeftRoom]);
    assert!(fixture.server.registry().contains(&room_id));

    fixture.send(&b, ClientCommand::LeaveRoom).await;
    assert_eq!(b.events(), vec![ServerEvent::LeftRoom]);
    assert!(fixture.server.registry().is_empty());

    // leaving again is a no-op
    fixture.send(&b, ClientCommand::LeaveRoom).await;
    assert!(b.events().is_empty());

    fixture
        .send(
            &a,
            ClientCommand::JoinRoom {
                room_id: room_id.clone(),
            },
        )
        .await;
    assert_eq!(a.events(), vec![ServerEvent::UnavailableRoom { room_id }]);

    fixture.send(&a, ClientCommand::FetchVideoState).await;
    assert_eq!(
        a.events(),
        vec![ServerEvent::Failure {
            reason: FailureReason::NotInRoom
        }]
    );
}

#[tokio::test]
async fn it_keeps_one_room_per_connection() {
    let mut fixture = Fixture::new();
    let mut a = fixture.connect().await;
    let first = fixture.create_room(&mut a).await;
    fixture
        .send(&a, ClientCommand::CreateOrJoinRoom { room_id: None })
        .await;
    match a.events().as_slice() {
        [ServerEvent::LeftRoom, ServerEvent::JoinedRoom { room_id }] => {
            assert_ne!(room_id, &first)
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(!fixture.server.registry().contains(&first));
    assert_eq!(fixture.server.registry().len(), 1);
}

#[tokio::test]
async fn it_resumes_dropped_connection_within_grace() {
    let mut fixture = Fixture::new();
    let mut a = fixture.connect().await;
    let mut b = fixture.connect().await;
    let room_id = fixture.create_room(&mut a).await;
    fixture.join(&mut b, &room_id).await;

    fixture
        .server
        .handle_connection_command(ConnectionCommand::Disconnect {
            from: a.id,
            graceful: false,
        })
        .await;
    assert!(fixture.server.is_detached(a.id));
    assert_eq!(fixture.server.registry().members(&room_id), &[a.id, b.id]);

    fixture.clock.advance(60_000.0);
    fixture.server.sweep_detached().await;
    let mut a2 = fixture.connect().await;
    fixture
        .send(&a2, ClientCommand::Resume { connection_id: a.id })
        .await;
    assert_eq!(
        a2.events(),
        vec![ServerEvent::Connected { connection_id: a.id }]
    );
    assert!(!fixture.server.is_detached(a.id));

    a2.id = a.id;
    fixture
        .send(
            &b,
            ClientCommand::TogglePause {
                playing: true,
                media_timestamp_ms: 0.0,
                vocals_active: false,
            },
        )
        .await;
    assert_eq!(a2.events().len(), 1);
    fixture.send(&a2, ClientCommand::FetchVideoState).await;
    assert!(matches!(a2.events().as_slice(), [ServerEvent::VideoState(_)]));
}

#[tokio::test]
async fn it_drops_membership_after_grace() {
    let mut fixture = Fixture::new();
    let mut a = fixture.connect().await;
    let room_id = fixture.create_room(&mut a).await;
    fixture
        .server
        .handle_connection_command(ConnectionCommand::Disconnect {
            from: a.id,
            graceful: false,
        })
        .await;

    fixture.clock.advance(120_001.0);
    fixture.server.sweep_detached().await;
    assert!(!fixture.server.registry().contains(&room_id));

    let mut late = fixture.connect().await;
    fixture
        .send(&late, ClientCommand::Resume { connection_id: a.id })
        .await;
    assert_eq!(
        late.events(),
        vec![ServerEvent::Failure {
            reason: FailureReason::NotInRoom
        }]
    );
}

#[tokio::test]
async fn it_leaves_immediately_on_graceful_close() {
    let mut fixture = Fixture::new();
    let mut a = fixture.connect().await;
    let room_id = fixture.create_room(&mut a).await;
    fixture
        .server
        .handle_connection_command(ConnectionCommand::Disconnect {
            from: a.id,
            graceful: true,
        })
        .await;
    assert!(!fixture.server.is_detached(a.id));
    assert!(!fixture.server.registry().contains(&room_id));
}
