use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::{dev::ServerHandle, web, App, HttpServer};
use futures_util::StreamExt;
use live_sync_service::client::{
    ConnectionStatus, LongPollTransport, RealtimeClient, RealtimeClientConfig, SseTransport,
    StreamTransport,
};
use live_sync_service::models::{RealtimeMessage, RefreshPayload};
use live_sync_service::{routes, AppState, Config, EventKey, RefreshCategory};

async fn start_server(config: Config) -> anyhow::Result<(String, ServerHandle, AppState)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    let state = AppState::new(Arc::new(config));
    let app_state = state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .configure(routes::register)
    })
    .workers(1)
    .listen(listener)?
    .run();

    let handle = server.handle();
    actix_rt::spawn(server);
    Ok((format!("http://{}", addr), handle, state))
}

async fn next_message(
    stream: &mut live_sync_service::client::transport::MessageStream,
) -> RealtimeMessage {
    tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("timed out waiting for stream message")
        .expect("stream ended unexpectedly")
        .expect("stream errored")
}

fn refresh(categories: Vec<RefreshCategory>) -> RealtimeMessage {
    RealtimeMessage::Refresh {
        data: RefreshPayload {
            refresh_types: categories,
        },
    }
}

#[actix_rt::test]
async fn stream_serves_connected_then_refresh() -> anyhow::Result<()> {
    let (base_url, handle, state) = start_server(Config::default()).await?;
    let session = state.sessions.create_session("Town Hall").await;

    let transport = SseTransport::new(&base_url);
    let mut stream = transport.open(&session.key).await.expect("open stream");

    assert_eq!(next_message(&mut stream).await, RealtimeMessage::connected());

    state
        .sessions
        .post_question(&session.key, "Why Rust?", None)
        .await?;

    assert_eq!(
        next_message(&mut stream).await,
        refresh(vec![RefreshCategory::Questions])
    );

    drop(stream);
    handle.stop(false).await;
    Ok(())
}

#[actix_rt::test]
async fn client_dispatches_only_subscribed_category() -> anyhow::Result<()> {
    let (base_url, handle, state) = start_server(Config::default()).await?;
    let session = state.sessions.create_session("Workshop").await;

    let client = RealtimeClient::connect(
        session.key.clone(),
        Arc::new(SseTransport::new(&base_url)),
        RealtimeClientConfig::default(),
    );

    let mut status = client.status_watch();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if *status.borrow() == ConnectionStatus::Open {
                break;
            }
            status.changed().await.expect("status channel closed");
        }
    })
    .await
    .expect("client never connected");

    let (activities_tx, mut activities_rx) = tokio::sync::mpsc::unbounded_channel();
    let _activities = client.subscribe(RefreshCategory::Activities, move || {
        let _ = activities_tx.send(());
    });
    let question_hits = Arc::new(AtomicUsize::new(0));
    let q_hits = question_hits.clone();
    let _questions = client.subscribe(RefreshCategory::Questions, move || {
        q_hits.fetch_add(1, Ordering::SeqCst);
    });

    state
        .sessions
        .publish_activity(&session.key, "poll", "Lunch?")
        .await?;

    tokio::time::timeout(Duration::from_secs(5), activities_rx.recv())
        .await
        .expect("activities callback never fired")
        .expect("dispatch channel closed");

    // Fired exactly once, and the questions callback not at all.
    assert!(activities_rx.try_recv().is_err());
    assert_eq!(question_hits.load(Ordering::SeqCst), 0);

    client.close();
    handle.stop(false).await;
    Ok(())
}

#[actix_rt::test]
async fn long_poll_resolves_on_broadcast() -> anyhow::Result<()> {
    let (base_url, handle, state) = start_server(Config::default()).await?;
    let session = state.sessions.create_session("Standup").await;

    let poll_url = format!("{}/events/{}/poll", base_url, session.key);
    let broadcaster = state.broadcaster.clone();
    let key = session.key.clone();

    let (message, _) = tokio::join!(
        async {
            reqwest::get(&poll_url)
                .await
                .expect("poll request failed")
                .json::<RealtimeMessage>()
                .await
                .expect("poll body was not a realtime message")
        },
        async {
            // Broadcast only once the poll request has registered its waiter.
            let registry = broadcaster.registry().clone();
            let deadline = Instant::now() + Duration::from_secs(5);
            while registry.snapshot(&key).await.waiters == 0 {
                assert!(Instant::now() < deadline, "waiter never registered");
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            broadcaster
                .broadcast(&key, &[RefreshCategory::ActivityResponses])
                .await;
        }
    );

    assert_eq!(message, refresh(vec![RefreshCategory::ActivityResponses]));

    // The broadcast drained the waiter; nothing left behind.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.registry.snapshot(&session.key).await.waiters, 0);

    handle.stop(false).await;
    Ok(())
}

#[actix_rt::test]
async fn long_poll_times_out_with_noop() -> anyhow::Result<()> {
    let config = Config {
        poll_hold: Duration::from_secs(1),
        ..Config::default()
    };
    let (base_url, handle, state) = start_server(config).await?;
    let session = state.sessions.create_session("Quiet room").await;

    let started = Instant::now();
    let message = reqwest::get(format!("{}/events/{}/poll", base_url, session.key))
        .await?
        .json::<RealtimeMessage>()
        .await?;

    assert_eq!(message, RealtimeMessage::no_op());
    assert!(started.elapsed() >= Duration::from_secs(1));

    // The guard released the waiter after the timeout.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(state.registry.snapshot(&session.key).await.waiters, 0);

    handle.stop(false).await;
    Ok(())
}

#[actix_rt::test]
async fn unknown_event_key_is_404_everywhere() -> anyhow::Result<()> {
    let (base_url, handle, _state) = start_server(Config::default()).await?;

    for path in ["stream", "poll", "connections"] {
        let response = reqwest::get(format!("{}/events/NOPE42/{}", base_url, path)).await?;
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND, "{path}");
    }

    handle.stop(false).await;
    Ok(())
}

#[actix_rt::test]
async fn connections_endpoint_reports_sink_count() -> anyhow::Result<()> {
    let (base_url, handle, state) = start_server(Config::default()).await?;
    let session = state.sessions.create_session("Keynote").await;

    let transport = SseTransport::new(&base_url);
    let mut stream = transport.open(&session.key).await.expect("open stream");
    assert_eq!(next_message(&mut stream).await, RealtimeMessage::connected());

    let body: serde_json::Value = reqwest::get(format!(
        "{}/events/{}/connections",
        base_url,
        session.key.as_str().to_lowercase()
    ))
    .await?
    .json()
    .await?;

    assert_eq!(body["connectionCount"], 1);
    assert_eq!(body["eventKey"], session.key.as_str());

    drop(stream);
    handle.stop(false).await;
    Ok(())
}

#[actix_rt::test]
async fn mutation_routes_drive_the_full_wire_path() -> anyhow::Result<()> {
    let (base_url, handle, _state) = start_server(Config::default()).await?;
    let http = reqwest::Client::new();

    let created: serde_json::Value = http
        .post(format!("{}/events", base_url))
        .json(&serde_json::json!({"name": "All hands"}))
        .send()
        .await?
        .json()
        .await?;
    let event_key = created["eventKey"].as_str().expect("eventKey in response");

    let transport = SseTransport::new(&base_url);
    let mut stream = transport
        .open(&EventKey::new(event_key))
        .await
        .expect("open stream");
    assert_eq!(next_message(&mut stream).await, RealtimeMessage::connected());

    let response = http
        .put(format!("{}/events/{}/presenter-state", base_url, event_key))
        .json(&serde_json::json!({"slide": 4}))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
    assert_eq!(
        next_message(&mut stream).await,
        refresh(vec![RefreshCategory::PresenterState])
    );

    let response = http
        .post(format!("{}/events/{}/questions", base_url, event_key))
        .json(&serde_json::json!({"body": "When is lunch?"}))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    assert_eq!(
        next_message(&mut stream).await,
        refresh(vec![RefreshCategory::Questions])
    );

    let activity: serde_json::Value = http
        .post(format!("{}/events/{}/activities", base_url, event_key))
        .json(&serde_json::json!({"kind": "poll", "prompt": "Pizza or tacos?"}))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(
        next_message(&mut stream).await,
        refresh(vec![RefreshCategory::Activities])
    );

    let activity_id = activity["id"].as_str().expect("activity id");
    let response = http
        .post(format!(
            "{}/events/{}/activities/{}/responses",
            base_url, event_key, activity_id
        ))
        .json(&serde_json::json!({"value": "tacos"}))
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    assert_eq!(
        next_message(&mut stream).await,
        refresh(vec![RefreshCategory::ActivityResponses])
    );

    drop(stream);
    handle.stop(false).await;
    Ok(())
}

#[actix_rt::test]
async fn stream_emits_heartbeat_comment_frames() -> anyhow::Result<()> {
    let config = Config {
        heartbeat_interval: Duration::from_millis(200),
        ..Config::default()
    };
    let (base_url, handle, state) = start_server(config).await?;
    let session = state.sessions.create_session("Idle room").await;

    let response = reqwest::get(format!("{}/events/{}/stream", base_url, session.key)).await?;
    assert_eq!(
        response.headers()["content-type"].to_str()?,
        "text/event-stream"
    );

    let mut body = response.bytes_stream().boxed();
    let mut collected = String::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    while !collected.contains(": heartbeat\n\n") {
        assert!(Instant::now() < deadline, "no heartbeat within deadline");
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .expect("stream went quiet")
            .expect("stream ended")?;
        collected.push_str(&String::from_utf8_lossy(&chunk));
    }

    // The connected frame arrives ahead of any heartbeat.
    assert!(collected.starts_with("data: {\"type\":\"connected\"}\n\n"));

    drop(body);
    handle.stop(false).await;
    Ok(())
}

#[actix_rt::test]
async fn long_poll_transport_delivers_to_client_callbacks() -> anyhow::Result<()> {
    let (base_url, handle, state) = start_server(Config::default()).await?;
    let session = state.sessions.create_session("Retro").await;

    let client = RealtimeClient::connect(
        session.key.clone(),
        Arc::new(LongPollTransport::new(&base_url)),
        RealtimeClientConfig::default(),
    );

    let (questions_tx, mut questions_rx) = tokio::sync::mpsc::unbounded_channel();
    let _questions = client.subscribe(RefreshCategory::Questions, move || {
        let _ = questions_tx.send(());
    });

    // Mutate only once the first poll request has registered its waiter.
    let deadline = Instant::now() + Duration::from_secs(5);
    while state.registry.snapshot(&session.key).await.waiters == 0 {
        assert!(Instant::now() < deadline, "waiter never registered");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    state
        .sessions
        .post_question(&session.key, "What went well?", None)
        .await?;

    tokio::time::timeout(Duration::from_secs(5), questions_rx.recv())
        .await
        .expect("questions callback never fired")
        .expect("dispatch channel closed");

    client.close();
    handle.stop(false).await;
    Ok(())
}
