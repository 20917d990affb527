use std::{net::SocketAddr, num::NonZeroU32, time::Duration};

use futures_util::{SinkExt, StreamExt};
use omnitask::{app, db, AppState, Config};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Server {
    addr: SocketAddr,
    state: AppState,
    _uploads: tempfile::TempDir,
}

async fn serve() -> Server {
    let uploads = tempfile::tempdir().unwrap();
    let config = Config {
        database_url: "sqlite::memory:".to_owned(),
        bind_addr: "127.0.0.1:0".to_owned(),
        jwt_secret: "ws-secret".to_owned(),
        frontend_url: "http://frontend.test".to_owned(),
        upload_dir: uploads.path().to_path_buf(),
        db_max_connections: 1,
        login_attempts_per_minute: NonZeroU32::new(10).unwrap(),
    };
    let state = AppState::new(db::memory_pool().await.unwrap(), config);

    for (id, username) in [("u1", "ada"), ("u2", "bob")] {
        sqlx::query(
            "INSERT INTO users (id,username,firstname,lastname,email,contact,password_hash,is_active,created_at,updated_at) \
             VALUES (?,?,'First','Last',?,'555-0100','x',1,?,?)",
        )
        .bind(id)
        .bind(username)
        .bind(format!("{username}@example.com"))
        .bind(db::now())
        .bind(db::now())
        .execute(&state.db_pool)
        .await
        .unwrap();
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });

    Server {
        addr,
        state,
        _uploads: uploads,
    }
}

impl Server {
    async fn client(&self) -> Client {
        let (client, _) = connect_async(format!("ws://{}/ws", self.addr)).await.unwrap();
        client
    }
}

async fn send(client: &mut Client, frame: Value) {
    client.send(Message::text(frame.to_string())).await.unwrap();
}

async fn next_event(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("no frame within 5s")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// User ids in a presence snapshot frame.
fn online(event: &Value) -> Vec<String> {
    assert_eq!(event["event"], "presence-snapshot", "{event}");
    let mut users: Vec<String> = event["data"].as_object().unwrap().keys().cloned().collect();
    users.sort();
    users
}

#[tokio::test]
async fn relay_and_disconnect_over_websocket() {
    let server = serve().await;

    let mut ada = server.client().await;
    send(&mut ada, json!({"event": "announce-user", "data": {"userId": "u1"}})).await;
    assert_eq!(online(&next_event(&mut ada).await), ["u1"]);

    let mut bob = server.client().await;
    send(&mut bob, json!({"event": "announce-user", "data": {"userId": "u2"}})).await;
    assert_eq!(online(&next_event(&mut ada).await), ["u1", "u2"]);
    assert_eq!(online(&next_event(&mut bob).await), ["u1", "u2"]);

    // junk is dropped without closing the socket or answering
    ada.send(Message::text("not json")).await.unwrap();
    send(&mut ada, json!({"event": "typing", "data": {}})).await;

    send(
        &mut ada,
        json!({"event": "send-message", "data": {"senderId": "u1", "receiverId": "u2", "text": "hi bob"}}),
    )
    .await;

    assert_eq!(
        next_event(&mut bob).await,
        json!({"event": "message-delivered", "data": {"senderId": "u1", "text": "hi bob"}})
    );
    assert_eq!(
        next_event(&mut ada).await,
        json!({"event": "message-sent-echo", "data": {"senderId": "u1", "receiverId": "u2", "text": "hi bob"}})
    );

    bob.close(None).await.unwrap();
    assert_eq!(online(&next_event(&mut ada).await), ["u1"]);
    assert_eq!(server.state.hub.lookup("u2").await, None);

    send(&mut ada, json!({"event": "active-users-query", "data": {}})).await;
    assert_eq!(
        next_event(&mut ada).await,
        json!({"event": "active-users-result", "data": {"u1": "ada"}})
    );
}

#[tokio::test]
async fn invalid_send_reports_error_to_sender() {
    let server = serve().await;

    let mut ada = server.client().await;
    send(&mut ada, json!({"event": "announce-user", "data": {"userId": "u1"}})).await;
    next_event(&mut ada).await;

    send(
        &mut ada,
        json!({"event": "send-message", "data": {"senderId": "u1", "receiverId": "u2"}}),
    )
    .await;

    assert_eq!(
        next_event(&mut ada).await,
        json!({"event": "error", "data": {"message": "text is required"}})
    );
}
