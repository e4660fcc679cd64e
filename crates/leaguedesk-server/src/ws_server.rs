// WebSocket server: one task per connection, one JSON reply per request.

use std::fmt::Display;
use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{info, warn};

use crate::app::App;

/// Bind the server socket on `127.0.0.1:{port}`.
pub async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    Ok(TcpListener::bind(("127.0.0.1", port)).await?)
}

/// Accept connections forever, serving each on its own task.
///
/// A failed handshake only drops that connection. Requests on different
/// connections are handled independently against the shared [`App`].
pub async fn run(listener: TcpListener, app: Arc<App>) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    info!("WebSocket server listening on {local_addr}");

    loop {
        let (stream, addr) = listener.accept().await?;
        let addr_str = addr.to_string();
        info!("Accepted TCP connection from {addr_str}");

        let app = Arc::clone(&app);
        tokio::spawn(async move {
            let ws_stream = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    warn!("WebSocket handshake failed for {addr_str}: {e}");
                    return;
                }
            };

            let (write, read) = ws_stream.split();
            serve_stream(read, write, &app, &addr_str).await;
            info!("Client {addr_str} disconnected");
        });
    }
}

/// Answer every text message from `read` on `write` until the client closes,
/// the stream errors, or a reply cannot be sent.
///
/// Generic over the stream and sink so it can be tested with in-memory
/// message lists instead of sockets.
pub async fn serve_stream<St, Si>(mut read: St, mut write: Si, app: &App, addr: &str)
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    while let Some(msg_result) = read.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let reply = app.handle_text(text.as_str());
                if let Err(e) = write.send(Message::Text(reply.into())).await {
                    warn!("Failed to reply to {addr}: {e}");
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                info!("Client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {
                // Binary and control frames carry no requests.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, LeagueConfig};
    use crate::db::Database;
    use futures_util::stream;
    use leaguedesk_core::fantasy::default_definitions;
    use leaguedesk_core::{MatchCriteria, PlayerRecord, Roster};
    use serde_json::Value;
    use std::convert::Infallible;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Sink that records every message sent to it.
    #[derive(Default)]
    struct Collect(Vec<Message>);

    impl Sink<Message> for Collect {
        type Error = Infallible;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(mut self: Pin<&mut Self>, item: Message) -> Result<(), Infallible> {
            self.0.push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }
    }

    fn test_app() -> App {
        let db = Database::open(":memory:").unwrap();
        db.save_roster(&Roster::new(
            "t1",
            "Lions",
            vec![PlayerRecord::new("Sam", "Lee", "sam@x.com")],
        ))
        .unwrap();
        let config = Config {
            league: LeagueConfig {
                name: "Test League".into(),
                season: String::new(),
                max_roster_size: 10,
            },
            port: 9100,
            db_path: ":memory:".into(),
            default_criteria: MatchCriteria::email_only(),
            badges: default_definitions(),
        };
        App::new(config, db)
    }

    /// Helper: create a stream of Message results from a vec.
    fn mock_stream(
        messages: Vec<Result<Message, WsError>>,
    ) -> impl Stream<Item = Result<Message, WsError>> + Unpin {
        stream::iter(messages)
    }

    fn replies(sent: &[Message]) -> Vec<Value> {
        sent.iter()
            .map(|m| match m {
                Message::Text(t) => serde_json::from_str(t.as_str()).unwrap(),
                other => panic!("expected text reply, got {other:?}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn each_request_gets_one_reply_in_order() {
        let app = test_app();
        let mut sent = Collect::default();
        let messages = vec![
            Ok(Message::Text(r#"{"type":"ping","id":"1"}"#.into())),
            Ok(Message::Text(r#"{"type":"ping","id":"2"}"#.into())),
        ];

        serve_stream(mock_stream(messages), &mut sent, &app, "test").await;

        let out = replies(&sent.0);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["id"], "1");
        assert_eq!(out[1]["id"], "2");
        assert_eq!(out[1]["type"], "pong");
    }

    #[tokio::test]
    async fn malformed_json_gets_error_reply_and_connection_stays_open() {
        let app = test_app();
        let mut sent = Collect::default();
        let messages = vec![
            Ok(Message::Text("not json at all".into())),
            Ok(Message::Text(r#"{"type":"ping"}"#.into())),
        ];

        serve_stream(mock_stream(messages), &mut sent, &app, "test").await;

        let out = replies(&sent.0);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["type"], "error");
        assert_eq!(out[0]["status"], 400);
        assert_eq!(out[1]["type"], "pong");
    }

    #[tokio::test]
    async fn close_frame_stops_processing() {
        let app = test_app();
        let mut sent = Collect::default();
        let messages = vec![
            Ok(Message::Text(r#"{"type":"ping"}"#.into())),
            Ok(Message::Close(None)),
            Ok(Message::Text(r#"{"type":"ping"}"#.into())),
        ];

        serve_stream(mock_stream(messages), &mut sent, &app, "test").await;
        assert_eq!(sent.0.len(), 1);
    }

    #[tokio::test]
    async fn error_stops_processing() {
        let app = test_app();
        let mut sent = Collect::default();
        let messages = vec![
            Err(WsError::ConnectionClosed),
            Ok(Message::Text(r#"{"type":"ping"}"#.into())),
        ];

        serve_stream(mock_stream(messages), &mut sent, &app, "test").await;
        assert!(sent.0.is_empty());
    }

    #[tokio::test]
    async fn binary_and_ping_frames_are_ignored() {
        let app = test_app();
        let mut sent = Collect::default();
        let messages = vec![
            Ok(Message::Binary(vec![1, 2, 3].into())),
            Ok(Message::Ping(vec![].into())),
            Ok(Message::Pong(vec![].into())),
            Ok(Message::Text(
                r#"{"type":"compare","team1":"Lions","team2":"Bears"}"#.into(),
            )),
        ];

        serve_stream(mock_stream(messages), &mut sent, &app, "test").await;

        let out = replies(&sent.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["status"], 404);
    }

    #[tokio::test]
    async fn empty_stream_completes_normally() {
        let app = test_app();
        let mut sent = Collect::default();
        serve_stream(mock_stream(vec![]), &mut sent, &app, "test").await;
        assert!(sent.0.is_empty());
    }
}
