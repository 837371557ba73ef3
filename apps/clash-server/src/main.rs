use clash::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: u16 = 3000;

/// `0.0.0.0:<PORT>`, falling back to the default port when `PORT` is unset
/// or not a number.
fn bind_addr(port: Option<&str>) -> String {
    let port = port
        .and_then(|p| p.trim().parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    format!("0.0.0.0:{port}")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = bind_addr(std::env::var("PORT").ok().as_deref());
    tracing::info!(%addr, "starting clash server");

    let server = ClashServer::builder().bind(&addr).build().await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;

    type Ws = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    #[test]
    fn test_bind_addr_reads_port() {
        assert_eq!(bind_addr(Some("8080")), "0.0.0.0:8080");
        assert_eq!(bind_addr(None), "0.0.0.0:3000");
        assert_eq!(bind_addr(Some("not-a-port")), "0.0.0.0:3000");
    }

    async fn start() -> String {
        let server = ClashServer::builder()
            .bind("127.0.0.1:0")
            .build()
            .await
            .unwrap();
        let addr = server.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        addr
    }

    async fn ws(addr: &str) -> Ws {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        ws
    }

    async fn send(ws: &mut Ws, event: ClientEvent) {
        let json = serde_json::to_string(&event).unwrap();
        ws.send(Message::Text(json.into())).await.unwrap();
    }

    async fn recv(ws: &mut Ws) -> ServerEvent {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    async fn say_hello(ws: &mut Ws) -> PlayerId {
        send(ws, ClientEvent::Hello { version: PROTOCOL_VERSION, token: None }).await;
        match recv(ws).await {
            ServerEvent::Welcome { player_id, .. } => player_id,
            other => panic!("expected welcome, got {other:?}"),
        }
    }

    /// Both players pick a move and read the result.
    async fn round(
        a: &mut Ws,
        b: &mut Ws,
        code: &RoomCode,
        moves: (&str, &str),
    ) -> ServerEvent {
        send(a, ClientEvent::Move { room_code: code.clone(), choice: moves.0.into() }).await;
        send(b, ClientEvent::Move { room_code: code.clone(), choice: moves.1.into() }).await;
        let result = recv(a).await;
        assert_eq!(recv(b).await, result);
        result
    }

    #[tokio::test]
    async fn test_full_match_and_rematch() {
        let addr = start().await;
        let mut a = ws(&addr).await;
        let a_id = say_hello(&mut a).await;
        let mut b = ws(&addr).await;
        say_hello(&mut b).await;

        send(&mut a, ClientEvent::CreateGame).await;
        let ServerEvent::GameCreated(code) = recv(&mut a).await else {
            panic!("expected gameCreated");
        };
        send(&mut b, ClientEvent::JoinGame(code.clone())).await;
        for w in [&mut a, &mut b] {
            assert_eq!(recv(w).await, ServerEvent::GameStart(code.clone()));
            assert!(matches!(recv(w).await, ServerEvent::RoundStart { round: 1, .. }));
        }

        // Round 1: A wins.
        let r1 = round(&mut a, &mut b, &code, ("rock", "scissors")).await;
        assert!(matches!(r1, ServerEvent::RoundResult { match_winner: None, .. }));
        for w in [&mut a, &mut b] {
            assert!(matches!(recv(w).await, ServerEvent::RoundStart { round: 2, .. }));
        }

        // Round 2: A wins the match.
        let r2 = round(&mut a, &mut b, &code, ("paper", "rock")).await;
        assert!(matches!(
            r2,
            ServerEvent::RoundResult { match_winner: Some(w), .. } if w == a_id
        ));

        // Both vote: the same room starts over.
        send(&mut a, ClientEvent::RequestRematch(code.clone())).await;
        assert!(matches!(recv(&mut b).await, ServerEvent::RematchRequested { .. }));
        send(&mut b, ClientEvent::RequestRematch(code.clone())).await;

        assert!(matches!(recv(&mut a).await, ServerEvent::RematchRequested { .. }));
        assert!(matches!(recv(&mut a).await, ServerEvent::RematchRequested { .. }));
        assert_eq!(recv(&mut a).await, ServerEvent::RematchStarting);
        match recv(&mut a).await {
            ServerEvent::RoundStart { round, scores } => {
                assert_eq!(round, 1);
                assert!(scores.iter().all(|s| s.score == 0));
            }
            other => panic!("expected roundStart, got {other:?}"),
        }
    }
}
