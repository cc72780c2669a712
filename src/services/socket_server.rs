use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch, RwLock};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

use super::live_buffer::SharedBuffer;
use crate::devices::reading::Reading;
use crate::utils::error::CondensateError;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type ClientSink = SplitSink<WebSocketStream<TcpStream>, Message>;

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub address: String,
    pub connected_at: chrono::DateTime<chrono::Utc>,
    pub bytes_sent: u64,
    pub messages_sent: u64,
}

/// Pushes every new reading to connected WebSocket clients.
///
/// Messages are JSON objects tagged by `type`: `welcome` and `snapshot` on
/// connect, then one `reading` per acquisition. A client may send
/// `{"type": "snapshot"}` to get the buffer again.
#[derive(Clone)]
pub struct LiveFeedServer {
    clients: Arc<RwLock<HashMap<String, ClientSink>>>,
    client_stats: Arc<RwLock<HashMap<String, ClientInfo>>>,
    shutdown: Arc<watch::Sender<bool>>,
    buffer: SharedBuffer,
    port: u16,
}

impl LiveFeedServer {
    pub fn new(port: u16, buffer: SharedBuffer) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            clients: Arc::new(RwLock::new(HashMap::new())),
            client_stats: Arc::new(RwLock::new(HashMap::new())),
            shutdown: Arc::new(shutdown),
            buffer,
            port,
        }
    }

    pub async fn start(&self, readings: broadcast::Receiver<Reading>) -> Result<(), CondensateError> {
        let bind_address = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&bind_address).await.map_err(|e| {
            CondensateError::ServiceNotAvailable(format!("Failed to bind WebSocket server on {}: {}", bind_address, e))
        })?;
        self.start_on(listener, readings).await
    }

    /// Serves on an already bound listener until [`LiveFeedServer::stop`] is called.
    pub async fn start_on(
        &self,
        listener: TcpListener,
        mut readings: broadcast::Receiver<Reading>,
    ) -> Result<(), CondensateError> {
        info!("🔌 WebSocket live feed listening on {}", listener.local_addr()?);
        self.shutdown.send_replace(false);

        let forwarder = self.clone();
        let mut forwarder_stop = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    next = next_live_reading(&mut readings) => match next {
                        Some(reading) => forwarder.broadcast_reading(&reading).await,
                        None => break,
                    },
                    _ = forwarder_stop.changed() => break,
                }
            }
        });

        let mut stop = self.shutdown.subscribe();
        loop {
            if *stop.borrow() {
                break;
            }
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let server = self.clone();
                        tokio::spawn(async move { server.handle_connection(stream, addr.to_string()).await });
                    }
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
                _ = stop.changed() => break,
            }
        }

        info!("🔌 WebSocket live feed no longer accepting clients");
        Ok(())
    }

    /// Completes the handshake, greets the client and only then subscribes it to live readings.
    async fn handle_connection(&self, stream: TcpStream, client_id: String) {
        let ws_stream = match timeout(HANDSHAKE_TIMEOUT, accept_async(stream)).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                warn!("❌ WebSocket handshake with {} failed: {}", client_id, e);
                return;
            }
            Err(_) => {
                warn!("⏱️ WebSocket handshake with {} timed out", client_id);
                return;
            }
        };
        info!("✅ Live feed client connected: {}", client_id);

        let (mut write, read) = ws_stream.split();
        let mut stats = ClientInfo {
            address: client_id.clone(),
            connected_at: chrono::Utc::now(),
            bytes_sent: 0,
            messages_sent: 0,
        };

        let greeting = match self.snapshot_message() {
            Ok(snapshot) => vec![self.welcome_message(&client_id), snapshot],
            Err(e) => {
                warn!("Failed to build snapshot for {}: {}", client_id, e);
                vec![self.welcome_message(&client_id)]
            }
        };
        for message in &greeting {
            match send_json(&mut write, message).await {
                Ok(bytes) => {
                    stats.bytes_sent += bytes as u64;
                    stats.messages_sent += 1;
                }
                Err(e) => {
                    warn!("Failed to greet live feed client {}: {}", client_id, e);
                    return;
                }
            }
        }

        self.clients.write().await.insert(client_id.clone(), write);
        self.client_stats.write().await.insert(client_id.clone(), stats);

        self.handle_client_messages(client_id, read).await;
    }

    async fn handle_client_messages(&self, client_id: String, mut read_half: SplitStream<WebSocketStream<TcpStream>>) {
        while let Some(msg_result) = read_half.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    debug!("📥 Message from {}: {}", client_id, text);
                    let request = serde_json::from_str::<Value>(&text).ok();
                    match request.as_ref().and_then(|v| v.get("type")).and_then(Value::as_str) {
                        Some("snapshot") => {
                            self.send_snapshot(&client_id).await.ok();
                        }
                        Some("ping") => {
                            self.send_to_client(&client_id, &json!({ "type": "pong" })).await.ok();
                        }
                        _ => {
                            let response = json!({
                                "type": "error",
                                "error": "Unsupported message. Expected {\"type\": \"snapshot\"} or {\"type\": \"ping\"}",
                            });
                            self.send_to_client(&client_id, &response).await.ok();
                        }
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("❌ Error receiving from client {}: {}", client_id, e);
                    break;
                }
            }
        }

        info!("🔌 Live feed client {} disconnected", client_id);
        self.clients.write().await.remove(&client_id);
        self.client_stats.write().await.remove(&client_id);
    }

    pub async fn send_to_client(&self, client_id: &str, message: &Value) -> Result<(), CondensateError> {
        let mut clients = self.clients.write().await;
        let mut client_stats = self.client_stats.write().await;

        if let Some(ws_stream) = clients.get_mut(client_id) {
            match send_json(ws_stream, message).await {
                Ok(bytes) => {
                    if let Some(stats) = client_stats.get_mut(client_id) {
                        stats.bytes_sent += bytes as u64;
                        stats.messages_sent += 1;
                    }
                }
                Err(CondensateError::Json(e)) => return Err(CondensateError::Json(e)),
                Err(e) => {
                    warn!("Failed to send message to client {}: {}", client_id, e);
                    clients.remove(client_id);
                    client_stats.remove(client_id);
                }
            }
        }

        Ok(())
    }

    /// Sends a reading to every client, dropping those that fail or time out.
    pub async fn broadcast_reading(&self, reading: &Reading) {
        let message_text = match serde_json::to_string(&json!({ "type": "reading", "data": reading })) {
            Ok(text) => text,
            Err(e) => {
                error!("❌ Failed to serialize reading: {}", e);
                return;
            }
        };

        let mut clients = self.clients.write().await;
        let mut client_stats = self.client_stats.write().await;
        let mut clients_to_remove = Vec::new();

        for (client_id, ws_stream) in clients.iter_mut() {
            match timeout(SEND_TIMEOUT, ws_stream.send(Message::Text(message_text.clone()))).await {
                Ok(Ok(())) => {
                    if let Some(stats) = client_stats.get_mut(client_id) {
                        stats.messages_sent += 1;
                        stats.bytes_sent += message_text.len() as u64;
                    }
                }
                Ok(Err(e)) => {
                    warn!("❌ Failed to send reading to client {}: {}", client_id, e);
                    clients_to_remove.push(client_id.clone());
                }
                Err(_) => {
                    warn!("⏱️ Timeout sending reading to client {}", client_id);
                    clients_to_remove.push(client_id.clone());
                }
            }
        }

        for client_id in clients_to_remove {
            clients.remove(&client_id);
            client_stats.remove(&client_id);
            info!("🔌 Removed disconnected client: {}", client_id);
        }
    }

    fn welcome_message(&self, client_id: &str) -> Value {
        json!({
            "type": "welcome",
            "timestamp": chrono::Utc::now().timestamp(),
            "data": {
                "message": "Connected to Condensate live feed",
                "client_id": client_id,
                "version": crate::VERSION,
            }
        })
    }

    fn snapshot_message(&self) -> Result<Value, CondensateError> {
        let readings = self
            .buffer
            .lock()
            .map_err(|_| CondensateError::LockError)?
            .snapshot();
        Ok(json!({ "type": "snapshot", "count": readings.len(), "data": readings }))
    }

    async fn send_snapshot(&self, client_id: &str) -> Result<(), CondensateError> {
        let message = self.snapshot_message()?;
        self.send_to_client(client_id, &message).await
    }

    pub async fn stop(&self) -> Result<(), CondensateError> {
        info!("🛑 Stopping WebSocket live feed...");
        self.shutdown.send_replace(true);

        let mut clients = self.clients.write().await;
        for (client_id, mut ws_stream) in clients.drain() {
            if let Err(e) = ws_stream.close().await {
                warn!("Failed to close WebSocket connection for client {}: {}", client_id, e);
            }
        }
        self.client_stats.write().await.clear();

        info!("✅ WebSocket live feed stopped");
        Ok(())
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn client_stats(&self) -> HashMap<String, ClientInfo> {
        self.client_stats.read().await.clone()
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Next reading for the feed. Skips over readings lost to lag; `None` once the channel closes.
async fn next_live_reading(readings: &mut broadcast::Receiver<Reading>) -> Option<Reading> {
    loop {
        match readings.recv().await {
            Ok(reading) => return Some(reading),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("⚠️  Live feed lagged, {} readings skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// Sends one JSON message and returns its size in bytes.
async fn send_json(sink: &mut ClientSink, message: &Value) -> Result<usize, CondensateError> {
    let text = serde_json::to_string(message)?;
    let bytes = text.len();
    timeout(SEND_TIMEOUT, sink.send(Message::Text(text)))
        .await?
        .map_err(|e| CondensateError::ServiceNotAvailable(format!("WebSocket send failed: {}", e)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::mock::MockMeter;
    use crate::devices::reading::parse_timestamp;
    use crate::services::live_buffer::LiveBuffer;
    use tokio_tungstenite::connect_async;

    async fn next_json<S>(ws: &mut S) -> Value
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        let msg = timeout(Duration::from_secs(5), ws.next()).await.unwrap().unwrap().unwrap();
        serde_json::from_str(&msg.into_text().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn client_gets_welcome_snapshot_then_live_readings() {
        let mock = MockMeter::with_seed(9);
        let buffer = LiveBuffer::shared(5);
        let first = mock.sample_at(parse_timestamp("2024-06-01 08:00:00").unwrap()).unwrap();
        buffer.lock().unwrap().push(first.clone());

        let (tx, rx) = broadcast::channel(16);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = LiveFeedServer::new(addr.port(), buffer);
        let running = server.clone();
        tokio::spawn(async move { running.start_on(listener, rx).await });

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();

        assert_eq!(next_json(&mut ws).await["type"], "welcome");
        let snapshot = next_json(&mut ws).await;
        assert_eq!(snapshot["type"], "snapshot");
        assert_eq!(snapshot["count"], 1);

        let second = mock.sample_at(parse_timestamp("2024-06-01 08:02:00").unwrap()).unwrap();
        tx.send(second.clone()).unwrap();
        let live = next_json(&mut ws).await;
        assert_eq!(live["type"], "reading");
        assert_eq!(live["data"]["timestamp"], "2024-06-01 08:02:00");
        assert_eq!(server.client_count().await, 1);
    }

    #[tokio::test]
    async fn silent_connection_does_not_block_other_clients() {
        let (_tx, rx) = broadcast::channel::<Reading>(16);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = LiveFeedServer::new(addr.port(), LiveBuffer::shared(5));
        let running = server.clone();
        tokio::spawn(async move { running.start_on(listener, rx).await });

        let _silent = TcpStream::connect(addr).await.unwrap();
        let (mut ws, _) = timeout(Duration::from_secs(3), connect_async(format!("ws://{}", addr)))
            .await
            .expect("handshake stalled behind a silent connection")
            .unwrap();
        assert_eq!(next_json(&mut ws).await["type"], "welcome");
        assert_eq!(next_json(&mut ws).await["type"], "snapshot");
    }

    #[tokio::test]
    async fn stop_ends_the_accept_loop() {
        let (_tx, rx) = broadcast::channel::<Reading>(16);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = LiveFeedServer::new(listener.local_addr().unwrap().port(), LiveBuffer::shared(5));
        let running = server.clone();
        let handle = tokio::spawn(async move { running.start_on(listener, rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        server.stop().await.unwrap();
        let served = timeout(Duration::from_secs(3), handle).await.unwrap().unwrap();
        assert!(served.is_ok());
        assert_eq!(server.client_count().await, 0);
    }

    #[tokio::test]
    async fn lagging_feed_resumes_with_newest_readings() {
        let mock = MockMeter::with_seed(4);
        let (tx, mut rx) = broadcast::channel(2);
        let minutes = ["08:00", "08:01", "08:02", "08:03", "08:04"];
        for minute in minutes {
            let ts = parse_timestamp(&format!("2024-06-01 {}:00", minute)).unwrap();
            tx.send(mock.sample_at(ts).unwrap()).unwrap();
        }

        let first = next_live_reading(&mut rx).await.unwrap();
        assert_eq!(first.timestamp_string(), "2024-06-01 08:03:00");
        let second = next_live_reading(&mut rx).await.unwrap();
        assert_eq!(second.timestamp_string(), "2024-06-01 08:04:00");

        drop(tx);
        assert!(next_live_reading(&mut rx).await.is_none());
    }
}
