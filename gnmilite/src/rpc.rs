//! JSON-Lines RPC transport over stdio or TCP.
//!
//! **Entry**: `gnmilite serve --stdio` or `gnmilite serve --listen HOST:PORT`
//!
//! One JSON object per line in each direction. Unary methods (capabilities,
//! get, set) get exactly one reply; `subscribe` messages feed the
//! connection's Subscribe stream, which answers with events.
//!
//! Request:
//! ```json
//! {"id": 1, "method": "get", "params": {"path": [{"origin": "car"}]}}
//! {"method": "subscribe", "params": {"subscribe": {"subscription": [...], "mode": "STREAM"}}}
//! {"method": "subscribe", "params": {"poll": {}}}
//! ```
//!
//! Response:
//! ```json
//! {"id": 1, "result": {"notification": [...]}}
//! {"id": 1, "error": {"code": "not_found", "message": "..."}}
//! {"event": "update", "data": {"update": {"timestamp": 0, "update": [...]}}}
//! {"event": "error", "data": {"code": "invalid_argument", "message": "..."}}
//! ```
//!
//! End of input cancels the connection's Subscribe stream. Outbound lines go
//! through a bounded queue; a notification that finds it full is dropped and
//! the subscription reports `resource_exhausted`.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use gnmilite_core::protocol::{CapabilityRequest, GetRequest, SetRequest, SubscribeRequest, SubscribeResponse};
use gnmilite_server::{Driver, GnmiError, SubscriptionSink};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Error body of a reply or an `error` event.
#[derive(Debug)]
struct RpcError {
    code: &'static str,
    message: String,
}

impl RpcError {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            code: "invalid_argument",
            message: message.into(),
        }
    }

    fn to_json(&self) -> Value {
        json!({"code": self.code, "message": self.message})
    }
}

impl From<GnmiError> for RpcError {
    fn from(e: GnmiError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

/// Lines queued for the writer of one connection.
const OUTBOUND_QUEUE: usize = 1024;

type Outbound = mpsc::Sender<Value>;

async fn reply(out: &Outbound, id: Value, result: std::result::Result<Value, RpcError>) {
    let msg = match result {
        Ok(res) => json!({"id": id, "result": res}),
        Err(e) => json!({"id": id, "error": e.to_json()}),
    };
    let _ = out.send(msg).await;
}

async fn emit_event(out: &Outbound, event: &str, data: Value) {
    let _ = out.send(json!({"event": event, "data": data})).await;
}

/// Sink writing `update` events. It never waits for the writer.
fn event_sink(out: Outbound) -> Arc<dyn SubscriptionSink> {
    let sink = move |resp: SubscribeResponse| -> gnmilite_server::Result<()> {
        let data = serde_json::to_value(&resp)?;
        out.try_send(json!({"event": "update", "data": data}))
            .map_err(|e| match e {
                TrySendError::Full(_) => GnmiError::SinkFull,
                TrySendError::Closed(_) => GnmiError::SinkClosed,
            })
    };
    Arc::new(sink)
}

/// Serve one session on stdin/stdout.
pub async fn serve_stdio(driver: Arc<Driver>, max_request_bytes: usize, shutdown: CancellationToken) -> Result<()> {
    tracing::info!("serving JSON-Lines on stdio");
    serve_connection(driver, tokio::io::stdin(), tokio::io::stdout(), max_request_bytes, shutdown).await
}

/// Accept connections until `shutdown` fires; each connection is an
/// independent session. A listener received on `rebind` replaces the current
/// one; open connections are kept.
pub async fn serve_tcp(
    driver: Arc<Driver>,
    mut listener: TcpListener,
    mut rebind: mpsc::UnboundedReceiver<std::net::TcpListener>,
    max_request_bytes: usize,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener.local_addr().context("Failed to read listen address")?;
    tracing::info!(%addr, "serving JSON-Lines on tcp");
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(next) = rebind.recv() => {
                match TcpListener::from_std(next) {
                    Ok(next) => {
                        listener = next;
                        if let Ok(addr) = listener.local_addr() {
                            tracing::info!(%addr, "listener moved");
                        }
                    }
                    Err(e) => tracing::error!("cannot adopt new listener: {}", e),
                }
                continue;
            }
            accepted = listener.accept() => match accepted {
                Ok(a) => a,
                Err(e) => {
                    tracing::error!("accept failed: {}", e);
                    continue;
                }
            },
        };
        tracing::info!(%peer, "connection opened");
        let (reader, writer) = stream.into_split();
        let driver = Arc::clone(&driver);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(driver, reader, writer, max_request_bytes, shutdown).await {
                tracing::error!(%peer, "connection failed: {:#}", e);
            }
            tracing::info!(%peer, "connection closed");
        });
    }
    Ok(())
}

/// The connection's Subscribe stream: requests go to a driver task.
struct SubscribeStream {
    requests: mpsc::Sender<SubscribeRequest>,
    task: JoinHandle<()>,
}

impl SubscribeStream {
    fn start(driver: Arc<Driver>, out: Outbound, cancel: CancellationToken) -> Self {
        let (requests, rx) = mpsc::channel(16);
        let sink = event_sink(out.clone());
        let task = tokio::spawn(async move {
            if let Err(e) = driver.subscribe(rx, sink, cancel).await {
                tracing::debug!("subscribe stream ended: {}", e);
                emit_event(&out, "error", RpcError::from(e).to_json()).await;
            }
        });
        Self { requests, task }
    }
}

/// Serve one session until end of input or `shutdown`.
pub async fn serve_connection<R, W>(
    driver: Arc<Driver>,
    reader: R,
    writer: W,
    max_request_bytes: usize,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out, rx) = mpsc::channel::<Value>(OUTBOUND_QUEUE);
    let writer_task = tokio::spawn(write_lines(writer, rx));
    let conn = shutdown.child_token();
    let mut reader = BufReader::new(reader);
    let mut stream: Option<SubscribeStream> = None;

    loop {
        let line = tokio::select! {
            _ = conn.cancelled() => break,
            line = read_line_limited(&mut reader, max_request_bytes) => line,
        };
        let line = match line {
            Ok(None) => break,
            Ok(Some(l)) => l,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                reply(&out, Value::Null, Err(RpcError::invalid(format!("Request error: {}", e)))).await;
                continue;
            }
            Err(e) => {
                tracing::error!("read failed: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request: RpcRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                reply(&out, Value::Null, Err(RpcError::invalid(format!("Parse error: {}", e)))).await;
                continue;
            }
        };
        tracing::debug!(method = %request.method, "request");

        if request.method == "subscribe" {
            let req: SubscribeRequest = match serde_json::from_value(request.params) {
                Ok(r) => r,
                Err(e) => {
                    emit_event(&out, "error", RpcError::invalid(format!("Invalid params: {}", e)).to_json()).await;
                    continue;
                }
            };
            let current = match stream.take() {
                Some(s) if !s.requests.is_closed() => s,
                _ => SubscribeStream::start(Arc::clone(&driver), out.clone(), conn.clone()),
            };
            if current.requests.send(req).await.is_err() {
                emit_event(&out, "error", RpcError::from(GnmiError::SinkClosed).to_json()).await;
            }
            stream = Some(current);
            continue;
        }

        let result = dispatch_unary(&driver, &request.method, request.params);
        reply(&out, request.id, result).await;
    }

    conn.cancel();
    if let Some(s) = stream {
        drop(s.requests);
        let _ = s.task.await;
    }
    drop(out);
    writer_task
        .await
        .context("Writer task panicked")?
        .context("Failed to write response")?;
    Ok(())
}

fn dispatch_unary(driver: &Driver, method: &str, params: Value) -> std::result::Result<Value, RpcError> {
    let params = if params.is_null() { json!({}) } else { params };
    let result = match method {
        "capabilities" => {
            let req: CapabilityRequest = parse_params(params)?;
            serde_json::to_value(driver.capabilities(&req))
        }
        "get" => {
            let req: GetRequest = parse_params(params)?;
            serde_json::to_value(driver.get(&req)?)
        }
        "set" => {
            let req: SetRequest = parse_params(params)?;
            serde_json::to_value(driver.set(&req)?)
        }
        _ => {
            return Err(RpcError {
                code: "unimplemented",
                message: format!("Unknown method: {}", method),
            })
        }
    };
    result.map_err(|e| RpcError {
        code: "internal",
        message: e.to_string(),
    })
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> std::result::Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::invalid(format!("Invalid params: {}", e)))
}

async fn write_lines<W: AsyncWrite + Unpin>(mut writer: W, mut rx: mpsc::Receiver<Value>) -> io::Result<()> {
    while let Some(msg) = rx.recv().await {
        let mut line = msg.to_string();
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}

// ─── Size-limited line reader ────────────────────────────────────────────────

fn too_large(max: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Request exceeds {} byte size limit", max),
    )
}

fn into_line(mut buf: Vec<u8>) -> io::Result<String> {
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    String::from_utf8(buf).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "Invalid UTF-8"))
}

/// Read one line, enforcing `max` bytes. `Ok(None)` on EOF. An oversized
/// line is consumed entirely and reported as `InvalidData`.
async fn read_line_limited<R: AsyncBufRead + Unpin>(reader: &mut R, max: usize) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return if buf.is_empty() { Ok(None) } else { into_line(buf).map(Some) };
        }
        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                if buf.len() + pos > max {
                    reader.consume(pos + 1);
                    return Err(too_large(max));
                }
                buf.extend_from_slice(&available[..pos]);
                reader.consume(pos + 1);
                return into_line(buf).map(Some);
            }
            None => {
                let len = available.len();
                if buf.len() + len > max {
                    reader.consume(len);
                    skip_until_newline(reader).await?;
                    return Err(too_large(max));
                }
                buf.extend_from_slice(available);
                reader.consume(len);
            }
        }
    }
}

async fn skip_until_newline<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<()> {
    loop {
        let b = reader.fill_buf().await?;
        if b.is_empty() {
            return Ok(());
        }
        if let Some(pos) = b.iter().position(|&c| c == b'\n') {
            reader.consume(pos + 1);
            return Ok(());
        }
        let len = b.len();
        reader.consume(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gnmilite_core::protocol::Notification;
    use gnmilite_core::tree::testing::test_device;
    use gnmilite_core::tree::Device;
    use tokio::io::AsyncReadExt;

    fn driver() -> Arc<Driver> {
        let device: Arc<dyn Device> = Arc::new(test_device());
        Arc::new(Driver::new(device))
    }

    /// Feed `input` as a whole session and collect every output line.
    async fn session(driver: Arc<Driver>, input: &str, max: usize) -> Vec<Value> {
        let (client, server) = tokio::io::duplex(1 << 20);
        let (server_r, server_w) = tokio::io::split(server);
        let (mut client_r, mut client_w) = tokio::io::split(client);
        let serve = tokio::spawn(serve_connection(driver, server_r, server_w, max, CancellationToken::new()));

        client_w.write_all(input.as_bytes()).await.unwrap();
        client_w.shutdown().await.unwrap();
        serve.await.unwrap().unwrap();

        let mut text = String::new();
        client_r.read_to_string(&mut text).await.unwrap();
        text.lines().map(|l| serde_json::from_str(l).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_unary_round_trip() {
        let input = concat!(
            r#"{"id":1,"method":"capabilities"}"#,
            "\n",
            r#"{"id":2,"method":"set","params":{"update":[{"path":{"origin":"car"},"val":{"json_val":"{\"speed\":100}"}}]}}"#,
            "\n",
            r#"{"id":3,"method":"get","params":{"path":[{"origin":"car","elem":[{"name":"speed"}]}]}}"#,
            "\n",
        );
        let lines = session(driver(), input, 1024).await;
        assert_eq!(lines.len(), 3);

        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[0]["result"]["supported_encodings"], json!(["JSON", "JSON_IETF"]));
        assert_eq!(lines[1]["result"]["response"][0]["op"], "UPDATE");
        assert_eq!(
            lines[2]["result"]["notification"][0]["update"][0]["val"],
            json!({"json_val": "100"})
        );
    }

    #[tokio::test]
    async fn test_errors() {
        let input = concat!(
            "not json\n",
            r#"{"id":"a","method":"reboot"}"#,
            "\n",
            r#"{"id":"b","method":"get","params":{"path":[{"origin":"boat"}]}}"#,
            "\n",
            r#"{"id":"c","method":"get","params":{"path":7}}"#,
            "\n",
        );
        let lines = session(driver(), input, 1024).await;
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["id"], Value::Null);
        assert_eq!(lines[0]["error"]["code"], "invalid_argument");
        assert_eq!(lines[1]["error"]["code"], "unimplemented");
        assert_eq!(lines[2]["id"], "b");
        assert_eq!(lines[2]["error"]["code"], "not_found");
        assert_eq!(lines[3]["error"]["code"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped() {
        let big = format!("{{\"id\":1,\"method\":\"capabilities\",\"pad\":\"{}\"}}\n", "x".repeat(200));
        let input = format!("{}{}\n", big, r#"{"id":2,"method":"capabilities"}"#);
        let lines = session(driver(), &input, 64).await;
        assert_eq!(lines.len(), 2);
        assert!(lines[0]["error"]["message"].as_str().unwrap().contains("size limit"));
        assert_eq!(lines[1]["id"], 2);
    }

    #[tokio::test]
    async fn test_subscribe_once_and_error_events() {
        let input = concat!(
            r#"{"method":"subscribe","params":{"subscribe":{"mode":"ONCE","subscription":[{"path":{"origin":"x","elem":[{"name":"me"},{"name":"name"}]}}]}}}"#,
            "\n",
            r#"{"method":"subscribe","params":{"subscribe":{"mode":"ONCE","subscription":[{"path":{"elem":[{"name":"me"}]}}]}}}"#,
            "\n",
        );
        let lines = session(driver(), input, 4096).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "update");
        assert_eq!(
            lines[0]["data"]["update"]["update"][0]["val"],
            json!({"json_val": "\"joe\""})
        );
        assert_eq!(lines[1]["event"], "error");
        assert_eq!(lines[1]["data"]["code"], "invalid_argument");
    }

    #[tokio::test]
    async fn test_read_line_limited() {
        let data: &[u8] = b"one\r\ntwo\nlast";
        let mut reader = BufReader::new(data);
        assert_eq!(read_line_limited(&mut reader, 16).await.unwrap().as_deref(), Some("one"));
        assert_eq!(read_line_limited(&mut reader, 16).await.unwrap().as_deref(), Some("two"));
        assert_eq!(read_line_limited(&mut reader, 16).await.unwrap().as_deref(), Some("last"));
        assert_eq!(read_line_limited(&mut reader, 16).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_event_sink_reports_backlog() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = event_sink(tx);
        let resp = || {
            SubscribeResponse::Update(Notification {
                timestamp: 1,
                update: vec![],
            })
        };
        sink.send(resp()).unwrap();
        assert!(matches!(sink.send(resp()), Err(GnmiError::SinkFull)));

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued["event"], "update");
        sink.send(resp()).unwrap();

        drop(rx);
        assert!(matches!(sink.send(resp()), Err(GnmiError::SinkClosed)));
    }

    #[tokio::test]
    async fn test_tcp_listener_rebind() {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (rebind_tx, rebind_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve_tcp(driver(), first, rebind_rx, 1024, shutdown.clone()));

        let next = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        next.set_nonblocking(true).unwrap();
        let addr = next.local_addr().unwrap();
        rebind_tx.send(next).unwrap();

        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (r, mut w) = stream.into_split();
        w.write_all(b"{\"id\":1,\"method\":\"capabilities\"}\n").await.unwrap();
        let mut line = String::new();
        BufReader::new(r).read_line(&mut line).await.unwrap();
        let reply: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(reply["id"], 1);
        assert!(reply["result"]["supported_models"].is_array());

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }
}
