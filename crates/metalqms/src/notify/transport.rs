//! Outbound message delivery.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::NotificationsConfig;
use crate::error::{MetalQmsError, TransportError};
use crate::sanitize;
use crate::secrets::resolve_bot_token;

/// Longest API error description kept in the notification log.
const MAX_DESCRIPTION_CHARS: usize = 200;

pub trait Transport: Send + Sync {
    fn send(&self, chat_id: &str, text: &str) -> Result<(), TransportError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

/// The bot account behind the token, as reported by `getMe`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BotIdentity {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

/// Telegram Bot API client.
pub struct TelegramTransport {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl TelegramTransport {
    pub fn new(base_url: &str, token: SecretString, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("metalqms/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Malformed(format!("HTTP client setup: {}", e.without_url())))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Client for the configured API with the resolved bot token.
    pub fn from_config(config: &NotificationsConfig) -> Result<Self, MetalQmsError> {
        let token = resolve_bot_token(config)?;
        Ok(Self::new(
            &config.api_base_url,
            token,
            Duration::from_secs(config.timeout_secs),
        )?)
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token.expose_secret(), method)
    }

    /// Checks the token and connectivity with `getMe`.
    pub fn get_me(&self) -> Result<BotIdentity, TransportError> {
        let response = self
            .client
            .get(self.endpoint("getMe"))
            .send()
            .map_err(classify_request_error)?;

        let status = response.status();
        let body = response.json::<ApiResponse<BotIdentity>>().ok();
        let description = body.as_ref().and_then(|r| r.description.clone());
        classify_status(status, description.as_deref())?;

        match body {
            Some(ApiResponse {
                ok: true,
                result: Some(identity),
                ..
            }) => Ok(identity),
            _ => Err(TransportError::Malformed(
                "getMe returned no bot description".to_string(),
            )),
        }
    }
}

impl Transport for TelegramTransport {
    fn send(&self, chat_id: &str, text: &str) -> Result<(), TransportError> {
        debug!(chat_id = %sanitize::redact_chat_id(chat_id), "sending message");

        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        });

        // The URL carries the bot token; errors are stripped of it.
        let response = self
            .client
            .post(self.endpoint("sendMessage"))
            .json(&body)
            .send()
            .map_err(classify_request_error)?;

        let status = response.status();
        let description = response
            .json::<ApiResponse<serde_json::Value>>()
            .ok()
            .and_then(|r| if r.ok { None } else { r.description });

        classify_status(status, description.as_deref())
    }
}

fn classify_request_error(err: reqwest::Error) -> TransportError {
    let err = err.without_url();
    if err.is_builder() {
        TransportError::Malformed(err.to_string())
    } else {
        TransportError::Transient(err.to_string())
    }
}

/// Maps an HTTP status (and the API's error description) onto a failure
/// category.
pub fn classify_status(status: StatusCode, description: Option<&str>) -> Result<(), TransportError> {
    if status.is_success() {
        return Ok(());
    }

    let detail = sanitize::truncate(
        description.unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error")),
        MAX_DESCRIPTION_CHARS,
    );
    let message = format!("{} {}", status.as_u16(), detail);

    match status {
        StatusCode::FORBIDDEN => Err(TransportError::Permanent(message)),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            Err(TransportError::Transient(message))
        }
        s if s.is_server_error() => Err(TransportError::Transient(message)),
        _ => Err(TransportError::Malformed(message)),
    }
}

/// In-memory transport that records every message and replays scripted
/// results. Once the script runs out every send succeeds.
#[derive(Default)]
pub struct RecordingTransport {
    script: Mutex<VecDeque<Result<(), TransportError>>>,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_result(&self, result: Result<(), TransportError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(result);
        }
    }

    /// Every `(chat_id, text)` pair passed to `send`, including failed ones.
    pub fn attempts(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, chat_id: &str, text: &str) -> Result<(), TransportError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((chat_id.to_string(), text.to_string()));
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::OK, None).is_ok());
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, Some("Forbidden: bot was blocked by the user")),
            Err(TransportError::Permanent(m)) if m.contains("blocked")
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, Some("Bad Request: can't parse entities")),
            Err(TransportError::Malformed(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, None),
            Err(TransportError::Transient(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, None),
            Err(TransportError::Transient(_))
        ));
    }

    #[test]
    fn test_recording_transport_replays_script() {
        let transport = RecordingTransport::new();
        transport.push_result(Err(TransportError::Transient("timeout".into())));

        assert!(transport.send("1", "a").is_err());
        assert!(transport.send("1", "b").is_ok());
        assert_eq!(transport.attempts().len(), 2);
        assert_eq!(transport.attempts()[1].1, "b");
    }

    /// Serves exactly one HTTP response and returns the request line.
    fn serve_once(status: &'static str, body: &'static str) -> (String, std::thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();

            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some(v) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = v.trim().parse().unwrap();
                }
            }
            let mut payload = vec![0u8; content_length];
            reader.read_exact(&mut payload).unwrap();

            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
            request_line
        });
        (addr, handle)
    }

    #[test]
    fn test_telegram_transport_success() {
        let (addr, server) = serve_once("200 OK", r#"{"ok":true,"result":{}}"#);
        let transport =
            TelegramTransport::new(&addr, SecretString::from("123:abc"), Duration::from_secs(5)).unwrap();

        transport.send("42", "*hi*").unwrap();

        let request_line = server.join().unwrap();
        assert!(request_line.starts_with("POST /bot123:abc/sendMessage"));
    }

    #[test]
    fn test_telegram_transport_blocked_user() {
        let (addr, server) = serve_once(
            "403 Forbidden",
            r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#,
        );
        let transport =
            TelegramTransport::new(&addr, SecretString::from("123:abc"), Duration::from_secs(5)).unwrap();

        let err = transport.send("42", "hi").unwrap_err();
        server.join().unwrap();
        assert_eq!(
            err,
            TransportError::Permanent("403 Forbidden: bot was blocked by the user".into())
        );
    }

    #[test]
    fn test_get_me_reports_bot_identity() {
        let (addr, server) = serve_once(
            "200 OK",
            r#"{"ok":true,"result":{"id":777,"is_bot":true,"first_name":"QMS","username":"metalqms_bot"}}"#,
        );
        let transport =
            TelegramTransport::new(&addr, SecretString::from("123:abc"), Duration::from_secs(5)).unwrap();

        let identity = transport.get_me().unwrap();

        assert!(server.join().unwrap().starts_with("GET /bot123:abc/getMe"));
        assert_eq!(
            identity,
            BotIdentity {
                id: 777,
                first_name: "QMS".into(),
                username: Some("metalqms_bot".into()),
            }
        );
    }

    #[test]
    fn test_get_me_with_revoked_token() {
        let (addr, server) = serve_once(
            "401 Unauthorized",
            r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#,
        );
        let transport =
            TelegramTransport::new(&addr, SecretString::from("123:abc"), Duration::from_secs(5)).unwrap();

        let err = transport.get_me().unwrap_err();
        server.join().unwrap();
        assert_eq!(err, TransportError::Malformed("401 Unauthorized".into()));
    }

    #[test]
    fn test_connection_refused_is_transient_and_hides_token() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let transport =
            TelegramTransport::new(&addr, SecretString::from("secret-token"), Duration::from_secs(2))
                .unwrap();
        match transport.send("42", "hi") {
            Err(TransportError::Transient(message)) => assert!(!message.contains("secret-token")),
            other => panic!("expected transient error, got {other:?}"),
        }
    }
}
