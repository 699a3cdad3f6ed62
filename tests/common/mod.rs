#![allow(dead_code)]

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use nudge_bot::error::{NudgeError, Result};
use nudge_bot::http::ApiGateway;
use nudge_bot::model::AppRecord;
use nudge_bot::resolver::{AmbiguousChoice, Disambiguator, NotFoundChoice};

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: &'static str,
    pub path: String,
    pub body: Option<Value>,
}

/// In-memory gateway: canned responses queued per (method, path), served in
/// order; every call is recorded.
#[derive(Default)]
pub struct MockGateway {
    responses: Mutex<HashMap<(&'static str, String), VecDeque<Result<Value>>>>,
    calls: Mutex<Vec<Call>>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, method: &'static str, path: &str, value: Value) {
        self.queue(method, path, Ok(value));
    }

    /// Queues a non-2xx answer, surfaced as a transport error.
    pub fn fail(&self, method: &'static str, path: &str, status: u16) {
        let err = NudgeError::Transport {
            method,
            path: path.to_string(),
            status: StatusCode::from_u16(status).unwrap(),
            body: "{\"detail\":\"canned failure\"}".to_string(),
        };
        self.queue(method, path, Err(err));
    }

    /// Queues a rejected credential, as the client reports it after a failed refresh.
    pub fn fail_auth(&self, method: &'static str, path: &str) {
        self.queue(method, path, Err(NudgeError::Auth("token rejected".to_string())));
    }

    fn queue(&self, method: &'static str, path: &str, response: Result<Value>) {
        self.responses
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str, path: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method && c.path == path)
            .collect()
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.method != "GET" && c.path != nudge_bot::search::SEARCH_PATH)
            .collect()
    }

    fn handle(&self, method: &'static str, path: &str, body: Option<&Value>) -> Result<Value> {
        self.calls.lock().unwrap().push(Call {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });
        let next = self
            .responses
            .lock()
            .unwrap()
            .get_mut(&(method, path.to_string()))
            .and_then(VecDeque::pop_front);
        match next {
            Some(response) => response,
            None => panic!("no canned response for {method} {path}"),
        }
    }
}

#[async_trait]
impl ApiGateway for MockGateway {
    async fn get(&self, path: &str) -> Result<Value> {
        self.handle("GET", path, None)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.handle("POST", path, Some(body))
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.handle("PUT", path, Some(body))
    }
}

/// Field schema used across tests:
/// - Owner (11): SELECT on apps, values Security (111) and IT (112)
/// - Tier (12): SELECT on apps and accounts, value Gold (121)
/// - Notes (13): TEXT on users, no allowed values
pub fn fields_json() -> Value {
    json!({
        "fields": [
            {
                "id": 11,
                "name": "Owner",
                "field_type": "SELECT",
                "scopes": ["saas"],
                "allowed_values": [
                    {"id": 111, "value": "Security"},
                    {"id": 112, "value": "IT"}
                ]
            },
            {
                "id": "12",
                "name": "Tier",
                "type": "single_select",
                "field_scopes": [{"scope": "SAAS"}, {"scope": "SAAS_ACCOUNT"}],
                "allowed_values": [{"id": 121, "value": "Gold"}]
            },
            {
                "id": 13,
                "name": "Notes",
                "field_type": "TEXT",
                "scopes": ["user"],
                "allowed_values": []
            }
        ]
    })
}

pub fn app_json(id: u64, name: &str, domain: &str, accounts: u64) -> Value {
    json!({
        "id": id,
        "name": name.to_lowercase(),
        "service_info": {"name": name, "category": {"name": "Collaboration"}},
        "domain_canonical": domain,
        "counters": {"total_accounts": accounts}
    })
}

pub fn page(apps: Vec<Value>, next_page: Option<u32>) -> Value {
    json!({"values": apps, "next_page": next_page})
}

pub fn gateway_with_fields() -> Arc<MockGateway> {
    let gateway = MockGateway::new();
    gateway.respond("GET", nudge_bot::catalog::FIELDS_PATH, fields_json());
    gateway
}

/// Disambiguator that replays queued answers and counts prompts
#[derive(Default)]
pub struct Scripted {
    pub interactive: bool,
    pub not_found: VecDeque<NotFoundChoice>,
    pub ambiguous: VecDeque<AmbiguousChoice>,
    pub confirms: VecDeque<bool>,
    pub prompts: usize,
    pub seen_matches: Vec<usize>,
}

impl Scripted {
    pub fn interactive() -> Self {
        Self {
            interactive: true,
            ..Self::default()
        }
    }

    pub fn batch() -> Self {
        Self::default()
    }
}

impl Disambiguator for Scripted {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn on_not_found(&mut self, _term: &str) -> Result<NotFoundChoice> {
        self.prompts += 1;
        Ok(self.not_found.pop_front().unwrap_or(NotFoundChoice::GiveUp))
    }

    fn on_ambiguous(&mut self, _term: &str, matches: &[AppRecord]) -> Result<AmbiguousChoice> {
        self.prompts += 1;
        self.seen_matches.push(matches.len());
        Ok(self.ambiguous.pop_front().unwrap_or(AmbiguousChoice::Skip))
    }

    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        self.prompts += 1;
        Ok(self.confirms.pop_front().unwrap_or(true))
    }
}

/// A request as seen by [`serve`]
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    /// Lower-cased header names
    pub headers: HashMap<String, String>,
    pub body: String,
}

pub struct Canned {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl Canned {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }
}

/// Serves `responses` one connection each, in order, then stops listening.
/// Returns the base URL and the requests received.
pub async fn serve(responses: Vec<Canned>) -> (String, Arc<Mutex<Vec<Recorded>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = recorded.clone();

    tokio::spawn(async move {
        for canned in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let request = read_request(&mut socket).await;
            sink.lock().unwrap().push(request);

            let mut head = format!(
                "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                canned.status,
                canned.body.len()
            );
            for (name, value) in &canned.headers {
                head.push_str(&format!("{name}: {value}\r\n"));
            }
            head.push_str("\r\n");
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(canned.body.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (base_url, recorded)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Recorded {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break buf.len();
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split(' ');
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Recorded {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    }
}
