//! Shared fixtures for the service tests.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use stall_sdk::credential::CredentialCipher;
use stall_sdk::objects::{CreateOrderRequest, OrderItemInput};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;
use uuid::Uuid;

use crate::analytics::Analytics;
use crate::entities::products::ProductRecord;
use crate::entities::stores::{BuyerRecord, StoreRecord};
use crate::events::{OrderNoticeReceiver, OrderNoticeSender, StoreBroadcaster, order_notice_channel};
use crate::lifecycle::OrderLifecycle;
use crate::memory::MemoryProcessor;
use crate::payment::{PaymentGateway, PaymentProvider, ProviderError, ProviderVerification};

pub const PROVIDER_SECRET: &str = "sk_test_fixture";

pub struct Fixture {
    pub memory: MemoryProcessor,
    pub broadcaster: StoreBroadcaster,
    pub tenant_id: Uuid,
    pub store_id: Uuid,
    pub buyer_id: Uuid,
    pub notices: OrderNoticeSender,
    pub notices_rx: OrderNoticeReceiver,
    pub cipher: Arc<CredentialCipher>,
}

impl Fixture {
    /// One tenant with one store holding an encrypted provider secret, and
    /// one buyer of that tenant.
    pub async fn new() -> Self {
        let memory = MemoryProcessor::new();
        let cipher = Arc::new(CredentialCipher::from_key([7u8; 32]).unwrap());
        let tenant_id = Uuid::new_v4();
        let store_id = Uuid::new_v4();
        let buyer_id = Uuid::new_v4();

        memory
            .insert_store(StoreRecord {
                id: store_id,
                tenant_id,
                name: "Fixture Store".into(),
                payment_secret: Some(cipher.encrypt(PROVIDER_SECRET).unwrap()),
            })
            .await;
        memory
            .insert_buyer(BuyerRecord {
                id: buyer_id,
                tenant_id,
                email: Some("buyer@example.com".into()),
            })
            .await;

        let (notices, notices_rx) = order_notice_channel();
        Self {
            memory,
            broadcaster: StoreBroadcaster::default(),
            tenant_id,
            store_id,
            buyer_id,
            notices,
            notices_rx,
            cipher,
        }
    }

    pub async fn product(&self, stock: i32) -> Uuid {
        self.product_priced(100, stock).await
    }

    pub async fn product_priced(&self, price: i64, stock: i32) -> Uuid {
        let id = Uuid::new_v4();
        self.memory
            .insert_product(ProductRecord {
                id,
                store_id: self.store_id,
                name: format!("Product {}", &id.simple().to_string()[..8]),
                price: Decimal::from(price),
                stock,
            })
            .await;
        id
    }

    pub fn lifecycle(&self) -> OrderLifecycle<MemoryProcessor> {
        OrderLifecycle::new(
            self.memory.clone(),
            self.notices.clone(),
            self.broadcaster.clone(),
        )
    }

    pub fn analytics(&self) -> Analytics<MemoryProcessor> {
        Analytics::new(self.memory.clone(), self.broadcaster.clone())
    }

    pub async fn gateway(&self, provider: Arc<ScriptedProvider>) -> PaymentGateway<MemoryProcessor> {
        PaymentGateway::new(
            self.memory.clone(),
            provider,
            self.cipher.clone(),
            self.lifecycle(),
            Duration::from_secs(5),
        )
    }

    pub async fn clear_secret(&self) {
        self.replace_secret(None).await;
    }

    /// Store `secret` verbatim, bypassing encryption.
    pub async fn set_raw_secret(&self, secret: &str) {
        self.replace_secret(Some(secret.to_owned())).await;
    }

    /// Another buyer of the fixture tenant.
    pub async fn other_buyer(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.memory
            .insert_buyer(BuyerRecord {
                id,
                tenant_id: self.tenant_id,
                email: None,
            })
            .await;
        id
    }

    async fn replace_secret(&self, secret: Option<String>) {
        let store = self.memory.store(self.store_id).await.unwrap();
        self.memory
            .insert_store(StoreRecord {
                payment_secret: secret,
                ..store
            })
            .await;
    }
}

/// A checkout request with `(product_id, quantity, unit_price)` lines.
pub fn cart(store_id: Uuid, total: i64, items: &[(Uuid, i32, i64)]) -> CreateOrderRequest {
    CreateOrderRequest {
        store_id,
        total_amount: Decimal::from(total),
        items: items
            .iter()
            .map(|&(product_id, quantity, price)| OrderItemInput {
                product_id,
                quantity,
                price: Decimal::from(price),
            })
            .collect(),
    }
}

/// A provider document reporting a successful charge.
pub fn success_document(amount_minor: i64, order_id: Option<Uuid>) -> Value {
    let metadata = match order_id {
        Some(id) => json!({ "order_id": id.to_string() }),
        None => json!({}),
    };
    json!({
        "status": true,
        "message": "Verification successful",
        "data": {
            "status": "success",
            "reference": "ref_1",
            "amount": amount_minor,
            "metadata": metadata,
        }
    })
}

enum Script {
    Answer(Value),
    Fail { status: u16, raw: Value },
    Hang,
}

/// A payment provider answering from a script and recording its calls.
pub struct ScriptedProvider {
    script: Script,
    calls: AtomicUsize,
    last_secret: Mutex<Option<String>>,
}

impl ScriptedProvider {
    fn with(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            last_secret: Mutex::new(None),
        })
    }

    pub fn always(document: Value) -> Arc<Self> {
        Self::with(Script::Answer(document))
    }

    pub fn failing(status: u16, raw: Value) -> Arc<Self> {
        Self::with(Script::Fail { status, raw })
    }

    pub fn hanging() -> Arc<Self> {
        Self::with(Script::Hang)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_secret(&self) -> Option<String> {
        self.last_secret.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    async fn verify_transaction(
        &self,
        secret: &str,
        _reference: &str,
    ) -> Result<ProviderVerification, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_secret.lock().unwrap() = Some(secret.to_owned());
        match &self.script {
            Script::Answer(document) => Ok(ProviderVerification::from_document(document.clone())),
            Script::Fail { status, raw } => Err(ProviderError::Status {
                status: *status,
                raw: raw.clone(),
            }),
            Script::Hang => std::future::pending().await,
        }
    }
}

/// A local HTTP endpoint answering every request with one canned response.
pub struct StubHttp {
    pub url: Url,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubHttp {
    pub async fn start(status: u16, body: &'static str, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let seen = seen.clone();
                tokio::spawn(async move {
                    let request = read_request(&mut socket).await;
                    seen.lock().unwrap().push(request);
                    tokio::time::sleep(delay).await;
                    let response = format!(
                        "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { url, requests }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Read one request: headers plus a `Content-Length` body.
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}
