//! In-process stand-ins for the browser, the signing agent and the chain.

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use alloy_primitives::{Address, B256, Bytes, U256, address};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use url::Url;
use wallet_bridge::{
    BridgeConfig, BridgeError, HostBridge, WalletBridge,
    agent::{AgentClient, AgentCommand, AgentReply, AgentRequest, AgentResponse, SessionRecord},
    config::PaymasterStrategy,
    host::{ApprovalMessage, PopupRequest, TxDelivery},
    pair,
    paymaster::ChainClient,
    platform::{OpenedWindow, PopupWindow, ScreenMetrics, WindowEvent, WindowFeatures, WindowSystem},
    primitives::{PaymasterFlow, TransactionRequest},
    store::{MemoryStore, NonSensitiveStore},
    wallet::auth::{AuthType, CredentialSigner, SavedAuth},
};

pub const ACCOUNT: Address = address!("0x0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a0a");
pub const RECIPIENT: Address = address!("0x0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b");
pub const SPONSOR: Address = address!("0x5555555555555555555555555555555555555555");
pub const GAS_PRICE: u64 = 250_000_000;

/// Polls `condition` until it holds.
pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> eyre::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .map_err(|_| eyre::eyre!("condition not met within {timeout:?}"))
}

#[derive(Debug)]
pub struct FakeWindow {
    pub url: Url,
    pub features: String,
    closed: AtomicBool,
    focused: AtomicUsize,
    events: UnboundedSender<WindowEvent>,
}

impl FakeWindow {
    pub fn request(&self) -> PopupRequest {
        PopupRequest::from_url(&self.url).unwrap()
    }

    pub fn load(&self) {
        let _ = self.events.send(WindowEvent::Loaded);
    }

    /// The user closes the window.
    pub fn user_close(&self) {
        self.close();
    }

    pub fn post(&self, msg: &ApprovalMessage) {
        let _ = self.events.send(WindowEvent::Message(serde_json::to_value(msg).unwrap()));
    }

    pub fn focus_count(&self) -> usize {
        self.focused.load(Ordering::SeqCst)
    }
}

impl PopupWindow for FakeWindow {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn focus(&self) {
        self.focused.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(WindowEvent::Unloaded);
        }
    }
}

type UnloadHook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct FakeWindowSystem {
    blocked: AtomicBool,
    opened: Mutex<Vec<Arc<FakeWindow>>>,
    unload_hooks: Mutex<Vec<UnloadHook>>,
}

impl FakeWindowSystem {
    pub fn block_popups(&self) {
        self.blocked.store(true, Ordering::SeqCst);
    }

    pub fn opened(&self) -> Vec<Arc<FakeWindow>> {
        self.opened.lock().clone()
    }

    pub fn window(&self, index: usize) -> Arc<FakeWindow> {
        self.opened.lock()[index].clone()
    }

    pub async fn wait_for_windows(&self, count: usize) -> eyre::Result<()> {
        wait_for(move || async move { self.opened.lock().len() >= count }, Duration::from_secs(5))
            .await
    }

    pub fn unload_hook_count(&self) -> usize {
        self.unload_hooks.lock().len()
    }

    /// The host page unloads.
    pub fn unload_page(&self) {
        for hook in self.unload_hooks.lock().iter() {
            hook();
        }
    }
}

impl WindowSystem for FakeWindowSystem {
    fn origin(&self) -> String {
        "https://shop.example".to_string()
    }

    fn screen(&self) -> ScreenMetrics {
        ScreenMetrics { width: 1920, height: 1080 }
    }

    fn open(&self, url: &Url, features: &WindowFeatures) -> Option<OpenedWindow> {
        if self.blocked.load(Ordering::SeqCst) {
            return None;
        }
        let (events, rx) = unbounded_channel();
        let window = Arc::new(FakeWindow {
            url: url.clone(),
            features: features.to_string(),
            closed: AtomicBool::new(false),
            focused: AtomicUsize::new(0),
            events,
        });
        self.opened.lock().push(window.clone());
        Some(OpenedWindow { window, events: rx })
    }

    fn on_page_unload(&self, hook: Box<dyn Fn() + Send + Sync>) {
        self.unload_hooks.lock().push(hook);
    }
}

/// What the fake signing agent knows and what it was asked.
#[derive(Debug, Default)]
pub struct AgentState {
    pub sessions: Mutex<Vec<SessionRecord>>,
    pub approved: Mutex<HashSet<B256>>,
    pub signature_requests: Mutex<Vec<Address>>,
}

/// Session signature the fake agent produces for `session`.
pub fn session_signature(session: Address) -> Bytes {
    Bytes::copy_from_slice(session.as_slice())
}

/// Starts a signing agent serving `state`.
pub fn spawn_agent(state: Arc<AgentState>) -> AgentClient {
    let (client, mut agent) = pair();
    tokio::spawn(async move {
        while let Some(frame) = agent.recv().await {
            let request: AgentRequest = serde_json::from_value(frame).unwrap();
            let reply = match request.command {
                AgentCommand::CheckApprove { tx_hash } => {
                    AgentReply::CheckApprove { is_approved: state.approved.lock().contains(&tx_hash) }
                }
                AgentCommand::GetSessions { user_account } => AgentReply::GetSessions {
                    sessions: state
                        .sessions
                        .lock()
                        .iter()
                        .filter(|s| s.user_account == user_account)
                        .cloned()
                        .collect(),
                },
                AgentCommand::GetSessionSignature { challenge, session_address, .. } => {
                    state.signature_requests.lock().push(session_address);
                    AgentReply::GetSessionSignature {
                        challenge,
                        signature: session_signature(session_address),
                    }
                }
                AgentCommand::CreateSession { user_account, allowed_addresses } => {
                    let mut sessions = state.sessions.lock();
                    let session_address = Address::repeat_byte(0xc0 + sessions.len() as u8);
                    sessions.push(SessionRecord {
                        session_address,
                        allowed_addresses,
                        user_account,
                        created_at: None,
                    });
                    AgentReply::CreateSession { public_key: format!("pub-{session_address}") }
                }
                AgentCommand::ApproveSession { .. } => AgentReply::ApproveSession { success: true },
                AgentCommand::SetApprove { tx_hash, is_approved } => {
                    let mut approved = state.approved.lock();
                    if is_approved {
                        approved.insert(tx_hash);
                    } else {
                        approved.remove(&tx_hash);
                    }
                    continue;
                }
            };
            let response = AgentResponse { id: request.id, reply };
            if agent.send(serde_json::to_value(response).unwrap()).is_err() {
                break;
            }
        }
    });
    AgentClient::new(client)
}

/// Passkey stand-in: signs with a marker followed by the digest.
pub struct FakeSigner;

pub fn passkey_signature(digest: B256) -> Bytes {
    [b"passkey".as_slice(), digest.as_slice()].concat().into()
}

#[async_trait]
impl CredentialSigner for FakeSigner {
    async fn sign(&self, auth_type: AuthType, credential_id: &str, digest: B256) -> Result<Bytes, BridgeError> {
        assert_eq!(auth_type, AuthType::WebAuthn);
        assert_eq!(credential_id, "credential-1");
        Ok(passkey_signature(digest))
    }
}

#[derive(Default)]
pub struct FakeChain {
    pub estimates: AtomicUsize,
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn estimate_gas(&self, _tx: &TransactionRequest) -> Result<U256, BridgeError> {
        self.estimates.fetch_add(1, Ordering::SeqCst);
        Ok(U256::from(90_000u64))
    }

    async fn gas_price(&self) -> Result<U256, BridgeError> {
        Ok(U256::from(GAS_PRICE))
    }
}

pub fn config() -> BridgeConfig {
    let mut config = BridgeConfig { wallet_url: "https://wallet.example".to_string(), ..Default::default() };
    config.paymaster.strategy = PaymasterStrategy::Subsidizing;
    config.paymaster.subsidizing_paymaster = Some(SPONSOR);
    config
}

/// A transfer from the test account to [`RECIPIENT`].
pub fn transfer() -> TransactionRequest {
    TransactionRequest {
        from: Some(ACCOUNT),
        to: Some(RECIPIENT),
        value: U256::from(1_000u64),
        gas_limit: Some(U256::from(100_000u64)),
        nonce: Some(3),
        chain_id: Some(280),
        ..Default::default()
    }
}

/// [`transfer`] as the fee resolver leaves it.
pub fn enriched_transfer() -> TransactionRequest {
    let mut tx = transfer();
    tx.gas_limit = Some(U256::from(130_000u64));
    tx.max_fee_per_gas = Some(U256::from(GAS_PRICE));
    tx.custom_data.gas_per_pubdata = Some(U256::from(50_000u64));
    tx.set_paymaster_params(Some(PaymasterFlow::General { inner_input: Bytes::new() }.into_params(SPONSOR)));
    tx
}

/// Both peers connected over an in-process port.
pub struct Harness {
    pub host: HostBridge,
    pub wallet: WalletBridge,
    pub windows: Arc<FakeWindowSystem>,
    pub agent: Arc<AgentState>,
    pub logins: Arc<Mutex<Vec<Address>>>,
    pub logouts: Arc<AtomicUsize>,
}

impl Harness {
    pub fn logged_in() -> Self {
        Self::build(true, TxDelivery::CrossWindow)
    }

    pub fn logged_out() -> Self {
        Self::build(false, TxDelivery::CrossWindow)
    }

    pub fn build(logged_in: bool, delivery: TxDelivery) -> Self {
        let store: Arc<dyn NonSensitiveStore> = Arc::new(MemoryStore::new());
        if logged_in {
            SavedAuth {
                auth_type: AuthType::WebAuthn,
                credential_id: "credential-1".to_string(),
                address: ACCOUNT,
            }
            .save(store.as_ref(), true);
        }

        let agent = Arc::new(AgentState::default());
        let wallet = WalletBridge::new(store, spawn_agent(agent.clone()), Arc::new(FakeSigner));
        let windows = Arc::new(FakeWindowSystem::default());
        let host = HostBridge::new(&config(), windows.clone(), delivery, Arc::new(FakeChain::default()))
            .unwrap();

        let logins = Arc::new(Mutex::new(Vec::new()));
        let logouts = Arc::new(AtomicUsize::new(0));
        let (host_port, wallet_port) = pair::<Value>();
        host.connect(
            host_port,
            {
                let logins = logins.clone();
                move |address| logins.lock().push(address)
            },
            {
                let logouts = logouts.clone();
                move || {
                    logouts.fetch_add(1, Ordering::SeqCst);
                }
            },
        );
        wallet.connect(wallet_port);

        Self { host, wallet, windows, agent, logins, logouts }
    }

    /// Adds a session for the test account that may sign for `allowed`.
    pub fn add_session(&self, session: Address, allowed: &[Address], created_at: Option<u64>) {
        self.agent.sessions.lock().push(SessionRecord {
            session_address: session,
            allowed_addresses: allowed.to_vec(),
            user_account: ACCOUNT,
            created_at,
        });
    }
}
