//! Auth providers: what the wallet signs with once a user is logged in.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use alloy_primitives::{Address, B256, Bytes, hex, keccak256};
use async_trait::async_trait;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::{BridgeError, store::NonSensitiveStore};

/// The mechanism an account authenticates with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthType {
    /// Platform passkey.
    WebAuthn,
    /// Key held by the background signing agent, unlocked with a password.
    WorkerKey,
}

impl AuthType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WebAuthn => "ES256",
            Self::WorkerKey => "WorkerKey",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ES256" => Some(Self::WebAuthn),
            "WorkerKey" => Some(Self::WorkerKey),
            _ => None,
        }
    }
}

/// Something that can sign for a logged-in account.
#[async_trait]
pub trait AuthProvider: Send + Sync + fmt::Debug {
    /// Address of the smart account.
    fn address(&self) -> Address;

    fn auth_type(&self) -> AuthType;

    /// Signs a transaction digest.
    async fn sign_transaction(&self, digest: B256) -> Result<Bytes, BridgeError>;

    /// Forgets whatever the provider persisted.
    async fn logout(&self) -> Result<(), BridgeError>;
}

/// Produces signatures with a stored credential.
#[async_trait]
pub trait CredentialSigner: Send + Sync {
    async fn sign(
        &self,
        auth_type: AuthType,
        credential_id: &str,
        digest: B256,
    ) -> Result<Bytes, BridgeError>;
}

/// Login state persisted in the non-sensitive store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedAuth {
    pub auth_type: AuthType,
    pub credential_id: String,
    pub address: Address,
}

impl SavedAuth {
    pub const AUTH_TYPE_KEY: &'static str = "authType";
    pub const CREDENTIAL_ID_KEY: &'static str = "credentialId";
    pub const ADDRESS_KEY: &'static str = "address";
    pub const CONNECTED_KEY: &'static str = "connected";

    /// Reads the saved login. Only a login saved as connected, with every field present and
    /// readable, counts.
    pub fn load(store: &dyn NonSensitiveStore) -> Option<Self> {
        if store.get(Self::CONNECTED_KEY).as_deref() != Some("true") {
            return None;
        }
        let auth_type = AuthType::parse(&store.get(Self::AUTH_TYPE_KEY)?)?;
        let credential_id = store.get(Self::CREDENTIAL_ID_KEY)?;
        let address = store.get(Self::ADDRESS_KEY)?.parse().ok()?;
        Some(Self { auth_type, credential_id, address })
    }

    pub fn save(&self, store: &dyn NonSensitiveStore, connected: bool) {
        store.set(Self::AUTH_TYPE_KEY, self.auth_type.as_str());
        store.set(Self::CREDENTIAL_ID_KEY, &self.credential_id);
        store.set(Self::ADDRESS_KEY, &self.address.to_string());
        store.set(Self::CONNECTED_KEY, if connected { "true" } else { "false" });
    }

    pub fn clear(store: &dyn NonSensitiveStore) {
        for key in
            [Self::AUTH_TYPE_KEY, Self::CREDENTIAL_ID_KEY, Self::ADDRESS_KEY, Self::CONNECTED_KEY]
        {
            store.remove(key);
        }
    }
}

/// Auth provider restored from a [`SavedAuth`].
pub struct StoredAuthProvider {
    saved: SavedAuth,
    signer: Arc<dyn CredentialSigner>,
    store: Arc<dyn NonSensitiveStore>,
}

impl fmt::Debug for StoredAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredAuthProvider").field("saved", &self.saved).finish_non_exhaustive()
    }
}

impl StoredAuthProvider {
    pub fn new(
        saved: SavedAuth,
        signer: Arc<dyn CredentialSigner>,
        store: Arc<dyn NonSensitiveStore>,
    ) -> Self {
        Self { saved, signer, store }
    }

    /// Restores the provider saved in `store`, if any.
    pub fn restore(
        store: &Arc<dyn NonSensitiveStore>,
        signer: &Arc<dyn CredentialSigner>,
    ) -> Option<Self> {
        let saved = SavedAuth::load(store.as_ref())?;
        Some(Self::new(saved, signer.clone(), store.clone()))
    }

    pub fn saved(&self) -> &SavedAuth {
        &self.saved
    }
}

#[async_trait]
impl AuthProvider for StoredAuthProvider {
    fn address(&self) -> Address {
        self.saved.address
    }

    fn auth_type(&self) -> AuthType {
        self.saved.auth_type
    }

    async fn sign_transaction(&self, digest: B256) -> Result<Bytes, BridgeError> {
        self.signer.sign(self.saved.auth_type, &self.saved.credential_id, digest).await
    }

    async fn logout(&self) -> Result<(), BridgeError> {
        SavedAuth::clear(self.store.as_ref());
        Ok(())
    }
}

/// Phases of a login or signup, in the order they are reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginProgress {
    LoginAttempt,
    LoginSignatureVerification,
    LoginSuccess,
    LoginFail,
    SignupAttempt,
    SignupCredentialGeneration,
    SignupCredentialSuccess,
    SignupAccountGenerated,
    SignupAccountVerified,
    SignupSuccess,
    SignupFail,
}

impl LoginProgress {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LoginAttempt => "LOGIN_ATTEMPT",
            Self::LoginSignatureVerification => "LOGIN_SIGNATURE_VERIFICATION",
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::LoginFail => "LOGIN_FAIL",
            Self::SignupAttempt => "SIGNUP_ATTEMPT",
            Self::SignupCredentialGeneration => "SIGNUP_CREDENTIAL_GENERATION",
            Self::SignupCredentialSuccess => "SIGNUP_CREDENTIAL_SUCCESS",
            Self::SignupAccountGenerated => "SIGNUP_ACCOUNT_GENERATED",
            Self::SignupAccountVerified => "SIGNUP_ACCOUNT_VERIFIED",
            Self::SignupSuccess => "SIGNUP_SUCCESS",
            Self::SignupFail => "SIGNUP_FAIL",
        }
    }

    /// Whether no phase can follow this one.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::LoginSuccess | Self::LoginFail | Self::SignupSuccess | Self::SignupFail)
    }
}

/// Forwards progress to the wallet UI until a terminal phase has been reported.
#[derive(Debug)]
pub struct ProgressSink {
    tx: UnboundedSender<LoginProgress>,
    finished: AtomicBool,
}

impl ProgressSink {
    pub fn channel() -> (Self, UnboundedReceiver<LoginProgress>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx, finished: AtomicBool::new(false) }, rx)
    }

    /// Reports `phase`. Returns `false` if it was dropped because the flow already ended.
    pub fn emit(&self, phase: LoginProgress) -> bool {
        if self.finished.load(Ordering::Acquire) {
            trace!(phase = phase.name(), "dropping progress after terminal phase");
            return false;
        }
        if phase.is_terminal() && self.finished.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.tx.send(phase);
        true
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// Runs the interactive login and signup ceremonies.
///
/// A successful ceremony yields the login to persist; the wallet peer saves it and restores
/// its provider from the store like any returning login.
#[async_trait]
pub trait LoginManager: Send + Sync {
    /// Name of the auth mechanism, shown in the wallet UI.
    fn auth_method_name(&self) -> &str;

    fn is_password_required(&self) -> bool;

    async fn login(&self, email: &str, progress: &ProgressSink) -> Result<SavedAuth, BridgeError>;

    async fn signup(
        &self,
        email: &str,
        password: Option<&str>,
        progress: &ProgressSink,
    ) -> Result<SavedAuth, BridgeError>;
}

/// Identifies this device among a user's logins: the first four bytes of the user agent's
/// keccak hash, cached under `deviceId`.
pub fn device_id(store: &dyn NonSensitiveStore, user_agent: &str) -> String {
    const KEY: &str = "deviceId";
    if let Some(saved) = store.get(KEY) {
        return saved;
    }
    let id = hex::encode_prefixed(&keccak256(user_agent.as_bytes())[..4]);
    store.set(KEY, &id);
    id
}
