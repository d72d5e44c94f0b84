use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use wallet_bridge::{
    BridgeError, WalletBridge,
    agent::SessionRecord,
    api::{SessionCreationParams, WalletApi},
    pair,
    rpc::{MethodHandler, RpcChannel, RpcError},
    store::MemoryStore,
    wallet::auth::{AuthType, LoginManager, LoginProgress, ProgressSink, SavedAuth},
};

use crate::utils::{
    ACCOUNT, FakeSigner, Harness, RECIPIENT, session_signature, spawn_agent, transfer,
};

#[tokio::test]
async fn sessions_are_created_through_the_host() -> eyre::Result<()> {
    crate::init_tracing();
    let harness = Harness::logged_in();

    let params = SessionCreationParams { allowed_addresses: vec![RECIPIENT] };
    let session = Address::repeat_byte(0xc0);
    let public_key = harness.host.create_session(&params).await?;
    assert_eq!(public_key, format!("pub-{session}"));
    assert!(harness.host.approve_session(&public_key).await?);

    let sessions = harness.host.get_local_sessions().await?.unwrap_or_default();
    assert_eq!(
        sessions,
        [SessionRecord {
            session_address: session,
            allowed_addresses: vec![RECIPIENT],
            user_account: ACCOUNT,
            created_at: None,
        }]
    );

    // the new session now covers transfers to the recipient
    let signed = harness.host.sign_transaction(transfer()).await?;
    assert_eq!(signed, transfer().with_custom_signature(session_signature(session)).serialize()?);
    assert!(harness.windows.opened().is_empty());
    Ok(())
}

#[tokio::test]
async fn session_calls_require_a_login() -> eyre::Result<()> {
    let harness = Harness::logged_out();

    assert_eq!(harness.host.get_address().await?, None);
    let params = SessionCreationParams { allowed_addresses: vec![RECIPIENT] };
    assert!(matches!(
        harness.host.create_session(&params).await,
        Err(BridgeError::NotLoggedIn)
    ));
    assert!(matches!(harness.host.get_local_sessions().await, Err(BridgeError::NotLoggedIn)));
    assert!(harness.agent.sessions.lock().is_empty());
    Ok(())
}

/// Completes every ceremony for [`ACCOUNT`], reporting the usual phases.
struct PasskeyLogins;

#[async_trait]
impl LoginManager for PasskeyLogins {
    fn auth_method_name(&self) -> &str {
        "Passkey"
    }

    fn is_password_required(&self) -> bool {
        false
    }

    async fn login(&self, email: &str, progress: &ProgressSink) -> Result<SavedAuth, BridgeError> {
        assert_eq!(email, "alice@example.com");
        progress.emit(LoginProgress::LoginAttempt);
        progress.emit(LoginProgress::LoginSignatureVerification);
        progress.emit(LoginProgress::LoginSuccess);
        Ok(saved_login())
    }

    async fn signup(
        &self,
        _email: &str,
        password: Option<&str>,
        progress: &ProgressSink,
    ) -> Result<SavedAuth, BridgeError> {
        assert_eq!(password, None);
        progress.emit(LoginProgress::SignupAttempt);
        progress.emit(LoginProgress::SignupCredentialGeneration);
        progress.emit(LoginProgress::SignupFail);
        Err(BridgeError::NotLoggedIn)
    }
}

fn saved_login() -> SavedAuth {
    SavedAuth {
        auth_type: AuthType::WebAuthn,
        credential_id: "credential-1".to_string(),
        address: ACCOUNT,
    }
}

#[tokio::test]
async fn login_ceremony_reaches_the_host() -> eyre::Result<()> {
    let harness = Harness::logged_out();
    let (progress, mut phases) = ProgressSink::channel();

    let address = harness.wallet.login_with(&PasskeyLogins, "alice@example.com", &progress).await?;
    assert_eq!(address, ACCOUNT);
    assert_eq!(harness.logins.lock().as_slice(), [ACCOUNT]);
    assert_eq!(harness.host.get_address().await?, Some(ACCOUNT));
    assert_eq!(SavedAuth::load(harness.wallet.store().as_ref()), Some(saved_login()));

    // nothing is reported after the terminal phase
    assert!(progress.is_finished());
    assert!(!progress.emit(LoginProgress::LoginFail));
    drop(progress);
    let mut seen = Vec::new();
    while let Some(phase) = phases.recv().await {
        seen.push(phase.name());
    }
    assert_eq!(seen, ["LOGIN_ATTEMPT", "LOGIN_SIGNATURE_VERIFICATION", "LOGIN_SUCCESS"]);
    Ok(())
}

#[tokio::test]
async fn failed_signup_leaves_the_wallet_logged_out() -> eyre::Result<()> {
    let harness = Harness::logged_out();
    let (progress, _phases) = ProgressSink::channel();

    let outcome = harness.wallet.signup_with(&PasskeyLogins, "bob@example.com", None, &progress).await;
    assert!(matches!(outcome, Err(BridgeError::NotLoggedIn)));
    assert!(progress.is_finished());
    assert_eq!(harness.wallet.address(), None);
    assert!(harness.logins.lock().is_empty());
    Ok(())
}

/// Records the login notifications a wallet sends to its host.
#[derive(Default)]
struct RecordingHost {
    logins: Mutex<Vec<Address>>,
}

#[async_trait]
impl MethodHandler for RecordingHost {
    async fn handle(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        if method == "onLoginCompleted" {
            let address = serde_json::from_value(params)
                .map_err(|err| RpcError::invalid_params(err.to_string()))?;
            self.logins.lock().push(address);
        }
        Ok(Value::Null)
    }
}

#[tokio::test]
async fn login_in_another_window_is_relayed() -> eyre::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let wallet = WalletBridge::new(
        store.clone(),
        spawn_agent(Default::default()),
        Arc::new(FakeSigner),
    );
    let host = Arc::new(RecordingHost::default());
    let (host_port, wallet_port) = pair::<Value>();
    let api = WalletApi::new(Arc::new(RpcChannel::open(host_port, &host)));
    wallet.connect(wallet_port);

    // nothing saved yet: the relay is silent
    api.on_login_completed_parent().await?;
    assert!(host.logins.lock().is_empty());
    assert_eq!(api.get_address().await?, None);

    // the login popup shares the wallet origin's storage
    saved_login().save(store.as_ref(), true);
    api.on_login_completed_parent().await?;
    assert_eq!(host.logins.lock().as_slice(), [ACCOUNT]);
    assert_eq!(wallet.address(), Some(ACCOUNT));

    Ok(())
}
