use std::{sync::Arc, time::Duration};

use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use wallet_bridge::{
    BridgeError, HostBridge,
    api::WalletMethod,
    host::{ApprovalMessage, PopupMode, PopupPurpose, TxDelivery},
    pair,
    platform::PopupWindow,
    rpc::{MethodHandler, RpcChannel, RpcError},
};

use crate::utils::{ACCOUNT, FakeChain, FakeWindowSystem, Harness, config, wait_for};

#[tokio::test]
async fn login_is_a_no_op_when_already_logged_in() -> eyre::Result<()> {
    crate::init_tracing();
    let harness = Harness::logged_in();

    harness.host.login().await?;
    assert!(harness.windows.opened().is_empty());
    assert_eq!(harness.host.get_address().await?, Some(ACCOUNT));
    Ok(())
}

#[tokio::test]
async fn login_opens_the_login_popup() -> eyre::Result<()> {
    let harness = Harness::logged_out();

    harness.host.login().await?;
    let windows = harness.windows.opened();
    assert_eq!(windows.len(), 1);
    let request = windows[0].request();
    assert_eq!(request.mode, Some(PopupMode::Login));
    assert_eq!(request.origin.as_deref(), Some("https://shop.example"));
    assert!(request.embedded);
    assert_eq!(windows[0].features, "height=650,width=400,top=215,left=760");
    Ok(())
}

/// A wallet frame that reports a fixed address and records what it is asked.
struct FixedAddressWallet {
    address: Option<Address>,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl MethodHandler for FixedAddressWallet {
    async fn handle(&self, method: &str, _params: Value) -> Result<Value, RpcError> {
        self.calls.lock().push(method.to_string());
        match WalletMethod::parse(method) {
            Some(WalletMethod::GetAddress) => Ok(serde_json::to_value(self.address).unwrap()),
            Some(WalletMethod::Login) => Ok(Value::Null),
            _ => Err(RpcError::method_not_found()),
        }
    }
}

#[tokio::test]
async fn zero_address_counts_as_logged_out() -> eyre::Result<()> {
    let windows = Arc::new(FakeWindowSystem::default());
    let host =
        HostBridge::new(&config(), windows.clone(), TxDelivery::CrossWindow, Arc::new(FakeChain::default()))?;
    let wallet = Arc::new(FixedAddressWallet { address: Some(Address::ZERO), calls: Mutex::default() });
    let (host_port, wallet_port) = pair::<Value>();
    host.connect(host_port, |_| {}, || {});
    let _wallet_channel = RpcChannel::open(wallet_port, &wallet);

    host.login().await?;
    let opened = windows.opened();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].request().mode, Some(PopupMode::Login));
    assert_eq!(wallet.calls.lock().as_slice(), ["getAddress", "login"]);
    Ok(())
}

#[test]
fn host_builds_with_native_fees_on_any_chain() -> eyre::Result<()> {
    let mut config = config();
    config.chain_id = 324;
    config.paymaster = Default::default();
    let windows = Arc::new(FakeWindowSystem::default());
    HostBridge::new(&config, windows, TxDelivery::CrossWindow, Arc::new(FakeChain::default()))?;
    Ok(())
}

#[tokio::test]
async fn at_most_one_popup_per_purpose() -> eyre::Result<()> {
    let harness = Harness::logged_out();

    harness.host.open_login_window()?;
    harness.host.open_login_window()?;
    harness.host.open_wallet_window()?;
    let windows = harness.windows.opened();
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].focus_count(), 2);

    // a different purpose gets its own window
    harness.host.open_no_funds_error_window()?;
    assert_eq!(harness.windows.opened().len(), 2);
    assert_eq!(harness.windows.window(1).request().mode, Some(PopupMode::ErrorNoFunds));

    // once closed, the next call opens a new one
    windows[0].user_close();
    harness.host.open_wallet_window()?;
    let windows = harness.windows.opened();
    assert_eq!(windows.len(), 3);
    assert_eq!(windows[2].request().mode, None);
    assert!(harness.host.popups().handle(PopupPurpose::Login).is_some());
    Ok(())
}

#[tokio::test]
async fn blocked_popups_fail_fast() {
    let harness = Harness::logged_out();
    harness.windows.block_popups();

    assert!(matches!(harness.host.open_login_window(), Err(BridgeError::WindowBlocked)));
    let err = harness.host.open_transaction_window(&Bytes::from(vec![0x71])).await.unwrap_err();
    assert!(matches!(err, BridgeError::WindowBlocked));
    assert!(!err.is_user_declined());
}

#[tokio::test]
async fn transaction_popup_is_replaced_for_a_new_request() -> eyre::Result<()> {
    let harness = Harness::logged_in();
    let tx_a = Bytes::from(vec![0x71, 0xaa]);
    let tx_b = Bytes::from(vec![0x71, 0xbb]);

    let host = harness.host.clone();
    let first = tokio::spawn({
        let tx_a = tx_a.clone();
        async move { host.open_transaction_window(&tx_a).await }
    });
    harness.windows.wait_for_windows(1).await?;
    let popup_a = harness.windows.window(0);
    assert_eq!(popup_a.request().transaction, Some(tx_a));
    popup_a.load();

    let host = harness.host.clone();
    let second = tokio::spawn({
        let tx_b = tx_b.clone();
        async move { host.open_transaction_window(&tx_b).await }
    });
    harness.windows.wait_for_windows(2).await?;
    let popup_b = harness.windows.window(1);
    assert_eq!(popup_b.request().transaction, Some(tx_b));

    // the stale popup was closed and its request cancelled
    assert!(popup_a.is_closed());
    assert!(matches!(first.await?, Err(BridgeError::NotApproved)));

    // an approval arriving from the stale popup reaches nobody
    popup_a.post(&ApprovalMessage::approved());
    popup_b.load();
    popup_b.post(&ApprovalMessage::approved().with_instant_signature(Bytes::from(vec![1, 2])));
    let approval = second.await??;
    assert_eq!(approval.instant_signature, Some(Bytes::from(vec![1, 2])));
    Ok(())
}

#[tokio::test]
async fn replacing_an_unloaded_popup_cancels_its_request() -> eyre::Result<()> {
    let harness = Harness::logged_in();

    let host = harness.host.clone();
    let first = tokio::spawn(async move { host.open_transaction_window(&Bytes::from(vec![0x71, 0xaa])).await });
    harness.windows.wait_for_windows(1).await?;

    // the first popup never finishes loading
    let host = harness.host.clone();
    let second = tokio::spawn(async move { host.open_transaction_window(&Bytes::from(vec![0x71, 0xbb])).await });
    harness.windows.wait_for_windows(2).await?;
    assert!(harness.windows.window(0).is_closed());

    let outcome = tokio::time::timeout(Duration::from_secs(5), first).await??;
    assert!(matches!(outcome, Err(BridgeError::NotApproved)));

    let popup = harness.windows.window(1);
    popup.load();
    popup.post(&ApprovalMessage::approved());
    assert_eq!(second.await??, Default::default());
    Ok(())
}

#[tokio::test]
async fn closing_the_popup_cancels() -> eyre::Result<()> {
    let harness = Harness::logged_in();

    let host = harness.host.clone();
    let pending = tokio::spawn(async move { host.open_transaction_window(&Bytes::from(vec![0x71])).await });
    harness.windows.wait_for_windows(1).await?;
    let popup = harness.windows.window(0);
    popup.load();
    popup.user_close();

    let outcome = tokio::time::timeout(Duration::from_secs(5), pending).await??;
    assert!(matches!(outcome, Err(BridgeError::NotApproved)));
    Ok(())
}

#[tokio::test]
async fn page_unload_closes_popups() -> eyre::Result<()> {
    let harness = Harness::logged_out();
    harness.host.open_login_window()?;
    harness.host.open_no_funds_error_window()?;
    harness.windows.window(0).user_close();
    harness.host.open_login_window()?;
    assert_eq!(harness.windows.unload_hook_count(), 1);

    harness.windows.unload_page();
    assert!(harness.windows.opened().iter().all(|window| window.is_closed()));
    Ok(())
}

#[tokio::test]
async fn wallet_reports_login_and_logout() -> eyre::Result<()> {
    let harness = Harness::logged_in();

    // a returning user is reported without any call from the host
    let logins = harness.logins.clone();
    wait_for(move || {
        let logins = logins.clone();
        async move { logins.lock().as_slice() == [ACCOUNT] }
    }, Duration::from_secs(5))
    .await?;

    harness.host.logout().await?;
    let logouts = harness.logouts.clone();
    wait_for(move || {
        let logouts = logouts.clone();
        async move { logouts.load(std::sync::atomic::Ordering::SeqCst) == 1 }
    }, Duration::from_secs(5))
    .await?;
    assert_eq!(harness.host.get_address().await?, None::<Address>);
    assert_eq!(harness.wallet.address(), None);
    Ok(())
}
