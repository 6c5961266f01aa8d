// ===============================
// tests/order_flow.rs
// ===============================
//
// Alur penuh lewat MockTransport: resolve asset -> build -> sign -> POST /exchange.
//
use std::sync::Arc;

use ethers::types::{Signature, U256};
use hl_loop_rust::config::Network;
use hl_loop_rust::domain::{Action, SignedEnvelope, Tif};
use hl_loop_rust::gateway::{MockTransport, EXCHANGE_PATH, INFO_PATH};
use hl_loop_rust::recorder::Journal;
use hl_loop_rust::signer::l1_message;
use hl_loop_rust::trader::{LimitOrder, Trader};
use hl_loop_rust::wallet::{KeyWallet, WalletProvider};
use hl_loop_rust::Error;

// HYPE tidak ada di universe ini -> pakai fallback index
const META_WITHOUT_HYPE: &str = r#"[{"universe":[{"name":"BTC","szDecimals":5}]},[{"markPx":"65000.0"}]]"#;
const META_WITH_HYPE: &str =
    r#"[{"universe":[{"name":"BTC","szDecimals":5},{"name":"HYPE","szDecimals":2}]},[{"markPx":"65000.0"},{"markPx":"10.0"}]]"#;

fn buy_one_hype_at_ten() -> LimitOrder {
    LimitOrder {
        coin: "HYPE".into(),
        is_buy: true,
        price: "10".into(),
        size: "1".into(),
        reduce_only: false,
        tif: Tif::Gtc,
        cloid: None,
    }
}

fn recover(env: &SignedEnvelope) -> ethers::types::Address {
    let sig = Signature {
        r: U256::from_str_radix(&env.signature.r[2..], 16).unwrap(),
        s: U256::from_str_radix(&env.signature.s[2..], 16).unwrap(),
        v: env.signature.v,
    };
    let msg = l1_message(&env.action, env.nonce).unwrap();
    sig.recover(msg.as_str()).unwrap()
}

#[tokio::test]
async fn limit_buy_via_fallback_index_is_signed_and_accepted() {
    let t = Arc::new(MockTransport::new());
    t.push_reply(200, META_WITHOUT_HYPE).push_reply(
        200,
        r#"{"status":"ok","response":{"type":"order","data":{"statuses":[{"resting":{"oid":77}}]}}}"#,
    );
    let wallet = KeyWallet::random(42161);
    let me = wallet.address();
    let trader = Trader::new(wallet, Network::Mainnet, t.clone(), Some(135), Journal::disabled());

    let resp = trader.place_limit_order(&buy_one_hype_at_ten()).await.unwrap();
    assert!(resp.is_ok());

    let reqs = t.requests();
    assert_eq!(reqs.len(), 2);
    assert_eq!(reqs[0].0, INFO_PATH);
    assert_eq!(reqs[1].0, EXCHANGE_PATH);

    let env: SignedEnvelope = serde_json::from_str(&reqs[1].1).unwrap();
    assert_eq!(env.vault_address, None);
    match &env.action {
        Action::Order(bulk) => {
            assert_eq!(bulk.orders.len(), 1);
            assert_eq!(bulk.orders[0].a, 135);
            assert_eq!(bulk.orders[0].p, "10");
            assert_eq!(bulk.orders[0].s, "1");
        }
        other => panic!("unexpected action {other:?}"),
    }

    let expected = format!(
        r#"{{"action":{{"type":"order","orders":[{{"a":135,"b":true,"p":"10","s":"1","r":false,"t":{{"limit":{{"tif":"Gtc"}}}}}}],"grouping":"na"}},"nonce":{},"vaultAddress":null}}"#,
        env.nonce
    );
    assert_eq!(l1_message(&env.action, env.nonce).unwrap(), expected);
    assert_eq!(recover(&env), me);
}

#[tokio::test]
async fn consecutive_orders_get_increasing_nonces() {
    let t = Arc::new(MockTransport::new());
    let ok = r#"{"status":"ok","response":{"type":"order","data":{"statuses":[{"resting":{"oid":1}}]}}}"#;
    t.push_reply(200, META_WITH_HYPE).push_reply(200, ok).push_reply(200, ok);
    let trader = Trader::new(KeyWallet::random(42161), Network::Testnet, t.clone(), None, Journal::disabled());

    trader.place_limit_order(&buy_one_hype_at_ten()).await.unwrap();
    // index sudah di-cache, tidak ada query meta lagi
    trader.place_limit_order(&buy_one_hype_at_ten()).await.unwrap();

    let nonces: Vec<u64> = t
        .requests()
        .iter()
        .filter(|(p, _)| p == EXCHANGE_PATH)
        .map(|(_, b)| serde_json::from_str::<SignedEnvelope>(b).unwrap().nonce)
        .collect();
    assert_eq!(t.requests().len(), 3);
    assert_eq!(nonces.len(), 2);
    assert!(nonces[1] > nonces[0]);
}

#[tokio::test]
async fn venue_error_reply_surfaces_message() {
    let t = Arc::new(MockTransport::new());
    t.push_reply(200, META_WITHOUT_HYPE)
        .push_reply(200, r#"{"status":"err","response":"User or API Wallet does not exist."}"#);
    let trader = Trader::new(KeyWallet::random(42161), Network::Mainnet, t, Some(135), Journal::disabled());

    match trader.place_limit_order(&buy_one_hype_at_ten()).await {
        Err(Error::VenueRejected(msg)) => assert_eq!(msg, "User or API Wallet does not exist."),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_price_never_reaches_the_venue() {
    let t = Arc::new(MockTransport::new());
    t.push_reply(200, META_WITHOUT_HYPE);
    let trader = Trader::new(KeyWallet::random(42161), Network::Mainnet, t.clone(), Some(135), Journal::disabled());

    let mut bad = buy_one_hype_at_ten();
    bad.price = "abc".into();
    assert!(matches!(trader.place_limit_order(&bad).await, Err(Error::InvalidNumericInput(_))));
    assert!(t.requests().iter().all(|(p, _)| p != EXCHANGE_PATH));
}
