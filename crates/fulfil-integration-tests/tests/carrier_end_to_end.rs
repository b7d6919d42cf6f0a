//! Orchestrator driving the real HTTP carrier client against a simulated
//! carrier. Checks what goes over the wire as well as the account outcome.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use url::form_urlencoded;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fulfil_api::orchestration::{FulfillmentError, Orchestrator, RetryPolicy};
use fulfil_api::state::OrderBook;
use fulfil_carrier::{CarrierClient, CarrierConfig};
use fulfil_core::{Address, Amount, CodInfo, OrderDraft, OrderId, OrderItem, Parcel, UserId};
use fulfil_fees::FeeSchedule;
use fulfil_ledger::{InMemoryLedger, LedgerStore};
use fulfil_signing::{sign, CarrierParams};

const SECRET: &str = "e2e-secret";

fn address(name: &str, postal: &str) -> Address {
    Address {
        name: name.into(),
        phone: "0899999999".into(),
        province: "Chiang Mai".into(),
        city: "Mueang".into(),
        district: None,
        postal_code: postal.into(),
        detail: "12 Nimman Rd".into(),
    }
}

fn draft(user: UserId) -> OrderDraft {
    OrderDraft {
        user_id: user,
        sender: address("Warehouse", "50200"),
        recipient: address("Customer", "50000"),
        parcel: Parcel {
            weight_grams: 1_000,
            length_cm: 20,
            width_cm: 15,
            height_cm: 10,
        },
        cod: CodInfo::collect(Amount::from_major(500)),
        insured: false,
        declared_value: None,
        service_id: None,
        items: vec![OrderItem {
            name: "Mug".into(),
            quantity: 2,
        }],
        remark: Some("fragile".into()),
    }
}

async fn setup(server: &MockServer) -> (Orchestrator, Arc<InMemoryLedger>, UserId) {
    let config = CarrierConfig::local_mock(&server.uri(), "AA0001", SECRET).unwrap();
    let client = CarrierClient::new(config).unwrap();
    let ledger = Arc::new(InMemoryLedger::new());
    let user = UserId::new();
    ledger
        .deposit(user, Amount::from_major(200), "top-up")
        .await
        .unwrap();
    let orch = Orchestrator::new(
        ledger.clone(),
        Arc::new(client),
        Arc::new(FeeSchedule::default()),
        OrderBook::in_memory(),
    )
    .with_retry(RetryPolicy::new(2).with_base_delay(Duration::from_millis(1)));
    (orch, ledger, user)
}

fn form_pairs(body: &[u8]) -> Vec<(String, String)> {
    form_urlencoded::parse(body).into_owned().collect()
}

#[tokio::test]
async fn shipped_order_sends_signed_reference_and_debits_fee() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/open/v3/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 1,
            "message": "success",
            "data": { "pno": "TH20011A2B3C" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (orch, ledger, user) = setup(&server).await;
    let id = OrderId::new();
    let outcome = orch.fulfil(id, draft(user)).await.unwrap();

    // 30 base + 20 COD minimum + 25 platform
    assert_eq!(outcome.order.total_fee, Amount::from_major(75));
    assert_eq!(outcome.tracking_number(), Some("TH20011A2B3C"));
    assert_eq!(
        ledger.balance(user).await.unwrap(),
        Amount::from_major(125)
    );

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let pairs = form_pairs(&requests[0].body);
    let field = |name: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    };
    assert_eq!(field("outTradeNo"), Some(id.out_trade_no()));
    assert_eq!(field("mchId").as_deref(), Some("AA0001"));
    assert_eq!(field("codAmount").as_deref(), Some("50000"));
    assert!(field("subItemTypes").is_some());

    // Everything before the signature is the signed field set.
    let sign_at = pairs.iter().position(|(k, _)| k == "sign").unwrap();
    let mut signed = CarrierParams::new();
    for (k, v) in &pairs[..sign_at] {
        signed.insert(k.as_str(), v.as_str());
    }
    assert_eq!(pairs[sign_at].1, sign(&signed, SECRET).unwrap());
}

#[tokio::test]
async fn carrier_rejection_over_http_rolls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/open/v3/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 1002,
            "message": "dstPostalCode not serviceable",
            "data": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (orch, ledger, user) = setup(&server).await;
    let err = orch.fulfil(OrderId::new(), draft(user)).await.unwrap_err();

    assert!(matches!(err, FulfillmentError::CarrierRejected { .. }));
    assert!(err.to_string().contains("not serviceable"), "{err}");
    assert_eq!(
        ledger.balance(user).await.unwrap(),
        Amount::from_major(200)
    );
}

#[tokio::test]
async fn carrier_http_error_is_not_retried_and_rolls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/open/v3/orders"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .expect(1)
        .mount(&server)
        .await;

    let (orch, ledger, user) = setup(&server).await;
    let err = orch.fulfil(OrderId::new(), draft(user)).await.unwrap_err();

    assert!(matches!(err, FulfillmentError::CarrierRejected { .. }));
    assert_eq!(
        ledger.balance(user).await.unwrap(),
        Amount::from_major(200)
    );
}

#[tokio::test]
async fn gateway_unavailable_is_retried_with_same_reference() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/open/v3/orders"))
        .respond_with(ResponseTemplate::new(503).set_body_string("service unavailable"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/open/v3/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 1,
            "message": "success",
            "data": { "pno": "TH20011RETRY" }
        })))
        .mount(&server)
        .await;

    let (orch, ledger, user) = setup(&server).await;
    let id = OrderId::new();
    let outcome = orch.fulfil(id, draft(user)).await.unwrap();

    assert_eq!(outcome.tracking_number(), Some("TH20011RETRY"));
    assert_eq!(
        ledger.balance(user).await.unwrap(),
        Amount::from_major(125)
    );
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        let pairs = form_pairs(&request.body);
        assert!(pairs
            .iter()
            .any(|(k, v)| k == "outTradeNo" && *v == id.out_trade_no()));
    }
}

#[tokio::test]
async fn persistent_bad_gateway_rolls_back_as_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/open/v3/orders"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(2)
        .mount(&server)
        .await;

    let (orch, ledger, user) = setup(&server).await;
    let err = orch.fulfil(OrderId::new(), draft(user)).await.unwrap_err();

    assert!(matches!(err, FulfillmentError::CarrierTransport { .. }));
    assert_eq!(
        ledger.balance(user).await.unwrap(),
        Amount::from_major(200)
    );
}
