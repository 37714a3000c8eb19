//! End-to-end session behaviour against an in-process gateway.

use std::sync::Arc;
use std::time::Duration;

use tether_gateway::{
    ClientMode, Credential, Fleet, GatewayConnector, GatewayError, GatewaySettings,
    IdentityMaterial, Session, SessionProfile, SessionState,
};
use tether_test::{ConnectProxy, MockGateway, Step, TestFiles, init_test_logging};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(10);

fn profile(gateway: &MockGateway, token: &str) -> SessionProfile {
    let mut settings = GatewaySettings::new(gateway.url());
    settings.hello_timeout = Duration::from_secs(2);
    SessionProfile::new(
        Credential::new(token),
        Arc::new(IdentityMaterial::fixed(ClientMode::Native, "en-GB", 4242)),
        Arc::new(settings),
    )
}

fn new_session(
    gateway: &MockGateway,
    token: &str,
) -> (Session, mpsc::Receiver<tether_gateway::FatalSignal>) {
    let (tx, rx) = mpsc::channel(4);
    let session = Session::new(
        profile(gateway, token),
        Arc::new(GatewayConnector::new()),
        tx,
    );
    (session, rx)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn identify_carries_token_and_identity() {
    init_test_logging();
    let gateway = MockGateway::start(Vec::new()).await.unwrap();
    let (session, _fatal_rx) = new_session(&gateway, "tok-identify");

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Open);

    tokio::time::timeout(WAIT, async {
        while gateway.received_op(2).await.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let identify = gateway.received_op(2).await.remove(0);
    assert_eq!(identify["d"]["token"], "tok-identify");
    assert_eq!(identify["d"]["properties"]["system_locale"], "en-GB");
    assert_eq!(identify["d"]["properties"]["client_build_number"], 4242);
    session.close().await;
}

#[tokio::test]
async fn gateway_socket_through_connect_proxy() {
    init_test_logging();
    let gateway = MockGateway::start(Vec::new()).await.unwrap();
    let proxy = ConnectProxy::start().await.unwrap();
    let mut profile = profile(&gateway, "tok-proxied");
    profile.socket_proxy = Some(format!("http://{}", proxy.address()));

    let (tx, _fatal_rx) = mpsc::channel(1);
    let session = Session::new(profile, Arc::new(GatewayConnector::new()), tx);
    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Open);

    let requests = proxy.requests().await;
    assert_eq!(requests.len(), 1);
    let expected = format!("CONNECT {} HTTP/1.1\r\n", gateway.addr());
    assert!(requests[0].starts_with(&expected), "{}", requests[0]);

    wait_until(|| gateway.connections() == 1).await;
    tokio::time::timeout(WAIT, async {
        while gateway.received_op(2).await.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    session.close().await;
}

#[tokio::test]
async fn ipv6_gateway_url_connects() {
    init_test_logging();
    // Hosts without an IPv6 loopback cannot run this.
    let Ok(gateway) = MockGateway::bind("[::1]:0", Vec::new()).await else {
        return;
    };
    assert!(gateway.url().starts_with("ws://[::1]:"));
    let (session, _fatal_rx) = new_session(&gateway, "tok-ipv6");

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(gateway.connections(), 1);
    session.close().await;
}

#[tokio::test]
async fn close_4004_is_fatal_and_not_retried() {
    init_test_logging();
    let gateway = MockGateway::start(vec![vec![
        Step::hello(),
        Step::AwaitIdentify,
        Step::close(4004, "Authentication failed."),
    ]])
    .await
    .unwrap();
    let (session, mut fatal_rx) = new_session(&gateway, "tok-rejected");

    session.start().await.unwrap();
    let signal = tokio::time::timeout(WAIT, fatal_rx.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(signal.session_id, session.id());
    assert!(matches!(signal.error, GatewayError::AuthenticationRejected));
    assert_eq!(session.state(), SessionState::Fatal);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(gateway.connections(), 1);
}

#[tokio::test]
async fn other_close_codes_reconnect() {
    init_test_logging();
    let gateway = MockGateway::start(vec![vec![
        Step::hello(),
        Step::AwaitIdentify,
        Step::close(4000, "Unknown error"),
    ]])
    .await
    .unwrap();
    let (session, mut fatal_rx) = new_session(&gateway, "tok-reconnect");

    session.start().await.unwrap();
    wait_until(|| session.generation() == 1 && session.state() == SessionState::Open).await;

    assert_eq!(gateway.connections(), 2);
    assert!(session.is_receiving());
    assert!(fatal_rx.try_recv().is_err());
    session.close().await;
}

#[tokio::test]
async fn dropped_socket_reconnects() {
    init_test_logging();
    let gateway = MockGateway::start(vec![vec![
        Step::hello(),
        Step::AwaitIdentify,
        Step::Disconnect,
    ]])
    .await
    .unwrap();
    let (session, _fatal_rx) = new_session(&gateway, "tok-drop");

    session.start().await.unwrap();
    wait_until(|| session.generation() == 1 && session.is_receiving()).await;
    assert_eq!(gateway.connections(), 2);
    session.close().await;
}

#[tokio::test]
async fn server_reconnect_request_reconnects() {
    init_test_logging();
    let gateway = MockGateway::start(vec![vec![
        Step::hello(),
        Step::AwaitIdentify,
        Step::Send(serde_json::json!({ "op": 7, "d": null })),
        Step::Hold,
    ]])
    .await
    .unwrap();
    let (session, _fatal_rx) = new_session(&gateway, "tok-op7");

    session.start().await.unwrap();
    wait_until(|| session.generation() == 1 && session.is_receiving()).await;
    session.close().await;
}

#[tokio::test]
async fn missed_heartbeat_ack_reconnects() {
    init_test_logging();
    let gateway = MockGateway::start(vec![vec![
        Step::Hello { interval_ms: 50 },
        Step::AwaitIdentify,
        Step::Sleep(Duration::from_secs(30)),
    ]])
    .await
    .unwrap();
    let (session, mut fatal_rx) = new_session(&gateway, "tok-zombie");

    session.start().await.unwrap();
    wait_until(|| session.generation() == 1 && session.is_receiving()).await;
    assert!(fatal_rx.try_recv().is_err());
    session.close().await;
}

#[tokio::test]
async fn failed_reconnect_is_fatal() {
    init_test_logging();
    let gateway = MockGateway::start(vec![
        vec![Step::hello(), Step::AwaitIdentify, Step::close(4000, "")],
        vec![Step::close(4004, "Authentication failed.")],
    ])
    .await
    .unwrap();
    let (session, mut fatal_rx) = new_session(&gateway, "tok-reconnect-fails");

    session.start().await.unwrap();
    let signal = tokio::time::timeout(WAIT, fatal_rx.recv())
        .await
        .unwrap()
        .unwrap();

    match signal.error {
        GatewayError::ReconnectFailed { source } => {
            assert_eq!(source.close_code(), Some(4004));
        },
        other => panic!("expected ReconnectFailed, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Fatal);
    assert_eq!(gateway.connections(), 2);
}

#[tokio::test]
async fn missing_hello_fails_start() {
    init_test_logging();
    let gateway = MockGateway::start(vec![vec![Step::Hold]]).await.unwrap();
    let mut profile = profile(&gateway, "tok-silent");
    let mut settings = (*profile.settings).clone();
    settings.hello_timeout = Duration::from_millis(200);
    profile.settings = Arc::new(settings);

    let (tx, mut fatal_rx) = mpsc::channel(1);
    let session = Session::new(profile, Arc::new(GatewayConnector::new()), tx);

    let err = session.start().await.unwrap_err();
    assert!(matches!(err, GatewayError::HelloTimeout));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(fatal_rx.try_recv().is_err());
}

#[tokio::test]
async fn fleet_retires_rejected_sessions() {
    init_test_logging();
    let reject = || {
        vec![
            Step::hello(),
            Step::AwaitIdentify,
            Step::close(4004, "Authentication failed."),
        ]
    };
    let gateway = MockGateway::start(vec![reject(), reject()]).await.unwrap();
    let files = TestFiles::new();
    let retired = files.path("retired.txt");

    let profiles = vec![profile(&gateway, "tok-one"), profile(&gateway, "tok-two")];
    let fleet = Fleet::start(profiles, Arc::new(GatewayConnector::new()))
        .await
        .with_retired_file(&retired);
    let report = tokio::time::timeout(WAIT, fleet.run(std::future::pending()))
        .await
        .unwrap();

    assert_eq!(report.started, 2);
    assert_eq!(report.retired, 2);
    let content = std::fs::read_to_string(&retired).unwrap();
    assert!(content.contains("tok-one"));
    assert!(content.contains("tok-two"));
}
