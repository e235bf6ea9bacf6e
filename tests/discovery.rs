mod common;

use std::time::Duration;

use common::{MockTransport, SECRET, Scripted, frame};
use rainbird_protocol::core::{Error, FailureCategory};
use rainbird_protocol::crypto::SharedSecret;
use rainbird_protocol::transport::{
    Discovery, ProbeCandidate, ProbeOrder, Scheme, TlsPolicy, TransportBinding,
};

fn discovery(transport: &std::sync::Arc<MockTransport>) -> Discovery {
    Discovery::new(transport.clone())
}

fn probed(transport: &MockTransport) -> Vec<(Scheme, TlsPolicy)> {
    transport
        .requests()
        .iter()
        .map(|r| (r.binding.scheme(), r.binding.tls()))
        .collect()
}

#[tokio::test]
async fn test_http_only_controller() {
    let transport = MockTransport::new();
    transport.push_all([
        Scripted::Fail(FailureCategory::ConnectionRefused),
        Scripted::Fail(FailureCategory::ConnectionRefused),
        frame("82000A0103"),
    ]);

    let (binding, model) = discovery(&transport)
        .discover_with_model("10.0.0.5", &SharedSecret::new(SECRET))
        .await
        .unwrap();
    assert_eq!(binding.url(), "http://10.0.0.5/stick");
    assert_eq!(model.unwrap().model_id, 0x000A);
    assert_eq!(
        probed(&transport),
        vec![
            (Scheme::Https, TlsPolicy::Strict),
            (Scheme::Https, TlsPolicy::RelaxedLocal),
            (Scheme::Http, TlsPolicy::Strict),
        ]
    );
    for request in transport.requests() {
        assert_eq!(request.method, "tunnelSip");
        assert_eq!(request.data(), "02");
    }
}

#[tokio::test]
async fn test_self_signed_controller() {
    let transport = MockTransport::new();
    transport.push_all([
        Scripted::Fail(FailureCategory::CertificateRejected),
        frame("8200070209"),
    ]);

    let binding = discovery(&transport)
        .discover("controller.lan", &SharedSecret::new(SECRET))
        .await
        .unwrap();
    assert_eq!(binding.scheme(), Scheme::Https);
    assert_eq!(binding.tls(), TlsPolicy::RelaxedLocal);
    assert_eq!(transport.requests().len(), 2);
}

#[tokio::test]
async fn test_wrong_password_stops_discovery() {
    let transport = MockTransport::new();
    transport.push_all([Scripted::Status(403), frame("82000A0103")]);

    let err = discovery(&transport)
        .discover("10.0.0.5", &SharedSecret::new(SECRET))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailure));
    assert_eq!(transport.requests().len(), 1);
    assert_eq!(transport.remaining(), 1);
}

#[tokio::test]
async fn test_exhausted_lists_every_attempt() {
    let transport = MockTransport::new();
    transport.push_all([
        Scripted::Fail(FailureCategory::CertificateRejected),
        Scripted::Fail(FailureCategory::RelaxedTlsFailed),
        Scripted::Fail(FailureCategory::ConnectionRefused),
    ]);

    match discovery(&transport)
        .discover("10.0.0.5", &SharedSecret::new(SECRET))
        .await
    {
        Err(Error::DiscoveryExhausted { host, attempts }) => {
            assert_eq!(host, "10.0.0.5");
            let categories: Vec<_> = attempts.iter().map(|a| a.category).collect();
            assert_eq!(
                categories,
                vec![
                    FailureCategory::CertificateRejected,
                    FailureCategory::RelaxedTlsFailed,
                    FailureCategory::ConnectionRefused,
                ]
            );
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_explicit_host_sends_nothing() {
    let transport = MockTransport::new();
    let (binding, model) = discovery(&transport)
        .discover_with_model("https://10.0.0.5/stick", &SharedSecret::new(SECRET))
        .await
        .unwrap();
    assert_eq!(
        binding,
        TransportBinding::local("10.0.0.5", Scheme::Https, TlsPolicy::Strict).unwrap()
    );
    assert!(model.is_none());
    assert!(transport.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_probe_timeout_is_terminal() {
    let transport = MockTransport::new();
    transport.push_all([Scripted::Stall, frame("82000A0103")]);

    let err = discovery(&transport)
        .with_probe_timeout(Duration::from_secs(2))
        .discover("10.0.0.5", &SharedSecret::new(SECRET))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(FailureCategory::Timeout)));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_custom_order_http_first() {
    let transport = MockTransport::new();
    transport.push(frame("82000A0103"));

    let order = ProbeOrder::new(vec![
        ProbeCandidate::new(Scheme::Http, TlsPolicy::Strict),
        ProbeCandidate::new(Scheme::Https, TlsPolicy::Strict),
    ])
    .unwrap();
    let binding = discovery(&transport)
        .with_order(order)
        .discover("10.0.0.5", &SharedSecret::new(SECRET))
        .await
        .unwrap();
    assert_eq!(binding.scheme(), Scheme::Http);
    assert_eq!(probed(&transport), vec![(Scheme::Http, TlsPolicy::Strict)]);
}
