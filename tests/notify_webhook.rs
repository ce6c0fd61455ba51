use handle_scout::notify::{kind_color, WebhookNotifier};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_availability_alert_delivered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(serde_json::json!({
            "embeds": [{
                "title": "Username Available!",
                "description": "```zxqy```",
                "color": kind_color("4l"),
            }]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = WebhookNotifier::new(format!("{}/hook", server.uri())).unwrap();
    assert!(notifier.send_availability_alert("zxqy", "4l").await);
}

#[tokio::test]
async fn test_connectivity_test_accepts_ok() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = WebhookNotifier::new(server.uri()).unwrap();
    assert!(notifier.send_connectivity_test().await);
}

#[tokio::test]
async fn test_rejected_delivery_is_false() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let notifier = WebhookNotifier::new(server.uri()).unwrap();
    assert!(!notifier.send_availability_alert("abcd", "5c").await);
}

#[tokio::test]
async fn test_unreachable_webhook_is_false() {
    let notifier = WebhookNotifier::new("http://127.0.0.1:1/hook").unwrap();
    assert!(!notifier.send_connectivity_test().await);
}
