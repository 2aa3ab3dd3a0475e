mod util;

use axum::http::StatusCode;
use spacedrop::{confirm::ConfirmSettings, policy_store::Mode};
use std::{fs, sync::atomic::Ordering, time::Duration};
use tower::ServiceExt;
use util::{
    json_body, multipart_request, no_prompts, policy, settle, FixedResolver, Part, Script,
    TestHost,
};

const OWNER_IP: &str = "100.64.0.1";
const FRIEND_IP: &str = "100.64.0.7";
const STRANGER_IP: &str = "100.64.0.99";

fn resolver() -> FixedResolver {
    FixedResolver::default()
        .with(OWNER_IP, 42)
        .with(FRIEND_IP, 7)
}

#[tokio::test]
async fn owner_link_opens_without_prompt() {
    let host = TestHost::new(
        policy(Mode::Personal, 42, &[]),
        ConfirmSettings::default(),
        resolver(),
        Script::Decline,
    );

    let resp = host
        .router_from(OWNER_IP)
        .oneshot(multipart_request(
            "/drop",
            &[Part::Text("text", "https://example.com/x")],
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["ok"], true);
    assert_eq!(v["action"], "opened_url");
    assert_eq!(v["url"], "https://example.com/x");
    assert_eq!(v["opened"], true);

    assert_eq!(host.opener.opened(), vec!["https://example.com/x".to_string()]);
    assert_eq!(host.prompt.calls(), 0);

    settle(|| !host.notifier.sent().is_empty()).await;
    assert_eq!(
        host.notifier.sent(),
        vec![("Opening link".to_string(), "example.com".to_string())]
    );
}

#[tokio::test]
async fn stranger_in_personal_mode_is_unauthorized() {
    let host = TestHost::new(
        policy(Mode::Personal, 42, &[]),
        ConfirmSettings::default(),
        resolver(),
        Script::Accept,
    );

    let resp = host
        .router_from(STRANGER_IP)
        .oneshot(multipart_request(
            "/drop",
            &[Part::Text("text", "https://example.com/x")],
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let v = json_body(resp).await;
    assert_eq!(v["ok"], false);
    assert_eq!(v["error"], "Sender not allowed (UserID=None) in mode PERSONAL");
    assert_eq!(v["details"]["mode"], "PERSONAL");
    assert!(host.opener.opened().is_empty());
    assert_eq!(host.prompt.calls(), 0);
}

#[tokio::test]
async fn off_mode_rejects_the_owner_too() {
    let host = TestHost::new(
        policy(Mode::Off, 42, &[]),
        no_prompts(),
        resolver(),
        Script::Accept,
    );

    let resp = host
        .router_from(OWNER_IP)
        .oneshot(multipart_request("/drop", &[Part::Text("text", "hi")]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let v = json_body(resp).await;
    assert_eq!(v["details"]["user_id"], 42);
}

#[tokio::test]
async fn declined_prompt_is_forbidden_and_has_no_effect() {
    let host = TestHost::new(
        policy(Mode::ContactsOnly, 42, &[7]),
        ConfirmSettings::default(),
        resolver(),
        Script::Decline,
    );

    let resp = host
        .router_from(FRIEND_IP)
        .oneshot(multipart_request(
            "/drop",
            &[Part::File("file", "photo.jpg", b"jpeg bytes")],
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let v = json_body(resp).await;
    assert_eq!(v["error"], "Declined by user (confirmation dialog)");
    assert_eq!(v["details"]["reason"], "user");
    assert_eq!(host.prompt.calls(), 1);
    assert_eq!(
        host.prompt.last_request().unwrap().message,
        "Incoming item from UserID 7. Accept?"
    );
    assert_eq!(fs::read_dir(host.downloads()).unwrap().count(), 0);
}

#[tokio::test]
async fn failing_prompt_is_forbidden() {
    let host = TestHost::new(
        policy(Mode::Everyone, 42, &[]),
        ConfirmSettings::default(),
        resolver(),
        Script::Fail,
    );

    let resp = host
        .router_from(STRANGER_IP)
        .oneshot(multipart_request(
            "/drop",
            &[Part::Text("text", "https://example.com")],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let v = json_body(resp).await;
    assert_eq!(v["details"]["reason"], "prompt_failed");
    assert!(host.opener.opened().is_empty());
}

#[tokio::test]
async fn accepted_file_is_saved_with_unique_names() {
    let host = TestHost::new(
        policy(Mode::Everyone, 42, &[]),
        ConfirmSettings::default(),
        resolver(),
        Script::Accept,
    );

    let mut saved = Vec::new();
    for body in [&b"first"[..], &b"second"[..]] {
        let resp = host
            .router_from(STRANGER_IP)
            .oneshot(multipart_request(
                "/drop",
                &[Part::File("file", "photo.jpg", body)],
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v = json_body(resp).await;
        assert_eq!(v["action"], "saved_file");
        assert_eq!(v["length"], body.len());
        assert_eq!(v["mode"], "EVERYONE");
        assert!(v["user_id"].is_null());
        assert_eq!(v["sha256"].as_str().unwrap().len(), 64);
        saved.push(v["saved_as"].as_str().unwrap().to_string());
    }

    assert_eq!(saved[0], host.downloads().join("photo.jpg").to_string_lossy());
    assert_eq!(
        saved[1],
        host.downloads().join("photo (1).jpg").to_string_lossy()
    );
    assert_eq!(fs::read(host.downloads().join("photo (1).jpg")).unwrap(), b"second");
    assert_eq!(host.prompt.calls(), 2);
    assert_eq!(
        host.prompt.last_request().unwrap().message,
        "Unknown sender (no UserID). Accept incoming item?"
    );
}

#[tokio::test]
async fn uploaded_path_components_are_stripped() {
    let host = TestHost::new(
        policy(Mode::Everyone, 42, &[]),
        no_prompts(),
        resolver(),
        Script::Decline,
    );

    let resp = host
        .router_from(OWNER_IP)
        .oneshot(multipart_request(
            "/drop",
            &[Part::File("file", "../../escape.sh", b"#!/bin/sh")],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(host.downloads().join("escape.sh").is_file());
    assert!(!host.dir.path().join("escape.sh").exists());
}

#[tokio::test]
async fn webloc_upload_opens_its_link() {
    let host = TestHost::new(
        policy(Mode::Personal, 42, &[]),
        no_prompts(),
        resolver(),
        Script::Decline,
    );

    let resp = host
        .router_from(OWNER_IP)
        .oneshot(multipart_request(
            "/drop",
            &[Part::File("file", "link.webloc", b"https://example.org")],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = json_body(resp).await;
    assert_eq!(v["action"], "opened_url");
    assert_eq!(host.opener.opened(), vec!["https://example.org".to_string()]);
    assert_eq!(fs::read_dir(host.downloads()).unwrap().count(), 0);
}

#[tokio::test]
async fn plain_text_without_file_is_a_bad_request() {
    let host = TestHost::new(
        policy(Mode::Personal, 42, &[]),
        no_prompts(),
        resolver(),
        Script::Decline,
    );

    let resp = host
        .router_from(OWNER_IP)
        .oneshot(multipart_request("/drop", &[Part::Text("text", "hello world")]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v = json_body(resp).await;
    assert_eq!(
        v["error"],
        "Text is not an http(s) link and no file was provided"
    );
}

#[tokio::test]
async fn empty_form_is_a_bad_request() {
    let host = TestHost::new(
        policy(Mode::Personal, 42, &[]),
        no_prompts(),
        resolver(),
        Script::Decline,
    );

    let resp = host
        .router_from(OWNER_IP)
        .oneshot(multipart_request(
            "/drop",
            &[Part::File("file", "", b""), Part::Text("text", "")],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v = json_body(resp).await;
    assert_eq!(v["error"], "No content provided");
}

#[tokio::test]
async fn failed_open_is_a_bad_gateway() {
    let host = TestHost::new(
        policy(Mode::Personal, 42, &[]),
        no_prompts(),
        resolver(),
        Script::Decline,
    );
    host.opener.fail.store(true, Ordering::SeqCst);

    let resp = host
        .router_from(OWNER_IP)
        .oneshot(multipart_request(
            "/drop",
            &[Part::Text("text", "https://example.com/broken")],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let v = json_body(resp).await;
    assert_eq!(v["ok"], false);
    assert_eq!(v["details"]["opened"], false);
    assert_eq!(v["details"]["url"], "https://example.com/broken");
    assert_eq!(fs::read_dir(host.downloads()).unwrap().count(), 0);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let host = TestHost::with_limit(
        policy(Mode::Everyone, 42, &[]),
        no_prompts(),
        resolver(),
        Script::Decline,
        1024,
    );

    let big = vec![b'x'; 8 * 1024];
    let resp = host
        .router_from(OWNER_IP)
        .oneshot(multipart_request("/drop", &[Part::File("file", "big.bin", &big)]))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(fs::read_dir(host.downloads()).unwrap().count(), 0);
}

#[tokio::test]
async fn mapped_ipv6_peer_resolves_as_ipv4() {
    let host = TestHost::new(
        policy(Mode::Personal, 42, &[]),
        no_prompts(),
        resolver(),
        Script::Decline,
    );

    let resp = host
        .router_from("::ffff:100.64.0.1")
        .oneshot(multipart_request(
            "/drop",
            &[Part::Text("text", "https://example.com")],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pending_prompt_does_not_stall_others_and_is_dropped_on_disconnect() {
    let host = TestHost::new(
        policy(Mode::Everyone, 42, &[]),
        ConfirmSettings::default(),
        resolver(),
        Script::Hang,
    );

    let stranger = tokio::spawn(host.router_from(STRANGER_IP).oneshot(multipart_request(
        "/drop",
        &[Part::Text("text", "https://a.example")],
    )));
    settle(|| host.prompt.calls() == 1).await;
    assert_eq!(host.prompt.calls(), 1);

    let resp = tokio::time::timeout(
        Duration::from_secs(5),
        host.router_from(OWNER_IP).oneshot(multipart_request(
            "/drop",
            &[Part::Text("text", "https://b.example")],
        )),
    )
    .await
    .expect("owner drop stalled behind the open prompt")
    .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    stranger.abort();
    assert!(stranger.await.unwrap_err().is_cancelled());
    settle(|| false).await;

    assert_eq!(host.opener.opened(), vec!["https://b.example".to_string()]);
    assert_eq!(host.prompt.calls(), 1);
}
