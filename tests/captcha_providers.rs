use std::time::Duration;

use gallog_cleaner::{
    AntiCaptchaProvider, CaptchaConfig, CaptchaEndpoints, CaptchaError, CaptchaProvider,
    CaptchaProviderKind, CaptchaState, CaptchaTask, GallogRemover, LoginResult, PollingConfig,
    PostType, RemoverConfig, SiteEndpoints, TwoCaptchaProvider,
};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SITE_KEY: &str = "site-key";

fn fast_polling(attempts: u32) -> PollingConfig {
    PollingConfig::new(Duration::from_millis(1), attempts)
}

fn task() -> CaptchaTask {
    CaptchaTask::new(
        SITE_KEY,
        Url::parse("https://gallog.dcinside.com/alice/posting").unwrap(),
    )
}

fn base(server: &MockServer) -> Url {
    Url::parse(&format!("{}/", server.uri())).unwrap()
}

fn two_captcha(server: &MockServer, attempts: u32) -> TwoCaptchaProvider {
    TwoCaptchaProvider::new(reqwest::Client::new(), "key-2c", base(server))
        .with_polling(fast_polling(attempts))
}

fn anti_captcha(server: &MockServer, attempts: u32) -> AntiCaptchaProvider {
    AntiCaptchaProvider::new(reqwest::Client::new(), "key-ac", base(server))
        .with_polling(fast_polling(attempts))
}

async fn mount_two_captcha_create(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/in.php"))
        .and(query_param("key", "key-2c"))
        .and(query_param("method", "userrecaptcha"))
        .and(query_param("googlekey", SITE_KEY))
        .and(query_param("pageurl", "https://gallog.dcinside.com/alice/posting"))
        .and(query_param("json", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 1, "request": "42"})))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn two_captcha_returns_token_on_kth_poll() {
    let server = MockServer::start().await;
    mount_two_captcha_create(&server).await;
    Mock::given(method("GET"))
        .and(path("/res.php"))
        .and(query_param("action", "get"))
        .and(query_param("id", "42"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": 0, "request": "CAPCHA_NOT_READY"})),
        )
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/res.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 1, "request": "tok-2c"})))
        .expect(1)
        .mount(&server)
        .await;

    let solution = two_captcha(&server, 60).solve(&task()).await.unwrap();
    assert_eq!(solution.token, "tok-2c");
    assert_eq!(solution.task_id.as_deref(), Some("42"));
}

#[tokio::test]
async fn two_captcha_times_out_when_never_ready() {
    let server = MockServer::start().await;
    mount_two_captcha_create(&server).await;
    Mock::given(method("GET"))
        .and(path("/res.php"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": 0, "request": "CAPCHA_NOT_READY"})),
        )
        .expect(60)
        .mount(&server)
        .await;

    let result = two_captcha(&server, 60).solve(&task()).await;
    assert!(matches!(
        result,
        Err(CaptchaError::Timeout { attempts: 60, .. })
    ));
}

#[tokio::test]
async fn two_captcha_poll_error_aborts() {
    let server = MockServer::start().await;
    mount_two_captcha_create(&server).await;
    Mock::given(method("GET"))
        .and(path("/res.php"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": 0, "request": "ERROR_CAPTCHA_UNSOLVABLE"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = two_captcha(&server, 60).solve(&task()).await.unwrap_err();
    assert_eq!(err.to_string(), "2Captcha error: ERROR_CAPTCHA_UNSOLVABLE");
}

#[tokio::test]
async fn two_captcha_create_error_skips_polling() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/in.php"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": 0, "request": "ERROR_WRONG_USER_KEY"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/res.php"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = two_captcha(&server, 60).solve(&task()).await.unwrap_err();
    assert!(matches!(err, CaptchaError::Provider { .. }));
    assert!(err.to_string().contains("ERROR_WRONG_USER_KEY"));
}

#[tokio::test]
async fn two_captcha_empty_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/in.php"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = two_captcha(&server, 60).solve(&task()).await.unwrap_err();
    assert!(matches!(err, CaptchaError::InvalidResponse(_)));
}

#[tokio::test]
async fn unreachable_provider_maps_to_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let closed = Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap();
    for provider in [
        Box::new(
            TwoCaptchaProvider::new(reqwest::Client::new(), "key-2c", closed.clone())
                .with_polling(fast_polling(60)),
        ) as Box<dyn CaptchaProvider>,
        Box::new(
            AntiCaptchaProvider::new(reqwest::Client::new(), "key-ac", closed.clone())
                .with_polling(fast_polling(60)),
        ),
    ] {
        let err = provider.solve(&task()).await.unwrap_err();
        assert!(
            matches!(err, CaptchaError::Transport(_)),
            "{} returned {err:?}",
            provider.name()
        );
    }
}

async fn mount_anti_captcha_create(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/createTask"))
        .and(body_partial_json(json!({
            "clientKey": "key-ac",
            "task": {
                "type": "RecaptchaV2TaskProxyless",
                "websiteURL": "https://gallog.dcinside.com/alice/posting",
                "websiteKey": SITE_KEY,
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"errorId": 0, "taskId": 7})))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn anti_captcha_returns_token_on_kth_poll() {
    let server = MockServer::start().await;
    mount_anti_captcha_create(&server).await;
    Mock::given(method("POST"))
        .and(path("/getTaskResult"))
        .and(body_partial_json(json!({"clientKey": "key-ac", "taskId": 7})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"errorId": 0, "status": "processing"})),
        )
        .up_to_n_times(4)
        .expect(4)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/getTaskResult"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorId": 0,
            "status": "ready",
            "solution": {"gRecaptchaResponse": "tok-ac"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let solution = anti_captcha(&server, 60).solve(&task()).await.unwrap();
    assert_eq!(solution.token, "tok-ac");
    assert_eq!(solution.task_id.as_deref(), Some("7"));
}

#[tokio::test]
async fn anti_captcha_times_out_after_budget() {
    let server = MockServer::start().await;
    mount_anti_captcha_create(&server).await;
    Mock::given(method("POST"))
        .and(path("/getTaskResult"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"errorId": 0, "status": "processing"})),
        )
        .expect(60)
        .mount(&server)
        .await;

    let result = anti_captcha(&server, 60).solve(&task()).await;
    assert!(matches!(
        result,
        Err(CaptchaError::Timeout { attempts: 60, .. })
    ));
}

#[tokio::test]
async fn anti_captcha_error_id_surfaces_description() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/createTask"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorId": 1,
            "errorCode": "ERROR_KEY_DOES_NOT_EXIST",
            "errorDescription": "Account authorization key not found in the system"
        })))
        .mount(&server)
        .await;

    let err = anti_captcha(&server, 60).solve(&task()).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "AntiCaptcha error: Account authorization key not found in the system"
    );
}

#[tokio::test]
async fn configured_provider_solves_for_the_pipeline() {
    let site = MockServer::start().await;
    let solver = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<form id="login_process"><input name="user_id"></form><a class="logout">x</a>"#,
        ))
        .mount(&site)
        .await;
    Mock::given(method("POST"))
        .and(path("/login/member_check"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/alice/posting"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>gallog</body></html>")
                .insert_header("set-cookie", "ci_c=tok; path=/"),
        )
        .mount(&site)
        .await;
    for (page, body) in [
        ("1", r#"<ul class="cont_listbox"><li data-no="1"></li><li data-no="2"></li></ul>"#),
        ("2", r#"<ul class="cont_listbox"></ul>"#),
    ] {
        Mock::given(method("GET"))
            .and(path("/alice/posting/index"))
            .and(query_param("p", page))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&site)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/alice/ajax/log_list_ajax/delete"))
        .and(body_string_contains("g-recaptcha-response=tok-2c"))
        .and(body_string_contains("service_code=undefined"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"result":"success"}"#))
        .expect(1)
        .mount(&site)
        .await;
    Mock::given(method("POST"))
        .and(path("/alice/ajax/log_list_ajax/delete"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"msg":"captcha"}"#))
        .expect(1)
        .mount(&site)
        .await;

    Mock::given(method("GET"))
        .and(path("/in.php"))
        .and(query_param("googlekey", "6LcJyr4UAAAAAOy9Q_e9sDWPSHJ_aXus4UnYLfgL"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 1, "request": "9"})))
        .expect(1)
        .mount(&solver)
        .await;
    Mock::given(method("GET"))
        .and(path("/res.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": 1, "request": "tok-2c"})))
        .expect(1)
        .mount(&solver)
        .await;

    let config = RemoverConfig::builder()
        .with_endpoints(SiteEndpoints::single_host(base(&site)))
        .with_captcha_endpoints(CaptchaEndpoints {
            two_captcha: base(&solver),
            anti_captcha: base(&solver),
        })
        .with_polling(fast_polling(5))
        .with_item_delay(Duration::ZERO)
        .build();
    let remover = GallogRemover::builder().with_config(config).build().unwrap();
    assert_eq!(remover.login("alice", "pw").await, LoginResult::Success);

    let captcha = CaptchaConfig::new(CaptchaProviderKind::TwoCaptcha, "key-2c");
    let events = remover
        .run_deletion_pipeline(PostType::Posting, None, Some(captcha))
        .collect()
        .await;

    let item_events: Vec<_> = events.iter().filter(|p| p.current > 0).collect();
    assert_eq!(item_events[0].captcha_state, CaptchaState::Solving);
    assert_eq!(item_events[1].captcha_state, CaptchaState::Solved);

    let summary = events.last().unwrap();
    assert!(summary.finished);
    assert_eq!((summary.success_count, summary.fail_count), (1, 1));
}

#[tokio::test]
async fn blank_api_key_means_no_solver() {
    let site = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<a class="logout">x</a>"#))
        .mount(&site)
        .await;
    Mock::given(method("POST"))
        .and(path("/login/member_check"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/alice/comment"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<p>gallog</p>")
                .insert_header("set-cookie", "ci_c=tok; path=/"),
        )
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/alice/comment/index"))
        .and(query_param("p", "1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<ul class="cont_listbox"><li data-no="1"></li><li data-no="2"></li></ul>"#),
        )
        .mount(&site)
        .await;
    Mock::given(method("GET"))
        .and(path("/alice/comment/index"))
        .and(query_param("p", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<ul class="cont_listbox"></ul>"#))
        .mount(&site)
        .await;
    Mock::given(method("POST"))
        .and(path("/alice/ajax/log_list_ajax/delete"))
        .respond_with(ResponseTemplate::new(200).set_body_string("captcha"))
        .expect(1)
        .mount(&site)
        .await;

    let config = RemoverConfig::builder()
        .with_endpoints(SiteEndpoints::single_host(base(&site)))
        .with_item_delay(Duration::ZERO)
        .build();
    let remover = GallogRemover::builder().with_config(config).build().unwrap();
    assert_eq!(remover.login("alice", "pw").await, LoginResult::Success);

    let captcha = CaptchaConfig::new(CaptchaProviderKind::AntiCaptcha, "  ");
    let events = remover
        .run_deletion_pipeline(PostType::Comment, None, Some(captcha))
        .collect()
        .await;

    let last = events.last().unwrap();
    assert!(last.finished);
    assert_eq!(last.captcha_state, CaptchaState::Required);
}
