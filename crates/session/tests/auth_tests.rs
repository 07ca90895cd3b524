use chrono::Utc;
use portal_session::{
    ApiRequest, Auth, AuthChannel, AuthEvent, AuthOptions, BroadcastHub, ChannelMessage, NoChannel,
    Role, Route, RouteHistory, SessionClient, SessionError,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn identity(expires_in: i64) -> Value {
    json!({
        "id": "u-1",
        "email": "admin@example.net",
        "username": "admin",
        "role": "ADMIN",
        "profile": { "id": "p-1", "full_name": "Admin Satu" },
        "exp": Utc::now().timestamp() + expires_in
    })
}

fn tab(
    server: &MockServer,
    options: AuthOptions,
    channel: Option<Arc<dyn AuthChannel>>,
) -> (Auth, RouteHistory) {
    let _ = pretty_env_logger::try_init();
    let client = SessionClient::new(&server.uri(), options).unwrap();
    let history = RouteHistory::new();
    let auth = Auth::with_channel(client, Arc::new(history.clone()), channel);
    (auth, history)
}

async fn mount_login(server: &MockServer, expires_in: i64) {
    let mut data = identity(expires_in);
    data["accessToken"] = json!("raw-access-token");
    data["refreshToken"] = json!("raw-refresh-token");
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": data })))
        .mount(server)
        .await;
}

async fn mount_me(server: &MockServer, expires_in: i64) {
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": identity(expires_in) })))
        .mount(server)
        .await;
}

async fn mount_logout(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(200))
        .expect(expected)
        .mount(server)
        .await;
}

async fn hits(server: &MockServer, wanted: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == wanted)
        .count()
}

#[tokio::test]
async fn test_login_populates_session() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 3600).await;

    let (auth, history) = tab(&mock_server, AuthOptions::default(), None);
    let session = auth.login("admin", "password123").await.unwrap();

    assert_eq!(session.username, "admin");
    assert_eq!(session.role, Role::Admin);
    assert_eq!(session.display_name(), "Admin Satu");
    assert_eq!(auth.session(), Some(session));
    assert!(auth.is_authenticated());
    assert!(auth.is_refresh_scheduled());
    assert_eq!(history.routes(), vec![Route::Dashboard]);
}

#[tokio::test]
async fn test_login_failure_leaves_session_untouched() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid credentials" })))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let (auth, history) = tab(&mock_server, AuthOptions::default(), None);
    let error = auth.login("admin", "wrong").await.unwrap_err();

    assert!(error.is_unauthorized());
    assert!(auth.session().is_none());
    assert!(!auth.is_refresh_scheduled());
    assert!(history.routes().is_empty());
}

#[tokio::test]
async fn test_login_without_body_reads_identity_with_cookies() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Set-Cookie", "accessToken=fresh; Path=/; HttpOnly")
                .set_body_json(json!({ "data": null })),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("cookie", "accessToken=fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": identity(3600) })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (auth, _history) = tab(&mock_server, AuthOptions::default(), None);
    let session = auth.login("admin", "password123").await.unwrap();

    assert_eq!(session.id, "u-1");
}

#[tokio::test]
async fn test_startup_check() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .mount(&mock_server)
        .await;
    mount_me(&mock_server, 3600).await;

    let (auth, history) = tab(&mock_server, AuthOptions::default(), None);
    let session = auth.check_session_on_startup().await;

    assert_eq!(session.map(|s| s.email), Some("admin@example.net".to_string()));
    assert!(auth.is_authenticated());
    assert!(history.routes().is_empty());
}

#[tokio::test]
async fn test_startup_check_recovers_with_refresh_credential() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/verify"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/verify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_me(&mock_server, 3600).await;

    let (auth, _history) = tab(&mock_server, AuthOptions::default(), None);

    assert!(auth.check_session_on_startup().await.is_some());
}

#[tokio::test]
async fn test_startup_check_without_session() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/verify"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;
    mount_logout(&mock_server, 0).await;

    let (auth, history) = tab(&mock_server, AuthOptions::default(), None);

    assert!(auth.check_session_on_startup().await.is_none());
    assert!(!auth.is_authenticated());
    assert!(history.routes().is_empty());
}

#[tokio::test]
async fn test_refresh_failure_logs_out_once() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 3600).await;
    mount_logout(&mock_server, 1).await;
    Mock::given(method("GET"))
        .and(path("/package"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (auth, history) = tab(&mock_server, AuthOptions::default(), None);
    auth.login("admin", "password123").await.unwrap();

    let coordinator = auth.coordinator();
    let (a, b, c) = tokio::join!(
        coordinator.request::<Value>(ApiRequest::get("/package")),
        coordinator.request::<Value>(ApiRequest::get("/package")),
        coordinator.request::<Value>(ApiRequest::get("/package")),
    );

    for result in [a, b, c] {
        assert!(matches!(result, Err(SessionError::RefreshFailed(_))));
    }
    assert!(auth.session().is_none());
    assert!(!auth.is_refresh_scheduled());
    assert_eq!(history.count(Route::SignIn), 1);
}

#[tokio::test]
async fn test_reactive_refresh_replaces_session() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 200).await;
    mount_me(&mock_server, 500).await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(3)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "users": [] } })))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(100)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (auth, _history) = tab(&mock_server, AuthOptions::default(), None);
    let before = auth.login("admin", "password123").await.unwrap();
    let due = auth.refresh_scheduled_at().unwrap() - Instant::now();
    assert!(due > Duration::from_secs(78) && due <= Duration::from_secs(80));

    let coordinator = auth.coordinator();
    let (a, b, c) = tokio::join!(
        coordinator.request::<Value>(ApiRequest::get("/user")),
        coordinator.request::<Value>(ApiRequest::get("/user")),
        coordinator.request::<Value>(ApiRequest::get("/user")),
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());

    let after = auth.session().unwrap();
    assert!((299..=301).contains(&(after.exp - before.exp)));
    // re-armed from the new expiry: 500 s out, 120 s margin
    let due = auth.refresh_scheduled_at().unwrap() - Instant::now();
    assert!(due > Duration::from_secs(378) && due <= Duration::from_secs(380));
}

#[tokio::test]
async fn test_proactive_refresh_rearms() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 5).await;
    mount_me(&mock_server, 3600).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let options = AuthOptions::default().with_refresh_floor(Duration::from_millis(100));
    let (auth, _history) = tab(&mock_server, options, None);
    let before = auth.login("admin", "password123").await.unwrap();

    sleep(Duration::from_millis(500)).await;

    let after = auth.session().unwrap();
    assert!(after.exp >= before.exp + 3000);
    assert!(auth.is_refresh_scheduled());
    assert_eq!(hits(&mock_server, "/auth/refresh").await, 1);
}

#[tokio::test]
async fn test_proactive_refresh_failure_logs_out() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 5).await;
    mount_logout(&mock_server, 1).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    let options = AuthOptions::default().with_refresh_floor(Duration::from_millis(100));
    let (auth, history) = tab(&mock_server, options, None);
    auth.login("admin", "password123").await.unwrap();

    sleep(Duration::from_millis(500)).await;

    assert!(auth.session().is_none());
    assert_eq!(history.routes(), vec![Route::Dashboard, Route::SignIn]);
}

#[tokio::test]
async fn test_logout_cancels_scheduled_refresh() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 5).await;
    mount_logout(&mock_server, 1).await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let options = AuthOptions::default().with_refresh_floor(Duration::from_millis(200));
    let (auth, history) = tab(&mock_server, options, None);
    auth.login("admin", "password123").await.unwrap();
    assert!(auth.is_refresh_scheduled());

    auth.logout().await;
    assert!(!auth.is_refresh_scheduled());

    sleep(Duration::from_millis(400)).await;

    assert!(auth.session().is_none());
    assert_eq!(history.routes(), vec![Route::Dashboard, Route::SignIn]);
}

#[tokio::test]
async fn test_logout_is_best_effort() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 3600).await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let (auth, history) = tab(&mock_server, AuthOptions::default(), None);
    auth.login("admin", "password123").await.unwrap();
    auth.logout().await;

    assert!(auth.session().is_none());
    assert_eq!(history.last(), Some(Route::SignIn));
}

#[tokio::test]
async fn test_logout_propagates_to_other_tabs() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 3600).await;
    mount_logout(&mock_server, 1).await;

    let hub = BroadcastHub::new();
    let options = AuthOptions::default();
    let channel_a: Arc<dyn AuthChannel> = Arc::new(hub.channel(&options.channel_name));
    let channel_b: Arc<dyn AuthChannel> = Arc::new(hub.channel(&options.channel_name));
    let mut observer = hub.channel(&options.channel_name).subscribe().unwrap();

    let (tab_a, history_a) = tab(&mock_server, options.clone(), Some(channel_a));
    let (tab_b, history_b) = tab(&mock_server, options, Some(channel_b));
    tab_a.login("admin", "password123").await.unwrap();
    tab_b.login("admin", "password123").await.unwrap();

    let mut session_b = tab_b.subscribe();
    tab_a.logout().await;

    timeout(Duration::from_secs(2), async {
        while session_b.borrow_and_update().is_some() {
            session_b.changed().await.unwrap();
        }
    })
    .await
    .expect("tab B never dropped its session");
    sleep(Duration::from_millis(50)).await;

    assert!(!tab_b.is_refresh_scheduled());
    assert_eq!(history_b.routes(), vec![Route::Dashboard, Route::SignIn]);
    assert_eq!(history_a.routes(), vec![Route::Dashboard, Route::SignIn]);

    // exactly one broadcast, from tab A
    let message = observer.try_recv().unwrap();
    assert_eq!(message.origin, tab_a.tab_id());
    assert_eq!(message.event, AuthEvent::Logout);
    assert!(observer.try_recv().is_err());
}

#[tokio::test]
async fn test_own_broadcast_is_ignored() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 3600).await;

    let (auth, history) = tab(&mock_server, AuthOptions::default(), None);
    auth.login("admin", "password123").await.unwrap();

    let own = ChannelMessage {
        origin: auth.tab_id(),
        event: AuthEvent::Logout,
    };
    assert!(!auth.handle_channel_message(&own));
    assert!(auth.is_authenticated());

    let foreign = ChannelMessage {
        origin: uuid::Uuid::new_v4(),
        event: AuthEvent::Logout,
    };
    assert!(auth.handle_channel_message(&foreign));
    assert!(!auth.is_authenticated());
    assert_eq!(history.last(), Some(Route::SignIn));
}

#[tokio::test]
async fn test_logout_without_broadcast_support() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 3600).await;
    mount_logout(&mock_server, 1).await;

    let channel: Arc<dyn AuthChannel> = Arc::new(NoChannel);
    let (auth, history) = tab(&mock_server, AuthOptions::default(), Some(channel));
    auth.login("admin", "password123").await.unwrap();
    auth.logout().await;

    assert!(auth.session().is_none());
    assert_eq!(history.last(), Some(Route::SignIn));
}

#[tokio::test]
async fn test_change_password_goes_through_coordinator() {
    let mock_server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/user/change-password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "Password updated" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (auth, _history) = tab(&mock_server, AuthOptions::default(), None);
    let body = auth.change_password("old", "newpass123", "newpass123").await.unwrap();

    assert_eq!(body["message"], "Password updated");
}

/// 401 on `/package`, an immediate refresh, and an identity lookup that
/// answers only after `me_delay`
async fn mount_slow_refresh(server: &MockServer, me_delay: Duration) {
    Mock::given(method("GET"))
        .and(path("/package"))
        .respond_with(ResponseTemplate::new(401))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": identity(3600) }))
                .set_delay(me_delay),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_logout_during_refresh_stays_logged_out() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 3600).await;
    mount_logout(&mock_server, 1).await;
    mount_slow_refresh(&mock_server, Duration::from_millis(300)).await;

    let (auth, history) = tab(&mock_server, AuthOptions::default(), None);
    auth.login("admin", "password123").await.unwrap();

    let coordinator = auth.coordinator();
    let request = tokio::spawn(async move {
        coordinator.request::<Value>(ApiRequest::get("/package")).await
    });
    sleep(Duration::from_millis(100)).await;
    assert!(auth.coordinator().is_refreshing());

    auth.logout().await;
    assert!(!auth.is_authenticated());

    let result = request.await.unwrap();
    assert!(result.unwrap_err().is_unauthorized());
    sleep(Duration::from_millis(50)).await;

    assert!(!auth.is_authenticated());
    assert!(!auth.is_refresh_scheduled());
    assert!(auth.refresh_scheduled_at().is_none());
    assert_eq!(history.routes(), vec![Route::Dashboard, Route::SignIn]);
}

#[tokio::test]
async fn test_cross_tab_logout_during_refresh_stays_logged_out() {
    let mock_server = MockServer::start().await;
    mount_login(&mock_server, 3600).await;
    mount_logout(&mock_server, 1).await;
    mount_slow_refresh(&mock_server, Duration::from_millis(300)).await;

    let hub = BroadcastHub::new();
    let options = AuthOptions::default();
    let channel_a: Arc<dyn AuthChannel> = Arc::new(hub.channel(&options.channel_name));
    let channel_b: Arc<dyn AuthChannel> = Arc::new(hub.channel(&options.channel_name));
    let (tab_a, _history_a) = tab(&mock_server, options.clone(), Some(channel_a));
    let (tab_b, history_b) = tab(&mock_server, options, Some(channel_b));
    tab_a.login("admin", "password123").await.unwrap();
    tab_b.login("admin", "password123").await.unwrap();

    let coordinator = tab_b.coordinator();
    let request = tokio::spawn(async move {
        coordinator.request::<Value>(ApiRequest::get("/package")).await
    });
    sleep(Duration::from_millis(100)).await;
    assert!(tab_b.coordinator().is_refreshing());

    tab_a.logout().await;
    sleep(Duration::from_millis(50)).await;
    assert!(!tab_b.is_authenticated());

    let _ = request.await.unwrap();
    sleep(Duration::from_millis(50)).await;

    assert!(!tab_b.is_authenticated());
    assert!(!tab_b.is_refresh_scheduled());
    assert_eq!(history_b.routes(), vec![Route::Dashboard, Route::SignIn]);
}
