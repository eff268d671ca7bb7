mod common;

use chrono::NaiveDateTime;
use common::*;
use serde_json::{json, Value};

#[tokio::test]
async fn register_verify_then_login() {
    let app = spawn_app().await;
    let (username, email) = unique_identity("alice");

    let resp = register(&app, &username, &email).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["success"].as_bool().unwrap());
    let user_id = body["data"]["user_id"].as_i64().unwrap() as i32;

    let row = user_row(&app, user_id).await.unwrap();
    assert!(!row.try_get::<bool>("", "email_verified").unwrap());
    let stored: String = row.try_get("", "verification_code").unwrap();
    assert!(stored.starts_with("$2"), "code must be stored hashed");
    let expires: NaiveDateTime = row.try_get("", "verification_code_expires").unwrap();
    let ttl = expires - chrono::Utc::now().naive_utc();
    assert!(ttl > chrono::Duration::minutes(9) && ttl <= chrono::Duration::minutes(10));

    // Correct password, unverified address.
    let resp = login(&app, &username, PASSWORD).await;
    assert_eq!(resp.status(), 403);

    plant_code(&app, user_id, "verification_code", "123456").await;

    let resp = app
        .post("/auth/verify-email", json!({ "email": email, "code": "000000" }))
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_message(resp).await, "Invalid or expired code or link.");

    let resp = app
        .post("/auth/verify-email", json!({ "email": email, "code": "123456" }))
        .await;
    assert_eq!(resp.status(), 200);

    let row = user_row(&app, user_id).await.unwrap();
    assert!(row.try_get::<bool>("", "email_verified").unwrap());
    assert!(row
        .try_get::<Option<String>>("", "verification_code")
        .unwrap()
        .is_none());

    // Replay is refused with the same generic error.
    let resp = app
        .post("/auth/verify-email", json!({ "email": email, "code": "123456" }))
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_message(resp).await, "Invalid or expired code or link.");

    let session = login_ok(&app, &username, PASSWORD).await;
    let resp = app
        .client
        .get(app.url("/auth/me"))
        .bearer_auth(&session.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["username"], username.as_str());
    assert_eq!(body["data"]["email_verified"], true);
}

#[tokio::test]
async fn login_accepts_email_as_identifier() {
    let app = spawn_app().await;
    let (_, _, email) = create_verified_user(&app, "byemail").await;
    login_ok(&app, &email, PASSWORD).await;
}

#[tokio::test]
async fn register_rejects_bad_input_and_duplicates() {
    let app = spawn_app().await;
    let (username, email) = unique_identity("dup");

    let resp = app
        .post(
            "/auth/register",
            json!({
                "username": username,
                "email": email,
                "password": PASSWORD,
                "confirm_password": "something-else",
            }),
        )
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(error_message(resp).await, "Passwords do not match.");

    let resp = app
        .post(
            "/auth/register",
            json!({
                "username": username,
                "email": email,
                "password": "short",
                "confirm_password": "short",
            }),
        )
        .await;
    assert_eq!(resp.status(), 400);

    assert_eq!(register(&app, &username, &email).await.status(), 200);

    let (other_name, _) = unique_identity("dup");
    let resp = register(&app, &other_name, &email).await;
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn five_failures_lock_the_account() {
    let app = spawn_app().await;
    let (user_id, username, _) = create_verified_user(&app, "locked").await;

    for remaining in (1..=4).rev() {
        let resp = login(&app, &username, "wrong-password").await;
        assert_eq!(resp.status(), 401);
        let msg = error_message(resp).await;
        assert!(
            msg.contains(&format!("{} attempts remaining", remaining)),
            "unexpected message: {msg}"
        );
    }

    let resp = login(&app, &username, "wrong-password").await;
    assert_eq!(resp.status(), 423);
    assert!(error_message(resp).await.contains("15 minutes"));

    // Sixth attempt is refused before the password is looked at.
    let resp = login(&app, &username, PASSWORD).await;
    assert_eq!(resp.status(), 423);
    assert!(error_message(resp).await.contains("15 minutes"));

    let row = user_row(&app, user_id).await.unwrap();
    assert_eq!(row.try_get::<i32>("", "failed_login_attempts").unwrap(), 5);
    let until: NaiveDateTime = row.try_get("", "locked_until").unwrap();
    let left = until - chrono::Utc::now().naive_utc();
    assert!(left > chrono::Duration::minutes(14) && left <= chrono::Duration::minutes(15));
}

#[tokio::test]
async fn expired_lock_lets_the_user_back_in() {
    let app = spawn_app().await;
    let (user_id, username, _) = create_verified_user(&app, "unlock").await;

    app.exec(
        "UPDATE users SET failed_login_attempts = 5, \
         locked_until = NOW() AT TIME ZONE 'UTC' - INTERVAL '1 minute' WHERE id = $1",
        vec![user_id.into()],
    )
    .await;

    login_ok(&app, &username, PASSWORD).await;

    let row = user_row(&app, user_id).await.unwrap();
    assert_eq!(row.try_get::<i32>("", "failed_login_attempts").unwrap(), 0);
    assert!(row
        .try_get::<Option<NaiveDateTime>>("", "locked_until")
        .unwrap()
        .is_none());
    assert!(row
        .try_get::<Option<NaiveDateTime>>("", "last_login")
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn unverified_login_does_not_count_as_failure() {
    let app = spawn_app().await;
    let (username, email) = unique_identity("unverified");
    let resp = register(&app, &username, &email).await;
    let body: Value = resp.json().await.unwrap();
    let user_id = body["data"]["user_id"].as_i64().unwrap() as i32;

    for _ in 0..6 {
        let resp = login(&app, &username, PASSWORD).await;
        assert_eq!(resp.status(), 403);
    }

    let row = user_row(&app, user_id).await.unwrap();
    assert_eq!(row.try_get::<i32>("", "failed_login_attempts").unwrap(), 0);
}

#[tokio::test]
async fn unknown_user_gets_generic_error() {
    let app = spawn_app().await;
    let resp = login(&app, "nobody_at_all", PASSWORD).await;
    assert_eq!(resp.status(), 401);
    assert_eq!(error_message(resp).await, "Invalid username or password.");
}

#[tokio::test]
async fn resend_is_throttled_and_generic() {
    let app = spawn_app().await;
    let (username, email) = unique_identity("resend");
    assert_eq!(register(&app, &username, &email).await.status(), 200);

    // Registration just issued a code.
    let resp = app
        .post("/auth/resend-verification", json!({ "email": email }))
        .await;
    assert_eq!(resp.status(), 429);
    let retry_after: i64 = resp.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=30).contains(&retry_after));

    // Pretend the code went out a minute ago.
    app.exec(
        "UPDATE users SET verification_code_expires = verification_code_expires - INTERVAL '60 seconds' \
         WHERE email = $1",
        vec![email.clone().into()],
    )
    .await;
    let resp = app
        .post("/auth/resend-verification", json!({ "email": email }))
        .await;
    assert_eq!(resp.status(), 200);
    let known: Value = resp.json().await.unwrap();

    let resp = app
        .post(
            "/auth/resend-verification",
            json!({ "email": "ghost@example.com" }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let unknown: Value = resp.json().await.unwrap();
    assert_eq!(known["message"], unknown["message"]);
}

#[tokio::test]
async fn malformed_code_is_a_validation_error() {
    let app = spawn_app().await;
    let resp = app
        .post(
            "/auth/verify-email",
            json!({ "email": "a@x.com", "code": "12ab56" }),
        )
        .await;
    assert_eq!(resp.status(), 400);
    assert!(error_message(resp).await.contains("6-digit"));
}

#[tokio::test]
async fn refresh_rotates_and_old_token_dies() {
    let app = spawn_app().await;
    let (_, username, _) = create_verified_user(&app, "refresh").await;
    let session = login_ok(&app, &username, PASSWORD).await;

    let resp = app
        .post(
            "/auth/refresh",
            json!({ "refresh_token": session.refresh_token }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_ne!(body["data"]["csrf_token"], session.csrf_token.as_str());

    let resp = app
        .post(
            "/auth/refresh",
            json!({ "refresh_token": session.refresh_token }),
        )
        .await;
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn logout_revokes_refresh_token() {
    let app = spawn_app().await;
    let (_, username, _) = create_verified_user(&app, "logout").await;
    let session = login_ok(&app, &username, PASSWORD).await;

    let resp = app
        .post_authed(
            "/auth/logout",
            &session.access_token,
            json!({ "refresh_token": session.refresh_token }),
        )
        .await;
    assert_eq!(resp.status(), 200);

    let resp = app
        .post(
            "/auth/refresh",
            json!({ "refresh_token": session.refresh_token }),
        )
        .await;
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn protected_routes_need_a_session() {
    let app = spawn_app().await;
    let resp = app.client.get(app.url("/auth/me")).send().await.unwrap();
    assert_eq!(resp.status(), 401);
    assert_eq!(resp.headers()["cache-control"], "no-store");
}

#[tokio::test]
async fn back_to_back_logins_get_separate_sessions() {
    let app = spawn_app().await;
    let (_, username, _) = create_verified_user(&app, "twice").await;

    let first = login_ok(&app, &username, PASSWORD).await;
    let second = login_ok(&app, &username, PASSWORD).await;
    assert_ne!(first.refresh_token, second.refresh_token);

    // Logging one session out leaves the other usable.
    let resp = app
        .post_authed(
            "/auth/logout",
            &first.access_token,
            json!({ "refresh_token": first.refresh_token }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let resp = app
        .post(
            "/auth/refresh",
            json!({ "refresh_token": second.refresh_token }),
        )
        .await;
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn identities_are_unique_regardless_of_case() {
    let app = spawn_app().await;
    let (user_id, username, email) = create_verified_user(&app, "casing").await;

    let (other_name, _) = unique_identity("casing");
    let resp = register(&app, &other_name, &email.to_uppercase()).await;
    assert_eq!(resp.status(), 409);

    let (_, other_email) = unique_identity("casing");
    let resp = register(&app, &username.to_uppercase(), &other_email).await;
    assert_eq!(resp.status(), 409);

    // Mixed-case input is stored lower-cased and still logs in.
    let (name, mixed_email) = unique_identity("storedlower");
    let resp = register(&app, &name, &format!("  {}  ", mixed_email.to_uppercase())).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["email"], mixed_email.as_str());

    login_ok(&app, &email.to_uppercase(), PASSWORD).await;
    login_ok(&app, &username.to_uppercase(), PASSWORD).await;
    let row = user_row(&app, user_id).await.unwrap();
    assert_eq!(row.try_get::<i32>("", "failed_login_attempts").unwrap(), 0);
}

#[tokio::test]
async fn username_length_is_checked_after_trimming() {
    let app = spawn_app().await;
    let (_, email) = unique_identity("padded");
    let resp = register(&app, " q ", &email).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(
        error_message(resp).await,
        "Username must be between 3 and 50 characters."
    );
}

async fn verify(app: &TestApp, email: &str, code: &str) -> reqwest::Response {
    app.post(
        "/auth/verify-email",
        json!({ "email": email, "code": code }),
    )
    .await
}

#[tokio::test]
async fn expired_verification_code_looks_like_a_wrong_one() {
    let app = spawn_app().await;
    let (username, email) = unique_identity("lapsed");
    let body: Value = register(&app, &username, &email).await.json().await.unwrap();
    let user_id = body["data"]["user_id"].as_i64().unwrap() as i32;
    plant_code(&app, user_id, "verification_code", "135790").await;

    let wrong = verify(&app, &email, "000000").await;
    assert_eq!(wrong.status(), 400);
    let wrong = error_message(wrong).await;

    let unknown = verify(&app, "ghost@example.com", "135790").await;
    assert_eq!(unknown.status(), 400);
    assert_eq!(error_message(unknown).await, wrong);

    app.exec(
        "UPDATE users SET verification_code_expires = NOW() AT TIME ZONE 'UTC' - INTERVAL '1 second' \
         WHERE id = $1",
        vec![user_id.into()],
    )
    .await;
    let expired = verify(&app, &email, "135790").await;
    assert_eq!(expired.status(), 400);
    assert_eq!(error_message(expired).await, wrong);

    let row = user_row(&app, user_id).await.unwrap();
    assert!(!row.try_get::<bool>("", "email_verified").unwrap());
}
