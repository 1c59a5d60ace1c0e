// tests/api_tests.rs

use examdesk::{config::Config, routes, state::AppState, utils::notify::LogNotifier};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL and a pool for seeding.
async fn spawn_app() -> (String, PgPool) {
    // Note: For Postgres, you must have a running database.
    // We'll read from DATABASE_URL environment variable.
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    // 1. Create a pool
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing. Make sure DATABASE_URL is set.");

    // 2. Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    // Ensure the exam-config singleton exists (idempotent across tests)
    let config_rows = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM exam_config")
        .fetch_one(&pool)
        .await
        .unwrap();
    if config_rows == 0 {
        sqlx::query("INSERT INTO exam_config DEFAULT VALUES")
            .execute(&pool)
            .await
            .unwrap();
    }

    // 3. Create test configuration and state
    let config = Config {
        database_url: database_url.clone(),
        access_token_secret: "test_access_secret_for_integration_tests".to_string(),
        refresh_token_secret: "test_refresh_secret_for_integration_tests".to_string(),
        rust_log: "error".to_string(),
        admin_email: None,
        // Tests read the OTP from the response body.
        expose_otp: true,
    };

    let state = AppState {
        pool: pool.clone(),
        config,
        notifier: Arc::new(LogNotifier),
    };

    // 4. Create the router with the app state
    let app = routes::create_router(state);

    // 5. Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    // 6. Spawn the server in the background
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, pool)
}

fn unique_email(prefix: &str) -> String {
    format!("{}_{}@example.com", prefix, &uuid::Uuid::new_v4().to_string()[..8])
}

/// Requests an OTP for the email and logs in with it.
/// Returns (access_token, refresh_cookie_value).
async fn login(client: &reqwest::Client, address: &str, email: &str) -> (String, String) {
    let otp_resp = client
        .post(format!("{}/api/v1/auth/otp", address))
        .json(&serde_json::json!({ "email": email }))
        .send()
        .await
        .expect("OTP request failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse OTP json");

    let otp = otp_resp["otp"].as_str().expect("OTP not exposed").to_string();

    let login_resp = client
        .post(format!("{}/api/v1/auth/login", address))
        .json(&serde_json::json!({ "email": email, "otp": otp }))
        .send()
        .await
        .expect("Login request failed");

    assert_eq!(login_resp.status().as_u16(), 200);

    let refresh_cookie = login_resp
        .headers()
        .get("set-cookie")
        .expect("Missing refresh cookie")
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let body = login_resp
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse login json");

    let access_token = body["access_token"]
        .as_str()
        .expect("Access token not found")
        .to_string();
    // The refresh token must never appear in the body.
    assert!(body.get("refresh_token").is_none());

    (access_token, refresh_cookie)
}

#[tokio::test]
async fn health_check_404() {
    // Arrange
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn otp_request_auto_registers_student() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let email = unique_email("fresh");

    let response = client
        .post(format!("{}/api/v1/auth/otp", address))
        .json(&serde_json::json!({ "email": email.to_uppercase() }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 200);

    // The email was normalized and the user registered as STUDENT.
    let role: String =
        sqlx::query_scalar("SELECT role::TEXT FROM users WHERE email = $1")
            .bind(&email)
            .fetch_one(&pool)
            .await
            .expect("Auto-registered user not found");
    assert_eq!(role, "STUDENT");
}

#[tokio::test]
async fn five_wrong_otps_lock_the_account() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let email = unique_email("locked");

    client
        .post(format!("{}/api/v1/auth/otp", address))
        .json(&serde_json::json!({ "email": email }))
        .send()
        .await
        .expect("OTP request failed");

    // Five wrong attempts: each is a 401 strike.
    for _ in 0..5 {
        let response = client
            .post(format!("{}/api/v1/auth/login", address))
            .json(&serde_json::json!({ "email": email, "otp": "00000" }))
            .send()
            .await
            .expect("Login request failed");
        assert_eq!(response.status().as_u16(), 401);
    }

    // The sixth attempt hits the lockout, regardless of the code sent.
    let response = client
        .post(format!("{}/api/v1/auth/login", address))
        .json(&serde_json::json!({ "email": email, "otp": "00000" }))
        .send()
        .await
        .expect("Login request failed");
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn stale_otp_is_rejected_independently_of_lockout() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let email = unique_email("stale");

    let otp_resp = client
        .post(format!("{}/api/v1/auth/otp", address))
        .json(&serde_json::json!({ "email": email }))
        .send()
        .await
        .expect("OTP request failed")
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let otp = otp_resp["otp"].as_str().unwrap();

    // Age the code past its window; no failed attempts on record.
    sqlx::query("UPDATE users SET otp_expires_at = NOW() - INTERVAL '1 minute' WHERE email = $1")
        .bind(&email)
        .execute(&pool)
        .await
        .unwrap();

    let response = client
        .post(format!("{}/api/v1/auth/login", address))
        .json(&serde_json::json!({ "email": email, "otp": otp }))
        .send()
        .await
        .expect("Login request failed");

    assert_eq!(response.status().as_u16(), 401);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "OTP expired");
}

#[tokio::test]
async fn expired_lock_grants_a_fresh_attempt_window() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let email = unique_email("relock");

    let otp_resp = client
        .post(format!("{}/api/v1/auth/otp", address))
        .json(&serde_json::json!({ "email": email }))
        .send()
        .await
        .expect("OTP request failed")
        .json::<serde_json::Value>()
        .await
        .unwrap();
    let otp = otp_resp["otp"].as_str().unwrap();

    // Maxed-out counter with a lock that has just run out.
    sqlx::query(
        "UPDATE users SET failed_otp_attempts = 5, locked_until = NOW() - INTERVAL '1 minute' WHERE email = $1",
    )
    .bind(&email)
    .execute(&pool)
    .await
    .unwrap();

    // A wrong code now is strike one of a fresh window, not strike six.
    let response = client
        .post(format!("{}/api/v1/auth/login", address))
        .json(&serde_json::json!({ "email": email, "otp": "00000" }))
        .send()
        .await
        .expect("Login request failed");
    assert_eq!(response.status().as_u16(), 401);

    let failed_attempts: i32 =
        sqlx::query_scalar("SELECT failed_otp_attempts FROM users WHERE email = $1")
            .bind(&email)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(failed_attempts, 1);

    // The account is not re-locked: the real code still works.
    let response = client
        .post(format!("{}/api/v1/auth/login", address))
        .json(&serde_json::json!({ "email": email, "otp": otp }))
        .send()
        .await
        .expect("Login request failed");
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn refresh_cookie_mints_new_access_token() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let email = unique_email("refresh");

    let (_access_token, refresh_cookie) = login(&client, &address, &email).await;

    // No Authorization header: the refresh cookie alone must carry the call,
    // and the replacement access token comes back in a response header.
    let response = client
        .get(format!("{}/api/v1/submissions/", address))
        .header("Cookie", refresh_cookie)
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 200);
    assert!(response.headers().get("x-access-token").is_some());
}

#[tokio::test]
async fn submission_lifecycle_flow() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let student_email = unique_email("student");
    let supervisor_email = unique_email("supervisor");

    // Seed a supervisor account; logins only mint tokens, roles come from the
    // user row.
    sqlx::query("INSERT INTO users (email, name, role) VALUES ($1, 'Supervisor', 'SUPERVISOR')")
        .bind(&supervisor_email)
        .execute(&pool)
        .await
        .unwrap();

    let (student_token, _) = login(&client, &address, &student_email).await;
    let (supervisor_token, _) = login(&client, &address, &supervisor_email).await;

    let answers = |correct: i64, total: i64| -> serde_json::Value {
        (0..total)
            .map(|i| {
                serde_json::json!({
                    "question": format!("Question {}", i),
                    "answer": "answer",
                    "correct": i < correct,
                })
            })
            .collect()
    };

    // Step B before step A is rejected.
    let response = client
        .post(format!("{}/api/v1/submissions/", address))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({
            "step": "B",
            "questions_and_answers": [{ "question": "Q", "answer": "A" }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // Step A succeeds, ungraded.
    let response = client
        .post(format!("{}/api/v1/submissions/", address))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({
            "step": "A",
            "questions_and_answers": [{ "question": "Q", "answer": "A" }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let submission: serde_json::Value = response.json().await.unwrap();
    assert!(submission["level"].is_null());
    let submission_id = submission["id"].as_str().unwrap().to_string();

    // Resubmitting before evaluation is rejected.
    let response = client
        .post(format!("{}/api/v1/submissions/", address))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({
            "step": "A",
            "questions_and_answers": [{ "question": "Q", "answer": "A" }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // Students cannot self-grade.
    let response = client
        .patch(format!("{}/api/v1/submissions/{}", address, submission_id))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({ "questions_and_answers": answers(44, 44) }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    // Supervisor grades 11/44 correct: exactly 25%, level ONE.
    let response = client
        .patch(format!("{}/api/v1/submissions/{}", address, submission_id))
        .bearer_auth(&supervisor_token)
        .json(&serde_json::json!({ "questions_and_answers": answers(11, 44) }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let graded: serde_json::Value = response.json().await.unwrap();
    assert_eq!(graded["level"], "ONE");
    assert!(graded["examined_by"].is_string());

    // ONE is not READY_TO_PROCEED: still not eligible for step B.
    let response = client
        .post(format!("{}/api/v1/submissions/", address))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({
            "step": "B",
            "questions_and_answers": [{ "question": "Q", "answer": "A" }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // Retake of step A replaces the graded attempt.
    let response = client
        .post(format!("{}/api/v1/submissions/", address))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({
            "step": "A",
            "questions_and_answers": [{ "question": "Q", "answer": "A" }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let retake: serde_json::Value = response.json().await.unwrap();
    let retake_id = retake["id"].as_str().unwrap().to_string();
    assert_ne!(retake_id, submission_id);

    // Supervisor passes the retake: 44/44 is READY_TO_PROCEED.
    let response = client
        .patch(format!("{}/api/v1/submissions/{}", address, retake_id))
        .bearer_auth(&supervisor_token)
        .json(&serde_json::json!({ "questions_and_answers": answers(44, 44) }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let graded: serde_json::Value = response.json().await.unwrap();
    assert_eq!(graded["level"], "READY_TO_PROCEED");

    // Step B is now open; step C is still gated on B's result.
    let response = client
        .post(format!("{}/api/v1/submissions/", address))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({
            "step": "B",
            "questions_and_answers": [{ "question": "Q", "answer": "A" }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    let response = client
        .post(format!("{}/api/v1/submissions/", address))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({
            "step": "C",
            "questions_and_answers": [{ "question": "Q", "answer": "A" }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // Certificate for the passing step A submission.
    let response = client
        .get(format!("{}/api/v1/submissions/{}/certificate", address, retake_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn retake_rollback_preserves_prior_submission() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let email = unique_email("atomic");

    let (student_token, _) = login(&client, &address, &email).await;

    let response = client
        .post(format!("{}/api/v1/submissions/", address))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({
            "step": "A",
            "questions_and_answers": [{ "question": "Q", "answer": "A" }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let submission: serde_json::Value = response.json().await.unwrap();
    let submission_id = uuid::Uuid::parse_str(submission["id"].as_str().unwrap()).unwrap();

    // Same delete+insert sequence the retake runs, with the insert made to
    // fail. Rolling back must leave the prior attempt readable.
    let mut tx = pool.begin().await.unwrap();
    sqlx::query("DELETE FROM submissions WHERE id = $1")
        .bind(submission_id)
        .execute(&mut *tx)
        .await
        .unwrap();
    let insert = sqlx::query(
        "INSERT INTO submissions (submitted_by, step, questions_and_answers) VALUES ((SELECT id FROM users WHERE email = $1), 'A', NULL)",
    )
    .bind(&email)
    .execute(&mut *tx)
    .await;
    assert!(insert.is_err());
    drop(tx);

    let survivors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM submissions WHERE id = $1")
        .bind(submission_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(survivors, 1);
}

#[tokio::test]
async fn updating_a_deleted_submission_is_not_found() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let student_email = unique_email("ghost");
    let supervisor_email = unique_email("marker");

    sqlx::query("INSERT INTO users (email, role) VALUES ($1, 'SUPERVISOR')")
        .bind(&supervisor_email)
        .execute(&pool)
        .await
        .unwrap();

    let (student_token, _) = login(&client, &address, &student_email).await;
    let (supervisor_token, _) = login(&client, &address, &supervisor_email).await;

    let response = client
        .post(format!("{}/api/v1/submissions/", address))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({
            "step": "A",
            "questions_and_answers": [{ "question": "Q", "answer": "A", "correct": false }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let submission: serde_json::Value = response.json().await.unwrap();
    let submission_id = submission["id"].as_str().unwrap().to_string();

    // An omitted answer list grades from the stored correctness flags.
    let response = client
        .patch(format!("{}/api/v1/submissions/{}", address, submission_id))
        .bearer_auth(&supervisor_token)
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let graded: serde_json::Value = response.json().await.unwrap();
    assert_eq!(graded["level"], "FAIL");

    // Once the row is gone, an update is a 404, not a server error.
    let response = client
        .delete(format!("{}/api/v1/submissions/{}", address, submission_id))
        .bearer_auth(&supervisor_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .patch(format!("{}/api/v1/submissions/{}", address, submission_id))
        .bearer_auth(&supervisor_token)
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn question_bank_enforces_per_step_cap() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let admin_email = unique_email("admin");
    let student_email = unique_email("reader");

    sqlx::query("INSERT INTO users (email, role) VALUES ($1, 'ADMIN')")
        .bind(&admin_email)
        .execute(&pool)
        .await
        .unwrap();

    let (admin_token, _) = login(&client, &address, &admin_email).await;
    let (student_token, _) = login(&client, &address, &student_email).await;

    // Start from an empty bank so the cap numbers below are exact.
    sqlx::query("DELETE FROM questions").execute(&pool).await.unwrap();

    // Students may read the bank but not write to it.
    let response = client
        .get(format!("{}/api/v1/questions/", address))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .post(format!("{}/api/v1/questions/", address))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({
            "question": "What is a mortise?",
            "step": "A",
            "level": "ONE",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = client
        .post(format!("{}/api/v1/questions/", address))
        .bearer_auth(&admin_token)
        .json(&serde_json::json!({
            "question": "What is a mortise?",
            "step": "A",
            "level": "ONE",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);

    // Fill step C to the brim, then one more must bounce.
    for i in 0..44 {
        sqlx::query("INSERT INTO questions (question, step, level) VALUES ($1, 'C', 'TWO')")
            .bind(format!("Filler question {}", i))
            .execute(&pool)
            .await
            .unwrap();
    }

    let response = client
        .post(format!("{}/api/v1/questions/", address))
        .bearer_auth(&admin_token)
        .json(&serde_json::json!({
            "question": "One question too many",
            "step": "C",
            "level": "ONE",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn failing_step_a_is_terminal() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();

    let student_email = unique_email("failed");
    let supervisor_email = unique_email("examiner");

    sqlx::query("INSERT INTO users (email, role) VALUES ($1, 'SUPERVISOR')")
        .bind(&supervisor_email)
        .execute(&pool)
        .await
        .unwrap();

    let (student_token, _) = login(&client, &address, &student_email).await;
    let (supervisor_token, _) = login(&client, &address, &supervisor_email).await;

    let response = client
        .post(format!("{}/api/v1/submissions/", address))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({
            "step": "A",
            "questions_and_answers": [{ "question": "Q", "answer": "A" }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let submission: serde_json::Value = response.json().await.unwrap();
    let submission_id = submission["id"].as_str().unwrap().to_string();

    // Grade with nothing marked correct: 0% is FAIL.
    let response = client
        .patch(format!("{}/api/v1/submissions/{}", address, submission_id))
        .bearer_auth(&supervisor_token)
        .json(&serde_json::json!({
            "questions_and_answers": [{ "question": "Q", "answer": "A", "correct": false }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let graded: serde_json::Value = response.json().await.unwrap();
    assert_eq!(graded["level"], "FAIL");

    // No retake path after failing step A.
    let response = client
        .post(format!("{}/api/v1/submissions/", address))
        .bearer_auth(&student_token)
        .json(&serde_json::json!({
            "step": "A",
            "questions_and_answers": [{ "question": "Q", "answer": "A" }],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // And no certificate for a failed submission.
    let response = client
        .get(format!("{}/api/v1/submissions/{}/certificate", address, submission_id))
        .bearer_auth(&student_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}
