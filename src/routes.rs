// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, config as config_handler, questions, submissions, users},
    state::AppState,
    utils::jwt::authorize,
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, users, submissions, config).
/// * Protected routers share one `authorize` layer; each handler performs
///   its own role-set check at entry.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:3000".parse().unwrap(),
        "http://127.0.0.1:3000".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/otp", post(auth::request_otp))
        .route("/login", post(auth::login));

    let user_routes = Router::new()
        .route("/", get(users::list_users).post(users::create_user))
        .route(
            "/{id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        );

    let submission_routes = Router::new()
        .route(
            "/",
            post(submissions::create_submission).get(submissions::list_submissions),
        )
        .route(
            "/{id}",
            get(submissions::get_submission)
                .patch(submissions::update_submission)
                .delete(submissions::delete_submission),
        )
        .route("/{id}/certificate", get(submissions::send_certificate));

    let question_routes = Router::new()
        .route(
            "/",
            get(questions::list_questions).post(questions::create_question),
        )
        .route(
            "/{id}",
            get(questions::get_question)
                .patch(questions::update_question)
                .delete(questions::delete_question),
        );

    let config_routes = Router::new().route(
        "/",
        get(config_handler::get_config).put(config_handler::update_config),
    );

    // `nest` alone serves the collection roots only without a trailing
    // slash; register explicit aliases so `/users/` etc. resolve too.
    let protected_routes = Router::new()
        .nest("/users", user_routes)
        .nest("/submissions", submission_routes)
        .nest("/questions", question_routes)
        .nest("/config", config_routes)
        .route("/users/", get(users::list_users).post(users::create_user))
        .route(
            "/submissions/",
            post(submissions::create_submission).get(submissions::list_submissions),
        )
        .route(
            "/questions/",
            get(questions::list_questions).post(questions::create_question),
        )
        .route(
            "/config/",
            get(config_handler::get_config).put(config_handler::update_config),
        )
        .layer(middleware::from_fn_with_state(state.clone(), authorize));

    Router::new()
        .nest("/api/v1/auth", auth_routes)
        .nest("/api/v1", protected_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
