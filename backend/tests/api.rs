use std::net::SocketAddr;
use std::sync::Arc;
use backend::{build_rocket, routes::AppState, service::VotingService, store::MemoryStore};
use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;
use serde_json::{json, Value};
use shared::{identity::IdentityPolicy, CANDIDATES};

const SECRET: &str = "winter-is-coming";

async fn client_with(policy: IdentityPolicy, secret: Option<&str>) -> Client {
    let service = VotingService::new(Arc::new(MemoryStore::new()));
    service.bootstrap(&CANDIDATES).await.unwrap();
    let state = AppState::new(service, policy.resolver(), secret);
    Client::tracked(build_rocket(state, "*")).await.unwrap()
}

async fn client() -> Client {
    client_with(IdentityPolicy::ClientToken, Some(SECRET)).await
}

async fn vote(client: &Client, body: Value) -> (Status, Value) {
    let response = client.post("/api/vote").json(&body).dispatch().await;
    let status = response.status();
    (status, response.into_json::<Value>().await.unwrap())
}

async fn get_json(client: &Client, uri: &str) -> (Status, Value) {
    let response = client.get(uri.to_string()).dispatch().await;
    let status = response.status();
    (status, response.into_json::<Value>().await.unwrap())
}

async fn reset(client: &Client, secret: Option<&str>) -> Status {
    let mut request = client.post("/api/citadel-reset-secret-99");
    if let Some(secret) = secret {
        request = request.header(Header::new("X-Admin-Secret", secret.to_string()));
    }
    request.dispatch().await.status()
}

#[rocket::async_test]
async fn test_tallies_start_at_zero() {
    let client = client().await;
    let (status, body) = get_json(&client, "/api/votes").await;

    assert_eq!(status, Status::Ok);
    let tallies = body.as_object().unwrap();
    assert_eq!(tallies.len(), CANDIDATES.len());
    assert!(CANDIDATES.iter().all(|id| tallies[*id] == json!(0)));
}

#[rocket::async_test]
async fn test_vote_until_limit() {
    let client = client().await;

    for (i, character) in ["jon", "jon", "dany"].iter().enumerate() {
        let (status, body) = vote(&client, json!({"characterId": character, "voterId": "u1"})).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["votes_used"], json!(i + 1));
    }

    let (status, body) = vote(&client, json!({"characterId": "dany", "voterId": "u1"})).await;
    assert_eq!(status, Status::Forbidden);
    assert_eq!(body["remaining"], json!(0));
    assert!(body["error"].is_string());

    let (_, tallies) = get_json(&client, "/api/votes").await;
    assert_eq!(tallies["jon"], json!(2));
    assert_eq!(tallies["dany"], json!(1));

    let (_, status_body) = get_json(&client, "/api/voter-status?voterId=u1").await;
    assert_eq!(status_body, json!({"votes_used": 3}));
}

#[rocket::async_test]
async fn test_new_count_is_reported() {
    let client = client().await;
    vote(&client, json!({"characterId": "arya", "voterId": "a"})).await;
    let (_, body) = vote(&client, json!({"characterId": "arya", "voterId": "b"})).await;
    assert_eq!(body, json!({"success": true, "new_count": 2, "votes_used": 1}));
}

#[rocket::async_test]
async fn test_missing_voter_is_bad_request() {
    let client = client().await;
    let (status, body) = vote(&client, json!({"characterId": "jon"})).await;
    assert_eq!(status, Status::BadRequest);
    assert!(body["error"].is_string());

    let (status, _) = vote(&client, json!({"characterId": "jon", "voterId": ""})).await;
    assert_eq!(status, Status::BadRequest);
}

#[rocket::async_test]
async fn test_unknown_candidate_is_not_found() {
    let client = client().await;
    let (status, _) = vote(&client, json!({"characterId": "drogo", "voterId": "u1"})).await;
    assert_eq!(status, Status::NotFound);

    let (_, body) = get_json(&client, "/api/voter-status?voterId=u1").await;
    assert_eq!(body, json!({"votes_used": 0}));
}

#[rocket::async_test]
async fn test_voter_status_without_id_is_zero() {
    let client = client().await;
    let (status, body) = get_json(&client, "/api/voter-status").await;
    assert_eq!(status, Status::Ok);
    assert_eq!(body, json!({"votes_used": 0}));
}

#[rocket::async_test]
async fn test_malformed_body_is_rejected() {
    let client = client().await;
    let response = client
        .post("/api/vote")
        .header(ContentType::JSON)
        .body("{not json")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);

    let response = client
        .post("/api/vote")
        .header(ContentType::JSON)
        .body(r#"{"characterId": 5, "voterId": "u1"}"#)
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::UnprocessableEntity);
}

#[rocket::async_test]
async fn test_network_origin_identity_ignores_token() {
    let client = client_with(IdentityPolicy::NetworkOrigin, Some(SECRET)).await;

    for token in ["a", "b", "c"] {
        let response = client
            .post("/api/vote")
            .header(Header::new("X-Forwarded-For", "203.0.113.7, 10.0.0.1"))
            .json(&json!({"characterId": "bran", "voterId": token}))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
    }

    let response = client
        .post("/api/vote")
        .header(Header::new("X-Forwarded-For", "203.0.113.7"))
        .json(&json!({"characterId": "bran", "voterId": "d"}))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);

    let peer: SocketAddr = "198.51.100.4:40000".parse().unwrap();
    let response = client
        .post("/api/vote")
        .remote(peer)
        .json(&json!({"characterId": "bran"}))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let response = client
        .get("/api/voter-status")
        .remote(peer)
        .dispatch()
        .await;
    assert_eq!(response.into_json::<Value>().await.unwrap(), json!({"votes_used": 1}));
}

#[rocket::async_test]
async fn test_reset_requires_secret() {
    let client = client().await;
    vote(&client, json!({"characterId": "sansa", "voterId": "u1"})).await;

    assert_eq!(reset(&client, None).await, Status::Unauthorized);
    assert_eq!(reset(&client, Some("wrong")).await, Status::Unauthorized);
    let (_, tallies) = get_json(&client, "/api/votes").await;
    assert_eq!(tallies["sansa"], json!(1));

    let response = client
        .post("/api/citadel-reset-secret-99")
        .header(Header::new("X-Admin-Secret", SECRET))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body = response.into_json::<Value>().await.unwrap();
    assert!(body["message"].is_string());

    let (_, tallies) = get_json(&client, "/api/votes").await;
    assert!(tallies.as_object().unwrap().values().all(|count| *count == json!(0)));
    let (_, status_body) = get_json(&client, "/api/voter-status?voterId=u1").await;
    assert_eq!(status_body, json!({"votes_used": 0}));
}

#[rocket::async_test]
async fn test_reset_disabled_without_configured_secret() {
    let client = client_with(IdentityPolicy::ClientToken, None).await;
    assert_eq!(reset(&client, Some("anything")).await, Status::Forbidden);
}

#[rocket::async_test]
async fn test_reset_guessing_is_rate_limited() {
    let client = client().await;
    for _ in 0..5 {
        assert_eq!(reset(&client, Some("guess")).await, Status::Unauthorized);
    }
    assert_eq!(reset(&client, Some("guess")).await, Status::TooManyRequests);
    assert_eq!(reset(&client, Some(SECRET)).await, Status::TooManyRequests);
}

#[rocket::async_test]
async fn test_reset_throttle_ignores_forwarded_for() {
    let client = client().await;
    let peer: SocketAddr = "198.51.100.9:50000".parse().unwrap();

    let mut statuses = Vec::new();
    for i in 0..8 {
        let response = client
            .post("/api/citadel-reset-secret-99")
            .remote(peer)
            .header(Header::new("X-Forwarded-For", format!("10.9.9.{}", i)))
            .header(Header::new("X-Admin-Secret", "guess"))
            .dispatch()
            .await;
        statuses.push(response.status());
    }

    assert!(statuses[..5].iter().all(|s| *s == Status::Unauthorized));
    assert!(statuses[5..].iter().all(|s| *s == Status::TooManyRequests));

    // A different peer still has its own allowance.
    let other: SocketAddr = "198.51.100.10:50000".parse().unwrap();
    let response = client
        .post("/api/citadel-reset-secret-99")
        .remote(other)
        .header(Header::new("X-Admin-Secret", SECRET))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
}

#[rocket::async_test]
async fn test_cors_headers() {
    let client = client().await;

    let response = client.get("/api/votes").dispatch().await;
    assert_eq!(
        response.headers().get_one("Access-Control-Allow-Origin"),
        Some("*")
    );

    let response = client.options("/api/vote").dispatch().await;
    assert_eq!(response.status(), Status::Ok);
    assert!(response
        .headers()
        .get_one("Access-Control-Allow-Headers")
        .unwrap()
        .contains("X-Admin-Secret"));
}

#[rocket::async_test]
async fn test_unknown_route_returns_json_error() {
    let client = client().await;
    let (status, body) = get_json(&client, "/api/nowhere").await;
    assert_eq!(status, Status::NotFound);
    assert!(body["error"].is_string());
}
