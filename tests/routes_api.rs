#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use serde_json::{json, Value};
use serial_test::serial;
use stackit::auth::create_jwt;
use stackit::repo::inmem::InMemRepo;
use stackit::{config, AppState};
use std::sync::Arc;
use uuid::Uuid;

fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
}

fn state(dir: &tempfile::TempDir) -> AppState {
    AppState::new(Arc::new(InMemRepo::with_data_dir(dir.path())))
}

fn token_for(username: &str) -> String {
    create_jwt(Uuid::new_v4(), username).unwrap()
}

async fn json_body(resp: actix_web::dev::ServiceResponse) -> Value {
    serde_json::from_slice(&test::read_body(resp).await).unwrap()
}

#[actix_web::test]
#[serial]
async fn question_answer_vote_comment_flow() {
    setup_env();
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(&dir)))
            .configure(config)
    ).await;

    // create question
    let req = test::TestRequest::post()
        .uri("/api/v1/questions")
        .set_json(json!({"title":"Q","description":"D","tags":["x"],"user":"u"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let created = json_body(resp).await;
    assert_eq!(created["ok"], true);
    let qid = created["data"]["id"].as_str().unwrap().to_string();

    // GET returns it with no answers
    let req = test::TestRequest::get().uri(&format!("/api/v1/questions/{qid}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let q = json_body(resp).await;
    assert_eq!(q["data"]["title"], "Q");
    assert_eq!(q["data"]["user"], "u");
    assert_eq!(q["data"]["answers"], json!([]));

    // post answer
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/questions/{qid}/answers"))
        .set_json(json!({"content":"A","user":"u2"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let answer = json_body(resp).await;
    assert_eq!(answer["data"]["votes"], 0);
    assert_eq!(answer["data"]["isAccepted"], false);
    let aid = answer["data"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get().uri(&format!("/api/v1/questions/{qid}")).to_request();
    let q = json_body(test::call_service(&app, req).await).await;
    assert_eq!(q["data"]["answers"].as_array().unwrap().len(), 1);

    // vote up twice
    for expected in [1, 2] {
        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/questions/{qid}/answers/{aid}/votes"))
            .set_json(json!({"dir":"up"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(json_body(resp).await["data"]["votes"], expected);
    }

    // comment on the answer
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/questions/{qid}/answers/{aid}/comments"))
        .set_json(json!({"content":"nice","user":"u3"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let comment = json_body(resp).await;
    assert_eq!(comment["data"]["votes"], 0);
    let cid = comment["data"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get().uri(&format!("/api/v1/questions/{qid}")).to_request();
    let q = json_body(test::call_service(&app, req).await).await;
    let a = &q["data"]["answers"][0];
    assert_eq!(a["votes"], 2);
    assert_eq!(a["comments"].as_array().unwrap().len(), 1);
    assert_eq!(a["comments"][0]["votes"], 0);

    // down-vote the comment below zero
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/questions/{qid}/answers/{aid}/votes"))
        .set_json(json!({"dir":"down","commentId":cid}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(json_body(resp).await["data"]["votes"], -1);

    // listing
    let req = test::TestRequest::get().uri("/api/v1/questions?tag=x").to_request();
    let list = json_body(test::call_service(&app, req).await).await;
    assert_eq!(list["data"].as_array().unwrap().len(), 1);
    let req = test::TestRequest::get().uri("/api/v1/questions?tag=y").to_request();
    let list = json_body(test::call_service(&app, req).await).await;
    assert_eq!(list["data"].as_array().unwrap().len(), 0);
}

#[actix_web::test]
#[serial]
async fn validation_errors_are_400_envelopes() {
    setup_env();
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(&dir)))
            .configure(config)
    ).await;

    // no tags
    let req = test::TestRequest::post()
        .uri("/api/v1/questions")
        .set_json(json!({"title":"Q","description":"D","tags":[],"user":"u"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body = json_body(resp).await;
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().contains("tag"));

    let req = test::TestRequest::post()
        .uri("/api/v1/questions")
        .set_json(json!({"title":"Q","description":"D","tags":["x"],"user":"u"}))
        .to_request();
    let qid = json_body(test::call_service(&app, req).await).await["data"]["id"].as_str().unwrap().to_string();

    // whitespace-only content
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/questions/{qid}/answers"))
        .set_json(json!({"content":"   ","user":"u2"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(json_body(resp).await["error"], "Content required");

    // no author at all
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/questions/{qid}/answers"))
        .set_json(json!({"content":"A"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    // malformed body
    let req = test::TestRequest::post()
        .uri("/api/v1/questions")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    assert_eq!(json_body(resp).await["ok"], false);
}

#[actix_web::test]
#[serial]
async fn unknown_targets_are_404() {
    setup_env();
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(&dir)))
            .configure(config)
    ).await;
    let missing = Uuid::new_v4();

    let req = test::TestRequest::get().uri(&format!("/api/v1/questions/{missing}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    assert_eq!(json_body(resp).await["error"], "Question not found");

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/questions/{missing}/answers/{missing}/votes"))
        .set_json(json!({"dir":"up"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let req = test::TestRequest::get().uri("/api/v1/questions/not-a-uuid").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    assert_eq!(json_body(resp).await["ok"], false);

    // existing question, unknown answer / comment
    let req = test::TestRequest::post()
        .uri("/api/v1/questions")
        .set_json(json!({"title":"Q","description":"D","tags":["x"],"user":"u"}))
        .to_request();
    let qid = json_body(test::call_service(&app, req).await).await["data"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/questions/{qid}/answers/{missing}/comments"))
        .set_json(json!({"content":"c","user":"u"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    assert_eq!(json_body(resp).await["error"], "Answer not found");

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/questions/{qid}/answers"))
        .set_json(json!({"content":"A","user":"u2"}))
        .to_request();
    let aid = json_body(test::call_service(&app, req).await).await["data"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/questions/{qid}/answers/{aid}/votes"))
        .set_json(json!({"dir":"up","commentId":missing}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    assert_eq!(json_body(resp).await["error"], "Comment not found");

    // unknown direction is a validation error
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/questions/{qid}/answers/{aid}/votes"))
        .set_json(json!({"dir":"sideways"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_web::test]
#[serial]
async fn only_question_author_accepts() {
    setup_env();
    let dir = tempfile::tempdir().unwrap();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state(&dir)))
            .configure(config)
    ).await;

    // authenticated author overrides the body's user field
    let req = test::TestRequest::post()
        .uri("/api/v1/questions")
        .insert_header(("Authorization", format!("Bearer {}", token_for("owner"))))
        .set_json(json!({"title":"Q","description":"D","tags":["x"],"user":"someone-else"}))
        .to_request();
    let q = json_body(test::call_service(&app, req).await).await;
    assert_eq!(q["data"]["user"], "owner");
    let qid = q["data"]["id"].as_str().unwrap().to_string();

    let mut answer_ids = Vec::new();
    for content in ["A1", "A2"] {
        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/questions/{qid}/answers"))
            .set_json(json!({"content":content,"user":"helper"}))
            .to_request();
        let a = json_body(test::call_service(&app, req).await).await;
        answer_ids.push(a["data"]["id"].as_str().unwrap().to_string());
    }
    let accept_uri = |aid: &str| format!("/api/v1/questions/{qid}/answers/{aid}/accept");

    let req = test::TestRequest::post().uri(&accept_uri(&answer_ids[0])).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    let req = test::TestRequest::post()
        .uri(&accept_uri(&answer_ids[0]))
        .insert_header(("Authorization", format!("Bearer {}", token_for("helper"))))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 403);

    for aid in &answer_ids {
        let req = test::TestRequest::post()
            .uri(&accept_uri(aid))
            .insert_header(("Authorization", format!("Bearer {}", token_for("owner"))))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(json_body(resp).await["data"]["isAccepted"], true);
    }

    let req = test::TestRequest::get().uri(&format!("/api/v1/questions/{qid}")).to_request();
    let q = json_body(test::call_service(&app, req).await).await;
    assert_eq!(q["data"]["answers"][0]["isAccepted"], false);
    assert_eq!(q["data"]["answers"][1]["isAccepted"], true);
}
