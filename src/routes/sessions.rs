use actix_web::{post, put, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::EventKey;
use crate::state::AppState;

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(create_session)
        .service(update_presenter_state)
        .service(post_question)
        .service(publish_activity)
        .service(submit_response);
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionPayload {
    pub name: String,
}

#[post("/events")]
pub async fn create_session(
    state: web::Data<AppState>,
    req: web::Json<CreateSessionPayload>,
) -> AppResult<HttpResponse> {
    let session = state.sessions.create_session(&req.name).await;
    Ok(HttpResponse::Created().json(session))
}

#[put("/events/{event_key}/presenter-state")]
pub async fn update_presenter_state(
    path: web::Path<String>,
    state: web::Data<AppState>,
    req: web::Json<serde_json::Value>,
) -> AppResult<HttpResponse> {
    let key = EventKey::new(&path.into_inner());
    state
        .sessions
        .update_presenter_state(&key, req.into_inner())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Debug, Deserialize)]
pub struct PostQuestionPayload {
    pub body: String,
    pub author: Option<String>,
}

#[post("/events/{event_key}/questions")]
pub async fn post_question(
    path: web::Path<String>,
    state: web::Data<AppState>,
    req: web::Json<PostQuestionPayload>,
) -> AppResult<HttpResponse> {
    let key = EventKey::new(&path.into_inner());
    let question = state
        .sessions
        .post_question(&key, &req.body, req.author.clone())
        .await?;
    Ok(HttpResponse::Created().json(question))
}

#[derive(Debug, Deserialize)]
pub struct PublishActivityPayload {
    pub kind: String,
    pub prompt: String,
}

#[post("/events/{event_key}/activities")]
pub async fn publish_activity(
    path: web::Path<String>,
    state: web::Data<AppState>,
    req: web::Json<PublishActivityPayload>,
) -> AppResult<HttpResponse> {
    let key = EventKey::new(&path.into_inner());
    let activity = state
        .sessions
        .publish_activity(&key, &req.kind, &req.prompt)
        .await?;
    Ok(HttpResponse::Created().json(activity))
}

#[derive(Debug, Deserialize)]
pub struct SubmitResponsePayload {
    pub value: serde_json::Value,
}

#[post("/events/{event_key}/activities/{activity_id}/responses")]
pub async fn submit_response(
    path: web::Path<(String, Uuid)>,
    state: web::Data<AppState>,
    req: web::Json<SubmitResponsePayload>,
) -> AppResult<HttpResponse> {
    let (raw_key, activity_id) = path.into_inner();
    let key = EventKey::new(&raw_key);
    let response = state
        .sessions
        .submit_response(&key, activity_id, req.value.clone())
        .await?;
    Ok(HttpResponse::Created().json(response))
}
