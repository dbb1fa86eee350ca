use std::sync::Arc;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{create_jwt, hash_password, verify_password, Auth};
use crate::error::{json_error_handler, ApiError};
use crate::models::*;
use crate::notify;
use crate::rate_limit::{Action, RateLimiterFacade};
use crate::repo::{Repo, RepoError};
use crate::response::{created, ok};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::PathConfig::default().error_handler(|_, _| ApiError::NotFound("Resource not found".into()).into()));
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::resource("/questions")
                    .route(web::get().to(list_questions))
                    .route(web::post().to(create_question)),
            )
            .service(web::resource("/questions/{id}").route(web::get().to(get_question)))
            .service(web::resource("/questions/{id}/answers").route(web::post().to(add_answer)))
            .service(
                web::resource("/questions/{id}/answers/{answer_id}/comments")
                    .route(web::post().to(add_comment)),
            )
            .service(
                web::resource("/questions/{id}/answers/{answer_id}/votes")
                    .route(web::post().to(vote)),
            )
            .service(
                web::resource("/questions/{id}/answers/{answer_id}/accept")
                    .route(web::post().to(accept_answer)),
            )
            .service(web::resource("/auth/signup").route(web::post().to(signup)))
            .service(web::resource("/auth/login").route(web::post().to(login)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me)))
            .service(web::resource("/users/me").route(web::patch().to(update_profile)))
            .service(web::resource("/notifications").route(web::post().to(create_notification)))
            .service(web::resource("/notifications/me").route(web::get().to(my_notifications)))
            .service(web::resource("/notifications/read").route(web::post().to(mark_notifications_read))),
    );
}

#[derive(Clone)]
pub struct AppState { pub repo: Arc<dyn Repo>, pub rate_limiter: Option<RateLimiterFacade> }

impl AppState {
    pub fn new(repo: Arc<dyn Repo>) -> Self {
        Self { repo, rate_limiter: None }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiterFacade) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    fn check_rate(&self, req: &HttpRequest, action: Action) -> Result<(), ApiError> {
        let Some(rl) = &self.rate_limiter else { return Ok(()) };
        let info = req.connection_info();
        let client = info.realip_remote_addr().unwrap_or("unknown");
        if rl.allow(action, client) {
            Ok(())
        } else {
            tracing::info!(?action, %client, "rate limited");
            Err(ApiError::TooManyRequests)
        }
    }
}

/// Authenticated username wins over the body's `user` field.
fn resolve_author(auth: &Option<Auth>, body_user: Option<String>) -> Result<String, ApiError> {
    if let Some(a) = auth {
        return Ok(a.username().to_string());
    }
    body_user
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::BadRequest("User is required".into()))
}

fn ensure_content(content: &str) -> Result<(), ApiError> {
    if content.trim().is_empty() {
        return Err(ApiError::BadRequest("Content required".into()));
    }
    Ok(())
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Only questions carrying this exact tag.
    pub tag: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/v1/questions",
    params(ListQuery),
    tag = "questions",
    responses(
        (status = 200, description = "Questions, newest first", body = [Question])
    )
)]
pub async fn list_questions(data: web::Data<AppState>, query: web::Query<ListQuery>) -> Result<HttpResponse, ApiError> {
    let tag = query.tag.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let questions = data.repo.list_questions(tag).await?;
    Ok(ok(questions))
}

#[utoipa::path(
    post,
    path = "/api/v1/questions",
    request_body = NewQuestion,
    tag = "questions",
    responses(
        (status = 201, description = "Question created", body = Question),
        (status = 400, description = "Missing title, description or tags"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_question(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    payload: web::Json<NewQuestion>,
) -> Result<HttpResponse, ApiError> {
    data.check_rate(&req, Action::Question)?;
    let new = payload.into_inner();
    let title = new.title.trim().to_string();
    let tags: Vec<String> = new.tags.iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if title.is_empty() || new.description.trim().is_empty() || tags.is_empty() {
        return Err(ApiError::BadRequest("Title, description and at least one tag are required".into()));
    }
    let user = resolve_author(&auth, new.user)?;
    let question = data.repo
        .insert_question(Question::create(title, new.description, tags, user))
        .await?;
    tracing::info!(question_id = %question.id, "question created");
    Ok(created(question))
}

#[utoipa::path(
    get,
    path = "/api/v1/questions/{id}",
    params(("id" = Uuid, Path, description = "Question id")),
    tag = "questions",
    responses(
        (status = 200, description = "Question with its answers and comments", body = Question),
        (status = 404, description = "Question not found")
    )
)]
pub async fn get_question(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let question = data.repo.get_question(path.into_inner()).await?;
    Ok(ok(question))
}

#[utoipa::path(
    post,
    path = "/api/v1/questions/{id}/answers",
    request_body = NewPost,
    params(("id" = Uuid, Path, description = "Question id")),
    tag = "answers",
    responses(
        (status = 201, description = "Answer appended", body = Answer),
        (status = 400, description = "Empty content"),
        (status = 404, description = "Question not found")
    )
)]
pub async fn add_answer(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewPost>,
) -> Result<HttpResponse, ApiError> {
    data.check_rate(&req, Action::Answer)?;
    let question_id = path.into_inner();
    let NewPost { content, user } = payload.into_inner();
    ensure_content(&content)?;
    let answer = Answer::new(content, resolve_author(&auth, user)?);
    let answer_id = answer.id;

    let question = data.repo.add_answer(question_id, answer).await?;
    let answer = question.answer(answer_id).cloned().ok_or(ApiError::Internal)?;
    notify::dispatch(data.repo.clone(), notify::answer_posted(&question, &answer));
    Ok(created(answer))
}

#[utoipa::path(
    post,
    path = "/api/v1/questions/{id}/answers/{answer_id}/comments",
    request_body = NewPost,
    params(
        ("id" = Uuid, Path, description = "Question id"),
        ("answer_id" = Uuid, Path, description = "Answer id")
    ),
    tag = "answers",
    responses(
        (status = 201, description = "Comment appended", body = Comment),
        (status = 400, description = "Empty content"),
        (status = 404, description = "Question or answer not found")
    )
)]
pub async fn add_comment(
    req: HttpRequest,
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
    payload: web::Json<NewPost>,
) -> Result<HttpResponse, ApiError> {
    data.check_rate(&req, Action::Comment)?;
    let (question_id, answer_id) = path.into_inner();
    let NewPost { content, user } = payload.into_inner();
    ensure_content(&content)?;
    let comment = Comment::new(content, resolve_author(&auth, user)?);
    let comment_id = comment.id;

    let question = data.repo.add_comment(question_id, answer_id, comment).await?;
    let answer = question.answer(answer_id).ok_or(ApiError::Internal)?;
    let comment = answer.comments.iter().find(|c| c.id == comment_id).cloned().ok_or(ApiError::Internal)?;
    notify::dispatch(data.repo.clone(), notify::comment_posted(answer, &comment));
    Ok(created(comment))
}

#[utoipa::path(
    post,
    path = "/api/v1/questions/{id}/answers/{answer_id}/votes",
    request_body = VoteRequest,
    params(
        ("id" = Uuid, Path, description = "Question id"),
        ("answer_id" = Uuid, Path, description = "Answer id")
    ),
    tag = "answers",
    responses(
        (status = 200, description = "New tally of the answer, or of the comment when commentId is given", body = VoteTally),
        (status = 400, description = "Unknown direction"),
        (status = 404, description = "Question, answer or comment not found")
    )
)]
pub async fn vote(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
    payload: web::Json<VoteRequest>,
) -> Result<HttpResponse, ApiError> {
    data.check_rate(&req, Action::Vote)?;
    let (question_id, answer_id) = path.into_inner();
    let VoteRequest { dir, comment_id } = payload.into_inner();
    let target = match comment_id {
        Some(comment_id) => VoteTarget::Comment { answer_id, comment_id },
        None => VoteTarget::Answer { answer_id },
    };
    let votes = data.repo.vote(question_id, target, dir).await?;
    tracing::debug!(%question_id, ?target, ?dir, votes, "vote applied");
    Ok(ok(VoteTally { votes }))
}

#[utoipa::path(
    post,
    path = "/api/v1/questions/{id}/answers/{answer_id}/accept",
    params(
        ("id" = Uuid, Path, description = "Question id"),
        ("answer_id" = Uuid, Path, description = "Answer id")
    ),
    tag = "answers",
    responses(
        (status = 200, description = "Answer accepted", body = Answer),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Only the question's author may accept"),
        (status = 404, description = "Question or answer not found")
    )
)]
pub async fn accept_answer(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
) -> Result<HttpResponse, ApiError> {
    let (question_id, answer_id) = path.into_inner();
    let question = data.repo.get_question(question_id).await?;
    if question.user != auth.username() {
        return Err(ApiError::Forbidden);
    }
    let question = data.repo.accept_answer(question_id, answer_id).await?;
    let answer = question.answer(answer_id).cloned().ok_or(ApiError::Internal)?;
    Ok(ok(answer))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    request_body = SignupRequest,
    tag = "auth",
    responses(
        (status = 201, description = "User created", body = UserProfile),
        (status = 400, description = "Invalid input or user already exists")
    )
)]
pub async fn signup(data: web::Data<AppState>, payload: web::Json<SignupRequest>) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner().normalized();
    req.validate()?;
    let password_hash = hash_password(&req.password).map_err(|e| {
        tracing::error!(error = %e, "password hashing failed");
        ApiError::Internal
    })?;
    let user = data.repo
        .create_user(NewUser { username: req.username, email: req.email, password_hash })
        .await
        .map_err(|e| match e {
            RepoError::Conflict => ApiError::BadRequest("User already exists".into()),
            other => other.into(),
        })?;
    tracing::info!(user_id = %user.id, "user registered");
    Ok(created(UserProfile::from(user)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    tag = "auth",
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Missing username or password"),
        (status = 401, description = "Invalid username or password")
    )
)]
pub async fn login(data: web::Data<AppState>, payload: web::Json<LoginRequest>) -> Result<HttpResponse, ApiError> {
    let req = payload.into_inner();
    req.validate()?;
    let invalid = || ApiError::Unauthorized("Invalid username or password".into());
    let user = match data.repo.find_user_by_username(req.username.trim()).await {
        Ok(u) => u,
        Err(RepoError::NotFound(_)) => return Err(invalid()),
        Err(e) => return Err(e.into()),
    };
    if !verify_password(&req.password, &user.password_hash) {
        return Err(invalid());
    }
    let token = create_jwt(user.id, &user.username).map_err(|e| {
        tracing::error!(error = %e, "token signing failed");
        ApiError::Internal
    })?;
    Ok(ok(LoginResponse { user: user.into(), token }))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user's profile", body = UserProfile),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn auth_me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(auth.user_id()?).await?;
    Ok(ok(UserProfile::from(user)))
}

#[utoipa::path(
    patch,
    path = "/api/v1/users/me",
    request_body = UpdateProfile,
    tag = "auth",
    responses(
        (status = 200, description = "Profile updated", body = UserProfile),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn update_profile(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<UpdateProfile>,
) -> Result<HttpResponse, ApiError> {
    let user = data.repo.update_profile(auth.user_id()?, payload.into_inner()).await?;
    Ok(ok(UserProfile::from(user)))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications",
    request_body = NewNotification,
    tag = "notifications",
    responses(
        (status = 201, description = "Notification recorded", body = Notification),
        (status = 400, description = "Missing recipient")
    )
)]
pub async fn create_notification(
    data: web::Data<AppState>,
    payload: web::Json<NewNotification>,
) -> Result<HttpResponse, ApiError> {
    let new = payload.into_inner();
    if new.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("userId is required".into()));
    }
    let n = data.repo.create_notification(new).await?;
    Ok(created(n))
}

#[utoipa::path(
    get,
    path = "/api/v1/notifications/me",
    tag = "notifications",
    responses(
        (status = 200, description = "Notifications, newest first", body = [Notification]),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn my_notifications(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let notifications = data.repo.list_notifications(auth.username()).await?;
    Ok(ok(notifications))
}

#[utoipa::path(
    post,
    path = "/api/v1/notifications/read",
    tag = "notifications",
    responses(
        (status = 200, description = "Unread notifications marked read", body = MarkedRead),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn mark_notifications_read(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let updated = data.repo.mark_all_read(auth.username()).await?;
    Ok(ok(MarkedRead { updated }))
}
