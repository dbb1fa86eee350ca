use crate::models::{
    Answer, Comment, LoginRequest, LoginResponse, MarkedRead, NewNotification, NewPost, NewQuestion, Notification,
    NotificationKind, Question, SignupRequest, UpdateProfile, UserProfile, VoteDirection, VoteRequest, VoteTally,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_questions,
        crate::routes::create_question,
        crate::routes::get_question,
        crate::routes::add_answer,
        crate::routes::add_comment,
        crate::routes::vote,
        crate::routes::accept_answer,
        crate::routes::signup,
        crate::routes::login,
        crate::routes::auth_me,
        crate::routes::update_profile,
        crate::routes::create_notification,
        crate::routes::my_notifications,
        crate::routes::mark_notifications_read,
    ),
    components(schemas(
        Question, NewQuestion, Answer, Comment, NewPost,
        VoteDirection, VoteRequest, VoteTally,
        Notification, NewNotification, NotificationKind, MarkedRead,
        SignupRequest, LoginRequest, LoginResponse, UserProfile, UpdateProfile,
    )),
    tags(
        (name = "questions", description = "Question operations"),
        (name = "answers", description = "Answers, comments and votes"),
        (name = "auth", description = "Accounts and profiles"),
        (name = "notifications", description = "Activity notifications"),
    )
)]
pub struct ApiDoc;
