//! User management endpoints: create, list and fetch interview candidates.

use crate::repository::User;
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// Generated when absent
    pub user_id: Option<String>,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub selected: bool,
}

/// ## Endpoint: `POST /api/v1/users`
///
/// Returns `201` with the stored user, `400` when the id is taken or a
/// required field is blank.
pub async fn create_user(
    state: web::Data<AppState>,
    request: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, AppError> {
    let request = request.into_inner();
    if request.name.trim().is_empty() || request.phone.trim().is_empty() {
        return Err(AppError::BadRequest("'name' and 'phone' are required".to_string()));
    }

    let user_id = request
        .user_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    if state.repository.find_user(&user_id).await?.is_some() {
        return Err(AppError::BadRequest(format!("User {} already exists", user_id)));
    }

    let user = User {
        user_id,
        name: request.name,
        phone: request.phone,
        questions: request.questions,
        selected: request.selected,
        call_status: None,
        call_sid: None,
        transcript: Vec::new(),
    };
    state.repository.insert_user(user.clone()).await?;

    Ok(HttpResponse::Created().json(user))
}

/// ## Endpoint: `GET /api/v1/users`
pub async fn list_users(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let users = state.repository.list_users().await?;
    Ok(HttpResponse::Ok().json(json!({
        "count": users.len(),
        "users": users
    })))
}

/// ## Endpoint: `GET /api/v1/users/{id}`
pub async fn get_user(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    let user = state
        .repository
        .find_user(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
    Ok(HttpResponse::Ok().json(user))
}
