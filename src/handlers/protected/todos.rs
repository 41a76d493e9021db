// handlers/protected/todos.rs - /api/orgs/:slug/todos handlers
//
// Organization-scoped todo list. The store stands in for the data-access layer:
// every store call counts as one query on the request log.

use std::collections::HashMap;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::observability::{self, OrgIdentity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub id: Uuid,
    pub title: String,
    pub done: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTodo {
    pub title: String,
}

/// In-memory todo lists keyed by organization id
#[derive(Debug, Default)]
pub struct TodoStore {
    lists: RwLock<HashMap<String, Vec<Todo>>>,
}

impl TodoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list(&self, org_id: &str) -> Vec<Todo> {
        observability::increment_db_queries(1);
        let lists = self.lists.read().await;
        lists.get(org_id).cloned().unwrap_or_default()
    }

    pub async fn insert(&self, org_id: &str, todo: Todo) -> Todo {
        observability::increment_db_queries(1);
        let mut lists = self.lists.write().await;
        lists.entry(org_id.to_string()).or_default().push(todo.clone());
        todo
    }

    pub async fn remove(&self, org_id: &str, id: Uuid) -> Option<Todo> {
        observability::increment_db_queries(1);
        let mut lists = self.lists.write().await;
        let list = lists.get_mut(org_id)?;
        let index = list.iter().position(|t| t.id == id)?;
        Some(list.remove(index))
    }
}

/// Resolve the organization in the path against the token and record it on the request log
fn resolve_org(user: &AuthUser, slug: &str) -> Result<OrgIdentity, ApiError> {
    match (&user.org_id, &user.org_slug) {
        (Some(org_id), Some(org_slug)) if org_slug == slug => {
            let org = OrgIdentity {
                id: org_id.clone(),
                slug: Some(org_slug.clone()),
            };
            observability::add_org_context(&org, user.org_role.as_deref());
            Ok(org)
        }
        _ => {
            tracing::warn!(user_id = %user.user_id, slug = %slug, "Organization access denied");
            Err(ApiError::forbidden(format!("No access to organization '{}'", slug)))
        }
    }
}

/// GET /api/orgs/:slug/todos - list the organization's todos
pub async fn todos_get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(slug): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let org = resolve_org(&user, &slug)?;

    let todos = state.todos.list(&org.id).await;
    observability::log::debug(format!("loaded {} todos", todos.len()));

    Ok(Json(json!({ "success": true, "data": todos })))
}

/// POST /api/orgs/:slug/todos - create a todo
pub async fn todos_post(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(slug): Path<String>,
    Json(body): Json<CreateTodo>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let org = resolve_org(&user, &slug)?;

    let title = body.title.trim();
    if title.is_empty() {
        let mut field_errors = HashMap::new();
        field_errors.insert("title".to_string(), "This field is required".to_string());
        return Err(ApiError::unprocessable_entity("Invalid todo", field_errors));
    }

    let todo = Todo {
        id: Uuid::new_v4(),
        title: title.to_string(),
        done: false,
        created_by: user.user_id.clone(),
        created_at: Utc::now(),
    };
    let todo = state.todos.insert(&org.id, todo).await;
    observability::log::info(format!("created todo {}", todo.id));

    Ok((StatusCode::CREATED, Json(json!({ "success": true, "data": todo }))))
}

/// DELETE /api/orgs/:slug/todos/:id - remove a todo
pub async fn todo_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((slug, id)): Path<(String, Uuid)>,
) -> Result<Json<Value>, ApiError> {
    let org = resolve_org(&user, &slug)?;

    match state.todos.remove(&org.id, id).await {
        Some(todo) => Ok(Json(json!({ "success": true, "data": todo }))),
        None => {
            observability::log::warn(format!("todo {} not found", id));
            Err(ApiError::not_found(format!("Todo '{}' not found", id)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::{run_with_context, LogContext, RequestHandle};

    fn member_of(slug: &str) -> AuthUser {
        AuthUser {
            user_id: "user-1".to_string(),
            email: None,
            role: "member".to_string(),
            org_id: Some(format!("org-{slug}")),
            org_slug: Some(slug.to_string()),
            org_role: Some("owner".to_string()),
            impersonator_id: None,
        }
    }

    #[tokio::test]
    async fn test_store_counts_queries_on_the_request_log() {
        let store = TodoStore::new();
        let handle = RequestHandle::new(LogContext::new("req-1", "POST", "/api/orgs/acme/todos"));

        run_with_context(handle.clone(), async {
            let todo = Todo {
                id: Uuid::new_v4(),
                title: "ship it".to_string(),
                done: false,
                created_by: "user-1".to_string(),
                created_at: Utc::now(),
            };
            store.insert("org-acme", todo.clone()).await;
            assert_eq!(store.list("org-acme").await.len(), 1);
            assert!(store.remove("org-acme", todo.id).await.is_some());
            assert!(store.remove("org-acme", todo.id).await.is_none());
        })
        .await;

        assert_eq!(handle.snapshot().db_queries_count, 4);
    }

    #[tokio::test]
    async fn test_resolve_org_records_org_or_forbids() {
        let handle = RequestHandle::default();
        let user = member_of("acme");

        run_with_context(handle.clone(), async {
            assert!(resolve_org(&user, "acme").is_ok());
            let err = resolve_org(&user, "globex").unwrap_err();
            assert_eq!(err.status_code(), 403);
        })
        .await;

        let ctx = handle.snapshot();
        assert_eq!(ctx.org_id.as_deref(), Some("org-acme"));
        assert_eq!(ctx.org_slug.as_deref(), Some("acme"));
        assert_eq!(ctx.org_role.as_deref(), Some("owner"));
    }
}
