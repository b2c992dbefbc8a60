//! Form session and page state endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::flow::Direction;
use crate::rest::dto::{
    ClearSessionResponse, CompleteFormRequest, NavigateRequest, NavigateResponse, PageResponse,
    SavePageRequest, SessionResponse, StartSessionRequest,
};
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;

/// Get the session of a case
#[utoipa::path(
    get,
    path = "/api/v1/cases/{case_id}/session",
    tag = "Sessions",
    params(
        ("case_id" = String, Path, description = "Case id")
    ),
    responses(
        (status = 200, description = "Session details", body = SessionResponse),
        (status = 404, description = "No session for this case", body = ErrorResponse)
    )
)]
pub async fn get_session(
    State(state): State<ApiState>,
    Path(case_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let store = state.store.lock().await;
    let session = store
        .session(&case_id)
        .ok_or_else(|| ApiError::NotFound(format!("No form session for case '{}'", case_id)))?;

    Ok(Json(SessionResponse::from(session)))
}

/// Start or restart the session of a case
#[utoipa::path(
    post,
    path = "/api/v1/cases/{case_id}/session",
    tag = "Sessions",
    params(
        ("case_id" = String, Path, description = "Case id")
    ),
    request_body = StartSessionRequest,
    responses(
        (status = 201, description = "Session started", body = SessionResponse),
        (status = 400, description = "Missing identifiers", body = ErrorResponse)
    )
)]
pub async fn start_session(
    State(state): State<ApiState>,
    Path(case_id): Path<String>,
    Json(request): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    if request.volunteer_id.trim().is_empty() || request.study_number.trim().is_empty() {
        return Err(ApiError::ValidationError(
            "volunteer_id and study_number are required".to_string(),
        ));
    }
    let sequence = request
        .form_sequence
        .unwrap_or_else(|| state.flow.sequence().to_vec());

    let mut store = state.store.lock().await;
    let session = store.start_session(
        &case_id,
        &request.volunteer_id,
        &request.study_number,
        sequence,
    )?;

    Ok((StatusCode::CREATED, Json(SessionResponse::from(&session))))
}

/// Remove the session, pages and cached forms of a case
#[utoipa::path(
    delete,
    path = "/api/v1/cases/{case_id}/session",
    tag = "Sessions",
    params(
        ("case_id" = String, Path, description = "Case id")
    ),
    responses(
        (status = 200, description = "Records removed", body = ClearSessionResponse)
    )
)]
pub async fn clear_session(
    State(state): State<ApiState>,
    Path(case_id): Path<String>,
) -> Result<Json<ClearSessionResponse>, ApiError> {
    let mut store = state.store.lock().await;
    let summary = store.clear_session(&case_id)?;
    Ok(Json(ClearSessionResponse::from(summary)))
}

/// Mark a template complete and advance the session
#[utoipa::path(
    post,
    path = "/api/v1/cases/{case_id}/session/complete",
    tag = "Sessions",
    params(
        ("case_id" = String, Path, description = "Case id")
    ),
    request_body = CompleteFormRequest,
    responses(
        (status = 200, description = "Updated session", body = SessionResponse),
        (status = 404, description = "No session for this case", body = ErrorResponse)
    )
)]
pub async fn complete_form(
    State(state): State<ApiState>,
    Path(case_id): Path<String>,
    Json(request): Json<CompleteFormRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let mut store = state.store.lock().await;
    let session = store.complete_form(&case_id, &request.template_id, request.answers)?;
    Ok(Json(SessionResponse::from(&session)))
}

/// Move a session one form back or forward, or jump to a form by name
#[utoipa::path(
    post,
    path = "/api/v1/cases/{case_id}/session/navigate",
    tag = "Sessions",
    params(
        ("case_id" = String, Path, description = "Case id")
    ),
    request_body = NavigateRequest,
    responses(
        (status = 200, description = "Session after the move", body = NavigateResponse),
        (status = 400, description = "Bad target or form not in the sequence", body = ErrorResponse),
        (status = 404, description = "No session for this case", body = ErrorResponse)
    )
)]
pub async fn navigate(
    State(state): State<ApiState>,
    Path(case_id): Path<String>,
    Json(request): Json<NavigateRequest>,
) -> Result<Json<NavigateResponse>, ApiError> {
    let mut store = state.store.lock().await;
    let moved = match (request.direction, request.template_id) {
        (Some(Direction::Next), None) => store.go_to_next(&case_id)?,
        (Some(Direction::Previous), None) => store.go_to_previous(&case_id)?,
        (None, Some(template)) => Some(store.go_to_form(&case_id, &template)?),
        _ => {
            return Err(ApiError::BadRequest(
                "give exactly one of direction and template_id".to_string(),
            ))
        }
    };

    let response = match moved {
        Some(session) => NavigateResponse {
            moved: true,
            session: SessionResponse::from(&session),
        },
        None => {
            let session = store.session(&case_id).ok_or_else(|| {
                ApiError::NotFound(format!("No form session for case '{}'", case_id))
            })?;
            NavigateResponse {
                moved: false,
                session: SessionResponse::from(session),
            }
        }
    };
    Ok(Json(response))
}

/// Save one page of a multi-page form
#[utoipa::path(
    put,
    path = "/api/v1/cases/{case_id}/pages/{form_id}/{page}",
    tag = "Sessions",
    params(
        ("case_id" = String, Path, description = "Case id"),
        ("form_id" = String, Path, description = "Form id"),
        ("page" = String, Path, description = "Page name")
    ),
    request_body = SavePageRequest,
    responses(
        (status = 200, description = "Page saved", body = PageResponse)
    )
)]
pub async fn save_page(
    State(state): State<ApiState>,
    Path((case_id, form_id, page)): Path<(String, String, String)>,
    Json(request): Json<SavePageRequest>,
) -> Result<Json<PageResponse>, ApiError> {
    let mut store = state.store.lock().await;
    let saved = store.save_page(
        &case_id,
        &form_id,
        &page,
        request.data,
        request.is_valid,
        request.validation_errors,
    )?;
    Ok(Json(PageResponse::from(saved)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn start_request() -> StartSessionRequest {
        StartSessionRequest {
            volunteer_id: "VOL-1".to_string(),
            study_number: "ST-1".to_string(),
            form_sequence: None,
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let state = ApiState::in_memory();

        let (status, started) = start_session(
            State(state.clone()),
            Path("c-1".to_string()),
            Json(start_request()),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(started.current_form.as_deref(), Some("Demographic Details"));
        assert_eq!(started.total_steps, 8);

        let completed = complete_form(
            State(state.clone()),
            Path("c-1".to_string()),
            Json(CompleteFormRequest {
                template_id: "Demographic Details".to_string(),
                answers: json!({"age": 31}).as_object().cloned().unwrap(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(completed.current_step, 1);
        assert_eq!(completed.current_form.as_deref(), Some("Medical History"));
        assert_eq!(completed.form_data["Demographic Details"]["age"], json!(31));

        save_page(
            State(state.clone()),
            Path(("c-1".to_string(), "ecg".to_string(), "leads".to_string())),
            Json(SavePageRequest {
                data: Default::default(),
                is_valid: false,
                validation_errors: vec!["lead II missing".to_string()],
            }),
        )
        .await
        .unwrap();

        let cleared = clear_session(State(state.clone()), Path("c-1".to_string()))
            .await
            .unwrap();
        assert_eq!(cleared.sessions, 1);
        assert_eq!(cleared.pages, 1);

        let missing = get_session(State(state), Path("c-1".to_string())).await;
        assert!(matches!(missing, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_navigate_moves_and_reports_edges() {
        let state = ApiState::in_memory();
        start_session(
            State(state.clone()),
            Path("c-1".to_string()),
            Json(start_request()),
        )
        .await
        .unwrap();

        let back = navigate(
            State(state.clone()),
            Path("c-1".to_string()),
            Json(NavigateRequest {
                direction: Some(Direction::Previous),
                template_id: None,
            }),
        )
        .await
        .unwrap();
        assert!(!back.moved);
        assert!(!back.session.can_navigate_previous);

        let jumped = navigate(
            State(state.clone()),
            Path("c-1".to_string()),
            Json(NavigateRequest {
                direction: None,
                template_id: Some("ECG".to_string()),
            }),
        )
        .await
        .unwrap();
        assert!(jumped.moved);
        assert_eq!(jumped.session.current_form.as_deref(), Some("ECG"));

        let next = navigate(
            State(state.clone()),
            Path("c-1".to_string()),
            Json(NavigateRequest {
                direction: Some(Direction::Next),
                template_id: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(next.session.current_step, jumped.session.current_step + 1);

        let both = navigate(
            State(state),
            Path("c-1".to_string()),
            Json(NavigateRequest {
                direction: Some(Direction::Next),
                template_id: Some("ECG".to_string()),
            }),
        )
        .await;
        assert!(matches!(both, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_start_requires_identifiers() {
        let state = ApiState::in_memory();
        let result = start_session(
            State(state),
            Path("c-1".to_string()),
            Json(StartSessionRequest {
                volunteer_id: " ".to_string(),
                ..start_request()
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_complete_without_session_is_not_found() {
        let state = ApiState::in_memory();
        let result = complete_form(
            State(state),
            Path("c-9".to_string()),
            Json(CompleteFormRequest {
                template_id: "ECG".to_string(),
                answers: Default::default(),
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }
}
