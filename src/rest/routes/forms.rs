//! Cached form answer endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::flow::CaseContext;
use crate::rest::dto::{PendingFormResponse, PendingQuery, SaveAnswersRequest, SaveAnswersResponse};
use crate::rest::error::{ApiError, ErrorResponse};
use crate::rest::state::ApiState;

/// List cached forms
#[utoipa::path(
    get,
    path = "/api/v1/pending",
    tag = "Forms",
    params(
        ("case_id" = Option<String>, Query, description = "Only forms of this case"),
        ("unsynced" = Option<bool>, Query, description = "Only forms not yet submitted")
    ),
    responses(
        (status = 200, description = "Cached forms ordered by id", body = Vec<PendingFormResponse>)
    )
)]
pub async fn list_pending(
    State(state): State<ApiState>,
    Query(query): Query<PendingQuery>,
) -> Json<Vec<PendingFormResponse>> {
    let store = state.store.lock().await;
    let forms = match &query.case_id {
        Some(case_id) => store.pending_forms_for_case(case_id, None),
        None => store.all_pending_forms(),
    };

    Json(
        forms
            .into_iter()
            .filter(|f| !query.unsynced || !f.synced)
            .map(PendingFormResponse::from)
            .collect(),
    )
}

/// Get the cached form for a template of a case
#[utoipa::path(
    get,
    path = "/api/v1/cases/{case_id}/forms/{template}",
    tag = "Forms",
    params(
        ("case_id" = String, Path, description = "Case id"),
        ("template" = String, Path, description = "Template title")
    ),
    responses(
        (status = 200, description = "Cached form", body = PendingFormResponse),
        (status = 404, description = "Nothing cached for this template", body = ErrorResponse)
    )
)]
pub async fn get_answers(
    State(state): State<ApiState>,
    Path((case_id, template)): Path<(String, String)>,
) -> Result<Json<PendingFormResponse>, ApiError> {
    let store = state.store.lock().await;
    let form = store
        .find_pending_form(&template, &case_id)
        .cloned()
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "No answers saved for '{}' in case '{}'",
                template, case_id
            ))
        })?;

    Ok(Json(PendingFormResponse::from(form)))
}

/// Save answers for a template, optionally returning the neighbouring route
#[utoipa::path(
    put,
    path = "/api/v1/cases/{case_id}/forms/{template}",
    tag = "Forms",
    params(
        ("case_id" = String, Path, description = "Case id"),
        ("template" = String, Path, description = "Template title")
    ),
    request_body = SaveAnswersRequest,
    responses(
        (status = 200, description = "Answers saved", body = SaveAnswersResponse),
        (status = 400, description = "Template not in the form sequence", body = ErrorResponse)
    )
)]
pub async fn save_answers(
    State(state): State<ApiState>,
    Path((case_id, template)): Path<(String, String)>,
    Json(request): Json<SaveAnswersRequest>,
) -> Result<Json<SaveAnswersResponse>, ApiError> {
    let mut store = state.store.lock().await;

    let (form, next_route) = match (request.direction, &request.project) {
        (Some(direction), Some(project)) => {
            let context = CaseContext {
                case_id: Some(case_id),
                volunteer_id: request.volunteer_id,
                study_number: request.study_number,
            };
            state.flow.save_and_navigate(
                &mut store,
                project,
                &context,
                &template,
                request.answers,
                direction,
            )?
        }
        (Some(_), None) => {
            return Err(ApiError::BadRequest(
                "project is required to navigate".to_string(),
            ))
        }
        (None, _) => {
            let form = store.save_answers(
                &template,
                &case_id,
                request.answers,
                request.volunteer_id,
                request.study_number,
            )?;
            (form, None)
        }
    };

    Ok(Json(SaveAnswersResponse {
        form: PendingFormResponse::from(form),
        next_route,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Direction;
    use serde_json::json;

    fn request(direction: Option<Direction>, project: Option<&str>) -> SaveAnswersRequest {
        SaveAnswersRequest {
            answers: json!({"heart_rate": 72}).as_object().cloned().unwrap(),
            volunteer_id: Some("VOL-1".to_string()),
            study_number: Some("ST-1".to_string()),
            direction,
            project: project.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_save_then_get() {
        let state = ApiState::in_memory();
        let saved = save_answers(
            State(state.clone()),
            Path(("c-1".to_string(), "ECG".to_string())),
            Json(request(None, None)),
        )
        .await
        .unwrap();
        assert!(saved.next_route.is_none());

        let loaded = get_answers(State(state), Path(("c-1".to_string(), "ECG".to_string())))
            .await
            .unwrap();
        assert_eq!(loaded.id, saved.form.id);
        assert_eq!(loaded.answers["heart_rate"], json!(72));
    }

    #[tokio::test]
    async fn test_save_and_navigate() {
        let state = ApiState::in_memory();
        let saved = save_answers(
            State(state),
            Path(("c-1".to_string(), "ECG".to_string())),
            Json(request(Some(Direction::Previous), Some("p1"))),
        )
        .await
        .unwrap();

        assert_eq!(
            saved.next_route.as_deref(),
            Some("/employee/project/p1/dashboard/screening/ecg-evaluation?case=c-1&volunteerId=VOL-1&studyNumber=ST-1")
        );
    }

    #[tokio::test]
    async fn test_navigate_without_project_is_bad_request() {
        let state = ApiState::in_memory();
        let result = save_answers(
            State(state),
            Path(("c-1".to_string(), "ECG".to_string())),
            Json(request(Some(Direction::Next), None)),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let state = ApiState::in_memory();
        let result = get_answers(State(state), Path(("c-1".to_string(), "ECG".to_string()))).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_pending_filters() {
        let state = ApiState::in_memory();
        {
            let mut store = state.store.lock().await;
            let first = store
                .save_answers("ECG", "c-1", Default::default(), None, None)
                .unwrap();
            store
                .save_answers("ECG", "c-2", Default::default(), None, None)
                .unwrap();
            store.mark_synced(first.id).unwrap();
        }

        let all = list_pending(State(state.clone()), Query(PendingQuery::default())).await;
        assert_eq!(all.len(), 2);

        let unsynced = list_pending(
            State(state.clone()),
            Query(PendingQuery {
                case_id: None,
                unsynced: true,
            }),
        )
        .await;
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].case_id, "c-2");

        let case = list_pending(
            State(state),
            Query(PendingQuery {
                case_id: Some("c-1".to_string()),
                unsynced: false,
            }),
        )
        .await;
        assert_eq!(case.len(), 1);
    }
}
