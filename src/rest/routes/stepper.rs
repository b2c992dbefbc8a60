//! Stepper endpoint.

use axum::{extract::State, Json};

use crate::flow::CaseContext;
use crate::rest::dto::{ResolveRequest, ResolveResponse};
use crate::rest::state::ApiState;

/// Resolve previous/next navigation for a location
#[utoipa::path(
    post,
    path = "/api/v1/stepper/resolve",
    tag = "Stepper",
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Step position; index is null when no form matches", body = ResolveResponse)
    )
)]
pub async fn resolve(
    State(state): State<ApiState>,
    Json(request): Json<ResolveRequest>,
) -> Json<ResolveResponse> {
    let stepper = state.flow.stepper();
    let position = stepper.locate(&request.location);

    Json(ResolveResponse {
        progress: stepper.format_progress(&position),
        percentage_complete: stepper.percentage_complete(&position),
        context: CaseContext::from_query(&position.search),
        position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_first_form() {
        let state = ApiState::in_memory();
        let resp = resolve(
            State(state),
            Json(ResolveRequest {
                location: "/employee/project/p1/dashboard/screening/demographic-details?case=c-1"
                    .to_string(),
            }),
        )
        .await;

        assert_eq!(resp.position.index, Some(0));
        assert!(!resp.position.has_previous);
        assert_eq!(
            resp.position.next_path.as_deref(),
            Some("/employee/project/p1/dashboard/screening/medical-history?case=c-1")
        );
        assert_eq!(resp.percentage_complete, 0);
        assert_eq!(resp.context.case_id.as_deref(), Some("c-1"));
        assert!(resp.progress.starts_with("[screening/demographic-details] > "));
    }

    #[tokio::test]
    async fn test_resolve_unknown_location() {
        let state = ApiState::in_memory();
        let resp = resolve(
            State(state),
            Json(ResolveRequest {
                location: "/employee/dashboard".to_string(),
            }),
        )
        .await;
        assert_eq!(resp.position.index, None);
        assert!(!resp.position.is_last_form);
        assert!(resp.position.next_path.is_none());
    }
}
