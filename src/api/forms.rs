//! Primary forms REST API client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{
    ApiError, FormBackend, FormSubmission, SessionReceipt, SessionSubmission, SubmissionReceipt,
    SubmissionStatus,
};
use crate::config::Config;

const PROVIDER_NAME: &str = "forms-api";

/// Status recorded on forms submitted from the capture flow
pub const COMPLETED_STATUS: &str = "completed";

/// Body of `POST /api/forms`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateFormRequest {
    pub template_id: String,
    pub volunteer_id: String,
    pub status: String,
    pub data: Value,
}

/// A form as stored by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormRecord {
    pub id: String,
    pub template_id: String,
    pub volunteer_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Filters for `GET /api/forms`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormListQuery {
    pub page: u32,
    pub size: u32,
    pub volunteer_id: Option<String>,
    pub template_id: Option<String>,
    pub status: Option<String>,
}

impl FormListQuery {
    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.max(1).to_string()),
            ("size", if self.size == 0 { 20 } else { self.size }.to_string()),
        ];
        if let Some(v) = &self.volunteer_id {
            pairs.push(("volunteer_id", v.clone()));
        }
        if let Some(t) = &self.template_id {
            pairs.push(("template_id", t.clone()));
        }
        if let Some(s) = &self.status {
            pairs.push(("status", s.clone()));
        }
        pairs
    }
}

/// Page of forms returned by `GET /api/forms`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormListResponse {
    pub items: Vec<FormRecord>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub pages: u32,
}

/// Client for the primary forms API
pub struct FormsApi {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl FormsApi {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    /// Create from config; the token is read from the configured env var
    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        if config.api.base_url.is_empty() {
            return Err(ApiError::not_configured(PROVIDER_NAME));
        }
        Self::new(
            config.api.base_url.clone(),
            config.api_token(),
            Duration::from_secs(config.api.timeout_secs),
        )
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api{}", self.base_url, endpoint)
    }

    /// `/api/forms/submission-status/{case_id}` with the case id escaped
    fn status_url(&self, case_id: &str) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.url("/forms/submission-status"))
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::network(PROVIDER_NAME, "base URL cannot take a path"))?
            .push(case_id);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(
            PROVIDER_NAME,
            status.as_u16(),
            &body,
            retry_after,
        ))
    }

    /// `createForm`
    pub async fn create_form(&self, request: &CreateFormRequest) -> Result<FormRecord, ApiError> {
        debug!(template_id = %request.template_id, "POST /api/forms");
        let response = self
            .send(self.client.post(self.url("/forms")).json(request))
            .await?;

        response
            .json()
            .await
            .map_err(|e| ApiError::http(PROVIDER_NAME, 0, format!("Parse error: {}", e)))
    }

    /// `getForms`
    pub async fn get_forms(&self, query: &FormListQuery) -> Result<FormListResponse, ApiError> {
        let response = self
            .send(self.client.get(self.url("/forms")).query(&query.pairs()))
            .await?;

        response
            .json()
            .await
            .map_err(|e| ApiError::http(PROVIDER_NAME, 0, format!("Parse error: {}", e)))
    }

    /// Send every completed form of a session in one request
    pub async fn bulk_submit(
        &self,
        submission: &SessionSubmission,
    ) -> Result<SessionReceipt, ApiError> {
        debug!(
            case_id = %submission.case_id,
            forms = submission.forms_data.len(),
            "POST /api/forms/bulk-submit"
        );
        let response = self
            .send(
                self.client
                    .post(self.url("/forms/bulk-submit"))
                    .json(submission),
            )
            .await?;

        response
            .json()
            .await
            .map_err(|e| ApiError::http(PROVIDER_NAME, 0, format!("Parse error: {}", e)))
    }

    /// Submission state of a case; an unknown case has not been submitted
    pub async fn get_submission_status(&self, case_id: &str) -> Result<SubmissionStatus, ApiError> {
        let url = self.status_url(case_id)?;
        match self.send(self.client.get(url)).await {
            Ok(response) => response
                .json()
                .await
                .map_err(|e| ApiError::http(PROVIDER_NAME, 0, format!("Parse error: {}", e))),
            Err(ApiError::NotFound { .. }) => Ok(SubmissionStatus::default()),
            Err(e) => Err(e),
        }
    }

    /// Backend health check
    pub async fn health(&self) -> Result<bool, ApiError> {
        match self.send(self.client.get(self.url("/health"))).await {
            Ok(_) => Ok(true),
            Err(ApiError::NetworkError { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl FormBackend for FormsApi {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn is_configured(&self) -> bool {
        !self.base_url.is_empty()
    }

    async fn submit(&self, form: &FormSubmission) -> Result<SubmissionReceipt, ApiError> {
        let volunteer_id = form
            .volunteer_id
            .clone()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::rejected(PROVIDER_NAME, "volunteer id is required"))?;

        let record = self
            .create_form(&CreateFormRequest {
                template_id: form.template_id.clone(),
                volunteer_id,
                status: COMPLETED_STATUS.to_string(),
                data: Value::Object(form.answers.clone()),
            })
            .await?;

        Ok(SubmissionReceipt {
            backend: PROVIDER_NAME.to_string(),
            remote_id: Some(record.id),
        })
    }

    async fn test_connection(&self) -> Result<bool, ApiError> {
        self.health().await
    }

    async fn submit_session(
        &self,
        session: &SessionSubmission,
    ) -> Result<SessionReceipt, ApiError> {
        self.bulk_submit(session).await
    }

    async fn submission_status(&self, case_id: &str) -> Result<SubmissionStatus, ApiError> {
        self.get_submission_status(case_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_api_prefix() {
        let api = FormsApi::new("http://localhost:8000/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(api.url("/forms"), "http://localhost:8000/api/forms");
    }

    #[test]
    fn test_status_url_escapes_case_id() {
        let api = FormsApi::new("http://localhost:8000", None, Duration::from_secs(5)).unwrap();
        assert_eq!(
            api.status_url("case 7/b").unwrap().as_str(),
            "http://localhost:8000/api/forms/submission-status/case%207%2Fb"
        );
    }

    #[test]
    fn test_list_query_defaults() {
        let pairs = FormListQuery::default().pairs();
        assert_eq!(pairs[0], ("page", "1".to_string()));
        assert_eq!(pairs[1], ("size", "20".to_string()));
        assert_eq!(pairs.len(), 2);

        let pairs = FormListQuery {
            page: 2,
            size: 50,
            volunteer_id: Some("VOL-1".to_string()),
            template_id: None,
            status: Some("completed".to_string()),
        }
        .pairs();
        assert_eq!(pairs.len(), 4);
        assert!(pairs.contains(&("volunteer_id", "VOL-1".to_string())));
    }

    #[test]
    fn test_from_config_requires_base_url() {
        let mut config = Config::default();
        config.api.base_url = String::new();
        assert!(matches!(
            FormsApi::from_config(&config),
            Err(ApiError::NotConfigured { .. })
        ));
    }

    #[tokio::test]
    async fn test_submit_without_volunteer_is_rejected() {
        let api = FormsApi::new("http://127.0.0.1:9", None, Duration::from_secs(1)).unwrap();
        let form = FormSubmission {
            pending_id: 1,
            template_id: "ECG".to_string(),
            case_id: "c-1".to_string(),
            volunteer_id: None,
            study_number: None,
            answers: Default::default(),
        };
        let err = api.submit(&form).await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected { .. }));
    }
}
