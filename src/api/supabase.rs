//! Secondary store: PostgREST table upsert (Supabase)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::{ApiError, FormBackend, FormSubmission, SubmissionReceipt};
use crate::config::Config;
use crate::store::Answers;

const PROVIDER_NAME: &str = "supabase";

/// Columns that identify a row for upsert
const CONFLICT_COLUMNS: &str = "case_id,template_name";

/// Row of the patient forms table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientFormRow {
    pub case_id: String,
    pub template_name: String,
    pub answers: Answers,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volunteer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_number: Option<String>,
}

impl From<&FormSubmission> for PatientFormRow {
    fn from(form: &FormSubmission) -> Self {
        Self {
            case_id: form.case_id.clone(),
            template_name: form.template_id.clone(),
            answers: form.answers.clone(),
            volunteer_id: form.volunteer_id.clone(),
            study_number: form.study_number.clone(),
        }
    }
}

/// Supabase REST client for a single table
pub struct SupabaseStore {
    url: String,
    key: String,
    table: String,
    client: Client,
}

impl SupabaseStore {
    pub fn new(
        url: impl Into<String>,
        key: impl Into<String>,
        table: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        Ok(Self {
            url: url.into().trim_end_matches('/').to_string(),
            key: key.into(),
            table: table.into(),
            client,
        })
    }

    /// Create from config; `None` when the store is disabled
    pub fn from_config(config: &Config) -> Result<Option<Self>, ApiError> {
        if !config.supabase.enabled {
            return Ok(None);
        }
        let key = config
            .supabase_key()
            .ok_or_else(|| ApiError::not_configured(PROVIDER_NAME))?;
        if config.supabase.url.is_empty() {
            return Err(ApiError::not_configured(PROVIDER_NAME));
        }

        Self::new(
            config.supabase.url.clone(),
            key,
            config.supabase.table.clone(),
            Duration::from_secs(config.api.timeout_secs),
        )
        .map(Some)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.url, self.table)
    }

    /// Insert or update the row for (case_id, template_name)
    pub async fn upsert(&self, row: &PatientFormRow) -> Result<Option<String>, ApiError> {
        debug!(case_id = %row.case_id, template = %row.template_name, "Upserting form row");

        let response = self
            .client
            .post(self.table_url())
            .query(&[("on_conflict", CONFLICT_COLUMNS)])
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[row])
            .send()
            .await
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(
                PROVIDER_NAME,
                status.as_u16(),
                &body,
                None,
            ));
        }

        // return=representation answers with the stored rows; the id is optional
        let rows: Vec<Value> = response.json().await.unwrap_or_default();
        Ok(rows
            .first()
            .and_then(|r| r.get("id"))
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }))
    }
}

#[async_trait]
impl FormBackend for SupabaseStore {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.key.is_empty()
    }

    async fn submit(&self, form: &FormSubmission) -> Result<SubmissionReceipt, ApiError> {
        let remote_id = self
            .upsert(&PatientFormRow::from(form))
            .await?
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Ok(SubmissionReceipt {
            backend: PROVIDER_NAME.to_string(),
            remote_id: Some(remote_id),
        })
    }

    async fn test_connection(&self) -> Result<bool, ApiError> {
        let response = self
            .client
            .get(self.table_url())
            .query(&[("select", "case_id"), ("limit", "1")])
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .send()
            .await
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        Ok(response.status().is_success())
    }
}
