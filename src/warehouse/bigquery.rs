use anyhow::{Context, Result, anyhow, bail};
use gcp_auth::TokenProvider;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Row, Warehouse};

const API_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// Blocking BigQuery REST client bound to one project and one access token.
pub struct BigQueryClient {
    http: Client,
    base_url: String,
    project: String,
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<TableRow>,
    page_token: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<TableFieldSchema>,
}

#[derive(Debug, Deserialize)]
struct TableFieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    message: String,
    reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl BigQueryClient {
    /// Resolves Application Default Credentials and binds them to `project`.
    pub fn connect(project: &str) -> Result<Self> {
        let access_token = fetch_access_token()?;
        info!(project = %project, "connected to BigQuery");

        Ok(Self::with_base_url(project, &access_token, API_BASE_URL))
    }

    pub fn with_base_url(project: &str, access_token: &str, base_url: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            project: project.to_string(),
            access_token: access_token.to_string(),
        }
    }

    fn send(&self, request: RequestBuilder) -> Result<QueryResponse> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .context("BigQuery request failed")?;
        let status = response.status();
        let body = response
            .text()
            .context("failed to read BigQuery response body")?;
        parse_response(status, &body)
    }

    fn follow_up(&self, job: &JobReference, page_token: Option<&str>) -> Result<QueryResponse> {
        let url = format!(
            "{}/projects/{}/queries/{}",
            self.base_url, job.project_id, job.job_id
        );
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(location) = job.location.as_deref() {
            params.push(("location", location));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        debug!(job_id = %job.job_id, page_token = ?page_token, "fetching query results");
        self.send(self.http.get(url).query(&params))
    }
}

impl Warehouse for BigQueryClient {
    fn query(&self, sql: &str) -> Result<Vec<Row>> {
        debug!(sql = %sql, "submitting query");
        let url = format!("{}/projects/{}/queries", self.base_url, self.project);
        let request = QueryRequest {
            query: sql,
            use_legacy_sql: false,
        };
        let mut response = self.send(self.http.post(url).json(&request))?;

        let mut fields = Vec::new();
        let mut rows = Vec::new();
        loop {
            let job = response.job_reference.clone();

            if !response.job_complete {
                let job = job.context("incomplete BigQuery job has no jobReference")?;
                response = self.follow_up(&job, None)?;
                continue;
            }

            for error in &response.errors {
                warn!(
                    reason = %error.reason.as_deref().unwrap_or_default(),
                    message = %error.message,
                    "BigQuery reported a job message"
                );
            }
            if let Some(schema) = response.schema.take() {
                fields = schema.fields;
            }
            rows.extend(decode_rows(&fields, std::mem::take(&mut response.rows))?);

            match response.page_token.take() {
                Some(token) => {
                    let job = job.context("paged BigQuery result has no jobReference")?;
                    response = self.follow_up(&job, Some(&token))?;
                }
                None => break,
            }
        }

        debug!(rows = rows.len(), "query finished");
        Ok(rows)
    }
}

// Service-account key from GOOGLE_APPLICATION_CREDENTIALS first, then the
// application-default store, then the metadata server, then the gcloud CLI.
fn fetch_access_token() -> Result<String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start credential runtime")?;

    runtime.block_on(async {
        let provider = gcp_auth::provider()
            .await
            .context("failed to load Application Default Credentials")?;
        let token = provider
            .token(&[BIGQUERY_SCOPE])
            .await
            .context("failed to obtain BigQuery access token")?;
        Ok::<_, anyhow::Error>(token.as_str().to_string())
    })
}

fn parse_response(status: StatusCode, body: &str) -> Result<QueryResponse> {
    if !status.is_success() {
        if let Ok(err) = serde_json::from_str::<ApiError>(body) {
            return Err(anyhow!("BigQuery API error ({}): {}", status, err.error.message));
        }
        return Err(anyhow!("BigQuery API error ({}): {}", status, body.trim()));
    }

    serde_json::from_str(body).context("failed to parse BigQuery response")
}

fn decode_rows(fields: &[TableFieldSchema], rows: Vec<TableRow>) -> Result<Vec<Row>> {
    rows.into_iter()
        .map(|row| {
            if row.f.len() != fields.len() {
                bail!(
                    "BigQuery row has {} cells but schema has {} fields",
                    row.f.len(),
                    fields.len()
                );
            }

            let mut record = Row::new();
            for (field, cell) in fields.iter().zip(row.f) {
                record.insert(field.name.clone(), decode_cell(field, cell.v)?);
            }
            Ok(record)
        })
        .collect()
}

fn decode_cell(field: &TableFieldSchema, raw: Value) -> Result<Value> {
    // Scalars arrive as strings; null and nested values pass through.
    let Value::String(text) = raw else {
        return Ok(raw);
    };

    let value = match field.field_type.as_str() {
        "INTEGER" | "INT64" => Value::from(
            text.parse::<i64>()
                .with_context(|| format!("invalid integer in column {}: {text}", field.name))?,
        ),
        "FLOAT" | "FLOAT64" => {
            let number = text
                .parse::<f64>()
                .with_context(|| format!("invalid float in column {}: {text}", field.name))?;
            serde_json::Number::from_f64(number)
                .map(Value::Number)
                .unwrap_or(Value::String(text))
        }
        "BOOLEAN" | "BOOL" => match text.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => bail!("invalid boolean in column {}: {text}", field.name),
        },
        _ => Value::String(text),
    };

    Ok(value)
}
