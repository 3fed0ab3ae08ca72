// Admin API client with the session-check and CSRF retry protocol.
//
// Mutating requests carry `X-CSRF-Token`. A 401 anywhere means the admin
// session is gone. A 403 whose body mentions an invalid CSRF token triggers
// one session re-check: logged out yields `AuthRequired`, otherwise the token
// is refreshed and the request is retried exactly once.
//
// Query strings are passed to the transport as pairs and encoded by reqwest.

use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use ballot_core::model::{NomineeSnapshot, YearEntry, YearsResponse};

use super::client::decode;
use super::ApiError;

const SESSION_PATH: &str = "/api/admin-auth/session";
const CSRF_REJECTION: &str = "Invalid CSRF token";

/// Audit-log routes in the order they are tried; older servers only answer
/// the later spellings.
const AUDIT_PATHS: [&str; 3] = [
    "/api/admin/audit-logs",
    "/api/admin/audit-logs/",
    "/api/admin/audit_logs",
];
pub const AUDIT_LIMIT_DEFAULT: u32 = 100;
pub const AUDIT_LIMIT_MAX: u32 = 500;

/// Query pairs for a request.
pub type Query<'a> = &'a [(&'a str, String)];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminSession {
    pub logged_in: bool,
    pub csrf_token: Option<String>,
}

/// Aggregate usage numbers for one year.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Dashboard {
    pub unique_users: u64,
    pub users_compared: u64,
    pub total_picks: u64,
    pub winner_categories: u64,
}

/// Which audit entries to show by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuditOutcome {
    #[default]
    All,
    Success,
    Failure,
}

impl AuditOutcome {
    fn as_query(self) -> &'static str {
        match self {
            AuditOutcome::All => "all",
            AuditOutcome::Success => "1",
            AuditOutcome::Failure => "0",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditFilter {
    /// Only entries with this action; `None` for every action.
    pub action: Option<String>,
    pub outcome: AuditOutcome,
    pub limit: u32,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            action: None,
            outcome: AuditOutcome::All,
            limit: AUDIT_LIMIT_DEFAULT,
        }
    }
}

impl AuditFilter {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::with_capacity(3);
        if let Some(action) = self.action.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            query.push(("action", action.to_string()));
        }
        query.push(("success", self.outcome.as_query().to_string()));
        query.push(("limit", self.limit.clamp(1, AUDIT_LIMIT_MAX).to_string()));
        query
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditEntry {
    pub id: i64,
    pub action: String,
    pub success: bool,
    pub actor_email: String,
    pub request_ip: String,
    pub details: Value,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AuditActionCount {
    pub action: String,
    pub count: u64,
}

/// One page of audit entries, newest first, plus per-action totals.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AuditLog {
    pub logs: Vec<AuditEntry>,
    pub actions: Vec<AuditActionCount>,
}

/// A response as received, before status handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Wire-level seam under [`AdminClient`], so the retry protocol can be
/// exercised without a server.
#[async_trait]
pub trait AdminTransport: Send + Sync {
    async fn session(&self) -> Result<AdminSession, ApiError>;

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: Query<'_>,
        body: Option<&Value>,
        csrf_token: Option<&str>,
    ) -> Result<RawResponse, ApiError>;
}

// ---------------------------------------------------------------------------
// HTTP transport
// ---------------------------------------------------------------------------

pub struct HttpAdminTransport {
    http: reqwest::Client,
    base_url: String,
    /// Raw `Cookie` header value carrying the admin session.
    cookie: Option<String>,
}

impl HttpAdminTransport {
    pub fn new(
        base_url: &str,
        cookie: Option<String>,
        timeout: Option<std::time::Duration>,
    ) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build().map_err(ApiError::Build)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            cookie,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.http.request(method, format!("{}{path}", self.base_url));
        if let Some(cookie) = &self.cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        request
    }
}

#[async_trait]
impl AdminTransport for HttpAdminTransport {
    async fn session(&self) -> Result<AdminSession, ApiError> {
        let response = self
            .request(Method::GET, SESSION_PATH)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                path: SESSION_PATH.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::http(status.as_u16(), SESSION_PATH, ""));
        }
        let body = response.text().await.unwrap_or_default();
        decode(&body, SESSION_PATH)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: Query<'_>,
        body: Option<&Value>,
        csrf_token: Option<&str>,
    ) -> Result<RawResponse, ApiError> {
        let mut request = self.request(method, path);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = csrf_token {
            request = request.header("X-CSRF-Token", token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|source| ApiError::Transport {
            path: path.to_string(),
            source,
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(RawResponse { status, body })
    }
}

// ---------------------------------------------------------------------------
// AdminClient
// ---------------------------------------------------------------------------

fn is_mutating(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::DELETE
}

pub struct AdminClient<T> {
    transport: T,
    csrf_token: Mutex<Option<String>>,
}

impl<T: AdminTransport> AdminClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            csrf_token: Mutex::new(None),
        }
    }

    fn token(&self) -> Option<String> {
        self.csrf_token.lock().expect("csrf mutex poisoned").clone()
    }

    fn set_token(&self, token: Option<String>) {
        *self.csrf_token.lock().expect("csrf mutex poisoned") = token.filter(|t| !t.is_empty());
    }

    /// Check the admin session and adopt its CSRF token.
    pub async fn ensure_session(&self) -> Result<(), ApiError> {
        let session = self.transport.session().await?;
        if !session.logged_in {
            return Err(ApiError::AuthRequired);
        }
        self.set_token(session.csrf_token);
        Ok(())
    }

    async fn send_once(
        &self,
        method: &Method,
        path: &str,
        query: Query<'_>,
        body: Option<&Value>,
    ) -> Result<RawResponse, ApiError> {
        let token = if is_mutating(method) { self.token() } else { None };
        let response = self
            .transport
            .send(method.clone(), path, query, body, token.as_deref())
            .await?;
        if response.status == 401 {
            return Err(ApiError::AuthRequired);
        }
        Ok(response)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: Query<'_>,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let mut response = self.send_once(&method, path, query, body.as_ref()).await?;

        if response.status == 403 {
            if !response.body.contains(CSRF_REJECTION) {
                return Err(ApiError::http(403, path, response.body));
            }
            info!("CSRF token rejected for {path}, re-checking admin session");
            self.ensure_session().await?;
            response = self.send_once(&method, path, query, body.as_ref()).await?;
        }

        if !(200..300).contains(&response.status) {
            return Err(ApiError::http(response.status, path, response.body));
        }
        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        decode(&response.body, path)
    }

    pub async fn list_years(&self) -> Result<Vec<YearEntry>, ApiError> {
        let payload = self.request(Method::GET, "/api/years", &[], None).await?;
        let years: YearsResponse = from_value(payload, "/api/years")?;
        Ok(years.years)
    }

    pub async fn fetch_nominees(
        &self,
        year: u32,
        category: &str,
    ) -> Result<NomineeSnapshot, ApiError> {
        let query = [("year", year.to_string()), ("category", category.to_string())];
        let payload = self
            .request(Method::GET, "/api/nominees", &query, None)
            .await?;
        from_value(payload, "/api/nominees")
    }

    pub async fn dashboard(&self, year: u32) -> Result<Dashboard, ApiError> {
        let query = [("year", year.to_string())];
        let payload = self
            .request(Method::GET, "/api/admin/dashboard", &query, None)
            .await?;
        from_value(payload, "/api/admin/dashboard")
    }

    /// Load audit entries matching `filter`, falling through the known
    /// routes while the server answers 404.
    pub async fn audit_logs(&self, filter: &AuditFilter) -> Result<AuditLog, ApiError> {
        let query = filter.query();
        let mut last_missing = None;
        for path in AUDIT_PATHS {
            match self.request(Method::GET, path, &query, None).await {
                Ok(payload) => return from_value(payload, path),
                Err(e @ ApiError::Http { status: 404, .. }) => {
                    debug!("Audit route {path} not found, trying next");
                    last_missing = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_missing.unwrap_or_else(|| ApiError::http(404, AUDIT_PATHS[0], "")))
    }

    pub async fn set_winner(
        &self,
        year: u32,
        category: &str,
        film_id: &str,
        winner: bool,
    ) -> Result<(), ApiError> {
        let body = json!({ "year": year, "category": category, "filmId": film_id, "winner": winner });
        self.request(Method::PUT, "/api/admin/winner", &[], Some(body)).await?;
        Ok(())
    }

    pub async fn set_banner(&self, year: u32, enabled: bool, text: &str) -> Result<(), ApiError> {
        let body = json!({ "year": year, "enabled": enabled, "text": text });
        self.request(Method::PUT, "/api/admin/banner", &[], Some(body)).await?;
        Ok(())
    }

    pub async fn set_event_mode(&self, year: u32, enabled: bool) -> Result<(), ApiError> {
        let body = json!({ "year": year, "enabled": enabled });
        self.request(Method::PUT, "/api/admin/event-mode", &[], Some(body)).await?;
        Ok(())
    }

    pub async fn set_voting_lock(&self, year: u32, enabled: bool) -> Result<(), ApiError> {
        let body = json!({ "year": year, "enabled": enabled });
        self.request(Method::PUT, "/api/admin/voting-lock", &[], Some(body)).await?;
        Ok(())
    }

    /// An empty `url` clears the override.
    pub async fn set_where_to_watch(
        &self,
        year: u32,
        film_id: &str,
        url: &str,
        free_to_watch: bool,
    ) -> Result<(), ApiError> {
        let body = json!({ "year": year, "filmId": film_id, "url": url, "freeToWatch": free_to_watch });
        self.request(Method::PUT, "/api/admin/where-to-watch", &[], Some(body)).await?;
        Ok(())
    }

    /// An empty `url` clears the override.
    pub async fn set_poster(&self, year: u32, film_id: &str, url: &str) -> Result<(), ApiError> {
        let body = json!({ "year": year, "filmId": film_id, "url": url });
        self.request(Method::PUT, "/api/admin/poster", &[], Some(body)).await?;
        Ok(())
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        self.request(Method::POST, "/api/admin-auth/logout", &[], None).await?;
        self.set_token(None);
        debug!("Admin session logged out");
        Ok(())
    }
}

fn from_value<D: serde::de::DeserializeOwned>(value: Value, path: &str) -> Result<D, ApiError> {
    serde_json::from_value(value).map_err(|source| ApiError::Decode {
        path: path.to_string(),
        source,
    })
}
