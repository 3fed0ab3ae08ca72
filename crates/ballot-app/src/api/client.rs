// reqwest implementation of the user-facing endpoints.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use ballot_core::model::{NomineeSnapshot, UserRecord, YearEntry, YearsResponse};

use super::{ApiError, PickUpdate, RemoteApi, SeenUpdate};

pub struct HttpApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    /// `timeout` of `None` leaves requests unbounded.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build().map_err(ApiError::Build)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let request = self.http.get(self.url(path)).query(query);
        let body = send(request, path).await?;
        decode(&body, path)
    }

    async fn put<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let request = self.http.put(self.url(path)).json(body);
        send(request, path).await?;
        Ok(())
    }
}

/// Send a request and return the body of a 2xx response.
pub(crate) async fn send(request: reqwest::RequestBuilder, path: &str) -> Result<String, ApiError> {
    let response = request.send().await.map_err(|source| ApiError::Transport {
        path: path.to_string(),
        source,
    })?;
    let status = response.status();
    // An unreadable body only loses the error details.
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        debug!("{path} returned {status}");
        return Err(ApiError::http(status.as_u16(), path, body));
    }
    Ok(body)
}

pub(crate) fn decode<T: DeserializeOwned>(body: &str, path: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|source| ApiError::Decode {
        path: path.to_string(),
        source,
    })
}

#[async_trait]
impl RemoteApi for HttpApi {
    async fn list_years(&self) -> Result<Vec<YearEntry>, ApiError> {
        let payload: YearsResponse = self.get("/api/years", &[]).await?;
        Ok(payload.years)
    }

    async fn fetch_nominees(
        &self,
        year: u32,
        category: &str,
    ) -> Result<NomineeSnapshot, ApiError> {
        self.get(
            "/api/nominees",
            &[("year", year.to_string()), ("category", category.to_string())],
        )
        .await
    }

    async fn fetch_user_record(&self, year: u32, user_key: &str) -> Result<UserRecord, ApiError> {
        self.get(
            "/api/user-state",
            &[("year", year.to_string()), ("userKey", user_key.to_string())],
        )
        .await
    }

    async fn put_seen(&self, update: &SeenUpdate) -> Result<(), ApiError> {
        self.put("/api/user-state", update).await
    }

    async fn put_pick(&self, update: &PickUpdate) -> Result<(), ApiError> {
        self.put("/api/user-pick", update).await
    }
}
