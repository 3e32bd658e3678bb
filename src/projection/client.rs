//! HTTP client for the gateway's REST API.
//!
//! [`GameApi`] is the slice of the API the projection driver needs (points
//! sync). [`HttpGameClient`] implements it over `reqwest` and also exposes
//! the catalog and the purchase endpoints for callers such as
//! [`play`](super::play::play).

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

use crate::protocol::{
    AuthResponse, AwardPointsRequest, BoostRequest, BoostResponse, CatalogResponse, FailureResponse,
    GeneratorRequest, GeneratorResponse, PointsResponse, TaskCompleteRequest,
    TaskCompleteResponse, TaskProgressRequest, TaskProgressResponse, TelegramAuthRequest,
    UpgradeRequest, UpgradeResponse, WalletRequest, WalletResponse,
};

/// Network operations the projection driver issues.
pub trait GameApi: Clone + Send + Sync + 'static {
    fn award_points(
        &self,
        account_id: i64,
        req: AwardPointsRequest,
    ) -> impl Future<Output = Result<PointsResponse>> + Send;
}

#[derive(Clone)]
pub struct HttpGameClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpGameClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(HttpGameClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// URL of the push channel for `account_id` (`ws://` or `wss://`).
    pub fn push_url(&self, account_id: i64) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!("{ws_base}/ws?userId={account_id}")
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response, path: &str) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .with_context(|| format!("decoding response from {path}"));
        }
        let message = match response.json::<FailureResponse>().await {
            Ok(failure) => failure.message,
            Err(_) => status.to_string(),
        };
        anyhow::bail!("{path} failed ({status}): {message}")
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        Self::decode(response, path).await
    }

    pub async fn authenticate(&self, req: &TelegramAuthRequest) -> Result<AuthResponse> {
        self.post("/api/auth/telegram", req).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        Self::decode(response, path).await
    }

    pub async fn catalog(&self) -> Result<CatalogResponse> {
        self.get("/api/catalog").await
    }

    pub async fn get_user(&self, account_id: i64) -> Result<AuthResponse> {
        self.get(&format!("/api/user/{account_id}")).await
    }

    pub async fn generators(&self, account_id: i64, req: &GeneratorRequest) -> Result<GeneratorResponse> {
        self.post(&format!("/api/user/{account_id}/generators"), req).await
    }

    pub async fn boosts(&self, account_id: i64, req: &BoostRequest) -> Result<BoostResponse> {
        self.post(&format!("/api/user/{account_id}/boosts"), req).await
    }

    pub async fn upgrades(&self, account_id: i64, req: &UpgradeRequest) -> Result<UpgradeResponse> {
        self.post(&format!("/api/user/{account_id}/upgrades"), req).await
    }

    pub async fn complete_task(
        &self,
        account_id: i64,
        req: &TaskCompleteRequest,
    ) -> Result<TaskCompleteResponse> {
        self.post(&format!("/api/user/{account_id}/tasks/complete"), req).await
    }

    pub async fn advance_task(
        &self,
        account_id: i64,
        req: &TaskProgressRequest,
    ) -> Result<TaskProgressResponse> {
        self.post(&format!("/api/user/{account_id}/tasks/progress"), req).await
    }

    pub async fn link_wallet(&self, account_id: i64, req: &WalletRequest) -> Result<WalletResponse> {
        self.post(&format!("/api/user/{account_id}/wallet"), req).await
    }
}

impl GameApi for HttpGameClient {
    async fn award_points(&self, account_id: i64, req: AwardPointsRequest) -> Result<PointsResponse> {
        self.post(&format!("/api/user/{account_id}/points"), &req).await
    }
}
