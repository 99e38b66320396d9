use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Account, Item, ItemId, LinkToken, Transaction, User, UserId},
    error::ApiError,
    protocol::{
        into_accounts, AccountRecord, CreateUserRequest, ErrorBody, ExchangeRequest,
        ExchangeResponse, ExchangeResult, ItemRecord, LinkTokenRequest, LinkTokenResponse,
        TransactionsResponse, UserRecord,
    },
};
use url::Url;

use crate::backend::LinkBackend;

/// [`LinkBackend`] over the backend's JSON HTTP API.
pub struct HttpLinkBackend {
    http: Client,
    base: Url,
    base_url: String,
}

impl HttpLinkBackend {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self, ApiError> {
        let parsed = Url::parse(base_url).map_err(|err| {
            ApiError::transport(format!("invalid api url '{base_url}': {err}"))
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ApiError::transport(format!(
                "invalid api url '{base_url}': not a base url"
            )));
        }
        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            base: parsed,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Appends `segments` to the base path, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::transport(format!("api url '{}' has no path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await.map_err(transport_error)?;
        let response = ensure_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| ApiError::decode(format!("unexpected response body: {err}")))
    }
}

async fn ensure_success(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|body| body.error)
        .ok()
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("request failed with status {status}"));
    Err(ApiError::from_status(status.as_u16(), message))
}

fn transport_error(err: reqwest::Error) -> ApiError {
    ApiError::transport(err.to_string())
}

#[async_trait]
impl LinkBackend for HttpLinkBackend {
    async fn create_user(&self, username: &str) -> Result<User, ApiError> {
        let url = self.endpoint(&["api", "users"])?;
        let body = CreateUserRequest {
            username: username.to_string(),
        };
        let record: UserRecord = self.send(self.http.post(url).json(&body)).await?;
        Ok(record.into())
    }

    async fn get_user(&self, user_id: UserId) -> Result<User, ApiError> {
        let url = self.endpoint(&["api", "users", &user_id.to_string()])?;
        let record: UserRecord = self.send(self.http.get(url)).await?;
        Ok(record.into())
    }

    async fn issue_link_token(
        &self,
        user_id: UserId,
        item_id: Option<&ItemId>,
    ) -> Result<LinkToken, ApiError> {
        let url = self.endpoint(&["api", "link-token"])?;
        let body = LinkTokenRequest {
            user_id,
            item_id: item_id.cloned(),
        };
        let response: LinkTokenResponse = self.send(self.http.post(url).json(&body)).await?;
        if response.link_token.trim().is_empty() {
            return Err(ApiError::decode("backend returned an empty link token"));
        }
        Ok(LinkToken::new(response.link_token))
    }

    async fn exchange_public_token(
        &self,
        public_token: &str,
        user_id: UserId,
    ) -> Result<ExchangeResult, ApiError> {
        let url = self.endpoint(&["api", "items"])?;
        let body = ExchangeRequest {
            public_token: public_token.to_string(),
            user_id,
        };
        let response: ExchangeResponse = self.send(self.http.post(url).json(&body)).await?;
        Ok(response.into())
    }

    async fn list_user_items(&self, user_id: UserId) -> Result<Vec<Item>, ApiError> {
        let url = self.endpoint(&["api", "users", &user_id.to_string(), "items"])?;
        let records: Option<Vec<ItemRecord>> = self.send(self.http.get(url)).await?;
        Ok(records
            .unwrap_or_default()
            .into_iter()
            .map(Item::from)
            .collect())
    }

    async fn list_item_accounts(&self, item_id: &ItemId) -> Result<Vec<Account>, ApiError> {
        let url = self.endpoint(&["api", "items", item_id.as_str(), "accounts"])?;
        let records: Option<Vec<AccountRecord>> = self.send(self.http.get(url)).await?;
        Ok(into_accounts(records))
    }

    async fn list_user_transactions(&self, user_id: UserId) -> Result<Vec<Transaction>, ApiError> {
        let url = self.endpoint(&["api", "transactions", &user_id.to_string()])?;
        let response: TransactionsResponse = self.send(self.http.get(url)).await?;
        Ok(response.into_transactions())
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
