use async_trait::async_trait;
use shared::{
    domain::{Account, Item, ItemId, LinkToken, Transaction, User, UserId},
    error::ApiError,
    protocol::ExchangeResult,
};

/// Backend operations the link flow depends on.
///
/// Implementations return already-validated domain values; a missing user on
/// lookup must be reported with `ErrorCode::NotFound`.
#[async_trait]
pub trait LinkBackend: Send + Sync {
    async fn create_user(&self, username: &str) -> Result<User, ApiError>;
    async fn get_user(&self, user_id: UserId) -> Result<User, ApiError>;
    async fn issue_link_token(
        &self,
        user_id: UserId,
        item_id: Option<&ItemId>,
    ) -> Result<LinkToken, ApiError>;
    async fn exchange_public_token(
        &self,
        public_token: &str,
        user_id: UserId,
    ) -> Result<ExchangeResult, ApiError>;
    async fn list_user_items(&self, user_id: UserId) -> Result<Vec<Item>, ApiError>;
    async fn list_item_accounts(&self, item_id: &ItemId) -> Result<Vec<Account>, ApiError>;
    async fn list_user_transactions(&self, user_id: UserId) -> Result<Vec<Transaction>, ApiError>;
}
