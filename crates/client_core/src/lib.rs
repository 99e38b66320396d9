use std::sync::Arc;

use shared::domain::{Account, Item, ItemId, LinkToken, Transaction, User, UserId};
use tokio::sync::Mutex;
use tracing::{info, warn};

pub mod backend;
pub mod error;
pub mod http;
pub mod items;
pub mod link_flow;
pub mod session;
pub mod state;
pub mod transactions;
pub mod widget;

pub use backend::LinkBackend;
pub use error::LinkError;
pub use http::HttpLinkBackend;
pub use items::{ItemInsert, ItemRegistry};
pub use link_flow::{FlowPhase, LinkFlow, LinkMode, LinkSession};
pub use session::SessionStore;
pub use state::AppState;
pub use transactions::TransactionView;
pub use widget::{LinkWidget, WidgetError, WidgetMetadata, WidgetOutcome};

/// Drives the account-link flow against a backend.
///
/// All state lives in one [`AppState`]. The lock is never held across a
/// backend call; the flow phase committed before each call is what rejects
/// overlapping link operations.
pub struct LinkClient {
    backend: Arc<dyn LinkBackend>,
    inner: Mutex<AppState>,
}

impl LinkClient {
    pub fn new(backend: Arc<dyn LinkBackend>) -> Self {
        Self::with_state(backend, AppState::default())
    }

    pub fn with_state(backend: Arc<dyn LinkBackend>, state: AppState) -> Self {
        Self {
            backend,
            inner: Mutex::new(state),
        }
    }

    pub async fn snapshot(&self) -> AppState {
        self.inner.lock().await.clone()
    }

    pub async fn resolve_user(&self, input: &str) -> Result<User, LinkError> {
        let result = self.resolve_user_impl(input).await;
        self.record(result).await
    }

    pub async fn select_user(&self, user_id: UserId) -> Result<User, LinkError> {
        let result = self.select_user_impl(user_id).await;
        self.record(result).await
    }

    pub async fn set_mode(&self, mode: LinkMode) -> Result<(), LinkError> {
        let result = self.set_mode_impl(mode).await;
        self.record(result).await
    }

    pub async fn select_item(&self, item_id: ItemId) -> Result<(), LinkError> {
        let result = self.select_item_impl(item_id).await;
        self.record(result).await
    }

    pub async fn request_link_token(&self) -> Result<LinkToken, LinkError> {
        let result = self.request_link_token_impl().await;
        self.record(result).await
    }

    pub async fn open_widget(&self) -> Result<LinkToken, LinkError> {
        let result = self.open_widget_impl().await;
        self.record(result).await
    }

    pub async fn on_widget_success(
        &self,
        public_token: &str,
        metadata: WidgetMetadata,
    ) -> Result<Item, LinkError> {
        let result = self.on_widget_success_impl(public_token, metadata).await;
        self.record(result).await
    }

    pub async fn on_widget_exit(&self, error: Option<WidgetError>) -> Result<(), LinkError> {
        let result = self.on_widget_exit_impl(error).await;
        self.record(result).await
    }

    /// Presents the widget with the held token and applies its single outcome.
    /// Returns the linked item, or `None` when the user cancelled.
    pub async fn run_widget(&self, widget: &dyn LinkWidget) -> Result<Option<Item>, LinkError> {
        let result = self.run_widget_impl(widget).await;
        self.record(result).await
    }

    /// Forces the link flow back to `Idle`, e.g. after a backend call hung.
    pub async fn reset(&self) {
        let mut guard = self.inner.lock().await;
        info!("link: flow reset from phase={}", guard.flow.phase());
        guard.flow = guard.flow.reset();
        guard.last_error = None;
    }

    /// Registers the backend's items for the active user that this session
    /// has not seen yet. Returns the newly registered items.
    pub async fn load_user_items(&self) -> Result<Vec<Item>, LinkError> {
        let result = self.load_user_items_impl().await;
        self.record(result).await
    }

    pub async fn refresh_item_accounts(&self, item_id: &ItemId) -> Result<Vec<Account>, LinkError> {
        let result = self.refresh_item_accounts_impl(item_id).await;
        self.record(result).await
    }

    pub async fn fetch_transactions(&self) -> Result<Vec<Transaction>, LinkError> {
        let result = self.fetch_transactions_impl().await;
        self.record(result).await
    }

    async fn resolve_user_impl(&self, input: &str) -> Result<User, LinkError> {
        self.inner.lock().await.flow.ensure_settled()?;
        let user = session::resolve_user(self.backend.as_ref(), input).await?;
        let mut guard = self.inner.lock().await;
        let session = guard.session.with_active(user.clone());
        let mut next = guard.with_session(session);
        if guard.active_user().map(|u| u.id) != Some(user.id) {
            next.flow = guard.flow.user_changed()?;
        }
        *guard = next;
        info!(
            "session: active user id={} known={}",
            user.id,
            guard.session.known_users().len()
        );
        Ok(user)
    }

    async fn select_user_impl(&self, user_id: UserId) -> Result<User, LinkError> {
        let mut guard = self.inner.lock().await;
        let session = guard.session.select(user_id)?;
        let mut next = guard.with_session(session);
        if guard.active_user().map(|u| u.id) != Some(user_id) {
            next.flow = guard.flow.user_changed()?;
        }
        *guard = next;
        guard
            .active_user()
            .cloned()
            .ok_or(LinkError::UnknownUser(user_id))
    }

    async fn set_mode_impl(&self, mode: LinkMode) -> Result<(), LinkError> {
        let mut guard = self.inner.lock().await;
        let next = guard.flow.set_mode(mode, &guard.items)?;
        guard.flow = next;
        Ok(())
    }

    async fn select_item_impl(&self, item_id: ItemId) -> Result<(), LinkError> {
        let mut guard = self.inner.lock().await;
        let next = guard.flow.select_item(item_id, &guard.items)?;
        guard.flow = next;
        Ok(())
    }

    async fn run_widget_impl(&self, widget: &dyn LinkWidget) -> Result<Option<Item>, LinkError> {
        let token = self.open_widget_impl().await?;
        match widget.present(&token).await {
            WidgetOutcome::Success {
                public_token,
                metadata,
            } => self
                .on_widget_success_impl(&public_token, metadata)
                .await
                .map(Some),
            WidgetOutcome::Exit { error } => self.on_widget_exit_impl(error).await.map(|()| None),
        }
    }

    async fn load_user_items_impl(&self) -> Result<Vec<Item>, LinkError> {
        let user_id = self.active_user_id().await?;
        let listed = self
            .backend
            .list_user_items(user_id)
            .await
            .map_err(LinkError::ItemFetch)?;

        let mut guard = self.inner.lock().await;
        let mut items = guard.items.clone();
        let mut added = Vec::new();
        for item in listed {
            if items.contains(&item.id) {
                continue;
            }
            items = items.add_item(item.clone()).0;
            added.push(item);
        }
        guard.items = items;
        info!("link: loaded items user={user_id} new={}", added.len());
        Ok(added)
    }

    async fn refresh_item_accounts_impl(&self, item_id: &ItemId) -> Result<Vec<Account>, LinkError> {
        if !self.inner.lock().await.items.contains(item_id) {
            return Err(LinkError::UnknownItem(item_id.clone()));
        }
        let accounts = self
            .backend
            .list_item_accounts(item_id)
            .await
            .map_err(LinkError::ItemFetch)?;

        let mut guard = self.inner.lock().await;
        let next = guard.items.with_accounts(item_id, accounts.clone())?;
        guard.items = next;
        Ok(accounts)
    }

    async fn fetch_transactions_impl(&self) -> Result<Vec<Transaction>, LinkError> {
        let user_id = self.active_user_id().await?;
        let transactions = self
            .backend
            .list_user_transactions(user_id)
            .await
            .map_err(LinkError::TransactionFetch)?;

        let mut guard = self.inner.lock().await;
        if guard.active_user().map(|u| u.id) == Some(user_id) {
            guard.transactions = TransactionView::loaded(user_id, transactions.clone());
        }
        info!(
            "transactions: fetched user={user_id} count={}",
            transactions.len()
        );
        Ok(transactions)
    }

    async fn request_link_token_impl(&self) -> Result<LinkToken, LinkError> {
        let (request, mode) = {
            let mut guard = self.inner.lock().await;
            let (next, request) = guard
                .flow
                .begin_token_request(guard.active_user(), &guard.items)?;
            guard.flow = next;
            (request, guard.flow.mode())
        };
        info!(
            "link: requesting token user={} mode={:?} item={:?}",
            request.user_id, mode, request.item_id
        );

        let issued = self
            .backend
            .issue_link_token(request.user_id, request.item_id.as_ref())
            .await;

        let mut guard = self.inner.lock().await;
        match issued {
            Ok(token) => {
                let next = guard.flow.token_issued(token.clone()).map_err(|err| {
                    warn!("link: discarding token that arrived after the flow moved on: {err}");
                    err
                })?;
                guard.flow = next;
                info!("link: token ready {}", token.preview());
                Ok(token)
            }
            Err(err) => {
                warn!("link: token issuance failed user={}: {err}", request.user_id);
                if let Ok(next) = guard.flow.token_failed(err.to_string()) {
                    guard.flow = next;
                }
                Err(LinkError::TokenIssuance(err))
            }
        }
    }

    async fn open_widget_impl(&self) -> Result<LinkToken, LinkError> {
        let mut guard = self.inner.lock().await;
        let (next, token) = guard.flow.open_widget()?;
        guard.flow = next;
        info!("link: widget open with {}", token.preview());
        Ok(token)
    }

    async fn on_widget_success_impl(
        &self,
        public_token: &str,
        metadata: WidgetMetadata,
    ) -> Result<Item, LinkError> {
        let user_id = {
            let mut guard = self.inner.lock().await;
            let (next, user_id) = guard.flow.begin_exchange(guard.active_user())?;
            guard.flow = next;
            user_id
        };

        let exchanged = self
            .backend
            .exchange_public_token(public_token, user_id)
            .await;

        let mut guard = self.inner.lock().await;
        match exchanged {
            Ok(result) => {
                let item = Item {
                    id: result.item_id,
                    institution: metadata.institution_name(),
                    accounts: result.accounts,
                };
                match guard.flow.exchange_succeeded(item.id.clone()) {
                    Ok(next) => guard.flow = next,
                    Err(err) => warn!("link: exchange finished after the flow moved on: {err}"),
                }
                let (items, insert) = guard.items.add_item(item.clone());
                guard.items = items;
                info!(
                    "link: linked item={} institution={} accounts={} insert={insert:?}",
                    item.id,
                    item.institution,
                    item.accounts.len()
                );
                Ok(item)
            }
            Err(err) => {
                warn!("link: exchange failed user={user_id}: {err}");
                if let Ok(next) = guard.flow.exchange_failed(err.to_string()) {
                    guard.flow = next;
                }
                Err(LinkError::Exchange(err))
            }
        }
    }

    async fn on_widget_exit_impl(&self, error: Option<WidgetError>) -> Result<(), LinkError> {
        let mut guard = self.inner.lock().await;
        let next = guard.flow.widget_exited(error.as_ref())?;
        guard.flow = next;
        match error {
            Some(error) => {
                warn!("link: widget exited with error: {error}");
                Err(LinkError::Widget(error))
            }
            None => {
                info!("link: widget closed by user");
                Ok(())
            }
        }
    }

    async fn active_user_id(&self) -> Result<UserId, LinkError> {
        let guard = self.inner.lock().await;
        guard
            .active_user()
            .map(|user| user.id)
            .ok_or(LinkError::NoActiveUser)
    }

    async fn record<T>(&self, result: Result<T, LinkError>) -> Result<T, LinkError> {
        let mut guard = self.inner.lock().await;
        guard.last_error = result.as_ref().err().map(ToString::to_string);
        result
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
