use serde::{Deserialize, Serialize};
use shared::domain::User;

use crate::{
    items::ItemRegistry, link_flow::LinkFlow, session::SessionStore,
    transactions::TransactionView,
};

/// Everything the link client knows, as one serializable record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    pub session: SessionStore,
    pub flow: LinkFlow,
    pub items: ItemRegistry,
    pub transactions: TransactionView,
    /// Human-readable message of the last failed operation.
    pub last_error: Option<String>,
}

impl AppState {
    pub fn active_user(&self) -> Option<&User> {
        self.session.active_user()
    }

    /// Switches the acting user; the transaction view belongs to the previous one.
    pub fn with_session(&self, session: SessionStore) -> Self {
        let mut next = self.clone();
        let switched = next.session.active_user().map(|u| u.id) != session.active_user().map(|u| u.id);
        next.session = session;
        if switched {
            next.transactions = TransactionView::default();
        }
        next
    }
}
