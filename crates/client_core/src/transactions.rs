use serde::{Deserialize, Serialize};
use shared::domain::{Transaction, UserId};

/// The most recently fetched transactions; nothing is kept beyond this view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionView {
    user_id: Option<UserId>,
    transactions: Vec<Transaction>,
}

impl TransactionView {
    pub fn loaded(user_id: UserId, transactions: Vec<Transaction>) -> Self {
        Self {
            user_id: Some(user_id),
            transactions,
        }
    }

    /// `None` until a fetch succeeds for the current user.
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn is_loaded(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }
}
