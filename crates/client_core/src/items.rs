use serde::{Deserialize, Serialize};
use shared::domain::{Account, Item, ItemId};

use crate::error::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemInsert {
    Appended,
    /// The backend returned an id that was already registered; its entry was
    /// overwritten where it stood.
    Replaced,
}

/// Linked items in insertion order, unique by item id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRegistry {
    items: Vec<Item>,
}

impl ItemRegistry {
    pub fn list_items(&self) -> &[Item] {
        &self.items
    }

    pub fn get(&self, item_id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|item| &item.id == item_id)
    }

    pub fn contains(&self, item_id: &ItemId) -> bool {
        self.get(item_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Registers `item` under its own id. Entries for the same institution are
    /// never merged.
    pub fn add_item(&self, item: Item) -> (Self, ItemInsert) {
        let mut next = self.clone();
        match next.items.iter_mut().find(|existing| existing.id == item.id) {
            Some(existing) => {
                *existing = item;
                (next, ItemInsert::Replaced)
            }
            None => {
                next.items.push(item);
                (next, ItemInsert::Appended)
            }
        }
    }

    pub fn with_accounts(&self, item_id: &ItemId, accounts: Vec<Account>) -> Result<Self, LinkError> {
        let mut next = self.clone();
        let item = next
            .items
            .iter_mut()
            .find(|item| &item.id == item_id)
            .ok_or_else(|| LinkError::UnknownItem(item_id.clone()))?;
        item.accounts = accounts;
        Ok(next)
    }
}
