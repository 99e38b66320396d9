//! Plain-text views of users, items and transactions.

use std::fmt::Write;

use shared::domain::{Account, Item, Transaction, User, UserId};

pub fn user_line(user: &User, active: Option<UserId>) -> String {
    let marker = if active == Some(user.id) { "*" } else { " " };
    format!("{marker} {} {}", user.id, user.username)
}

pub fn account_line(account: &Account) -> String {
    match &account.mask {
        Some(mask) => format!("{} (...{mask}) {}", account.name, account.kind),
        None => format!("{} {}", account.name, account.kind),
    }
}

pub fn item_block(item: &Item) -> String {
    let mut out = format!("{} [{}]", item.institution, item.id);
    if item.accounts.is_empty() {
        out.push_str("\n  no accounts");
    }
    for account in &item.accounts {
        let _ = write!(out, "\n  {}", account_line(account));
    }
    out
}

/// Fixed-width table. Amounts print unsigned; the flow column keeps the sign
/// (negative amounts are money coming in).
pub fn transactions_table(transactions: &[Transaction]) -> String {
    if transactions.is_empty() {
        return "no transactions".to_string();
    }
    let mut out = format!(
        "{:<10}  {:<28}  {:>12}  {:<4}  {:<20}  {}",
        "date", "name", "amount", "flow", "category", "pending"
    );
    for tx in transactions {
        let flow = if tx.amount.is_sign_negative() { "in" } else { "out" };
        let _ = write!(
            out,
            "\n{:<10}  {:<28}  {:>12}  {:<4}  {:<20}  {}",
            tx.date.format("%Y-%m-%d"),
            truncate(&tx.name, 28),
            format!("{:.2}", tx.amount.abs()),
            flow,
            truncate(&tx.category.to_string(), 20),
            if tx.pending { "Yes" } else { "No" },
        );
    }
    out
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let kept: String = value.chars().take(width.saturating_sub(3)).collect();
    format!("{kept}...")
}
