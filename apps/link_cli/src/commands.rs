//! Commands typed at the link console.

use client_core::LinkMode;
use shared::domain::{ItemId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Resolve by numeric id or create by name.
    User(String),
    Select(UserId),
    Users,
    Mode(LinkMode),
    Item(ItemId),
    Token,
    Open,
    Link,
    Items,
    Load,
    Accounts(ItemId),
    Transactions,
    Reset,
    State,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  user <id|name>     resolve an existing user id or create a user
  select <id>        switch to a known user
  users              list known users
  mode normal|update choose the link mode
  item <item-id>     choose the item to re-link in update mode
  token              request a link token
  open               open the widget with the held token
  link               token + open in one step
  items              list linked items
  load               register the backend's items for the active user
  accounts <item-id> refresh accounts of an item
  transactions       fetch transactions for the active user
  reset              force the link flow back to idle
  state              print the client state as JSON
  help | quit";

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (name, arg) = match line.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (line, ""),
        };
        let command = match name.to_ascii_lowercase().as_str() {
            "user" => Self::User(required(name, arg)?.to_string()),
            "select" => Self::Select(
                required(name, arg)?
                    .parse::<i64>()
                    .map(UserId)
                    .map_err(|_| format!("'{arg}' is not a user id"))?,
            ),
            "users" => Self::Users,
            "mode" => match arg.to_ascii_lowercase().as_str() {
                "normal" => Self::Mode(LinkMode::Normal),
                "update" => Self::Mode(LinkMode::Update),
                _ => return Err("usage: mode normal|update".into()),
            },
            "item" => Self::Item(ItemId::new(required(name, arg)?)),
            "token" => Self::Token,
            "open" => Self::Open,
            "link" => Self::Link,
            "items" => Self::Items,
            "load" => Self::Load,
            "accounts" => Self::Accounts(ItemId::new(required(name, arg)?)),
            "transactions" | "tx" => Self::Transactions,
            "reset" => Self::Reset,
            "state" => Self::State,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            "" => return Err("empty command".into()),
            other => return Err(format!("unknown command '{other}', try 'help'")),
        };
        Ok(command)
    }
}

fn required<'a>(name: &str, arg: &'a str) -> Result<&'a str, String> {
    if arg.is_empty() {
        Err(format!("'{name}' needs an argument"))
    } else {
        Ok(arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(Command::parse("user 42"), Ok(Command::User("42".into())));
        assert_eq!(
            Command::parse("  user  Jane Doe "),
            Ok(Command::User("Jane Doe".into()))
        );
        assert_eq!(Command::parse("select 7"), Ok(Command::Select(UserId(7))));
        assert_eq!(
            Command::parse("MODE Update"),
            Ok(Command::Mode(LinkMode::Update))
        );
        assert_eq!(
            Command::parse("item item-7"),
            Ok(Command::Item(ItemId::new("item-7")))
        );
        assert_eq!(Command::parse("tx"), Ok(Command::Transactions));
    }

    #[test]
    fn rejects_missing_or_bad_arguments() {
        assert!(Command::parse("user").is_err());
        assert!(Command::parse("select bob").is_err());
        assert!(Command::parse("mode sideways").is_err());
        assert!(Command::parse("").is_err());
        assert!(Command::parse("fly").is_err());
    }
}
