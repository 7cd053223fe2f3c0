//! Roster of known voters.
//!
//! Accounts are provisioned statically. Handlers resolve the ids carried in
//! request payloads against this directory, so an unknown id is rejected
//! before it can reach a poll.

use serde::{Deserialize, Serialize};

/// A provisioned account that can create polls and vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier referenced by polls and votes.
    pub id: String,
    /// Login name, unique across the roster.
    pub username: String,
    /// Name shown to other voters.
    pub display_name: String,
}

/// Lookup interface over the provisioned accounts.
pub trait UserDirectory: Send + Sync {
    /// Resolve an account by its stable id.
    fn find_by_id(&self, id: &str) -> Option<User>;
    /// Resolve an account by its login name.
    fn find_by_username(&self, username: &str) -> Option<User>;
    /// Every provisioned account, in roster order.
    fn all(&self) -> Vec<User>;
}

/// In-memory directory over a fixed roster.
#[derive(Debug, Clone)]
pub struct StaticUserDirectory {
    users: Vec<User>,
}

impl StaticUserDirectory {
    /// Build a directory over the given roster.
    pub fn new(users: Vec<User>) -> Self {
        Self { users }
    }
}

impl UserDirectory for StaticUserDirectory {
    fn find_by_id(&self, id: &str) -> Option<User> {
        self.users.iter().find(|user| user.id == id).cloned()
    }

    fn find_by_username(&self, username: &str) -> Option<User> {
        self.users
            .iter()
            .find(|user| user.username == username)
            .cloned()
    }

    fn all(&self) -> Vec<User> {
        self.users.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> StaticUserDirectory {
        StaticUserDirectory::new(vec![
            User {
                id: "user1".to_owned(),
                username: "alpha".to_owned(),
                display_name: "Alpha Player".to_owned(),
            },
            User {
                id: "user2".to_owned(),
                username: "bravo".to_owned(),
                display_name: "Bravo Player".to_owned(),
            },
        ])
    }

    #[test]
    fn resolves_by_id() {
        let directory = roster();
        let user = directory.find_by_id("user2").unwrap();
        assert_eq!(user.username, "bravo");
    }

    #[test]
    fn resolves_by_username() {
        let directory = roster();
        let user = directory.find_by_username("alpha").unwrap();
        assert_eq!(user.id, "user1");
    }

    #[test]
    fn unknown_id_is_none() {
        let directory = roster();
        assert!(directory.find_by_id("user99").is_none());
    }

    #[test]
    fn all_preserves_roster_order() {
        let directory = roster();
        let ids: Vec<String> = directory.all().into_iter().map(|user| user.id).collect();
        assert_eq!(ids, vec!["user1".to_owned(), "user2".to_owned()]);
    }
}
