use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::accounts_repository::{Account, AccountsRepository, AccountsRepositoryError};
use crate::api::UserId;

pub struct InMemoryAccountsRepository {
    user_sequence_generator: AtomicI32,
    accounts: parking_lot::RwLock<HashMap<String, Account>>,
}

impl Default for InMemoryAccountsRepository {
    fn default() -> Self {
        Self {
            user_sequence_generator: AtomicI32::new(1),
            accounts: Default::default(),
        }
    }
}

#[async_trait::async_trait]
impl AccountsRepository for InMemoryAccountsRepository {
    async fn create_account(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<UserId, AccountsRepositoryError> {
        match self.accounts.write().entry(email.to_string()) {
            Entry::Occupied(_) => Err(AccountsRepositoryError::EmailTaken(email.to_string())),
            Entry::Vacant(entry) => {
                let user_id = self.user_sequence_generator.fetch_add(1, Ordering::Relaxed);
                entry.insert(Account {
                    user_id,
                    email: email.to_string(),
                    password_hash: password_hash.to_string(),
                });
                Ok(user_id)
            }
        }
    }

    async fn find_account(&self, email: &str) -> Result<Option<Account>, AccountsRepositoryError> {
        Ok(self.accounts.read().get(email).cloned())
    }

    async fn delete_account(&self, user_id: UserId) -> Result<bool, AccountsRepositoryError> {
        let mut accounts = self.accounts.write();
        let before = accounts.len();
        accounts.retain(|_, account| account.user_id != user_id);
        Ok(accounts.len() != before)
    }
}
