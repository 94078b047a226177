use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::account::{AccountRepository, RepositoryError, prepare_new, prepare_update};
use crate::models::{Account, AccountChanges, NewAccount};

/// インメモリのアカウントリポジトリ
///
/// テストおよび `STORE_BACKEND=memory` 用。プロセス終了で内容は失われる。
/// email の一意性チェックと書き込みは同一の書き込みロック内で行う。
#[derive(Default)]
pub struct MemoryAccountRepository {
    accounts: RwLock<Accounts>,
}

/// account_id 主キーと email インデックス
///
/// 両方のマップは常に同じ書き込みロックの中で更新する
#[derive(Default)]
struct Accounts {
    by_id: HashMap<Uuid, Account>,
    by_email: HashMap<String, Uuid>,
}

impl Accounts {
    /// email が他のアカウントで使用中か
    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.by_email.get(email).is_some_and(|owner| Some(*owner) != except)
    }

    fn insert(&mut self, account: Account) {
        if let Some(previous) = self.by_id.get(&account.account_id)
            && previous.email != account.email
        {
            self.by_email.remove(&previous.email);
        }
        self.by_email.insert(account.email.clone(), account.account_id);
        self.by_id.insert(account.account_id, account);
    }

    fn remove(&mut self, account_id: Uuid) -> Option<Account> {
        let account = self.by_id.remove(&account_id)?;
        self.by_email.remove(&account.email);
        Some(account)
    }
}

impl MemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountRepository for MemoryAccountRepository {
    async fn create(&self, new: NewAccount) -> Result<Account, RepositoryError> {
        let account = prepare_new(new)?;

        let mut accounts = self.accounts.write().await;
        if accounts.email_taken(&account.email, None) {
            return Err(RepositoryError::DuplicateKey { field: "email" });
        }
        if accounts.by_id.contains_key(&account.account_id) {
            return Err(RepositoryError::DuplicateKey {
                field: "account_id",
            });
        }
        accounts.insert(account.clone());

        Ok(account)
    }

    async fn get(&self, account_id: Uuid) -> Result<Account, RepositoryError> {
        self.accounts
            .read()
            .await
            .by_id
            .get(&account_id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn find_by_email(&self, email: &str) -> Result<Account, RepositoryError> {
        let accounts = self.accounts.read().await;
        accounts
            .by_email
            .get(email)
            .and_then(|account_id| accounts.by_id.get(account_id))
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn update(
        &self,
        account_id: Uuid,
        changes: AccountChanges,
    ) -> Result<Account, RepositoryError> {
        let mut accounts = self.accounts.write().await;
        let current = accounts
            .by_id
            .get(&account_id)
            .ok_or(RepositoryError::NotFound)?;

        let updated = prepare_update(current, changes)?;
        if accounts.email_taken(&updated.email, Some(account_id)) {
            return Err(RepositoryError::DuplicateKey { field: "email" });
        }
        accounts.insert(updated.clone());

        Ok(updated)
    }

    async fn delete(&self, account_id: Uuid) -> Result<(), RepositoryError> {
        self.accounts
            .write()
            .await
            .remove(account_id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::LoginMethod;

    fn password_account(email: &str, hash: &str) -> NewAccount {
        NewAccount {
            password_hash: Some(hash.to_string()),
            ..NewAccount::new(email, LoginMethod::Password)
        }
    }

    #[tokio::test]
    async fn test_create_then_get_returns_supplied_fields() {
        let repo = MemoryAccountRepository::new();
        let new = NewAccount {
            password_hash: Some("h1".to_string()),
            salt: Some("s1".to_string()),
            first_name: Some("Taro".to_string()),
            last_name: Some("Yamada".to_string()),
            avatar_url: Some("https://example.com/taro.png".to_string()),
            pin: Some("0000".to_string()),
            public_key: Some("pub".to_string()),
            encrypted_private_key: Some("enc".to_string()),
            biography: Some("bio".to_string()),
            ..NewAccount::new("taro@example.com", LoginMethod::Password)
        };

        let created = repo.create(new.clone()).await.unwrap();
        let fetched = repo.get(created.account_id).await.unwrap();

        assert_eq!(fetched, created);
        assert_eq!(fetched.to_draft().email, new.email);
        assert_eq!(fetched.login_method, LoginMethod::Password);
        assert_eq!(fetched.salt, new.salt);
        assert_eq!(fetched.pin, new.pin);
        assert_eq!(fetched.encrypted_private_key, new.encrypted_private_key);
        assert_eq!(fetched.biography, new.biography);
        assert_eq!(fetched.created_at, fetched.updated_at);
    }

    #[tokio::test]
    async fn test_create_assigns_distinct_ids() {
        let repo = MemoryAccountRepository::new();
        let a = repo
            .create(NewAccount::new("a@x.com", LoginMethod::Google))
            .await
            .unwrap();
        let b = repo
            .create(NewAccount::new("b@x.com", LoginMethod::Github))
            .await
            .unwrap();
        assert_ne!(a.account_id, b.account_id);
    }

    #[tokio::test]
    async fn test_duplicate_email_leaves_existing_record() {
        let repo = MemoryAccountRepository::new();
        let first = repo
            .create(password_account("a@x.com", "h1"))
            .await
            .unwrap();

        let result = repo.create(password_account("a@x.com", "h2")).await;
        assert!(matches!(
            result,
            Err(RepositoryError::DuplicateKey { field: "email" })
        ));

        let fetched = repo.get(first.account_id).await.unwrap();
        assert_eq!(fetched.password_hash.as_deref(), Some("h1"));
        assert_eq!(fetched, first);
    }

    #[tokio::test]
    async fn test_email_comparison_is_exact() {
        let repo = MemoryAccountRepository::new();
        repo.create(NewAccount::new("a@x.com", LoginMethod::Google))
            .await
            .unwrap();
        assert!(
            repo.create(NewAccount::new("A@x.com", LoginMethod::Google))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_find_by_email() {
        let repo = MemoryAccountRepository::new();
        let created = repo
            .create(password_account("a@x.com", "h1"))
            .await
            .unwrap();

        let found = repo.find_by_email("a@x.com").await.unwrap();
        assert_eq!(found.account_id, created.account_id);

        let missing = repo.find_by_email("b@x.com").await;
        assert!(matches!(missing, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_update_biography_refreshes_updated_at() {
        let repo = MemoryAccountRepository::new();
        let created = repo
            .create(password_account("a@x.com", "h1"))
            .await
            .unwrap();

        let changes = AccountChanges {
            biography: Some(Some("hello".to_string())),
            ..Default::default()
        };
        let updated = repo.update(created.account_id, changes).await.unwrap();

        let fetched = repo.get(created.account_id).await.unwrap();
        assert_eq!(fetched.biography.as_deref(), Some("hello"));
        assert!(fetched.updated_at > created.created_at);
        assert!(fetched.updated_at >= created.updated_at);
        assert_eq!(fetched, updated);
        assert_eq!(fetched.password_hash.as_deref(), Some("h1"));
    }

    #[tokio::test]
    async fn test_repeated_updates_keep_timestamps_ordered() {
        let repo = MemoryAccountRepository::new();
        let created = repo
            .create(NewAccount::new("a@x.com", LoginMethod::Google))
            .await
            .unwrap();

        let mut previous = created.updated_at;
        for _ in 0..5 {
            let updated = repo
                .update(created.account_id, AccountChanges::default())
                .await
                .unwrap();
            assert!(updated.updated_at > previous);
            assert!(updated.updated_at >= updated.created_at);
            previous = updated.updated_at;
        }
    }

    #[tokio::test]
    async fn test_update_unknown_account() {
        let repo = MemoryAccountRepository::new();
        let result = repo.update(Uuid::new_v4(), AccountChanges::default()).await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn test_update_to_taken_email() {
        let repo = MemoryAccountRepository::new();
        repo.create(NewAccount::new("a@x.com", LoginMethod::Google))
            .await
            .unwrap();
        let b = repo
            .create(NewAccount::new("b@x.com", LoginMethod::Google))
            .await
            .unwrap();

        let changes = AccountChanges {
            email: Some("a@x.com".to_string()),
            biography: Some(Some("changed".to_string())),
            ..Default::default()
        };
        let result = repo.update(b.account_id, changes).await;
        assert!(matches!(
            result,
            Err(RepositoryError::DuplicateKey { field: "email" })
        ));

        // 失敗した更新は一切反映されない
        assert_eq!(repo.get(b.account_id).await.unwrap(), b);
    }

    #[tokio::test]
    async fn test_update_email_moves_index() {
        let repo = MemoryAccountRepository::new();
        let a = repo
            .create(NewAccount::new("a@x.com", LoginMethod::Google))
            .await
            .unwrap();

        let changes = AccountChanges {
            email: Some("renamed@x.com".to_string()),
            ..Default::default()
        };
        repo.update(a.account_id, changes).await.unwrap();

        let found = repo.find_by_email("renamed@x.com").await.unwrap();
        assert_eq!(found.account_id, a.account_id);
        assert!(matches!(
            repo.find_by_email("a@x.com").await,
            Err(RepositoryError::NotFound)
        ));

        // 旧アドレスは解放され、別アカウントで使用できる
        let b = repo
            .create(NewAccount::new("a@x.com", LoginMethod::Github))
            .await
            .unwrap();
        assert_eq!(repo.find_by_email("a@x.com").await.unwrap(), b);
    }

    #[tokio::test]
    async fn test_delete_releases_email_index() {
        let repo = MemoryAccountRepository::new();
        let a = repo
            .create(NewAccount::new("a@x.com", LoginMethod::Google))
            .await
            .unwrap();
        repo.delete(a.account_id).await.unwrap();

        assert!(matches!(
            repo.find_by_email("a@x.com").await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_update_to_own_email() {
        let repo = MemoryAccountRepository::new();
        let a = repo
            .create(NewAccount::new("a@x.com", LoginMethod::Google))
            .await
            .unwrap();

        let changes = AccountChanges {
            email: Some("a@x.com".to_string()),
            ..Default::default()
        };
        assert!(repo.update(a.account_id, changes).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_enables_two_factor_atomically() {
        let repo = MemoryAccountRepository::new();
        let a = repo
            .create(password_account("a@x.com", "h1"))
            .await
            .unwrap();

        let only_flag = AccountChanges {
            use_2fa: Some(true),
            ..Default::default()
        };
        assert!(matches!(
            repo.update(a.account_id, only_flag).await,
            Err(RepositoryError::Validation(_))
        ));

        let both = AccountChanges {
            use_2fa: Some(true),
            two_factor_secret: Some(Some("JBSWY3DPEHPK3PXP".to_string())),
            ..Default::default()
        };
        let updated = repo.update(a.account_id, both).await.unwrap();
        assert!(updated.use_2fa);

        let disable = AccountChanges {
            use_2fa: Some(false),
            two_factor_secret: Some(None),
            ..Default::default()
        };
        let updated = repo.update(a.account_id, disable).await.unwrap();
        assert!(!updated.use_2fa);
        assert!(updated.two_factor_secret.is_none());
    }

    #[tokio::test]
    async fn test_delete_then_get() {
        let repo = MemoryAccountRepository::new();
        let a = repo
            .create(NewAccount::new("a@x.com", LoginMethod::Google))
            .await
            .unwrap();

        repo.delete(a.account_id).await.unwrap();
        assert!(matches!(repo.get(a.account_id).await, Err(RepositoryError::NotFound)));
        assert!(matches!(
            repo.delete(a.account_id).await,
            Err(RepositoryError::NotFound)
        ));

        // 削除後は同じ email で再登録できる
        let b = repo
            .create(NewAccount::new("a@x.com", LoginMethod::Google))
            .await
            .unwrap();
        assert_ne!(a.account_id, b.account_id);
    }

    #[tokio::test]
    async fn test_concurrent_creates_with_same_email() {
        let repo = Arc::new(MemoryAccountRepository::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let repo = repo.clone();
                tokio::spawn(async move {
                    repo.create(password_account("race@x.com", &format!("h{i}")))
                        .await
                })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(RepositoryError::DuplicateKey { field }) => assert_eq!(field, "email"),
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(succeeded, 1);
    }
}
