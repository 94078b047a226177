use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::account::{AccountRepository, RepositoryError, prepare_new, prepare_update};
use crate::models::{Account, AccountChanges, AccountRow, NewAccount};

macro_rules! account_columns {
    () => {
        "account_id, email, password_hash, first_name, last_name, avatar_url, \
         is_verified, use_2fa, two_factor_secret, login_method, salt, pin, \
         public_key, encrypted_private_key, biography, created_at, updated_at"
    };
}

const EMAIL_CONSTRAINT: &str = "account_email_key";
const PRIMARY_KEY_CONSTRAINT: &str = "account_pkey";

/// PostgreSQL のアカウントリポジトリ
///
/// email の一意性は UNIQUE 制約 `account_email_key` に任せる
#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 行ロックを取得してアカウントを読み込む
    async fn lock_for_update(
        tx: &mut Transaction<'_, Postgres>,
        account_id: Uuid,
    ) -> Result<Option<Account>, RepositoryError> {
        let row = sqlx::query_as::<_, AccountRow>(concat!(
            "SELECT ",
            account_columns!(),
            " FROM account WHERE account_id = $1 FOR UPDATE"
        ))
        .bind(account_id)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(into_account).transpose()
    }
}

fn into_account(row: AccountRow) -> Result<Account, RepositoryError> {
    let account_id = row.account_id;
    Account::try_from(row).map_err(|e| {
        tracing::error!(account_id = %account_id, error = %e, "不正なログイン方式が保存されている");
        RepositoryError::CorruptRow(e.to_string())
    })
}

/// UNIQUE 制約違反を DuplicateKey に変換
fn map_write_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &e {
        match db_err.constraint() {
            Some(EMAIL_CONSTRAINT) => return RepositoryError::DuplicateKey { field: "email" },
            Some(PRIMARY_KEY_CONSTRAINT) => {
                return RepositoryError::DuplicateKey {
                    field: "account_id",
                };
            }
            _ => {}
        }
    }
    RepositoryError::Database(e)
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn create(&self, new: NewAccount) -> Result<Account, RepositoryError> {
        let account = prepare_new(new)?;

        let row = sqlx::query_as::<_, AccountRow>(concat!(
            "INSERT INTO account (",
            account_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) \
             RETURNING ",
            account_columns!()
        ))
        .bind(account.account_id)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(&account.avatar_url)
        .bind(account.is_verified)
        .bind(account.use_2fa)
        .bind(&account.two_factor_secret)
        .bind(account.login_method.as_str())
        .bind(&account.salt)
        .bind(&account.pin)
        .bind(&account.public_key)
        .bind(&account.encrypted_private_key)
        .bind(&account.biography)
        .bind(account.created_at)
        .bind(account.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        into_account(row)
    }

    async fn get(&self, account_id: Uuid) -> Result<Account, RepositoryError> {
        let row = sqlx::query_as::<_, AccountRow>(concat!(
            "SELECT ",
            account_columns!(),
            " FROM account WHERE account_id = $1"
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        into_account(row)
    }

    async fn find_by_email(&self, email: &str) -> Result<Account, RepositoryError> {
        let row = sqlx::query_as::<_, AccountRow>(concat!(
            "SELECT ",
            account_columns!(),
            " FROM account WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        into_account(row)
    }

    async fn update(
        &self,
        account_id: Uuid,
        changes: AccountChanges,
    ) -> Result<Account, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current = Self::lock_for_update(&mut tx, account_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        let updated = prepare_update(&current, changes)?;

        let row = sqlx::query_as::<_, AccountRow>(concat!(
            "UPDATE account SET \
             email = $2, password_hash = $3, first_name = $4, last_name = $5, \
             avatar_url = $6, is_verified = $7, use_2fa = $8, two_factor_secret = $9, \
             login_method = $10, salt = $11, pin = $12, public_key = $13, \
             encrypted_private_key = $14, biography = $15, updated_at = $16 \
             WHERE account_id = $1 RETURNING ",
            account_columns!()
        ))
        .bind(account_id)
        .bind(&updated.email)
        .bind(&updated.password_hash)
        .bind(&updated.first_name)
        .bind(&updated.last_name)
        .bind(&updated.avatar_url)
        .bind(updated.is_verified)
        .bind(updated.use_2fa)
        .bind(&updated.two_factor_secret)
        .bind(updated.login_method.as_str())
        .bind(&updated.salt)
        .bind(&updated.pin)
        .bind(&updated.public_key)
        .bind(&updated.encrypted_private_key)
        .bind(&updated.biography)
        .bind(updated.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;

        tx.commit().await?;

        into_account(row)
    }

    async fn delete(&self, account_id: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            DELETE FROM account
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
