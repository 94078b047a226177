use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::models::{Account, AccountChanges, NewAccount};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("一意制約違反: {field}")]
    DuplicateKey { field: &'static str },

    #[error("アカウントが見つかりません")]
    NotFound,

    #[error("バリデーションエラー: {0}")]
    Validation(String),

    #[error("不正な行データ: {0}")]
    CorruptRow(String),

    #[error("データベースエラー")]
    Database(#[from] sqlx::Error),
}

/// アカウントの永続化
///
/// email の一意性チェックは書き込みと同じ原子的操作の中で行うこと。
/// 失敗時にレコードが部分的に変更されることはない。
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// アカウントを作成
    ///
    /// account_id と created_at / updated_at はここで生成する
    ///
    /// # Errors
    /// - `DuplicateKey`: email が既に使用されている
    /// - `Validation`: 入力値が不正
    async fn create(&self, new: NewAccount) -> Result<Account, RepositoryError>;

    /// account_id でアカウントを取得
    async fn get(&self, account_id: Uuid) -> Result<Account, RepositoryError>;

    /// メールアドレスでアカウントを取得（ログイン時の検索用）
    async fn find_by_email(&self, email: &str) -> Result<Account, RepositoryError>;

    /// アカウントを部分更新し、updated_at を更新する
    ///
    /// # Errors
    /// - `NotFound`: account_id が存在しない
    /// - `DuplicateKey`: 他のアカウントが使用中の email に変更しようとした
    /// - `Validation`: 更新後の値が不正
    async fn update(
        &self,
        account_id: Uuid,
        changes: AccountChanges,
    ) -> Result<Account, RepositoryError>;

    /// アカウントを削除
    async fn delete(&self, account_id: Uuid) -> Result<(), RepositoryError>;

    /// バックエンド名（ヘルスチェック用）
    fn backend(&self) -> &'static str;
}

/// 新規レコードを組み立てる（検証 → ID・タイムスタンプ生成）
pub(crate) fn prepare_new(new: NewAccount) -> Result<Account, RepositoryError> {
    new.check().map_err(RepositoryError::Validation)?;
    Ok(Account::from_new(new, Uuid::new_v4(), now_utc()))
}

/// 変更を適用した更新後のレコードを組み立てる
pub(crate) fn prepare_update(
    current: &Account,
    changes: AccountChanges,
) -> Result<Account, RepositoryError> {
    let draft = changes.apply(current.to_draft());
    draft.check().map_err(RepositoryError::Validation)?;
    Ok(current
        .clone()
        .with_fields(draft, next_updated_at(current.updated_at)))
}

/// 現在時刻（マイクロ秒精度）
///
/// PostgreSQL の timestamptz に合わせて切り捨てる
pub(crate) fn now_utc() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now - Duration::nanoseconds(i64::from(now.nanosecond() % 1_000))
}

/// 更新時の updated_at
///
/// 時計が進んでいない場合でも前回値より必ず大きくする
pub(crate) fn next_updated_at(previous: OffsetDateTime) -> OffsetDateTime {
    now_utc().max(previous + Duration::microseconds(1))
}
