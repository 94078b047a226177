use garde::Validate;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use super::login_method::{LoginMethod, UnknownLoginMethod};

/// 永続化されたアカウント
///
/// # Security
/// password_hash / salt / pin / two_factor_secret / encrypted_private_key は
/// シリアライズ対象外。ログにも出力しないこと。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub account_id: Uuid,
    pub email: String,
    #[serde(skip)]
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub use_2fa: bool,
    #[serde(skip)]
    pub two_factor_secret: Option<String>,
    pub login_method: LoginMethod,
    #[serde(skip)]
    pub salt: Option<String>,
    #[serde(skip)]
    pub pin: Option<String>,
    pub public_key: Option<String>,
    #[serde(skip)]
    pub encrypted_private_key: Option<String>,
    pub biography: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Account {
    /// 入力値から新しいレコードを組み立てる
    ///
    /// account_id と created_at / updated_at は呼び出し側（リポジトリ）が生成して渡す
    pub fn from_new(new: NewAccount, account_id: Uuid, now: OffsetDateTime) -> Self {
        Self {
            account_id,
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            avatar_url: new.avatar_url,
            is_verified: new.is_verified,
            use_2fa: new.use_2fa,
            two_factor_secret: new.two_factor_secret,
            login_method: new.login_method,
            salt: new.salt,
            pin: new.pin,
            public_key: new.public_key,
            encrypted_private_key: new.encrypted_private_key,
            biography: new.biography,
            created_at: now,
            updated_at: now,
        }
    }

    /// 現在の可変フィールドを NewAccount として取り出す
    pub fn to_draft(&self) -> NewAccount {
        NewAccount {
            email: self.email.clone(),
            login_method: self.login_method,
            password_hash: self.password_hash.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            avatar_url: self.avatar_url.clone(),
            is_verified: self.is_verified,
            use_2fa: self.use_2fa,
            two_factor_secret: self.two_factor_secret.clone(),
            salt: self.salt.clone(),
            pin: self.pin.clone(),
            public_key: self.public_key.clone(),
            encrypted_private_key: self.encrypted_private_key.clone(),
            biography: self.biography.clone(),
        }
    }

    /// 可変フィールドを差し替える（account_id と created_at は維持）
    pub fn with_fields(self, draft: NewAccount, updated_at: OffsetDateTime) -> Self {
        Self {
            updated_at,
            ..Self::from_new(draft, self.account_id, self.created_at)
        }
    }
}

/// account テーブルの行
///
/// login_method は TEXT で保存されているため、変換時に検証する
#[derive(Debug, FromRow)]
pub struct AccountRow {
    pub account_id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub use_2fa: bool,
    pub two_factor_secret: Option<String>,
    pub login_method: String,
    pub salt: Option<String>,
    pub pin: Option<String>,
    pub public_key: Option<String>,
    pub encrypted_private_key: Option<String>,
    pub biography: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<AccountRow> for Account {
    type Error = UnknownLoginMethod;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Self {
            account_id: row.account_id,
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            avatar_url: row.avatar_url,
            is_verified: row.is_verified,
            use_2fa: row.use_2fa,
            two_factor_secret: row.two_factor_secret,
            login_method: row.login_method.parse()?,
            salt: row.salt,
            pin: row.pin,
            public_key: row.public_key,
            encrypted_private_key: row.encrypted_private_key,
            biography: row.biography,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// アカウント作成の入力
///
/// 文字数の上限は account テーブルのカラム定義に合わせている
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct NewAccount {
    #[garde(email, length(chars, max = 255))]
    pub email: String,
    #[garde(skip)]
    pub login_method: LoginMethod,
    #[serde(default)]
    #[garde(length(chars, max = 500))]
    pub password_hash: Option<String>,
    #[serde(default)]
    #[garde(length(chars, max = 100))]
    pub first_name: Option<String>,
    #[serde(default)]
    #[garde(length(chars, max = 100))]
    pub last_name: Option<String>,
    #[serde(default)]
    #[garde(url, length(chars, max = 500))]
    pub avatar_url: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub is_verified: bool,
    #[serde(default)]
    #[garde(skip)]
    pub use_2fa: bool,
    #[serde(default)]
    #[garde(length(chars, max = 255))]
    pub two_factor_secret: Option<String>,
    #[serde(default)]
    #[garde(length(chars, max = 500))]
    pub salt: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub pin: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub public_key: Option<String>,
    #[serde(default)]
    #[garde(skip)]
    pub encrypted_private_key: Option<String>,
    #[serde(default)]
    #[garde(length(chars, max = 500))]
    pub biography: Option<String>,
}

impl NewAccount {
    /// 必須項目のみで入力を作成
    pub fn new(email: impl Into<String>, login_method: LoginMethod) -> Self {
        Self {
            email: email.into(),
            login_method,
            password_hash: None,
            first_name: None,
            last_name: None,
            avatar_url: None,
            is_verified: false,
            use_2fa: false,
            two_factor_secret: None,
            salt: None,
            pin: None,
            public_key: None,
            encrypted_private_key: None,
            biography: None,
        }
    }

    /// フィールド単位の検証と、組で扱う認証情報の整合性チェック
    ///
    /// login_method と認証情報の対応は検証しない（呼び出し側の責務）
    pub fn check(&self) -> Result<(), String> {
        self.validate().map_err(|report| report.to_string())?;

        if self.use_2fa != self.two_factor_secret.is_some() {
            return Err(if self.use_2fa {
                "use_2fa が有効な場合は two_factor_secret が必須です".to_string()
            } else {
                "two_factor_secret は use_2fa が有効な場合のみ設定できます".to_string()
            });
        }
        if self.salt.is_some() && self.password_hash.is_none() {
            return Err("salt は password_hash と組で設定してください".to_string());
        }
        if self.public_key.is_some() != self.encrypted_private_key.is_some() {
            return Err("public_key と encrypted_private_key は組で設定してください".to_string());
        }
        Ok(())
    }
}

/// アカウントの部分更新
///
/// - フィールド省略: 変更なし
/// - `null`: 値をクリア（任意項目のみ）
/// - 値: 上書き
///
/// account_id / created_at は変更不可のため含まない
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountChanges {
    #[serde(default, deserialize_with = "present")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub login_method: Option<LoginMethod>,
    #[serde(default, deserialize_with = "present")]
    pub password_hash: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub first_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub last_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub avatar_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub is_verified: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub use_2fa: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    pub two_factor_secret: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub salt: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub pin: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub public_key: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub encrypted_private_key: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub biography: Option<Option<String>>,
}

impl AccountChanges {
    /// 変更を draft に適用する
    pub fn apply(self, mut draft: NewAccount) -> NewAccount {
        if let Some(email) = self.email {
            draft.email = email;
        }
        if let Some(login_method) = self.login_method {
            draft.login_method = login_method;
        }
        if let Some(is_verified) = self.is_verified {
            draft.is_verified = is_verified;
        }
        if let Some(use_2fa) = self.use_2fa {
            draft.use_2fa = use_2fa;
        }

        replace(&mut draft.password_hash, self.password_hash);
        replace(&mut draft.first_name, self.first_name);
        replace(&mut draft.last_name, self.last_name);
        replace(&mut draft.avatar_url, self.avatar_url);
        replace(&mut draft.two_factor_secret, self.two_factor_secret);
        replace(&mut draft.salt, self.salt);
        replace(&mut draft.pin, self.pin);
        replace(&mut draft.public_key, self.public_key);
        replace(&mut draft.encrypted_private_key, self.encrypted_private_key);
        replace(&mut draft.biography, self.biography);

        draft
    }
}

fn replace(field: &mut Option<String>, change: Option<Option<String>>) {
    if let Some(value) = change {
        *field = value;
    }
}

/// フィールドが存在する場合は Some で包む
///
/// `Option<Option<T>>` では `null` を Some(None) として扱い、
/// `Option<T>` では `null` をエラーにする
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}
