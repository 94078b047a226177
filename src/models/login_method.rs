use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// ログイン方式
///
/// どの認証情報フィールドが意味を持つかを決める（例: Password の場合のみ
/// password_hash / salt が有効）。この対応関係の検証は呼び出し側の責務。
///
/// DB と JSON では `as_str()` の文字列で表現する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoginMethod {
    Password,
    Google,
    Github,
    Wallet,
}

impl LoginMethod {
    pub const ALL: [LoginMethod; 4] = [
        LoginMethod::Password,
        LoginMethod::Google,
        LoginMethod::Github,
        LoginMethod::Wallet,
    ];

    /// 保存用の文字列表現
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Google => "google",
            Self::Github => "github",
            Self::Wallet => "wallet",
        }
    }
}

impl fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("不明なログイン方式です: {0}")]
pub struct UnknownLoginMethod(pub String);

impl FromStr for LoginMethod {
    type Err = UnknownLoginMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| UnknownLoginMethod(s.to_string()))
    }
}

impl Serialize for LoginMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LoginMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}
