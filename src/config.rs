use secrecy::SecretBox;
use serde::Deserialize;

/// アカウントの保存先
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    /// 永続化しない（開発・テスト用）
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    // ストレージ設定
    #[serde(default)]
    pub store_backend: StoreBackend,
    /// STORE_BACKEND=postgres の場合は必須
    #[serde(default)]
    pub database_url: Option<SecretBox<String>>,
    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,
    /// 起動時に migrations/ を適用するか
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,

    // CORS設定（カンマ区切り、未設定ならCORSヘッダーを付与しない）
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,
}

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_database_max_connections() -> u32 {
    DEFAULT_DATABASE_MAX_CONNECTIONS
}

fn default_run_migrations() -> bool {
    true
}

impl Config {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    /// 任意のキー・値の組から設定を読み込む（キーは環境変数と同じ大文字表記）
    pub fn from_pairs<I>(pairs: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter(pairs)
    }

    /// CORS許可オリジンの一覧
    pub fn cors_origins(&self) -> Vec<&str> {
        self.cors_allowed_origins
            .as_deref()
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}
