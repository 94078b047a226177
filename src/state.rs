use std::sync::Arc;

use crate::config::Config;
use crate::repositories::AccountRepository;

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// アカウントリポジトリ（Postgres またはインメモリ）
    pub accounts: Arc<dyn AccountRepository>,
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(accounts: Arc<dyn AccountRepository>, config: Config) -> Self {
        Self {
            accounts,
            config: Arc::new(config),
        }
    }
}
