use std::net::SocketAddr;
use std::sync::Arc;

use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use oxaccount::{
    config::{Config, StoreBackend},
    repositories::{AccountRepository, MemoryAccountRepository, PgAccountRepository},
    router::create_router,
    state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ログ初期化（JSON形式、環境変数でレベル制御）
    init_tracing();

    tracing::info!("oxaccount 起動中...");

    // 設定読み込み
    let config = Config::load().map_err(|e| {
        tracing::error!(error = ?e, "設定の読み込みに失敗");
        anyhow::anyhow!("Failed to load config: {}", e)
    })?;

    tracing::info!(
        host = %config.host,
        port = %config.port,
        store_backend = ?config.store_backend,
        "設定読み込み完了"
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| {
            tracing::error!(error = ?e, "アドレスのパースに失敗");
            anyhow::anyhow!("Failed to parse address: {}", e)
        })?;

    // リポジトリ初期化
    let accounts = init_repository(&config).await?;

    let state = AppState::new(accounts, config);
    let app = create_router(state);

    // サーバー起動
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(error = ?e, addr = %addr, "ポートのバインドに失敗");
        anyhow::anyhow!("Failed to bind to {}: {}", addr, e)
    })?;

    tracing::info!(addr = %addr, "サーバー起動");

    // Graceful shutdown 対応
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "サーバーエラー");
            anyhow::anyhow!("Server error: {}", e)
        })?;

    tracing::info!("サーバー終了");

    Ok(())
}

/// tracing の初期化（JSON形式）
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,oxaccount=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// 設定に応じたアカウントリポジトリを作成
async fn init_repository(config: &Config) -> anyhow::Result<Arc<dyn AccountRepository>> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("インメモリストレージを使用（データは永続化されない）");
            Ok(Arc::new(MemoryAccountRepository::new()))
        }
        StoreBackend::Postgres => {
            let database_url = config.database_url.as_ref().ok_or_else(|| {
                tracing::error!("DATABASE_URL が未設定");
                anyhow::anyhow!("DATABASE_URL is required when STORE_BACKEND=postgres")
            })?;

            // データベース接続プール作成
            let db_pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url.expose_secret())
                .await
                .map_err(|e| {
                    tracing::error!(error = ?e, "データベース接続に失敗");
                    anyhow::anyhow!("Failed to connect to database: {}", e)
                })?;

            tracing::info!("データベース接続完了");

            if config.run_migrations {
                sqlx::migrate!("./migrations")
                    .run(&db_pool)
                    .await
                    .map_err(|e| {
                        tracing::error!(error = ?e, "マイグレーションに失敗");
                        anyhow::anyhow!("Failed to run migrations: {}", e)
                    })?;

                tracing::info!("マイグレーション完了");
            }

            Ok(Arc::new(PgAccountRepository::new(db_pool)))
        }
    }
}

/// Graceful shutdown シグナル待機
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "Ctrl+C ハンドラーのインストールに失敗");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = ?e, "SIGTERM ハンドラーのインストールに失敗");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("SIGTERM received, starting graceful shutdown");
        }
    }
}
