mod config;
mod error;
mod gateway;
mod handlers;
mod models;
mod routes;
mod services;
mod state;
mod store;
mod utils;

use std::io;
use std::io::Write;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use chrono::Local;
use sqlx::postgres::PgPoolOptions;

use crate::config::Config;
use crate::routes::{api_v1_routes, public_routes};
use crate::state::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    let mut log_builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    log_builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S %:z"),
                record.level(),
                record.args()
            )
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e)) // 转换为 io::Result
        })
        .init();

    // 加载配置
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    // 建立数据库连接池
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(config.database.connect_timeout))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .context("Failed to run database migrations")?;

    let bind_address = config.bind_address();
    let workers = config.server.workers;
    let app_state = web::Data::new(AppState::new(db_pool, config)?);

    // 启动过期订单扫描后台任务
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let sweep_handle = {
        let sweep = app_state.sweep_service.clone();
        tokio::spawn(async move { sweep.run(shutdown_rx).await })
    };

    log::info!("Starting CreditPay server at http://{}", bind_address);

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .service(api_v1_routes())
            .service(public_routes())
    });
    if let Some(workers) = workers {
        server = server.workers(workers);
    }
    server.bind(&bind_address)?.run().await?;

    // HTTP服务退出后通知后台任务收尾
    let _ = shutdown_tx.send(true);
    let _ = sweep_handle.await;
    log::info!("Server stopped");

    Ok(())
}
