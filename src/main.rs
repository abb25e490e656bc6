use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use coordinator::app::Application;
use coordinator::shutdown::ShutdownManager;
use coordinator_core::AppConfig;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("coordinator")
        .version("1.0.0")
        .about("分布式后台任务协调服务")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，不指定时查找 config/coordinator.toml"),
        )
        .arg(
            Arg::new("instance-prefix")
                .long("instance-prefix")
                .value_name("PREFIX")
                .help("实例ID前缀，覆盖配置"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置")
                .value_parser(["json", "pretty"]),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let mut config = AppConfig::load(config_path.map(String::as_str)).with_context(|| {
        format!(
            "加载配置失败: {}",
            config_path.map(String::as_str).unwrap_or("<默认路径>")
        )
    })?;

    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }
    if let Some(prefix) = matches.get_one::<String>("instance-prefix") {
        config.coordination.instance_prefix = prefix.clone();
    }

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;

    info!("启动分布式后台任务协调服务");
    if let Some(path) = config_path {
        info!("配置文件: {path}");
    }

    let app = Arc::new(Application::new(config).await?);
    let shutdown_manager = ShutdownManager::new();

    let app_handle = {
        let app = Arc::clone(&app);
        let token = shutdown_manager.token();
        tokio::spawn(async move {
            if let Err(e) = app.run(token).await {
                error!("应用运行失败: {e:#}");
            }
        })
    };

    if let Err(e) = wait_for_shutdown_signal().await {
        error!("监听关闭信号失败，立即关闭: {e:#}");
    }

    info!("收到关闭信号，开始优雅关闭...");

    let finished = shutdown_manager
        .shutdown_and_wait(
            async move {
                if let Err(e) = app_handle.await {
                    error!("应用关闭时发生错误: {e}");
                }
            },
            SHUTDOWN_TIMEOUT,
        )
        .await;
    if !finished {
        warn!("应用关闭超时，强制退出");
    }

    info!("分布式后台任务协调服务已退出");
    Ok(())
}

fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("安装SIGTERM信号处理器失败")?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("安装Ctrl+C信号处理器失败")?;
                info!("收到Ctrl+C信号");
            }
            _ = terminate.recv() => {
                info!("收到SIGTERM信号");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("安装Ctrl+C信号处理器失败")?;
        info!("收到Ctrl+C信号");
    }

    Ok(())
}
