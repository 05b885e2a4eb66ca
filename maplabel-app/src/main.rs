use std::path::PathBuf;

use maplabel_config::{AppConfig, ConfigError};
use maplabel_engine::map::{LabelMap, LabelingSummary};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod demo;

fn main() {
    let mut args = std::env::args().skip(1);
    let mut config_override: Option<PathBuf> = None;
    let mut summary_only = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--summary-only" => summary_only = true,
            "--config" => {
                let Some(path) = args.next() else {
                    eprintln!("`--config` 需要提供配置文件路径");
                    std::process::exit(1);
                };
                config_override = Some(PathBuf::from(path));
            }
            other => {
                eprintln!("未知参数：{other}");
                std::process::exit(1);
            }
        }
    }

    let config = load_configuration(config_override);
    init_logging(&config);
    info!("启动地图注记演示");

    let mut map = match demo::build_demo_map(&config) {
        Ok(map) => map,
        Err(err) => {
            error!(error = %err, "构建演示地图失败");
            std::process::exit(1);
        }
    };

    for (class, finding) in map.validate() {
        warn!(class = %class, finding = %finding, "注记类序列校验未通过");
    }

    let summary = map.label();
    print_summary(&summary);
    if !summary_only {
        print_requests(&map);
    }
    if summary.errors > 0 {
        std::process::exit(2);
    }
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}

fn print_summary(summary: &LabelingSummary) {
    println!("地图注记结果");
    println!("  - 请求总数 = {}", summary.total);
    println!("  - 直接放置 = {}", summary.placed);
    println!("  - 引线放置 = {}", summary.placed_with_leader);
    println!("  - 强制放置 = {}", summary.forced);
    println!("  - 已抑制 = {}", summary.suppressed);
    println!("  - 待放引线 = {}", summary.deferred);
    println!("  - 未放置 = {}", summary.unplaced);
    println!("  - 执行错误 = {}", summary.errors);
    if summary.interrupted {
        println!("运行被中断，剩余请求未处理。");
    }
    if summary.timed_out {
        println!("运行超时，剩余请求未处理。");
    }
}

fn print_requests(map: &LabelMap) {
    println!("注记明细：");
    for request in map.requests() {
        let Some(placement) = request.placement() else {
            println!(
                "  - #{} [{}] 状态={:?}",
                request.id().get(),
                request.label_class(),
                request.state()
            );
            continue;
        };
        let center = placement.bounds.center();
        println!(
            "  - #{} [{}] 状态={:?}, 中心=({:.2}, {:.2}), 角度={:.1}°, 字号={:.2}, 文字={}",
            request.id().get(),
            request.label_class(),
            request.state(),
            center.x(),
            center.y(),
            placement.angle.to_degrees(),
            placement.font_size,
            placement.lines.join(" / ")
        );
        if !placement.hidden.is_empty() {
            let hidden: Vec<String> = placement.hidden.iter().map(ToString::to_string).collect();
            println!("      隐藏元素：{}", hidden.join(", "));
        }
        if let Some(leader) = placement.leader {
            println!(
                "      引线：({:.2}, {:.2}) → ({:.2}, {:.2})",
                leader.from.x(),
                leader.from.y(),
                leader.to.x(),
                leader.to.y()
            );
        }
    }
}
