// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 包装质检流水线 (QualiScan)
///
/// 运行检测: cargo run --bin qualiscan --release -- run -s frames/ -d detections.jsonl
///
/// 线程:
/// 1. 检测线程: 读帧 → 推理 → 越线 → 看门狗
/// 2. 消费线程: 存储 / 会话计数 / 日志
/// 3. 主线程:   键盘控制 (p 暂停/恢复, l <y> 移动判定线, q 停止)
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{never, select, unbounded, Receiver};
use mimalloc::MiMalloc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use qualiscan_rs::{
    AggregationStore, EngineFactory, EventDispatcher, FileSourceOpener, InferenceEngine,
    InferenceError, LogForwarder, Pipeline, PipelineConfig, ReplayEngine, SessionTally,
    SourceDescriptor, StoreRecorder,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(author, version, about = "QualiScan 包装质检流水线", long_about = None)]
struct Cli {
    /// 配置文件 (不存在时写入默认配置)
    #[arg(short, long, default_value = "qualiscan.json", global = true)]
    config: PathBuf,

    /// 存储目录 (覆盖配置文件)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 运行检测 (输入 p 暂停/恢复, l <y> 移动判定线, q 停止)
    Run {
        /// 输入源: 摄像头序号 / 图片序列目录 / 单张图片
        #[arg(short, long)]
        source: String,

        /// 预计算检测结果 (JSON Lines)
        #[arg(short, long)]
        detections: PathBuf,

        /// 判定线位置 (像素)
        #[arg(long)]
        line_y: Option<i32>,

        /// 置信度阈值
        #[arg(long)]
        confidence: Option<f32>,

        /// 每N帧处理一帧
        #[arg(long)]
        frame_skip: Option<u32>,
    },
    /// 导出事件日志 (最新在前, Tab 分隔)
    Export,
    /// 打印日汇总与月趋势
    Summary,
    /// 由事件日志重建汇总表
    Rebuild,
}

/// 键盘指令
enum Key {
    TogglePause,
    MoveLine(i32),
    Quit,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    if let Some(dir) = cli.store.clone() {
        config.store_dir = Some(dir);
    }

    let store_dir = config.store_dir();
    let store = AggregationStore::open(&store_dir)
        .with_context(|| format!("failed to open store {}", store_dir.display()))?;

    match cli.command {
        Command::Run {
            source,
            detections,
            line_y,
            confidence,
            frame_skip,
        } => {
            if line_y.is_some() {
                config.line_y = line_y;
            }
            if let Some(confidence) = confidence {
                config.confidence = confidence;
            }
            if let Some(frame_skip) = frame_skip {
                config.frame_skip = frame_skip;
            }
            config.validate()?;
            run(config, store, &source, detections)
        }
        Command::Export => export(&store),
        Command::Summary => summary(&store),
        Command::Rebuild => {
            let rows = store.rebuild_rollups()?;
            println!("✅ rebuilt {} rollup rows from {} events", rows, store.len());
            Ok(())
        }
    }
}

fn run(
    config: PipelineConfig,
    store: AggregationStore,
    source: &str,
    detections: PathBuf,
) -> Result<()> {
    config.log_summary();
    let descriptor = SourceDescriptor::parse(source);
    info!(source = %descriptor, detections = %detections.display(), "🚀 QualiScan starting");

    let engines: EngineFactory =
        Box::new(move || -> Result<Box<dyn InferenceEngine>, InferenceError> {
            Ok(Box::new(ReplayEngine::load(&detections)?))
        });
    let (mut pipeline, events) = Pipeline::new(config, Arc::new(FileSourceOpener), engines);

    // ========== 启动消费线程 ==========
    let tally = SessionTally::new();
    let consumer = EventDispatcher::new()
        .with(StoreRecorder::new(store.clone()))
        .with(tally.clone())
        .with(LogForwarder::new().with_summaries())
        .spawn(events)
        .context("failed to spawn consumer thread")?;

    // ========== 启动检测线程 ==========
    pipeline.start(descriptor).context("detection failed to start")?;

    let keys = spawn_keyboard();
    let mut keyboard_open = true;
    loop {
        let input = if keyboard_open { keys.clone() } else { never() };
        select! {
            recv(input) -> key => match key {
                Ok(Key::TogglePause) => {
                    if let Err(e) = pipeline.toggle_pause() {
                        warn!(error = %e, "pause toggle ignored");
                    }
                }
                Ok(Key::MoveLine(line_y)) => {
                    if let Err(e) = pipeline.set_line(line_y) {
                        warn!(error = %e, "line move ignored");
                    }
                }
                Ok(Key::Quit) => break,
                // 标准输入关闭: 继续运行直到流水线自行结束
                Err(_) => keyboard_open = false,
            },
            default(Duration::from_millis(200)) => {
                if pipeline.is_finished() {
                    break;
                }
            }
        }
    }

    pipeline.stop();
    drop(pipeline);
    let handled = consumer
        .join()
        .map_err(|_| anyhow!("consumer thread panicked"))?;

    let counts = tally.snapshot();
    info!(
        events = handled,
        total = counts.total(),
        intact = counts.intact,
        deformed = counts.damaged_deformed,
        open = counts.damaged_open,
        "session finished"
    );
    store.flush()?;
    Ok(())
}

fn spawn_keyboard() -> Receiver<Key> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let key = match line.trim() {
                "p" | "P" => Key::TogglePause,
                "q" | "Q" => Key::Quit,
                "" => continue,
                other => match parse_line_move(other) {
                    Some(line_y) => Key::MoveLine(line_y),
                    None => {
                        warn!(input = other, "unknown command, use p, q or l <y>");
                        continue;
                    }
                },
            };
            if tx.send(key).is_err() {
                break;
            }
        }
    });
    rx
}

/// "l 250" → 250
fn parse_line_move(input: &str) -> Option<i32> {
    let rest = input.strip_prefix('l').or_else(|| input.strip_prefix('L'))?;
    rest.trim().parse().ok()
}

fn export(store: &AggregationStore) -> Result<()> {
    println!("timestamp\tstatus\tdetails");
    for row in store.fetch_all()? {
        println!("{}\t{}\t{}", row.timestamp, row.status, row.details);
    }
    Ok(())
}

fn summary(store: &AggregationStore) -> Result<()> {
    println!("📅 daily summary");
    println!(
        "{:<12}{:<8}{:<10}{:<9}{:>7}{:>8}{:>10}{:>7}",
        "date", "year", "month", "week", "total", "intact", "deformed", "open"
    );
    for row in store.daily_summaries()? {
        println!(
            "{:<12}{:<8}{:<10}{:<9}{:>7}{:>8}{:>10}{:>7}",
            row.date,
            row.year,
            row.month,
            row.week,
            row.total,
            row.intact,
            row.damaged_deformed,
            row.damaged_open
        );
    }

    println!();
    println!("📈 monthly trend");
    println!(
        "{:<10}{:<8}{:<10}{:<9}{:>7}{:>8}{:>10}{:>7}",
        "period", "year", "month", "week", "total", "intact", "deformed", "open"
    );
    for row in store.monthly_trends()? {
        println!(
            "{:<10}{:<8}{:<10}{:<9}{:>7}{:>8}{:>10}{:>7}",
            row.period,
            row.year,
            row.month,
            row.week,
            row.total_defects,
            row.intact,
            row.damaged_deformed,
            row.damaged_open
        );
    }
    Ok(())
}
