use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use beaconfix::{run_positioning_task, LocatorConfig, ObservationDecoder, PositioningEngine};

#[derive(Parser, Debug)]
#[command(name = "beaconfix")]
#[command(about = "RSSI 信标定位 - 从 JSON 行读取观测，输出定位事件", long_about = None)]
struct Args {
    /// 配置文件（JSON），缺省使用内置默认值
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// 观测数据文件（每行一条 JSON 消息），缺省读取标准输入
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// 日志级别（可被 RUST_LOG 覆盖）
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 通道容量
    #[arg(long, default_value_t = 100)]
    channel_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .target(env_logger::Target::Stderr)
        .init();

    let config = match &args.config {
        Some(path) => LocatorConfig::from_file(path)
            .with_context(|| format!("加载配置失败: {}", path.display()))?,
        None => LocatorConfig::default(),
    };
    let decoder = ObservationDecoder::new(config.topic_regex()?);
    let engine = PositioningEngine::new(config)?;

    let (observation_tx, observation_rx) = mpsc::channel(args.channel_capacity);
    let (outcome_tx, mut outcome_rx) = mpsc::channel(args.channel_capacity);

    let input = args.input.clone();
    let reader_task = tokio::spawn(async move {
        let reader: Box<dyn tokio::io::AsyncRead + Unpin + Send> = match &input {
            Some(path) => Box::new(
                tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("打开输入失败: {}", path.display()))?,
            ),
            None => Box::new(tokio::io::stdin()),
        };

        let mut lines = BufReader::new(reader).lines();
        let mut line_no = 0usize;
        while let Some(line) = lines.next_line().await? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            match decoder.decode_line(&line) {
                Ok(observation) => {
                    if observation_tx.send(observation).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("第 {} 行无法解析，已丢弃: {}", line_no, e),
            }
        }
        anyhow::Ok(line_no)
    });

    let positioning_task = tokio::spawn(run_positioning_task(engine, observation_rx, outcome_tx));

    let writer_task = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(outcome) = outcome_rx.recv().await {
            let mut line = serde_json::to_string(&outcome)?;
            line.push('\n');
            stdout.write_all(line.as_bytes()).await?;
        }
        stdout.flush().await?;
        anyhow::Ok(())
    });

    let lines_read = reader_task.await??;
    let engine = positioning_task.await?;
    writer_task.await??;

    let stats = engine.stats();
    info!(
        "处理完成: 读取 {} 行, 处理 {}, 接受 {}, 拒绝 {}, 无定位 {}, 忽略 {}, 丢弃 {}",
        lines_read,
        stats.processed,
        stats.accepted,
        stats.rejected,
        stats.no_fix,
        stats.ignored,
        stats.dropped
    );
    Ok(())
}
