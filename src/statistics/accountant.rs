//! # 流量记账
//!
//! 代理热路径只做一次无阻塞的 channel 发送；后台写入任务按日期合并后落库。
//!
//! `request_count` 统计的是记账调用次数，而不是 HTTP 请求数：一次拉取会为上传记一次，
//! 再为每个下载分块各记一次。该口径与历史数据保持一致。

use super::store::{TrafficDelta, TrafficStore, local_today};
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage, log_proxy_error};
use crate::{ldebug, linfo};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

/// 单批最多合并的命令数
const MAX_BATCH: usize = 1024;

enum AccountingCommand {
    Record {
        date: NaiveDate,
        download_bytes: u64,
        upload_bytes: u64,
    },
    Flush(oneshot::Sender<Result<()>>),
}

/// 流量记账器
pub struct TrafficAccountant {
    sender: mpsc::UnboundedSender<AccountingCommand>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl TrafficAccountant {
    /// 创建记账器并启动后台写入任务
    pub fn start(store: Arc<dyn TrafficStore>) -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let writer = tokio::spawn(run_writer(store, receiver));

        Arc::new(Self {
            sender,
            writer: Mutex::new(Some(writer)),
        })
    }

    /// 记一笔流量（今天的本地日期），不等待落库
    pub fn record(&self, download_bytes: u64, upload_bytes: u64) {
        self.record_on(local_today(), download_bytes, upload_bytes);
    }

    /// 记到指定日期，日期在调用时确定
    pub fn record_on(&self, date: NaiveDate, download_bytes: u64, upload_bytes: u64) {
        let command = AccountingCommand::Record {
            date,
            download_bytes,
            upload_bytes,
        };
        if self.sender.send(command).is_err() {
            ldebug!(
                "system",
                LogStage::Statistics,
                LogComponent::Statistics,
                "record_dropped",
                "记账任务已停止，丢弃流量记录",
                download_bytes = download_bytes,
                upload_bytes = upload_bytes
            );
        }
    }

    /// 等待此前入队的记录全部落库
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(AccountingCommand::Flush(ack))
            .map_err(|_| ProxyError::statistics("记账任务已停止"))?;
        done.await
            .map_err(|e| ProxyError::statistics_with_source("记账任务在刷新前退出", e))?
    }

    /// 刷新剩余记录并停止写入任务
    pub async fn shutdown(&self) -> Result<()> {
        let flushed = self.flush().await;
        if let Some(handle) = self.writer.lock().await.take() {
            handle.abort();
        }
        linfo!(
            "system",
            LogStage::Shutdown,
            LogComponent::Statistics,
            "accountant_stopped",
            "流量记账任务已停止"
        );
        flushed
    }
}

async fn run_writer(
    store: Arc<dyn TrafficStore>,
    mut receiver: mpsc::UnboundedReceiver<AccountingCommand>,
) {
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Statistics,
        "accountant_started",
        "流量记账任务已启动"
    );

    while let Some(first) = receiver.recv().await {
        let mut pending: BTreeMap<NaiveDate, TrafficDelta> = BTreeMap::new();
        let mut waiters = Vec::new();

        let mut next = Some(first);
        let mut taken = 0;
        while let Some(command) = next {
            match command {
                AccountingCommand::Record {
                    date,
                    download_bytes,
                    upload_bytes,
                } => pending
                    .entry(date)
                    .or_default()
                    .absorb(download_bytes, upload_bytes),
                AccountingCommand::Flush(ack) => waiters.push(ack),
            }
            taken += 1;
            next = if taken < MAX_BATCH {
                receiver.try_recv().ok()
            } else {
                None
            };
        }

        let mut failed = None;
        for (date, delta) in pending {
            if let Err(err) = store.apply_delta(date, delta).await {
                log_proxy_error(
                    "system",
                    LogStage::Db,
                    LogComponent::Statistics,
                    "apply_delta_failed",
                    "写入流量统计失败",
                    &err,
                    &[
                        ("date", date.to_string()),
                        ("calls", delta.calls.to_string()),
                    ],
                );
                failed = Some(err.to_string());
            }
        }

        for ack in waiters {
            let result = failed
                .as_ref()
                .map_or(Ok(()), |msg| Err(ProxyError::statistics(msg.clone())));
            let _ = ack.send(result);
        }
    }
}
