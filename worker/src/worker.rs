use std::{borrow::Cow, io};

use comms::{
    OnoReceiver, OnoSender,
    msg::{Command, Msg, Payload},
};
use log::{debug, info, warn};
use rollout::{Batch, LocalCollector, RolloutErr};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    task,
};

use crate::{Result, WorkerConfig, WorkerErr, WorkerReport};

/// Infrastructure worker runtime.
///
/// Produces batches with its local collector and streams them to the
/// coordinator, loading new policy weights whenever the schedule asks for them.
///
/// Collection is CPU-bound and runs on Tokio's blocking pool via `spawn_blocking`,
/// the collector is moved out of `self` and back for every batch.
pub struct Worker {
    config: WorkerConfig,
    collector: Option<LocalCollector>,
}

impl Worker {
    /// Creates a new `Worker`.
    ///
    /// # Args
    /// * `config` - The execution bounds.
    /// * `collector` - The local data collector.
    pub fn new(config: WorkerConfig, collector: LocalCollector) -> Self {
        Self {
            config,
            collector: Some(collector),
        }
    }

    /// Runs the worker until its frame budget is exhausted or the coordinator stops it.
    ///
    /// # Args
    /// * `rx` - Receiving end of the coordinator channel.
    /// * `tx` - Sending end of the coordinator channel.
    ///
    /// # Returns
    /// What the worker did, on graceful completion.
    ///
    /// # Errors
    /// Returns `WorkerErr` on I/O failures, rollout failures or protocol violations.
    /// The coordinator is told about the failure before it is returned.
    pub async fn run<R, W>(
        mut self,
        mut rx: OnoReceiver<R>,
        mut tx: OnoSender<W>,
    ) -> Result<WorkerReport>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let rank = self.config.rank();
        let result = self.drive(&mut rx, &mut tx).await;

        if let Err(e) = &result {
            warn!(rank = rank; "worker failed: {e}");

            let detail = format!("worker {rank}: {e}");
            if let Err(e) = tx.send(&Msg::Err(Cow::Owned(detail))).await {
                debug!(rank = rank; "could not report the failure: {e}");
            }
        }

        if let Some(mut collector) = self.collector.take() {
            // Joining the async collector's threads blocks.
            if let Err(e) = task::spawn_blocking(move || collector.shutdown()).await {
                warn!(rank = rank; "collector shutdown failed: {e}");
            }
        }

        if let Ok(report) = &result {
            info!(
                rank = rank;
                "worker done: frames={} batches={} weight_updates={}",
                report.frames, report.batches, report.weight_updates
            );
        }

        result
    }

    async fn drive<R, W>(
        &mut self,
        rx: &mut OnoReceiver<R>,
        tx: &mut OnoSender<W>,
    ) -> Result<WorkerReport>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let rank = self.config.rank();
        let interval = self.config.update_interval();
        let mut report = WorkerReport::default();
        let mut buf: Vec<u32> = Vec::new();

        let has_params = !self.collector()?.params().is_empty();
        if has_params {
            debug!(rank = rank; "waiting for the initial weights");
            if !recv_weights(rx, &mut buf, self.collector()?, 0).await? {
                return Ok(report);
            }

            report.bump_weight_updates();
        }

        let mut next = produce(&mut self.collector).await?;

        while let Some(batch) = next {
            let frames = report.frames + batch.numel();
            let batches = report.batches + 1;
            let weights_due =
                has_params && frames < self.config.total_frames() && batches % interval == 0;

            if weights_due {
                if !send_batch(tx, &batch).await? {
                    break;
                }
                report.add_batch(batch.numel());

                if !recv_weights(rx, &mut buf, self.collector()?, batches).await? {
                    break;
                }
                report.bump_weight_updates();

                next = produce(&mut self.collector).await?;
            } else {
                // The next batch is produced while this one is on the wire.
                let (sent, produced) =
                    tokio::join!(send_batch(tx, &batch), produce(&mut self.collector));

                if !sent? {
                    break;
                }
                report.add_batch(batch.numel());
                next = produced?;
            }
        }

        Ok(report)
    }

    fn collector(&mut self) -> Result<&mut LocalCollector> {
        self.collector
            .as_mut()
            .ok_or(WorkerErr::Rollout(RolloutErr::Closed))
    }
}

/// Produces the next batch on the blocking pool.
async fn produce(slot: &mut Option<LocalCollector>) -> Result<Option<Batch>> {
    let mut collector = slot.take().ok_or(WorkerErr::Rollout(RolloutErr::Closed))?;

    let (collector, batch) = task::spawn_blocking(move || {
        let batch = collector.next_batch();
        (collector, batch)
    })
    .await
    .map_err(|e| io::Error::other(format!("collector join error: {e}")))?;

    *slot = Some(collector);
    Ok(batch.transpose()?)
}

/// Sends every field of `batch`, in name order.
///
/// # Returns
/// `false` if the coordinator already hung up.
async fn send_batch<W>(tx: &mut OnoSender<W>, batch: &Batch) -> Result<bool>
where
    W: AsyncWrite + Unpin + Send,
{
    for (name, tensor) in batch.fields() {
        #[cfg(feature = "frame-trace")]
        crate::trace::field(name, tensor.data());

        let msg = Msg::Data(Payload::Field(tensor.data()));
        match tx.send(&msg).await {
            Ok(()) => {}
            Err(e) if is_disconnect(&e) => {
                info!("coordinator hung up while sending {name}: {e}");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(true)
}

/// Waits for new weights and loads them into the collector.
///
/// # Returns
/// `false` if the coordinator asked to stop or hung up instead.
async fn recv_weights<R>(
    rx: &mut OnoReceiver<R>,
    buf: &mut Vec<u32>,
    collector: &mut LocalCollector,
    batch: usize,
) -> Result<bool>
where
    R: AsyncRead + Unpin + Send,
{
    match rx.recv_into(buf).await {
        Ok(Msg::Data(Payload::Params(flat))) => {
            collector.load_flat(flat)?;
            debug!("loaded {} parameters after batch {batch}", flat.len());
            Ok(true)
        }
        Ok(Msg::Control(Command::Stop)) => {
            info!("stop received after batch {batch}");
            Ok(false)
        }
        Ok(Msg::Err(detail)) => Err(WorkerErr::Coordinator(detail.into_owned())),
        Ok(msg) => Err(WorkerErr::UnexpectedMessage {
            batch,
            got: msg.kind(),
        }),
        Err(e) if is_disconnect(&e) => {
            warn!("coordinator hung up while waiting for weights: {e}");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof
    )
}
