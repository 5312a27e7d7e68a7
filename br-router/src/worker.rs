use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, Instrument};

use crate::{
    ring::{PacketPool, RingReader},
    PacketError, PacketPipeline, RouterStats, RtrPacket,
};

/// Drives the packets of one socket through the pipeline.
pub(crate) struct SocketWorker {
    pub(crate) name: String,
    pub(crate) ring: RingReader,
    pub(crate) pipeline: Arc<PacketPipeline>,
    pub(crate) pool: Arc<PacketPool>,
    pub(crate) stats: Arc<RouterStats>,
    pub(crate) batch_size: usize,
}

impl SocketWorker {
    /// Reads batches off the ring until it is closed or `stop` fires. A batch that has been read
    /// is always processed completely.
    pub(crate) async fn run(mut self, stop: CancellationToken) {
        let span = tracing::info_span!("socket_worker", sock = %self.name);

        async move {
            let mut batch = Vec::with_capacity(self.batch_size);
            debug!("socket worker starting");

            loop {
                let read = tokio::select! {
                    biased;
                    _ = stop.cancelled() => None,
                    n = self.ring.read(&mut batch, self.batch_size) => n,
                };

                if read.is_none() {
                    debug!("socket worker stopping");
                    return;
                }

                for mut pkt in batch.drain(..) {
                    self.process(&mut pkt);
                    self.stats.record_processed(pkt.time_in.elapsed());
                    self.pool.release(pkt.into_raw());
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Runs one packet through the pipeline. A panic is contained to this packet.
    fn process(&self, pkt: &mut RtrPacket) {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.pipeline.process(pkt))) {
            let err = PacketError::Fault(panic_message(panic.as_ref()));
            error!(id = %format_args!("{:08x}", pkt.id), err = %err, "recovered from packet fault");
            self.stats.increment_errors(err.stage());
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
