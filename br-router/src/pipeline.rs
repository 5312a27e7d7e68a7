use std::{io, sync::Arc, time::Instant};

use arc_swap::ArcSwap;
use br_common::{IfId, IsdAs};
use br_enforce::Direction;
use br_wire::{Header, PayloadClass};
use rustc_hash::FxHashMap;
use tracing::{debug_span, error, trace};

use crate::{hooks::HookSet, Dir, Enforcers, PacketError, RouterStats, RtrPacket, Stage};

/// Sends admitted packets on their way.
pub trait Forwarder: Send + Sync + 'static {
    /// Sends the packet to the next hop behind interface `egress`.
    fn forward(&self, egress: IfId, pkt: &RtrPacket) -> io::Result<()>;

    /// Delivers the packet to its destination inside the local AS.
    fn deliver_local(&self, pkt: &RtrPacket) -> io::Result<()>;
}

/// Builds and sends protocol error responses for failed packets.
pub trait ErrorResponder: Send + Sync + 'static {
    fn respond(&self, pkt: &RtrPacket, err: &PacketError);
}

/// What happened to a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Sent to a next hop.
    Forwarded,
    /// Delivered inside the local AS.
    Delivered,
    /// Consumed by the router itself.
    Consumed,
    /// Dropped by admission control.
    Dropped(Direction),
    /// Failed at the given stage.
    Failed(Stage),
}

/// The per-packet decision chain: parse, admission control, validation, local processing,
/// routing. Stops at the first failure or rejection.
pub struct PacketPipeline {
    local_ia: IsdAs,
    enforcers: Arc<ArcSwap<Enforcers>>,
    handlers: FxHashMap<PayloadClass, HookSet>,
    forwarder: Arc<dyn Forwarder>,
    responder: Arc<dyn ErrorResponder>,
    stats: Arc<RouterStats>,
}

impl std::fmt::Debug for PacketPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketPipeline")
            .field("local_ia", &self.local_ia)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

impl PacketPipeline {
    pub fn new(
        local_ia: IsdAs,
        enforcers: Arc<ArcSwap<Enforcers>>,
        forwarder: Arc<dyn Forwarder>,
        responder: Arc<dyn ErrorResponder>,
        stats: Arc<RouterStats>,
    ) -> Self {
        Self { local_ia, enforcers, handlers: FxHashMap::default(), forwarder, responder, stats }
    }

    /// Registers the hooks run for packets with the given payload class.
    pub fn with_handler(mut self, class: PayloadClass, hooks: HookSet) -> Self {
        self.handlers.insert(class, hooks);
        self
    }

    /// Runs a packet through the pipeline.
    pub fn process(&self, pkt: &mut RtrPacket) -> Disposition {
        debug_assert!(pkt.dir_from != Dir::Unset, "dir_from must be set");
        debug_assert!(!pkt.ingress_if.is_none(), "ingress interface must be set");

        // Pseudorandom id for correlating log entries.
        pkt.id = rand::random();
        let span = debug_span!("rpkt", id = %format_args!("{:08x}", pkt.id));
        let _guard = span.enter();

        match self.run(pkt) {
            Ok(disposition) => disposition,
            Err(e) => {
                self.on_error(pkt, &e);
                Disposition::Failed(e.stage())
            }
        }
    }

    fn run(&self, pkt: &mut RtrPacket) -> Result<Disposition, PacketError> {
        self.parse(pkt)?;

        if let Some(direction) = self.enforce(pkt) {
            trace!(%direction, "dropped by admission control");
            self.stats.increment_drops(direction);
            return Ok(Disposition::Dropped(direction));
        }

        // Validation looks for errors that didn't break basic parsing.
        self.validate(pkt)?;

        self.needs_local_processing(pkt)?;

        let payload = match pkt.hooks.payload.clone() {
            Some(hook) => Some(hook.parse(pkt)?),
            None => None,
        };

        if let Some(hook) = pkt.hooks.process.clone() {
            hook.process(pkt, payload.as_ref())?;
        }

        // Packets addressed to this router are done here.
        if pkt.dir_to == Dir::Router {
            self.stats.increment_consumed();
            return Ok(Disposition::Consumed);
        }

        self.route(pkt)
    }

    fn parse(&self, pkt: &mut RtrPacket) -> Result<(), PacketError> {
        let header = Header::decode(&pkt.raw).map_err(PacketError::Parse)?;

        pkt.dir_to = if header.dst != self.local_ia {
            Dir::External
        } else if header.dst_svc {
            Dir::Router
        } else {
            Dir::Local
        };
        pkt.header = Some(header);

        Ok(())
    }

    /// Runs admission control for the packet's direction. Returns the direction if the
    /// packet must be dropped.
    fn enforce(&self, pkt: &RtrPacket) -> Option<Direction> {
        let header = pkt.header.as_ref()?;
        let enforcers = self.enforcers.load();

        let (enforcer, ifid) = match (pkt.dir_from, pkt.dir_to) {
            (Dir::External, Dir::Local | Dir::Router | Dir::External) => {
                (&enforcers.ingress, pkt.ingress_if)
            }
            (Dir::Local, Dir::External) => (&enforcers.egress, header.egress_if),
            _ => return None,
        };

        let start = Instant::now();
        let admitted = enforcer.check(ifid, header.src, pkt.raw.len());
        self.stats.record_admission(start.elapsed());

        (!admitted).then(|| enforcer.direction())
    }

    fn validate(&self, pkt: &RtrPacket) -> Result<(), PacketError> {
        let Some(header) = pkt.header.as_ref() else {
            return Ok(());
        };

        header.validate(pkt.raw.len(), self.local_ia).map_err(PacketError::Validate)
    }

    /// Attaches the hooks for packets that need handling on this router.
    fn needs_local_processing(&self, pkt: &mut RtrPacket) -> Result<(), PacketError> {
        let Some(class) = pkt.header.as_ref().map(|h| h.class) else {
            return Ok(());
        };

        if pkt.dir_to == Dir::Router {
            match self.handlers.get(&class) {
                Some(hooks) => pkt.hooks = hooks.clone(),
                None => return Err(PacketError::NoHandler(class)),
            }
        } else if class == PayloadClass::Revocation {
            // Transit revocations are inspected as well as forwarded.
            if let Some(hooks) = self.handlers.get(&class) {
                pkt.hooks = hooks.clone();
            }
        }

        Ok(())
    }

    fn route(&self, pkt: &RtrPacket) -> Result<Disposition, PacketError> {
        if pkt.dir_to == Dir::Local {
            self.forwarder.deliver_local(pkt)?;
            self.stats.increment_delivered();
            return Ok(Disposition::Delivered);
        }

        let Some(header) = pkt.header.as_ref() else {
            return Err(PacketError::NoNextHop(self.local_ia));
        };

        if header.egress_if.is_none() {
            return Err(PacketError::NoNextHop(header.dst));
        }

        self.forwarder.forward(header.egress_if, pkt)?;
        self.stats.increment_forwarded();
        Ok(Disposition::Forwarded)
    }

    fn on_error(&self, pkt: &RtrPacket, err: &PacketError) {
        self.stats.increment_errors(err.stage());
        error!(stage = %err.stage(), err = %err, "dropping packet");

        // Local-processing and payload failures are application-level, the sender is not
        // notified about them.
        if err.responds() {
            self.responder.respond(pkt, err);
        }
    }
}
