mod reload;
mod router;

/// Helper functions.
mod helpers {
    use std::{
        io,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc,
        },
        time::Duration,
    };

    use br_common::{IfId, IsdAs};
    use br_router::{Dir, ErrorResponder, Forwarder, PacketError, Router, RtrPacket};
    use br_wire::{Header, PayloadClass, VERSION};
    use bytes::BytesMut;

    pub const LOCAL_IA: &str = "1-1";

    /// Interface facing the local AS.
    pub const INTERNAL_IF: u16 = 100;

    pub fn ia(s: &str) -> IsdAs {
        s.parse().unwrap()
    }

    /// Counts what the router did with its packets.
    #[derive(Debug, Clone, Default)]
    pub struct Recorder(Arc<Counts>);

    #[derive(Debug, Default)]
    pub struct Counts {
        pub forwarded: AtomicU64,
        pub delivered: AtomicU64,
        pub responses: AtomicU64,
    }

    impl Recorder {
        pub fn forwarded(&self) -> u64 {
            self.0.forwarded.load(Ordering::Relaxed)
        }

        pub fn delivered(&self) -> u64 {
            self.0.delivered.load(Ordering::Relaxed)
        }

        pub fn responses(&self) -> u64 {
            self.0.responses.load(Ordering::Relaxed)
        }
    }

    impl Forwarder for Recorder {
        fn forward(&self, _egress: IfId, _pkt: &RtrPacket) -> io::Result<()> {
            self.0.forwarded.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn deliver_local(&self, _pkt: &RtrPacket) -> io::Result<()> {
            self.0.delivered.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    impl ErrorResponder for Recorder {
        fn respond(&self, _pkt: &RtrPacket, _err: &PacketError) {
            self.0.responses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Builds a packet received from a neighbor on `ingress_if`.
    pub fn incoming(
        ingress_if: u16,
        src: &str,
        dst: &str,
        class: PayloadClass,
        dst_svc: bool,
        len: usize,
    ) -> RtrPacket {
        let header = Header {
            version: VERSION,
            class,
            total_len: len as u16,
            src: ia(src),
            dst: ia(dst),
            dst_svc,
            hop_limit: 64,
            egress_if: if dst == LOCAL_IA { IfId::NONE } else { IfId(2) },
        };

        let mut raw = BytesMut::with_capacity(len);
        header.encode(&mut raw);
        raw.resize(len, 0);
        RtrPacket::new(raw, Dir::External, IfId(ingress_if))
    }

    /// Data packet from a host in the local AS to `dst`, leaving through `egress_if`.
    pub fn outgoing(dst: &str, egress_if: u16, len: usize) -> RtrPacket {
        let header = Header {
            version: VERSION,
            class: PayloadClass::Data,
            total_len: len as u16,
            src: ia(LOCAL_IA),
            dst: ia(dst),
            dst_svc: false,
            hop_limit: 64,
            egress_if: IfId(egress_if),
        };

        let mut raw = BytesMut::with_capacity(len);
        header.encode(&mut raw);
        raw.resize(len, 0);
        RtrPacket::new(raw, Dir::Local, IfId(INTERNAL_IF))
    }

    /// Data packet from `src` to a host in the local AS.
    pub fn data(ingress_if: u16, src: &str, len: usize) -> RtrPacket {
        incoming(ingress_if, src, LOCAL_IA, PayloadClass::Data, false, len)
    }

    /// Waits until the router has taken `n` packets off its rings.
    pub async fn processed(router: &Router, n: u64) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while router.stats().processed() < n {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("router did not process packets in time");
    }
}
