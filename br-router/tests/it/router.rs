use std::sync::Arc;

use br_common::{constants::Kbps, IfId};
use br_enforce::{AsLabels, AsMetrics, Direction, EnforcementConfig};
use br_router::{
    hooks::{HookSet, Payload, ProcessHook},
    ring, PacketError, Router, RouterError, RouterOptions, RtrPacket, Stage,
};
use br_wire::PayloadClass;

use crate::helpers::{data, ia, incoming, processed, Recorder, LOCAL_IA};

fn router(recorder: &Recorder) -> Router {
    Router::new(
        "br1",
        RouterOptions::new(ia(LOCAL_IA)).batch_size(8).pool(64, 1500),
        recorder.clone(),
        recorder.clone(),
    )
}

#[tokio::test]
async fn workers_drain_rings_until_closed() {
    let _ = tracing_subscriber::fmt::try_init();

    let recorder = Recorder::default();
    let mut router = router(&recorder);

    let (w1, r1) = ring::channel(128);
    let (w2, r2) = ring::channel(128);
    router.add_socket("if1", r1).unwrap();
    router.add_socket("if2", r2).unwrap();
    router.run().unwrap();

    for _ in 0..50 {
        w1.write(data(1, "1-10", 100)).await.unwrap();
        w2.write(incoming(2, "1-10", "2-20", PayloadClass::Data, false, 100)).await.unwrap();
    }

    drop(w1);
    drop(w2);
    router.join().await;

    assert_eq!(router.stats().processed(), 100);
    assert_eq!(recorder.delivered(), 50);
    assert_eq!(recorder.forwarded(), 50);
    assert_eq!(router.stats().delivered(), 50);
    assert_eq!(router.stats().forwarded(), 50);
    // Buffers went back to the pool.
    assert!(router.pool().available() > 0);
}

#[tokio::test]
async fn shutdown_stops_workers() {
    let _ = tracing_subscriber::fmt::try_init();

    let recorder = Recorder::default();
    let mut router = router(&recorder);

    let (writer, reader) = ring::channel(16);
    router.add_socket("if1", reader).unwrap();
    router.run().unwrap();

    writer.write(data(1, "1-10", 64)).await.unwrap();
    processed(&router, 1).await;

    router.shutdown().await;

    // Nobody reads the ring anymore.
    assert!(writer.write(data(1, "1-10", 64)).await.is_err());
    assert_eq!(recorder.delivered(), 1);
}

#[tokio::test]
async fn cannot_run_twice() {
    let recorder = Recorder::default();
    let mut router = router(&recorder);

    router.run().unwrap();
    assert!(matches!(router.run(), Err(RouterError::Running)));

    let (_writer, reader) = ring::channel(16);
    assert!(matches!(router.add_socket("late", reader), Err(RouterError::Running)));

    router.shutdown().await;
}

#[tokio::test]
async fn ingress_enforcement_drops_over_limit() {
    let _ = tracing_subscriber::fmt::try_init();

    let recorder = Recorder::default();
    let metrics = Arc::new(AsMetrics::new());
    let mut router = router(&recorder).with_metrics(metrics.clone());

    // 1-10 may send 80 kbit/s, i.e. ten 1000 byte packets per window.
    let config = EnforcementConfig::from_toml_str(
        r#"
        enabled = true

        [ingress]
        enabled = true

        [[ingress.interfaces]]
        ifid = 1
        max_bps = 10_000_000
        ases = [{ isd_as = "1-10", max_bps = 80_000 }]
        "#,
    )
    .unwrap();
    router.apply_config(&config).unwrap();

    let (writer, reader) = ring::channel(256);
    router.add_socket("if1", reader).unwrap();
    router.run().unwrap();

    for _ in 0..100 {
        writer.write(data(1, "1-10", 1000)).await.unwrap();
    }
    drop(writer);
    router.join().await;

    let drops = router.stats().drops(Direction::Ingress);
    assert!(drops > 0);
    assert_eq!(recorder.delivered() + drops, 100);
    assert!(recorder.delivered() >= 10);
    // Admission drops are silent.
    assert_eq!(recorder.responses(), 0);
    assert_eq!(router.stats().admission_checks(), 100);

    // Every drop reached the configured sink, together with the rate that caused it.
    let labels = AsLabels { direction: Direction::Ingress, ifid: IfId(1), isd_as: Some(ia("1-10")) };
    assert_eq!(metrics.drops(&labels), drops);
    assert!(metrics.current_bps(&labels).unwrap() >= (80 * Kbps) as i64);
}

struct Explode;

impl ProcessHook for Explode {
    fn process(&self, _pkt: &RtrPacket, _payload: Option<&Payload>) -> Result<(), PacketError> {
        panic!("boom");
    }
}

#[tokio::test]
async fn worker_survives_panicking_packet() {
    let recorder = Recorder::default();
    let mut router =
        router(&recorder).with_handler(PayloadClass::IfState, HookSet::new().with_process(Explode));

    let (writer, reader) = ring::channel(16);
    router.add_socket("if1", reader).unwrap();
    router.run().unwrap();

    writer.write(incoming(1, "1-10", LOCAL_IA, PayloadClass::IfState, true, 32)).await.unwrap();
    writer.write(data(1, "1-10", 64)).await.unwrap();
    drop(writer);
    router.join().await;

    assert_eq!(router.stats().errors(Stage::Fault), 1);
    assert_eq!(router.stats().processed(), 2);
    assert_eq!(recorder.delivered(), 1);
}
