use std::time::Duration;

use br_common::{constants::Gbps, IfId};
use br_enforce::{
    AsConfig, BwLimit, ConfigError, Direction, DirectionConfig, EnforcementConfig, FallbackConfig,
    InterfaceConfig,
};
use br_router::{ring, Enforcers, ReloadError, Router, RouterError, RouterOptions};

use crate::helpers::{data, ia, outgoing, processed, Recorder, LOCAL_IA};

/// Blocks 1-10 on ingress interface 1.
fn blocking() -> EnforcementConfig {
    EnforcementConfig {
        enabled: true,
        ingress: DirectionConfig {
            enabled: true,
            interfaces: vec![InterfaceConfig {
                ifid: IfId(1),
                max_bps: Gbps,
                unknown: FallbackConfig { max_bps: -1, alert_bps: None },
                ases: vec![AsConfig { isd_as: ia("1-10"), max_bps: 0, alert_bps: None }],
            }],
        },
        egress: DirectionConfig::default(),
    }
}

fn running() -> (Router, Recorder, ring::RingWriter) {
    let recorder = Recorder::default();
    let mut router = Router::new(
        "br1",
        RouterOptions::new(ia(LOCAL_IA)),
        recorder.clone(),
        recorder.clone(),
    );

    let (writer, reader) = ring::channel(64);
    router.add_socket("if1", reader).unwrap();
    router.run().unwrap();

    (router, recorder, writer)
}

#[tokio::test]
async fn reload_swaps_enforcement() {
    let _ = tracing_subscriber::fmt::try_init();

    let (mut router, recorder, writer) = running();
    let handle = router.reload_handle().unwrap();

    writer.write(data(1, "1-10", 100)).await.unwrap();
    processed(&router, 1).await;
    assert_eq!(recorder.delivered(), 1);

    handle.apply(blocking()).await.unwrap();
    assert!(router.enforcers().ingress.is_enforced(&IfId(1)));

    writer.write(data(1, "1-10", 100)).await.unwrap();
    writer.write(data(1, "1-11", 100)).await.unwrap();
    processed(&router, 3).await;
    assert_eq!(router.stats().drops(Direction::Ingress), 1);
    assert_eq!(recorder.delivered(), 2);

    // Disabling globally admits everything again.
    handle.apply(EnforcementConfig { enabled: false, ..blocking() }).await.unwrap();
    assert!(!router.enforcers().ingress.is_enabled());

    writer.write(data(1, "1-10", 100)).await.unwrap();
    processed(&router, 4).await;
    assert_eq!(recorder.delivered(), 3);

    router.shutdown().await;
}

#[tokio::test]
async fn invalid_reload_keeps_previous_state() {
    let (mut router, _recorder, _writer) = running();
    let handle = router.reload_handle().unwrap();
    handle.apply(blocking()).await.unwrap();

    let mut invalid = blocking();
    let iface = invalid.ingress.interfaces[0].clone();
    invalid.ingress.interfaces.push(iface);

    let err = handle.apply(invalid).await.unwrap_err();
    assert!(matches!(
        err,
        ReloadError::Config(ConfigError::DuplicateInterface { direction: Direction::Ingress, .. })
    ));
    assert!(router.enforcers().ingress.is_enforced(&IfId(1)));

    let err = handle.load("/nonexistent/enforcement.toml").await.unwrap_err();
    assert!(matches!(err, ReloadError::Config(ConfigError::Io(_))));
    assert!(router.enforcers().ingress.is_enforced(&IfId(1)));

    router.shutdown().await;
}

#[tokio::test]
async fn reload_from_file() {
    let (mut router, _recorder, _writer) = running();
    let handle = router.reload_handle().unwrap();

    let path = std::env::temp_dir().join(format!("br-enforcement-{}.toml", std::process::id()));
    std::fs::write(
        &path,
        r#"
        enabled = true

        [egress]
        enabled = true

        [[egress.interfaces]]
        ifid = 3
        max_bps = 1_000_000
        "#,
    )
    .unwrap();

    handle.load(&path).await.unwrap();
    std::fs::remove_file(&path).unwrap();

    let enforcers = router.enforcers();
    assert!(enforcers.egress.is_enforced(&IfId(3)));
    assert!(enforcers.ingress.is_empty());

    router.shutdown().await;
}

#[tokio::test]
async fn reload_after_shutdown_fails() {
    let (mut router, _recorder, _writer) = running();
    let handle = router.reload_handle().unwrap();
    router.shutdown().await;

    assert!(matches!(handle.apply(blocking()).await, Err(ReloadError::Closed)));
}

#[tokio::test]
async fn reload_handle_requires_running_router() {
    let recorder = Recorder::default();
    let mut router =
        Router::new("br1", RouterOptions::new(ia(LOCAL_IA)), recorder.clone(), recorder);

    // Nothing serves reloads yet, so there is no handle to wait on.
    assert!(matches!(router.reload_handle(), Err(RouterError::NotRunning)));
    router.apply_config(&blocking()).unwrap();

    router.run().unwrap();
    let handle = router.reload_handle().unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle.apply(blocking()))
        .await
        .expect("reload not served")
        .unwrap();

    router.shutdown().await;
}

/// Generation A blocks 1-10 on ingress interface 1, generation B blocks the local AS on egress
/// interface 2. Both enforce both interfaces, so every snapshot carries both halves.
fn generation(ingress_blocked: bool) -> EnforcementConfig {
    let limit = |blocked: bool| if blocked { 0 } else { -1 };

    EnforcementConfig {
        enabled: true,
        ingress: DirectionConfig {
            enabled: true,
            interfaces: vec![InterfaceConfig {
                ifid: IfId(1),
                max_bps: Gbps,
                unknown: FallbackConfig { max_bps: -1, alert_bps: None },
                ases: vec![AsConfig {
                    isd_as: ia("1-10"),
                    max_bps: limit(ingress_blocked),
                    alert_bps: None,
                }],
            }],
        },
        egress: DirectionConfig {
            enabled: true,
            interfaces: vec![InterfaceConfig {
                ifid: IfId(2),
                max_bps: Gbps,
                unknown: FallbackConfig { max_bps: -1, alert_bps: None },
                ases: vec![AsConfig {
                    isd_as: ia(LOCAL_IA),
                    max_bps: limit(!ingress_blocked),
                    alert_bps: None,
                }],
            }],
        },
    }
}

/// Returns whether ingress and egress block in the given snapshot.
fn blocks(enforcers: &Enforcers) -> (bool, bool) {
    let ingress = enforcers
        .ingress
        .inspect(&IfId(1), |iface| iface.quota(&ia("1-10")).map(|q| q.max()))
        .flatten();
    let egress = enforcers
        .egress
        .inspect(&IfId(2), |iface| iface.quota(&ia(LOCAL_IA)).map(|q| q.max()))
        .flatten();

    (ingress == Some(BwLimit::Blocked), egress == Some(BwLimit::Blocked))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reload_under_traffic_never_mixes_generations() {
    let _ = tracing_subscriber::fmt::try_init();

    const PER_WRITER: u64 = 2000;

    let recorder = Recorder::default();
    let mut router = Router::new(
        "br1",
        RouterOptions::new(ia(LOCAL_IA)).batch_size(16),
        recorder.clone(),
        recorder.clone(),
    );
    router.apply_config(&generation(true)).unwrap();

    let (writer, reader) = ring::channel(64);
    router.add_socket("if1", reader).unwrap();
    router.run().unwrap();
    let handle = router.reload_handle().unwrap();

    // One packet of each kind under generation A.
    writer.write(data(1, "1-10", 100)).await.unwrap();
    writer.write(outgoing("2-20", 2, 100)).await.unwrap();
    processed(&router, 2).await;

    let incoming = {
        let writer = writer.clone();
        tokio::spawn(async move {
            for _ in 0..PER_WRITER {
                writer.write(data(1, "1-10", 100)).await.unwrap();
            }
        })
    };
    let outgoing_writer = {
        let writer = writer.clone();
        tokio::spawn(async move {
            for _ in 0..PER_WRITER {
                writer.write(outgoing("2-20", 2, 100)).await.unwrap();
            }
        })
    };

    let mut ingress_blocked = true;
    let mut flips = 0;
    while !incoming.is_finished() || !outgoing_writer.is_finished() {
        ingress_blocked = !ingress_blocked;
        handle.apply(generation(ingress_blocked)).await.unwrap();
        flips += 1;

        for _ in 0..8 {
            let (ingress, egress) = blocks(&router.enforcers());
            assert!(ingress != egress, "mixed generation: ingress {ingress}, egress {egress}");
            tokio::task::yield_now().await;
        }
    }
    incoming.await.unwrap();
    outgoing_writer.await.unwrap();

    // And one of each under generation B.
    handle.apply(generation(false)).await.unwrap();
    writer.write(data(1, "1-10", 100)).await.unwrap();
    writer.write(outgoing("2-20", 2, 100)).await.unwrap();

    let total = 2 * PER_WRITER + 4;
    processed(&router, total).await;
    router.shutdown().await;

    let stats = router.stats();
    // Each packet saw exactly one generation: incoming ones were either dropped (A) or
    // delivered (B), outgoing ones either forwarded (A) or dropped (B).
    assert_eq!(stats.delivered() + stats.drops(Direction::Ingress), PER_WRITER + 2);
    assert_eq!(stats.forwarded() + stats.drops(Direction::Egress), PER_WRITER + 2);
    assert!(stats.drops(Direction::Ingress) >= 1 && stats.delivered() >= 1);
    assert!(stats.drops(Direction::Egress) >= 1 && stats.forwarded() >= 1);
    assert_eq!(recorder.responses(), 0);
    assert!(flips >= 1);
}
