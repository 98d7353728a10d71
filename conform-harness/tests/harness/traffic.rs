//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use conform_harness::{
    Backoff, Error, FlowCounters, StateWatcher, StopCondition,
    TrafficController, TrafficOp, TrafficState,
};
use conform_sim::SimConfig;

use super::*;

async fn controller(setup: &Setup, packet_count: u64) -> TrafficController {
    setup.session().push(&interfaces()).await.unwrap();
    let mut traffic = TrafficController::new(setup.ate.clone());
    traffic.push_config(topology(packet_count)).await.unwrap();
    traffic
}

fn ate_watcher(setup: &Setup) -> StateWatcher {
    StateWatcher::new(setup.ate.clone(), Backoff::default())
}

#[tokio::test(start_paused = true)]
async fn traffic_requires_convergence() {
    let setup = Setup::new(SimConfig::default());
    let mut traffic = controller(&setup, 1000).await;
    assert_eq!(traffic.state(), TrafficState::Idle);

    let error = traffic.start_traffic().await.unwrap_err();
    assert!(matches!(
        error,
        Error::InvalidTransition(TrafficState::Idle, TrafficOp::StartTraffic)
    ));

    traffic.start_protocols().await.unwrap();
    assert!(matches!(
        traffic.start_traffic().await,
        Err(Error::NotConverged)
    ));
    assert!(matches!(
        traffic.start_protocols().await,
        Err(Error::InvalidTransition(
            TrafficState::ProtocolsStarted,
            TrafficOp::StartProtocols
        ))
    ));

    traffic.confirm_convergence().unwrap();
    traffic.start_traffic().await.unwrap();
    assert_eq!(traffic.state(), TrafficState::TrafficRunning);
}

#[tokio::test(start_paused = true)]
async fn counters_need_a_traffic_run() {
    let setup = Setup::new(SimConfig::default());
    let mut traffic = controller(&setup, 1000).await;
    assert!(matches!(
        traffic.read_counters(FLOW).await,
        Err(Error::InvalidTransition(_, TrafficOp::ReadCounters))
    ));

    traffic.start_protocols().await.unwrap();
    traffic.confirm_convergence().unwrap();
    traffic.start_traffic().await.unwrap();
    assert!(matches!(
        traffic.read_counters("unknown").await,
        Err(Error::UnknownFlow(_))
    ));
    assert!(matches!(
        traffic.push_config(topology(1000)).await,
        Err(Error::InvalidTransition(
            TrafficState::TrafficRunning,
            TrafficOp::PushConfig
        ))
    ));
}

#[tokio::test(start_paused = true)]
async fn run_until_drained() {
    let setup = Setup::new(SimConfig::default());
    let mut traffic = controller(&setup, 10000).await;
    traffic.start_protocols().await.unwrap();
    traffic.confirm_convergence().unwrap();

    let condition = StopCondition::Drained {
        timeout: Duration::from_secs(60),
    };
    let report = traffic
        .run(&ate_watcher(&setup), condition.clone())
        .await
        .unwrap();
    assert!(report.is_satisfied());
    assert_eq!(traffic.state(), TrafficState::TrafficStopped);

    let run = traffic.last_run().unwrap();
    assert_eq!(run.condition, Some(condition));
    assert!(run.stopped_at.is_some());
    assert!(run.duration() >= Duration::from_secs(10));

    let counters = traffic.read_counters(FLOW).await.unwrap();
    assert_eq!(counters, FlowCounters::new(10000, 10000));
    let report = traffic.report().await.unwrap();
    assert_eq!(report.flow(FLOW), Some(&counters));
    assert_eq!(report.port("port1").unwrap().out_frames, 10000);
    assert_eq!(report.port("port2").unwrap().in_frames, 10000);

    traffic.stop_protocols().await.unwrap();
    assert_eq!(traffic.state(), TrafficState::Idle);
    assert!(!traffic.is_converged());
}

#[tokio::test(start_paused = true)]
async fn drain_timeout_is_a_failure() {
    let setup = Setup::new(SimConfig::default());
    let mut traffic = controller(&setup, 100_000).await;
    traffic.start_protocols().await.unwrap();
    traffic.confirm_convergence().unwrap();

    let condition = StopCondition::Drained {
        timeout: Duration::from_secs(20),
    };
    let report = traffic.run(&ate_watcher(&setup), condition).await.unwrap();
    assert!(!report.is_satisfied());
    assert_eq!(report.failures.len(), 1);
    // Traffic is stopped regardless.
    assert_eq!(traffic.state(), TrafficState::TrafficStopped);
    let counters = traffic.read_counters(FLOW).await.unwrap();
    assert!(counters.sent < 100_000);
}

#[tokio::test(start_paused = true)]
async fn run_until_received() {
    let setup = Setup::new(SimConfig::default());
    let mut traffic = controller(&setup, 10000).await;
    traffic.start_protocols().await.unwrap();
    traffic.confirm_convergence().unwrap();

    let condition = StopCondition::Received {
        flow: FLOW.to_owned(),
        packets: 2000,
        timeout: Duration::from_secs(30),
    };
    let report = traffic.run(&ate_watcher(&setup), condition).await.unwrap();
    assert!(report.is_satisfied());
    let counters = traffic.read_counters(FLOW).await.unwrap();
    assert!(counters.received >= 2000);
    assert!(counters.sent < 10000);

    // Restarting from TrafficStopped is allowed.
    let condition = StopCondition::Duration(Duration::from_secs(1));
    traffic.run(&ate_watcher(&setup), condition).await.unwrap();
    let counters = traffic.read_counters(FLOW).await.unwrap();
    assert!((990..=1000).contains(&counters.sent));
}
