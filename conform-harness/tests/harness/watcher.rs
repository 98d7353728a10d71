//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::time::Duration;

use conform_harness::{
    Backoff, Error, FailureKind, ObservablePath, StateWatcher,
    TrafficGenerator,
};
use conform_model::DEFAULT_NETWORK_INSTANCE;
use conform_sim::SimConfig;
use const_addrs::ip;
use maplit::btreemap;
use tokio::time::{self, Instant};

use super::*;

async fn bring_up(setup: &Setup, peer_as: u32) {
    let batch = interfaces().replace(bgp(peer_as));
    setup.session().push(&batch).await.unwrap();
    setup.ate.push_config(&topology(1000)).await.unwrap();
    setup.ate.start_protocols().await.unwrap();
}

fn session_state() -> ObservablePath {
    ObservablePath::bgp_neighbor_state(
        DEFAULT_NETWORK_INSTANCE,
        &ip!("192.0.2.2"),
    )
}

fn dut_watcher(setup: &Setup) -> StateWatcher {
    StateWatcher::new(setup.dut.clone(), Backoff::default())
}

fn established(state: Option<&String>) -> bool {
    state.is_some_and(|state| state == "ESTABLISHED")
}

#[tokio::test(start_paused = true)]
async fn poll_until_established() {
    let setup = Setup::new(SimConfig::default());
    bring_up(&setup, 65001).await;

    let start = Instant::now();
    let result = dut_watcher(&setup)
        .watch(&session_state(), Duration::from_secs(30), established)
        .await
        .unwrap();
    assert!(result.is_satisfied());
    assert_eq!(result.value.as_deref(), Some("ESTABLISHED"));
    assert!(result.samples > 1);
    assert!(start.elapsed() >= Duration::from_secs(3));
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn subscription_until_established() {
    let setup = Setup::new(SimConfig {
        subscriptions: true,
        ..Default::default()
    });
    bring_up(&setup, 65001).await;

    let gets = setup.network.gets();
    let start = Instant::now();
    let result = dut_watcher(&setup)
        .watch(&session_state(), Duration::from_secs(30), established)
        .await
        .unwrap();
    assert!(result.is_satisfied());
    assert_eq!(start.elapsed(), Duration::from_secs(3));
    // Samples are pushed, not polled.
    assert_eq!(result.samples, 2);
    assert_eq!(setup.network.gets() - gets, 2);
}

#[tokio::test(start_paused = true)]
async fn timeout_reports_last_value() {
    let setup = Setup::new(SimConfig::default());
    bring_up(&setup, 65099).await;

    let path = session_state();
    let timeout = Duration::from_secs(20);
    let start = Instant::now();
    let result = dut_watcher(&setup)
        .watch(&path, timeout, established)
        .await
        .unwrap();
    assert!(!result.is_satisfied());
    assert_eq!(start.elapsed(), timeout);
    assert_eq!(result.value.as_deref(), Some("IDLE"));

    let error = result.verify(&path, timeout, "established").unwrap_err();
    assert_eq!(error.kind, FailureKind::Timeout);
    assert!(error.description.contains("last value: \"IDLE\""));
}

#[tokio::test(start_paused = true)]
async fn zero_timeout_is_rejected() {
    let setup = Setup::new(SimConfig::default());
    let result = dut_watcher(&setup)
        .watch(&session_state(), Duration::ZERO, established)
        .await;
    assert!(matches!(result, Err(Error::InvalidTimeout(..))));
}

#[tokio::test(start_paused = true)]
async fn undecodable_sample_is_an_error() {
    let setup = Setup::new(SimConfig::default());
    bring_up(&setup, 65001).await;

    let path = ObservablePath::interface_oper_status("port1");
    let result = dut_watcher(&setup)
        .watch(&path, Duration::from_secs(5), |value: Option<&u64>| {
            value.is_some()
        })
        .await;
    assert!(matches!(result, Err(Error::Decode(..))));
}

#[tokio::test(start_paused = true)]
async fn absent_path_satisfies_absence() {
    let setup = Setup::new(SimConfig::default());
    let path = ObservablePath::interface_oper_status("port9");
    let start = Instant::now();
    let result = dut_watcher(&setup)
        .watch(&path, Duration::from_secs(5), |value: Option<&String>| {
            value.is_none()
        })
        .await
        .unwrap();
    assert!(result.is_satisfied());
    assert_eq!(result.samples, 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(result.into_value(), None);
}

#[tokio::test(start_paused = true)]
async fn unbounded_timeout_is_accepted() {
    let setup = Setup::new(SimConfig::default());
    let watcher = dut_watcher(&setup);

    let path = ObservablePath::interface_oper_status("port9");
    let result = watcher
        .watch(&path, Duration::MAX, |value: Option<&String>| {
            value.is_none()
        })
        .await
        .unwrap();
    assert!(result.is_satisfied());

    bring_up(&setup, 65001).await;
    let start = Instant::now();
    let result = watcher
        .watch_stable(
            &session_state(),
            Duration::MAX,
            Duration::from_secs(2),
            established,
        )
        .await
        .unwrap();
    assert!(result.is_satisfied());
    assert!(start.elapsed() >= Duration::from_secs(5));

    let paths = vec![session_state()];
    let results = watcher
        .watch_all(paths, Duration::MAX, established)
        .await
        .unwrap();
    assert!(results.values().all(|result| result.is_satisfied()));
}

#[tokio::test(start_paused = true)]
async fn flap_restarts_hold_period() {
    let setup = Setup::new(SimConfig::default());
    bring_up(&setup, 65001).await;
    time::sleep(Duration::from_secs(4)).await;

    let network = setup.network.clone();
    tokio::spawn(async move {
        time::sleep(Duration::from_secs(2)).await;
        network.flap_session(ip!("192.0.2.2"));
    });

    let start = Instant::now();
    let result = dut_watcher(&setup)
        .watch_stable(
            &session_state(),
            Duration::from_secs(60),
            Duration::from_secs(5),
            established,
        )
        .await
        .unwrap();
    assert!(result.is_satisfied());
    // Re-established 5s in, then held for another 5s.
    assert!(start.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn watch_all_shares_deadline() {
    let setup = Setup::new(SimConfig::default());
    bring_up(&setup, 65001).await;

    let watcher = StateWatcher::new(setup.ate.clone(), Backoff::default());
    let paths = ["port1", "port2", "port9"]
        .into_iter()
        .map(ObservablePath::port_neighbor_resolved)
        .collect::<Vec<_>>();
    let start = Instant::now();
    let results = watcher
        .watch_all(
            paths.clone(),
            Duration::from_secs(10),
            |resolved: Option<&bool>| resolved == Some(&true),
        )
        .await
        .unwrap();
    assert_eq!(start.elapsed(), Duration::from_secs(10));
    let satisfied = results
        .iter()
        .map(|(path, result)| (path.key("name"), result.is_satisfied()))
        .collect::<BTreeMap<_, _>>();
    assert_eq!(
        satisfied,
        btreemap! {
            Some("port1") => true,
            Some("port2") => true,
            Some("port9") => false,
        }
    );
    assert_eq!(results[&paths[2]].value, None);
}
