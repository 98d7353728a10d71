//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use conform_harness::{
    CheckOutcome, Convergence, Error, Expectation, FailureKind, FlowCounters,
    ObservablePath, StopCondition, TestCase, TrafficPlan, TrafficReport,
    TrafficState, TransportError, VerificationError,
};
use conform_model::{AclAction, AclSet, AclType, ConfigPath};
use conform_sim::{SessionState, SimConfig};
use const_addrs::ip;
use serde_json::json;

use super::*;

fn drained() -> TrafficPlan {
    TrafficPlan::Run(StopCondition::Drained {
        timeout: Duration::from_secs(60),
    })
}

fn matched_packets(sequence_id: u32) -> ObservablePath {
    ObservablePath::acl_entry_matched(ACL, AclType::Ipv4, sequence_id)
}

fn partially_delivered(report: Option<&TrafficReport>) -> CheckOutcome {
    let counters = report
        .and_then(|report| report.flow(FLOW))
        .copied()
        .unwrap_or_default();
    if counters.received == 0 || counters.received >= counters.sent {
        return Err(VerificationError::new(
            FailureKind::Mismatch,
            format!("{FLOW}: expected partial delivery, got {counters:?}"),
        ));
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn bgp_convergence_then_traffic() {
    let setup = Setup::new(SimConfig::default());
    let mut orchestrator = setup.orchestrator();

    let case = TestCase::new("bgp-convergence")
        .config(interfaces().replace(bgp(65001)))
        .topology(topology(10000))
        .converge(Convergence::bgp_established(&ip!("192.0.2.2")))
        .converge(
            Convergence::equals(
                ObservablePath::interface_oper_status("port2"),
                "UP",
            )
            .hold(Duration::from_secs(2)),
        )
        .traffic(drained())
        .expect(Expectation::loss(FLOW))
        .expect(Expectation::delivered(FLOW, 10000, 0))
        .expect(Expectation::state(
            ObservablePath::interface_oper_status("port1"),
            "UP",
        ));
    let outcome = orchestrator.run_case(case).await.unwrap();
    assert!(outcome.is_pass(), "{}", outcome.failures);

    let report = outcome.report.unwrap();
    assert_eq!(report.flow(FLOW), Some(&FlowCounters::new(10000, 10000)));
    assert_eq!(orchestrator.traffic().state(), TrafficState::Idle);
    // Protocols were stopped at the end of the case.
    assert_eq!(
        setup.network.session_state(&ip!("192.0.2.2")),
        Some(SessionState::Idle)
    );
}

#[tokio::test(start_paused = true)]
async fn convergence_failure_skips_traffic() {
    let setup = Setup::new(SimConfig::default());
    let mut orchestrator = setup.orchestrator();

    let case = TestCase::new("bgp-as-mismatch")
        .config(interfaces().replace(bgp(65099)))
        .topology(topology(10000))
        .converge(
            Convergence::bgp_established(&ip!("192.0.2.2"))
                .timeout(Duration::from_secs(15)),
        )
        .traffic(drained())
        .expect(Expectation::loss(FLOW));
    let outcome = orchestrator.run_case(case).await.unwrap();
    assert!(!outcome.is_pass());
    assert!(outcome.report.is_none());

    let kinds = outcome
        .failures
        .iter()
        .map(|failure| failure.kind)
        .collect::<Vec<_>>();
    assert_eq!(kinds, [FailureKind::Timeout, FailureKind::Mismatch]);
    assert!(outcome.failures.to_string().contains("IDLE"));
    assert!(outcome.into_result().is_err());
}

#[tokio::test(start_paused = true)]
async fn acl_counters_across_cases() {
    let setup = Setup::new(SimConfig::default());
    let mut orchestrator = setup.orchestrator();
    let acl_path = ConfigPath::acl_set(ACL, AclType::Ipv4);

    let blocked = TestCase::new("acl-drop")
        .config(interfaces().replace(acl(AclAction::Drop)))
        .topology(topology(5000))
        .traffic(drained())
        .expect(Expectation::blocked(FLOW, 5000))
        .expect(Expectation::counter_delta(
            "entry-10",
            matched_packets(10),
            5000,
        ))
        .expect(Expectation::counter_delta(
            "entry-default",
            matched_packets(AclSet::DEFAULT_ENTRY_ID),
            0,
        ));
    let delivered = TestCase::new("acl-accept")
        .config(ConfigBatch::new().replace(acl(AclAction::Accept)))
        .traffic(drained())
        .expect(Expectation::delivered(FLOW, 5000, 0))
        .expect(Expectation::counter_delta(
            "entry-10",
            matched_packets(10),
            5000,
        ))
        .expect(Expectation::present(matched_packets(10)))
        .cleanup(ConfigBatch::new().delete(acl_path.clone()));

    let outcomes = orchestrator.run_all([blocked, delivered]).await.unwrap();
    for outcome in &outcomes {
        assert!(outcome.is_pass(), "{}: {}", outcome.name, outcome.failures);
    }
    // The device counter kept growing, the deltas did not.
    assert_eq!(orchestrator.baseline().get("entry-10"), 10000);
    assert_eq!(setup.network.running(&acl_path), None);

    orchestrator.reset_baseline();
    assert!(orchestrator.baseline().is_empty());
}

#[tokio::test(start_paused = true)]
async fn acl_update_while_traffic_flows() {
    let setup = Setup::new(SimConfig::default());
    let mut orchestrator = setup.orchestrator();

    let case = TestCase::new("acl-update")
        .config(interfaces().replace(acl(AclAction::Accept)))
        .topology(topology(10000))
        .traffic(TrafficPlan::Reconfigure {
            flow: FLOW.to_owned(),
            threshold: 1000,
            timeout: Duration::from_secs(30),
            batch: ConfigBatch::new().replace(acl(AclAction::Drop)),
            drain_timeout: Duration::from_secs(60),
        })
        .expect(Expectation::custom(partially_delivered))
        .expect(Expectation::counter_delta(
            "entry-10",
            matched_packets(10),
            10000,
        ));
    let outcome = orchestrator.run_case(case).await.unwrap();
    assert!(outcome.is_pass(), "{}", outcome.failures);

    let report = outcome.report.unwrap();
    assert_eq!(report.flow(FLOW).unwrap().sent, 10000);
}

#[tokio::test(start_paused = true)]
async fn missing_state_is_reported() {
    let setup = Setup::new(SimConfig::default());
    let mut orchestrator = setup.orchestrator();

    let case = TestCase::new("state-checks")
        .config(interfaces())
        .expect(Expectation::present(ObservablePath::interface_oper_status(
            "port9",
        )))
        .expect(Expectation::absent(ObservablePath::interface_oper_status(
            "port1",
        )))
        .expect(Expectation::state(
            ObservablePath::interface_oper_status("port2"),
            json!("DOWN"),
        ));
    let outcome = orchestrator.run_case(case).await.unwrap();
    let kinds = outcome
        .failures
        .iter()
        .map(|failure| failure.kind)
        .collect::<Vec<_>>();
    assert_eq!(
        kinds,
        [
            FailureKind::Presence,
            FailureKind::Absence,
            FailureKind::Mismatch
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn unreachable_device_aborts_case() {
    let setup = Setup::new(SimConfig::default());
    let mut orchestrator = setup.orchestrator();
    setup.network.set_unreachable(true);

    let case = TestCase::new("unreachable")
        .config(interfaces())
        .cleanup(ConfigBatch::new().delete(ConfigPath::interface("port1")));
    let error = orchestrator.run_case(case).await.unwrap_err();
    assert!(matches!(
        error,
        Error::ConfigPush {
            index: 0,
            error: TransportError::Unreachable(_),
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn collaborator_error_stops_protocols() {
    let setup = Setup::new(SimConfig::default());
    let mut orchestrator = setup.orchestrator();

    let network = setup.network.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        network.set_unreachable(true);
    });

    let case = TestCase::new("device-lost")
        .config(interfaces().replace(bgp(65001)))
        .topology(topology(10000))
        .converge(Convergence::bgp_established(&ip!("192.0.2.2")))
        .traffic(drained());
    let error = orchestrator.run_case(case).await.unwrap_err();
    assert!(matches!(
        error,
        Error::Transport(TransportError::Unreachable(_))
    ));
    assert_eq!(orchestrator.traffic().state(), TrafficState::Idle);
    assert_eq!(
        setup.network.session_state(&ip!("192.0.2.2")),
        Some(SessionState::Idle)
    );
}

#[tokio::test(start_paused = true)]
async fn loss_within_tolerance() {
    // Wire loss ratio, packets received out of 10000, and whether 1% loss
    // tolerance holds.
    let runs = [
        (0.005, 9950, true),
        (0.01, 9900, true),
        (0.0101, 9899, false),
        (0.02, 9800, false),
    ];
    for (loss_ratio, received, pass) in runs {
        let setup = Setup::new(SimConfig {
            loss_ratio,
            ..Default::default()
        });
        let mut orchestrator = setup.orchestrator();

        let case = TestCase::new("lossy-wire")
            .config(interfaces().replace(bgp(65001)))
            .topology(topology(10000))
            .converge(Convergence::bgp_established(&ip!("192.0.2.2")))
            .traffic(drained())
            .expect(Expectation::loss(FLOW));
        let outcome = orchestrator.run_case(case).await.unwrap();
        let report = outcome.report.as_ref().unwrap();
        assert_eq!(
            report.flow(FLOW),
            Some(&FlowCounters::new(10000, received))
        );
        assert_eq!(outcome.is_pass(), pass, "{}", outcome.failures);
        if !pass {
            assert_eq!(outcome.failures.len(), 1);
            assert!(
                outcome
                    .failures
                    .iter()
                    .all(|failure| failure.kind == FailureKind::Tolerance)
            );
        }
    }
}
