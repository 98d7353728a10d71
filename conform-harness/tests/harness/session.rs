//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use conform_harness::{
    ConfigBatch, Device, Error, PushOutcome, TransportError,
};
use conform_model::{
    AclAction, AclType, ConfigPath, DEFAULT_NETWORK_INSTANCE, Interface,
};
use conform_sim::SimConfig;
use serde_json::json;

use super::*;

#[tokio::test]
async fn second_push_is_a_no_op() {
    let setup = Setup::new(SimConfig::default());
    let session = setup.session();
    let batch = interfaces().replace(bgp(65001)).replace(acl(AclAction::Drop));

    let outcome = session.push(&batch).await.unwrap();
    assert_eq!(
        outcome,
        PushOutcome::Applied {
            applied: 4,
            skipped: 0
        }
    );
    assert_eq!(setup.network.config_rpcs(), 4);

    let outcome = session.push(&batch).await.unwrap();
    assert!(outcome.is_unchanged());
    assert_eq!(setup.network.config_rpcs(), 4);
}

#[tokio::test]
async fn only_changed_operations_are_sent() {
    let setup = Setup::new(SimConfig::default());
    let session = setup.session();
    session.push(&interfaces()).await.unwrap();

    let port1 = Interface::builder("port1")
        .description("to ATE port1")
        .ipv4("192.0.2.1/30".parse().unwrap())
        .build();
    let port2 = Interface::builder("port2")
        .description("to ATE port2")
        .ipv4("192.0.2.5/30".parse().unwrap())
        .mtu(9000)
        .build();
    let batch = ConfigBatch::new().replace(port1).replace(port2);
    let outcome = session.push(&batch).await.unwrap();
    assert_eq!(
        outcome,
        PushOutcome::Applied {
            applied: 1,
            skipped: 1
        }
    );

    let path = ConfigPath::interface("port2");
    assert_eq!(setup.network.running(&path).unwrap()["mtu"], json!(9000));
    let running = session.running(&path).await.unwrap().unwrap();
    assert_eq!(running["mtu"], json!(9000));
}

#[tokio::test]
async fn update_merges_into_pushed_subtree() {
    let setup = Setup::new(SimConfig::default());
    let session = setup.session();
    session.push(&interfaces()).await.unwrap();

    let port1 = Interface::builder("port1")
        .description("to ATE port1")
        .ipv4("192.0.2.1/30".parse().unwrap())
        .build();
    let outcome = session
        .push(&ConfigBatch::new().update(port1))
        .await
        .unwrap();
    assert!(outcome.is_unchanged());

    let port1 = Interface::builder("port1")
        .description("uplink")
        .ipv4("192.0.2.1/30".parse().unwrap())
        .build();
    session
        .push(&ConfigBatch::new().update(port1))
        .await
        .unwrap();
    let path = ConfigPath::interface("port1");
    let running = setup.network.running(&path).unwrap();
    assert_eq!(running["description"], json!("uplink"));
    assert_eq!(running["ipv4"], json!(["192.0.2.1/30"]));
}

#[tokio::test]
async fn rejected_operation_aborts_batch() {
    let setup = Setup::new(SimConfig::default());
    setup
        .network
        .reject(ConfigPath::bgp(DEFAULT_NETWORK_INSTANCE));
    let session = setup.session();
    let batch = interfaces().replace(bgp(65001)).replace(acl(AclAction::Drop));

    let error = session.push(&batch).await.unwrap_err();
    assert!(matches!(
        error,
        Error::ConfigPush {
            index: 2,
            error: TransportError::Rejected(_),
            ..
        }
    ));
    // Earlier operations stay applied, later ones never reach the device.
    assert_eq!(setup.network.config_rpcs(), 2);
    let port1 = session.running(&ConfigPath::interface("port1")).await;
    assert!(port1.unwrap().is_some());
    let acl_path = ConfigPath::acl_set(ACL, AclType::Ipv4);
    assert_eq!(setup.network.running(&acl_path), None);
}

#[tokio::test]
async fn repeated_delete_is_a_no_op() {
    let setup = Setup::new(SimConfig::default());
    let session = setup.session();
    session.push(&interfaces()).await.unwrap();

    let path = ConfigPath::interface("port2");
    let batch = ConfigBatch::new().delete(path.clone());
    session.push(&batch).await.unwrap();
    assert_eq!(setup.network.running(&path), None);
    assert_eq!(session.running(&path).await.unwrap(), None);
    assert!(session.push(&batch).await.unwrap().is_unchanged());
    assert_eq!(setup.network.config_rpcs(), 3);
}

#[tokio::test]
async fn push_restores_state_changed_by_another_session() {
    let setup = Setup::new(SimConfig::default());
    let first = setup.session();
    let second = setup.session();
    let accept = ConfigBatch::new().replace(acl(AclAction::Accept));
    let deny = ConfigBatch::new().replace(acl(AclAction::Drop));

    first.push(&accept).await.unwrap();
    second.push(&deny).await.unwrap();
    let outcome = first.push(&accept).await.unwrap();
    assert_eq!(
        outcome,
        PushOutcome::Applied {
            applied: 1,
            skipped: 0
        }
    );

    let path = ConfigPath::acl_set(ACL, AclType::Ipv4);
    let expected = serde_json::to_value(acl(AclAction::Accept)).unwrap();
    assert_eq!(setup.network.running(&path), Some(expected));
    assert_eq!(setup.network.config_rpcs(), 3);
}

#[tokio::test]
async fn nested_entry_is_part_of_the_subtree() {
    let setup = Setup::new(SimConfig::default());
    let session = setup.session();
    session.push(&interfaces()).await.unwrap();

    // An entry stored below the interface makes the device subtree differ
    // from a plain replace of the interface.
    let port1 = ConfigPath::interface("port1");
    setup
        .dut
        .replace(&port1.child("config/mtu"), json!(9000))
        .await
        .unwrap();
    let running = session.running(&port1).await.unwrap().unwrap();
    assert_eq!(running["config/mtu"], json!(9000));

    let outcome = session.push(&interfaces()).await.unwrap();
    assert_eq!(
        outcome,
        PushOutcome::Applied {
            applied: 1,
            skipped: 1
        }
    );
    assert_eq!(setup.network.running(&port1.child("config/mtu")), None);
}

#[tokio::test]
async fn cli_is_always_sent() {
    let setup = Setup::new(SimConfig::default());
    let session = setup.session();
    session.push_cli("hardware access-list update").await.unwrap();
    session.push_cli("hardware access-list update").await.unwrap();
    assert_eq!(setup.network.cli().len(), 2);

    setup.network.set_unreachable(true);
    let error = session.push_cli("end").await.unwrap_err();
    assert!(matches!(
        error,
        Error::Transport(TransportError::Unreachable(_))
    ));
}
