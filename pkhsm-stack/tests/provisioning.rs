//! Provisioning an environment from scratch.

mod common;

use std::{
    fs::{metadata, read_dir, read_to_string},
    os::unix::fs::PermissionsExt,
};

use common::{Deployment, inspect, recorded};
use pkhsm_common::{
    artifacts::{get_ca_certificate_path, get_cluster_certificate_path},
    aws,
};
use pkhsm_engine::State;
use pkhsm_stack::exports::{CLUSTER_URL, EC2_IP, HSM_IP};
use pkhsm_tests::{Action, REGION, SimulatedCloud, simulated_cloud};
use rstest::rstest;
use serde_json::json;
use testdir::testdir;
use testresult::TestResult;

const VALIDITY_SECONDS: i64 = 87648 * 3600;

#[rstest]
fn fresh_environment_is_provisioned(simulated_cloud: SimulatedCloud) -> TestResult {
    let deployment = Deployment::new(&testdir!(), simulated_cloud)?;
    let update = deployment.up(&State::default())?;
    update.check()?;

    let cloud = &deployment.cloud;
    assert_eq!(cloud.count(Action::Create, aws::VPC), 1);
    assert_eq!(cloud.count(Action::Create, aws::SUBNET), 2);
    assert_eq!(cloud.count(Action::Create, aws::HSM_CLUSTER), 1);
    assert_eq!(cloud.count(Action::Create, aws::HSM), 1);
    assert_eq!(cloud.count(Action::Create, aws::INSTANCE), 1);
    assert_eq!(
        cloud.count(Action::Create, aws::SECURITY_GROUP_INGRESS_RULE),
        1
    );

    let cluster_ids = cloud.cluster_ids();
    let [cluster_id] = cluster_ids.as_slice() else {
        panic!("Expected exactly one cluster, got {cluster_ids:?}");
    };
    assert_eq!(cloud.hsm_count(cluster_id), 1);

    let ca_path = get_ca_certificate_path(&deployment.artifacts_dir);
    let cluster_path = get_cluster_certificate_path(&deployment.artifacts_dir, cluster_id);
    let ca_pem = read_to_string(&ca_path)?;
    let cluster_pem = read_to_string(&cluster_path)?;

    inspect(&ca_pem, |ca| {
        let validity = ca.validity();
        assert_eq!(
            validity.not_after.timestamp() - validity.not_before.timestamp(),
            VALIDITY_SECONDS
        );
        assert!(ca.is_ca());
        assert!(ca.extended_key_usage()?.is_none());

        inspect(&cluster_pem, |certificate| {
            let validity = certificate.validity();
            assert_eq!(
                validity.not_after.timestamp() - validity.not_before.timestamp(),
                VALIDITY_SECONDS
            );
            assert!(certificate.is_ca());
            assert_eq!(certificate.issuer(), ca.subject());
            assert!(certificate.verify_signature(Some(ca.public_key())).is_ok());
            assert_eq!(
                certificate
                    .subject()
                    .iter_common_name()
                    .next()
                    .and_then(|cn| cn.as_str().ok()),
                Some(format!("HSM:{cluster_id}").as_str())
            );
            Ok(())
        })
    })?;

    for path in [&ca_path, &cluster_path] {
        assert_eq!(metadata(path)?.permissions().mode() & 0o777, 0o644);
    }
    assert_eq!(read_dir(&deployment.artifacts_dir)?.count(), 2);
    Ok(())
}

#[rstest]
fn exports_are_resolved(simulated_cloud: SimulatedCloud) -> TestResult {
    let deployment = Deployment::new(&testdir!(), simulated_cloud)?;
    let update = deployment.up(&State::default())?;
    update.check()?;

    let state = update.state();
    let environment = &deployment.environment;
    let outputs = update.outputs();
    assert_eq!(outputs.len(), 3);
    assert_eq!(
        outputs.get(HSM_IP),
        Some(&json!(recorded(state, environment.hsm.hsm.urn(), "ip_address")?))
    );
    assert_eq!(
        outputs.get(EC2_IP),
        Some(&json!(recorded(
            state,
            environment.bastion.instance.urn(),
            "public_ip"
        )?))
    );
    let cluster_id = recorded(state, environment.hsm.cluster.urn(), "cluster_id")?;
    assert_eq!(
        outputs.get(CLUSTER_URL),
        Some(&json!(format!(
            "https://{REGION}.console.aws.amazon.com/cloudhsm/home?region={REGION}#/clusters/{cluster_id}/hsms"
        )))
    );
    assert!(!outputs.is_secret(CLUSTER_URL));
    Ok(())
}

#[rstest]
#[case("203.0.113.7")]
#[case("198.51.100.23")]
#[case("192.0.2.1")]
fn operator_is_the_only_ssh_source(
    simulated_cloud: SimulatedCloud,
    #[case] operator_ip: &str,
) -> TestResult {
    let deployment = Deployment::for_operator(&testdir!(), simulated_cloud, operator_ip)?;
    let update = deployment.up(&State::default())?;
    update.check()?;

    let access = &deployment.environment.access;
    let bastion_group = update
        .state()
        .get(access.bastion_group.urn())
        .ok_or("no bastion perimeter")?;
    assert_eq!(
        bastion_group.inputs["ingress"],
        json!([{
            "from_port": 22,
            "to_port": 22,
            "protocol": "tcp",
            "cidr_blocks": [format!("{operator_ip}/32")],
        }])
    );
    assert_eq!(
        bastion_group.inputs["egress"],
        json!([{
            "from_port": 0,
            "to_port": 65535,
            "protocol": "tcp",
            "cidr_blocks": ["0.0.0.0/0"],
        }])
    );

    // the HSM perimeter admits the bastion perimeter, never an address
    let rule = update
        .state()
        .get(access.hsm_ingress_rule.urn())
        .ok_or("no ingress rule")?;
    assert_eq!(
        rule.inputs["referenced_security_group_id"],
        bastion_group.outputs["id"]
    );
    assert!(!rule.inputs.contains_key("cidr_ipv4"));
    assert_eq!(rule.inputs["from_port"], json!(2223));
    assert_eq!(rule.inputs["to_port"], json!(2224));

    let hsm_group_id = recorded(
        update.state(),
        deployment.environment.hsm.cluster.urn(),
        "security_group_id",
    )?;
    assert_eq!(rule.inputs["security_group_id"], json!(hsm_group_id));
    Ok(())
}

#[rstest]
fn ssh_public_key_is_secret(simulated_cloud: SimulatedCloud) -> TestResult {
    let deployment = Deployment::new(&testdir!(), simulated_cloud)?;
    let update = deployment.up(&State::default())?;
    update.check()?;

    let key_pair = update
        .state()
        .get(deployment.environment.bastion.key_pair.urn())
        .ok_or("no key pair")?;
    assert!(key_pair.secret_fields.contains("public_key"));
    let ca_key = update
        .state()
        .get(deployment.environment.pki.ca_key.urn())
        .ok_or("no CA key")?;
    assert!(ca_key.secret_fields.contains("private_key_pem"));
    Ok(())
}

#[rstest]
fn most_recent_image_is_used(simulated_cloud: SimulatedCloud) -> TestResult {
    let deployment = Deployment::new(&testdir!(), simulated_cloud)?;
    let update = deployment.up(&State::default())?;
    update.check()?;

    let instance = update
        .state()
        .get(deployment.environment.bastion.instance.urn())
        .ok_or("no instance")?;
    assert_eq!(instance.inputs["ami"], json!("ami-0f3a2b1c4d5e6f702"));
    assert_eq!(instance.inputs["instance_type"], json!("t4g.small"));
    assert_eq!(instance.inputs["associate_public_ip_address"], json!(true));
    assert_eq!(
        instance.inputs["subnet_id"],
        json!(recorded(
            update.state(),
            deployment.environment.network.subnets[0].urn(),
            "id"
        )?)
    );
    Ok(())
}
