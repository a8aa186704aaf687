//! Failing steps and their effect on the rest of the environment.

mod common;

use std::fs::read_dir;

use common::Deployment;
use pkhsm_common::aws;
use pkhsm_engine::{
    Operation,
    Properties,
    Provider,
    ProviderError,
    ResourceType,
    State,
    StepStatus,
    Urn,
};
use pkhsm_stack::{
    providers,
    providers::{TlsProvider, tls::LOCALLY_SIGNED_CERT},
};
use pkhsm_tests::{Action, Image, SimulatedCloud, simulated_cloud};
use rstest::rstest;
use testdir::testdir;
use testresult::TestResult;

/// Signs nothing: every signing request is rejected.
#[derive(Debug)]
struct RejectingSigner;

impl Provider for RejectingSigner {
    fn package(&self) -> &str {
        TlsProvider.package()
    }

    fn create(&self, urn: &Urn, inputs: &Properties) -> Result<Properties, ProviderError> {
        if urn.resource_type().as_str() == LOCALLY_SIGNED_CERT {
            return Err(ProviderError::api(std::io::Error::other(
                "signing is disabled",
            )));
        }
        TlsProvider.create(urn, inputs)
    }

    fn update(
        &self,
        urn: &Urn,
        outputs: &Properties,
        inputs: &Properties,
    ) -> Result<Properties, ProviderError> {
        TlsProvider.update(urn, outputs, inputs)
    }

    fn delete(&self, urn: &Urn, outputs: &Properties) -> Result<(), ProviderError> {
        TlsProvider.delete(urn, outputs)
    }

    fn read(&self, urn: &Urn, args: &Properties) -> Result<Properties, ProviderError> {
        TlsProvider.read(urn, args)
    }

    fn replace_on_change(&self, resource_type: &ResourceType, field: &str) -> bool {
        TlsProvider.replace_on_change(resource_type, field)
    }

    fn secret_outputs(&self, resource_type: &ResourceType) -> Vec<String> {
        TlsProvider.secret_outputs(resource_type)
    }
}

#[rstest]
fn cluster_failure_is_isolated(simulated_cloud: SimulatedCloud) -> TestResult {
    let message = "The number of clusters exceeds the quota of the account";
    simulated_cloud.fail_on(aws::HSM_CLUSTER, "ServiceQuotaExceededException", message);
    let deployment = Deployment::new(&testdir!(), simulated_cloud)?;
    let environment = &deployment.environment;

    let update = deployment.up(&State::default())?;

    let cluster = update
        .step(environment.hsm.cluster.urn())
        .ok_or("no cluster step")?;
    match &cluster.status {
        StepStatus::Failed { message: reported } => assert!(
            reported.contains(&format!("ServiceQuotaExceededException: {message}")),
            "{reported}"
        ),
        other => panic!("Expected the cluster to fail, got {other:?}"),
    }
    for urn in [
        environment.hsm.hsm.urn(),
        environment.hsm.cluster_read.urn(),
        environment.pki.cluster_cert.urn(),
        environment.artifacts.cluster_cert_file.urn(),
        environment.artifacts.ca_cert_file.urn(),
        environment.access.hsm_group.urn(),
        environment.access.hsm_ingress_rule.urn(),
    ] {
        assert!(
            update.step(urn).is_some_and(|step| step.is_skipped()),
            "{urn} was not skipped"
        );
    }
    for urn in [
        environment.network.vpc.urn(),
        environment.pki.ca_key.urn(),
        environment.pki.ca_cert.urn(),
        environment.access.bastion_group.urn(),
        environment.bastion.instance.urn(),
    ] {
        assert_eq!(
            update.step(urn).map(|step| &step.status),
            Some(&StepStatus::Succeeded),
            "{urn}"
        );
    }
    assert!(!deployment.artifacts_dir.exists());
    assert!(update.check().is_err());

    // a second run completes the environment without regenerating the CA
    deployment.cloud.clear_failures();
    let retry = deployment.up(update.state())?;
    retry.check()?;
    for urn in [
        environment.pki.ca_key.urn(),
        environment.pki.ca_cert.urn(),
        environment.bastion.instance.urn(),
    ] {
        assert_eq!(
            retry.step(urn).and_then(|step| step.operation),
            Some(Operation::Same),
            "{urn}"
        );
    }
    assert_eq!(read_dir(&deployment.artifacts_dir)?.count(), 2);
    Ok(())
}

#[rstest]
fn failed_signing_writes_no_artifacts(simulated_cloud: SimulatedCloud) -> TestResult {
    let providers = providers(simulated_cloud.clone()).register(RejectingSigner);
    let deployment =
        Deployment::with_providers(&testdir!(), simulated_cloud, providers, pkhsm_tests::OPERATOR_IP)?;
    let environment = &deployment.environment;

    let update = deployment.up(&State::default())?;

    assert!(
        update
            .step(environment.pki.cluster_cert.urn())
            .is_some_and(|step| step.is_failed())
    );
    for urn in [
        environment.artifacts.cluster_cert_file.urn(),
        environment.artifacts.ca_cert_file.urn(),
    ] {
        assert!(update.step(urn).is_some_and(|step| step.is_skipped()), "{urn}");
        assert!(update.state().get(urn).is_none());
    }
    assert!(!deployment.artifacts_dir.exists());
    Ok(())
}

#[rstest]
fn missing_hsm_perimeter_is_fatal(simulated_cloud: SimulatedCloud) -> TestResult {
    simulated_cloud.fail_on(
        aws::GET_SECURITY_GROUP,
        "InvalidGroup.NotFound",
        "no matching SecurityGroup found",
    );
    let deployment = Deployment::new(&testdir!(), simulated_cloud)?;
    let environment = &deployment.environment;

    let update = deployment.up(&State::default())?;

    assert!(
        update
            .step(environment.access.hsm_group.urn())
            .is_some_and(|step| step.is_failed())
    );
    assert!(
        update
            .step(environment.access.hsm_ingress_rule.urn())
            .is_some_and(|step| step.is_skipped())
    );
    // certificates do not depend on the perimeter
    assert_eq!(read_dir(&deployment.artifacts_dir)?.count(), 2);
    let error = update.check().err().ok_or("the run did not fail")?;
    assert!(error.to_string().contains("InvalidGroup.NotFound"), "{error}");
    Ok(())
}

#[rstest]
fn missing_csr_is_never_signed(simulated_cloud: SimulatedCloud) -> TestResult {
    simulated_cloud.withhold_csrs();
    let deployment = Deployment::new(&testdir!(), simulated_cloud)?;
    let environment = &deployment.environment;

    let update = deployment.up(&State::default())?;

    assert_eq!(
        update
            .step(environment.hsm.cluster_read.urn())
            .map(|step| &step.status),
        Some(&StepStatus::Succeeded)
    );
    let signing = update
        .step(environment.pki.cluster_cert.urn())
        .ok_or("no signing step")?;
    match &signing.status {
        StepStatus::Failed { message } => {
            assert!(message.contains("no value at /0/cluster_csr"), "{message}")
        }
        other => panic!("Expected signing to fail, got {other:?}"),
    }
    assert!(update.state().get(environment.pki.cluster_cert.urn()).is_none());
    for urn in [
        environment.artifacts.cluster_cert_file.urn(),
        environment.artifacts.ca_cert_file.urn(),
    ] {
        assert!(update.step(urn).is_some_and(|step| step.is_skipped()), "{urn}");
    }
    assert!(!deployment.artifacts_dir.exists());
    Ok(())
}

#[rstest]
fn image_of_other_architecture_is_rejected(simulated_cloud: SimulatedCloud) -> TestResult {
    simulated_cloud.add_image(
        Image::new(
            "ami-0c4d5e6f7a8b90705",
            "al2023-ami-2023.7.20250331.0-kernel-6.1-arm64",
            "2025-06-01T00:00:00.000Z",
        )
        .with_architecture("x86_64"),
    );
    let deployment = Deployment::new(&testdir!(), simulated_cloud)?;
    let environment = &deployment.environment;

    let update = deployment.up(&State::default())?;

    let instance = update
        .step(environment.bastion.instance.urn())
        .ok_or("no instance step")?;
    match &instance.status {
        StepStatus::Failed { message } => assert!(
            message.contains("ami-0c4d5e6f7a8b90705 is built for x86_64"),
            "{message}"
        ),
        other => panic!("Expected the instance to fail, got {other:?}"),
    }
    assert_eq!(deployment.cloud.count(Action::Create, aws::INSTANCE), 0);
    assert_eq!(read_dir(&deployment.artifacts_dir)?.count(), 2);
    Ok(())
}
