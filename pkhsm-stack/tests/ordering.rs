//! Ordering of steps whose dependencies are side effects.

mod common;

use common::Deployment;
use pkhsm_engine::{Engine, Operation, State, UpdateOptions};
use pkhsm_stack::providers;
use pkhsm_tests::{Action, SimulatedCloud, simulated_cloud};
use rstest::rstest;
use testdir::testdir;
use testresult::TestResult;

#[rstest]
fn required_orderings_are_declared(simulated_cloud: SimulatedCloud) -> TestResult {
    let deployment = Deployment::new(&testdir!(), simulated_cloud)?;
    let environment = &deployment.environment;
    let graph = deployment.stack.graph()?;

    let hsm = environment.hsm.hsm.urn();
    let orderings = [
        (hsm, environment.hsm.cluster_read.urn()),
        (environment.pki.ca_cert.urn(), environment.pki.cluster_cert.urn()),
        (
            environment.pki.cluster_cert.urn(),
            environment.artifacts.cluster_cert_file.urn(),
        ),
        (
            environment.pki.cluster_cert.urn(),
            environment.artifacts.ca_cert_file.urn(),
        ),
        (hsm, environment.access.hsm_group.urn()),
        (hsm, environment.access.hsm_ingress_rule.urn()),
    ];
    for (before, after) in orderings {
        assert!(graph.precedes(before, after), "{before} must precede {after}");
    }

    // neither read would wait for the node without an explicit edge
    for read in [
        environment.hsm.cluster_read.urn(),
        environment.access.hsm_group.urn(),
    ] {
        assert!(graph.explicit_dependencies(read).contains(hsm), "{read}");
    }
    Ok(())
}

#[rstest]
#[case::sequential(1)]
#[case::bounded(3)]
#[case::default(pkhsm_engine::DEFAULT_PARALLELISM)]
fn reads_follow_node_creation(
    simulated_cloud: SimulatedCloud,
    #[case] parallelism: usize,
) -> TestResult {
    let mut deployment = Deployment::new(&testdir!(), simulated_cloud)?;
    deployment.engine = Engine::new(providers(deployment.cloud.clone())).with_parallelism(parallelism);
    deployment.up(&State::default())?.check()?;

    let cloud = &deployment.cloud;
    let environment = &deployment.environment;
    let created = cloud
        .position(Action::Create, environment.hsm.hsm.urn())
        .ok_or("the node was not created")?;
    for read in [
        environment.hsm.cluster_read.urn(),
        environment.access.hsm_group.urn(),
    ] {
        let position = cloud
            .position(Action::Read, read)
            .ok_or_else(|| format!("{read} was not read"))?;
        assert!(created < position, "{read} was read before the node was created");
    }
    Ok(())
}

#[rstest]
fn preview_defers_csr_read(simulated_cloud: SimulatedCloud) -> TestResult {
    let deployment = Deployment::new(&testdir!(), simulated_cloud)?;
    let environment = &deployment.environment;

    let plan = deployment
        .engine
        .preview(&deployment.stack, &State::default(), &UpdateOptions::new())?;

    assert_eq!(
        plan.step(environment.hsm.cluster_read.urn())
            .map(|step| step.operation),
        Some(Operation::Read)
    );
    assert_eq!(
        plan.step(environment.pki.cluster_cert.urn())
            .map(|step| step.operation),
        Some(Operation::Create)
    );
    assert_eq!(
        deployment
            .cloud
            .position(Action::Read, environment.hsm.cluster_read.urn()),
        None
    );
    assert_eq!(
        deployment
            .cloud
            .position(Action::Read, environment.access.hsm_group.urn()),
        None
    );
    // nothing is created while previewing
    assert!(
        deployment
            .cloud
            .operations()
            .iter()
            .all(|operation| operation.action == Action::Read)
    );
    Ok(())
}
