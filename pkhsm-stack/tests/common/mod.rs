use std::{
    fs::write,
    path::{Path, PathBuf},
};

use pkhsm_engine::{Engine, Providers, Stack, State, Update, UpdateOptions};
use pkhsm_stack::{CloudInitRenderer, Environment, StackConfig, declare, providers};
use pkhsm_tests::{OPERATOR_IP, OPERATOR_SSH_PUBLIC_KEY, REGION, SimulatedCloud};
use testresult::TestResult;
use x509_parser::{pem::parse_x509_pem, prelude::X509Certificate};

/// A declared environment backed by a [`SimulatedCloud`].
#[derive(Debug)]
pub struct Deployment {
    /// The cloud the environment is provisioned in.
    pub cloud: SimulatedCloud,
    /// The engine executing the stack.
    pub engine: Engine,
    /// The declared stack.
    pub stack: Stack,
    /// The handles of the declared environment.
    pub environment: Environment,
    /// The directory the certificate files are written to.
    pub artifacts_dir: PathBuf,
}

impl Deployment {
    /// Declares an environment with artifacts written below `dir`.
    pub fn new(dir: &Path, cloud: SimulatedCloud) -> TestResult<Self> {
        Self::with_providers(dir, cloud.clone(), providers(cloud), OPERATOR_IP)
    }

    /// Declares an environment for the operator at `operator_ip`.
    #[allow(dead_code)]
    pub fn for_operator(dir: &Path, cloud: SimulatedCloud, operator_ip: &str) -> TestResult<Self> {
        Self::with_providers(dir, cloud.clone(), providers(cloud), operator_ip)
    }

    /// Declares an environment, which is executed using `providers`.
    pub fn with_providers(
        dir: &Path,
        cloud: SimulatedCloud,
        providers: Providers,
        operator_ip: &str,
    ) -> TestResult<Self> {
        let template = dir.join("userdata.yaml");
        write(&template, "#cloud-config\npackages:\n  - opensc\n")?;
        let artifacts_dir = dir.join("dist");

        let config = StackConfig::from_toml_str(&format!(
            r#"
region = "{REGION}"
operator_ip = "{operator_ip}"
ssh_public_key = "{OPERATOR_SSH_PUBLIC_KEY}"

[hsm]
hsm_type = "hsm2m.medium"
mode = "FIPS"

[network]
availability_zones = 2
"#
        ))?
        .with_user_data(template)
        .with_artifacts_dir(&artifacts_dir);

        let mut stack = Stack::new("test");
        let environment = declare(&mut stack, &config, &CloudInitRenderer)?;

        Ok(Self {
            cloud,
            engine: Engine::new(providers),
            stack,
            environment,
            artifacts_dir,
        })
    }

    /// Converges the environment starting from `state`.
    pub fn up(&self, state: &State) -> TestResult<Update> {
        self.up_with(state, &UpdateOptions::new())
    }

    /// Converges the environment starting from `state` using `options`.
    #[allow(dead_code)]
    pub fn up_with(&self, state: &State, options: &UpdateOptions) -> TestResult<Update> {
        Ok(self.engine.up(&self.stack, state, options)?)
    }
}

/// Parses a PEM certificate and passes it to `check`.
#[allow(dead_code)]
pub fn inspect(pem: &str, check: impl FnOnce(&X509Certificate<'_>) -> TestResult) -> TestResult {
    let (_, pem) = parse_x509_pem(pem.as_bytes())?;
    let certificate = pem.parse_x509()?;
    check(&certificate)
}

/// Returns the string output `field` of the resource recorded as `urn` in `state`.
#[allow(dead_code)]
pub fn recorded(state: &State, urn: &pkhsm_engine::Urn, field: &str) -> TestResult<String> {
    Ok(state
        .get(urn)
        .ok_or_else(|| format!("{urn} is not recorded"))?
        .outputs
        .get(field)
        .and_then(|value| value.as_str())
        .ok_or_else(|| format!("{urn} has no output {field}"))?
        .to_string())
}
