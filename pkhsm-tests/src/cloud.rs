//! An in-memory cloud provider.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use log::debug;
use pkhsm_common::aws::{self, get_hsm_security_group_name};
use pkhsm_engine::{Properties, Provider, ProviderError, ResourceType, Urn};
use rcgen::{CertificateParams, DistinguishedName, DnType, DnValue, KeyPair};
use serde_json::{Value, json};

/// The availability zones of the simulated region.
pub const SIMULATED_ZONES: [&str; 3] = ["eu-central-1a", "eu-central-1b", "eu-central-1c"];

/// An error returned by the [`SimulatedCloud`].
///
/// Errors carry an error code and message, the way cloud APIs report them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The cloud API rejected a request.
    #[error("{code}: {message}")]
    Api {
        /// The error code.
        code: String,
        /// The error message.
        message: String,
    },

    /// Generating a certificate signing request failed.
    #[error("Generating a certificate signing request failed:\n{0}")]
    Csr(#[from] rcgen::Error),
}

impl Error {
    fn api(code: &str, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<Error> for ProviderError {
    fn from(value: Error) -> Self {
        ProviderError::api(value)
    }
}

/// An action recorded by the [`SimulatedCloud`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Action {
    /// A resource was created.
    Create,

    /// A resource was updated in-place.
    Update,

    /// A resource was deleted.
    Delete,

    /// Data was read.
    Read,
}

/// A recorded operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CloudOperation {
    /// The action.
    pub action: Action,

    /// The resource or read the action applied to.
    pub urn: Urn,
}

/// A machine image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Image {
    /// The image identifier.
    pub id: String,

    /// The image name.
    pub name: String,

    /// The creation date (ISO 8601, compared lexically).
    pub creation_date: String,

    /// The CPU architecture.
    pub architecture: String,
}

impl Image {
    /// Creates a new arm64 [`Image`].
    pub fn new(id: &str, name: &str, creation_date: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            creation_date: creation_date.to_string(),
            architecture: "arm64".to_string(),
        }
    }

    /// Sets the CPU architecture of the image.
    pub fn with_architecture(mut self, architecture: &str) -> Self {
        self.architecture = architecture.to_string();
        self
    }
}

#[derive(Debug)]
struct Cluster {
    hsms: BTreeSet<String>,
    csr: Option<String>,
    security_group_id: String,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    operations: Vec<CloudOperation>,
    failures: BTreeMap<String, Error>,
    clusters: BTreeMap<String, Cluster>,
    // security group id -> name
    security_groups: BTreeMap<String, String>,
    images: Vec<Image>,
    // nodes do not initialize the cluster certificates
    withhold_csrs: bool,
}

impl Inner {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:08x}", self.next_id)
    }

    fn address(&self, network: &str) -> String {
        format!("{network}.{}", self.next_id % 250 + 4)
    }

    fn record(&mut self, action: Action, urn: &Urn) -> Result<(), Error> {
        debug!(action:% = action, urn:% = urn; "Simulating {action} of {urn}");
        self.operations.push(CloudOperation {
            action,
            urn: urn.clone(),
        });
        if matches!(action, Action::Create | Action::Read) {
            if let Some(Error::Api { code, message }) =
                self.failures.get(urn.resource_type().as_str())
            {
                return Err(Error::api(code, message.clone()));
            }
        }
        Ok(())
    }
}

/// An in-memory implementation of the cloud provider package.
///
/// Cloning a [`SimulatedCloud`] yields a handle to the same simulated cloud, so that a test can
/// register one handle with an engine and inspect the cloud through another.
#[derive(Clone, Debug)]
pub struct SimulatedCloud {
    inner: Arc<Mutex<Inner>>,
}

impl Default for SimulatedCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCloud {
    /// Creates a new [`SimulatedCloud`] offering [`SIMULATED_ZONES`] and two revisions of the
    /// Amazon Linux 2023 arm64 image.
    pub fn new() -> Self {
        let inner = Inner {
            images: vec![
                Image::new(
                    "ami-0f3a2b1c4d5e6f701",
                    "al2023-ami-2023.7.20250331.0-kernel-6.1-arm64",
                    "2025-04-01T08:12:40.000Z",
                ),
                Image::new(
                    "ami-0f3a2b1c4d5e6f702",
                    "al2023-ami-2023.7.20250331.0-kernel-6.1-arm64",
                    "2025-04-03T10:01:12.000Z",
                ),
                Image::new(
                    "ami-0e1d2c3b4a5968703",
                    "al2023-ami-2023.7.20250331.0-kernel-6.1-x86_64",
                    "2025-04-04T09:00:00.000Z",
                ),
            ],
            ..Default::default()
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every creation or read of `resource_type` fail with `code` and `message`.
    pub fn fail_on(&self, resource_type: &str, code: &str, message: &str) {
        self.lock()
            .failures
            .insert(resource_type.to_string(), Error::api(code, message));
    }

    /// Keeps new nodes from initializing the certificates of their cluster.
    ///
    /// Clusters whose first node is created afterwards expose no certificate signing request,
    /// as if the node never became active.
    pub fn withhold_csrs(&self) {
        self.lock().withhold_csrs = true;
    }

    /// Removes all injected failures.
    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    /// Publishes an additional machine image.
    pub fn add_image(&self, image: Image) {
        self.lock().images.push(image);
    }

    /// Returns the identifiers of all existing HSM clusters.
    pub fn cluster_ids(&self) -> Vec<String> {
        self.lock().clusters.keys().cloned().collect()
    }

    /// Returns the number of nodes of the HSM cluster `cluster_id`.
    pub fn hsm_count(&self, cluster_id: &str) -> usize {
        self.lock()
            .clusters
            .get(cluster_id)
            .map(|cluster| cluster.hsms.len())
            .unwrap_or_default()
    }

    /// Replaces the certificate signing request of the HSM cluster `cluster_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster does not exist, has no CSR yet, or generating a new CSR
    /// fails.
    pub fn rotate_csr(&self, cluster_id: &str) -> Result<String, Error> {
        let mut inner = self.lock();
        let Some(cluster) = inner.clusters.get_mut(cluster_id) else {
            return Err(Error::api(
                "CloudHsmResourceNotFoundException",
                format!("Cluster {cluster_id} not found"),
            ));
        };
        if cluster.csr.is_none() {
            return Err(Error::api(
                "CloudHsmInvalidRequestException",
                format!("Cluster {cluster_id} has no certificate signing request"),
            ));
        }
        let csr = generate_csr(cluster_id)?;
        cluster.csr = Some(csr.clone());
        Ok(csr)
    }

    /// Returns all recorded operations in the order they happened.
    pub fn operations(&self) -> Vec<CloudOperation> {
        self.lock().operations.clone()
    }

    /// Returns the index of the first recorded `action` on `urn`.
    pub fn position(&self, action: Action, urn: &Urn) -> Option<usize> {
        self.lock()
            .operations
            .iter()
            .position(|operation| operation.action == action && &operation.urn == urn)
    }

    /// Returns the number of recorded `action`s on resources of `resource_type`.
    pub fn count(&self, action: Action, resource_type: &str) -> usize {
        self.lock()
            .operations
            .iter()
            .filter(|operation| {
                operation.action == action
                    && operation.urn.resource_type().as_str() == resource_type
            })
            .count()
    }
}

/// Generates a certificate signing request for the cluster `cluster_id`.
fn generate_csr(cluster_id: &str) -> Result<String, Error> {
    let key_pair = KeyPair::generate()?;
    let mut params = CertificateParams::default();
    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(
        DnType::CommonName,
        DnValue::Utf8String(format!("HSM:{cluster_id}")),
    );
    params.distinguished_name = distinguished_name;
    Ok(params.serialize_request(&key_pair)?.pem()?)
}

fn string<'a>(urn: &Urn, inputs: &'a Properties, field: &str) -> Result<&'a str, ProviderError> {
    inputs
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::invalid_input(urn.resource_type(), field, "expected a string"))
}

fn strings(urn: &Urn, inputs: &Properties, field: &str) -> Result<Vec<String>, ProviderError> {
    inputs
        .get(field)
        .and_then(Value::as_array)
        .and_then(|values| {
            values
                .iter()
                .map(|value| value.as_str().map(ToString::to_string))
                .collect::<Option<Vec<_>>>()
        })
        .ok_or_else(|| {
            ProviderError::invalid_input(urn.resource_type(), field, "expected a list of strings")
        })
}

/// Matches `name` against a `pattern` in which `*` matches any sequence of characters.
fn glob(pattern: &str, name: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return true;
    };
    let Some(mut rest) = name.strip_prefix(first) else {
        return false;
    };
    let parts: Vec<&str> = parts.collect();
    let Some((last, middle)) = parts.split_last() else {
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(index) => rest = &rest[index + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

impl SimulatedCloud {
    fn select_image(&self, urn: &Urn, args: &Properties) -> Result<Properties, ProviderError> {
        let most_recent = args
            .get("most_recent")
            .and_then(Value::as_bool)
            .unwrap_or_default();
        let mut patterns = Vec::new();
        for filter in args
            .get("filters")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if filter.get("name").and_then(Value::as_str) != Some("name") {
                return Err(ProviderError::invalid_input(
                    urn.resource_type(),
                    "filters",
                    "only filters by name are supported",
                ));
            }
            patterns.extend(
                filter
                    .get("values")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string),
            );
        }

        let inner = self.lock();
        let mut candidates: Vec<&Image> = inner
            .images
            .iter()
            .filter(|image| patterns.iter().all(|pattern| glob(pattern, &image.name)))
            .collect();
        candidates.sort_by(|a, b| a.creation_date.cmp(&b.creation_date));
        let image = match candidates.as_slice() {
            [] => {
                return Err(Error::api(
                    "InvalidAMIID.NotFound",
                    "Your query returned no results. Please change your search criteria and try again.",
                )
                .into());
            }
            [image] => image,
            [.., latest] if most_recent => latest,
            _ => {
                return Err(Error::api(
                    "InvalidParameterCombination",
                    "Your query returned more than one result. Please try a more specific search criteria, or set `most_recent` attribute to true.",
                )
                .into());
            }
        };
        Ok(Properties::from([
            ("id".to_string(), json!(image.id)),
            ("name".to_string(), json!(image.name)),
            ("architecture".to_string(), json!(image.architecture)),
            ("creation_date".to_string(), json!(image.creation_date)),
        ]))
    }
}

impl Provider for SimulatedCloud {
    fn package(&self) -> &str {
        aws::PACKAGE
    }

    fn create(&self, urn: &Urn, inputs: &Properties) -> Result<Properties, ProviderError> {
        let mut inner = self.lock();
        inner.record(Action::Create, urn)?;
        let mut outputs = inputs.clone();

        match urn.resource_type().as_str() {
            aws::VPC => {
                let id = inner.id("vpc");
                outputs.insert("arn".to_string(), json!(format!("arn:aws:ec2:vpc/{id}")));
                outputs.insert("id".to_string(), json!(id));
            }
            aws::SUBNET => {
                let zone = string(urn, inputs, "availability_zone")?;
                if !SIMULATED_ZONES.contains(&zone) {
                    return Err(Error::api(
                        "InvalidParameterValue",
                        format!("Value ({zone}) for parameter availabilityZone is invalid"),
                    )
                    .into());
                }
                string(urn, inputs, "vpc_id")?;
                outputs.insert("id".to_string(), json!(inner.id("subnet")));
            }
            aws::INTERNET_GATEWAY => {
                outputs.insert("id".to_string(), json!(inner.id("igw")));
            }
            aws::ROUTE_TABLE => {
                outputs.insert("id".to_string(), json!(inner.id("rtb")));
            }
            aws::ROUTE_TABLE_ASSOCIATION => {
                outputs.insert("id".to_string(), json!(inner.id("rtbassoc")));
            }
            aws::HSM_CLUSTER => {
                if strings(urn, inputs, "subnet_ids")?.is_empty() {
                    return Err(Error::api(
                        "CloudHsmInvalidRequestException",
                        "At least one subnet is required",
                    )
                    .into());
                }
                let cluster_id = inner.id("cluster");
                let security_group_id = inner.id("sg");
                inner.security_groups.insert(
                    security_group_id.clone(),
                    get_hsm_security_group_name(&cluster_id),
                );
                inner.clusters.insert(
                    cluster_id.clone(),
                    Cluster {
                        hsms: BTreeSet::new(),
                        csr: None,
                        security_group_id: security_group_id.clone(),
                    },
                );
                outputs.insert("cluster_id".to_string(), json!(cluster_id));
                outputs.insert("cluster_state".to_string(), json!("UNINITIALIZED"));
                outputs.insert("security_group_id".to_string(), json!(security_group_id));
            }
            aws::HSM => {
                let cluster_id = string(urn, inputs, "cluster_id")?.to_string();
                string(urn, inputs, "subnet_id")?;
                let hsm_id = inner.id("hsm");
                let ip_address = inner.address("10.0.0");
                let withhold_csrs = inner.withhold_csrs;
                let Some(cluster) = inner.clusters.get_mut(&cluster_id) else {
                    return Err(Error::api(
                        "CloudHsmResourceNotFoundException",
                        format!("Cluster {cluster_id} not found"),
                    )
                    .into());
                };
                cluster.hsms.insert(hsm_id.clone());
                // the first node initializes the cluster certificates
                if cluster.csr.is_none() && !withhold_csrs {
                    cluster.csr = Some(generate_csr(&cluster_id)?);
                }
                outputs.insert("hsm_id".to_string(), json!(hsm_id));
                outputs.insert("hsm_state".to_string(), json!("ACTIVE"));
                outputs.insert("ip_address".to_string(), json!(ip_address));
            }
            aws::KEY_PAIR => {
                string(urn, inputs, "key_name")?;
                string(urn, inputs, "public_key")?;
                outputs.insert("key_pair_id".to_string(), json!(inner.id("key")));
            }
            aws::SECURITY_GROUP => {
                let id = inner.id("sg");
                let name = inputs
                    .get("name")
                    .and_then(Value::as_str)
                    .map(ToString::to_string)
                    .unwrap_or_else(|| format!("{}-{id}", urn.name()));
                inner.security_groups.insert(id.clone(), name.clone());
                outputs.insert("id".to_string(), json!(id));
                outputs.insert("name".to_string(), json!(name));
            }
            aws::SECURITY_GROUP_INGRESS_RULE => {
                let group = string(urn, inputs, "security_group_id")?;
                let mut referenced = vec![group];
                if let Some(source) = inputs
                    .get("referenced_security_group_id")
                    .and_then(Value::as_str)
                {
                    referenced.push(source);
                }
                if let Some(missing) = referenced
                    .into_iter()
                    .find(|id| !inner.security_groups.contains_key(*id))
                {
                    return Err(Error::api(
                        "InvalidGroup.NotFound",
                        format!("The security group '{missing}' does not exist"),
                    )
                    .into());
                }
                let id = inner.id("sgr");
                outputs.insert("security_group_rule_id".to_string(), json!(id));
                outputs.insert("id".to_string(), json!(id));
            }
            aws::INSTANCE => {
                string(urn, inputs, "ami")?;
                string(urn, inputs, "subnet_id")?;
                let id = inner.id("i");
                outputs.insert("private_ip".to_string(), json!(inner.address("10.0.0")));
                let public = inputs
                    .get("associate_public_ip_address")
                    .and_then(Value::as_bool)
                    .unwrap_or_default();
                if public {
                    outputs.insert("public_ip".to_string(), json!(inner.address("198.51.100")));
                }
                outputs.insert("id".to_string(), json!(id));
            }
            _ => {
                return Err(ProviderError::Unsupported {
                    resource_type: urn.resource_type().clone(),
                });
            }
        }

        Ok(outputs)
    }

    fn update(
        &self,
        urn: &Urn,
        outputs: &Properties,
        inputs: &Properties,
    ) -> Result<Properties, ProviderError> {
        self.lock().record(Action::Update, urn)?;
        let mut updated = outputs.clone();
        updated.extend(inputs.iter().map(|(name, value)| (name.clone(), value.clone())));
        Ok(updated)
    }

    fn delete(&self, urn: &Urn, outputs: &Properties) -> Result<(), ProviderError> {
        let mut inner = self.lock();
        inner.record(Action::Delete, urn)?;
        let field = |name: &str| outputs.get(name).and_then(Value::as_str).map(ToString::to_string);

        match urn.resource_type().as_str() {
            aws::HSM_CLUSTER => {
                if let Some(cluster) = field("cluster_id").and_then(|id| inner.clusters.remove(&id)) {
                    inner.security_groups.remove(&cluster.security_group_id);
                }
            }
            aws::HSM => {
                if let Some(hsm_id) = field("hsm_id") {
                    for cluster in inner.clusters.values_mut() {
                        cluster.hsms.remove(&hsm_id);
                    }
                }
            }
            aws::SECURITY_GROUP => {
                if let Some(id) = field("id") {
                    inner.security_groups.remove(&id);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn read(&self, urn: &Urn, args: &Properties) -> Result<Properties, ProviderError> {
        self.lock().record(Action::Read, urn)?;

        match urn.resource_type().as_str() {
            aws::GET_AVAILABILITY_ZONES => Ok(Properties::from([
                ("id".to_string(), json!("eu-central-1")),
                ("names".to_string(), json!(SIMULATED_ZONES)),
            ])),
            aws::GET_HSM_CLUSTER => {
                let cluster_id = string(urn, args, "cluster_id")?;
                let inner = self.lock();
                let Some(cluster) = inner.clusters.get(cluster_id) else {
                    return Err(Error::api(
                        "CloudHsmResourceNotFoundException",
                        format!("Cluster {cluster_id} not found"),
                    )
                    .into());
                };
                let certificates = match cluster.csr.as_ref() {
                    Some(csr) => json!([{ "cluster_csr": csr }]),
                    None => json!([]),
                };
                Ok(Properties::from([
                    ("cluster_id".to_string(), json!(cluster_id)),
                    ("cluster_certificates".to_string(), certificates),
                    ("cluster_state".to_string(), json!("UNINITIALIZED")),
                    ("security_group_id".to_string(), json!(cluster.security_group_id)),
                ]))
            }
            aws::GET_SECURITY_GROUP => {
                let name = string(urn, args, "name")?;
                let inner = self.lock();
                let Some((id, _)) = inner
                    .security_groups
                    .iter()
                    .find(|(_, group)| group.as_str() == name)
                else {
                    return Err(Error::api(
                        "InvalidGroup.NotFound",
                        format!("no matching SecurityGroup found for name {name}"),
                    )
                    .into());
                };
                Ok(Properties::from([
                    ("id".to_string(), json!(id)),
                    ("name".to_string(), json!(name)),
                ]))
            }
            aws::GET_AMI => self.select_image(urn, args),
            _ => Err(ProviderError::Unsupported {
                resource_type: urn.resource_type().clone(),
            }),
        }
    }

    fn replace_on_change(&self, resource_type: &ResourceType, field: &str) -> bool {
        let fields: &[&str] = match resource_type.as_str() {
            aws::VPC => &["cidr_block"],
            aws::SUBNET => &["availability_zone", "cidr_block", "vpc_id"],
            aws::INTERNET_GATEWAY | aws::ROUTE_TABLE => &["vpc_id"],
            aws::ROUTE_TABLE_ASSOCIATION => &["route_table_id", "subnet_id"],
            aws::HSM_CLUSTER => &["hsm_type", "mode", "subnet_ids"],
            aws::HSM => &["cluster_id", "subnet_id"],
            aws::KEY_PAIR => &["key_name", "public_key"],
            aws::SECURITY_GROUP => &["name", "vpc_id"],
            aws::SECURITY_GROUP_INGRESS_RULE => &["security_group_id"],
            aws::INSTANCE => &["ami", "key_name", "subnet_id", "user_data_base64"],
            _ => &[],
        };
        fields.contains(&field)
    }
}
