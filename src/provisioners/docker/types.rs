//! Subset of `docker inspect` output compared against a container spec.

use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub(super) struct DockerInspect {
    #[serde(default)]
    pub(super) name: String,
    #[serde(default)]
    pub(super) config: InspectConfig,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub(super) mounts: Vec<InspectMount>,
    #[serde(default)]
    pub(super) host_config: InspectHostConfig,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub(super) struct InspectConfig {
    #[serde(default)]
    pub(super) image: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub(super) cmd: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub(super) struct InspectMount {
    #[serde(default)]
    pub(super) source: String,
    #[serde(default)]
    pub(super) destination: String,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub(super) struct InspectHostConfig {
    #[serde(default)]
    pub(super) restart_policy: RestartPolicy,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub(super) struct RestartPolicy {
    #[serde(default)]
    pub(super) name: String,
}

// Docker prints `null` rather than `[]` for empty lists.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
