//! Subset of `lxc list --format json` used to discover managed instances.

use std::collections::HashMap;

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(super) struct LxcInstance {
    pub(super) name: String,
    #[serde(default)]
    pub(super) config: HashMap<String, String>,
}
