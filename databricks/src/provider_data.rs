//! Provider data handed to every resource and data source factory

use crate::api::Client;
use crate::reconcile::StabilizationConfig;

#[derive(Clone)]
pub struct DatabricksProviderData {
    pub client: Client,
    /// Wait applied after creating objects that appear asynchronously
    pub stabilization: StabilizationConfig,
}

impl DatabricksProviderData {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            stabilization: StabilizationConfig::default(),
        }
    }

    pub fn with_stabilization(mut self, stabilization: StabilizationConfig) -> Self {
        self.stabilization = stabilization;
        self
    }
}
