use std::sync::Arc;

use anyhow::Result;

use super::netline::NetlinePortal;
use super::traits::PortalClient;
use crate::config::PortalConfig;
use crate::model::Airline;

/// Fixed table of portal clients, one slot per [`Airline`].
#[derive(Clone)]
pub struct PortalRegistry {
    abx: Arc<dyn PortalClient>,
    ati: Arc<dyn PortalClient>,
}

impl PortalRegistry {
    pub fn new(abx: Arc<dyn PortalClient>, ati: Arc<dyn PortalClient>) -> Self {
        Self { abx, ati }
    }

    /// Build the NetLine HTTP clients for every airline from configuration.
    pub fn from_config(config: &PortalConfig) -> Result<Self> {
        let build = |airline: Airline| -> Result<Arc<dyn PortalClient>> {
            let portal =
                NetlinePortal::new(airline, config.base_url(airline), config.request_timeout)?;
            Ok(Arc::new(portal))
        };
        Ok(Self {
            abx: build(Airline::Abx)?,
            ati: build(Airline::Ati)?,
        })
    }

    pub fn for_airline(&self, airline: Airline) -> Arc<dyn PortalClient> {
        match airline {
            Airline::Abx => Arc::clone(&self.abx),
            Airline::Ati => Arc::clone(&self.ati),
        }
    }
}
