pub mod crawler;
pub mod demand;
pub mod errors;
pub mod listing;
pub mod meters;
pub mod session;

#[cfg(test)]
mod test_server;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::Url;

use crate::config::PortalConfig;
use session::Session;

pub const LISTING_PATH: &str = "/Portal/browser/vistadatos";
pub const METERS_COMPANIES_PATH: &str = "/Portal/mediciones/medidoresgeneracion/empresas";
pub const METERS_EXPORT_PATH: &str = "/Portal/mediciones/medidoresgeneracion/exportar";
pub const METERS_DOWNLOAD_PATH: &str = "/Portal/mediciones/medidoresgeneracion/descargar";
pub const DEMAND_PATH: &str = "/Portal/portalinformacion/Demanda";

/// Date format the portal expects in request parameters
pub const REQUEST_DATE_FORMAT: &str = "%d/%m/%Y";

/// A borrowed session bound to the portal host.
///
/// Every crawler and fetch operation takes one of these, so the session
/// is created once by the caller and reused for all requests.
#[derive(Debug, Clone)]
pub struct Portal<'a> {
    session: &'a Session,
    base_url: Url,
}

impl<'a> Portal<'a> {
    pub fn new(session: &'a Session, config: &PortalConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid portal base url: {}", config.base_url))?;
        Ok(Self { session, base_url })
    }

    pub fn session(&self) -> &'a Session {
        self.session
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute url of a portal endpoint path
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Failed to build url for {}", path))
    }
}

pub fn format_request_date(date: NaiveDate) -> String {
    date.format(REQUEST_DATE_FORMAT).to_string()
}
