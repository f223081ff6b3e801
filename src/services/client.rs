use crate::{
    config::Config,
    error::{RavenError, Result},
};
use log::{debug, trace};
use reqwest::blocking::Client;

/// blocking client for the geoserver web services
pub struct Ows {
    client: Client,
    pub wfs_url: String,
    pub wcs_url: String,
    pub hybas_layer: String,
    pub dem_layer: String,
}

impl Ows {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder().timeout(config.http_timeout()).build()?;
        Ok(Self {
            client,
            wfs_url: config.wfs_url.clone(),
            wcs_url: config.wcs_url.clone(),
            hybas_layer: config.hybas_layer.clone(),
            dem_layer: config.dem_layer.clone(),
        })
    }

    /// send a key-value-pair request and return the raw body
    pub fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<u8>> {
        trace!("requesting {} with {:?}", url, query);
        let response = self.client.get(url).query(query).send()?;
        let status = response.status();
        let body = response.bytes()?.to_vec();
        debug!("{} answered {} with {} bytes", url, status, body.len());

        if !status.is_success() {
            return Err(RavenError::Service(format!(
                "{} answered {}: {}",
                url,
                status,
                String::from_utf8_lossy(&body)
            )));
        }
        if is_exception_report(&body) {
            return Err(RavenError::Service(
                String::from_utf8_lossy(&body).into_owned(),
            ));
        }
        Ok(body)
    }
}

/// geoserver reports failures as an xml document with a success status
pub fn is_exception_report(body: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&body[..body.len().min(512)]);
    let head = head.trim_start();
    head.starts_with('<') && head.contains("Exception")
}
