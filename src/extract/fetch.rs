use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

use crate::error::ExtractError;

/// Where listing pages come from. Page 0 is the newest.
pub trait PageSource {
    fn fetch_page(&self, page: u32) -> Result<String, ExtractError>;
}

pub struct HttpPageSource {
    client: Client,
    listing_url: String,
}

impl HttpPageSource {
    pub fn new(listing_url: impl Into<String>, timeout: Duration) -> Result<Self, ExtractError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ani_regulations/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ExtractError::Client)?;
        Ok(Self {
            client,
            listing_url: listing_url.into(),
        })
    }
}

impl PageSource for HttpPageSource {
    fn fetch_page(&self, page: u32) -> Result<String, ExtractError> {
        let url = page_url(&self.listing_url, page);
        debug!(page, url = %url, "Fetching listing page");

        let response = match self.client.get(&url).send() {
            Ok(r) => r,
            Err(source) => return Err(ExtractError::Http { url, source }),
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::Status {
                url,
                status: status.as_u16(),
            });
        }

        response
            .text()
            .map_err(|source| ExtractError::Http { url, source })
    }
}

pub fn page_url(listing_url: &str, page: u32) -> String {
    if page == 0 {
        listing_url.to_string()
    } else {
        format!("{}&page={}", listing_url, page)
    }
}
