//! get_weather tool - current conditions for a city

use std::time::Duration;

use async_trait::async_trait;
use eyre::{WrapErr, eyre};
use reqwest::{Client, Url};
use serde_json::Value;

use super::Tool;

/// Where weather reports come from
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// One-line report of the current weather at `location`
    async fn current(&self, location: &str) -> eyre::Result<String>;
}

/// wttr.in-style HTTP weather service (`<base>/<location>?format=3`)
#[derive(Debug, Clone)]
pub struct HttpWeatherSource {
    client: Client,
    base_url: Url,
}

impl HttpWeatherSource {
    pub fn new(base_url: &str, timeout: Duration) -> eyre::Result<Self> {
        let base_url = Url::parse(base_url).wrap_err_with(|| format!("invalid weather url: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            return Err(eyre!("weather url cannot be a base: {}", base_url));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    fn report_url(&self, location: &str) -> eyre::Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| eyre!("weather url cannot be a base: {}", self.base_url))?;
            segments.pop_if_empty().push(location);
        }
        url.query_pairs_mut().append_pair("format", "3");
        Ok(url)
    }
}

#[async_trait]
impl WeatherSource for HttpWeatherSource {
    async fn current(&self, location: &str) -> eyre::Result<String> {
        let url = self.report_url(location)?;
        let report = self
            .client
            .get(url)
            .send()
            .await
            .wrap_err("weather service unreachable")?
            .error_for_status()
            .wrap_err("weather service returned an error")?
            .text()
            .await
            .wrap_err("failed to read weather report")?;

        Ok(report.trim().to_string())
    }
}

pub struct WeatherTool<S> {
    source: S,
}

impl<S: WeatherSource> WeatherTool<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

#[async_trait]
impl<S: WeatherSource + 'static> Tool for WeatherTool<S> {
    fn name(&self) -> &'static str {
        "get_weather"
    }

    fn description(&self) -> &'static str {
        "Get the current weather for a specific city"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "The city name to get weather for"
                }
            },
            "required": ["location"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, input: Value) -> Result<String, eyre::Error> {
        let location = input["location"]
            .as_str()
            .ok_or_else(|| eyre!("location is required"))?;

        self.source
            .current(location)
            .await
            .wrap_err_with(|| format!("weather lookup for {} failed", location))
    }
}
