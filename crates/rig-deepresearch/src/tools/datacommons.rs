//! Data Commons provider - statistical data capability
//!
//! Exposes observation lookups from the Data Commons REST API (v2) as the
//! `statistical_data` capability. Each (variable, entity) observation series
//! becomes one citable source.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ToolError;
use crate::gateway::{SourceRef, ToolDefinition, ToolOutput, ToolProvider};

const DEFAULT_BASE_URL: &str = "https://api.datacommons.org";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Observations kept per series in the rendered output
const MAX_OBSERVATIONS: usize = 10;

/// `statistical_data` provider backed by Data Commons.
pub struct DataCommonsProvider {
    api_key: String,
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl DataCommonsProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Create from DC_API_KEY; absent or blank keys disable the capability.
    pub fn from_env() -> Option<Self> {
        std::env::var("DC_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(Self::new)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn fetch(&self, args: &ObservationArgs) -> Result<ObservationResponse, ToolError> {
        let mut query: Vec<(&str, String)> = vec![
            ("key", self.api_key.clone()),
            ("date", args.date.clone()),
            ("variable.dcids", args.variable.clone()),
            ("select", "entity".to_string()),
            ("select", "variable".to_string()),
            ("select", "date".to_string()),
            ("select", "value".to_string()),
        ];
        for entity in &args.entities {
            query.push(("entity.dcids", entity.clone()));
        }

        let response = self
            .client
            .get(format!("{}/v2/observation", self.base_url))
            .query(&query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout(self.timeout.as_millis() as u64)
                } else {
                    ToolError::Unavailable(format!("Data Commons: {}", e))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| ToolError::Unknown(format!("Data Commons: bad response: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            429 => ToolError::RateLimited(format!("Data Commons: {}", body)),
            400 | 404 => ToolError::InvalidArguments(format!("Data Commons: {}", body)),
            401 | 403 | 500..=599 => ToolError::Unavailable(format!("Data Commons HTTP {}: {}", status, body)),
            _ => ToolError::Unknown(format!("Data Commons HTTP {}: {}", status, body)),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ObservationArgs {
    /// Statistical variable dcid, e.g. "Amount_EconomicActivity_GrossDomesticProduction_Nominal"
    variable: String,
    /// Place dcids, e.g. ["country/FRA", "country/DEU"]
    entities: Vec<String>,
    /// "LATEST", "" for all dates, or a specific date
    #[serde(default = "default_date")]
    date: String,
}

fn default_date() -> String {
    "LATEST".to_string()
}

#[derive(Debug, Deserialize)]
struct ObservationResponse {
    #[serde(rename = "byVariable", default)]
    by_variable: BTreeMap<String, VariableObservations>,
}

#[derive(Debug, Deserialize)]
struct VariableObservations {
    #[serde(rename = "byEntity", default)]
    by_entity: BTreeMap<String, EntityObservations>,
}

#[derive(Debug, Deserialize)]
struct EntityObservations {
    #[serde(rename = "orderedFacets", default)]
    ordered_facets: Vec<Facet>,
}

#[derive(Debug, Deserialize)]
struct Facet {
    #[serde(default)]
    observations: Vec<Observation>,
}

#[derive(Debug, Clone, Deserialize)]
struct Observation {
    date: String,
    value: f64,
}

#[async_trait]
impl ToolProvider for DataCommonsProvider {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "statistical_data".to_string(),
            description: "Query official statistics (Data Commons) for a statistical variable across places. Cite results by their datacommons: id.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "variable": {
                        "type": "string",
                        "description": "Statistical variable dcid, e.g. 'Count_Person' or 'Amount_EconomicActivity_GrossDomesticProduction_Nominal'"
                    },
                    "entities": {
                        "type": "array",
                        "items": {"type": "string"},
                        "minItems": 1,
                        "description": "Place dcids, e.g. ['country/FRA']"
                    },
                    "date": {
                        "type": "string",
                        "description": "'LATEST' (default), '' for the full series, or a date such as '2023'"
                    }
                },
                "required": ["variable", "entities"]
            }),
        }
    }

    async fn invoke(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        let args: ObservationArgs = serde_json::from_value(arguments)?;
        if args.variable.trim().is_empty() || args.entities.is_empty() {
            return Err(ToolError::InvalidArguments(
                "variable and at least one entity are required".to_string(),
            ));
        }

        debug!(variable = %args.variable, entities = args.entities.len(), "Querying Data Commons");
        let response = self.fetch(&args).await?;

        let mut series = Vec::new();
        let mut sources = Vec::new();
        for (variable, by_entity) in &response.by_variable {
            for (entity, observations) in &by_entity.by_entity {
                // First facet is the preferred source for the series.
                let Some(facet) = observations.ordered_facets.first() else {
                    continue;
                };
                let mut points = facet.observations.clone();
                points.sort_by(|a, b| b.date.cmp(&a.date));
                points.truncate(MAX_OBSERVATIONS);
                let Some(latest) = points.first() else {
                    continue;
                };

                sources.push(
                    SourceRef::new(
                        format!("datacommons:{}/{}", variable, entity),
                        format!("Data Commons: {} for {}", variable, entity),
                    )
                    .with_locator(latest.date.clone())
                    .with_snippet(format!("{} = {} ({})", variable, latest.value, latest.date)),
                );
                let observations: Vec<Value> = points
                    .iter()
                    .map(|p| json!({"date": p.date, "value": p.value}))
                    .collect();
                series.push(json!({
                    "variable": variable,
                    "entity": entity,
                    "observations": observations,
                }));
            }
        }

        if series.is_empty() {
            return Ok(ToolOutput::text(format!(
                "No observations for {} in {}",
                args.variable,
                args.entities.join(", ")
            )));
        }

        Ok(ToolOutput::structured(json!({ "series": series })).with_sources(sources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolErrorKind;
    use crate::gateway::ToolContent;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gdp_response() -> Value {
        json!({
            "byVariable": {
                "GrowthRate_GDP": {
                    "byEntity": {
                        "country/FRA": {
                            "orderedFacets": [{
                                "facetId": "123",
                                "observations": [
                                    {"date": "2023", "value": 0.9},
                                    {"date": "2024", "value": 1.1}
                                ]
                            }]
                        },
                        "country/DEU": {
                            "orderedFacets": []
                        }
                    }
                }
            },
            "facets": {}
        })
    }

    #[tokio::test]
    async fn test_observations_become_sources() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/observation"))
            .and(query_param("key", "dc-key"))
            .and(query_param("variable.dcids", "GrowthRate_GDP"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gdp_response()))
            .mount(&server)
            .await;

        let provider = DataCommonsProvider::new("dc-key").with_base_url(server.uri());
        let output = provider
            .invoke(json!({"variable": "GrowthRate_GDP", "entities": ["country/FRA", "country/DEU"]}))
            .await
            .unwrap();

        assert_eq!(output.sources.len(), 1);
        assert_eq!(output.sources[0].source_id, "datacommons:GrowthRate_GDP/country/FRA");
        assert_eq!(output.sources[0].locator.as_deref(), Some("2024"));
        match output.content {
            ToolContent::Structured(value) => {
                assert_eq!(value["series"][0]["observations"][0]["value"], json!(1.1));
            }
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_tool_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;

        let provider = DataCommonsProvider::new("dc-key").with_base_url(server.uri());
        let err = provider
            .invoke(json!({"variable": "Count_Person", "entities": ["country/USA"]}))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ToolErrorKind::RateLimited);
    }

    #[tokio::test]
    async fn test_requires_entities() {
        let provider = DataCommonsProvider::new("dc-key");
        let err = provider
            .invoke(json!({"variable": "Count_Person", "entities": []}))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ToolErrorKind::InvalidArguments);
    }

    #[tokio::test]
    async fn test_empty_response_is_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"byVariable": {}})))
            .mount(&server)
            .await;

        let provider = DataCommonsProvider::new("dc-key").with_base_url(server.uri());
        let output = provider
            .invoke(json!({"variable": "Count_Person", "entities": ["country/USA"]}))
            .await
            .unwrap();

        assert!(output.sources.is_empty());
        assert!(output.content.render().starts_with("No observations"));
    }
}
