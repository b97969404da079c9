use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AgentflowError, Result};
use crate::llm::OpenAiConfig;
use crate::llm::openai::{DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::routing::route::standard_rules;
use crate::routing::{InvocationOptions, MatchMode, RouteRule, RouteSet, RouterOptions};
use crate::tools::{HttpWeatherSource, ToolRegistry, WeatherTool};
use crate::workflows::Persona;
use crate::workflows::evaluator::DEFAULT_MAX_ITERATIONS;
use crate::workflows::orchestrator::default_workers;
use crate::workflows::parallel::default_perspectives;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub llm: LlmConfig,
    pub router: RouterConfig,
    pub tools: ToolsConfig,
    pub evaluator: EvaluatorConfig,
    pub orchestrator: OrchestratorConfig,
    pub parallel: ParallelConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            llm: LlmConfig::default(),
            router: RouterConfig::default(),
            tools: ToolsConfig::default(),
            evaluator: EvaluatorConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            parallel: ParallelConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_ms: u64,
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout_ms: 120000,
            max_tokens: None,
        }
    }
}

impl LlmConfig {
    pub fn client_config(&self) -> OpenAiConfig {
        OpenAiConfig {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// Classifier settings and the route table
///
/// The classifier temperature is fixed, so unknown keys are rejected rather
/// than ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    pub model: Option<String>,
    pub max_tokens: u32,
    /// Priority order: the first rule matching the classifier output wins
    pub routes: Vec<RouteConfig>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        let options = RouterOptions::default();
        Self {
            model: None,
            max_tokens: options.max_tokens,
            routes: default_routes(),
        }
    }
}

impl RouterConfig {
    pub fn options(&self) -> RouterOptions {
        RouterOptions {
            max_tokens: self.max_tokens,
            model: self.model.clone(),
        }
    }

    pub fn route_set(&self) -> Result<RouteSet> {
        RouteSet::new(self.routes.iter().map(RouteConfig::rule).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub label: String,
    pub rule: String,
    #[serde(default, rename = "match")]
    pub matching: MatchMode,
    pub handler: HandlerConfig,
}

impl RouteConfig {
    pub fn rule(&self) -> RouteRule {
        RouteRule::new(self.label.clone(), self.rule.clone(), self.matching)
    }
}

/// How a route answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HandlerConfig {
    Plain {
        system_prompt: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        temperature: Option<f32>,
    },
    Tools {
        system_prompt: String,
        #[serde(default)]
        model: Option<String>,
        tools: Vec<String>,
    },
}

fn default_routes() -> Vec<RouteConfig> {
    let handlers = [
        HandlerConfig::Tools {
            system_prompt: "You are a helpful weather assistant. Use the weather function to provide accurate weather information.".to_string(),
            model: None,
            tools: vec!["get_weather".to_string()],
        },
        HandlerConfig::Plain {
            system_prompt: "You are a Reasoning Agent. Provide detailed, analytical responses with step-by-step explanations when appropriate.".to_string(),
            model: None,
            temperature: None,
        },
        HandlerConfig::Plain {
            system_prompt: "You are a Conversational Agent. Provide friendly, concise responses in a natural conversational tone.".to_string(),
            model: Some("gpt-4o-mini".to_string()),
            temperature: None,
        },
    ];

    standard_rules()
        .into_iter()
        .zip(handlers)
        .map(|(rule, handler)| RouteConfig {
            label: rule.label,
            rule: rule.rule,
            matching: rule.matching,
            handler,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Upper bound on a single tool execution
    pub timeout_ms: u64,
    pub weather_url: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            weather_url: "https://wttr.in".to_string(),
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn invocation_options(&self, model: Option<String>) -> InvocationOptions {
        InvocationOptions {
            tool_timeout: self.timeout(),
            temperature: None,
            model,
        }
    }

    /// Registry holding every built-in tool
    pub fn build_registry(&self) -> Result<ToolRegistry> {
        let weather = HttpWeatherSource::new(&self.weather_url, self.timeout())
            .map_err(|e| AgentflowError::Config(format!("{:#}", e)))?;
        ToolRegistry::new().with_tool(WeatherTool::new(weather))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    pub max_iterations: u32,
    pub model: Option<String>,
    /// Language named in the evaluator and optimizer prompts
    pub language: String,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            model: None,
            language: "Python".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Planning and synthesis model
    pub model: Option<String>,
    pub workers: Vec<Persona>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model: None,
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Synthesis model
    pub model: Option<String>,
    pub perspectives: Vec<Persona>,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            model: None,
            perspectives: default_perspectives(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).map_err(|e| {
                AgentflowError::Config(format!("Failed to load config from {}: {}", path.display(), e))
            });
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_reproduce_standard_routes() {
        let config = Config::default();
        let routes = config.router.route_set().unwrap();
        assert_eq!(routes, RouteSet::standard());
        assert_eq!(config.router.options(), RouterOptions::default());
        assert!(matches!(
            &config.router.routes[0].handler,
            HandlerConfig::Tools { tools, .. } if tools == &vec!["get_weather".to_string()]
        ));
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let file = write_config("llm:\n  model: gpt-4o-mini\nevaluator:\n  max_iterations: 3\n");
        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();

        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.evaluator.max_iterations, 3);
        assert_eq!(config.evaluator.language, "Python");
        assert_eq!(config.router.routes.len(), 3);
        assert_eq!(config.orchestrator.workers.len(), 2);
    }

    #[test]
    fn test_load_custom_routes() {
        let yaml = r#"
router:
  max_tokens: 10
  routes:
    - label: billing
      rule: the request is about invoices or payments
      handler:
        kind: plain
        system_prompt: You are a billing assistant.
        temperature: 0.3
    - label: weather
      rule: the request is about weather
      match: contains
      handler:
        kind: tools
        system_prompt: Use the weather tool.
        tools: [get_weather]
"#;
        let file = write_config(yaml);
        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();

        assert_eq!(config.router.max_tokens, 10);
        let routes = config.router.route_set().unwrap();
        assert_eq!(routes.labels(), vec!["billing", "weather"]);
        assert_eq!(routes.rules()[1].matching, MatchMode::Contains);
        assert_eq!(
            config.router.routes[0].handler,
            HandlerConfig::Plain {
                system_prompt: "You are a billing assistant.".to_string(),
                model: None,
                temperature: Some(0.3),
            }
        );
    }

    #[test]
    fn test_router_temperature_is_not_configurable() {
        let file = write_config("router:\n  temperature: 0.7\n");
        let err = Config::load(Some(&file.path().to_path_buf())).unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yml");
        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("absent.yml"));
    }

    #[test]
    fn test_load_invalid_yaml_fails() {
        let file = write_config("router:\n  routes:\n    - label: x\n      handler:\n        kind: magic\n");
        assert!(Config::load(Some(&file.path().to_path_buf())).is_err());
    }

    #[test]
    fn test_llm_client_config() {
        let llm = LlmConfig {
            timeout_ms: 5000,
            max_tokens: Some(256),
            ..LlmConfig::default()
        };
        let client_config = llm.client_config();
        assert_eq!(client_config.timeout, Duration::from_secs(5));
        assert_eq!(client_config.max_tokens, Some(256));
        assert_eq!(client_config.model, "gpt-4o");
    }

    #[test]
    fn test_build_registry() {
        let registry = ToolsConfig::default().build_registry().unwrap();
        assert_eq!(registry.tool_names(), vec!["get_weather"]);

        let bad = ToolsConfig {
            weather_url: "not a url".to_string(),
            ..ToolsConfig::default()
        };
        assert!(bad.build_registry().is_err());
    }

    #[test]
    fn test_yaml_round_trip_of_defaults() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, Config::default());
    }
}
