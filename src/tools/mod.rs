//! Tool system for model interactions
//!
//! Tools are registered in a [`ToolRegistry`] and only ever run with
//! arguments that passed [`schema::parse_arguments`].

mod registry;
pub mod schema;
mod weather;

pub use registry::ToolRegistry;
pub use schema::SchemaError;
pub use weather::{HttpWeatherSource, WeatherSource, WeatherTool};

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::ToolDeclaration;

/// A tool that can be called by the model
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (matches the function name the model calls)
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters
    fn parameters(&self) -> Value;

    /// Execute the tool on validated arguments
    async fn execute(&self, input: Value) -> Result<String, eyre::Error>;

    /// Declaration sent to the model
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(self.name(), self.description(), self.parameters())
    }
}
