//! Demo tools with canned data.

use async_trait::async_trait;
use kestrel_contract::{ToolError, ToolResult, TypedTool};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WeatherArgs {
    /// City or place name.
    pub location: String,
}

pub struct GetWeatherTool;

#[async_trait]
impl TypedTool for GetWeatherTool {
    type Args = WeatherArgs;

    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather for a location"
    }

    async fn execute(&self, args: WeatherArgs) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::success(
            "get_weather",
            json!({
                "location": args.location,
                "conditions": "sunny",
                "temperature_c": 21
            }),
        ))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StockArgs {
    /// Ticker symbol, e.g. ACME.
    pub symbol: String,
}

pub struct GetStockPriceTool;

#[async_trait]
impl TypedTool for GetStockPriceTool {
    type Args = StockArgs;

    fn name(&self) -> &str {
        "get_stock_price"
    }

    fn description(&self) -> &str {
        "Get a stock quote for a ticker symbol"
    }

    async fn execute(&self, args: StockArgs) -> Result<ToolResult, ToolError> {
        // Deterministic canned quote so repeated demo runs are stable.
        let price = 40.0 + args.symbol.len() as f64 * 2.5;
        Ok(ToolResult::success(
            "get_stock_price",
            json!({"symbol": args.symbol.to_uppercase(), "price": price, "currency": "USD"}),
        ))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddArgs {
    pub a: f64,
    pub b: f64,
}

pub struct AddNumbersTool;

#[async_trait]
impl TypedTool for AddNumbersTool {
    type Args = AddArgs;

    fn name(&self) -> &str {
        "add_numbers"
    }

    fn description(&self) -> &str {
        "Add two numbers"
    }

    async fn execute(&self, args: AddArgs) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::success(
            "add_numbers",
            json!({"sum": args.a + args.b}),
        ))
    }
}
