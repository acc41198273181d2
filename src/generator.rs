//! External week generator boundary.
//!
//! The generative step that invents workout content is a black box to the
//! engine: anything implementing `WeekGenerator` can supply replacement
//! weeks, and the engine validates shape only. The default implementation
//! asks the Claude API to draft weeks as structured JSON.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::plan::Week;
use crate::reconciler::validate_replacement;

/// ---------------------------------------------------------------------------
/// Configuration
/// ---------------------------------------------------------------------------

const CLAUDE_API_BASE: &str = "https://api.anthropic.com";
const CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";
const API_VERSION: &str = "2023-06-01";
const MAX_PLAN_TOKENS: u32 = 4096;

/// ---------------------------------------------------------------------------
/// Error Types
/// ---------------------------------------------------------------------------

#[derive(Error, Debug, Serialize)]
pub enum GeneratorError {
  #[error("API key not configured")]
  MissingApiKey,

  #[error("Request failed: {0}")]
  Request(String),

  #[error("API error: {0}")]
  Api(String),

  #[error("Parse error: {0}")]
  Parse(String),

  #[error("Generated plan rejected: {0}")]
  InvalidPlan(String),
}

/// ---------------------------------------------------------------------------
/// Generator Interface
/// ---------------------------------------------------------------------------

/// Athlete preferences handed to the generator. Opaque to the engine;
/// only the generator interprets these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AthleteProfile {
  pub goal: String,
  pub experience: String,
  pub days_per_week: u8,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub current_weekly_mileage: Option<f64>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
}

/// Source of candidate replacement weeks, from `from_week` onward.
/// Implementations must return already-shaped `Week`s; the engine checks
/// only that the list is non-empty and every week has workouts.
#[async_trait]
pub trait WeekGenerator: Send + Sync {
  async fn generate_weeks(
    &self,
    profile: &AthleteProfile,
    from_week: u32,
    week_count: u32,
  ) -> Result<Vec<Week>, GeneratorError>;
}

/// ---------------------------------------------------------------------------
/// Claude API Types
/// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ClaudeRequest {
  model: String,
  max_tokens: u32,
  system: String,
  messages: Vec<ClaudeMessage>,
}

#[derive(Debug, Serialize)]
struct ClaudeMessage {
  role: String,
  content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
  content: Vec<ContentBlock>,
  #[allow(dead_code)]
  model: String,
  #[allow(dead_code)]
  stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
  #[serde(rename = "type")]
  content_type: String,
  text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorResponse {
  error: ClaudeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorDetail {
  message: String,
}

/// Envelope the model is instructed to emit
#[derive(Debug, Deserialize)]
struct GeneratedWeeks {
  weeks: Vec<Week>,
}

/// ---------------------------------------------------------------------------
/// Claude Plan Generator
/// ---------------------------------------------------------------------------

pub struct ClaudePlanGenerator {
  client: Client,
  api_key: String,
  base_url: String,
}

impl ClaudePlanGenerator {
  /// Create a generator, loading the API key from the environment
  pub fn from_env() -> Result<Self, GeneratorError> {
    dotenvy::dotenv().ok();
    let api_key =
      std::env::var("ANTHROPIC_API_KEY").map_err(|_| GeneratorError::MissingApiKey)?;
    Ok(Self::with_base_url(api_key, CLAUDE_API_BASE))
  }

  pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
    Self {
      client: Client::new(),
      api_key: api_key.into(),
      base_url: base_url.into(),
    }
  }

  async fn complete(&self, system_prompt: &str, user_message: &str) -> Result<String, GeneratorError> {
    let request = ClaudeRequest {
      model: CLAUDE_MODEL.to_string(),
      max_tokens: MAX_PLAN_TOKENS,
      system: system_prompt.to_string(),
      messages: vec![ClaudeMessage {
        role: "user".to_string(),
        content: user_message.to_string(),
      }],
    };

    let response = self
      .client
      .post(format!("{}/v1/messages", self.base_url))
      .header("x-api-key", &self.api_key)
      .header("anthropic-version", API_VERSION)
      .header("content-type", "application/json")
      .json(&request)
      .send()
      .await
      .map_err(|e| GeneratorError::Request(e.to_string()))?;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| GeneratorError::Request(e.to_string()))?;

    if !status.is_success() {
      if let Ok(error_resp) = serde_json::from_str::<ClaudeErrorResponse>(&body) {
        return Err(GeneratorError::Api(error_resp.error.message));
      }
      return Err(GeneratorError::Api(format!("HTTP {}: {}", status, body)));
    }

    let claude_response: ClaudeResponse =
      serde_json::from_str(&body).map_err(|e| GeneratorError::Parse(e.to_string()))?;

    claude_response
      .content
      .iter()
      .find(|c| c.content_type == "text")
      .and_then(|c| c.text.clone())
      .ok_or_else(|| GeneratorError::Parse("No text content in response".to_string()))
  }
}

#[async_trait]
impl WeekGenerator for ClaudePlanGenerator {
  async fn generate_weeks(
    &self,
    profile: &AthleteProfile,
    from_week: u32,
    week_count: u32,
  ) -> Result<Vec<Week>, GeneratorError> {
    let system_prompt = include_str!("prompts/planner_system.txt");

    let profile_json =
      serde_json::to_string_pretty(profile).map_err(|e| GeneratorError::Parse(e.to_string()))?;
    let user_message = format!(
      r#"Draft {} training weeks, starting at week number {}.

ATHLETE PROFILE:
{}

Respond with valid JSON matching the OUTPUT FORMAT specified in your instructions."#,
      week_count, from_week, profile_json
    );

    let response_text = self.complete(system_prompt, &user_message).await?;
    let json_str = extract_json(&response_text)?;

    let generated: GeneratedWeeks = serde_json::from_str(&json_str)
      .map_err(|e| GeneratorError::Parse(format!("{}: {}", e, json_str)))?;

    validate_replacement(&generated.weeks)
      .map_err(|e| GeneratorError::InvalidPlan(e.to_string()))?;

    Ok(generated.weeks)
  }
}

/// Extract JSON from a model response that may wrap it in markdown fences
fn extract_json(text: &str) -> Result<String, GeneratorError> {
  let trimmed = text.trim();
  if trimmed.starts_with('{') {
    return Ok(trimmed.to_string());
  }

  // Fenced block, with or without a language tag
  if let Some(fence_start) = text.find("```") {
    let after_fence = fence_start + 3;
    let content_start = text[after_fence..]
      .find('\n')
      .map(|i| after_fence + i + 1)
      .unwrap_or(after_fence);
    if let Some(end) = text[content_start..].find("```") {
      return Ok(text[content_start..content_start + end].trim().to_string());
    }
  }

  // Last resort: outermost brace span
  if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
    if start < end {
      return Ok(text[start..=end].to_string());
    }
  }

  Err(GeneratorError::Parse(
    "Could not extract JSON from response".to_string(),
  ))
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  fn week_json(number: u32) -> String {
    format!(
      r#"{{"week_number": {}, "phase": "base", "workouts": [
           {{"day": "Tuesday", "type": "tempo",
             "workout": {{"name": "6-Mile Tempo", "description": "Steady state"}}}}
         ]}}"#,
      number
    )
  }

  fn profile() -> AthleteProfile {
    AthleteProfile {
      goal: "Half marathon".to_string(),
      experience: "intermediate".to_string(),
      days_per_week: 5,
      current_weekly_mileage: Some(25.0),
      notes: None,
    }
  }

  #[test]
  fn test_extract_json_direct() {
    let input = r#"{"weeks": []}"#;
    assert!(extract_json(input).unwrap().contains("weeks"));
  }

  #[test]
  fn test_extract_json_fenced() {
    let input = "Here is your plan:\n\n```json\n{\"weeks\": []}\n```\n\nGood luck!";
    assert_eq!(extract_json(input).unwrap(), r#"{"weeks": []}"#);
  }

  #[test]
  fn test_extract_json_brace_span_fallback() {
    let input = r#"The plan is {"weeks": []} as requested."#;
    assert_eq!(extract_json(input).unwrap(), r#"{"weeks": []}"#);
  }

  #[test]
  fn test_extract_json_rejects_garbage() {
    assert!(extract_json("no json here").is_err());
  }

  #[tokio::test]
  async fn test_generate_weeks_parses_fenced_response() {
    let mut server = mockito::Server::new_async().await;
    let body = serde_json::json!({
      "content": [{
        "type": "text",
        "text": format!("```json\n{{\"weeks\": [{}, {}]}}\n```", week_json(1), week_json(2)),
      }],
      "model": CLAUDE_MODEL,
      "stop_reason": "end_turn",
      "usage": {"input_tokens": 10, "output_tokens": 20},
    });
    let mock = server
      .mock("POST", "/v1/messages")
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(body.to_string())
      .create_async()
      .await;

    let generator = ClaudePlanGenerator::with_base_url("test-key", server.url());
    let weeks = generator.generate_weeks(&profile(), 5, 2).await.unwrap();

    assert_eq!(weeks.len(), 2);
    assert_eq!(weeks[0].workouts[0].workout.name, "6-Mile Tempo");
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn test_generate_weeks_surfaces_api_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("POST", "/v1/messages")
      .with_status(500)
      .with_body(r#"{"error": {"message": "overloaded"}}"#)
      .create_async()
      .await;

    let generator = ClaudePlanGenerator::with_base_url("test-key", server.url());
    let err = generator.generate_weeks(&profile(), 5, 2).await;

    match err {
      Err(GeneratorError::Api(msg)) => assert_eq!(msg, "overloaded"),
      other => panic!("expected Api error, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_generate_weeks_rejects_empty_plan() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
      .mock("POST", "/v1/messages")
      .with_status(200)
      .with_body(
        serde_json::json!({
          "content": [{"type": "text", "text": "{\"weeks\": []}"}],
          "model": CLAUDE_MODEL,
          "stop_reason": "end_turn",
          "usage": {"input_tokens": 1, "output_tokens": 1},
        })
        .to_string(),
      )
      .create_async()
      .await;

    let generator = ClaudePlanGenerator::with_base_url("test-key", server.url());
    let err = generator.generate_weeks(&profile(), 1, 8).await;
    assert!(matches!(err, Err(GeneratorError::InvalidPlan(_))));
  }

  #[test]
  #[serial_test::serial]
  fn test_from_env_requires_api_key() {
    temp_env::with_var("ANTHROPIC_API_KEY", None::<&str>, || {
      assert!(matches!(
        ClaudePlanGenerator::from_env(),
        Err(GeneratorError::MissingApiKey)
      ));
    });
  }
}
