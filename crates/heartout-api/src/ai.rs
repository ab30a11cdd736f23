//! Writing assistant backed by an OpenAI-compatible chat-completions endpoint.
//!
//! Every call asks for a JSON object and the reply is coerced into a typed
//! shape, with defaults for whatever the model left out.

use std::time::Duration;

use anyhow::{Context, bail};
use axum::{Json, extract::State, response::IntoResponse};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, error};

use heartout_types::api::{
    CharacterRequest, GrammarCheck, GrammarCorrection, OutlineRequest, StoryIdea, StoryIdeasRequest, SuggestionKind,
    TextRequest, WritingSuggestion, WritingSuggestionsRequest,
};

use crate::error::{ApiError, ApiJson};
use crate::state::AppState;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Clone)]
pub struct AiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl AiClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>, model: Option<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("building AI HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: api_key.into(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }

    /// One system + user exchange. Returns the reply parsed as JSON (`{}` when empty).
    pub async fn complete_json(&self, system: &str, user: &str, temperature: f32) -> anyhow::Result<Value> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "response_format": { "type": "json_object" },
            "temperature": temperature,
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("AI provider unreachable")?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("AI provider returned {}: {}", status, text.chars().take(200).collect::<String>());
        }

        let completion: Completion = resp.json().await.context("unreadable AI provider response")?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_else(|| "{}".to_string());
        debug!("AI reply: {} bytes", content.len());
        serde_json::from_str(&content).context("AI reply was not valid JSON")
    }
}

// -- Prompts --

const IDEAS_SYSTEM: &str = "You are a creative writing assistant that generates compelling story ideas. \
    Respond with a JSON object of the exact format: {\"ideas\": [{\"title\": \"string\", \"premise\": \"string\", \
    \"genre\": \"string\", \"mood\": \"string\", \"characters\": [\"string\"], \"themes\": [\"string\"]}]}";

const GRAMMAR_SYSTEM: &str = "You are a professional editor. Check the text for grammar, spelling, and style issues. \
    Respond with JSON: {\"corrections\": [{\"original\": \"string\", \"corrected\": \"string\", \"explanation\": \"string\", \
    \"position\": number}], \"overall_score\": number, \"suggestions\": [\"string\"]}";

const CHARACTER_SYSTEM: &str = "You are a character development expert. Create a detailed character profile based on \
    the description. Respond with JSON: {\"name\": \"string\", \"age\": number, \"background\": \"string\", \
    \"personality\": \"string\", \"motivation\": \"string\", \"conflicts\": \"string\", \"appearance\": \"string\", \
    \"quirks\": [\"string\"]}";

const MOOD_SYSTEM: &str = "You are a literary analyst. Analyze the mood and tone of the text. Respond with JSON: \
    {\"mood\": \"string\", \"tone\": \"string\", \"emotions\": [\"string\"], \"atmosphere\": \"string\", \
    \"suggestions\": [\"string\"]}";

fn suggestion_prompts(kind: SuggestionKind, text: &str) -> (String, String) {
    let (role, label, ask) = match kind {
        SuggestionKind::Improve => (
            "You are an expert writing coach. Analyze the provided text and suggest specific improvements for clarity, style, pacing, and engagement.",
            "improvement",
            "Please provide 2-3 specific suggestions to improve this text",
        ),
        SuggestionKind::Continue => (
            "You are a creative writing assistant. Provide suggestions for how to continue this story naturally.",
            "continuation",
            "Suggest 2-3 ways to continue this story",
        ),
        SuggestionKind::Alternative => (
            "You are a creative writing assistant. Provide alternative approaches or phrasings for the given text.",
            "alternative",
            "Provide 2-3 alternative approaches for this text",
        ),
    };
    let system = format!(
        "{} Respond with JSON: {{\"suggestions\": [{{\"type\": \"{}\", \"suggestion\": \"string\", \"explanation\": \"string\"}}]}}",
        role, label
    );
    (system, format!("{}: \"{}\"", ask, text))
}

fn outline_system(chapters: u32) -> String {
    format!(
        "You are a story structure expert. Create a detailed {}-chapter outline. Respond with JSON: \
         {{\"title\": \"string\", \"chapters\": [{{\"number\": number, \"title\": \"string\", \"summary\": \"string\", \
         \"key_events\": [\"string\"]}}], \"themes\": [\"string\"], \"character_arcs\": [\"string\"]}}",
        chapters
    )
}

// -- Reply shaping --

/// Items of `reply[key]` that deserialize into `T`; anything else is skipped.
fn typed_list<T: DeserializeOwned>(reply: &Value, key: &str) -> Vec<T> {
    reply
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_ideas(reply: &Value) -> Vec<StoryIdea> {
    typed_list(reply, "ideas")
}

pub fn parse_suggestions(reply: &Value) -> Vec<WritingSuggestion> {
    typed_list(reply, "suggestions")
}

/// Missing score counts as a clean 100; anything else is clamped to 0..=100.
pub fn parse_grammar(reply: &Value) -> GrammarCheck {
    let overall_score = reply
        .get("overall_score")
        .and_then(Value::as_f64)
        .unwrap_or(100.0)
        .clamp(0.0, 100.0);
    GrammarCheck {
        corrections: typed_list::<GrammarCorrection>(reply, "corrections"),
        overall_score,
        suggestions: typed_list::<String>(reply, "suggestions"),
    }
}

/// Free-form replies must at least be objects.
pub fn as_object(reply: Value) -> Value {
    if reply.is_object() { reply } else { json!({}) }
}

// -- Handlers --

fn client(state: &AppState) -> Result<AiClient, ApiError> {
    state
        .ai
        .clone()
        .ok_or_else(|| ApiError::Unavailable("AI assistant is not configured".into()))
}

fn require(value: &str, message: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(message.into()));
    }
    Ok(())
}

fn failed(what: &'static str) -> impl FnOnce(anyhow::Error) -> ApiError {
    move |e| {
        error!("AI request failed ({}): {:#}", what, e);
        ApiError::Internal(format!("Failed to {}", what))
    }
}

pub async fn story_ideas(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<StoryIdeasRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&req.prompt, "Prompt is required")?;
    let ai = client(&state)?;
    let count = req.count.unwrap_or(3).clamp(1, 10);

    let user = format!(
        "Generate {} unique and engaging story ideas based on this prompt: \"{}\". \
         Each story should be different in genre, mood, and approach.",
        count, req.prompt
    );
    let reply = ai
        .complete_json(IDEAS_SYSTEM, &user, 0.8)
        .await
        .map_err(failed("generate story ideas"))?;

    Ok(Json(json!({ "ideas": parse_ideas(&reply) })))
}

pub async fn writing_suggestions(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<WritingSuggestionsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&req.text, "Text is required")?;
    let ai = client(&state)?;

    let (system, user) = suggestion_prompts(req.kind, &req.text);
    let reply = ai
        .complete_json(&system, &user, 0.7)
        .await
        .map_err(failed("get writing suggestions"))?;

    Ok(Json(json!({ "suggestions": parse_suggestions(&reply) })))
}

pub async fn grammar_check(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<TextRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&req.text, "Text is required")?;
    let ai = client(&state)?;

    let user = format!("Please check this text for grammar and style issues: \"{}\"", req.text);
    let reply = ai
        .complete_json(GRAMMAR_SYSTEM, &user, 0.3)
        .await
        .map_err(failed("check grammar"))?;

    Ok(Json(parse_grammar(&reply)))
}

pub async fn character(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CharacterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&req.description, "Character description is required")?;
    let ai = client(&state)?;

    let user = format!("Create a detailed character based on this description: \"{}\"", req.description);
    let reply = ai
        .complete_json(CHARACTER_SYSTEM, &user, 0.8)
        .await
        .map_err(failed("generate character"))?;

    Ok(Json(json!({ "character": as_object(reply) })))
}

pub async fn mood_analysis(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<TextRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&req.text, "Text is required")?;
    let ai = client(&state)?;

    let user = format!("Analyze the mood and tone of this text: \"{}\"", req.text);
    let reply = ai
        .complete_json(MOOD_SYSTEM, &user, 0.5)
        .await
        .map_err(failed("analyze mood"))?;

    Ok(Json(json!({ "analysis": as_object(reply) })))
}

pub async fn outline(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<OutlineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require(&req.premise, "Story premise is required")?;
    let ai = client(&state)?;
    let chapters = req.chapters.unwrap_or(10).clamp(1, 50);

    let user = format!("Create a {}-chapter story outline for this premise: \"{}\"", chapters, req.premise);
    let reply = ai
        .complete_json(&outline_system(chapters), &user, 0.7)
        .await
        .map_err(failed("generate outline"))?;

    Ok(Json(json!({ "outline": as_object(reply) })))
}
