//! Clients for the external speech-to-text and chat-completion services.

use std::time::Duration;

use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{ChatApiConfig, SpeechApiConfig};
use crate::error::ApiError;

const SPEECH_TIMEOUT: Duration = Duration::from_secs(30);
const CHAT_TIMEOUT: Duration = Duration::from_secs(60);
const NOT_DOCUMENTED: &str = "Not documented";
const DEFAULT_SUMMARY: &str = "Consultation completed.";
const ANALYSIS_FAILED: &str = "Failed to analyze consultation";

const SYSTEM_PROMPT: &str = "You are a medical AI assistant. Analyze consultation transcript and generate SOAP notes and summary.";

#[derive(Debug, Deserialize)]
pub struct ConsultationAnalysis {
    pub transcript: String,
    pub patient_context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoapNote {
    pub subjective: String,
    pub objective: String,
    pub assessment: String,
    pub plan: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoapResponse {
    pub soap_note: SoapNote,
    pub patient_summary: String,
}

/// Outcome of a transcription request. Upstream failures are reported here
/// rather than as HTTP errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TranscriptionResult {
    fn success(text: String, language: String) -> Self {
        TranscriptionResult {
            text,
            status: "success".into(),
            language: Some(language),
            error: None,
            detail: None,
        }
    }

    fn failure(error: String, detail: Option<String>) -> Self {
        TranscriptionResult {
            text: String::new(),
            status: "error".into(),
            language: None,
            error: Some(error),
            detail,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    #[serde(default)]
    transcript: String,
    language_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialSoapNote {
    subjective: Option<String>,
    objective: Option<String>,
    assessment: Option<String>,
    plan: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialSoapResponse {
    #[serde(default)]
    soap_note: PartialSoapNote,
    patient_summary: Option<String>,
}

/// Parses the model's JSON answer, filling gaps with placeholders.
pub fn parse_soap_content(content: &str) -> Result<SoapResponse, serde_json::Error> {
    let parsed: PartialSoapResponse = serde_json::from_str(content)?;
    let field = |v: Option<String>| v.unwrap_or_else(|| NOT_DOCUMENTED.to_string());
    Ok(SoapResponse {
        soap_note: SoapNote {
            subjective: field(parsed.soap_note.subjective),
            objective: field(parsed.soap_note.objective),
            assessment: field(parsed.soap_note.assessment),
            plan: field(parsed.soap_note.plan),
        },
        patient_summary: parsed
            .patient_summary
            .unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
    })
}

pub fn consultation_prompt(req: &ConsultationAnalysis) -> String {
    format!(
        "Transcript: {}\nContext: {}\nJSON Format: {{\"soap_note\": {{\"subjective\": \"...\", \"objective\": \"...\", \"assessment\": \"...\", \"plan\": \"...\"}}, \"patient_summary\": \"...\"}}",
        req.transcript,
        req.patient_context.as_deref().unwrap_or("None"),
    )
}

#[derive(Clone)]
pub struct AiClient {
    http: Client,
    speech: SpeechApiConfig,
    chat: ChatApiConfig,
}

impl AiClient {
    pub fn new(speech: SpeechApiConfig, chat: ChatApiConfig) -> Self {
        AiClient { http: Client::new(), speech, chat }
    }

    /// Sends audio to the speech API. Only missing configuration is an
    /// error; everything else comes back as a failed [`TranscriptionResult`].
    pub async fn transcribe(&self, audio: Vec<u8>) -> Result<TranscriptionResult, ApiError> {
        let api_key = self
            .speech
            .api_key
            .as_deref()
            .ok_or_else(|| ApiError::Config("Sarvam API key not configured".into()))?;

        match self.send_audio(api_key, audio).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::error!("Transcription failed: {}", e);
                Ok(TranscriptionResult::failure(e.to_string(), None))
            }
        }
    }

    async fn send_audio(&self, api_key: &str, audio: Vec<u8>) -> Result<TranscriptionResult, reqwest::Error> {
        let file = Part::bytes(audio).file_name("audio.wav").mime_str("audio/wav")?;
        let form = Form::new()
            .part("file", file)
            .text("model", self.speech.model.clone())
            .text("language_code", self.speech.language_code.clone())
            .text("with_diarization", "false");

        let response = self
            .http
            .post(&self.speech.api_url)
            .header("api-subscription-key", api_key)
            .multipart(form)
            .timeout(SPEECH_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!("Speech API answered {}: {}", status, detail);
            return Ok(TranscriptionResult::failure(
                format!("Speech API error: {}", status.as_u16()),
                Some(detail),
            ));
        }

        let body: SpeechResponse = response.json().await?;
        let language = body
            .language_code
            .unwrap_or_else(|| self.speech.language_code.clone());
        Ok(TranscriptionResult::success(body.transcript, language))
    }

    /// Turns a consultation transcript into a SOAP note and summary.
    pub async fn analyze(&self, req: &ConsultationAnalysis) -> Result<SoapResponse, ApiError> {
        let api_key = self
            .chat
            .api_key
            .as_deref()
            .ok_or_else(|| ApiError::Config("OpenAI API key not configured".into()))?;
        let upstream = |message: String| {
            tracing::error!("Consultation analysis failed: {}", message);
            ApiError::Upstream { context: ANALYSIS_FAILED.into(), message }
        };

        let body = json!({
            "model": self.chat.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": consultation_prompt(req)},
            ],
            "response_format": {"type": "json_object"},
            "temperature": 0.3,
        });

        let response = self
            .http
            .post(&self.chat.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .timeout(CHAT_TIMEOUT)
            .send()
            .await
            .map_err(|e| upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(upstream(format!("chat API answered {}: {}", status.as_u16(), detail)));
        }

        let completion: ChatCompletion = response.json().await.map_err(|e| upstream(e.to_string()))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| upstream("chat API returned no content".into()))?;
        parse_soap_content(&content).map_err(|e| upstream(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DEFAULT_CHAT_API_URL, DEFAULT_CHAT_MODEL, DEFAULT_SPEECH_API_URL, DEFAULT_SPEECH_LANGUAGE,
        DEFAULT_SPEECH_MODEL,
    };

    fn unconfigured() -> AiClient {
        AiClient::new(
            SpeechApiConfig {
                api_key: None,
                api_url: DEFAULT_SPEECH_API_URL.into(),
                model: DEFAULT_SPEECH_MODEL.into(),
                language_code: DEFAULT_SPEECH_LANGUAGE.into(),
            },
            ChatApiConfig {
                api_key: None,
                api_url: DEFAULT_CHAT_API_URL.into(),
                model: DEFAULT_CHAT_MODEL.into(),
            },
        )
    }

    #[test]
    fn parses_complete_soap_answer() {
        let content = r#"{
            "soap_note": {"subjective": "Cough for 3 days", "objective": "Temp 100.4F",
                          "assessment": "Viral URI", "plan": "Fluids, rest"},
            "patient_summary": "Likely viral infection."
        }"#;
        let parsed = parse_soap_content(content).unwrap();
        assert_eq!(parsed.soap_note.assessment, "Viral URI");
        assert_eq!(parsed.patient_summary, "Likely viral infection.");
    }

    #[test]
    fn fills_missing_fields_with_placeholders() {
        let parsed = parse_soap_content(r#"{"soap_note": {"plan": "Review in a week"}}"#).unwrap();
        assert_eq!(parsed.soap_note.subjective, NOT_DOCUMENTED);
        assert_eq!(parsed.soap_note.plan, "Review in a week");
        assert_eq!(parsed.patient_summary, DEFAULT_SUMMARY);

        let parsed = parse_soap_content("{}").unwrap();
        assert_eq!(parsed.soap_note.objective, NOT_DOCUMENTED);
    }

    #[test]
    fn rejects_non_json_answers() {
        assert!(parse_soap_content("Here is your note: ...").is_err());
    }

    #[test]
    fn prompt_includes_transcript_and_context() {
        let req = ConsultationAnalysis {
            transcript: "Patient complains of fever".into(),
            patient_context: None,
        };
        let prompt = consultation_prompt(&req);
        assert!(prompt.starts_with("Transcript: Patient complains of fever\nContext: None"));
        assert!(prompt.contains("\"patient_summary\""));
    }

    #[test]
    fn failure_payload_omits_language() {
        let value = serde_json::to_value(TranscriptionResult::failure("boom".into(), None)).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["text"], "");
        assert!(value.get("language").is_none());
    }

    #[actix_web::test]
    async fn missing_keys_are_configuration_errors() {
        let client = unconfigured();
        assert!(matches!(client.transcribe(vec![0u8; 4]).await, Err(ApiError::Config(_))));
        let req = ConsultationAnalysis { transcript: "hi".into(), patient_context: None };
        assert!(matches!(client.analyze(&req).await, Err(ApiError::Config(_))));
    }
}
