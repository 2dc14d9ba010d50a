//! Mock API tests for the translation providers.
//!
//! HTTP-dependent paths are exercised against a local `wiremock` server
//! rather than live network calls (spec §10.5), matching the boundary
//! scenarios from spec §8 (items 2-5).

use bisub::config::{ConfigSnapshot, Provider};
use bisub::subtitle::Cue;
use bisub::translate::{create_translator, FreeTranslator, LlmTranslator};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cue(index: usize, text: &str) -> Cue {
    Cue {
        index,
        start: Duration::from_secs(index as u64),
        end: Duration::from_secs(index as u64 + 1),
        text: text.to_string(),
    }
}

fn llm_config(base_url: String) -> ConfigSnapshot {
    let mut config = ConfigSnapshot::default();
    config.provider = Provider::Llm;
    config.base_url = base_url;
    config.api_key = "test-key".to_string();
    config.model = "test-model".to_string();
    config
}

fn chat_response(content: &str, finish_reason: &str) -> serde_json::Value {
    serde_json::json!({
        "choices": [{
            "message": {"content": content},
            "finish_reason": finish_reason,
        }]
    })
}

mod llm_tests {
    use super::*;

    // Boundary scenario 2 (spec §8): single short cue, LLM provider.
    #[tokio::test]
    async fn single_cue_round_trips_through_translate_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("你好，世界", "stop")))
            .mount(&server)
            .await;

        let translator = LlmTranslator::new(&llm_config(server.uri()));
        let cues = vec![cue(1, "Hello world")];
        let translated = translator.translate_batch(&cues, "zh").await.unwrap();

        assert_eq!(translated.len(), 1);
        assert_eq!(translated[0].text, "Hello world\n你好，世界");
    }

    // Boundary scenario 3 (spec §8): two cues, multi-part `%%`-separated response.
    #[tokio::test]
    async fn two_cues_multi_part_response_maps_positionally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("你好\n%%\n世界", "stop")))
            .mount(&server)
            .await;

        let translator = LlmTranslator::new(&llm_config(server.uri()));
        let cues = vec![cue(1, "Hello"), cue(2, "World")];
        let translated = translator.translate_batch(&cues, "zh").await.unwrap();

        assert_eq!(translated[0].text, "Hello\n你好");
        assert_eq!(translated[1].text, "World\n世界");
    }

    // Boundary scenario 4 (spec §8): provider returns fewer parts than cues;
    // the remainder pad with the original text.
    #[tokio::test]
    async fn two_cues_single_part_response_pads_with_original() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("仅一行", "stop")))
            .mount(&server)
            .await;

        let translator = LlmTranslator::new(&llm_config(server.uri()));
        let cues = vec![cue(1, "Hello"), cue(2, "World")];
        let translated = translator.translate_batch(&cues, "zh").await.unwrap();

        assert_eq!(translated[0].text, "Hello\n仅一行");
        assert_eq!(translated[1].text, "World\nWorld");
    }

    // Boundary scenario 5 (spec §8): content-filtered batch passes through
    // untranslated; the job is not failed.
    #[tokio::test]
    async fn content_filtered_batch_falls_back_to_originals() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("", "content_filter")))
            .mount(&server)
            .await;

        let translator = LlmTranslator::new(&llm_config(server.uri()));
        let cues = vec![cue(1, "Hello"), cue(2, "World")];
        let translated = translator.translate_batch(&cues, "zh").await.unwrap();

        assert_eq!(translated[0].text, "Hello");
        assert_eq!(translated[1].text, "World");
    }

    #[tokio::test]
    async fn server_error_falls_back_to_originals_without_failing_the_job() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let translator = LlmTranslator::new(&llm_config(server.uri()));
        let cues = vec![cue(1, "Hello")];
        let translated = translator.translate_batch(&cues, "zh").await.unwrap();

        assert_eq!(translated[0].text, "Hello");
    }

    // Spec §6/§7: a 429 is retried with exponential backoff, not treated as
    // a hard failure.
    #[tokio::test]
    async fn rate_limited_response_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("你好", "stop")))
            .mount(&server)
            .await;

        let mut config = llm_config(server.uri());
        config.retry_base_delay_ms = 1;
        config.retry_max_delay_ms = 5;
        let translator = LlmTranslator::new(&config);
        let cues = vec![cue(1, "Hello")];
        let translated = translator.translate_batch(&cues, "zh").await.unwrap();

        assert_eq!(translated[0].text, "Hello\n你好");
    }

    // Exhausting the 429 retry budget falls back to originals like any
    // other per-batch failure, rather than failing the whole job.
    #[tokio::test]
    async fn rate_limited_response_falls_back_after_exhausting_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let mut config = llm_config(server.uri());
        config.max_retries = 1;
        config.retry_base_delay_ms = 1;
        config.retry_max_delay_ms = 2;
        let translator = LlmTranslator::new(&config);
        let cues = vec![cue(1, "Hello")];
        let translated = translator.translate_batch(&cues, "zh").await.unwrap();

        assert_eq!(translated[0].text, "Hello");
    }

    #[tokio::test]
    async fn create_translator_selects_llm_from_config() {
        let server = MockServer::start().await;
        let translator = create_translator(&llm_config(server.uri()));
        assert_eq!(translator.name(), "llm");
    }
}

mod free_tests {
    use super::*;

    fn free_config(base_url: String) -> ConfigSnapshot {
        let mut config = ConfigSnapshot::default();
        config.provider = Provider::Free;
        config.base_url = base_url;
        config
    }

    #[tokio::test]
    async fn single_batch_round_trips() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("你好\n---SUBTITLE_SEPARATOR---\n世界"))
            .mount(&server)
            .await;

        let translator = FreeTranslator::new(&free_config(server.uri()));
        let cues = vec![cue(1, "Hello"), cue(2, "World")];
        let translated = translator.translate_batch(&cues, "zh").await.unwrap();

        assert_eq!(translated[0].text, "Hello\n你好");
        assert_eq!(translated[1].text, "World\n世界");
    }

    #[tokio::test]
    async fn retries_then_succeeds_after_transient_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("你好"))
            .mount(&server)
            .await;

        let translator = FreeTranslator::new(&free_config(server.uri()));
        let cues = vec![cue(1, "Hello")];
        let translated = translator.translate_batch(&cues, "zh").await.unwrap();

        assert_eq!(translated[0].text, "Hello\n你好");
    }

    #[tokio::test]
    async fn exhausted_retries_fall_back_to_originals() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/translate"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let translator = FreeTranslator::new(&free_config(server.uri()));
        let cues = vec![cue(1, "Hello")];
        let translated = translator.translate_batch(&cues, "zh").await.unwrap();

        assert_eq!(translated[0].text, "Hello");
    }
}
