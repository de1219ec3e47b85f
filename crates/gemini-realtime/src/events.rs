use crate::types::ServerMessage;
use tandem_core::InboundEvent;
use tracing::{debug, warn};

/// Translates one server message into core events, in the order the session
/// must see them: transcriptions before audio, interruption and turn end last.
pub fn server_events(message: ServerMessage) -> Vec<InboundEvent> {
    let mut events = Vec::new();

    if message.setup_complete.is_some() {
        debug!("Gemini setup complete.");
        events.push(InboundEvent::Ready);
    }

    if let Some(go_away) = message.go_away {
        warn!(time_left = ?go_away.time_left, "Gemini announced the connection will end.");
    }

    let Some(content) = message.server_content else {
        return events;
    };

    if let Some(text) = content.input_transcription.and_then(|t| t.text) {
        if !text.is_empty() {
            events.push(InboundEvent::InputTranscription(text));
        }
    }
    if let Some(text) = content.output_transcription.and_then(|t| t.text) {
        if !text.is_empty() {
            events.push(InboundEvent::OutputTranscription(text));
        }
    }
    if let Some(turn) = content.model_turn {
        events.extend(
            turn.parts
                .into_iter()
                .filter_map(|part| part.inline_data)
                .map(|blob| InboundEvent::Audio(blob.data)),
        );
    }
    if content.interrupted == Some(true) {
        events.push(InboundEvent::Interrupted);
    }
    if content.turn_complete == Some(true) {
        events.push(InboundEvent::TurnComplete);
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(json: &str) -> Vec<InboundEvent> {
        server_events(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_setup_complete_is_ready() {
        assert_eq!(events(r#"{"setupComplete":{}}"#), vec![InboundEvent::Ready]);
    }

    #[test]
    fn test_content_order() {
        let json = r#"{
            "serverContent": {
                "turnComplete": true,
                "interrupted": true,
                "modelTurn": { "parts": [
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAAA" } },
                    { "text": "thinking" },
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "BBBB" } }
                ]},
                "outputTranscription": { "text": "Guten Morgen" },
                "inputTranscription": { "text": "Hallo" }
            }
        }"#;

        assert_eq!(
            events(json),
            vec![
                InboundEvent::InputTranscription("Hallo".into()),
                InboundEvent::OutputTranscription("Guten Morgen".into()),
                InboundEvent::Audio("AAAA".into()),
                InboundEvent::Audio("BBBB".into()),
                InboundEvent::Interrupted,
                InboundEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn test_empty_transcriptions_are_skipped() {
        let json = r#"{"serverContent":{"inputTranscription":{},"outputTranscription":{"text":""}}}"#;
        assert!(events(json).is_empty());
    }

    #[test]
    fn test_false_flags_produce_nothing() {
        let json = r#"{"serverContent":{"interrupted":false,"turnComplete":false}}"#;
        assert!(events(json).is_empty());
    }

    #[test]
    fn test_go_away_only_logs() {
        assert!(events(r#"{"goAway":{"timeLeft":"10s"}}"#).is_empty());
    }
}
