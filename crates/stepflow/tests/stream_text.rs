//! Streaming step-loop scenarios for `stream_text`.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{Value, json};

use stepflow::mock::{MockError, MockModel};
use stepflow::test_helpers::{mock_model, text_stream_parts, user_msg};
use stepflow::tool::{ToolError, tool_fn};
use stepflow::{
    Error, FinishReason, GenerateTextConfig, JsonSchema, ModelRequest, RetryPolicy, StreamPart,
    TextStreamPart, ToolCall, ToolDefinition, ToolRegistry, Usage, stream_text,
};

fn request() -> ModelRequest {
    ModelRequest {
        messages: vec![user_msg("go")],
        ..Default::default()
    }
}

fn config(max_steps: u32) -> GenerateTextConfig {
    GenerateTextConfig {
        max_steps,
        retry: RetryPolicy::none(),
        ..Default::default()
    }
}

fn label(part: &TextStreamPart) -> &'static str {
    match part {
        TextStreamPart::TextDelta(_) => "text",
        TextStreamPart::ToolCallStreamingStart { .. } => "call-start",
        TextStreamPart::ToolCallDelta { .. } => "call-delta",
        TextStreamPart::ToolCall(_) => "call",
        TextStreamPart::ToolResult(_) => "result",
        TextStreamPart::StepFinish { .. } => "step",
        TextStreamPart::Finish { .. } => "finish",
        TextStreamPart::Error(_) => "error",
        _ => "other",
    }
}

fn lookup_registry(delay: Duration) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(tool_fn(
        ToolDefinition {
            name: "lookup".into(),
            description: "Looks something up".into(),
            parameters: JsonSchema::new(json!({"type": "object"})),
        },
        move |_: Value| async move {
            tokio::time::sleep(delay).await;
            Ok::<_, ToolError>("found")
        },
    ));
    Arc::new(registry)
}

fn tool_step(model: &MockModel) {
    model.queue_stream(vec![
        StreamPart::TextDelta("Let me ".into()),
        StreamPart::TextDelta("check.".into()),
        StreamPart::ToolCall(ToolCall::new("c1", "lookup", json!({}))),
        StreamPart::Finish {
            reason: FinishReason::ToolCalls,
            usage: Usage::new(10, 5),
        },
    ]);
}

#[tokio::test]
async fn test_parts_arrive_in_order_across_steps() {
    let mock = Arc::new(mock_model("m"));
    tool_step(&mock);
    mock.queue_stream(text_stream_parts(&["Found ", "it."], FinishReason::Stop));

    let mut stream = stream_text(
        mock.clone(),
        lookup_registry(Duration::from_millis(20)),
        request(),
        config(3),
    );
    let parts: Vec<TextStreamPart> = (&mut stream).collect().await;
    let labels: Vec<&str> = parts.iter().map(label).collect();

    assert_eq!(
        labels,
        vec![
            "text", "text", "call", "result", "step", "text", "text", "step", "finish"
        ]
    );

    let result = stream.result.await.unwrap();
    assert_eq!(result.text, "Found it.");
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.usage, Usage::new(110, 55));
    assert_eq!(mock.recorded_calls().len(), 2);
}

#[tokio::test]
async fn test_usage_handle_matches_finish_part() {
    let mock = Arc::new(mock_model("m"));
    mock.queue_stream(text_stream_parts(&["hi"], FinishReason::Stop));

    let mut stream = stream_text(mock, Arc::new(ToolRegistry::new()), request(), config(1));
    let parts: Vec<TextStreamPart> = (&mut stream).collect().await;

    let Some(TextStreamPart::Finish { usage, finish_reason }) = parts.last() else {
        panic!("stream should end with a finish part");
    };
    assert_eq!(*finish_reason, FinishReason::Stop);
    assert_eq!(stream.usage.await.unwrap(), *usage);
}

#[tokio::test]
async fn test_continuation_holds_back_partial_word() {
    let mock = Arc::new(mock_model("m"));
    mock.queue_stream(vec![
        StreamPart::TextDelta("Hello wor".into()),
        StreamPart::Finish {
            reason: FinishReason::Length,
            usage: Usage::new(1, 1),
        },
    ]);
    mock.queue_stream(text_stream_parts(&["world!"], FinishReason::Stop));

    let config = GenerateTextConfig {
        continue_steps: true,
        ..config(2)
    };
    let mut stream = stream_text(mock, Arc::new(ToolRegistry::new()), request(), config);
    let deltas: Vec<String> = stream.text_stream().collect().await;

    assert_eq!(deltas, vec!["Hello ".to_owned(), "world!".to_owned()]);
    let result = stream.result.await.unwrap();
    assert_eq!(result.text, "Hello world!");
    assert_eq!(result.response_messages().len(), 1);
    assert_eq!(result.messages[1].text_content(), "Hello world!");
}

#[tokio::test]
async fn test_tool_call_streaming_emits_start_once() {
    let mock = Arc::new(mock_model("m"));
    mock.queue_stream(vec![
        StreamPart::ToolCallDelta {
            id: "c1".into(),
            name: "lookup".into(),
            args_delta: "{".into(),
        },
        StreamPart::ToolCallDelta {
            id: "c1".into(),
            name: "lookup".into(),
            args_delta: "}".into(),
        },
        StreamPart::ToolCall(ToolCall::new("c1", "lookup", json!({}))),
        StreamPart::Finish {
            reason: FinishReason::ToolCalls,
            usage: Usage::new(1, 1),
        },
    ]);

    let config = GenerateTextConfig {
        tool_call_streaming: true,
        ..config(1)
    };
    let mut stream = stream_text(mock, lookup_registry(Duration::ZERO), request(), config);
    let parts: Vec<TextStreamPart> = (&mut stream).collect().await;
    let labels: Vec<&str> = parts.iter().map(label).collect();

    assert_eq!(
        labels,
        vec!["call-start", "call-delta", "call-delta", "call", "result", "step", "finish"]
    );
}

#[tokio::test]
async fn test_pipe_text_to_writes_all_text() {
    let mock = Arc::new(mock_model("m"));
    mock.queue_stream(text_stream_parts(&["Hello", ", ", "world"], FinishReason::Stop));

    let mut stream = stream_text(mock, Arc::new(ToolRegistry::new()), request(), config(1));
    let mut sink: Vec<u8> = Vec::new();
    stream.pipe_text_to(&mut sink).await.unwrap();

    assert_eq!(String::from_utf8(sink).unwrap(), "Hello, world");
    assert_eq!(stream.result.await.unwrap().text, "Hello, world");
}

#[tokio::test]
async fn test_stream_open_failure_is_terminal() {
    let mock = Arc::new(mock_model("m"));
    mock.queue_stream_error(MockError::Auth("denied".into()));

    let mut stream = stream_text(mock, Arc::new(ToolRegistry::new()), request(), config(3));
    let parts: Vec<TextStreamPart> = (&mut stream).collect().await;

    assert_eq!(parts.len(), 1);
    assert!(matches!(&parts[0], TextStreamPart::Error(e) if matches!(**e, Error::Auth(_))));
    assert!(matches!(stream.result.await, Err(Error::Auth(_))));
    assert!(matches!(stream.usage.await, Err(Error::Auth(_))));
}

#[tokio::test]
async fn test_mid_stream_error_does_not_end_call() {
    let mock = Arc::new(mock_model("m"));
    mock.queue_stream_results(vec![
        Ok(StreamPart::TextDelta("partial".into())),
        Err(MockError::Timeout { elapsed_ms: 5 }),
        Ok(StreamPart::Finish {
            reason: FinishReason::Stop,
            usage: Usage::new(1, 1),
        }),
    ]);

    let mut stream = stream_text(mock, Arc::new(ToolRegistry::new()), request(), config(1));
    let parts: Vec<TextStreamPart> = (&mut stream).collect().await;
    let labels: Vec<&str> = parts.iter().map(label).collect();

    assert_eq!(labels, vec!["text", "error", "step", "finish"]);
    let result = stream.result.await.unwrap();
    assert_eq!(result.steps[0].errors.len(), 1);
}

#[tokio::test]
async fn test_result_available_without_reading_parts() {
    let mock = Arc::new(mock_model("m"));
    mock.queue_stream(text_stream_parts(&["quiet"], FinishReason::Stop));

    let stream = stream_text(mock, Arc::new(ToolRegistry::new()), request(), config(1));
    assert_eq!(stream.result.await.unwrap().text, "quiet");
}
