use futures_util::StreamExt;
use prof_buzz_model::{ErrorKind as ProviderErrorKind, RetrievalMatch, Role};
use prof_buzz_test_model::{
    PresetEvent, PresetResponse, TestCompletionProvider, TestEmbeddingProvider,
    TestVectorIndex,
};

use super::*;

struct Fixture {
    embedder: TestEmbeddingProvider,
    index: TestVectorIndex,
    completion: TestCompletionProvider,
}

impl Fixture {
    fn new(completion: PresetResponse) -> Self {
        let mut provider = TestCompletionProvider::default();
        provider.add_response(completion);
        Self {
            embedder: TestEmbeddingProvider::new(vec![0.1, 0.2, 0.3]),
            index: TestVectorIndex::new(vec![
                RetrievalMatch::new("P1")
                    .with_metadata("review", "Clear and patient.")
                    .with_metadata("subject", "Algorithms")
                    .with_metadata("stars", 5),
                RetrievalMatch::new("P2")
                    .with_metadata("subject", "Data Structures")
                    .with_metadata("stars", 4),
                RetrievalMatch::new("P3").with_metadata("stars", "3"),
            ]),
            completion: provider,
        }
    }

    fn relay(&self) -> ChatRelayBuilder {
        ChatRelayBuilder::with_providers(
            self.embedder.clone(),
            self.index.clone(),
            self.completion.clone(),
        )
    }

    fn total_calls(&self) -> usize {
        self.embedder.inputs().len()
            + self.index.queries().len()
            + self.completion.requests().len()
    }
}

async fn collect(stream: RelayStream) -> Vec<Result<Bytes, Error>> {
    stream.collect().await
}

#[tokio::test]
async fn test_augmented_prompt() {
    let fixture = Fixture::new(PresetResponse::with_deltas(["Try P1."]));
    let relay = fixture
        .relay()
        .with_system_prompt("Recommend professors.")
        .with_top_k(3)
        .build();
    let question = "Who teaches algorithms well?";
    let conversation = vec![Message::user(question)];

    let stream = relay.respond(&conversation).await.unwrap();
    collect(stream).await;

    assert_eq!(fixture.embedder.inputs().calls(), vec![question.to_owned()]);

    let requests = fixture.completion.requests().calls();
    assert_eq!(requests.len(), 1);
    let messages = &requests[0].messages;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0], Message::system("Recommend professors."));

    let last = &messages[1];
    assert_eq!(last.role, Role::User);
    assert!(last.content.starts_with(question));
    assert_eq!(fixture.index.queries().calls()[0].top_k, 3);
    let p1 = last.content.find("Professor: P1").unwrap();
    let p2 = last.content.find("Professor: P2").unwrap();
    let p3 = last.content.find("Professor: P3").unwrap();
    assert!(p1 < p2 && p2 < p3);
    assert_eq!(last.content.matches("Professor: ").count(), 3);
    assert!(last.content.contains("Review: Clear and patient."));
    assert!(last.content.contains("Review: N/A"));
}

#[tokio::test]
async fn test_synthetic_message_is_question_plus_results() {
    let fixture = Fixture::new(PresetResponse::with_deltas(["ok"]));
    let relay = fixture.relay().with_top_k(2).build();
    let conversation = vec![
        Message::assistant("Hi! I'm Prof Buzz, How can I help you today?"),
        Message::user("I need a physics professor"),
        Message::assistant("Sure, any preferences?"),
        Message::user("Easy grader"),
    ];

    collect(relay.respond(&conversation).await.unwrap()).await;

    let expected_matches = vec![
        RetrievalMatch::new("P1")
            .with_metadata("review", "Clear and patient.")
            .with_metadata("subject", "Algorithms")
            .with_metadata("stars", 5),
        RetrievalMatch::new("P2")
            .with_metadata("subject", "Data Structures")
            .with_metadata("stars", 4),
    ];
    let requests = fixture.completion.requests().calls();
    let messages = &requests[0].messages;
    assert_eq!(messages[0], Message::system(DEFAULT_SYSTEM_PROMPT));
    assert_eq!(&messages[1..4], &conversation[..3]);
    assert_eq!(
        messages[4],
        Message::user(format!(
            "Easy grader{}",
            prompt::format_matches(&expected_matches)
        ))
    );
}

#[tokio::test]
async fn test_query_parameters() {
    let fixture = Fixture::new(PresetResponse::with_deltas(["ok"]));
    let relay = fixture
        .relay()
        .with_top_k(4)
        .with_namespace(Some("professors"))
        .build();
    collect(relay.respond(&[Message::user("Hi")]).await.unwrap()).await;

    let queries = fixture.index.queries().calls();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].top_k, 4);
    assert!(queries[0].include_metadata);
    assert_eq!(queries[0].namespace.as_deref(), Some("professors"));
    assert_eq!(queries[0].vector.0, vec![0.1, 0.2, 0.3]);

    let mut fixture = fixture;
    fixture
        .completion
        .add_response(PresetResponse::with_deltas(["ok"]));
    let relay = fixture.relay().with_namespace(None::<String>).build();
    collect(relay.respond(&[Message::user("Hi")]).await.unwrap()).await;
    assert_eq!(fixture.index.queries().calls()[1].namespace, None);
}

#[tokio::test]
async fn test_empty_conversation() {
    let fixture = Fixture::new(PresetResponse::with_deltas(["ok"]));
    let relay = fixture.relay().build();
    let Err(err) = relay.respond(&[]).await else {
        panic!("empty conversation should be rejected");
    };
    assert_eq!(err.kind(), ErrorKind::MalformedRequest);
    assert_eq!(fixture.total_calls(), 0);
}

#[tokio::test]
async fn test_empty_last_message() {
    let fixture = Fixture::new(PresetResponse::with_deltas(["ok"]));
    let relay = fixture.relay().build();
    for content in ["", "   \n"] {
        let conversation =
            vec![Message::user("Hello"), Message::user(content)];
        let Err(err) = relay.respond(&conversation).await else {
            panic!("empty message should be rejected");
        };
        assert_eq!(err.kind(), ErrorKind::MalformedRequest);
        assert_eq!(err.provider_kind(), None);
    }
    assert_eq!(fixture.total_calls(), 0);
}

#[tokio::test]
async fn test_stream_order() {
    let fixture =
        Fixture::new(PresetResponse::with_deltas(["Hel", "", "lo", "!"]));
    let relay = fixture.relay().build();
    let chunks = collect(relay.respond(&[Message::user("Hi")]).await.unwrap())
        .await
        .into_iter()
        .map(|c| c.unwrap())
        .collect::<Vec<_>>();
    // Empty fragments are not forwarded.
    assert_eq!(chunks, ["Hel", "lo", "!"]);
    assert_eq!(chunks.concat(), b"Hello!");
}

#[tokio::test]
async fn test_embedding_failure() {
    let mut fixture = Fixture::new(PresetResponse::with_deltas(["ok"]));
    fixture.embedder =
        TestEmbeddingProvider::failing(ProviderErrorKind::Unauthorized);
    let relay = fixture.relay().build();
    let Err(err) = relay.respond(&[Message::user("Hi")]).await else {
        panic!("embedding failure should abort");
    };
    assert_eq!(err.kind(), ErrorKind::UpstreamEmbedding);
    assert_eq!(err.provider_kind(), Some(ProviderErrorKind::Unauthorized));
    assert!(fixture.index.queries().is_empty());
    assert!(fixture.completion.requests().is_empty());
}

#[tokio::test]
async fn test_empty_embedding() {
    let mut fixture = Fixture::new(PresetResponse::with_deltas(["ok"]));
    fixture.embedder = TestEmbeddingProvider::new(vec![]);
    let relay = fixture.relay().build();
    let Err(err) = relay.respond(&[Message::user("Hi")]).await else {
        panic!("empty embedding should abort");
    };
    assert_eq!(err.kind(), ErrorKind::UpstreamEmbedding);
    assert!(fixture.index.queries().is_empty());
}

#[tokio::test]
async fn test_retrieval_failure() {
    let mut fixture = Fixture::new(PresetResponse::with_deltas(["ok"]));
    fixture.index = TestVectorIndex::failing(ProviderErrorKind::Other);
    let relay = fixture.relay().build();
    let Err(err) = relay.respond(&[Message::user("Hi")]).await else {
        panic!("retrieval failure should abort");
    };
    assert_eq!(err.kind(), ErrorKind::UpstreamRetrieval);
    assert!(fixture.completion.requests().is_empty());
}

#[tokio::test]
async fn test_completion_rejected() {
    let fixture = Fixture::new(PresetResponse::rejected());
    let relay = fixture.relay().build();
    let Err(err) = relay.respond(&[Message::user("Hi")]).await else {
        panic!("rejected completion should abort");
    };
    assert_eq!(err.kind(), ErrorKind::UpstreamCompletion);
}

#[tokio::test]
async fn test_broken_stream() {
    let fixture = Fixture::new(PresetResponse::with_events([
        PresetEvent::Delta("Dr. Smith ".to_owned()),
        PresetEvent::Error("connection reset".to_owned()),
        PresetEvent::Delta("is great".to_owned()),
    ]));
    let relay = fixture.relay().build();
    let items = collect(relay.respond(&[Message::user("Hi")]).await.unwrap())
        .await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap(), "Dr. Smith ");
    let err = items[1].as_ref().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StreamRelay);
    assert_eq!(err.message(), "connection reset");
}
