//! Backend client: sanitization, token accounting, usage logging, admission.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use portunus::providers::traits::Transport;
use portunus::{
    AdmissionSemaphore, BackendClient, BackendKind, CacheConfig, ChatMessage, Completion,
    GatewayError, GenerationInput, GenerationMethod, Result, ResponseCache, RetryConfig,
    TokenCounts, UsageLedger,
};

struct Fixed {
    reply: &'static str,
    tokens: Option<TokenCounts>,
    calls: AtomicU32,
}

impl Fixed {
    fn new(reply: &'static str, tokens: Option<TokenCounts>) -> Arc<Self> {
        Arc::new(Self {
            reply,
            tokens,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl Transport for Fixed {
    fn name(&self) -> &str {
        "fixed"
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Cloud
    }

    async fn call(&self, _input: &GenerationInput) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let completion = Completion::new(self.reply);
        Ok(match self.tokens {
            Some(tokens) => completion.with_tokens(tokens),
            None => completion,
        })
    }
}

fn client(transport: Arc<Fixed>, ledger: Arc<UsageLedger>) -> BackendClient {
    BackendClient::new(
        transport,
        RetryConfig::disabled(),
        Arc::new(ResponseCache::new(CacheConfig::default())),
        ledger,
    )
}

#[tokio::test]
async fn cache_hit_is_logged_with_original_token_counts() {
    let ledger = Arc::new(UsageLedger::default());
    let transport = Fixed::new("four", Some(TokenCounts::new(11, 4)));
    let client = client(transport, ledger.clone());

    client.generate(GenerationInput::text("question"), 7).await.unwrap();
    let hit = client.generate(GenerationInput::text("question"), 8).await.unwrap();
    assert!(hit.cached);
    assert_eq!(hit.tokens, TokenCounts::new(11, 4));

    let entries = ledger.recent(10);
    assert_eq!(entries.len(), 2);
    // newest first
    assert_eq!(entries[0].user_id, 8);
    assert!(entries[0].cached);
    assert_eq!(entries[0].input_tokens, 11);
    assert_eq!(entries[0].output_tokens, 4);
    assert_eq!(entries[0].method, GenerationMethod::Text);
    assert_eq!(entries[0].backend, BackendKind::Cloud);
    assert!(!entries[1].cached);
}

#[tokio::test]
async fn tokens_are_estimated_when_provider_is_silent() {
    let ledger = Arc::new(UsageLedger::default());
    let transport = Fixed::new("abcdefghi", None);
    let client = client(transport, ledger.clone());

    let result = client
        .generate(GenerationInput::text("twelve chars"), 1)
        .await
        .unwrap();

    // 12 chars -> 3 tokens, 9 chars -> 3 tokens (rounded up)
    assert_eq!(result.tokens, TokenCounts::new(3, 3));
    assert_eq!(ledger.summary().cloud.input_tokens, 3);
}

#[tokio::test]
async fn invalid_input_never_reaches_the_transport() {
    let ledger = Arc::new(UsageLedger::default());
    let transport = Fixed::new("unused", None);
    let client = client(transport.clone(), ledger.clone());

    let err = client
        .generate(GenerationInput::text(" \u{0000}\t "), 1)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::InvalidInput(_)));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn long_prompts_are_truncated_before_sending() {
    struct Capture(std::sync::Mutex<usize>);

    #[async_trait]
    impl Transport for Capture {
        fn name(&self) -> &str {
            "capture"
        }
        fn backend(&self) -> BackendKind {
            BackendKind::Local
        }
        async fn call(&self, input: &GenerationInput) -> Result<Completion> {
            *self.0.lock().unwrap() = input.text_chars();
            Ok(Completion::new("ok"))
        }
    }

    let capture = Arc::new(Capture(std::sync::Mutex::new(0)));
    let client = BackendClient::new(
        capture.clone(),
        RetryConfig::disabled(),
        Arc::new(ResponseCache::default()),
        Arc::new(UsageLedger::default()),
    );

    client
        .generate(GenerationInput::text("x".repeat(40_000)), 1)
        .await
        .unwrap();
    assert_eq!(*capture.0.lock().unwrap(), 30_000);

    let turns = (0..20)
        .map(|i| {
            let content = "y".repeat(30_001);
            if i % 2 == 0 {
                ChatMessage::user(content)
            } else {
                ChatMessage::assistant(content)
            }
        })
        .collect();
    client
        .generate(GenerationInput::chat(turns), 1)
        .await
        .unwrap();
    assert_eq!(*capture.0.lock().unwrap(), 30_000);
}

#[tokio::test]
async fn system_only_chat_never_reaches_the_transport() {
    let transport = Fixed::new("unused", None);
    let client = client(transport.clone(), Arc::new(UsageLedger::default()));

    let err = client
        .generate(
            GenerationInput::chat(vec![ChatMessage::system("be brief")]),
            1,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::InvalidInput(_)));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn admission_gate_is_exposed_and_released() {
    let gate = Arc::new(AdmissionSemaphore::new(2));
    let client = client(Fixed::new("ok", None), Arc::new(UsageLedger::default()))
        .with_admission(gate.clone());

    client.generate(GenerationInput::text("hi"), 1).await.unwrap();

    assert_eq!(client.admission().map(|g| g.max_concurrent()), Some(2));
    assert_eq!(gate.in_flight(), 0);
}
