//! Runs lookups: cache check, streaming, cancellation and cache writes.

use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::{CacheEntry, CacheKey, ResponseCache};
use crate::definition::{DefinitionRequest, FragmentStream, Language, is_error_fragment};
use crate::dispatcher::Dispatcher;

/// Marks a lookup as superseded.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupState {
    Idle,
    Streaming,
    Completed,
    Errored,
    Cancelled,
}

impl LookupState {
    const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupEvent {
    Fragment {
        text: String,
        accumulated: String,
    },
    Completed {
        text: String,
        elapsed: Duration,
        from_cache: bool,
    },
    Failed(String),
}

type SharedState = Arc<Mutex<LookupState>>;

fn set_state(state: &SharedState, next: LookupState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = next;
}

fn get_state(state: &SharedState) -> LookupState {
    *state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to one running or finished lookup.
pub struct Lookup {
    key: CacheKey,
    token: CancellationToken,
    state: SharedState,
    events: mpsc::UnboundedReceiver<LookupEvent>,
    task: Option<JoinHandle<()>>,
}

impl Lookup {
    /// Next UI event, or `None` once the lookup is over or superseded.
    pub async fn next_event(&mut self) -> Option<LookupEvent> {
        if self.token.is_cancelled() {
            return None;
        }
        let event = self.events.recv().await;
        if self.token.is_cancelled() {
            return None;
        }
        event
    }

    pub fn state(&self) -> LookupState {
        get_state(&self.state)
    }

    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub const fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Waits for the background task, including its cache write.
    pub async fn finished(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

struct Current {
    token: CancellationToken,
    state: SharedState,
}

/// Starts lookups and keeps at most one of them live.
///
/// Starting a lookup cancels the previous one. A cancelled lookup keeps
/// streaming in the background and still caches its result, but none of
/// its events reach the caller.
pub struct Orchestrator {
    dispatcher: Arc<Dispatcher>,
    cache: ResponseCache,
    current: Mutex<Option<Current>>,
}

impl Orchestrator {
    pub fn new(dispatcher: Arc<Dispatcher>, cache: ResponseCache) -> Self {
        Self {
            dispatcher,
            cache,
            current: Mutex::new(None),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub const fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Key a lookup would use right now, tagged with the routed provider.
    pub fn cache_key(&self, topic: &str, language: Language) -> CacheKey {
        CacheKey::new(topic, language, self.dispatcher.route().provider)
    }

    fn supersede(&self, token: CancellationToken, state: SharedState) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = current.replace(Current { token, state }) {
            previous.token.cancel();
            let mut previous_state = previous
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !previous_state.is_terminal() {
                *previous_state = LookupState::Cancelled;
            }
        }
    }

    /// Starts a lookup, cancelling whichever lookup was running.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn lookup(&self, request: DefinitionRequest) -> Lookup {
        let token = CancellationToken::new();
        let state: SharedState = Arc::new(Mutex::new(LookupState::Idle));
        self.supersede(token.clone(), Arc::clone(&state));

        let routed = self.dispatcher.route();
        let key = CacheKey::new(request.topic.clone(), request.language, routed.provider);
        let (tx, events) = mpsc::unbounded_channel();

        if let Some(entry) = self.cache.get(&key) {
            tracing::debug!(topic = %request.topic, provider = key.source(), "cache hit");
            set_state(&state, LookupState::Completed);
            let _ = tx.send(LookupEvent::Completed {
                text: entry.text,
                elapsed: entry.elapsed,
                from_cache: true,
            });
            return Lookup {
                key,
                token,
                state,
                events,
                task: None,
            };
        }

        tracing::debug!(topic = %request.topic, provider = key.source(), "cache miss");
        set_state(&state, LookupState::Streaming);
        let stream = routed.stream(&request);
        let task = tokio::spawn(run_lookup(
            stream,
            key.clone(),
            self.cache.clone(),
            token.clone(),
            Arc::clone(&state),
            tx,
        ));

        Lookup {
            key,
            token,
            state,
            events,
            task: Some(task),
        }
    }

    /// Drops the cached entry for `request`, then looks it up again.
    pub fn refresh(&self, request: DefinitionRequest) -> Lookup {
        let key = self.cache_key(&request.topic, request.language);
        self.cache.invalidate(&key);
        self.lookup(request)
    }

    /// Cancels the running lookup, if any.
    pub fn cancel_current(&self) {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = current.as_ref() {
            current.token.cancel();
            let mut state = current.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.is_terminal() {
                *state = LookupState::Cancelled;
            }
        }
    }
}

/// True unless `requested` names the topic already shown, ignoring case.
pub fn is_new_topic(current: Option<&str>, requested: &str) -> bool {
    current.is_none_or(|current| current.to_lowercase() != requested.to_lowercase())
}

async fn run_lookup(
    mut stream: FragmentStream,
    key: CacheKey,
    cache: ResponseCache,
    token: CancellationToken,
    state: SharedState,
    tx: mpsc::UnboundedSender<LookupEvent>,
) {
    let started = Instant::now();
    let mut accumulated = String::new();

    while let Some(fragment) = stream.next().await {
        if is_error_fragment(&fragment) {
            tracing::warn!(topic = %key.topic, provider = key.source(), "lookup failed");
            if !token.is_cancelled() {
                set_state(&state, LookupState::Errored);
                let _ = tx.send(LookupEvent::Failed(fragment));
            }
            return;
        }

        accumulated.push_str(&fragment);
        if !token.is_cancelled() {
            let _ = tx.send(LookupEvent::Fragment {
                text: fragment,
                accumulated: accumulated.clone(),
            });
        }
    }

    let elapsed = started.elapsed();
    if !accumulated.is_empty() {
        cache.put(
            key.clone(),
            CacheEntry {
                text: accumulated.clone(),
                elapsed,
            },
        );
    }

    if !token.is_cancelled() {
        set_state(&state, LookupState::Completed);
        let _ = tx.send(LookupEvent::Completed {
            text: accumulated,
            elapsed,
            from_cache: false,
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialStore, ProviderId};
    use crate::providers::DefinitionSource;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct ScriptedSource {
        fragments: Vec<&'static str>,
        opened: Arc<AtomicUsize>,
        gate: Option<Arc<Notify>>,
    }

    impl DefinitionSource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn stream_definition(&self, _request: &DefinitionRequest) -> FragmentStream {
            let fragments = self.fragments.clone();
            let opened = Arc::clone(&self.opened);
            let gate = self.gate.clone();
            Box::pin(async_stream::stream! {
                opened.fetch_add(1, Ordering::SeqCst);
                for (i, fragment) in fragments.into_iter().enumerate() {
                    if i == 1
                        && let Some(gate) = &gate
                    {
                        gate.notified().await;
                    }
                    yield fragment.to_string();
                }
            })
        }
    }

    fn orchestrator(
        fragments: Vec<&'static str>,
        gate: Option<Arc<Notify>>,
    ) -> (Orchestrator, Arc<AtomicUsize>) {
        let opened = Arc::new(AtomicUsize::new(0));
        let source = Arc::new(ScriptedSource {
            fragments,
            opened: Arc::clone(&opened),
            gate,
        });
        let credentials = CredentialStore::in_memory();
        credentials.set_api_key(ProviderId::Groq, "gsk");
        let dispatcher =
            Dispatcher::new(credentials, source.clone()).with_route(ProviderId::Groq, source);
        (
            Orchestrator::new(Arc::new(dispatcher), ResponseCache::new()),
            opened,
        )
    }

    fn request(topic: &str) -> DefinitionRequest {
        DefinitionRequest::new(topic, Language::En)
    }

    async fn drain(lookup: &mut Lookup) -> Vec<LookupEvent> {
        let mut events = Vec::new();
        while let Some(event) = lookup.next_event().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_streams_then_completes_and_caches() {
        let (orchestrator, _) = orchestrator(vec!["Rain ", "is water."], None);

        let mut lookup = orchestrator.lookup(request("rain"));
        let events = drain(&mut lookup).await;

        assert_eq!(
            events[0],
            LookupEvent::Fragment {
                text: "Rain ".into(),
                accumulated: "Rain ".into()
            }
        );
        assert_eq!(
            events[1],
            LookupEvent::Fragment {
                text: "is water.".into(),
                accumulated: "Rain is water.".into()
            }
        );
        assert!(matches!(
            &events[2],
            LookupEvent::Completed { text, from_cache: false, .. } if text == "Rain is water."
        ));
        assert_eq!(lookup.state(), LookupState::Completed);

        let key = orchestrator.cache_key("rain", Language::En);
        assert_eq!(key.provider, Some(ProviderId::Groq));
        assert_eq!(orchestrator.cache().get(&key).unwrap().text, "Rain is water.");
    }

    #[tokio::test]
    async fn test_cache_hit_skips_transport() {
        let (orchestrator, opened) = orchestrator(vec!["Rain is water."], None);

        let lookup = orchestrator.lookup(request("rain"));
        lookup.finished().await;
        assert_eq!(opened.load(Ordering::SeqCst), 1);

        let mut again = orchestrator.lookup(request("rain"));
        let events = drain(&mut again).await;

        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            LookupEvent::Completed { text, from_cache: true, .. } if text == "Rain is water."
        ));
        assert_eq!(again.state(), LookupState::Completed);
    }

    #[tokio::test]
    async fn test_refresh_refetches() {
        let (orchestrator, opened) = orchestrator(vec!["Rain is water."], None);

        orchestrator.lookup(request("rain")).finished().await;
        let mut refreshed = orchestrator.refresh(request("rain"));
        let events = drain(&mut refreshed).await;

        assert_eq!(opened.load(Ordering::SeqCst), 2);
        assert!(matches!(
            events.last(),
            Some(LookupEvent::Completed { from_cache: false, .. })
        ));
    }

    #[tokio::test]
    async fn test_error_is_not_cached() {
        let (orchestrator, _) = orchestrator(vec!["partial", "Error: boom"], None);

        let mut lookup = orchestrator.lookup(request("rain"));
        let events = drain(&mut lookup).await;

        assert_eq!(events.last(), Some(&LookupEvent::Failed("Error: boom".into())));
        assert_eq!(lookup.state(), LookupState::Errored);
        assert!(orchestrator.cache().is_empty());
    }

    #[tokio::test]
    async fn test_superseded_lookup_is_silent_but_still_cached() {
        let gate = Arc::new(Notify::new());
        let (orchestrator, _) = orchestrator(vec!["first ", "answer"], Some(Arc::clone(&gate)));

        let mut first = orchestrator.lookup(request("rain"));
        assert!(matches!(
            first.next_event().await,
            Some(LookupEvent::Fragment { .. })
        ));

        let second = orchestrator.lookup(request("snow"));
        assert!(first.token().is_cancelled());
        assert!(!second.token().is_cancelled());
        assert_eq!(first.state(), LookupState::Cancelled);

        gate.notify_one();
        assert_eq!(first.next_event().await, None);

        let key = first.key().clone();
        first.finished().await;
        assert_eq!(orchestrator.cache().get(&key).unwrap().text, "first answer");
    }

    #[test]
    fn test_is_new_topic() {
        assert!(is_new_topic(None, "Rain"));
        assert!(!is_new_topic(Some("rain"), "RAIN"));
        assert!(is_new_topic(Some("rain"), "snow"));
    }
}
