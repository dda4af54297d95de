use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::{
    error::FetchFailed,
    model::{FetchRequest, FetchTarget, Level},
    provider::LocationProvider,
    selector::{Selector, Transition},
};

/// A fetch settled and was folded into the state machine (or dropped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerEvent {
    OptionsLoaded { level: Level, count: usize },
    FetchFailed(FetchFailed),
    /// The fetch settled after its selection had already changed; nothing
    /// was applied.
    StaleResultDropped { level: Level },
}

struct FetchOutcome {
    request: FetchRequest,
    result: anyhow::Result<Vec<String>>,
}

/// Event-driven shell around [`Selector`]: performs the fetches the state
/// machine asks for on background tasks and feeds results back in arrival
/// order.
///
/// Selection calls never block, so the caller may change an earlier
/// selection while a fetch for a later level is still outstanding; the
/// selector's sequence check discards whatever that fetch eventually
/// returns. There is no cancellation, only discard-on-arrival.
///
/// Must be created and driven inside a Tokio runtime.
#[derive(Debug)]
pub struct Picker {
    selector: Selector,
    provider: Arc<dyn LocationProvider>,
    tx: UnboundedSender<FetchOutcome>,
    rx: UnboundedReceiver<FetchOutcome>,
    pending: usize,
}

impl Picker {
    /// Construct the picker and immediately request the country list.
    pub fn new(provider: Arc<dyn LocationProvider>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut picker = Self {
            selector: Selector::new(),
            provider,
            tx,
            rx,
            pending: 0,
        };
        let request = picker.selector.start();
        picker.dispatch(request);
        picker
    }

    /// Install a callback invoked on every selector transition.
    pub fn set_hook(&mut self, hook: impl Fn(&Transition) + Send + Sync + 'static) {
        self.selector.set_hook(hook);
    }

    /// Read access to the underlying state machine.
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn select_country(&mut self, name: &str) {
        if let Some(request) = self.selector.select_country(name) {
            self.dispatch(request);
        }
    }

    pub fn select_state(&mut self, name: &str) {
        if let Some(request) = self.selector.select_state(name) {
            self.dispatch(request);
        }
    }

    pub fn select_city(&mut self, name: &str) {
        self.selector.select_city(name);
    }

    /// Whether any fetch is still outstanding.
    pub fn has_pending(&self) -> bool {
        self.pending > 0
    }

    /// Wait for the next in-flight fetch to settle and fold it into the
    /// state machine. Returns `None` when nothing is outstanding.
    pub async fn next_event(&mut self) -> Option<PickerEvent> {
        if self.pending == 0 {
            return None;
        }
        let outcome = self.rx.recv().await?;
        self.pending -= 1;

        let level = outcome.request.target.level();
        let result = outcome.result.map_err(|err| format!("{err:#}"));

        if !self.selector.resolve(&outcome.request, result.clone()) {
            debug!(%level, seq = outcome.request.seq, "dropping stale fetch result");
            return Some(PickerEvent::StaleResultDropped { level });
        }

        let event = match result {
            Ok(options) => {
                debug!(%level, count = options.len(), "options loaded");
                PickerEvent::OptionsLoaded { level, count: options.len() }
            }
            Err(message) => {
                warn!(%level, %message, "fetch failed");
                PickerEvent::FetchFailed(FetchFailed { level, message })
            }
        };
        Some(event)
    }

    /// Drive every outstanding fetch to completion.
    pub async fn settle(&mut self) -> Vec<PickerEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }

    fn dispatch(&mut self, request: FetchRequest) {
        self.pending += 1;
        let provider = Arc::clone(&self.provider);
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let result = match &request.target {
                FetchTarget::Countries => provider.countries().await,
                FetchTarget::States { country } => provider.states(country).await,
                FetchTarget::Cities { country, state } => provider.cities(country, state).await,
            };
            // A closed receiver means the picker is gone; nothing to deliver.
            let _ = tx.send(FetchOutcome { request, result });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RequestStatus;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    #[derive(Debug, Default)]
    struct FixtureProvider {
        countries: Vec<String>,
        states: HashMap<String, Vec<String>>,
        cities: HashMap<(String, String), Vec<String>>,
    }

    impl FixtureProvider {
        fn india_and_usa() -> Self {
            Self {
                countries: vec!["India".into(), "USA".into()],
                states: HashMap::from([("India".to_string(), vec!["Karnataka".to_string()])]),
                cities: HashMap::from([(
                    ("India".to_string(), "Karnataka".to_string()),
                    vec!["Bengaluru".to_string()],
                )]),
            }
        }
    }

    #[async_trait]
    impl LocationProvider for FixtureProvider {
        async fn countries(&self) -> anyhow::Result<Vec<String>> {
            Ok(self.countries.clone())
        }

        async fn states(&self, country: &str) -> anyhow::Result<Vec<String>> {
            self.states
                .get(country)
                .cloned()
                .ok_or_else(|| anyhow!("no state data for country {country}"))
        }

        async fn cities(&self, country: &str, state: &str) -> anyhow::Result<Vec<String>> {
            self.cities
                .get(&(country.to_string(), state.to_string()))
                .cloned()
                .ok_or_else(|| anyhow!("no city data for {state}, {country}"))
        }
    }

    /// Provider whose state responses block until the test releases them,
    /// so arrival order is under test control.
    #[derive(Debug)]
    struct GatedProvider {
        countries: Vec<String>,
        gates: Mutex<HashMap<String, oneshot::Receiver<Vec<String>>>>,
    }

    #[async_trait]
    impl LocationProvider for GatedProvider {
        async fn countries(&self) -> anyhow::Result<Vec<String>> {
            Ok(self.countries.clone())
        }

        async fn states(&self, country: &str) -> anyhow::Result<Vec<String>> {
            let rx = self
                .gates
                .lock()
                .unwrap()
                .remove(country)
                .ok_or_else(|| anyhow!("no gate registered for {country}"))?;
            rx.await.map_err(|_| anyhow!("gate for {country} dropped"))
        }

        async fn cities(&self, _country: &str, _state: &str) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn gated(countries: &[&str], gates: Vec<(&str, oneshot::Receiver<Vec<String>>)>) -> GatedProvider {
        GatedProvider {
            countries: countries.iter().map(|c| (*c).to_string()).collect(),
            gates: Mutex::new(
                gates.into_iter().map(|(c, rx)| (c.to_string(), rx)).collect(),
            ),
        }
    }

    #[tokio::test]
    async fn construction_loads_the_country_list() {
        let mut picker = Picker::new(Arc::new(FixtureProvider::india_and_usa()));

        let events = picker.settle().await;
        assert_eq!(events, vec![PickerEvent::OptionsLoaded { level: Level::Country, count: 2 }]);
        assert_eq!(
            picker.selector().options(Level::Country),
            ["India".to_string(), "USA".to_string()]
        );
        assert!(!picker.has_pending());
    }

    #[tokio::test]
    async fn full_pick_flow_derives_the_summary() {
        let mut picker = Picker::new(Arc::new(FixtureProvider::india_and_usa()));
        picker.settle().await;

        picker.select_country("India");
        picker.settle().await;
        assert_eq!(picker.selector().options(Level::State), ["Karnataka".to_string()]);
        assert_eq!(picker.selector().selection(Level::State), "");

        picker.select_state("Karnataka");
        picker.settle().await;
        assert_eq!(picker.selector().options(Level::City), ["Bengaluru".to_string()]);

        picker.select_city("Bengaluru");
        assert!(!picker.has_pending());
        assert_eq!(
            picker.selector().summary().as_deref(),
            Some("You selected Bengaluru, Karnataka, India")
        );
    }

    #[tokio::test]
    async fn fetch_failure_is_reported_and_leaves_other_levels_alone() {
        let mut picker = Picker::new(Arc::new(FixtureProvider::india_and_usa()));
        picker.settle().await;

        picker.select_country("France");
        let events = picker.settle().await;

        assert_eq!(
            events,
            vec![PickerEvent::FetchFailed(FetchFailed {
                level: Level::State,
                message: "no state data for country France".to_string(),
            })]
        );
        assert_eq!(
            picker.selector().status(Level::State).error(),
            Some("no state data for country France")
        );
        assert_eq!(
            picker.selector().options(Level::Country),
            ["India".to_string(), "USA".to_string()]
        );

        // Still interactive: reselecting retries the fetch.
        picker.select_country("India");
        picker.settle().await;
        assert_eq!(*picker.selector().status(Level::State), RequestStatus::Success);
    }

    #[tokio::test]
    async fn superseded_fetch_never_overwrites_the_live_selection() {
        // Slow response arrives after the replacement's.
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        let provider = gated(&["A", "B"], vec![("A", rx_a), ("B", rx_b)]);

        let mut picker = Picker::new(Arc::new(provider));
        picker.settle().await;

        picker.select_country("A");
        picker.select_country("B");

        tx_b.send(vec!["P".into(), "Q".into()]).unwrap();
        let event = picker.next_event().await.unwrap();
        assert_eq!(event, PickerEvent::OptionsLoaded { level: Level::State, count: 2 });

        tx_a.send(vec!["X".into(), "Y".into()]).unwrap();
        let event = picker.next_event().await.unwrap();
        assert_eq!(event, PickerEvent::StaleResultDropped { level: Level::State });

        assert_eq!(
            picker.selector().options(Level::State),
            ["P".to_string(), "Q".to_string()]
        );

        // Slow response arrives before the replacement's.
        let (tx_a, rx_a) = oneshot::channel();
        let (tx_b, rx_b) = oneshot::channel();
        let provider = gated(&["A", "B"], vec![("A", rx_a), ("B", rx_b)]);

        let mut picker = Picker::new(Arc::new(provider));
        picker.settle().await;

        picker.select_country("A");
        picker.select_country("B");

        tx_a.send(vec!["X".into(), "Y".into()]).unwrap();
        let event = picker.next_event().await.unwrap();
        assert_eq!(event, PickerEvent::StaleResultDropped { level: Level::State });
        assert!(picker.selector().status(Level::State).is_loading());

        tx_b.send(vec!["P".into(), "Q".into()]).unwrap();
        picker.next_event().await.unwrap();
        assert_eq!(
            picker.selector().options(Level::State),
            ["P".to_string(), "Q".to_string()]
        );
    }

    #[tokio::test]
    async fn next_event_returns_none_when_nothing_is_outstanding() {
        let mut picker = Picker::new(Arc::new(FixtureProvider::india_and_usa()));
        picker.settle().await;

        assert_eq!(picker.next_event().await, None);
    }
}
