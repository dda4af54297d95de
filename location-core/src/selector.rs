use std::fmt;

use crate::model::{FetchRequest, FetchTarget, Level, RequestStatus};

/// State transition reported to the observability hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    SelectionChanged { level: Level, value: String },
    FetchIssued { level: Level, seq: u64 },
    OptionsLoaded { level: Level, count: usize },
    FetchFailed { level: Level, message: String },
    StaleResultDropped { level: Level, seq: u64 },
}

type Hook = Box<dyn Fn(&Transition) + Send + Sync>;

#[derive(Debug, Clone, Default)]
struct LevelState {
    options: Vec<String>,
    selection: String,
    status: RequestStatus,
    /// Sequence number of the fetch this level is waiting on, if any.
    awaiting: Option<u64>,
}

impl LevelState {
    fn clear(&mut self) {
        self.options.clear();
        self.selection.clear();
        self.status = RequestStatus::Idle;
        self.awaiting = None;
    }
}

/// The cascading selection state machine: three dependent option lists
/// (countries, states, cities) and three dependent selections.
///
/// `Selector` performs no I/O itself. Selection setters return the
/// [`FetchRequest`] the caller must perform, and finished fetches are fed
/// back through [`Selector::resolve`]. A result is applied only while its
/// request is still the latest one issued for its level; anything older is
/// dropped, so a slow response for a previously selected country can never
/// overwrite the options of the current one.
pub struct Selector {
    levels: [LevelState; 3],
    next_seq: u64,
    hook: Option<Hook>,
}

impl Selector {
    /// Fresh selector: every level unselected, empty and idle.
    ///
    /// Call [`Selector::start`] to issue the initial country fetch.
    pub fn new() -> Self {
        Self {
            levels: Default::default(),
            next_seq: 0,
            hook: None,
        }
    }

    /// Install a callback invoked on every state transition.
    pub fn set_hook(&mut self, hook: impl Fn(&Transition) + Send + Sync + 'static) {
        self.hook = Some(Box::new(hook));
    }

    /// Begin the cascade: request the country list.
    pub fn start(&mut self) -> FetchRequest {
        self.issue(FetchTarget::Countries)
    }

    /// Record a country selection and clear everything below it.
    ///
    /// Returns the state fetch to perform, or `None` when `name` is empty.
    /// Any string is accepted, including one not present in the current
    /// country options.
    pub fn select_country(&mut self, name: &str) -> Option<FetchRequest> {
        self.set_selection(Level::Country, name);
        self.reset_below(Level::Country);

        if name.is_empty() {
            return None;
        }
        Some(self.issue(FetchTarget::States { country: name.to_owned() }))
    }

    /// Record a state selection and clear the city level.
    ///
    /// Returns the city fetch to perform, or `None` when `name` is empty.
    /// No-op while no country is selected; the state control is disabled in
    /// that situation and the machine does not trust the caller to honor it.
    pub fn select_state(&mut self, name: &str) -> Option<FetchRequest> {
        let country = self.selection(Level::Country).to_owned();
        if country.is_empty() {
            return None;
        }

        self.set_selection(Level::State, name);
        self.reset_below(Level::State);

        if name.is_empty() {
            return None;
        }
        Some(self.issue(FetchTarget::Cities { country, state: name.to_owned() }))
    }

    /// Record a city selection. Never issues a fetch; the summary line is
    /// derived from the selections on read.
    ///
    /// No-op while no state is selected.
    pub fn select_city(&mut self, name: &str) {
        if self.selection(Level::State).is_empty() {
            return;
        }
        self.set_selection(Level::City, name);
    }

    /// Fold a finished fetch back into the machine.
    ///
    /// Returns `false` when the result was stale (its level has been reset or
    /// re-fetched since the request was issued) and was dropped without
    /// touching any state. Both successes and failures of superseded
    /// requests are dropped.
    pub fn resolve(&mut self, request: &FetchRequest, result: Result<Vec<String>, String>) -> bool {
        let level = request.target.level();
        if self.slot(level).awaiting != Some(request.seq) {
            self.notify(Transition::StaleResultDropped { level, seq: request.seq });
            return false;
        }

        let slot = self.slot_mut(level);
        slot.awaiting = None;
        match result {
            Ok(options) => {
                let count = options.len();
                slot.options = options;
                slot.status = RequestStatus::Success;
                self.notify(Transition::OptionsLoaded { level, count });
            }
            Err(message) => {
                // Options stay as they were; only this level's status changes.
                slot.status = RequestStatus::Error(message.clone());
                self.notify(Transition::FetchFailed { level, message });
            }
        }
        true
    }

    pub fn options(&self, level: Level) -> &[String] {
        &self.slot(level).options
    }

    pub fn selection(&self, level: Level) -> &str {
        &self.slot(level).selection
    }

    pub fn status(&self, level: Level) -> &RequestStatus {
        &self.slot(level).status
    }

    /// Whether the control for `level` should accept input: country always,
    /// each lower level only once its parent has a selection.
    pub fn is_enabled(&self, level: Level) -> bool {
        match level {
            Level::Country => true,
            Level::State => !self.selection(Level::Country).is_empty(),
            Level::City => !self.selection(Level::State).is_empty(),
        }
    }

    /// The derived summary line, present exactly while a city is selected.
    pub fn summary(&self) -> Option<String> {
        let city = self.selection(Level::City);
        if city.is_empty() {
            return None;
        }
        Some(format!(
            "You selected {}, {}, {}",
            city,
            self.selection(Level::State),
            self.selection(Level::Country),
        ))
    }

    fn issue(&mut self, target: FetchTarget) -> FetchRequest {
        self.next_seq += 1;
        let seq = self.next_seq;
        let level = target.level();

        let slot = self.slot_mut(level);
        slot.status = RequestStatus::Loading;
        slot.awaiting = Some(seq);

        self.notify(Transition::FetchIssued { level, seq });
        FetchRequest { target, seq }
    }

    fn set_selection(&mut self, level: Level, name: &str) {
        self.slot_mut(level).selection = name.to_owned();
        self.notify(Transition::SelectionChanged { level, value: name.to_owned() });
    }

    /// Clear selection, options, status and any awaited fetch of every level
    /// below `level`.
    fn reset_below(&mut self, level: Level) {
        for lower in Level::all().iter().filter(|l| **l > level) {
            self.slot_mut(*lower).clear();
        }
    }

    fn slot(&self, level: Level) -> &LevelState {
        &self.levels[level as usize]
    }

    fn slot_mut(&mut self, level: Level) -> &mut LevelState {
        &mut self.levels[level as usize]
    }

    fn notify(&self, transition: Transition) {
        if let Some(hook) = &self.hook {
            hook(&transition);
        }
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("levels", &self.levels)
            .field("next_seq", &self.next_seq)
            .finish_non_exhaustive()
    }
}
