use crate::figure::{build_choropleth, Figure, FigureError};
use crate::region_index::RegionIndex;
use crate::types::{ClimateData, Month, Stat};
use rand::Rng;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Highlighted regions for one viewer. Holds at most one region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    regions: BTreeSet<String>,
}

impl Selection {
    /// Clicking the sole selected region clears it; clicking any other
    /// region makes it the sole selection.
    pub fn toggle(&mut self, region: &str) {
        let was_selected = self.regions.contains(region);
        self.regions.clear();
        if !was_selected {
            self.regions.insert(region.to_string());
        }
    }

    pub fn regions(&self) -> &BTreeSet<String> {
        &self.regions
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown session '{0}'")]
    Unknown(String),
}

struct SessionEntry {
    selection: Selection,
    last_used: u64,
}

#[derive(Default)]
struct Sessions {
    entries: HashMap<String, SessionEntry>,
    // bumped on every access, orders entries for eviction
    clock: u64,
}

impl Sessions {
    fn touch(&mut self, session: &str) -> Result<&mut Selection, SessionError> {
        self.clock += 1;
        let now = self.clock;
        let entry = self
            .entries
            .get_mut(session)
            .ok_or_else(|| SessionError::Unknown(session.to_string()))?;
        entry.last_used = now;
        Ok(&mut entry.selection)
    }

    fn evict_least_recent(&mut self) -> Option<String> {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(id, _)| id.clone())?;
        self.entries.remove(&oldest);
        Some(oldest)
    }
}

/// Per-viewer selections, so one viewer's clicks never show up on another
/// viewer's map. Holds at most `max_sessions`; the least recently used
/// session is dropped to make room for a new one.
pub struct SessionStore {
    sessions: Mutex<Sessions>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Mutex::new(Sessions::default()),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Registers a new session with an empty selection and returns its id.
    pub fn create(&self) -> String {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        while sessions.entries.len() >= self.max_sessions {
            if let Some(evicted) = sessions.evict_least_recent() {
                debug!("Evicted idle session {}", evicted);
            }
        }

        let mut rng = rand::thread_rng();
        let id = loop {
            let candidate = format!("{:032x}", rng.gen::<u128>());
            if !sessions.entries.contains_key(&candidate) {
                break candidate;
            }
        };
        sessions.clock += 1;
        let last_used = sessions.clock;
        sessions.entries.insert(
            id.clone(),
            SessionEntry { selection: Selection::default(), last_used },
        );
        id
    }

    pub fn selection(&self, session: &str) -> Result<Selection, SessionError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.touch(session).map(|selection| selection.clone())
    }

    /// Applies a click and returns the resulting selection.
    pub fn toggle(&self, session: &str, region: &str) -> Result<Selection, SessionError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let selection = sessions.touch(session)?;
        selection.toggle(region);
        Ok(selection.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rebuilds the map for a selection, month and statistic.
pub fn recompute(
    data: &ClimateData,
    index: &RegionIndex,
    selection: &Selection,
    month: Month,
    stat: Stat,
) -> Result<Figure, FigureError> {
    build_choropleth(data.table(stat), index, month.label(), selection.regions())
}
