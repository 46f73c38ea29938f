//! Human-readable incident reports emitted by traps and timelines.
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::VecDeque;

/// Inline tag storage; most incidents carry one or two tags.
pub type IncidentTags = SmallVec<[String; 2]>;

/// Subsystem that produced an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Cursor,
    Zone,
    Focus,
    Clipboard,
    Drag,
    Chrome,
    Tour,
    Gate,
    Audio,
}

impl Surface {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Cursor => "cursor",
            Self::Zone => "zone",
            Self::Focus => "focus",
            Self::Clipboard => "clipboard",
            Self::Drag => "drag",
            Self::Chrome => "chrome",
            Self::Tour => "tour",
            Self::Gate => "gate",
            Self::Audio => "audio",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub surface: Surface,
    pub at_ms: u64,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "SmallVec::is_empty")]
    pub tags: IncidentTags,
}

impl Incident {
    #[must_use]
    pub fn new(surface: Surface, at_ms: u64, message: impl Into<String>) -> Self {
        Self {
            surface,
            at_ms,
            severity: Severity::Info,
            message: message.into(),
            tags: IncidentTags::new(),
        }
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn tagged(mut self, tag: &str) -> Self {
        let tag = tag.trim();
        if !tag.is_empty() && !self.tags.iter().any(|existing| existing == tag) {
            self.tags.push(tag.to_string());
        }
        self
    }
}

/// Bounded ring of recent incidents for optional telemetry or UI display.
#[derive(Debug, Clone)]
pub struct IncidentLog {
    capacity: usize,
    entries: VecDeque<Incident>,
    total: u64,
}

impl IncidentLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
            total: 0,
        }
    }

    pub fn push(&mut self, incident: Incident) {
        log::debug!(
            "incident [{}] {}",
            incident.surface.label(),
            incident.message
        );
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(incident);
        self.total = self.total.saturating_add(1);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Incident> {
        self.entries.iter()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&Incident> {
        self.entries.back()
    }

    /// Incidents recorded since construction, including evicted ones.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn count_for(&self, surface: Surface) -> usize {
        self.entries
            .iter()
            .filter(|incident| incident.surface == surface)
            .count()
    }

    pub fn drain(&mut self) -> Vec<Incident> {
        self.entries.drain(..).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for IncidentLog {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_evicts_oldest_past_capacity() {
        let mut log = IncidentLog::new(2);
        log.push(Incident::new(Surface::Cursor, 1, "one"));
        log.push(Incident::new(Surface::Focus, 2, "two"));
        log.push(Incident::new(Surface::Focus, 3, "three"));
        assert_eq!(log.len(), 2);
        assert_eq!(log.total(), 3);
        assert_eq!(log.count_for(Surface::Focus), 2);
        assert_eq!(log.latest().map(|i| i.at_ms), Some(3));
    }

    #[test]
    fn tags_are_trimmed_and_unique() {
        let incident = Incident::new(Surface::Drag, 0, "snap")
            .tagged(" snap-back ")
            .tagged("snap-back")
            .tagged("");
        assert_eq!(incident.tags.len(), 1);
        let json = serde_json::to_string(&incident).unwrap();
        let restored: Incident = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, incident);
    }
}
