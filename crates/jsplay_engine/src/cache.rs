//! Execution Cache / Auto-run Gate.
//!
//! Decides whether an auto-triggered run should execute or reuse the previous
//! result. Time is passed in explicitly (`tokio::time::Instant`) so the rules
//! can be exercised with a paused clock.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use jsplay_runtime::OutputRecord;
use log::{debug, trace};
use regex::Regex;
use serde::Serialize;
use tokio::time::Instant;

use crate::Trigger;
use crate::classify::has_non_deterministic_construct;
use crate::preprocess::{hash32, strip_comments};

/// Entries younger than this count as recent in [`CacheStats`]
const STATS_RECENT_WINDOW: Duration = Duration::from_secs(60);

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("invalid whitespace pattern"));

/// Strips comments, collapses whitespace and drops one trailing `;`
pub fn normalize(code: &str) -> String {
    let stripped = strip_comments(code);
    let collapsed = WHITESPACE.replace_all(&stripped, " ");
    let trimmed = collapsed.trim();
    trimmed.strip_suffix(';').unwrap_or(trimmed).to_string()
}

pub fn fingerprint(normalized: &str) -> String {
    format!("code_{}", hash32(normalized))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonTag {
    Always,
    Manual,
    NonDeterministic,
    CachedRecent,
    Cached,
    Changed,
    Expired,
}

impl ReasonTag {
    pub fn should_execute(self) -> bool {
        !matches!(self, Self::CachedRecent | Self::Cached)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Manual => "manual",
            Self::NonDeterministic => "non-deterministic",
            Self::CachedRecent => "cached-recent",
            Self::Cached => "cached",
            Self::Changed => "changed",
            Self::Expired => "expired",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Self::Always => "🔥",
            Self::Manual => "🔄",
            Self::NonDeterministic => "🎲",
            Self::CachedRecent => "⏱️",
            Self::Cached => "📋",
            Self::Changed => "⚡",
            Self::Expired => "⏳",
        }
    }

    /// Notice shown in the console when auto-run consults the gate
    pub fn message(self) -> &'static str {
        match self {
            Self::Always => "Smart mode disabled, always executing",
            Self::Manual => "Manual execution (forced)",
            Self::NonDeterministic => "Code contains dynamic elements, re-executing",
            Self::CachedRecent => "Code unchanged, executed recently",
            Self::Cached => "Code unchanged, using cached result",
            Self::Changed => "Code changed, auto-running",
            Self::Expired => "Cache expired, re-executing",
        }
    }
}

impl std::fmt::Display for ReasonTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub should_execute: bool,
    pub reason: ReasonTag,
    /// Not computed for decisions that never look at the code
    pub fingerprint: Option<String>,
}

impl Decision {
    fn new(reason: ReasonTag, fingerprint: Option<String>) -> Self {
        Self {
            should_execute: reason.should_execute(),
            reason,
            fingerprint,
        }
    }

    pub fn notice(&self) -> String {
        format!("{} {}", self.reason.icon(), self.reason.message())
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub normalized: String,
    pub output_snapshot: Vec<OutputRecord>,
    pub last_run_at: Instant,
    pub is_deterministic: bool,
    pub trigger: Trigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entry_count: usize,
    /// Entries written in the last minute
    pub recent_count: usize,
    pub oldest_age_ms: u64,
    pub smart_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    pub smart_mode: bool,
    pub capacity: usize,
    /// Unchanged code run within this window is skipped
    pub recent_window: Duration,
    /// Cached entries younger than this are reused
    pub freshness_window: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            smart_mode: true,
            capacity: 50,
            recent_window: Duration::from_millis(5_000),
            freshness_window: Duration::from_millis(30_000),
        }
    }
}

impl From<&jsplay_config::CacheConfig> for CacheOptions {
    fn from(config: &jsplay_config::CacheConfig) -> Self {
        Self {
            smart_mode: config.smart_mode,
            capacity: config.capacity,
            recent_window: Duration::from_millis(config.recent_window_ms),
            freshness_window: Duration::from_millis(config.freshness_window_ms),
        }
    }
}

#[derive(Debug, Clone)]
struct LastExecution {
    fingerprint: String,
    at: Instant,
}

#[derive(Debug)]
pub struct CacheGate {
    options: CacheOptions,
    entries: HashMap<String, CacheEntry>,
    last_execution: Option<LastExecution>,
}

impl CacheGate {
    pub fn new(options: CacheOptions) -> Self {
        Self {
            options,
            entries: HashMap::new(),
            last_execution: None,
        }
    }

    pub fn smart_mode(&self) -> bool {
        self.options.smart_mode
    }

    pub fn set_smart_mode(&mut self, enabled: bool) {
        debug!("smart mode {}", if enabled { "enabled" } else { "disabled" });
        self.options.smart_mode = enabled;
    }

    pub fn get(&self, fingerprint: &str) -> Option<&CacheEntry> {
        self.entries.get(fingerprint)
    }

    pub fn decide(&self, code: &str, trigger: Trigger, now: Instant) -> Decision {
        if !self.options.smart_mode {
            return Decision::new(ReasonTag::Always, None);
        }
        if trigger == Trigger::Manual {
            return Decision::new(ReasonTag::Manual, None);
        }

        let key = fingerprint(&normalize(code));
        if has_non_deterministic_construct(code) {
            return Decision::new(ReasonTag::NonDeterministic, Some(key));
        }

        let changed = self
            .last_execution
            .as_ref()
            .is_none_or(|last| last.fingerprint != key);
        let recently_run = self
            .last_execution
            .as_ref()
            .is_some_and(|last| now.saturating_duration_since(last.at) < self.options.recent_window);

        let reason = if !changed && recently_run {
            ReasonTag::CachedRecent
        } else if self.entries.get(&key).is_some_and(|entry| {
            now.saturating_duration_since(entry.last_run_at) < self.options.freshness_window
        }) {
            ReasonTag::Cached
        } else if changed {
            ReasonTag::Changed
        } else {
            ReasonTag::Expired
        };

        trace!("cache decision for {key}: {reason}");
        Decision::new(reason, Some(key))
    }

    /// Records an executed run.
    ///
    /// The last execution is always updated; the output is only cached when
    /// the code is deterministic. Returns the stored entry, if any.
    pub fn record(
        &mut self,
        code: &str,
        output_snapshot: Vec<OutputRecord>,
        trigger: Trigger,
        now: Instant,
    ) -> Option<&CacheEntry> {
        let normalized = normalize(code);
        let key = fingerprint(&normalized);
        self.last_execution = Some(LastExecution {
            fingerprint: key.clone(),
            at: now,
        });

        if has_non_deterministic_construct(code) {
            trace!("not caching non-deterministic run {key}");
            return None;
        }

        self.entries.insert(
            key.clone(),
            CacheEntry {
                fingerprint: key.clone(),
                normalized,
                output_snapshot,
                last_run_at: now,
                is_deterministic: true,
                trigger,
            },
        );
        self.evict();
        self.entries.get(&key)
    }

    fn evict(&mut self) {
        while self.entries.len() > self.options.capacity {
            let Some(oldest) = self
                .entries
                .values()
                .min_by_key(|entry| entry.last_run_at)
                .map(|entry| entry.fingerprint.clone())
            else {
                break;
            };
            trace!("evicting cache entry {oldest}");
            self.entries.remove(&oldest);
        }
    }

    pub fn stats(&self, now: Instant) -> CacheStats {
        let ages = self
            .entries
            .values()
            .map(|entry| now.saturating_duration_since(entry.last_run_at));
        let (recent_count, oldest) = ages.fold((0, Duration::ZERO), |(recent, oldest), age| {
            (
                recent + usize::from(age < STATS_RECENT_WINDOW),
                oldest.max(age),
            )
        });

        CacheStats {
            entry_count: self.entries.len(),
            recent_count,
            oldest_age_ms: u64::try_from(oldest.as_millis()).unwrap_or(u64::MAX),
            smart_mode: self.options.smart_mode,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_execution = None;
    }
}
