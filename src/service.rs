use crate::events::{EventSink, TracingSink};
use crate::store::Store;
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of the random part of a course code. Must return `len`
/// characters from `[A-Z0-9]`.
pub trait CodeSuffixSource: Send + Sync {
    fn next_suffix(&self, len: usize) -> String;
}

const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Draws base-36 digits from a fresh v4 UUID.
pub struct UuidSuffixes;

impl CodeSuffixSource for UuidSuffixes {
    fn next_suffix(&self, len: usize) -> String {
        let mut out = String::with_capacity(len);
        while out.len() < len {
            let mut n = Uuid::new_v4().as_u128();
            // 122 random bits give 23 base-36 digits; stay well under that.
            for _ in 0..16 {
                if out.len() == len {
                    break;
                }
                out.push(BASE36[(n % 36) as usize] as char);
                n /= 36;
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreConfig {
    pub code_max_attempts: u32,
    pub code_suffix_len: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            code_max_attempts: 5,
            code_suffix_len: 3,
        }
    }
}

/// Entry point for every ledger, catalog, redemption, course and view
/// operation. The operations live in their own modules as `impl` blocks.
pub struct Amist<S: Store> {
    pub(crate) store: S,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) suffixes: Arc<dyn CodeSuffixSource>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) config: CoreConfig,
}

impl<S: Store> Amist<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            suffixes: Arc::new(UuidSuffixes),
            events: Arc::new(TracingSink),
            config: CoreConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_suffixes(mut self, suffixes: Arc<dyn CodeSuffixSource>) -> Self {
        self.suffixes = suffixes;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn set_config(&mut self, config: CoreConfig) {
        self.config = config;
    }

    pub fn config(&self) -> CoreConfig {
        self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Microsecond precision, the resolution timestamps are stored at.
    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(6)
    }
}

pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}
