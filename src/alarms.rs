//! Process-wide alarm registry.
//!
//! Alarms are reminders set by any mode or live session through the
//! `setAlarm` tool. The registry only ever grows within a process; nothing
//! fires, expires or persists them.

use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Length of generated alarm identifiers.
const ALARM_ID_LEN: usize = 9;

/// Alphabet of generated alarm identifiers (base 36).
const ALARM_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A reminder entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    /// Locally-unique identifier.
    pub id: String,
    /// Free-text time label, e.g. `"5 PM"`.
    pub time: String,
    /// Free-text reason.
    pub label: String,
    /// Whether the alarm has fired. Never set; no firing mechanism exists.
    pub triggered: bool,
}

/// Shared, append-only alarm list.
///
/// Cloning yields another handle to the same list.
#[derive(Debug, Clone, Default)]
pub struct AlarmRegistry {
    alarms: Arc<Mutex<Vec<Alarm>>>,
}

impl AlarmRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Alarm>> {
        match self.alarms.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Append an untriggered alarm and return it.
    pub fn set_alarm(&self, time: &str, label: &str) -> Alarm {
        let mut alarms = self.lock();
        let mut id = generate_alarm_id();
        while alarms.iter().any(|a| a.id == id) {
            id = generate_alarm_id();
        }
        let alarm = Alarm {
            id,
            time: time.to_owned(),
            label: label.to_owned(),
            triggered: false,
        };
        alarms.push(alarm.clone());
        info!(id = %alarm.id, time, label, "alarm set");
        alarm
    }

    /// Snapshot of all alarms in creation order.
    pub fn list(&self) -> Vec<Alarm> {
        self.lock().clone()
    }

    /// Number of alarms.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no alarm has been set.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Generate a random 9-character base-36 identifier.
fn generate_alarm_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ALARM_ID_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ALARM_ID_ALPHABET.len());
            char::from(ALARM_ID_ALPHABET[idx])
        })
        .collect()
}
