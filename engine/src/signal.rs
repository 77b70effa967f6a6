//! Environmental signals used to resolve theme options.
//!
//! An environmental signal is a named boolean condition owned by the host,
//! such as "the OS prefers a dark color scheme". The engine never originates
//! signals; it queries them once and then observes changes through a
//! [`SignalSource`].
//!
//! Three sources are provided:
//!
//! - [`ManualSignals`] - in-process signals set by the embedding application
//!   (and by tests)
//! - [`SystemSignals`] - the OS color scheme preference, detected with the
//!   `dark-light` crate and re-detected on [`SystemSignals::refresh`]
//! - [`Headless`] - a non-interactive environment where nothing can be
//!   resolved; stores fall back to unresolved option keys

use crate::common::{SignalError, lock};
use crate::fanout::Fanout;
use dark_light::Mode as OsThemeMode;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Callback invoked with the new state of a signal.
pub type SignalCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Query and observe surface for environmental signals.
pub trait SignalSource: Send + Sync {
    /// Returns whether `signal` is currently active.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::NonInteractive`] when no presentation
    /// environment exists, or another [`SignalError`] when the signal cannot
    /// be evaluated.
    fn query(&self, signal: &str) -> Result<bool, SignalError>;

    /// Invokes `callback` on every future change of `signal` until `token`
    /// is cancelled.
    fn observe(
        &self,
        signal: &str,
        token: CancellationToken,
        callback: SignalCallback,
    ) -> Result<(), SignalError>;
}

/// Signals whose state is set explicitly by the host application.
///
/// Unknown signals are inactive. Setting a signal to the state it already
/// has does not notify observers.
#[derive(Clone, Default)]
pub struct ManualSignals {
    states: Arc<Mutex<HashMap<String, bool>>>,
    channels: Arc<Mutex<HashMap<String, Fanout<bool>>>>,
}

impl ManualSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style initial state.
    pub fn with(self, signal: impl Into<String>, active: bool) -> Self {
        lock(&self.states).insert(signal.into(), active);
        self
    }

    /// Updates `signal` and notifies its observers when the state changed.
    ///
    /// Returns the number of observers notified.
    pub fn set(&self, signal: &str, active: bool) -> usize {
        let previous = lock(&self.states).insert(signal.to_string(), active);
        if previous.unwrap_or(false) == active {
            return 0;
        }

        let channel = lock(&self.channels).get(signal).cloned();
        match channel {
            Some(channel) => {
                log::debug!("Signal '{signal}' changed to {active}");
                channel.emit(&active)
            }
            None => 0,
        }
    }

    pub fn get(&self, signal: &str) -> Option<bool> {
        lock(&self.states).get(signal).copied()
    }

    /// Number of live observers registered for `signal`.
    pub fn observer_count(&self, signal: &str) -> usize {
        lock(&self.channels)
            .get(signal)
            .map(Fanout::listener_count)
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn registration_count(&self, signal: &str) -> usize {
        lock(&self.channels)
            .get(signal)
            .map(Fanout::entry_count)
            .unwrap_or(0)
    }

    fn known_signals(&self) -> Vec<String> {
        let states = lock(&self.states);
        let channels = lock(&self.channels);
        let mut signals: Vec<String> = states.keys().chain(channels.keys()).cloned().collect();
        signals.sort();
        signals.dedup();
        signals
    }
}

impl SignalSource for ManualSignals {
    fn query(&self, signal: &str) -> Result<bool, SignalError> {
        Ok(self.get(signal).unwrap_or(false))
    }

    fn observe(
        &self,
        signal: &str,
        token: CancellationToken,
        callback: SignalCallback,
    ) -> Result<(), SignalError> {
        lock(&self.channels)
            .entry(signal.to_string())
            .or_default()
            .register(token, move |active: &bool| callback(*active));
        Ok(())
    }
}

impl std::fmt::Debug for ManualSignals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualSignals")
            .field("states", &*lock(&self.states))
            .finish()
    }
}

/// A non-interactive environment: every query fails with
/// [`SignalError::NonInteractive`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Headless;

impl SignalSource for Headless {
    fn query(&self, signal: &str) -> Result<bool, SignalError> {
        Err(SignalError::NonInteractive {
            signal: signal.to_string(),
        })
    }

    fn observe(
        &self,
        signal: &str,
        _token: CancellationToken,
        _callback: SignalCallback,
    ) -> Result<(), SignalError> {
        Err(SignalError::NonInteractive {
            signal: signal.to_string(),
        })
    }
}

/// The user's OS color scheme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorScheme {
    Light,
    Dark,
}

/// Function used to detect the OS color scheme.
pub type ColorSchemeDetector = fn() -> Result<ColorScheme, SignalError>;

/// Signals backed by the OS color scheme preference.
///
/// Recognized signal names (case and whitespace insensitive, optional
/// surrounding parentheses):
///
/// - `prefers-color-scheme: dark`, `dark-preference`
/// - `prefers-color-scheme: light`, `light-preference`
///
/// The OS has no push notification for this preference, so the host calls
/// [`refresh`](Self::refresh) when it wants changes propagated.
#[derive(Clone)]
pub struct SystemSignals {
    hub: ManualSignals,
    detector: ColorSchemeDetector,
}

impl SystemSignals {
    pub fn new() -> Self {
        Self::with_detector(os_color_scheme)
    }

    /// Uses `detector` instead of querying the OS.
    pub fn with_detector(detector: ColorSchemeDetector) -> Self {
        Self {
            hub: ManualSignals::new(),
            detector,
        }
    }

    /// Re-detects the color scheme and notifies observers of every signal
    /// whose state changed. Returns the number of observers notified.
    pub fn refresh(&self) -> Result<usize, SignalError> {
        let scheme = (self.detector)()?;
        let mut notified = 0;
        for signal in self.hub.known_signals() {
            if let Some(expected) = parse_color_scheme_signal(&signal) {
                notified += self.hub.set(&signal, scheme == expected);
            }
        }
        Ok(notified)
    }
}

impl Default for SystemSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalSource for SystemSignals {
    fn query(&self, signal: &str) -> Result<bool, SignalError> {
        let expected =
            parse_color_scheme_signal(signal).ok_or_else(|| SignalError::Unsupported {
                signal: signal.to_string(),
            })?;
        let active = (self.detector)()? == expected;
        self.hub.set(signal, active);
        Ok(active)
    }

    fn observe(
        &self,
        signal: &str,
        token: CancellationToken,
        callback: SignalCallback,
    ) -> Result<(), SignalError> {
        if parse_color_scheme_signal(signal).is_none() {
            return Err(SignalError::Unsupported {
                signal: signal.to_string(),
            });
        }
        self.hub.observe(signal, token, callback)
    }
}

impl std::fmt::Debug for SystemSignals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemSignals")
            .field("hub", &self.hub)
            .finish()
    }
}

/// Maps a signal name to the color scheme it tests for.
pub fn parse_color_scheme_signal(signal: &str) -> Option<ColorScheme> {
    let normalized: String = signal
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();

    match normalized.as_str() {
        "prefers-color-scheme:dark" | "dark-preference" => Some(ColorScheme::Dark),
        "prefers-color-scheme:light" | "light-preference" => Some(ColorScheme::Light),
        _ => None,
    }
}

fn os_color_scheme() -> Result<ColorScheme, SignalError> {
    match dark_light::detect() {
        Ok(OsThemeMode::Dark) => Ok(ColorScheme::Dark),
        Ok(OsThemeMode::Light) | Ok(OsThemeMode::Unspecified) => Ok(ColorScheme::Light),
        Err(e) => Err(SignalError::Detection {
            reason: format!("{e:?}"),
        }),
    }
}
