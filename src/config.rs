//! Cleaner configuration.

/// Configuration for a [`ManualCleaner`](crate::lifetime::ManualCleaner).
///
/// # Examples
///
/// ```
/// use tether::config::CleanerConfig;
///
/// let default_config = CleanerConfig::default();
/// assert_eq!(default_config.name, "default");
/// assert_eq!(default_config.slot_warning_threshold, None);
///
/// let config = CleanerConfig::named("solver")
///     .with_initial_capacity(256)
///     .with_slot_warning_threshold(10_000);
/// assert_eq!(config.initial_capacity, 256);
/// assert_eq!(config.slot_warning_threshold, Some(10_000));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanerConfig {
    /// Name used in log events
    pub name: String,
    /// Slots reserved up front in the registry
    pub initial_capacity: usize,
    /// Warn when the number of live registrations crosses this value.
    ///
    /// The registry never evicts; slow drains only show up in the log.
    pub slot_warning_threshold: Option<usize>,
}

impl CleanerConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    pub fn with_slot_warning_threshold(mut self, threshold: usize) -> Self {
        self.slot_warning_threshold = Some(threshold);
        self
    }
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            initial_capacity: 64,
            slot_warning_threshold: None,
        }
    }
}
