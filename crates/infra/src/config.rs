//! Runtime settings.
//!
//! Passed explicitly to the services that need them; nothing here is global.

use anyhow::{Context, ensure};
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

pub const UTC_OFFSET_ENV: &str = "BATCHWORKS_UTC_OFFSET_MINUTES";
pub const CURRENCY_ENV: &str = "BATCHWORKS_CURRENCY";

const MAX_OFFSET_MINUTES: i32 = 14 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Offset of the workshop's local time from UTC. Batch numbers use the
    /// local calendar day.
    pub utc_offset_minutes: i32,
    /// ISO 4217 code carried into run reports.
    pub currency: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            currency: "USD".to_string(),
        }
    }
}

impl Settings {
    /// Read settings from the process environment; unset variables keep
    /// their defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut settings = Self::default();

        if let Some(raw) = lookup(UTC_OFFSET_ENV) {
            settings.utc_offset_minutes = raw.trim().parse().with_context(|| {
                format!("{UTC_OFFSET_ENV} must be a whole number of minutes, got '{raw}'")
            })?;
        }
        if let Some(raw) = lookup(CURRENCY_ENV) {
            settings.currency = raw.trim().to_ascii_uppercase();
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.utc_offset_minutes.abs() <= MAX_OFFSET_MINUTES,
            "utc offset {} minutes is outside +/-{MAX_OFFSET_MINUTES}",
            self.utc_offset_minutes
        );
        ensure!(
            self.currency.len() == 3 && self.currency.chars().all(|c| c.is_ascii_uppercase()),
            "currency must be a three-letter ISO code, got '{}'",
            self.currency
        );
        Ok(())
    }

    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// Local calendar day of `now`.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset()).date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn reads_offset_and_currency() {
        let settings =
            Settings::from_lookup(lookup(&[(UTC_OFFSET_ENV, "-300"), (CURRENCY_ENV, " eur ")]))
                .unwrap();
        assert_eq!(settings.utc_offset_minutes, -300);
        assert_eq!(settings.currency, "EUR");
    }

    #[test]
    fn rejects_bad_values() {
        let err = Settings::from_lookup(lookup(&[(UTC_OFFSET_ENV, "two hours")])).unwrap_err();
        assert!(err.to_string().contains(UTC_OFFSET_ENV));

        assert!(Settings::from_lookup(lookup(&[(UTC_OFFSET_ENV, "2000")])).is_err());
        assert!(Settings::from_lookup(lookup(&[(CURRENCY_ENV, "euro")])).is_err());
    }

    #[test]
    fn local_date_follows_offset() {
        let now = DateTime::parse_from_rfc3339("2025-02-01T23:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let utc = Settings::default();
        assert_eq!(utc.local_date(now), NaiveDate::from_ymd_opt(2025, 2, 1).unwrap());

        let tokyo = Settings {
            utc_offset_minutes: 9 * 60,
            ..Settings::default()
        };
        assert_eq!(tokyo.local_date(now), NaiveDate::from_ymd_opt(2025, 2, 2).unwrap());
    }
}
