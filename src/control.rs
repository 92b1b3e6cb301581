//! Control and readout surfaces.
//!
//! These mirror a character device: the control side accepts the text a user would
//! `echo` into it (a decimal period in seconds, usually with a trailing newline), the
//! readout side renders the latest readings as one line of text.

use crate::config::MAX_PERIOD_SECS;
use crate::error::{SonarError, SonarResult};
use crate::ranging::{ChannelId, RangingEngine, Readout};

/// Text returned before the first reading was drained.
pub const NO_MEASUREMENT: &str = "no measurement\n";

/// Parse a rate string into a period in seconds.
///
/// Surrounding whitespace is ignored. Anything that is not a plain decimal integer
/// in `0..=50` is rejected with [`SonarError::InvalidConfig`].
pub fn parse_rate(input: &str) -> SonarResult<u32> {
    let trimmed = input.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SonarError::InvalidConfig(format!(
            "rate '{}' is not a decimal integer",
            trimmed
        )));
    }
    let period: u32 = trimmed
        .parse()
        .map_err(|_| SonarError::InvalidConfig(format!("rate '{}' is too large", trimmed)))?;
    if period > MAX_PERIOD_SECS {
        return Err(SonarError::InvalidConfig(format!(
            "rate {} out of range 0-{}",
            period, MAX_PERIOD_SECS
        )));
    }
    Ok(period)
}

/// Write side: sets the sampling period.
pub struct RateControl<'a> {
    engine: &'a RangingEngine,
}

impl<'a> RateControl<'a> {
    /// Control surface for `engine`.
    pub fn new(engine: &'a RangingEngine) -> Self {
        Self { engine }
    }

    /// Parse and apply a rate string. Returns the new period.
    ///
    /// On error the engine keeps its current period.
    pub fn write(&self, input: &str) -> SonarResult<u32> {
        let period = parse_rate(input)?;
        self.engine.set_period(period)?;
        Ok(period)
    }

    /// Current period as text.
    pub fn read(&self) -> String {
        format!("{}\n", self.engine.period())
    }
}

/// Read side: renders the latest readings.
pub struct ReadoutSurface<'a> {
    engine: &'a RangingEngine,
}

impl<'a> ReadoutSurface<'a> {
    /// Readout surface for `engine`.
    pub fn new(engine: &'a RangingEngine) -> Self {
        Self { engine }
    }

    /// Latest readings as one line, e.g. `ch0=1750000 ch1=invalid`.
    pub fn read(&self) -> String {
        render(&self.engine.readout())
    }
}

/// Render a readout; channels without any reading yet show `-`.
pub fn render(readout: &Readout) -> String {
    if readout.is_empty() {
        return NO_MEASUREMENT.to_string();
    }
    let fields: Vec<String> = ChannelId::ALL
        .iter()
        .map(|&channel| match readout.get(channel) {
            Some(distance) => format!("ch{}={}", channel, distance),
            None => format!("ch{}=-", channel),
        })
        .collect();
    format!("{}\n", fields.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranging::Distance;

    #[test]
    fn accepts_bounds_and_newline() {
        assert_eq!(parse_rate("0").unwrap(), 0);
        assert_eq!(parse_rate("50\n").unwrap(), 50);
        assert_eq!(parse_rate("  7 ").unwrap(), 7);
    }

    #[test]
    fn rejects_malformed_input() {
        for input in ["51", "-1", "abc", "", "1.5", "+3", "99999999999"] {
            assert!(
                matches!(parse_rate(input), Err(SonarError::InvalidConfig(_))),
                "accepted {input:?}"
            );
        }
    }

    #[test]
    fn renders_placeholder_then_values() {
        assert_eq!(render(&Readout::default()), NO_MEASUREMENT);

        let readout = Readout {
            channels: [Some(Distance::from_raw(1_750_000)), None],
            readings: 1,
        };
        assert_eq!(render(&readout), "ch0=1750000 ch1=-\n");

        let readout = Readout {
            channels: [Some(Distance::from_raw(5)), Some(Distance::INVALID)],
            readings: 2,
        };
        assert_eq!(render(&readout), "ch0=5 ch1=invalid\n");
    }
}
