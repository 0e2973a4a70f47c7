use std::io::{self, Write};

use tracing::debug;

use crate::api::consumption::{DayMeasurement, Direction};

const UNKNOWN_DATE: &str = "Unknown date";

/// Per-day sums in kWh.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DailyTotals {
    pub consumption: f64,
    pub injection: f64,
}

impl DailyTotals {
    pub fn of(day: &DayMeasurement) -> Self {
        day.readings
            .iter()
            .fold(DailyTotals::default(), |mut totals, reading| {
                match reading.direction() {
                    Direction::Consumption => totals.consumption += reading.value,
                    Direction::Injection => totals.injection += reading.value,
                    Direction::Other(code) => {
                        debug!(direction = code, value = reading.value, "ignoring reading")
                    }
                }
                totals
            })
    }

    /// Negative on days where more was injected than consumed.
    pub fn net(&self) -> f64 {
        self.consumption - self.injection
    }
}

/// Prints the per-day breakdown of `days` to `out`.
pub fn write_report<W: Write>(out: &mut W, days: &[DayMeasurement]) -> io::Result<()> {
    if days.is_empty() {
        writeln!(out, "No data to analyze")?;
        return Ok(());
    }

    writeln!(out, "\nCONSUMPTION ANALYSIS:")?;
    writeln!(out, "{}", "=".repeat(50))?;
    writeln!(out, "Period: {} days", days.len())?;

    for (idx, day) in days.iter().enumerate() {
        writeln!(
            out,
            "\nDay {}: {}",
            idx + 1,
            day.date.as_deref().unwrap_or(UNKNOWN_DATE)
        )?;

        for reading in &day.readings {
            match reading.direction() {
                Direction::Consumption | Direction::Injection => writeln!(
                    out,
                    "   {} ({}): {:.3} kWh",
                    reading.direction(),
                    reading.tariff(),
                    reading.value
                )?,
                Direction::Other(_) => {}
            }
        }

        let totals = DailyTotals::of(day);
        writeln!(out, "   Total consumption: {:.3} kWh", totals.consumption)?;
        writeln!(out, "   Total injection: {:.3} kWh", totals.injection)?;
        writeln!(out, "   Net consumption: {:.3} kWh", totals.net())?;
    }

    Ok(())
}

/// [`write_report`] to stdout.
pub fn print_report(days: &[DayMeasurement]) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_report(&mut out, days)
}
