//! One run of the tool: token, fetch, save, report.

use anyhow::Context;
use oauth2::AccessToken;
use tracing::error;

use crate::api::consumption::{HistoryQuery, MeasurementHistory};
use crate::auth::{resolve_token, Authenticator};
use crate::config::Config;
use crate::{report, storage, ApiClient, FluviusApi, Result};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
/// Missing or invalid options
pub const EXIT_USAGE: u8 = 2;

/// Builds the production client for a token.
pub fn connect(token: AccessToken) -> Result<Box<dyn ApiClient>> {
    Ok(Box::new(FluviusApi::new(token)?))
}

/// Runs the pipeline and returns the process exit code. Failures that end the
/// run early are reported here; only a failed write of the output file
/// surfaces as an error.
pub fn run<F>(config: &Config, authenticator: &dyn Authenticator, connect: F) -> anyhow::Result<u8>
where
    F: FnOnce(AccessToken) -> Result<Box<dyn ApiClient>>,
{
    let token = match resolve_token(config, authenticator) {
        Ok(token) => token,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(EXIT_FAILURE);
        }
    };
    println!("Authentication successful");

    let client = connect(token).context("building HTTP client")?;
    let query = HistoryQuery {
        ean: config.ean.clone(),
        meter_serial: config.meter_serial.clone(),
        days_back: config.days_back,
        timezone: Some(config.timezone.clone()),
        granularity: config.granularity.clone(),
    };

    let history = match MeasurementHistory::new(client.as_ref()).fetch(&query) {
        Ok(history) if !history.is_empty() => history,
        Ok(_) => {
            error!("no consumption data returned");
            return Ok(EXIT_FAILURE);
        }
        Err(e) => {
            error!("fetching consumption data failed: {}", e);
            return Ok(EXIT_FAILURE);
        }
    };

    storage::save(history.raw(), &config.output)
        .with_context(|| format!("writing {}", config.output.display()))?;
    println!("Raw data saved to {}", config.output.display());

    report::print_report(&history.days())?;

    if config.table {
        let df = history
            .as_polars_df()
            .context("building readings table")?;
        println!("\n{}", df);
    }

    Ok(EXIT_SUCCESS)
}
