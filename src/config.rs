//! Command line and environment configuration.
//!
//! Every option can be given as a flag; most also fall back to a `FLUVIUS_*`
//! environment variable and then to a built-in default.

use std::path::PathBuf;

use clap::Parser;

use crate::{FluviusError, Result};

const DEFAULT_AUTH_AUTHORITY: &str =
    "https://login.fluvius.be/klanten.onmicrosoft.com/B2C_1A_customer_signup_signin/oauth2/v2.0";

/// Fetch consumption data for a Fluvius meter and print a daily summary
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "fluvius-consumption")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Fluvius account email
    #[arg(long, env = "FLUVIUS_LOGIN")]
    pub email: Option<String>,

    /// Fluvius account password
    #[arg(long, env = "FLUVIUS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// EAN number of the metering point
    #[arg(long, env = "FLUVIUS_EAN")]
    pub ean: Option<String>,

    /// Meter serial number
    #[arg(long, env = "FLUVIUS_METER_SERIAL")]
    pub meter_serial: Option<String>,

    /// How many days of history to request
    #[arg(long, default_value_t = 7)]
    pub days_back: u32,

    /// Forward the remember-me flag during login
    #[arg(long)]
    pub remember_me: bool,

    /// IANA timezone used to build the local day boundaries
    #[arg(long, env = "FLUVIUS_TIMEZONE", default_value = "Europe/Brussels")]
    pub timezone: String,

    /// Fluvius API granularity value (3 = quarter-hour, 4 = daily)
    #[arg(long, env = "FLUVIUS_GRANULARITY", default_value = "4")]
    pub granularity: String,

    /// Skip authentication and reuse an existing bearer token (with or without
    /// the "Bearer " prefix)
    #[arg(long, env = "FLUVIUS_BEARER_TOKEN", hide_env_values = true)]
    pub bearer_token: Option<String>,

    /// Path to store the raw JSON response
    #[arg(long, default_value = "fluvius_consumption_data.json")]
    pub output: PathBuf,

    /// Reduce log noise while fetching the token
    #[arg(long)]
    pub quiet: bool,

    /// Also print the readings as a table
    #[arg(long)]
    pub table: bool,

    /// OAuth client id used for the email/password login
    #[arg(long, env = "FLUVIUS_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth authority; `/authorize` and `/token` are appended to it
    #[arg(long, env = "FLUVIUS_AUTH_AUTHORITY", default_value = DEFAULT_AUTH_AUTHORITY)]
    pub auth_authority: String,
}

/// How the run gets its token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    BearerToken(String),
    Password { email: String, password: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthSettings {
    pub client_id: Option<String>,
    pub authority: String,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            authority: DEFAULT_AUTH_AUTHORITY.to_string(),
        }
    }
}

/// Validated configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub auth: AuthMode,
    pub remember_me: bool,
    pub ean: String,
    pub meter_serial: String,
    pub days_back: u32,
    pub timezone: String,
    pub granularity: String,
    pub output: PathBuf,
    /// Chatty login; turned off by `--quiet`
    pub verbose: bool,
    pub table: bool,
    pub oauth: OAuthSettings,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn missing(flag: &str, env: &str) -> FluviusError {
    FluviusError::Configuration(format!("Missing --{} (or {})", flag, env))
}

impl TryFrom<Cli> for Config {
    type Error = FluviusError;

    fn try_from(cli: Cli) -> Result<Self> {
        let auth = match present(cli.bearer_token) {
            Some(token) => AuthMode::BearerToken(token),
            None => {
                let email = present(cli.email).ok_or_else(|| missing("email", "FLUVIUS_LOGIN"))?;
                let password =
                    present(cli.password).ok_or_else(|| missing("password", "FLUVIUS_PASSWORD"))?;
                AuthMode::Password { email, password }
            }
        };
        let ean = present(cli.ean).ok_or_else(|| missing("ean", "FLUVIUS_EAN"))?;
        let meter_serial = present(cli.meter_serial)
            .ok_or_else(|| missing("meter-serial", "FLUVIUS_METER_SERIAL"))?;

        Ok(Config {
            auth,
            remember_me: cli.remember_me,
            ean: ean.trim().to_string(),
            meter_serial: meter_serial.trim().to_string(),
            days_back: cli.days_back,
            timezone: cli.timezone,
            granularity: cli.granularity,
            output: cli.output,
            verbose: !cli.quiet,
            table: cli.table,
            oauth: OAuthSettings {
                client_id: present(cli.client_id),
                authority: cli.auth_authority,
            },
        })
    }
}
