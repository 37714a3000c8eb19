//! Credential masking command.

use tether_config::Config;
use tether_gateway::censor;

/// Print `credential` as it would appear in log lines.
pub(crate) fn print_censored(credential: &str, cfg: &Config) {
    println!("{}", censor(credential, cfg.display.censor_token));
}
