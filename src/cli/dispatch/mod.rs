use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::{anyhow, Result};
use secrecy::SecretString;
use std::{path::PathBuf, time::Duration};

pub fn handler(matches: &clap::ArgMatches) -> Result<(Action, GlobalArgs)> {
    let secret = matches
        .get_one::<String>("session-secret")
        .map(|s| SecretString::from(s.to_string()))
        .ok_or_else(|| anyhow!("missing required argument: --session-secret"))?;

    let mut globals = GlobalArgs::new(secret);

    globals.model_path = matches.get_one::<String>("model").map(PathBuf::from);

    if let Some(&seconds) = matches.get_one::<u64>("call-timeout") {
        globals.call_timeout = Duration::from_secs(seconds);
    }

    let action = Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow!("missing required argument: --dsn"))?,
    };

    Ok((action, globals))
}
