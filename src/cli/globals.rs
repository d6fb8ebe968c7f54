use secrecy::SecretString;
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub session_secret: SecretString,
    pub model_path: Option<PathBuf>,
    pub call_timeout: Duration,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(session_secret: SecretString) -> Self {
        Self {
            session_secret,
            model_path: None,
            call_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_global_args() {
        let args = GlobalArgs::new(SecretString::from("swordfish".to_string()));
        assert_eq!(args.session_secret.expose_secret(), "swordfish");
        assert_eq!(args.model_path, None);
        assert_eq!(args.call_timeout, Duration::from_secs(5));
    }
}
