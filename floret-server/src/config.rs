use std::time::Duration;

use clap::Parser;
use floret_core::{fal::DEFAULT_QUEUE_URL, DEFAULT_MODEL};

use crate::rate_limit::{LimitSpec, Limits, DEFAULT_LIMITS, ROUTE_LIMITS};

// Define command line arguments
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Floret image generation form server")]
pub struct Args {
    /// fal API key
    #[arg(long, env = "FAL_KEY", hide_env_values = true, value_parser = non_blank)]
    pub fal_key: String,

    /// Host address to bind the server to
    #[arg(long, env = "FLORET_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind the server to
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Hosted model endpoint to submit to
    #[arg(long, env = "FAL_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Base URL of the fal queue API
    #[arg(long, env = "FAL_QUEUE_URL", default_value = DEFAULT_QUEUE_URL)]
    pub queue_url: String,

    /// Delay between queue status polls, in milliseconds
    #[arg(long, env = "FAL_POLL_INTERVAL_MS", default_value_t = 500)]
    pub poll_interval_ms: u64,

    /// Overall timeout for each outbound HTTP request; unset means none
    #[arg(long, env = "HTTP_TIMEOUT_SECS")]
    pub http_timeout_secs: Option<u64>,

    /// Limits applied to every route, per client address
    #[arg(long, env = "DEFAULT_LIMITS", default_value = DEFAULT_LIMITS)]
    pub default_limits: Limits,

    /// Extra limits for the generation form route
    #[arg(long, env = "ROUTE_LIMITS", default_value = ROUTE_LIMITS)]
    pub route_limits: Limits,
}

fn non_blank(value: &str) -> Result<String, String> {
    if value.trim().is_empty() {
        return Err("must not be empty".to_string());
    }
    Ok(value.to_string())
}

impl Args {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Default limits first, then the route's own.
    pub fn limits(&self) -> Vec<LimitSpec> {
        self.default_limits
            .0
            .iter()
            .chain(self.route_limits.0.iter())
            .copied()
            .collect()
    }

    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = self.http_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_hosted_setup() {
        let args = Args::try_parse_from(["floret-server", "--fal-key", "secret"]).unwrap();
        assert_eq!(args.model, "fal-ai/flux-lora");
        assert_eq!(args.queue_url, "https://queue.fal.run");
        assert_eq!(args.poll_interval(), Duration::from_millis(500));
        assert_eq!(args.http_timeout_secs, None);
        let limits: Vec<String> = args.limits().iter().map(ToString::to_string).collect();
        assert_eq!(
            limits,
            ["200 per 1 day", "50 per 1 hour", "10 per 1 minute"]
        );
    }

    #[test]
    fn blank_api_key_is_rejected() {
        assert!(Args::try_parse_from(["floret-server", "--fal-key", " "]).is_err());
    }

    #[test]
    fn limits_are_configurable() {
        let args = Args::try_parse_from([
            "floret-server",
            "--fal-key",
            "secret",
            "--route-limits",
            "3 per second;20 per minute",
            "--port",
            "9000",
        ])
        .unwrap();
        assert_eq!(args.route_limits.0.len(), 2);
        assert_eq!(args.bind_address(), "0.0.0.0:9000");
    }

    #[test]
    fn settings_read_their_documented_env_vars() {
        use clap::CommandFactory;

        let command = Args::command();
        let env_of = |id: &str| {
            command
                .get_arguments()
                .find(|arg| arg.get_id() == id)
                .and_then(|arg| arg.get_env())
                .and_then(|env| env.to_str())
                .map(str::to_owned)
        };
        assert_eq!(env_of("host").as_deref(), Some("FLORET_HOST"));
        assert_eq!(env_of("port").as_deref(), Some("PORT"));
        assert_eq!(env_of("fal_key").as_deref(), Some("FAL_KEY"));
    }
}
