use crate::{
    api,
    api::handlers::auth::{
        credentials::TokenSigner,
        rate_limit::{FixedWindowRateLimiter, NoopRateLimiter, RateLimiter, RateLimits},
        state::AuthConfig,
    },
    cli::actions::Action,
};
use anyhow::Result;
use std::sync::Arc;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub secret_key: secrecy::SecretString,
    pub token_algorithm: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub max_login_attempts: u32,
    pub lockout_duration_minutes: i64,
    pub rate_limit_register_per_minute: u32,
    pub rate_limit_login_per_minute: u32,
    pub rate_limit_verify_per_minute: u32,
    pub rate_limit_disabled: bool,
    pub frontend_base_url: String,
}

/// Handle the server action
///
/// # Errors
/// Returns an error if the token signer rejects the configuration or the
/// server fails to start.
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server { args } => execute(args).await,
    }
}

async fn execute(args: Args) -> Result<()> {
    let signer = TokenSigner::new(
        args.secret_key,
        &args.token_algorithm,
        args.access_token_ttl_minutes,
        args.refresh_token_ttl_days,
    )?;

    let auth_config = AuthConfig::new(args.frontend_base_url)
        .with_max_login_attempts(args.max_login_attempts)
        .with_lockout_duration_minutes(args.lockout_duration_minutes);

    // Per config, not a process-global toggle: disabling rate limits swaps in
    // a no-op limiter at construction time.
    let rate_limiter: Arc<dyn RateLimiter> = if args.rate_limit_disabled {
        Arc::new(NoopRateLimiter)
    } else {
        Arc::new(FixedWindowRateLimiter::new(RateLimits {
            register_per_minute: args.rate_limit_register_per_minute,
            login_per_minute: args.rate_limit_login_per_minute,
            verify_email_per_minute: args.rate_limit_verify_per_minute,
        }))
    };

    api::new(args.port, args.dsn, auth_config, signer, rate_limiter).await
}
