use clap::{Arg, ArgAction, Command};

pub const ARG_SECRET_KEY: &str = "secret-key";
pub const ARG_TOKEN_ALGORITHM: &str = "token-algorithm";
pub const ARG_ACCESS_TOKEN_TTL_MINUTES: &str = "access-token-ttl-minutes";
pub const ARG_REFRESH_TOKEN_TTL_DAYS: &str = "refresh-token-ttl-days";
pub const ARG_MAX_LOGIN_ATTEMPTS: &str = "max-login-attempts";
pub const ARG_LOCKOUT_DURATION_MINUTES: &str = "lockout-duration-minutes";
pub const ARG_RATE_LIMIT_REGISTER_PER_MINUTE: &str = "rate-limit-register-per-minute";
pub const ARG_RATE_LIMIT_LOGIN_PER_MINUTE: &str = "rate-limit-login-per-minute";
pub const ARG_RATE_LIMIT_VERIFY_PER_MINUTE: &str = "rate-limit-verify-per-minute";
pub const ARG_RATE_LIMIT_DISABLED: &str = "rate-limit-disabled";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";

pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_lockout_args(command);
    with_rate_limit_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SECRET_KEY)
                .long(ARG_SECRET_KEY)
                .help("Shared secret for signing access/refresh tokens (min 32 chars)")
                .env("SENTINELA_SECRET_KEY")
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_ALGORITHM)
                .long(ARG_TOKEN_ALGORITHM)
                .help("JWT signing algorithm")
                .env("SENTINELA_TOKEN_ALGORITHM")
                .default_value("HS256"),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL_MINUTES)
                .long(ARG_ACCESS_TOKEN_TTL_MINUTES)
                .help("Access token lifetime in minutes")
                .env("SENTINELA_ACCESS_TOKEN_TTL_MINUTES")
                .default_value("15")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL_DAYS)
                .long(ARG_REFRESH_TOKEN_TTL_DAYS)
                .help("Refresh token lifetime in days")
                .env("SENTINELA_REFRESH_TOKEN_TTL_DAYS")
                .default_value("7")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for verification links and CORS")
                .env("SENTINELA_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
}

fn with_lockout_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAX_LOGIN_ATTEMPTS)
                .long(ARG_MAX_LOGIN_ATTEMPTS)
                .help("Failed login attempts before the account is locked")
                .env("SENTINELA_MAX_LOGIN_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_DURATION_MINUTES)
                .long(ARG_LOCKOUT_DURATION_MINUTES)
                .help("Account lockout duration in minutes")
                .env("SENTINELA_LOCKOUT_DURATION_MINUTES")
                .default_value("15")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_rate_limit_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_REGISTER_PER_MINUTE)
                .long(ARG_RATE_LIMIT_REGISTER_PER_MINUTE)
                .help("Registrations allowed per client per minute")
                .env("SENTINELA_RATE_LIMIT_REGISTER_PER_MINUTE")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_LOGIN_PER_MINUTE)
                .long(ARG_RATE_LIMIT_LOGIN_PER_MINUTE)
                .help("Login attempts allowed per client per minute")
                .env("SENTINELA_RATE_LIMIT_LOGIN_PER_MINUTE")
                .default_value("10")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_VERIFY_PER_MINUTE)
                .long(ARG_RATE_LIMIT_VERIFY_PER_MINUTE)
                .help("Email verification attempts allowed per client per minute")
                .env("SENTINELA_RATE_LIMIT_VERIFY_PER_MINUTE")
                .default_value("30")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_DISABLED)
                .long(ARG_RATE_LIMIT_DISABLED)
                .help("Disable rate limiting (constructs a no-op limiter)")
                .env("SENTINELA_RATE_LIMIT_DISABLED")
                .action(ArgAction::SetTrue),
        )
}
