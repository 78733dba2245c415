// ============================================================================
// SENSORSEAL — COMMAND LINE
// Sign readings the way a device does, verify them the way a gateway does.
// ============================================================================

#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use sensorseal::{
    now_millis, to_hex, HmacSha256, ReadingValue, SealConfig, SensorReading, Sha256, Verified,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sensorseal")]
#[command(about = "HMAC-SHA256 signing and verification for sensor readings")]
struct Args {
    /// TOML config with `secret`, `timestamp_tolerance_secs`, `allow_unsigned`
    #[arg(long)]
    config: Option<PathBuf>,
    /// Shared secret; wins over SENSORSEAL_SECRET and the config file
    #[arg(long)]
    secret: Option<String>,
    #[arg(long, default_value = "warn")]
    log: String,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// SHA-256 of TEXT
    Digest { text: String },
    /// Append `|sig:<hex>` to MESSAGE
    Sign { message: String },
    /// Format and sign a sensor reading
    Reading {
        #[arg(long)]
        kind: String,
        #[arg(long, allow_hyphen_values = true)]
        value: String,
        /// Treat the value as an integer reading
        #[arg(long, default_value_t = false)]
        int: bool,
        /// Milliseconds since the epoch; defaults to now
        #[arg(long)]
        ts: Option<u64>,
    },
    /// Check a received line
    Verify {
        line: String,
        /// Receive time in milliseconds since the epoch; defaults to now
        #[arg(long)]
        now: Option<u64>,
    },
    /// Print a few reference digests and timings
    Demo,
}

fn load_config(args: &Args) -> anyhow::Result<SealConfig> {
    let mut config = match &args.config {
        Some(path) => SealConfig::load(path)?,
        None => SealConfig::default(),
    };
    config.apply_env();
    if let Some(secret) = &args.secret {
        config.secret = secret.clone();
    }
    Ok(config)
}

fn parse_value(raw: &str, int: bool) -> anyhow::Result<ReadingValue> {
    if int {
        let v: i64 = raw.parse().with_context(|| format!("invalid integer {raw:?}"))?;
        Ok(v.into())
    } else {
        let v: f64 = raw.parse().with_context(|| format!("invalid number {raw:?}"))?;
        anyhow::ensure!(v.is_finite(), "reading must be finite");
        Ok(v.into())
    }
}

fn bench<F: Fn()>(f: F, iters: u32) -> Duration {
    let s = Instant::now();
    for _ in 0..iters {
        f();
    }
    s.elapsed() / iters
}

fn demo() {
    let data = b"The quick brown fox jumps over the lazy dog";
    let key = b"super-secret-key";

    let t_sha = bench(
        || {
            let _ = Sha256::digest(data);
        },
        100_000,
    );
    let t_mac = bench(
        || {
            let _ = HmacSha256::mac(key, data);
        },
        50_000,
    );

    println!("SHA-256(\"\"):       {}", to_hex(&Sha256::digest(b"")));
    println!("SHA-256(fox):      {}  ({} ns)", to_hex(&Sha256::digest(data)), t_sha.as_nanos());
    println!("HMAC-SHA256(fox):  {}  ({} ns)", to_hex(&HmacSha256::mac(key, data)), t_mac.as_nanos());

    // Avalanche
    let h1 = Sha256::digest(b"temperature:23.50|ts:1000");
    let h2 = Sha256::digest(b"temperature:23.51|ts:1000");
    let diff: u32 = h1.iter().zip(h2.iter()).map(|(a, b)| (a ^ b).count_ones()).sum();
    println!(
        "Avalanche: 1-digit change -> {}/256 bits changed ({:.1}%)",
        diff,
        f64::from(diff) / 256.0 * 100.0
    );
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log))
        .with_writer(std::io::stderr)
        .init();

    match &args.cmd {
        Command::Digest { text } => {
            println!("{}", to_hex(&Sha256::digest(text.as_bytes())));
        }
        Command::Sign { message } => {
            let signer = load_config(&args)?.signer()?;
            println!("{message}{}{}", sensorseal::SIG_SEPARATOR, signer.sign(message));
        }
        Command::Reading { kind, value, int, ts } => {
            let signer = load_config(&args)?.signer()?;
            let reading = SensorReading::new(
                kind.as_str(),
                parse_value(value, *int)?,
                ts.unwrap_or_else(now_millis),
            );
            println!("{}", signer.sign_reading(&reading));
        }
        Command::Verify { line, now } => {
            let verifier = load_config(&args)?.verifier()?;
            let verified = verifier.check(line, now.unwrap_or_else(now_millis))?;
            let status = match &verified {
                Verified::Signed(_) => "valid",
                Verified::Unsigned(_) => "unsigned",
            };
            let reading = verified.reading();
            println!(
                "{status}: {} = {} @ {}",
                reading.kind, reading.value, reading.timestamp
            );
        }
        Command::Demo => demo(),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("23.5", false).unwrap().to_string(), "23.50");
        assert_eq!(parse_value("-3", true).unwrap(), ReadingValue::Int(-3));
        assert!(parse_value("2.5", true).is_err());
        assert!(parse_value("inf", false).is_err());
    }

    #[test]
    fn test_secret_precedence() {
        std::env::set_var(sensorseal::SECRET_ENV, "from-env");

        let args = Args::parse_from(["sensorseal", "sign", "hello"]);
        assert_eq!(load_config(&args).unwrap().secret, "from-env");

        let args = Args::parse_from(["sensorseal", "--secret", "s3", "sign", "hello"]);
        assert_eq!(load_config(&args).unwrap().secret, "s3");

        std::env::remove_var(sensorseal::SECRET_ENV);
    }
}
