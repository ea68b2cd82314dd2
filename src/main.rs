use std::path::Path;

use chrono::Utc;
use color_eyre::eyre::{Context, eyre};
use crl_store::{
    config::Config,
    pki::crl::{IngestOutcome, ParsedCrl, SerialNumber, content_hash, ingest_crl},
    setup::setup,
    telemetry,
};

/// Reads hex serials, one per line. Blank lines and `#` comments are skipped.
fn parse_serials(text: &str) -> color_eyre::Result<Vec<SerialNumber>> {
    text.lines()
        .enumerate()
        .map(|(no, line)| (no, line.split('#').next().unwrap_or_default().trim()))
        .filter(|(_, line)| !line.is_empty())
        .map(|(no, line)| {
            SerialNumber::from_hex(line).wrap_err_with(|| format!("line {}", no + 1))
        })
        .collect()
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let config = Config::load()?;
    tracing::info!("Loaded configuration: {:?}", config);

    let (store, checker) = setup(&config).await?;

    let mut args = std::env::args().skip(1).peekable();
    if let Some(path) = args.next_if(|arg| Path::new(arg).is_file()) {
        let text = tokio::fs::read_to_string(&path)
            .await
            .wrap_err_with(|| format!("Failed to read {path}"))?;
        let crl = ParsedCrl {
            issuer: config.crl.ca.clone(),
            this_update: Utc::now(),
            etag: content_hash(text.as_bytes()),
            revoked_serials: parse_serials(&text).wrap_err_with(|| format!("Invalid {path}"))?,
        };

        match ingest_crl(&store, &config.crl.ca, &crl, config.crl.shard_count).await? {
            IngestOutcome::Updated { revoked } => {
                println!("imported {revoked} revoked serials from {path}")
            }
            IngestOutcome::Unchanged => println!("{path} is unchanged"),
            IngestOutcome::Stale => println!("{path} is older than the stored CRL"),
        }
    }

    for arg in args {
        let sn = SerialNumber::from_hex(&arg).wrap_err_with(|| format!("Invalid serial {arg}"))?;
        let revoked = checker
            .is_revoked(&sn)
            .await
            .map_err(|e| eyre!("Failed to check {sn}: {e}"))?;
        println!("{sn}: {}", if revoked { "revoked" } else { "not revoked" });
    }

    Ok(())
}
