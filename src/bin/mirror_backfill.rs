use std::process::ExitCode;

use clap::Parser;
use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use vetclinic_server::{
    config::Config,
    lifecycle::RecordKind,
    migrator::Migrator,
    mirror::{backfill::backfill, RestTableClient},
};

/// Copies local clinic records that are missing from the remote mirror.
#[derive(Parser, Debug)]
#[command(name = "mirror_backfill", version, about)]
struct Args {
    /// Tables to copy, comma separated (owners, veterinarians, pets, visits, payments).
    #[arg(long, value_delimiter = ',', value_parser = parse_table)]
    tables: Vec<RecordKind>,
}

fn parse_table(raw: &str) -> Result<RecordKind, String> {
    RecordKind::from_table(raw).ok_or_else(|| format!("unknown table: {}", raw))
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    vetclinic_server::telemetry::init_telemetry("vetclinic-backfill");

    let args = Args::parse();
    let config = Config::load();

    let Some((url, key)) = config.mirror.credentials() else {
        tracing::error!("❌ SUPABASE_URL and SUPABASE_KEY must both be set");
        return ExitCode::FAILURE;
    };

    let remote = match RestTableClient::new(url, key) {
        Ok(remote) => remote,
        Err(e) => {
            tracing::error!("❌ Could not build remote client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let db = match Database::connect(config.database_url.as_str()).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("❌ Could not connect to database: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = Migrator::up(&db, None).await {
        tracing::error!("❌ Migrations failed: {}", e);
        return ExitCode::FAILURE;
    }

    let kinds = if args.tables.is_empty() {
        RecordKind::ALL.to_vec()
    } else {
        args.tables
    };

    match backfill(&db, &remote, &kinds).await {
        Ok(reports) => {
            let failed: usize = reports.iter().map(|r| r.failed).sum();
            for report in &reports {
                println!(
                    "{:<14} migrated={:<5} skipped={:<5} missing_parent={:<5} failed={}",
                    report.table,
                    report.migrated,
                    report.skipped,
                    report.missing_parent,
                    report.failed
                );
            }
            if failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            tracing::error!("❌ Backfill aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}
