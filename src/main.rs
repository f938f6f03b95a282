use std::{fs, process, sync::Arc};

use spurgo::{
    application::{error::AppError, flush::FlushService},
    config::{self, Command},
    infra::{
        assets::DirectoryAssetEnumerator, cloudfront::CloudFrontProvider, db::PostgresStores,
        error::InfraError, telemetry,
    },
    invalidation::registry_from_settings,
};
use tracing::{Dispatch, Level, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging)?;

    let database_url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database.url is not set"))?;

    let stores = PostgresStores::connect(database_url, settings.database.max_connections).await?;
    stores.ensure_settings_schema().await?;
    let stores = Arc::new(stores);

    let provider = Arc::new(CloudFrontProvider::from_settings(&settings.provider)?);
    let registry = registry_from_settings(&settings.expansion, Arc::new(DirectoryAssetEnumerator));

    let service = FlushService::new(
        stores.clone(),
        stores.clone(),
        provider,
        registry,
        settings.provider.reference_prefix.clone(),
    );

    match cli.command {
        Command::Plan => {
            let plan = service.preview().await?;
            print!("{}", plan.as_text());
        }
        Command::Flush(args) => {
            let edited = match &args.paths {
                Some(path) => Some(fs::read_to_string(path).map_err(InfraError::from)?),
                None => None,
            };
            let receipt = service.flush(edited.as_deref()).await?;
            println!(
                "invalidation {} accepted: {} paths, status {}, checkpoint advanced to {}",
                receipt.invalidation_id, receipt.path_count, receipt.status, receipt.checkpoint
            );
        }
        Command::Configure(args) => {
            let outcome = service.configure(&args.distribution).await?;
            println!(
                "distribution {} resolves to {}",
                outcome.distribution_id, outcome.domain
            );
            if outcome.checkpoint_initialized {
                println!("checkpoint initialized, future flushes start from now");
            }
        }
    }

    Ok(())
}
