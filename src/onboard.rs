use std::{path::Path, sync::Arc};

use anyhow::{Context, Result, bail};
use log::{info, warn};

use crate::{
    cli::{ColumnArgs, OnboardArgs},
    config::AppConfig,
    error::SessionError,
    profile::ProfileForm,
    session::{IngestionSession, StageOutcome},
    upload::UploadedFile,
};

/// Drives one onboarding session from the command line. Ctrl-C cancels any
/// in-flight storage call.
pub async fn execute(args: &OnboardArgs, config: &AppConfig) -> Result<()> {
    let store = Arc::new(config.open_store()?);
    let parse =
        config.parse_options_with(args.read.delimiter, args.read.input_encoding.as_deref())?;
    let mut session =
        IngestionSession::new(store.clone(), store, config.onboarding_options(parse));

    let token = session.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling onboarding");
            token.cancel();
        }
    });
    let outcome = run_session(&mut session, args).await;
    interrupt.abort();

    if let Err(err) = &outcome {
        if let Some(message) = session.last_error() {
            warn!("Session stopped on the {} step: {message}", session.step());
        }
        if !session.created_tables().is_empty() {
            warn!(
                "Tables created before the failure remain: {}",
                session.created_tables().join(", ")
            );
        }
        info!("Onboarding failed: {err:#}");
    }
    outcome
}

async fn run_session(session: &mut IngestionSession, args: &OnboardArgs) -> Result<()> {
    let form = ProfileForm {
        first_name: args.first_name.clone(),
        last_name: args.last_name.clone(),
        email: args.email.clone(),
        phone: args.phone.clone(),
    };
    session
        .submit_profile(&form)
        .await
        .context("Submitting profile")?;

    stage(session, args.first_file.as_deref(), &args.first_columns())?;
    if let Some(table) = session
        .complete_first_upload()
        .await
        .context("Completing the first upload")?
    {
        println!("Created table '{table}'");
    }

    stage(session, args.second_file.as_deref(), &args.second_columns())?;
    let completion = session
        .complete_second_upload()
        .await
        .context("Completing the second upload")?;
    if let Some(table) = &completion.table {
        println!("Created table '{table}'");
    }
    println!("Onboarding complete: {}", completion.dashboard_path);
    Ok(())
}

fn stage(session: &mut IngestionSession, path: Option<&Path>, columns: &ColumnArgs) -> Result<()> {
    let Some(path) = path else {
        if !columns.exclude.is_empty() || !columns.types.is_empty() {
            bail!("Column options were given for a step without a file");
        }
        return Ok(());
    };
    let file = UploadedFile::from_path(path)?;
    match session
        .stage_upload(&file)
        .with_context(|| format!("Reading {path:?}"))?
    {
        StageOutcome::Staged { columns, rows } => {
            info!("Staged {path:?}: {columns} column(s), {rows} row(s)")
        }
        StageOutcome::NoData => return Err(SessionError::NoDataRows).context(format!("{path:?}")),
        StageOutcome::Duplicate(kind) => {
            return Err(SessionError::Duplicate(kind)).context(format!("{path:?}"));
        }
    }
    for adjustment in columns.overrides() {
        session
            .override_column(&adjustment)
            .with_context(|| format!("Adjusting columns of {path:?}"))?;
    }
    Ok(())
}
