use anyhow::{Context, Result, bail};
use log::info;

use crate::{
    cli::InferArgs,
    config::AppConfig,
    table::render_table,
    upload::{UploadedFile, stage_file},
};

/// Shows the inferred column plan for a file without storing anything.
pub fn execute(args: &InferArgs, config: &AppConfig) -> Result<()> {
    let options =
        config.parse_options_with(args.read.delimiter, args.read.input_encoding.as_deref())?;
    let file = UploadedFile::from_path(&args.input)?;
    info!("Inferring column types for {:?} ({})", args.input, file.mime);
    let Some(staged) =
        stage_file(&file, &options).with_context(|| format!("Parsing {:?}", args.input))?
    else {
        bail!("{:?} has no data rows", args.input);
    };

    if args.json {
        let json = serde_json::to_string_pretty(&staged.plan)
            .context("Serializing column plan to JSON")?;
        println!("{json}");
        return Ok(());
    }

    let headers = ["#", "Column", "Type", "Non-empty"]
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let rows = staged
        .plan
        .decisions()
        .iter()
        .enumerate()
        .map(|(idx, decision)| {
            vec![
                (idx + 1).to_string(),
                decision.column_name.clone(),
                decision.storage_type.to_string(),
                staged.sheet.column_values(idx).count().to_string(),
            ]
        })
        .collect::<Vec<_>>();
    print!("{}", render_table(&headers, &rows));
    println!(
        "\n{} column(s), {} data row(s)",
        staged.sheet.width(),
        staged.sheet.rows.len()
    );
    Ok(())
}
