use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use log::{debug, info};
use proposalsync::auth::CredentialSource;
use proposalsync::config::{
    Config, DEFAULT_ANCHOR_COLUMN, DEFAULT_LINK_COLUMN, DEFAULT_TIMEZONE, Settings, SheetConfig,
    credential_source, parse_timezone,
};
use proposalsync::http::{Endpoint, Pipeline};
use proposalsync::ingest::ingest;
use proposalsync::reconcile::{ReconcileMode, reconcile};
use proposalsync::set_up_logger;
use proposalsync::store::DEFAULT_COLLECTION;
use proposalsync::types::{DEFAULT_LINK_TEMPLATE, LinkTemplate};

#[derive(Debug)]
enum Action {
    Ingest { input: String },
    Reconcile { dry_run: bool },
}

#[derive(Debug)]
struct Args {
    verbose: bool,
    action: Action,
    config: Config,
}

fn global(arg: Arg) -> Arg {
    arg.global(true)
}

fn parse_args() -> Result<Args> {
    let matches = Command::new("proposalsync")
        .version("0.1")
        .author("Jacob Luszcz")
        .subcommand_required(true)
        .arg(global(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Verbose mode. Outputs DEBUG and higher log messages."),
        ))
        .arg(global(
            Arg::new("credentials")
                .long("credentials")
                .help(
                    "Path to a service account key file. Without it, GOOGLE_SERVICE_ACCOUNT_KEY \
                     and then GOOGLE_APPLICATION_CREDENTIALS are used.",
                ),
        ))
        .arg(global(
            Arg::new("project")
                .long("project")
                .env("GOOGLE_CLOUD_PROJECT")
                .help("Firestore project. Defaults to the service account's project."),
        ))
        .arg(global(
            Arg::new("collection")
                .long("collection")
                .env("FIRESTORE_COLLECTION")
                .default_value(DEFAULT_COLLECTION),
        ))
        .arg(global(
            Arg::new("emulator-host")
                .long("emulator-host")
                .env("FIRESTORE_EMULATOR_HOST")
                .help("host:port of a Firestore emulator; requests to it are unauthenticated."),
        ))
        .arg(global(
            Arg::new("schema")
                .long("schema")
                .env("PROPOSAL_INGEST_SCHEMA")
                .value_parser(["nested", "flattened"])
                .default_value("nested"),
        ))
        .arg(global(
            Arg::new("link-template")
                .long("link-template")
                .env("PROPOSAL_LINK_TEMPLATE")
                .default_value(DEFAULT_LINK_TEMPLATE)
                .help("Proposal link URL; every {uid} is replaced with the proposal uid."),
        ))
        .arg(global(
            Arg::new("timezone")
                .long("timezone")
                .env("PROPOSAL_TIMEZONE")
                .default_value(DEFAULT_TIMEZONE)
                .help("IANA zone that sheet timestamps are displayed in."),
        ))
        .arg(global(
            Arg::new("spreadsheet-id")
                .long("spreadsheet-id")
                .env("SPREADSHEET_ID"),
        ))
        .arg(global(Arg::new("sheet-name").long("sheet-name").env("SHEET_NAME")))
        .arg(global(
            Arg::new("link-column")
                .long("link-column")
                .env("SHEET_LINK_COLUMN")
                .default_value(DEFAULT_LINK_COLUMN),
        ))
        .arg(global(
            Arg::new("anchor-column")
                .long("anchor-column")
                .env("SHEET_ANCHOR_COLUMN")
                .default_value(DEFAULT_ANCHOR_COLUMN),
        ))
        .subcommand(
            Command::new("ingest")
                .about("Stores a webhook payload as a proposal.")
                .arg(
                    Arg::new("input")
                        .default_value("-")
                        .help("JSON payload file, or - for stdin."),
                ),
        )
        .subcommand(
            Command::new("reconcile")
                .about("Appends stored proposals missing from the sheet.")
                .arg(
                    Arg::new("dry-run")
                        .short('n')
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Print the rows that would be appended without writing them."),
                ),
        )
        .get_matches();

    let verbose = matches.get_flag("verbose");

    let (endpoint, action) = match matches.subcommand() {
        Some(("ingest", sub)) => (
            Endpoint::Ingest,
            Action::Ingest {
                input: string_arg(sub, "input").unwrap_or_else(|| "-".to_owned()),
            },
        ),
        Some(("reconcile", sub)) => (
            Endpoint::Reconcile,
            Action::Reconcile {
                dry_run: sub.get_flag("dry-run"),
            },
        ),
        _ => anyhow::bail!("a subcommand is required"),
    };

    let config = config_from(&matches, endpoint)?;

    Ok(Args {
        verbose,
        action,
        config,
    })
}

fn string_arg(matches: &ArgMatches, id: &str) -> Option<String> {
    matches.get_one::<String>(id).cloned()
}

fn required_arg(matches: &ArgMatches, id: &str) -> Result<String> {
    string_arg(matches, id).with_context(|| format!("--{id} is required to reconcile"))
}

fn config_from(matches: &ArgMatches, endpoint: Endpoint) -> Result<Config> {
    let emulator_host = string_arg(matches, "emulator-host");

    let credentials = match string_arg(matches, "credentials") {
        Some(path) => CredentialSource::File(PathBuf::from(path)),
        None => credential_source(endpoint, emulator_host.as_deref())
            .context("pass --credentials or set a service account env var")?,
    };

    let settings = Settings {
        schema: required_arg(matches, "schema")?.parse()?,
        link_template: LinkTemplate::new(required_arg(matches, "link-template")?)?,
        timezone: parse_timezone(&required_arg(matches, "timezone")?)?,
    };

    let sheet = if endpoint.reconciles() {
        Some(SheetConfig {
            spreadsheet_id: required_arg(matches, "spreadsheet-id")?,
            sheet_name: required_arg(matches, "sheet-name")?,
            link_column: required_arg(matches, "link-column")?,
            anchor_column: required_arg(matches, "anchor-column")?,
        })
    } else {
        None
    };

    Ok(Config {
        endpoint,
        settings,
        credentials,
        project_id: string_arg(matches, "project"),
        collection: required_arg(matches, "collection")?,
        emulator_host,
        sheet,
    })
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read payload from stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(input).with_context(|| format!("failed to read {input}"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args()?;
    set_up_logger(module_path!(), args.verbose)?;
    debug!("{args:?}");

    let pipeline = Pipeline::from_config(&args.config).await?;
    let settings = &args.config.settings;

    match args.action {
        Action::Ingest { input } => {
            let body: serde_json::Value = serde_json::from_str(&read_input(&input)?)
                .with_context(|| format!("{input} is not valid JSON"))?;
            let proposal = ingest(
                &pipeline.store,
                settings.schema,
                &settings.link_template,
                &body,
            )
            .await?;
            info!("Stored {} as {}", proposal.uid, proposal.proposal_link);
        }
        Action::Reconcile { dry_run } => {
            let sheet = pipeline
                .sheet
                .as_ref()
                .context("no spreadsheet configured")?;
            let mode = if dry_run {
                ReconcileMode::DryRun
            } else {
                ReconcileMode::Apply
            };
            let report = reconcile(&pipeline.store, sheet, settings.timezone, mode).await?;
            for row in &report.rows {
                println!("{}", row.values().join("\t"));
            }
            info!("{}", report.summary());
        }
    }

    Ok(())
}
